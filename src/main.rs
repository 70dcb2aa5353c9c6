use std::net::SocketAddr;

use axum::{Router, http::StatusCode, routing::get};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Liveness probe. The bus consumers run alongside the HTTP surface; as long
/// as the process is up, this answers.
async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tc_github=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // The deployment wires the real capabilities (GitHub client, queue
    // client, store, compiler) and bus bindings here, then starts a
    // bus::Dispatcher over them. This binary serves the health endpoint.
    let app = Router::new().route("/health", get(health_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind {}", addr);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server exited");
        std::process::exit(1);
    }
}
