//! Concurrency primitives used by the message handlers.

pub mod keyed_lock;

pub use keyed_lock::{KeyedLock, LockGuard};
