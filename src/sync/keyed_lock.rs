//! Per-key mutex with FIFO grant order and an optional lease timeout.
//!
//! The message bus preserves publisher order per routing key, but handlers are
//! dispatched without waiting for earlier ones to finish, so handler
//! *completion* order can differ from arrival order. Serializing all updates
//! for one task through this lock restores the ordering that matters: grants
//! are strictly first-come-first-served per key, so a handler for a later
//! message cannot apply its update before the handler for an earlier message
//! has released the key.
//!
//! The optional lease timeout bounds how long a stuck handler can block
//! others on the same key. When the lease fires, the lock is force-released
//! and handed to the next waiter even though the original holder may still
//! complete an external write afterwards. That is a deliberate
//! liveness-over-safety tradeoff, kept as-is rather than papered over with
//! fencing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

/// A per-key asynchronous mutex.
///
/// Cloning is cheap; clones share the same lock table.
#[derive(Clone)]
pub struct KeyedLock {
    inner: Arc<Inner>,
}

struct Inner {
    max_lock_time: Option<Duration>,
    states: Mutex<LockMap>,
}

struct LockMap {
    /// Globally unique grant tokens. Never reused, so a stale release (from a
    /// lease timer or a double call) can never accidentally release a grant
    /// handed out later under the same key.
    next_token: u64,
    entries: HashMap<String, LockEntry>,
}

/// Ephemeral per-key state. Exists only while the key is locked or waited on.
struct LockEntry {
    /// Token of the current holder.
    holder: u64,
    /// Waiters in arrival order.
    waiters: VecDeque<Waiter>,
}

struct Waiter {
    token: u64,
    tx: oneshot::Sender<()>,
}

impl KeyedLock {
    /// Creates a lock with no lease timeout: a key stays locked until its
    /// guard is dropped.
    pub fn new() -> Self {
        Self::with_max_lock_time(None)
    }

    /// Creates a lock whose grants are force-released after `max_lock_time`
    /// unless released earlier.
    pub fn with_max_lock_time(max_lock_time: impl Into<Option<Duration>>) -> Self {
        KeyedLock {
            inner: Arc::new(Inner {
                max_lock_time: max_lock_time.into(),
                states: Mutex::new(LockMap {
                    next_token: 0,
                    entries: HashMap::new(),
                }),
            }),
        }
    }

    /// Acquires the lock for `key`, suspending until it is granted.
    ///
    /// Grants for a fixed key are handed out in the order the `acquire`
    /// calls registered, regardless of how long each holder keeps the lock.
    /// Locks for different keys never block each other.
    pub async fn acquire(&self, key: &str) -> LockGuard {
        let (token, wait) = {
            let mut map = self.inner.lock_map();
            let token = map.next_token;
            map.next_token += 1;
            match map.entries.get_mut(key) {
                None => {
                    map.entries.insert(
                        key.to_string(),
                        LockEntry {
                            holder: token,
                            waiters: VecDeque::new(),
                        },
                    );
                    (token, None)
                }
                Some(entry) => {
                    let (tx, rx) = oneshot::channel();
                    entry.waiters.push_back(Waiter { token, tx });
                    (token, Some(rx))
                }
            }
        };

        if let Some(rx) = wait {
            // The sender is only dropped after sending the grant or when this
            // waiter is skipped for having gone away, which it has not.
            let _ = rx.await;
        }

        let lease = self.start_lease(key, token);
        LockGuard {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
            token,
            lease,
        }
    }

    fn start_lease(&self, key: &str, token: u64) -> Option<JoinHandle<()>> {
        let max_lock_time = self.inner.max_lock_time?;
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        Some(tokio::spawn(async move {
            tokio::time::sleep(max_lock_time).await;
            warn!(key = %key, elapsed_ms = max_lock_time.as_millis() as u64,
                "keyed lock lease expired; force-releasing");
            inner.release(&key, token);
        }))
    }

    /// Number of keys currently locked or waited on.
    pub fn active_keys(&self) -> usize {
        self.inner.lock_map().entries.len()
    }
}

impl Default for KeyedLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn lock_map(&self) -> MutexGuard<'_, LockMap> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Releases the grant identified by `token`.
    ///
    /// Idempotent: if the token no longer holds the key (already released, or
    /// the lease timer got there first) this is a no-op.
    fn release(&self, key: &str, token: u64) {
        let mut map = self.lock_map();
        let Some(entry) = map.entries.get_mut(key) else {
            return;
        };
        if entry.holder != token {
            return;
        }
        loop {
            match entry.waiters.pop_front() {
                Some(waiter) => {
                    entry.holder = waiter.token;
                    if waiter.tx.send(()).is_ok() {
                        return;
                    }
                    // Waiter gave up before the grant; hand to the next one.
                }
                None => {
                    map.entries.remove(key);
                    return;
                }
            }
        }
    }
}

/// Exclusive ownership of a key, released on drop.
///
/// Dropping the guard releases the lock; if the lease timer already
/// force-released it, the drop is a no-op.
pub struct LockGuard {
    inner: Arc<Inner>,
    key: String,
    token: u64,
    lease: Option<JoinHandle<()>>,
}

impl LockGuard {
    /// Releases the lock explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}

    /// The key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.abort();
        }
        self.inner.release(&self.key, self.token);
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
