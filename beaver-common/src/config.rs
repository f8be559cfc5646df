use serde::{Deserialize, Serialize};

/// Options accepted by `Session::open`. Round-trips through `toml`/`serde_json`
/// so an embedding application can persist it next to the database file.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionOptions {
    /// Byte budget handed to SQLite's `PRAGMA mmap_size`. 0 disables mmap reads.
    pub mmap_bytes: u64,
    /// Whether per-thread handles keep a statement/shared-cache enabled connection.
    pub cache_enabled: bool,
    /// Default poll interval (milliseconds) used by locks, queues, channels
    /// and live logs when a manager-specific interval isn't supplied.
    pub poll_interval_default_ms: u64,
}

impl SessionOptions {
    pub fn poll_interval_default(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_default_ms)
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mmap_bytes: 256 * 1024 * 1024,
            cache_enabled: true,
            poll_interval_default_ms: 50,
        }
    }
}

/// Parameters for a single `FairLock` acquisition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LockOptions {
    /// How long an acquired row stays valid before another waiter may evict it.
    pub ttl: std::time::Duration,
    /// Base interval between queue re-checks; actual sleeps add up to 100% jitter.
    pub poll_interval: std::time::Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: std::time::Duration::from_secs(30),
            poll_interval: std::time::Duration::from_millis(50),
        }
    }
}
