use std::fmt::Display;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_WAITER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Identifies one lock waiter: the owning process plus a monotonic counter,
/// per §4.B step 1 ("process-id + monotonic counter is sufficient").
/// Unique within a process, and — barring pid reuse racing a counter wrap,
/// which does not happen within a process lifetime — unique across
/// processes sharing the same file.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct WaiterId {
    pid: u32,
    seq: u64,
}

impl WaiterId {
    pub fn new() -> Self {
        let seq = NEXT_WAITER_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            pid: std::process::id(),
            seq,
        }
    }
}

impl Default for WaiterId {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for WaiterId {
    type Target = u32;
    fn deref(&self) -> &Self::Target {
        &self.pid
    }
}

impl Display for WaiterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.pid, self.seq)
    }
}
