//! Cancellation token threaded explicitly through every pipeline stage.
//!
//! A token is tripped either by `cancel()`, by its deadline passing, or
//! (for the CLI) by SIGINT/SIGTERM once `install_signal_handler` ran.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that reports cancelled once `deadline` has passed.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Acquire) {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.flag.store(true, Ordering::Release);
                true
            }
            _ => false,
        }
    }
}

static SIGNAL_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

#[cfg(unix)]
extern "C" fn on_signal(_sig: libc::c_int) {
    // Only an atomic store: async-signal-safe.
    if let Some(flag) = SIGNAL_FLAG.get() {
        flag.store(true, Ordering::Release);
    }
}

/// Route SIGINT and SIGTERM into `token`.
///
/// Only the first token passed in a process is wired; later calls return
/// `false` and leave the handler untouched.
#[cfg(unix)]
pub fn install_signal_handler(token: &CancellationToken) -> bool {
    if SIGNAL_FLAG.set(Arc::clone(&token.flag)).is_err() {
        return false;
    }
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
    tracing::debug!("installed SIGINT/SIGTERM cancellation handler");
    true
}

#[cfg(not(unix))]
pub fn install_signal_handler(_token: &CancellationToken) -> bool {
    false
}
