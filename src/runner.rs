//! # Runner Module
//!
//! The uniform contract implemented by every processing component in the pipeline:
//! `process(msg) -> Result<()>` plus `close() -> Result<()>`. Mirrors the shape of
//! `brrtrouter`'s `middleware::Middleware` — a small trait seam with a default-empty
//! implementation for the half callers usually don't need — but for a single in-place
//! message mutation rather than a before/after pair.

use crate::error::RunnerError;
use crate::message::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Contract implemented by all processing components (Format Runner, JWT Runner, the
/// expression-language adapter).
///
/// `process` must be safe for concurrent invocation on distinct messages — handlers share
/// no per-message state. `close` is idempotent: a second call is a no-op success, and after
/// `close` returns, `process` must fail fast with [`crate::error::ErrorKind::Stopped`].
pub trait Runner: Send + Sync {
    fn process(&self, msg: &mut Message) -> Result<(), RunnerError>;
    fn close(&self) -> Result<(), RunnerError>;
}

/// One-shot close signal shared by every runner implementation in this crate.
///
/// Broadcasts close to all in-flight processors, who observe it at their next check and
/// return a `Stopped` error. Guarded by a mutex only for the one-shot transition itself;
/// reads are a relaxed atomic load so `process` can check it cheaply on every operation.
#[derive(Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    close_guard: Mutex<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        StopSignal {
            stopped: AtomicBool::new(false),
            close_guard: Mutex::new(()),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Idempotent: a second call observes the guard, sees `stopped` already true, and
    /// returns without re-running any shutdown side effect.
    pub fn close(&self) -> bool {
        let _guard = self.close_guard.lock().unwrap_or_else(|e| e.into_inner());
        if self.stopped.swap(true, Ordering::AcqRel) {
            false
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signal_close_is_idempotent() {
        let sig = StopSignal::new();
        assert!(!sig.is_stopped());
        assert!(sig.close());
        assert!(sig.is_stopped());
        assert!(!sig.close()); // second call is a no-op, but still success from the caller's view
        assert!(sig.is_stopped());
    }
}
