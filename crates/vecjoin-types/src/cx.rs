//! Cancellation context.
//!
//! A [`Cx`] is handed to every `next_batch` call. Long-running work calls
//! [`Cx::checkpoint`] between units of work and stops with a distinct error
//! once the context is cancelled or its deadline has passed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use vecjoin_error::{Result, VecJoinError};

/// Cooperative cancellation and deadline signal.
///
/// Clones share the cancellation flag, so a clone kept by another thread can
/// abort a running query.
#[derive(Debug, Clone, Default)]
pub struct Cx {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cx {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(deadline),
        }
    }

    /// Context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Raise the cancellation flag for this context and all its clones.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail if the context was cancelled or the deadline passed.
    ///
    /// # Errors
    ///
    /// [`VecJoinError::Cancelled`] or [`VecJoinError::DeadlineExceeded`].
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(VecJoinError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            let now = Instant::now();
            if now >= deadline {
                let overrun = now.duration_since(deadline);
                return Err(VecJoinError::DeadlineExceeded {
                    overrun_ms: u64::try_from(overrun.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
        Ok(())
    }

    /// Same as [`Cx::checkpoint`], tracing `msg` when the check fails.
    ///
    /// # Errors
    ///
    /// See [`Cx::checkpoint`].
    pub fn checkpoint_with(&self, msg: &str) -> Result<()> {
        self.checkpoint().inspect_err(|err| {
            tracing::debug!(reason = %err, at = msg, "context checkpoint failed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_passes() {
        let cx = Cx::new();
        assert!(cx.checkpoint().is_ok());
        assert!(!cx.is_cancelled());
    }

    #[test]
    fn cancel_is_shared_by_clones() {
        let cx = Cx::new();
        let other = cx.clone();
        other.cancel();
        assert_eq!(cx.checkpoint(), Err(VecJoinError::Cancelled));
    }

    #[test]
    fn expired_deadline_fails() {
        let cx = Cx::with_deadline(Instant::now());
        let err = cx.checkpoint_with("test").unwrap_err();
        assert!(matches!(err, VecJoinError::DeadlineExceeded { .. }));
    }

    #[test]
    fn future_deadline_passes() {
        let cx = Cx::with_timeout(Duration::from_secs(3600));
        assert!(cx.checkpoint().is_ok());
        assert!(cx.deadline().is_some());
    }
}
