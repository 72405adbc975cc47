//! Cooperative cancellation for store-touching operations.
//!
//! Every builder and cipher operation takes a [`Context`]. Cancellation is
//! checked before any store mutation, so a cancelled operation never leaves
//! a half-advanced ratchet behind: either the whole call completed and was
//! persisted, or nothing was.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Result, SignalError};

/// Cancellation/deadline token threaded through protocol operations.
///
/// Cloning is cheap; clones observe the same cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Creates a cancellable context and the handle that cancels it.
    #[must_use]
    pub fn cancellable() -> (Self, CancelHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = Self {
            cancelled: Arc::clone(&flag),
            deadline: None,
        };
        (ctx, CancelHandle { cancelled: flag })
    }

    /// Returns a copy of this context that additionally expires at `deadline`.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(match self.deadline {
                Some(existing) => existing.min(deadline),
                None => deadline,
            }),
        }
    }

    /// Whether the context has been cancelled or its deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Fails with [`SignalError::Cancelled`] if the context is no longer live.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SignalError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Cancels the [`Context`] it was created with.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Marks the associated context cancelled. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn background_is_never_cancelled() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn cancel_handle_cancels_all_clones() {
        let (ctx, handle) = Context::cancellable();
        let clone = ctx.clone();
        assert!(clone.check().is_ok());

        handle.cancel();
        assert_eq!(ctx.check(), Err(SignalError::Cancelled));
        assert_eq!(clone.check(), Err(SignalError::Cancelled));
    }

    #[test]
    fn past_deadline_cancels() {
        let ctx = Context::background().with_deadline(Instant::now() - Duration::from_secs(1));
        assert_eq!(ctx.check(), Err(SignalError::Cancelled));
    }
}
