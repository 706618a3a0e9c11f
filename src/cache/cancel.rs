//! Cancellation Module
//!
//! A shared flag checked between per-entry steps of long-running passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{CacheError, Result};

// == Cancellation Flag ==
/// Cloneable handle; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Cancelled` naming `operation` once cancellation was requested.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(CacheError::Cancelled(operation.to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(flag.check("repair").is_ok());

        clone.cancel();

        assert!(flag.is_cancelled());
        assert!(matches!(flag.check("repair"), Err(CacheError::Cancelled(_))));
    }
}
