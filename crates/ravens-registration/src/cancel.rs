//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{RegistrationError, Result};

/// Shared flag polled by a running registration.
///
/// Clones share the same flag, so a token handed to a signal handler or
/// another thread cancels every run it was given to. Runs observe the flag
/// at pyramid-level boundaries, between stages and before publishing
/// artifacts.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RegistrationError::Cancelled)
        } else {
            Ok(())
        }
    }
}
