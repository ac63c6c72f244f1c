//! Cancellation of an in-flight controller setup

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::{AudioError, AudioResult};

/// Shared cancel flag for [`EngineController::start`](super::EngineController::start)
///
/// Clones share the same flag. Setup checks it before committing each
/// partially built resource.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(AudioError::Cancelled)` once cancellation was requested
    pub fn check(&self) -> AudioResult<()> {
        if self.is_cancelled() {
            Err(AudioError::Cancelled)
        } else {
            Ok(())
        }
    }
}
