use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ClientError, Result};

/// Shared "still mounted" flag.
///
/// Cleared exactly once at teardown. Async continuations check it on resumption
/// and drop their result instead of mutating state or firing callbacks.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag. Returns true only for the call that cleared it.
    pub fn kill(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(ClientError::Destroyed)
        }
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}
