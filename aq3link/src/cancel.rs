//! Cooperative cancellation for long transfers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag checked by transfer loops between blocks.
///
/// Clones share the same flag, so the embedding application can keep one
/// clone (for example in a Ctrl-C handler) and hand another to the transfer.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Clear a previous request so the token can be reused.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_default_false() {
        assert!(!CancelToken::new().is_cancelled());
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let handle = token.clone();
        handle.cancel();
        assert!(token.is_cancelled());

        token.reset();
        assert!(!handle.is_cancelled());
    }
}
