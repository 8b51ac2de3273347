//! Error types for the reversal webhook service
//!
//! Each concern has its own `thiserror` enum in [`crate::reversal::error`];
//! this module gathers the ones that can abort application startup behind
//! one crate-level error.

use thiserror::Error;

use crate::reversal::error::{LedgerError, ReversalWebhookError};

/// The main error type for the service
#[derive(Error, Debug)]
pub enum Error {
    /// Webhook pipeline errors, including invalid configuration
    #[error("Webhook error: {0}")]
    Webhook(#[from] ReversalWebhookError),

    /// Processed-event ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err: Error = LedgerError::Truncated("ledger.json".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Ledger error: Ledger file ledger.json is empty, refusing to start with an empty ledger"
        );
    }

    #[test]
    fn test_webhook_error() {
        let err: Error = ReversalWebhookError::Config("timeout must be positive".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Webhook error: Configuration error: timeout must be positive"
        );
    }
}
