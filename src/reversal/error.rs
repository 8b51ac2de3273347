//! Reversal Webhook Errors
//!
//! Error taxonomy for the webhook pipeline. Validation problems are the
//! sender's fault and map to 400; anything that goes wrong while talking to
//! a provider or the ledger maps to 500 so the platform redelivers.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors surfaced by the reversal webhook pipeline
#[derive(Error, Debug)]
pub enum ReversalWebhookError {
    /// Required transaction/action data or the signature is missing
    #[error("{0}")]
    Validation(String),

    /// Body could not be parsed as a transaction action payload
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Provider call failed, timed out or panicked
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Event store failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Configuration problem
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReversalWebhookError {
    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::Execution(_) | Self::Ledger(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the platform may redeliver the same event and expect a different result
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution(_) | Self::Ledger(_))
    }

    /// Message returned to the webhook sender
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::InvalidPayload(_) => "Invalid payload".to_string(),
            Self::Execution(_) | Self::Ledger(_) | Self::Config(_) => {
                "Error while processing event".to_string()
            }
        }
    }
}

/// Result type for the reversal webhook pipeline
pub type ReversalWebhookResult<T> = std::result::Result<T, ReversalWebhookError>;

/// Errors from a provider gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Provider rejected the reversal
    #[error("{provider} rejected the reversal: {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Provider-supplied reason
        message: String,
    },

    /// Could not reach the provider
    #[error("Transport error: {0}")]
    Transport(String),

    /// Call exceeded the configured timeout
    #[error("Provider call timed out after {0}ms")]
    Timeout(u64),

    /// No backend configured for this provider
    #[error("No gateway configured for {0}")]
    NotConfigured(String),

    /// Gateway panicked while handling the reversal
    #[error("Gateway panicked: {0}")]
    Panicked(String),
}

/// Result type for gateway calls
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Errors from the processed-event ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Reading or writing the ledger file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ledger file is not valid JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Ledger file exists but is empty
    #[error("Ledger file {0} is empty, refusing to start with an empty ledger")]
    Truncated(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Signature header problems
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Header absent or blank
    #[error("Missing signature")]
    Missing,

    /// Header does not match the HMAC of the body
    #[error("Invalid signature")]
    Mismatch,
}

impl From<SignatureError> for ReversalWebhookError {
    fn from(err: SignatureError) -> Self {
        ReversalWebhookError::Validation(err.to_string())
    }
}

impl From<GatewayError> for ReversalWebhookError {
    fn from(err: GatewayError) -> Self {
        ReversalWebhookError::Execution(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let err = ReversalWebhookError::Validation("Missing signature".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Missing signature");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_execution_hides_details() {
        let err: ReversalWebhookError = GatewayError::Transport("connection refused".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Error while processing event");
        assert!(err.to_string().contains("connection refused"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_signature_error_is_validation() {
        let err: ReversalWebhookError = SignatureError::Mismatch.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Invalid signature");
    }

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Provider {
            provider: "mollie".to_string(),
            message: "refund amount too high".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "mollie rejected the reversal: refund amount too high"
        );
        assert_eq!(
            GatewayError::Timeout(1500).to_string(),
            "Provider call timed out after 1500ms"
        );
    }
}
