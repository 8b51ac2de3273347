// Allow missing docs in this module - field-level docs are kept where they add information
#![allow(missing_docs)]

//! Payment Reversal Webhook Module
//!
//! Handles "transaction action requested" webhooks: a platform asks for a
//! refund or void of a transaction, and the request is executed against
//! the payment provider that owns the transaction, exactly once.
//!
//! - **Signature Verification**: the signature header is required; with a
//!   configured secret it must be the HMAC-SHA256 of the body
//! - **Idempotency**: per-transaction ledger of processed signatures, with an
//!   atomic claim so concurrent redeliveries execute once
//! - **Routing**: closed match over {Mollie, Adyen, Dummy} and {REFUND, VOID}
//! - **Failure Isolation**: provider errors, timeouts and panics become a 500
//!   and leave the ledger untouched, so redelivery is safe
//!
//! # Architecture
//!
//! ```text
//! Request -> Validate -> Signature -> Ledger claim -> Route -> Gateway -> Append -> 200
//!               |            |             |             |         |
//!               v            v             v             v         v
//!              400          400      200 (replay)   200 (no-op)   500
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reversal_webhook::handlers::AppState;
//! use reversal_webhook::reversal::{
//!     reversal_webhook_router, Gateways, InMemoryEventStore, ReversalDispatcher,
//!     ReversalWebhookConfig, ReversalWebhookState, SignatureVerifier,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ReversalWebhookConfig::from_env()?;
//! let dispatcher = ReversalDispatcher::new(
//!     Arc::new(InMemoryEventStore::new()),
//!     Gateways::from_config(&config)?,
//!     SignatureVerifier::new(config.webhook_secret.clone()),
//!     config.provider_timeout,
//! );
//! let state = ReversalWebhookState::new(config, dispatcher, Arc::new(AppState::new()));
//! let app = reversal_webhook_router(Arc::new(state));
//! // ... serve with axum
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod gateway;
pub mod handler;
pub mod idempotency;
pub mod signature;

// Re-export commonly used items
pub use classifier::{classify, ProviderKind};
pub use config::ReversalWebhookConfig;
pub use dispatcher::{
    DispatchOutcome, ErrorReporter, InboundEvent, ReversalDispatcher, Route, TracingReporter,
};
pub use error::{
    GatewayError, GatewayResult, LedgerError, LedgerResult, ReversalWebhookError,
    ReversalWebhookResult, SignatureError,
};
pub use events::{ActionType, ReversalRequest, Transaction, TransactionActionPayload, TransactionEvent};
pub use gateway::{
    ApiContext, DummyGateway, Gateways, ProviderGateway, RemoteGateway, ReversalContext,
    UnconfiguredGateway,
};
pub use handler::{reversal_webhook_handler, reversal_webhook_router, ReversalWebhookState, WebhookResponse};
pub use idempotency::{Claim, EventStore, FileEventStore, InMemoryEventStore};
pub use signature::{Signature, SignatureVerifier};
