//! Reversal Webhook - Idempotent Payment Reversal Dispatcher
//!
//! This crate provides an HTTP service that receives "transaction action
//! requested" webhooks and executes the requested refund or void against
//! the payment provider owning the transaction.
//!
//! # Features
//!
//! - **Webhook Intake**: axum route with signature verification
//! - **Idempotency**: durable per-transaction ledger of processed signatures
//! - **Provider Routing**: Mollie, Adyen and a dummy provider behind one gateway trait
//! - **Status Endpoints**: health, readiness and dispatcher counters
//!
//! # Architecture
//!
//! ```text
//! Platform ──▶ Webhook Handler ──▶ Reversal Dispatcher
//!                                   │     │      │
//!                                   ▼     ▼      ▼
//!                           Signature  Ledger  Gateways
//!                                              ├─ Mollie
//!                                              ├─ Adyen
//!                                              └─ Dummy
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod app;
pub mod error;
pub mod handlers;
pub mod reversal;

// Re-exports for convenience
pub use app::{build_app, build_app_with_store};
pub use error::{Error, Result};
pub use reversal::{
    reversal_webhook_router, ReversalDispatcher, ReversalWebhookConfig, ReversalWebhookState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
