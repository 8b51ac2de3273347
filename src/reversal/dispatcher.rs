//! Reversal dispatching
//!
//! Takes one delivered event from intake to acknowledgment. Unlike the
//! background processors elsewhere in the service, a reversal is executed
//! while the platform waits, so the response tells it whether to redeliver.
//!
//! # Flow
//!
//! ```text
//! Received
//!     |
//!     v
//! [Validate data + signature] --> missing? --> Rejected (400)
//!     |
//!     v
//! [Ledger lookup + claim] --> seen / in flight? --> Acknowledged (200)
//!     |
//!     v
//! [Route by action + provider] --> void / unsupported --> record, Acknowledged (200)
//!     |
//!     v
//! [Gateway call under timeout] --> error / timeout / panic --> release, Failed (500)
//!     |
//!     v
//! [Append signature to ledger] --> Acknowledged (200)
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use futures::FutureExt;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::reversal::classifier::{classify, ProviderKind};
use crate::reversal::error::{GatewayError, ReversalWebhookError, ReversalWebhookResult};
use crate::reversal::events::{ActionType, ReversalRequest, TransactionActionPayload, TransactionEvent};
use crate::reversal::gateway::{ApiContext, Gateways, ReversalContext};
use crate::reversal::idempotency::{Claim, EventStore};
use crate::reversal::signature::{Signature, SignatureVerifier};

/// A delivery as received over HTTP
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub payload: TransactionActionPayload,
    pub signature_header: Option<String>,
    pub api: ApiContext,
    /// Raw body, needed for HMAC verification
    pub body: Bytes,
}

impl InboundEvent {
    /// Parse a raw delivery
    pub fn from_bytes(
        body: Bytes,
        signature_header: Option<String>,
        api: ApiContext,
    ) -> ReversalWebhookResult<Self> {
        let payload = TransactionActionPayload::from_bytes(&body)?;
        Ok(Self {
            payload,
            signature_header,
            api,
            body,
        })
    }
}

/// Where a validated event goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Refund through the provider's gateway
    Refund(ProviderKind),
    /// Void is recognized but no provider supports it yet
    VoidUnsupported(ProviderKind),
    /// No provider or no known action: nothing to do
    Unsupported,
}

impl Route {
    pub fn resolve(action: ActionType, provider: Option<ProviderKind>) -> Self {
        match (action, provider) {
            (ActionType::Refund, Some(kind)) => Self::Refund(kind),
            (ActionType::Void, Some(kind)) => Self::VoidUnsupported(kind),
            (ActionType::Unknown, _) | (_, None) => Self::Unsupported,
        }
    }
}

/// Pipeline stage, used in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    Validated,
    Deduplicated,
    Routed,
    Executed,
    Acknowledged,
}

impl DispatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Deduplicated => "deduplicated",
            Self::Routed => "routed",
            Self::Executed => "executed",
            Self::Acknowledged => "acknowledged",
        }
    }
}

/// How an acknowledged event was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Refund executed and recorded
    Processed(ProviderKind),
    /// Signature already in the ledger
    AlreadyProcessed,
    /// Another delivery of the same event is being processed
    InFlight,
    /// Void for a provider without void support
    VoidNotSupported(ProviderKind),
    /// Unknown provider or action
    Unsupported,
}

impl DispatchOutcome {
    /// Extra message for the acknowledgment body
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Self::Processed(_) => None,
            Self::AlreadyProcessed => Some("Event already processed"),
            Self::InFlight => Some("Event is already being processed"),
            Self::VoidNotSupported(_) => Some("Void is not supported for this provider yet"),
            Self::Unsupported => Some("Unsupported transaction action"),
        }
    }

    /// Whether a provider was called for this delivery
    pub fn executed(&self) -> bool {
        matches!(self, Self::Processed(_))
    }

    /// Whether this delivery was a replay of a handled event
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::AlreadyProcessed | Self::InFlight)
    }
}

/// Observability collaborator for failures caught at the dispatcher boundary
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, error: &ReversalWebhookError, transaction_id: &str);
}

/// Reports failures as `error` level tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, err: &ReversalWebhookError, transaction_id: &str) {
        error!(
            transaction_id = %transaction_id,
            error = %err,
            retryable = err.is_retryable(),
            "Error while processing event"
        );
    }
}

/// Orchestrates verify, deduplicate, route, execute, record
pub struct ReversalDispatcher<S: EventStore> {
    store: Arc<S>,
    gateways: Gateways,
    verifier: SignatureVerifier,
    reporter: Arc<dyn ErrorReporter>,
    provider_timeout: Duration,
}

impl<S: EventStore> ReversalDispatcher<S> {
    pub fn new(
        store: Arc<S>,
        gateways: Gateways,
        verifier: SignatureVerifier,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateways,
            verifier,
            reporter: Arc::new(TracingReporter),
            provider_timeout,
        }
    }

    /// Replace the error reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn gateways(&self) -> &Gateways {
        &self.gateways
    }

    /// Handle one delivery.
    ///
    /// `Err` is either a validation rejection (nothing was touched) or an
    /// execution failure (the ledger was not updated, redelivery is safe).
    pub async fn dispatch(&self, event: InboundEvent) -> ReversalWebhookResult<DispatchOutcome> {
        debug!(state = DispatchState::Received.as_str(), "Transaction action received");

        let InboundEvent {
            payload,
            signature_header,
            api,
            body,
        } = event;

        let transaction_event = payload.validate().map_err(|e| {
            warn!(error = %e, "Received webhook call without transaction data");
            e
        })?;
        let signature = self
            .verifier
            .verify_payload(signature_header.as_deref(), &body)
            .map_err(|e| {
                warn!(
                    transaction_id = %transaction_event.transaction_id,
                    error = %e,
                    "Rejected webhook signature"
                );
                e
            })?;

        let transaction_id = transaction_event.transaction_id.clone();
        debug!(
            state = DispatchState::Validated.as_str(),
            transaction_id = %transaction_id,
            signature = %signature.redacted(),
            action = transaction_event.action_type.as_str(),
            "Transaction action validated"
        );

        match self.deduplicate(&transaction_id, &signature).await {
            Ok(Claim::Acquired) => {}
            Ok(Claim::AlreadyProcessed) => {
                info!(
                    transaction_id = %transaction_id,
                    signature = %signature.redacted(),
                    "Event already processed"
                );
                return Ok(DispatchOutcome::AlreadyProcessed);
            }
            Ok(Claim::InFlight) => {
                info!(
                    transaction_id = %transaction_id,
                    signature = %signature.redacted(),
                    "Event already in flight"
                );
                return Ok(DispatchOutcome::InFlight);
            }
            Err(e) => return Err(self.fail(e, &transaction_id)),
        }
        let claim = ClaimGuard::new(self.store.clone(), &transaction_id, &signature);
        debug!(
            state = DispatchState::Deduplicated.as_str(),
            transaction_id = %transaction_id,
            "Event claimed"
        );

        let result = self
            .route_and_execute(&transaction_event, &signature, api)
            .await;

        match result {
            Ok(outcome) => {
                if let Err(e) = self.store.append(&transaction_id, &[signature.clone()]).await {
                    claim.release().await;
                    return Err(self.fail(e.into(), &transaction_id));
                }
                claim.committed();
                info!(
                    state = DispatchState::Acknowledged.as_str(),
                    transaction_id = %transaction_id,
                    signature = %signature.redacted(),
                    outcome = ?outcome,
                    "Reversal processing complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                claim.release().await;
                match e {
                    ReversalWebhookError::Validation(_) => {
                        warn!(transaction_id = %transaction_id, error = %e, "Cannot build reversal");
                        Err(e)
                    }
                    other => Err(self.fail(other, &transaction_id)),
                }
            }
        }
    }

    /// Ledger lookup followed by an atomic claim
    async fn deduplicate(
        &self,
        transaction_id: &str,
        signature: &Signature,
    ) -> ReversalWebhookResult<Claim> {
        let processed = self.store.get_processed(transaction_id).await?;
        if processed.contains(signature) {
            return Ok(Claim::AlreadyProcessed);
        }
        Ok(self.store.claim(transaction_id, signature).await?)
    }

    async fn route_and_execute(
        &self,
        event: &TransactionEvent,
        signature: &Signature,
        api: ApiContext,
    ) -> ReversalWebhookResult<DispatchOutcome> {
        let route = Route::resolve(event.action_type, classify(&event.transaction));
        debug!(
            state = DispatchState::Routed.as_str(),
            transaction_id = %event.transaction_id,
            route = ?route,
            "Event routed"
        );

        match route {
            Route::Refund(kind) => {
                let reversal = ReversalRequest::for_provider(kind, event)?;
                let context = ReversalContext {
                    api,
                    reversal,
                    transaction: event.transaction.clone(),
                };
                self.execute(kind, &context).await?;
                debug!(
                    state = DispatchState::Executed.as_str(),
                    transaction_id = %event.transaction_id,
                    signature = %signature.redacted(),
                    provider = %kind,
                    "Refund executed"
                );
                Ok(DispatchOutcome::Processed(kind))
            }
            Route::VoidUnsupported(kind) => {
                warn!(
                    transaction_id = %event.transaction_id,
                    provider = %kind,
                    "Void is not supported yet, skipping provider call"
                );
                Ok(DispatchOutcome::VoidNotSupported(kind))
            }
            Route::Unsupported => {
                info!(
                    transaction_id = %event.transaction_id,
                    provider_type = %event.provider_type,
                    action = event.action_type.as_str(),
                    "Unsupported transaction action, nothing to do"
                );
                Ok(DispatchOutcome::Unsupported)
            }
        }
    }

    /// Call the gateway with a timeout, turning panics into errors
    async fn execute(&self, kind: ProviderKind, context: &ReversalContext) -> ReversalWebhookResult<()> {
        let gateway = self.gateways.get(kind);
        let call = AssertUnwindSafe(gateway.handle_reversal(context)).catch_unwind();

        let result = match timeout(self.provider_timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(GatewayError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(GatewayError::Timeout(self.provider_timeout.as_millis() as u64)),
        };

        result.map_err(ReversalWebhookError::from)
    }

    fn fail(&self, err: ReversalWebhookError, transaction_id: &str) -> ReversalWebhookError {
        self.reporter.report(&err, transaction_id);
        err
    }
}

/// Reservation of a (transaction, signature) pair held while a delivery is
/// being executed.
///
/// Dropping the guard without [`ClaimGuard::committed`] or
/// [`ClaimGuard::release`] (the dispatch future was cancelled, e.g. the
/// sender hung up) releases the reservation on the runtime, so a later
/// redelivery is not answered with `InFlight` forever.
struct ClaimGuard<S: EventStore> {
    store: Arc<S>,
    transaction_id: String,
    signature: Signature,
    held: bool,
}

impl<S: EventStore> ClaimGuard<S> {
    fn new(store: Arc<S>, transaction_id: &str, signature: &Signature) -> Self {
        Self {
            store,
            transaction_id: transaction_id.to_string(),
            signature: signature.clone(),
            held: true,
        }
    }

    /// The signature was appended, which dropped the reservation
    fn committed(mut self) {
        self.held = false;
    }

    async fn release(mut self) {
        release_claim(self.store.as_ref(), &self.transaction_id, &self.signature).await;
        self.held = false;
    }
}

impl<S: EventStore> Drop for ClaimGuard<S> {
    fn drop(&mut self) {
        if !self.held {
            return;
        }

        warn!(
            transaction_id = %self.transaction_id,
            signature = %self.signature.redacted(),
            "Dispatch cancelled while holding a claim, releasing it"
        );

        let store = self.store.clone();
        let transaction_id = std::mem::take(&mut self.transaction_id);
        let signature = self.signature.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    release_claim(store.as_ref(), &transaction_id, &signature).await;
                });
            }
            Err(_) => error!(
                transaction_id = %transaction_id,
                "No runtime to release a cancelled claim"
            ),
        }
    }
}

async fn release_claim<S: EventStore>(store: &S, transaction_id: &str, signature: &Signature) {
    if let Err(e) = store.release(transaction_id, signature).await {
        error!(
            transaction_id = %transaction_id,
            error = %e,
            "Failed to release event claim"
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
