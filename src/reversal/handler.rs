//! Webhook HTTP surface
//!
//! Turns a delivery into a dispatcher call and the outcome into the
//! structured JSON body the platform expects. The sender always gets a
//! response: 200 on acknowledgment (including replays), 400 on rejection,
//! 500 on execution failure.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{instrument, Instrument};

use crate::handlers::AppState;
use crate::reversal::config::ReversalWebhookConfig;
use crate::reversal::dispatcher::{DispatchOutcome, InboundEvent, ReversalDispatcher};
use crate::reversal::error::ReversalWebhookError;
use crate::reversal::gateway::ApiContext;
use crate::reversal::idempotency::EventStore;

/// Body of every webhook response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookResponse {
    pub fn acknowledged(outcome: &DispatchOutcome) -> Self {
        Self {
            success: true,
            message: outcome.message().map(str::to_string),
        }
    }

    pub fn failed(err: &ReversalWebhookError) -> Self {
        Self {
            success: false,
            message: Some(err.public_message()),
        }
    }
}

/// Shared state of the webhook route
pub struct ReversalWebhookState<S: EventStore> {
    pub config: ReversalWebhookConfig,
    pub dispatcher: ReversalDispatcher<S>,
    pub stats: Arc<AppState>,
}

impl<S: EventStore> ReversalWebhookState<S> {
    pub fn new(
        config: ReversalWebhookConfig,
        dispatcher: ReversalDispatcher<S>,
        stats: Arc<AppState>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            stats,
        }
    }

    fn api_context(&self, headers: &HeaderMap) -> ApiContext {
        let from_header = headers
            .get(self.config.api_url_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        ApiContext {
            api_url: from_header.or_else(|| self.config.default_api_url.clone()),
        }
    }
}

/// Webhook endpoint handler.
///
/// # Route
/// `POST` on the configured webhook path
///
/// # Response
/// - `200 OK` `{"success": true}` when the event was handled or already was
/// - `400 Bad Request` `{"success": false, "message": ...}` on missing data or signature
/// - `500 Internal Server Error` when the provider call failed; the event may be redelivered
#[instrument(skip_all, fields(delivery_id = %uuid::Uuid::new_v4()))]
pub async fn reversal_webhook_handler<S: EventStore>(
    State(state): State<Arc<ReversalWebhookState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    state.stats.record_event_received();

    let signature_header = headers
        .get(state.config.signature_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let api = state.api_context(&headers);

    let result = match InboundEvent::from_bytes(body, signature_header, api) {
        Ok(inbound) => {
            // Detached so a sender that hangs up cannot cancel a refund halfway
            let task_state = state.clone();
            let task = tokio::spawn(
                async move { task_state.dispatcher.dispatch(inbound).await }
                    .instrument(tracing::debug_span!("dispatch")),
            );
            match task.await {
                Ok(result) => result,
                Err(e) => Err(ReversalWebhookError::Execution(format!(
                    "dispatch task failed: {e}"
                ))),
            }
        }
        Err(e) => Err(e),
    };

    state.stats.record_latency(started.elapsed());

    match result {
        Ok(outcome) => {
            state.stats.record_outcome(&outcome);
            (StatusCode::OK, Json(WebhookResponse::acknowledged(&outcome))).into_response()
        }
        Err(err) => {
            let status = err.status_code();
            if status.is_client_error() {
                state.stats.record_rejection();
            } else {
                state.stats.record_error();
            }
            (status, Json(WebhookResponse::failed(&err))).into_response()
        }
    }
}

/// Router serving the webhook on the configured path
pub fn reversal_webhook_router<S: EventStore>(state: Arc<ReversalWebhookState<S>>) -> Router {
    let path = state.config.webhook_path.clone();
    Router::new()
        .route(&path, post(reversal_webhook_handler::<S>))
        .with_state(state)
}
