//! Application assembly
//!
//! Builds the full HTTP application (webhook route plus status endpoints)
//! from configuration. The binary only adds transport concerns on top.

use std::sync::Arc;

use axum::Router;

use crate::error::Result;
use crate::handlers::{status_router, AppState};
use crate::reversal::{
    reversal_webhook_router, EventStore, FileEventStore, Gateways, InMemoryEventStore,
    ReversalDispatcher, ReversalWebhookConfig, ReversalWebhookState, SignatureVerifier,
};

/// Build the application, choosing the ledger backend from
/// `config.ledger_path`
pub async fn build_app(config: ReversalWebhookConfig, stats: Arc<AppState>) -> Result<Router> {
    match config.ledger_path.clone() {
        Some(path) => {
            let store = FileEventStore::open(&path).await?;
            build_app_with_store(config, Arc::new(store), stats)
        }
        None => {
            tracing::warn!("No ledger path configured, processed events are kept in memory only");
            build_app_with_store(config, Arc::new(InMemoryEventStore::new()), stats)
        }
    }
}

/// Build the application on an existing event store
pub fn build_app_with_store<S: EventStore>(
    config: ReversalWebhookConfig,
    store: Arc<S>,
    stats: Arc<AppState>,
) -> Result<Router> {
    let dispatcher = ReversalDispatcher::new(
        store,
        Gateways::from_config(&config)?,
        SignatureVerifier::new(config.webhook_secret.clone()),
        config.provider_timeout,
    );

    let state = Arc::new(ReversalWebhookState::new(config, dispatcher, stats.clone()));
    Ok(reversal_webhook_router(state).merge(status_router(stats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_build_app_serves_status_routes() {
        let app = build_app(ReversalWebhookConfig::test_config(), Arc::new(AppState::new()))
            .await
            .unwrap();

        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_build_app_with_file_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReversalWebhookConfig {
            ledger_path: Some(dir.path().join("ledger.json")),
            ..ReversalWebhookConfig::test_config()
        };

        assert!(build_app(config, Arc::new(AppState::new())).await.is_ok());
    }

    #[tokio::test]
    async fn test_build_app_rejects_corrupt_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        tokio::fs::write(&path, b"").await.unwrap();
        let config = ReversalWebhookConfig {
            ledger_path: Some(path),
            ..ReversalWebhookConfig::test_config()
        };

        let err = build_app(config, Arc::new(AppState::new())).await.unwrap_err();
        assert!(matches!(err, Error::Ledger(_)));
    }
}
