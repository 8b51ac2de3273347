//! Provider gateways
//!
//! Narrow interface to the payment-provider integrations. The dispatcher
//! only ever calls [`ProviderGateway::handle_reversal`]; how a provider
//! actually moves money lives behind it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::reversal::classifier::ProviderKind;
use crate::reversal::config::ReversalWebhookConfig;
use crate::reversal::error::{GatewayError, GatewayResult, ReversalWebhookError, ReversalWebhookResult};
use crate::reversal::events::{ReversalRequest, Transaction};

/// Platform installation the event came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiContext {
    /// GraphQL API URL of the sending platform
    pub api_url: Option<String>,
}

impl ApiContext {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: Some(api_url.into()),
        }
    }
}

/// Everything a gateway gets to perform one reversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalContext {
    pub api: ApiContext,
    pub reversal: ReversalRequest,
    pub transaction: Transaction,
}

/// A payment provider backend
#[async_trait::async_trait]
pub trait ProviderGateway: Send + Sync + 'static {
    /// Provider name used in logs and errors
    fn name(&self) -> &'static str;

    /// Execute a refund against the provider
    async fn handle_reversal(&self, context: &ReversalContext) -> GatewayResult<()>;
}

// =============================================================================
// Dummy
// =============================================================================

/// Simulated provider: always succeeds unless told to fail.
///
/// Keeps every reversal it received so tests can assert on them.
#[derive(Debug, Default)]
pub struct DummyGateway {
    received: Mutex<Vec<ReversalContext>>,
    fail: AtomicBool,
}

impl DummyGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail with a provider error
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Reversals handled so far
    pub fn received(&self) -> Vec<ReversalContext> {
        self.received.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().len()
    }
}

#[async_trait::async_trait]
impl ProviderGateway for DummyGateway {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn handle_reversal(&self, context: &ReversalContext) -> GatewayResult<()> {
        self.received.lock().push(context.clone());

        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Provider {
                provider: self.name().to_string(),
                message: "simulated failure".to_string(),
            });
        }

        tracing::info!(
            reversal_id = %context.reversal.id,
            amount = %context.reversal.amount,
            currency = %context.reversal.currency,
            "Dummy reversal recorded"
        );
        Ok(())
    }
}

// =============================================================================
// Remote
// =============================================================================

/// Forwards reversals to a provider adapter service over HTTP
#[derive(Debug, Clone)]
pub struct RemoteGateway {
    name: &'static str,
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl RemoteGateway {
    /// Create a gateway posting to `endpoint`
    pub fn new(
        name: &'static str,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> ReversalWebhookResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReversalWebhookError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            name,
            endpoint: endpoint.into(),
            client,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl ProviderGateway for RemoteGateway {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle_reversal(&self, context: &ReversalContext) -> GatewayResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(context)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", body.trim())
        };

        Err(GatewayError::Provider {
            provider: self.name.to_string(),
            message,
        })
    }
}

// =============================================================================
// Unconfigured
// =============================================================================

/// Placeholder for a provider without a backend; every call fails
#[derive(Debug, Clone, Copy)]
pub struct UnconfiguredGateway {
    kind: ProviderKind,
}

impl UnconfiguredGateway {
    pub fn new(kind: ProviderKind) -> Self {
        Self { kind }
    }
}

#[async_trait::async_trait]
impl ProviderGateway for UnconfiguredGateway {
    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    async fn handle_reversal(&self, _context: &ReversalContext) -> GatewayResult<()> {
        Err(GatewayError::NotConfigured(self.kind.to_string()))
    }
}

// =============================================================================
// Registry
// =============================================================================

/// One gateway per provider kind
#[derive(Clone)]
pub struct Gateways {
    mollie: Arc<dyn ProviderGateway>,
    adyen: Arc<dyn ProviderGateway>,
    dummy: Arc<dyn ProviderGateway>,
}

impl std::fmt::Debug for Gateways {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateways")
            .field("mollie", &self.mollie.name())
            .field("adyen", &self.adyen.name())
            .field("dummy", &self.dummy.name())
            .finish()
    }
}

impl Gateways {
    pub fn new(
        mollie: Arc<dyn ProviderGateway>,
        adyen: Arc<dyn ProviderGateway>,
        dummy: Arc<dyn ProviderGateway>,
    ) -> Self {
        Self {
            mollie,
            adyen,
            dummy,
        }
    }

    /// Build gateways from configuration.
    ///
    /// Mollie and Adyen use a [`RemoteGateway`] when their URL is set and an
    /// [`UnconfiguredGateway`] otherwise.
    pub fn from_config(config: &ReversalWebhookConfig) -> ReversalWebhookResult<Self> {
        let remote = |kind: ProviderKind, url: &Option<String>| -> ReversalWebhookResult<Arc<dyn ProviderGateway>> {
            Ok(match url {
                Some(url) => Arc::new(RemoteGateway::new(kind.as_str(), url, config.provider_timeout)?),
                None => {
                    tracing::warn!(provider = %kind, "No gateway URL configured, refunds will fail");
                    Arc::new(UnconfiguredGateway::new(kind))
                }
            })
        };

        Ok(Self {
            mollie: remote(ProviderKind::Mollie, &config.mollie_gateway_url)?,
            adyen: remote(ProviderKind::Adyen, &config.adyen_gateway_url)?,
            dummy: Arc::new(DummyGateway::new()),
        })
    }

    /// Gateway owning a provider kind
    pub fn get(&self, kind: ProviderKind) -> &Arc<dyn ProviderGateway> {
        match kind {
            ProviderKind::Mollie => &self.mollie,
            ProviderKind::Adyen => &self.adyen,
            ProviderKind::Dummy => &self.dummy,
        }
    }
}
