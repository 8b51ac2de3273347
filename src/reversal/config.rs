//! Reversal webhook configuration
//!
//! Loaded from environment variables; the webhook secret is never logged.
//!
//! - `REVERSAL_WEBHOOK_SECRET`: HMAC secret for payload signatures (optional)
//! - `REVERSAL_SIGNATURE_HEADER`: signature header name (default `saleor-signature`)
//! - `REVERSAL_API_URL_HEADER`: header carrying the platform API URL (default `saleor-api-url`)
//! - `REVERSAL_DEFAULT_API_URL`: API URL used when the header is absent
//! - `REVERSAL_WEBHOOK_PATH`: route the webhook is served on
//! - `REVERSAL_PROVIDER_TIMEOUT_SECS`: provider call timeout (default 30)
//! - `REVERSAL_LEDGER_PATH`: JSON ledger file; in-memory ledger when unset
//! - `MOLLIE_GATEWAY_URL`, `ADYEN_GATEWAY_URL`: provider adapter endpoints

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::reversal::error::{ReversalWebhookError, ReversalWebhookResult};

pub const DEFAULT_SIGNATURE_HEADER: &str = "saleor-signature";
pub const DEFAULT_API_URL_HEADER: &str = "saleor-api-url";
pub const DEFAULT_WEBHOOK_PATH: &str = "/api/webhooks/transaction-action-requested";
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Configuration for the reversal webhook
#[derive(Clone)]
pub struct ReversalWebhookConfig {
    /// HMAC secret; presence-only signature checks when `None`
    pub webhook_secret: Option<String>,
    pub signature_header: String,
    pub api_url_header: String,
    pub default_api_url: Option<String>,
    pub webhook_path: String,
    /// Upper bound on a single provider call
    pub provider_timeout: Duration,
    pub ledger_path: Option<PathBuf>,
    pub mollie_gateway_url: Option<String>,
    pub adyen_gateway_url: Option<String>,
}

impl fmt::Debug for ReversalWebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReversalWebhookConfig")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("signature_header", &self.signature_header)
            .field("api_url_header", &self.api_url_header)
            .field("default_api_url", &self.default_api_url)
            .field("webhook_path", &self.webhook_path)
            .field("provider_timeout", &self.provider_timeout)
            .field("ledger_path", &self.ledger_path)
            .field("mollie_gateway_url", &self.mollie_gateway_url)
            .field("adyen_gateway_url", &self.adyen_gateway_url)
            .finish()
    }
}

impl Default for ReversalWebhookConfig {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            api_url_header: DEFAULT_API_URL_HEADER.to_string(),
            default_api_url: None,
            webhook_path: DEFAULT_WEBHOOK_PATH.to_string(),
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            ledger_path: None,
            mollie_gateway_url: None,
            adyen_gateway_url: None,
        }
    }
}

impl ReversalWebhookConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ReversalWebhookResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> ReversalWebhookResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let webhook_secret = get("REVERSAL_WEBHOOK_SECRET");
        if webhook_secret.is_none() {
            tracing::warn!("REVERSAL_WEBHOOK_SECRET not set, only signature presence is checked");
        }

        let provider_timeout = match get("REVERSAL_PROVIDER_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|e| {
                    ReversalWebhookError::Config(format!(
                        "REVERSAL_PROVIDER_TIMEOUT_SECS must be an integer: {e}"
                    ))
                })?;
                if secs == 0 {
                    return Err(ReversalWebhookError::Config(
                        "REVERSAL_PROVIDER_TIMEOUT_SECS must be greater than 0".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => defaults.provider_timeout,
        };

        let webhook_path = get("REVERSAL_WEBHOOK_PATH").unwrap_or(defaults.webhook_path);
        if !webhook_path.starts_with('/') {
            return Err(ReversalWebhookError::Config(format!(
                "REVERSAL_WEBHOOK_PATH must start with '/': {webhook_path}"
            )));
        }

        Ok(Self {
            webhook_secret,
            signature_header: get("REVERSAL_SIGNATURE_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or(defaults.signature_header),
            api_url_header: get("REVERSAL_API_URL_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or(defaults.api_url_header),
            default_api_url: get("REVERSAL_DEFAULT_API_URL"),
            webhook_path,
            provider_timeout,
            ledger_path: get("REVERSAL_LEDGER_PATH").map(PathBuf::from),
            mollie_gateway_url: get("MOLLIE_GATEWAY_URL"),
            adyen_gateway_url: get("ADYEN_GATEWAY_URL"),
        })
    }

    /// Configuration for tests: short timeout, no secret, in-memory ledger
    pub fn test_config() -> Self {
        Self {
            provider_timeout: Duration::from_millis(500),
            ..Self::default()
        }
    }
}
