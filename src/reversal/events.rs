//! Transaction Action Events
//!
//! Strongly-typed representation of the "transaction action requested"
//! webhook payload and the reversal request derived from it.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::reversal::classifier::ProviderKind;
use crate::reversal::error::{ReversalWebhookError, ReversalWebhookResult};

const MISSING_TRANSACTION_DATA: &str = "Missing transaction data";

/// Requested action on a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Refund,
    Void,

    // Anything else the platform may add later
    #[serde(other)]
    Unknown,
}

impl FromStr for ActionType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "REFUND" => Self::Refund,
            "VOID" => Self::Void,
            _ => Self::Unknown,
        })
    }
}

impl ActionType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refund => "REFUND",
            Self::Void => "VOID",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Webhook body as delivered by the platform.
///
/// Every field is optional on the wire; [`TransactionActionPayload::validate`]
/// decides what is actually required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionActionPayload {
    #[serde(default)]
    pub transaction: Option<Transaction>,

    #[serde(default)]
    pub action: Option<TransactionAction>,
}

/// Transaction the action refers to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Platform transaction ID, keys the processed-event ledger
    #[serde(default)]
    pub id: Option<String>,

    /// Declared provider type ("mollie", "adyen", "dummy")
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Provider-side payment reference
    #[serde(default)]
    pub reference: Option<String>,

    /// Reference issued by the payment service provider, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psp_reference: Option<String>,

    #[serde(default)]
    pub authorized_amount: Option<AuthorizedAmount>,
}

/// Authorized amount of a transaction; only the currency is used
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedAmount {
    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

/// The requested action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionAction {
    #[serde(default)]
    pub amount: Option<Decimal>,

    #[serde(default)]
    pub action_type: Option<ActionType>,
}

impl TransactionActionPayload {
    /// Parse from raw JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> ReversalWebhookResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ReversalWebhookError::InvalidPayload(e.to_string()))
    }

    /// Check the minimal fields and produce an immutable event.
    ///
    /// Requires a transaction id and type, and a non-zero action amount.
    pub fn validate(self) -> ReversalWebhookResult<TransactionEvent> {
        let missing = || ReversalWebhookError::Validation(MISSING_TRANSACTION_DATA.to_string());

        let transaction = self.transaction.ok_or_else(missing)?;
        let action = self.action.ok_or_else(missing)?;

        let provider_type = non_empty(transaction.kind.as_deref()).ok_or_else(missing)?;
        let amount = action
            .amount
            .filter(|amount| !amount.is_zero())
            .ok_or_else(missing)?;
        let transaction_id = non_empty(transaction.id.as_deref()).ok_or_else(missing)?;

        Ok(TransactionEvent {
            transaction_id: transaction_id.to_string(),
            provider_type: provider_type.to_string(),
            action_type: action.action_type.unwrap_or(ActionType::Unknown),
            amount,
            transaction,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A validated transaction action event
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEvent {
    pub transaction_id: String,
    pub provider_type: String,
    pub action_type: ActionType,
    pub amount: Decimal,
    /// The transaction exactly as delivered
    pub transaction: Transaction,
}

impl TransactionEvent {
    /// Currency of the authorized amount
    pub fn currency(&self) -> Option<&str> {
        self.transaction
            .authorized_amount
            .as_ref()
            .and_then(|a| non_empty(a.currency.as_deref()))
    }
}

/// Reversal handed to a provider gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalRequest {
    /// Reference the provider knows the payment by
    pub id: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psp_reference: Option<String>,
}

impl ReversalRequest {
    /// Build the request a given provider expects.
    ///
    /// Mollie and Adyen address the payment by its reference; the dummy
    /// backend keys refunds by the platform transaction id.
    pub fn for_provider(kind: ProviderKind, event: &TransactionEvent) -> ReversalWebhookResult<Self> {
        let missing = || ReversalWebhookError::Validation(MISSING_TRANSACTION_DATA.to_string());

        let currency = event.currency().ok_or_else(missing)?;
        let id = match kind {
            ProviderKind::Mollie | ProviderKind::Adyen => {
                non_empty(event.transaction.reference.as_deref()).ok_or_else(missing)?
            }
            ProviderKind::Dummy => event.transaction_id.as_str(),
        };

        Ok(Self {
            id: id.to_string(),
            amount: event.amount,
            currency: currency.to_string(),
            psp_reference: event.transaction.psp_reference.clone(),
        })
    }
}
