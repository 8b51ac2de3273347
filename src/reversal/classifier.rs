//! Provider classification
//!
//! Decides which payment-provider backend owns a transaction. Every kind has
//! its own predicate; a transaction belongs to a provider only when exactly
//! one predicate matches.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reversal::events::Transaction;

/// Payment provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Mollie,
    Adyen,
    Dummy,
}

impl ProviderKind {
    /// Every provider, in classification order
    pub const ALL: [ProviderKind; 3] = [Self::Mollie, Self::Adyen, Self::Dummy];

    /// Transaction type string that identifies this provider
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mollie => "mollie",
            Self::Adyen => "adyen",
            Self::Dummy => "dummy",
        }
    }

    /// Whether the transaction was declared as belonging to this provider
    pub fn matches(&self, transaction: &Transaction) -> bool {
        transaction
            .kind
            .as_deref()
            .map(|kind| kind.trim().eq_ignore_ascii_case(self.as_str()))
            .unwrap_or(false)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a transaction.
///
/// Returns `None` when no predicate (or more than one) matches; callers
/// treat that as an unsupported provider.
pub fn classify(transaction: &Transaction) -> Option<ProviderKind> {
    let mut matching = ProviderKind::ALL
        .iter()
        .copied()
        .filter(|kind| kind.matches(transaction));

    match (matching.next(), matching.next()) {
        (Some(kind), None) => Some(kind),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction(kind: Option<&str>) -> Transaction {
        Transaction {
            id: Some("T1".to_string()),
            kind: kind.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_each_provider() {
        assert_eq!(classify(&transaction(Some("mollie"))), Some(ProviderKind::Mollie));
        assert_eq!(classify(&transaction(Some("adyen"))), Some(ProviderKind::Adyen));
        assert_eq!(classify(&transaction(Some("dummy"))), Some(ProviderKind::Dummy));
    }

    #[test]
    fn test_classify_ignores_case_and_whitespace() {
        assert_eq!(classify(&transaction(Some(" Mollie "))), Some(ProviderKind::Mollie));
        assert_eq!(classify(&transaction(Some("ADYEN"))), Some(ProviderKind::Adyen));
    }

    #[test]
    fn test_unmatched_provider() {
        assert_eq!(classify(&transaction(Some("stripe"))), None);
        assert_eq!(classify(&transaction(Some("mollie-adyen"))), None);
        assert_eq!(classify(&transaction(None)), None);
    }

    #[test]
    fn test_predicates_are_mutually_exclusive() {
        for kind in ProviderKind::ALL {
            let tx = transaction(Some(kind.as_str()));
            let matches = ProviderKind::ALL.iter().filter(|k| k.matches(&tx)).count();
            assert_eq!(matches, 1, "{kind} should match exactly one predicate");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ProviderKind::Adyen.to_string(), "adyen");
    }
}
