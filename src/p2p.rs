// 💸 Large Peer-to-Peer Detector
// High-value transfers that mention a consumer P2P payment service

use crate::config::DetectorConfig;
use crate::transaction::{FraudType, PossibleFraudInstance, Transaction};
use tracing::warn;

pub const DEFAULT_P2P_THRESHOLD: f64 = 100.0;

pub const DEFAULT_P2P_SERVICES: [&str; 5] = ["venmo", "zelle", "cash app", "paypal", "apple cash"];

#[derive(Debug, Clone)]
pub struct LargeP2pDetector {
    /// Inclusive lower bound on |amount|
    pub threshold: f64,

    /// Lower-cased service names matched as substrings
    services: Vec<String>,
}

impl LargeP2pDetector {
    pub fn new() -> Self {
        Self::with_services(
            DEFAULT_P2P_THRESHOLD,
            DEFAULT_P2P_SERVICES.iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn with_services(threshold: f64, services: Vec<String>) -> Self {
        LargeP2pDetector {
            threshold,
            services: services
                .into_iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::with_services(config.p2p_threshold, config.p2p_services.clone())
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Evaluate every transaction; one finding per qualifying transaction.
    pub fn detect(&self, transactions: &[Transaction]) -> Vec<PossibleFraudInstance> {
        transactions
            .iter()
            .filter(|tx| self.qualifies(tx))
            .map(|tx| PossibleFraudInstance::single(tx.clone(), FraudType::LargeP2p))
            .collect()
    }

    fn qualifies(&self, tx: &Transaction) -> bool {
        let large = match tx.magnitude_at_least(self.threshold) {
            Some(large) => large,
            None => {
                warn!(id = %tx.id, amount = %tx.amount, "skipping transaction with unparsable amount");
                return false;
            }
        };

        large && self.mentions_service(tx)
    }

    fn mentions_service(&self, tx: &Transaction) -> bool {
        tx.text_fields().iter().any(|field| {
            let lower = field.to_lowercase();
            self.services.iter().any(|service| lower.contains(service.as_str()))
        })
    }
}

impl Default for LargeP2pDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_transaction(id: &str, amount: &str, payee: &str) -> Transaction {
        Transaction::new(id, 1, amount, "Transfer", payee, "")
    }

    #[test]
    fn test_large_venmo_is_flagged() {
        let detector = LargeP2pDetector::new();
        let findings = detector.detect(&[create_test_transaction("a", "-150.00", "Venmo")]);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].fraud_type, FraudType::LargeP2p);
        assert_eq!(findings[0].transactions[0].id, "a");
    }

    #[test]
    fn test_below_threshold_is_ignored() {
        let detector = LargeP2pDetector::new();
        assert!(detector.detect(&[create_test_transaction("a", "-50.00", "Venmo")]).is_empty());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let detector = LargeP2pDetector::new();
        assert_eq!(detector.detect(&[create_test_transaction("a", "100.00", "Zelle")]).len(), 1);
    }

    #[test]
    fn test_threshold_compares_exact_decimals() {
        let detector = LargeP2pDetector::new();
        let just_below = create_test_transaction("a", "-99.999999999999999999", "Venmo");
        let just_above = create_test_transaction("b", "100.000000000000000001", "Venmo");

        let findings = detector.detect(&[just_below, just_above]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].transactions[0].id, "b");
    }

    #[test]
    fn test_without_service_is_ignored() {
        let detector = LargeP2pDetector::new();
        assert!(detector.detect(&[create_test_transaction("a", "-150.00", "Acme Corp")]).is_empty());
    }

    #[test]
    fn test_every_transaction_is_scanned() {
        let detector = LargeP2pDetector::new();
        let txs = vec![
            create_test_transaction("a", "-150.00", "Venmo"),
            create_test_transaction("b", "-20.00", "Acme Corp"),
            create_test_transaction("c", "-300.00", "PAYPAL *JOHN"),
            create_test_transaction("d", "250.00", "Zelle payment"),
        ];

        let ids: Vec<String> = detector
            .detect(&txs)
            .into_iter()
            .map(|f| f.transactions[0].id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_service_in_memo_or_description() {
        let detector = LargeP2pDetector::new();
        let mut in_memo = Transaction::new("m", 1, "-500", "Online transfer", "J. Smith", "sent via Cash App");
        let in_description = Transaction::new("d", 1, "-500", "APPLE CASH SENT MONEY", "", "");

        let findings = detector.detect(&[in_memo.clone(), in_description]);
        assert_eq!(findings.len(), 2);

        in_memo.memo = "rent".to_string();
        assert!(detector.detect(&[in_memo]).is_empty());
    }

    #[test]
    fn test_unparsable_amount_is_skipped() {
        let detector = LargeP2pDetector::new();
        assert!(detector.detect(&[create_test_transaction("a", "lots", "Venmo")]).is_empty());
    }

    #[test]
    fn test_custom_services() {
        let detector = LargeP2pDetector::with_services(10.0, vec![" Wise ".to_string(), "".to_string()]);
        assert_eq!(detector.services(), &["wise".to_string()]);
        assert_eq!(detector.detect(&[create_test_transaction("a", "-11", "WISE TRANSFER")]).len(), 1);
    }
}
