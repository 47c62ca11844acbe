// 🧾 Transaction Model - immutable transaction record + fraud findings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ============================================================================
// TRANSACTION
// ============================================================================

/// One bank transaction as delivered by the aggregation source.
///
/// All fields are always present (possibly empty). `amount` is kept as the
/// source text so duplicate matching can compare it exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque upstream identifier (never generated locally)
    pub id: String,

    /// Seconds since epoch, the sole sort key
    pub posted: i64,

    /// Signed decimal as text, e.g. "-42.50"
    pub amount: String,

    pub description: String,
    pub payee: String,
    pub memo: String,
}

impl Transaction {
    pub fn new(
        id: &str,
        posted: i64,
        amount: &str,
        description: &str,
        payee: &str,
        memo: &str,
    ) -> Self {
        Transaction {
            id: id.to_string(),
            posted,
            amount: amount.to_string(),
            description: description.to_string(),
            payee: payee.to_string(),
            memo: memo.to_string(),
        }
    }

    /// Absolute value of `amount`, or None when it is not a decimal number
    pub fn magnitude(&self) -> Option<f64> {
        parse_magnitude(&self.amount)
    }

    /// Exact |amount| >= threshold check, None when `amount` is not a decimal number
    pub fn magnitude_at_least(&self, threshold: f64) -> Option<bool> {
        magnitude_at_least(&self.amount, threshold)
    }

    /// `posted` as a UTC timestamp (None if out of chrono's range)
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.posted, 0)
    }

    /// The three free-text fields, in the order detectors inspect them
    pub fn text_fields(&self) -> [&str; 3] {
        [&self.payee, &self.memo, &self.description]
    }
}

/// Strip one leading sign and parse the remainder as a decimal number.
pub fn parse_magnitude(amount: &str) -> Option<f64> {
    unsigned_decimal(amount)?.parse::<f64>().ok()
}

/// Whether |amount| >= threshold, compared digit by digit rather than in f64.
///
/// None when `amount` is not a decimal number.
pub fn magnitude_at_least(amount: &str, threshold: f64) -> Option<bool> {
    let digits = unsigned_decimal(amount)?;
    if !threshold.is_finite() || threshold <= 0.0 {
        return parse_magnitude(amount).map(|m| m >= threshold);
    }

    // f64's Display never uses exponent notation
    let bound = threshold.to_string();
    Some(compare_decimals(digits, &bound) != Ordering::Less)
}

/// The amount without its sign, if it is digits with at most one dot.
fn unsigned_decimal(amount: &str) -> Option<&str> {
    let trimmed = amount.trim();
    let unsigned = trimmed
        .strip_prefix('-')
        .or_else(|| trimmed.strip_prefix('+'))
        .unwrap_or(trimmed);

    // f64::from_str also accepts "inf", "NaN" and exponents; amounts are plain decimals
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in unsigned.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return None,
        }
    }

    seen_digit.then_some(unsigned)
}

/// Compare two unsigned decimal strings exactly.
fn compare_decimals(a: &str, b: &str) -> Ordering {
    let (a_int, a_frac) = a.split_once('.').unwrap_or((a, ""));
    let (b_int, b_frac) = b.split_once('.').unwrap_or((b, ""));

    let a_int = a_int.trim_start_matches('0');
    let b_int = b_int.trim_start_matches('0');

    a_int
        .len()
        .cmp(&b_int.len())
        .then_with(|| a_int.cmp(b_int))
        .then_with(|| a_frac.trim_end_matches('0').cmp(b_frac.trim_end_matches('0')))
}

// ============================================================================
// FRAUD TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudType {
    /// Same amount, memo, payee and description under different ids
    Duplicate,

    /// Payee/memo/description judged vague, foreign or high-risk
    SuspiciousPayee,

    /// High-value transfer through a consumer P2P service
    LargeP2p,
}

impl FraudType {
    /// Wire name, identical to the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudType::Duplicate => "duplicate",
            FraudType::SuspiciousPayee => "suspicious_payee",
            FraudType::LargeP2p => "large_p2p",
        }
    }
}

impl fmt::Display for FraudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// POSSIBLE FRAUD INSTANCE
// ============================================================================

/// A finding: one detector's claim that these transactions deserve review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PossibleFraudInstance {
    pub transactions: Vec<Transaction>,
    pub fraud_type: FraudType,
}

impl PossibleFraudInstance {
    pub fn single(transaction: Transaction, fraud_type: FraudType) -> Self {
        PossibleFraudInstance {
            transactions: vec![transaction],
            fraud_type,
        }
    }

    pub fn duplicate_pair(first: Transaction, second: Transaction) -> Self {
        PossibleFraudInstance {
            transactions: vec![first, second],
            fraud_type: FraudType::Duplicate,
        }
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.transactions.iter().any(|tx| tx.id == id)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_strips_leading_sign() {
        assert_eq!(parse_magnitude("-42.50"), Some(42.5));
        assert_eq!(parse_magnitude("+7"), Some(7.0));
        assert_eq!(parse_magnitude("150.00"), Some(150.0));
    }

    #[test]
    fn test_magnitude_rejects_non_decimal() {
        assert_eq!(parse_magnitude(""), None);
        assert_eq!(parse_magnitude("-"), None);
        assert_eq!(parse_magnitude("--5"), None);
        assert_eq!(parse_magnitude("$5.00"), None);
        assert_eq!(parse_magnitude("1e3"), None);
        assert_eq!(parse_magnitude("NaN"), None);
        assert_eq!(parse_magnitude("1.2.3"), None);
    }

    #[test]
    fn test_magnitude_at_least_is_exact() {
        assert_eq!(magnitude_at_least("-100.00", 100.0), Some(true));
        assert_eq!(magnitude_at_least("100", 100.0), Some(true));
        assert_eq!(magnitude_at_least("0100.000", 100.0), Some(true));
        assert_eq!(magnitude_at_least("-99.99", 100.0), Some(false));
        assert_eq!(magnitude_at_least("-99.999999999999999999", 100.0), Some(false));
        assert_eq!(magnitude_at_least("100.000000000000000001", 100.0), Some(true));
        assert_eq!(magnitude_at_least("1000", 100.0), Some(true));
        assert_eq!(magnitude_at_least("12.5", 12.25), Some(true));
        assert_eq!(magnitude_at_least("12.2", 12.25), Some(false));
        assert_eq!(magnitude_at_least(".5", 0.5), Some(true));
        assert_eq!(magnitude_at_least("3", 0.0), Some(true));
        assert_eq!(magnitude_at_least("abc", 100.0), None);
    }

    #[test]
    fn test_fraud_type_serializes_snake_case() {
        let json = serde_json::to_string(&FraudType::SuspiciousPayee).unwrap();
        assert_eq!(json, "\"suspicious_payee\"");

        let parsed: FraudType = serde_json::from_str("\"large_p2p\"").unwrap();
        assert_eq!(parsed, FraudType::LargeP2p);
        assert_eq!(FraudType::Duplicate.to_string(), "duplicate");
    }

    #[test]
    fn test_finding_round_trips_through_json() {
        let finding = PossibleFraudInstance::duplicate_pair(
            Transaction::new("a", 100, "-25.00", "", "Cafe X", "coffee"),
            Transaction::new("b", 200, "-25.00", "", "Cafe X", "coffee"),
        );

        let value = serde_json::to_value(&finding).unwrap();
        assert_eq!(value["fraud_type"], "duplicate");
        assert_eq!(value["transactions"][1]["id"], "b");
        assert!(finding.contains_id("a"));
        assert!(!finding.contains_id("c"));
    }

    #[test]
    fn test_posted_at() {
        let tx = Transaction::new("a", 86_400, "1.00", "", "", "");
        let at = tx.posted_at().unwrap();
        assert_eq!(at.format("%Y-%m-%d").to_string(), "1970-01-02");
    }
}
