// 🏷️ Payee Rules - Rules as Data
// Deterministic suspicious-payee classifier: pattern rules + a script heuristic

use crate::classifier::PayeeClassifier;
use crate::error::DetectionError;
use crate::transaction::{FraudType, PossibleFraudInstance, Transaction};
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayeeRule {
    /// Rule ID for tracking
    pub id: String,

    /// Pattern to match (supports wildcards with *)
    pub pattern: String,

    /// Why a match is suspicious
    pub reason: String,

    /// Priority (higher = applied first)
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    0
}

impl PayeeRule {
    pub fn new(id: &str, pattern: &str, reason: &str) -> Self {
        PayeeRule {
            id: id.to_string(),
            pattern: pattern.to_string(),
            reason: reason.to_string(),
            priority: 0,
        }
    }

    /// Check if pattern matches the given text
    pub fn matches(&self, text: &str) -> bool {
        let pattern_lower = self.pattern.to_lowercase();
        let text_lower = text.to_lowercase();

        if !pattern_lower.contains('*') {
            return text_lower.contains(&pattern_lower);
        }

        let parts: Vec<&str> = pattern_lower.split('*').collect();
        let first = parts[0];
        let last = parts[parts.len() - 1];

        if !text_lower.starts_with(first) || !text_lower.ends_with(last) {
            return false;
        }
        if first.len() + last.len() > text_lower.len() {
            return false;
        }

        // Middle parts must appear in order between the anchors
        let mut current_pos = first.len();
        let limit = text_lower.len() - last.len();
        for part in &parts[1..parts.len() - 1] {
            if part.is_empty() {
                continue;
            }
            match text_lower[current_pos..limit].find(part) {
                Some(pos) => current_pos += pos + part.len(),
                None => return false,
            }
        }

        true
    }
}

// ============================================================================
// RULE ENGINE
// ============================================================================

pub struct RuleEngine {
    rules: Vec<PayeeRule>,
}

impl RuleEngine {
    /// Create a new empty rule engine
    pub fn new() -> Self {
        RuleEngine { rules: Vec::new() }
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let rules: Vec<PayeeRule> = serde_json::from_str(&content)
            .context("Failed to parse rules JSON")?;

        Ok(RuleEngine::from_rules(rules))
    }

    /// Create engine from a list of rules
    pub fn from_rules(mut rules: Vec<PayeeRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        RuleEngine { rules }
    }

    /// High-risk jurisdictions and their common spellings in card descriptors
    pub fn with_default_rules() -> Self {
        let jurisdiction = "references a high-risk jurisdiction";
        RuleEngine::from_rules(vec![
            PayeeRule::new("north-korea", "north korea", jurisdiction),
            PayeeRule::new("dprk", "dprk", jurisdiction),
            PayeeRule::new("pyongyang", "pyongyang", jurisdiction),
            PayeeRule::new("russia", "russia", jurisdiction),
            PayeeRule::new("moscow", "moscow", jurisdiction),
            PayeeRule::new("ru-suffix", "*.ru", jurisdiction),
            PayeeRule::new("china", "china", jurisdiction),
            PayeeRule::new("shenzhen", "shenzhen", jurisdiction),
            PayeeRule::new("cn-suffix", "*.cn", jurisdiction),
        ])
    }

    /// Add a single rule
    pub fn add_rule(&mut self, rule: PayeeRule) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// First matching rule, highest priority first
    pub fn classify(&self, text: &str) -> Option<&PayeeRule> {
        self.rules.iter().find(|rule| rule.matches(text))
    }

    /// Get number of rules loaded
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SCRIPT HEURISTIC
// ============================================================================

/// True when most alphabetic characters are outside ASCII (Cyrillic, Han, ...)
pub fn looks_non_english(text: &str) -> bool {
    let (ascii, other) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(a, o), c| {
            if c.is_ascii() { (a + 1, o) } else { (a, o + 1) }
        });

    other > 0 && other >= ascii
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Deterministic stand-in for the remote classifier
pub struct RulePayeeClassifier {
    engine: RuleEngine,
}

impl RulePayeeClassifier {
    pub fn new(engine: RuleEngine) -> Self {
        RulePayeeClassifier { engine }
    }

    /// Reason the transaction is suspicious, if any
    pub fn judge(&self, tx: &Transaction) -> Option<String> {
        for field in tx.text_fields() {
            if let Some(rule) = self.engine.classify(field) {
                return Some(format!("{} ({})", rule.reason, rule.id));
            }
        }

        tx.text_fields()
            .iter()
            .any(|field| looks_non_english(field))
            .then(|| "written in a non-Latin script".to_string())
    }
}

impl Default for RulePayeeClassifier {
    fn default() -> Self {
        Self::new(RuleEngine::with_default_rules())
    }
}

impl PayeeClassifier for RulePayeeClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    fn classify(&self, batch: &[Transaction]) -> Result<Vec<PossibleFraudInstance>, DetectionError> {
        Ok(batch
            .iter()
            .filter(|tx| self.judge(tx).is_some())
            .map(|tx| PossibleFraudInstance::single(tx.clone(), FraudType::SuspiciousPayee))
            .collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pattern_match() {
        let rule = PayeeRule::new("test1", "MOSCOW", "jurisdiction");

        assert!(rule.matches("OOO MOSCOW TRADE"));
        assert!(rule.matches("moscow"));
        assert!(!rule.matches("AMAZON"));
    }

    #[test]
    fn test_wildcard_pattern() {
        let rule = PayeeRule::new("test2", "*.ru", "jurisdiction");

        assert!(rule.matches("shop.ru"));
        assert!(rule.matches("PAYMENT MAGAZIN.RU"));
        assert!(!rule.matches("shop.ru/cart"));
    }

    #[test]
    fn test_wildcard_anchors_do_not_overlap() {
        let rule = PayeeRule::new("t", "ab*ba", "x");
        assert!(rule.matches("abba"));
        assert!(!rule.matches("aba"));
    }

    #[test]
    fn test_wildcard_middle_parts_in_order() {
        let rule = PayeeRule::new("t", "wire*bank*ltd", "x");
        assert!(rule.matches("WIRE TO SHANGHAI BANK LTD"));
        assert!(!rule.matches("WIRE LTD BANK LTD2"));
    }

    #[test]
    fn test_rule_priority() {
        let mut engine = RuleEngine::new();
        engine.add_rule(PayeeRule { priority: 1, ..PayeeRule::new("general", "trading", "generic") });
        engine.add_rule(PayeeRule { priority: 100, ..PayeeRule::new("specific", "shenzhen trading", "specific") });

        let rule = engine.classify("SHENZHEN TRADING CO").unwrap();
        assert_eq!(rule.id, "specific");
        assert_eq!(engine.rule_count(), 2);
    }

    #[test]
    fn test_no_match() {
        let engine = RuleEngine::with_default_rules();
        assert!(engine.classify("Whole Foods Market").is_none());
    }

    #[test]
    fn test_rules_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(
            &path,
            r#"[{"id": "offshore", "pattern": "offshore*", "reason": "offshore entity", "priority": 5}]"#,
        )
        .unwrap();

        let engine = RuleEngine::from_file(&path).unwrap();
        assert_eq!(engine.classify("Offshore Holdings").unwrap().id, "offshore");
    }

    #[test]
    fn test_looks_non_english() {
        assert!(looks_non_english("ООО Ромашка"));
        assert!(looks_non_english("深圳贸易"));
        assert!(!looks_non_english("Café Noir"));
        assert!(!looks_non_english(""));
        assert!(!looks_non_english("12345"));
    }

    #[test]
    fn test_classifier_flags_only_suspicious() {
        let classifier = RulePayeeClassifier::default();
        let batch = vec![
            Transaction::new("ok", 3, "-12.00", "Groceries", "Whole Foods", ""),
            Transaction::new("geo", 2, "-900.00", "Wire", "Shenzhen Trading Co", ""),
            Transaction::new("script", 1, "-40.00", "Покупка", "", ""),
        ];

        let findings = classifier.classify(&batch).unwrap();
        let ids: Vec<&str> = findings.iter().map(|f| f.transactions[0].id.as_str()).collect();
        assert_eq!(ids, vec!["geo", "script"]);
        assert!(findings.iter().all(|f| f.fraud_type == FraudType::SuspiciousPayee));

        assert!(classifier.judge(&batch[1]).unwrap().contains("shenzhen"));
    }
}
