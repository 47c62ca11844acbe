// 🧭 Detection Orchestrator
// Fans one transaction set out to every detector and concatenates findings
// in the order duplicate → suspicious_payee → large_p2p.

use crate::classifier::{LlmPayeeClassifier, OpenAiCompletionClient, PayeeClassifier};
use crate::config::EngineConfig;
use crate::duplicates::DuplicateDetector;
use crate::error::DetectionError;
use crate::normalizer::import_transactions;
use crate::p2p::LargeP2pDetector;
use crate::rules::RulePayeeClassifier;
use crate::transaction::{FraudType, PossibleFraudInstance, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic;
use std::thread;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

// ============================================================================
// REPORT
// ============================================================================

/// A detector that could not contribute to the pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorWarning {
    /// Which kind of finding is missing from the report
    pub detector: FraudType,
    pub error: String,
    pub recoverable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Correlates log lines of one pass
    pub scan_id: Uuid,
    pub scanned_at: DateTime<Utc>,
    pub findings: Vec<PossibleFraudInstance>,
    #[serde(default)]
    pub warnings: Vec<DetectorWarning>,
}

impl DetectionReport {
    /// Some detector degraded; findings are incomplete
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn findings_of(&self, fraud_type: FraudType) -> impl Iterator<Item = &PossibleFraudInstance> {
        self.findings.iter().filter(move |f| f.fraud_type == fraud_type)
    }

    pub fn count_of(&self, fraud_type: FraudType) -> usize {
        self.findings_of(fraud_type).count()
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Stateless across passes; safe to share between concurrent callers.
pub struct DetectionEngine {
    duplicates: DuplicateDetector,
    p2p: LargeP2pDetector,
    classifier: Box<dyn PayeeClassifier>,
}

impl DetectionEngine {
    pub fn new(classifier: Box<dyn PayeeClassifier>) -> Self {
        Self::with_detectors(DuplicateDetector::new(), LargeP2pDetector::new(), classifier)
    }

    pub fn with_detectors(
        duplicates: DuplicateDetector,
        p2p: LargeP2pDetector,
        classifier: Box<dyn PayeeClassifier>,
    ) -> Self {
        DetectionEngine { duplicates, p2p, classifier }
    }

    /// Wire up detectors from configuration.
    ///
    /// Uses the remote classifier when an API key is configured, otherwise
    /// falls back to the built-in payee rules.
    pub fn from_config(config: &EngineConfig) -> Result<Self, DetectionError> {
        let classifier: Box<dyn PayeeClassifier> = if config.classifier.api_key.is_some() {
            let client = OpenAiCompletionClient::new(&config.classifier)?;
            Box::new(LlmPayeeClassifier::new(client))
        } else {
            warn!("no LLM_API_KEY configured; using rule-based payee classifier");
            Box::new(RulePayeeClassifier::default())
        };

        Ok(Self::with_detectors(
            DuplicateDetector::new(),
            LargeP2pDetector::from_config(&config.detectors),
            classifier,
        ))
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Run every detector; a failing classifier degrades to a warning.
    pub fn detect_all(&self, transactions: &[Transaction]) -> DetectionReport {
        let scan_id = Uuid::new_v4();
        let span = info_span!("scan", %scan_id);
        let _guard = span.enter();

        info!(transactions = transactions.len(), classifier = self.classifier.name(), "detection pass started");

        let (duplicates, suspicious, large_p2p) = self.run_detectors(transactions);

        let mut findings = duplicates;
        let mut warnings = Vec::new();
        match suspicious {
            Ok(found) => findings.extend(found),
            Err(err) => {
                warn!(error = %err, "suspicious payee detector degraded");
                warnings.push(DetectorWarning {
                    detector: FraudType::SuspiciousPayee,
                    error: err.to_string(),
                    recoverable: err.is_recoverable(),
                });
            }
        }
        findings.extend(large_p2p);

        info!(findings = findings.len(), warnings = warnings.len(), "detection pass finished");

        DetectionReport {
            scan_id,
            scanned_at: Utc::now(),
            findings,
            warnings,
        }
    }

    /// Like `detect_all`, but a classifier failure fails the whole call.
    pub fn detect_all_strict(&self, transactions: &[Transaction]) -> Result<Vec<PossibleFraudInstance>, DetectionError> {
        let (duplicates, suspicious, large_p2p) = self.run_detectors(transactions);

        let mut findings = duplicates;
        findings.extend(suspicious?);
        findings.extend(large_p2p);
        Ok(findings)
    }

    /// Normalize raw records, then `detect_all`. Malformed input is fatal.
    pub fn scan_raw(&self, raw: &[Value]) -> Result<DetectionReport, DetectionError> {
        let transactions = import_transactions(raw)?;
        Ok(self.detect_all(&transactions))
    }

    /// The classifier may block on the network, so it runs on its own
    /// thread while the local detectors run here.
    fn run_detectors(
        &self,
        transactions: &[Transaction],
    ) -> (
        Vec<PossibleFraudInstance>,
        Result<Vec<PossibleFraudInstance>, DetectionError>,
        Vec<PossibleFraudInstance>,
    ) {
        let span = tracing::Span::current();

        thread::scope(|scope| {
            let classifier = &self.classifier;
            let remote = scope.spawn(move || {
                let _guard = span.enter();
                classifier.classify(transactions)
            });

            let duplicates = self.duplicates.detect(transactions);
            debug!(count = duplicates.len(), "duplicate detector finished");

            let large_p2p = self.p2p.detect(transactions);
            debug!(count = large_p2p.len(), "large p2p detector finished");

            let suspicious = remote.join().unwrap_or_else(|payload| panic::resume_unwind(payload));
            if let Ok(found) = &suspicious {
                debug!(count = found.len(), "suspicious payee detector finished");
            }

            (duplicates, suspicious, large_p2p)
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
