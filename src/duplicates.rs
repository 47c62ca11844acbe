// 🔍 Duplicate Detector - accidental double charges
// Bucket by exact amount, then pair records with identical memo/payee/description

use crate::transaction::{PossibleFraudInstance, Transaction};
use std::collections::HashMap;

// ============================================================================
// DUPLICATE DETECTOR
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector;

impl DuplicateDetector {
    pub fn new() -> Self {
        DuplicateDetector
    }

    /// Find duplicate pairs in a transaction list.
    ///
    /// Within each amount bucket the last unconsumed record becomes the
    /// target and is compared against the remaining records in order. Each
    /// match is emitted as `[target, record]` and the record is consumed, so
    /// three identical charges yield two findings, never three.
    pub fn detect(&self, transactions: &[Transaction]) -> Vec<PossibleFraudInstance> {
        let mut findings = Vec::new();

        for bucket in bucket_by_amount(transactions) {
            if bucket.len() < 2 {
                continue;
            }
            self.pair_bucket(&bucket, &mut findings);
        }

        findings
    }

    fn pair_bucket(&self, bucket: &[&Transaction], findings: &mut Vec<PossibleFraudInstance>) {
        let mut consumed = vec![false; bucket.len()];

        for target_idx in (0..bucket.len()).rev() {
            if consumed[target_idx] {
                continue;
            }
            consumed[target_idx] = true;
            let target = bucket[target_idx];

            for idx in 0..target_idx {
                if consumed[idx] || !same_charge(target, bucket[idx]) {
                    continue;
                }
                consumed[idx] = true;
                findings.push(PossibleFraudInstance::duplicate_pair(
                    target.clone(),
                    bucket[idx].clone(),
                ));
            }
        }
    }
}

/// Group transactions by exact amount text, buckets in first-seen order
fn bucket_by_amount(transactions: &[Transaction]) -> Vec<Vec<&Transaction>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut buckets: Vec<Vec<&Transaction>> = Vec::new();

    for tx in transactions {
        let slot = *index.entry(tx.amount.as_str()).or_insert_with(|| {
            buckets.push(Vec::new());
            buckets.len() - 1
        });
        buckets[slot].push(tx);
    }

    buckets
}

/// Case-sensitive, exact comparison; id and posted are ignored
fn same_charge(a: &Transaction, b: &Transaction) -> bool {
    a.memo == b.memo && a.payee == b.payee && a.description == b.description
}

// ============================================================================
// TESTS
// ============================================================================
