use serde::{Deserialize, Serialize};

use super::LedgerBalance;

/// Result of scanning persisted state for invariant violations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub account_count: i64,
    pub ledger_count: i64,
    pub enrollment_count: i64,
    pub accounts_without_profile: i64,
    pub orphan_enrollments: i64,
    pub inconsistent_ledgers: Vec<LedgerBalance>,
    pub is_valid: bool,
}

/// Build a report from raw counts plus every ledger row.
pub fn build_integrity_report(
    account_count: i64,
    enrollment_count: i64,
    accounts_without_profile: i64,
    orphan_enrollments: i64,
    ledgers: &[LedgerBalance],
) -> IntegrityReport {
    let inconsistent_ledgers: Vec<LedgerBalance> = ledgers
        .iter()
        .filter(|ledger| !ledger.is_consistent())
        .copied()
        .collect();

    let is_valid = accounts_without_profile == 0
        && orphan_enrollments == 0
        && inconsistent_ledgers.is_empty();

    IntegrityReport {
        account_count,
        ledger_count: ledgers.len() as i64,
        enrollment_count,
        accounts_without_profile,
        orphan_enrollments,
        inconsistent_ledgers,
        is_valid,
    }
}
