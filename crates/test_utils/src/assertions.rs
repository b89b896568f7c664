//! Custom Test Assertions
//!
//! Assertion helpers for closing results that print the offending entries or
//! counts instead of a bare `assertion failed`.

use domain_closing::{GlEntry, UnitCounts};
use rust_decimal::Decimal;

/// Asserts that debits equal credits across a batch of entries
pub fn assert_entries_balance(entries: &[GlEntry]) {
    let debit: Decimal = entries.iter().map(|e| e.debit).sum();
    let credit: Decimal = entries.iter().map(|e| e.credit).sum();
    assert_eq!(
        debit, credit,
        "Entries do not balance: debit={}, credit={}, entries={:#?}",
        debit, credit, entries
    );
}

/// Asserts that no entry in the batch touches `account`
pub fn assert_no_entry_for(entries: &[GlEntry], account: &str) {
    let found: Vec<&GlEntry> = entries.iter().filter(|e| e.account == account).collect();
    assert!(
        found.is_empty(),
        "Expected no entries for account '{}', found {:#?}",
        account,
        found
    );
}

/// Returns the only entry for `account` carrying `cost_center`
///
/// # Panics
///
/// Panics unless exactly one entry matches
pub fn single_entry<'a>(entries: &'a [GlEntry], account: &str, cost_center: Option<&str>) -> &'a GlEntry {
    let matches: Vec<&GlEntry> = entries
        .iter()
        .filter(|e| e.account == account && e.dimensions.get("cost_center").map(String::as_str) == cost_center)
        .collect();
    assert_eq!(
        matches.len(),
        1,
        "Expected exactly one entry for account '{}' and cost center {:?}, found {:#?}",
        account,
        cost_center,
        matches
    );
    matches[0]
}

/// Asserts an entry's debit and credit
pub fn assert_entry_amounts(entry: &GlEntry, debit: Decimal, credit: Decimal) {
    assert_eq!(
        (entry.debit, entry.credit),
        (debit, credit),
        "Unexpected amounts on {} entry: debit={}, credit={}",
        entry.account,
        entry.debit,
        entry.credit
    );
}

/// Asserts unit counts as (queued, running, paused, completed)
pub fn assert_unit_counts(counts: &UnitCounts, expected: (u64, u64, u64, u64)) {
    let actual = (counts.queued, counts.running, counts.paused, counts.completed);
    assert_eq!(
        actual, expected,
        "Unit counts (queued, running, paused, completed) differ: actual={:?}, expected={:?}",
        actual, expected
    );
}

/// Asserts that two decimals differ by no more than `tolerance`
pub fn assert_decimal_approx_eq(actual: Decimal, expected: Decimal, tolerance: Decimal) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "Decimals differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual,
        expected,
        diff,
        tolerance
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn entry(account: &str, debit: Decimal, credit: Decimal) -> GlEntry {
        GlEntry::new("Acme", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), account, debit, credit)
    }

    #[test]
    fn test_balanced_entries_pass() {
        assert_entries_balance(&[entry("Sales", dec!(10), dec!(0)), entry("RE", dec!(0), dec!(10))]);
    }

    #[test]
    #[should_panic(expected = "Entries do not balance")]
    fn test_unbalanced_entries_fail() {
        assert_entries_balance(&[entry("Sales", dec!(10), dec!(0))]);
    }

    #[test]
    fn test_single_entry_by_cost_center() {
        let entries = vec![
            entry("Sales", dec!(1), dec!(0)).with_dimension("cost_center", "Main"),
            entry("Sales", dec!(2), dec!(0)),
        ];
        assert_eq!(single_entry(&entries, "Sales", None).debit, dec!(2));
        assert_eq!(single_entry(&entries, "Sales", Some("Main")).debit, dec!(1));
    }

    #[test]
    fn test_unit_counts_tuple() {
        let counts = UnitCounts {
            queued: 1,
            running: 2,
            paused: 3,
            completed: 4,
        };
        assert_unit_counts(&counts, (1, 2, 3, 4));
    }
}
