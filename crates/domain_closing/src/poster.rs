//! Ledger poster
//!
//! Once every unit of a run is `Completed`, the poster merges the per-date
//! P&L results into the run summary and posts the closing entries as one
//! atomic batch. A conditional `Running -> Posting` transition makes sure only
//! one caller posts, no matter how many observe the finished run.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use core_kernel::{CurrencyCode, PostingBatchId, Precision, RunId};

use crate::account::ReportType;
use crate::balance::DimensionBalances;
use crate::dimension::DimensionSet;
use crate::error::ClosingError;
use crate::gl_entry::GlEntry;
use crate::ports::{ClosingStore, LedgerPort, UnitCounts};
use crate::run::{PeriodClosingVoucher, ProcessingUnit, RunStatus};

/// Attempts at the final `Posting -> Completed` write
const COMPLETION_ATTEMPTS: u32 = 3;
const COMPLETION_RETRY_DELAY: Duration = Duration::from_millis(50);

/// What a successful posting produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingSummary {
    pub run_id: RunId,
    /// Ledger batch, absent when there was nothing to post
    pub batch: Option<PostingBatchId>,
    pub reversing_entries: usize,
    pub closing_entries: usize,
    /// Net P&L balance moved to the closing account, in company currency
    pub net_balance: Decimal,
}

/// Result of asking the poster to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Posted(PostingSummary),
    /// Some units are not `Completed` yet
    NotReady(UnitCounts),
    /// The run was not `Running`, so another caller holds or finished it
    Skipped(RunStatus),
}

/// Merges partial results and posts closing entries
#[derive(Clone)]
pub struct LedgerPoster {
    store: Arc<dyn ClosingStore>,
    ledger: Arc<dyn LedgerPort>,
    dimensions: DimensionSet,
    precision: Precision,
}

impl LedgerPoster {
    pub fn new(
        store: Arc<dyn ClosingStore>,
        ledger: Arc<dyn LedgerPort>,
        dimensions: DimensionSet,
        precision: Precision,
    ) -> Self {
        Self {
            store,
            ledger,
            dimensions,
            precision,
        }
    }

    /// Posts the run's closing entries if every unit is done
    ///
    /// On failure nothing is posted, the run goes back to `Running` and the
    /// call can be repeated; the merge is recomputed from the units each time.
    #[instrument(skip(self))]
    pub async fn summarize_and_post(&self, run_id: RunId) -> Result<PostOutcome, ClosingError> {
        let counts = self.store.unit_counts(run_id).await?;
        if counts.queued > 0 || counts.running > 0 || !counts.all_completed() {
            return Ok(PostOutcome::NotReady(counts));
        }

        let claimed = self
            .store
            .transition_run(run_id, &[RunStatus::Running], RunStatus::Posting)
            .await?;
        if !claimed {
            let run = self
                .store
                .get_run(run_id)
                .await
                .map_err(|e| ClosingError::run_lookup(run_id, e))?;
            info!(status = %run.status, "Run not running, posting skipped");
            return Ok(PostOutcome::Skipped(run.status));
        }

        match self.post(run_id).await {
            Ok(summary) => {
                self.mark_completed(run_id, &summary).await?;
                info!(
                    reversing_entries = summary.reversing_entries,
                    closing_entries = summary.closing_entries,
                    "Closing entries posted, run completed"
                );
                Ok(PostOutcome::Posted(summary))
            }
            Err(err) => {
                error!(error = %err, "Posting failed, returning run to Running");
                if let Err(revert) = self
                    .store
                    .transition_run(run_id, &[RunStatus::Posting], RunStatus::Running)
                    .await
                {
                    warn!(error = %revert, "Could not return run to Running");
                }
                Err(err)
            }
        }
    }

    /// Moves a posted run to `Completed`
    ///
    /// The ledger batch is already committed; the run must not go back to
    /// `Running`. The write is retried instead.
    async fn mark_completed(&self, run_id: RunId, summary: &PostingSummary) -> Result<(), ClosingError> {
        let mut attempt = 1;
        loop {
            match self
                .store
                .transition_run(run_id, &[RunStatus::Posting], RunStatus::Completed)
                .await
            {
                Ok(_) => return Ok(()),
                Err(err) if attempt < COMPLETION_ATTEMPTS => {
                    warn!(attempt, error = %err, "Could not mark run completed, retrying");
                    tokio::time::sleep(COMPLETION_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        batch = ?summary.batch,
                        error = %err,
                        "Closing entries posted but run left in Posting"
                    );
                    return Err(err.into());
                }
            }
        }
    }

    async fn post(&self, run_id: RunId) -> Result<PostingSummary, ClosingError> {
        let run = self
            .store
            .get_run(run_id)
            .await
            .map_err(|e| ClosingError::run_lookup(run_id, e))?;
        let voucher = self
            .store
            .get_voucher(run.voucher_id)
            .await
            .map_err(|e| ClosingError::voucher_lookup(run.voucher_id, e))?;

        let units = self.store.list_units(run_id).await?;
        let summary = summarize(&units)?;
        summary.validate(&self.dimensions)?;
        self.store.store_summary(run_id, &summary).await?;

        let closing_currency = self.ledger.account_currency(&voucher.closing_account_head).await?;
        let entries = build_entries(&voucher, &summary, closing_currency, &self.dimensions, self.precision);

        let reversing_entries = entries
            .iter()
            .filter(|e| e.account != voucher.closing_account_head)
            .count();
        let closing_entries = summary.len();
        let net_balance: Decimal = entries
            .iter()
            .filter(|e| e.account == voucher.closing_account_head)
            .map(GlEntry::net)
            .sum();

        let batch = if entries.is_empty() {
            None
        } else {
            let batch = self
                .ledger
                .post_entries(entries)
                .await
                .map_err(|source| ClosingError::PostingFailed { run_id, source })?;
            Some(batch)
        };

        Ok(PostingSummary {
            run_id,
            batch,
            reversing_entries,
            closing_entries,
            net_balance,
        })
    }
}

/// Merges the partial results of every P&L unit, summing across dates
pub fn summarize(units: &[ProcessingUnit]) -> Result<DimensionBalances, ClosingError> {
    let mut summary = DimensionBalances::new();
    for unit in units.iter().filter(|u| u.report_type == ReportType::ProfitAndLoss) {
        let partial = unit
            .closing_balance
            .as_ref()
            .ok_or_else(|| ClosingError::MissingClosingBalance(unit.key().to_string()))?;
        summary.merge(partial);
    }
    Ok(summary)
}

/// Builds the reversing entries followed by one closing-account entry per key
///
/// Accounts whose net balance rounds to zero get no reversing entry. The
/// closing-account entry is emitted for every key, even when its net is zero,
/// and carries the negated sum of that key's rounded reversals.
pub fn build_entries(
    voucher: &PeriodClosingVoucher,
    summary: &DimensionBalances,
    closing_currency: Option<CurrencyCode>,
    dimensions: &DimensionSet,
    precision: Precision,
) -> Vec<GlEntry> {
    let mut reversing = Vec::new();
    let mut closing = Vec::with_capacity(summary.len());

    for (key, accounts) in summary.iter() {
        let values = dimensions.values_of(key);
        let mut reversed = Decimal::ZERO;
        for (account, balance) in accounts {
            if precision.is_zero(balance.balance_in_company_currency()) {
                continue;
            }
            let entry = GlEntry::pl_reversal(voucher, account, balance, values.clone(), precision);
            reversed += entry.net();
            reversing.push(entry);
        }

        // Mirrors the rounded reversals, not the raw totals
        closing.push(GlEntry::closing_account(
            voucher,
            -reversed,
            closing_currency.clone(),
            values,
            precision,
        ));
    }

    reversing.extend(closing);
    reversing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::AccountBalance;
    use crate::dimension::DimensionKey;
    use chrono::NaiveDate;
    use core_kernel::{ClosingPeriod, VoucherId};
    use rust_decimal_macros::dec;

    fn voucher() -> PeriodClosingVoucher {
        PeriodClosingVoucher {
            id: VoucherId::new(),
            company: "Acme".to_string(),
            period: ClosingPeriod::new(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            )
            .unwrap(),
            fiscal_year: None,
            closing_account_head: "Retained Earnings".to_string(),
            remarks: None,
            is_first_closing: false,
        }
    }

    fn key(cost_center: &str) -> DimensionKey {
        DimensionKey::new(vec![Some(cost_center.to_string()), None, None])
    }

    fn balance(debit: Decimal, credit: Decimal) -> AccountBalance {
        AccountBalance {
            debit,
            credit,
            debit_in_account_currency: debit,
            credit_in_account_currency: credit,
            account_currency: None,
        }
    }

    #[test]
    fn test_zero_net_account_gets_no_reversal_but_key_gets_closing_entry() {
        let mut summary = DimensionBalances::new();
        summary.add(key("Main"), "Sales", &balance(dec!(100), dec!(100)));

        let entries = build_entries(&voucher(), &summary, None, &DimensionSet::standard(), Precision::default());

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].account, "Retained Earnings");
        assert_eq!(entries[0].debit, dec!(0));
        assert_eq!(entries[0].credit, dec!(0));
    }

    #[test]
    fn test_entries_balance_per_key() {
        let mut summary = DimensionBalances::new();
        summary.add(key("Main"), "Sales", &balance(dec!(0), dec!(500)));
        summary.add(key("Main"), "Rent", &balance(dec!(120), dec!(0)));
        summary.add(key("Branch"), "Sales", &balance(dec!(0), dec!(50)));

        let entries = build_entries(&voucher(), &summary, None, &DimensionSet::standard(), Precision::default());

        assert_eq!(entries.len(), 5);
        let net: Decimal = entries.iter().map(GlEntry::net).sum();
        assert_eq!(net, dec!(0));

        let main_closing = entries
            .iter()
            .find(|e| e.account == "Retained Earnings" && e.dimensions.get("cost_center").map(String::as_str) == Some("Main"))
            .unwrap();
        assert_eq!(main_closing.credit, dec!(380));
    }

    #[test]
    fn test_sub_cent_balances_keep_batch_balanced() {
        let mut summary = DimensionBalances::new();
        summary.add(key("Main"), "Sales", &balance(dec!(0), dec!(0.004)));
        summary.add(key("Main"), "Services", &balance(dec!(0), dec!(0.004)));
        summary.add(key("Main"), "Interest", &balance(dec!(0), dec!(0.004)));

        let entries = build_entries(&voucher(), &summary, None, &DimensionSet::standard(), Precision::default());

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].account, "Retained Earnings");
        assert_eq!(entries[0].debit, dec!(0));
        assert_eq!(entries[0].credit, dec!(0));
    }

    #[test]
    fn test_closing_entry_offsets_rounded_reversals() {
        let mut summary = DimensionBalances::new();
        summary.add(key("Main"), "Sales", &balance(dec!(0), dec!(10.005)));
        summary.add(key("Main"), "Services", &balance(dec!(0), dec!(10.005)));
        summary.add(key("Main"), "Rent", &balance(dec!(3.333), dec!(0)));

        let entries = build_entries(&voucher(), &summary, None, &DimensionSet::standard(), Precision::default());

        assert_eq!(entries.len(), 4);
        let net: Decimal = entries.iter().map(GlEntry::net).sum();
        assert_eq!(net, dec!(0));
        for entry in &entries {
            assert_eq!(entry.debit, entry.debit.round_dp(2));
            assert_eq!(entry.credit, entry.credit.round_dp(2));
        }
    }

    #[test]
    fn test_summarize_ignores_balance_sheet_units() {
        let run_id = RunId::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let mut partial = DimensionBalances::new();
        partial.add(key("Main"), "Sales", &balance(dec!(0), dec!(10)));

        let mut pl = ProcessingUnit::queued(run_id, date, ReportType::ProfitAndLoss);
        pl.closing_balance = Some(partial.clone());
        let mut bs = ProcessingUnit::queued(run_id, date, ReportType::BalanceSheet);
        bs.closing_balance = Some(partial);
        let missing = ProcessingUnit::queued(run_id, date, ReportType::BalanceSheet);

        let summary = summarize(&[pl.clone(), bs, missing]).unwrap();
        assert_eq!(summary.totals(&key("Main")).balance_in_company_currency, dec!(-10));

        let mut no_result = pl;
        no_result.closing_balance = None;
        assert!(matches!(
            summarize(&[no_result]),
            Err(ClosingError::MissingClosingBalance(_))
        ));
    }
}
