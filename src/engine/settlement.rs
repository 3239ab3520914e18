//! Lazy catch-up settlement.
//!
//! The aggregate ledger walks every version in `(latest, target]`, one accrual step per
//! version boundary, folding due pending changes as it goes. Accounts settle lazily
//! afterwards by differencing the recorded accumulators, so an account that has been
//! idle for many versions replays them in constant work.
//!
//! Planning is pure with respect to ledger state: it returns the new entry and the
//! records to append, and the caller commits them only after every collaborator call
//! for the request has succeeded.

use super::accrual::{self, AccrualParams, AccrualStep};
use super::history::{History, HistoryView, VersionRecord};
use super::ledger::LedgerEntry;
use crate::config::ProductParams;
use crate::domain::{
    Accumulator, AccountId, Fixed, Position, ProductId, Version, VersionSnapshot,
};
use crate::error::LedgerError;
use crate::external::{OracleError, OracleVersion, PriceOracle};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use tracing::debug;

/// Iterator over the oracle versions in `(after, through]`.
///
/// Stopping early and resuming from the last yielded version visits the same versions
/// as a single pass.
pub struct VersionSteps<'a> {
    oracle: &'a dyn PriceOracle,
    range: RangeInclusive<u64>,
}

impl<'a> VersionSteps<'a> {
    pub fn new(oracle: &'a dyn PriceOracle, after: Version, through: Version) -> Self {
        let range = match after.as_u64().checked_add(1) {
            Some(start) => start..=through.as_u64(),
            #[allow(clippy::reversed_empty_ranges)]
            None => 1..=0,
        };
        Self { oracle, range }
    }
}

impl Iterator for VersionSteps<'_> {
    type Item = Result<OracleVersion, OracleError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.range
            .next()
            .map(|v| self.oracle.at_version(Version::new(v)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

/// What one aggregate settlement did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSettlement {
    pub product: ProductId,
    pub from: Version,
    pub to: Version,
    /// Funding fee withheld across all steps.
    pub funding_fee: Fixed,
    /// Position fees charged on pending changes folded during the settlement.
    pub position_fee: Fixed,
    /// Total reported to the collateral service.
    pub fee: Fixed,
    pub value_delta: Accumulator,
    pub share_delta: Accumulator,
    /// Aggregate settled position at `to`.
    pub position: Position,
    pub steps: Vec<AccrualStep>,
}

impl ProductSettlement {
    fn noop(product: &ProductId, entry: &LedgerEntry) -> Self {
        Self {
            product: product.clone(),
            from: entry.latest_version,
            to: entry.latest_version,
            funding_fee: Fixed::ZERO,
            position_fee: Fixed::ZERO,
            fee: Fixed::ZERO,
            value_delta: Accumulator::zero(),
            share_delta: Accumulator::zero(),
            position: entry.position,
            steps: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// What one account settlement did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSettlement {
    pub account: AccountId,
    pub from: Version,
    pub to: Version,
    /// Signed amount for the collateral service, net of position fees.
    pub delta: Fixed,
    pub position_fee: Fixed,
    /// Time share earned, for the incentive distributor.
    pub share: Fixed,
    /// Account settled position at `to`.
    pub position: Position,
}

impl AccountSettlement {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

pub(crate) struct GlobalPlan {
    pub settlement: ProductSettlement,
    pub entry: LedgerEntry,
    pub records: Vec<VersionRecord>,
    pub snapshots: Vec<VersionSnapshot>,
}

impl GlobalPlan {
    pub fn commit(self, history: &mut History, entry: &mut LedgerEntry) -> ProductSettlement {
        for record in self.records {
            history.append(record);
        }
        for snapshot in self.snapshots {
            history.append_snapshot(snapshot);
        }
        *entry = self.entry;
        self.settlement
    }
}

pub(crate) struct AccountPlan {
    pub settlement: AccountSettlement,
    pub entry: LedgerEntry,
}

pub(crate) struct SettlementEngine<'a> {
    product: &'a ProductId,
    params: &'a ProductParams,
    accrual: AccrualParams,
}

impl<'a> SettlementEngine<'a> {
    pub fn new(
        product: &'a ProductId,
        params: &'a ProductParams,
        protocol_min_funding_fee: Fixed,
        closed: bool,
    ) -> Self {
        Self {
            product,
            params,
            accrual: AccrualParams {
                funding_fee: params.effective_funding_fee(protocol_min_funding_fee),
                closed,
            },
        }
    }

    /// Plan the aggregate's catch-up to `target`. A target at or before the entry's
    /// latest version is a no-op.
    pub fn plan_global(
        &self,
        oracle: &dyn PriceOracle,
        history: &History,
        entry: &LedgerEntry,
        target: Version,
    ) -> Result<GlobalPlan, LedgerError> {
        if target <= entry.latest_version {
            return Ok(GlobalPlan {
                settlement: ProductSettlement::noop(self.product, entry),
                entry: *entry,
                records: Vec::new(),
                snapshots: Vec::new(),
            });
        }

        let start = *history
            .record(entry.latest_version)
            .ok_or(LedgerError::HistoryGap(entry.latest_version))?;
        let mut entry = *entry;
        let mut prev = start.oracle;
        let mut value = start.value;
        let mut share = start.share;
        let mut funding_fee = Fixed::ZERO;
        let mut position_fee = Fixed::ZERO;
        let mut records = Vec::new();
        let mut snapshots = Vec::new();
        let mut steps = Vec::new();

        for next in VersionSteps::new(oracle, entry.latest_version, target) {
            let next = next?;
            let elapsed = next
                .timestamp
                .seconds_since(prev.timestamp)
                .ok_or(OracleError::TimestampRegressed(next.version))?;
            let rate = oracle.rate(&entry.position)?;
            let step = accrual::accrue(&entry.position, &prev, &next, elapsed, rate, self.accrual)?;

            value = value.try_add(&step.value)?;
            share = share.try_add(&step.share)?;
            funding_fee = funding_fee.try_add(step.funding_fee)?;
            debug!(
                product = %self.product,
                version = %next.version,
                elapsed,
                rate = %rate,
                funding_fee = %step.funding_fee,
                "accrued step"
            );

            let before = entry.position;
            if let Some(folded) = entry.fold_due(next.version)? {
                let fee = folded.fee(next.price, self.params.maker_fee, self.params.taker_fee)?;
                position_fee = position_fee.try_add(fee)?;
                if entry.position != before {
                    snapshots.push(VersionSnapshot {
                        version: next.version,
                        timestamp: next.timestamp,
                        position: entry.position,
                    });
                }
            }

            entry.latest_version = next.version;
            records.push(VersionRecord {
                oracle: next,
                value,
                share,
            });
            steps.push(step);
            prev = next;
        }

        let settlement = ProductSettlement {
            product: self.product.clone(),
            from: start.oracle.version,
            to: entry.latest_version,
            funding_fee,
            position_fee,
            fee: funding_fee.try_add(position_fee)?,
            value_delta: value.try_sub(&start.value)?,
            share_delta: share.try_sub(&start.share)?,
            position: entry.position,
            steps,
        };

        Ok(GlobalPlan {
            settlement,
            entry,
            records,
            snapshots,
        })
    }

    /// Plan an account's catch-up to `target`, which must already be settled globally
    /// (committed or staged in `view`).
    pub fn plan_account(
        &self,
        view: HistoryView<'_>,
        account: &AccountId,
        entry: &LedgerEntry,
        target: Version,
    ) -> Result<AccountPlan, LedgerError> {
        let from = entry.latest_version;
        let mut entry = *entry;
        if target <= from {
            return Ok(AccountPlan {
                settlement: AccountSettlement {
                    account: account.clone(),
                    from,
                    to: from,
                    delta: Fixed::ZERO,
                    position_fee: Fixed::ZERO,
                    share: Fixed::ZERO,
                    position: entry.position,
                },
                entry,
            });
        }

        let mut delta = Fixed::ZERO;
        let mut share = Fixed::ZERO;
        let mut position_fee = Fixed::ZERO;
        let mut cursor = from;

        if !entry.is_closed() {
            if let Some(due) = entry.pending.settle_version().filter(|due| *due <= target) {
                let (d, s) = accrued(&view, &entry.position, cursor, due)?;
                delta = delta.try_add(d)?;
                share = share.try_add(s)?;

                let price = view
                    .record(due)
                    .ok_or(LedgerError::HistoryGap(due))?
                    .oracle
                    .price;
                position_fee =
                    entry
                        .pending
                        .fee(price, self.params.maker_fee, self.params.taker_fee)?;
                entry.fold_due(due)?;
                cursor = due;
            }

            let (d, s) = accrued(&view, &entry.position, cursor, target)?;
            delta = delta.try_add(d)?.try_sub(position_fee)?;
            share = share.try_add(s)?;
        }

        entry.latest_version = target;
        Ok(AccountPlan {
            settlement: AccountSettlement {
                account: account.clone(),
                from,
                to: target,
                delta,
                position_fee,
                share,
                position: entry.position,
            },
            entry,
        })
    }
}

/// Value and share owed to `position` held over `(from, to]`.
fn accrued(
    view: &HistoryView<'_>,
    position: &Position,
    from: Version,
    to: Version,
) -> Result<(Fixed, Fixed), LedgerError> {
    if position.is_empty() || from >= to {
        return Ok((Fixed::ZERO, Fixed::ZERO));
    }
    let value = view.value_at(to).try_sub(&view.value_at(from))?;
    let share = view.share_at(to).try_sub(&view.share_at(from))?;
    Ok((value.apply(position)?, share.apply(position)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use crate::external::MockOracle;

    fn f(s: &str) -> Fixed {
        Fixed::from_str_canonical(s).unwrap()
    }

    fn oracle() -> MockOracle {
        MockOracle::new()
            .with_version(1, 0, "100")
            .with_version(2, 10, "110")
            .with_version(3, 20, "105")
            .with_version(4, 30, "120")
            .with_rate("0.001")
    }

    fn genesis(oracle: &MockOracle) -> History {
        History::genesis(oracle.at_version(Version::new(1)).unwrap())
    }

    #[test]
    fn test_version_steps_half_open() {
        let oracle = oracle();
        let versions: Vec<_> = VersionSteps::new(&oracle, Version::new(1), Version::new(3))
            .map(|r| r.unwrap().version)
            .collect();
        assert_eq!(versions, vec![Version::new(2), Version::new(3)]);
        assert_eq!(
            VersionSteps::new(&oracle, Version::new(3), Version::new(3)).count(),
            0
        );
    }

    #[test]
    fn test_version_steps_surface_oracle_gaps() {
        let oracle = MockOracle::new().with_version(1, 0, "1").with_version(3, 5, "1");
        let results: Vec<_> = VersionSteps::new(&oracle, Version::new(1), Version::new(3)).collect();
        assert_eq!(
            results[0],
            Err(OracleError::UnknownVersion(Version::new(2)))
        );
    }

    #[test]
    fn test_plan_global_folds_pending_at_next_version() {
        let oracle = oracle();
        let history = genesis(&oracle);
        let product = ProductId::new("P");
        let params = ProductParams::default();
        let engine = SettlementEngine::new(&product, &params, Fixed::ZERO, false);

        let mut entry = LedgerEntry::new(Version::new(1));
        entry.open(Version::new(1), Side::Maker, f("10")).unwrap();

        let plan = engine
            .plan_global(&oracle, &history, &entry, Version::new(3))
            .unwrap();
        assert_eq!(plan.entry.position, Position::maker(f("10")));
        assert_eq!(plan.entry.latest_version, Version::new(3));
        assert_eq!(plan.records.len(), 2);
        assert_eq!(plan.snapshots.len(), 1);
        assert_eq!(plan.snapshots[0].version, Version::new(2));
        assert_eq!(plan.settlement.steps.len(), 2);
        // Nothing to accrue without takers.
        assert_eq!(plan.settlement.value_delta, Accumulator::zero());
    }

    #[test]
    fn test_plan_global_noop_at_latest() {
        let oracle = oracle();
        let history = genesis(&oracle);
        let product = ProductId::new("P");
        let params = ProductParams::default();
        let engine = SettlementEngine::new(&product, &params, Fixed::ZERO, false);
        let entry = LedgerEntry::new(Version::new(1));

        let plan = engine
            .plan_global(&oracle, &history, &entry, Version::new(1))
            .unwrap();
        assert!(plan.settlement.is_noop());
        assert!(plan.records.is_empty());
    }

    #[test]
    fn test_plan_global_rejects_timestamp_regression() {
        let oracle = MockOracle::new()
            .with_version(1, 100, "1")
            .with_version(2, 50, "1");
        let history = genesis(&oracle);
        let product = ProductId::new("P");
        let params = ProductParams::default();
        let engine = SettlementEngine::new(&product, &params, Fixed::ZERO, false);

        let result = engine.plan_global(
            &oracle,
            &history,
            &LedgerEntry::new(Version::new(1)),
            Version::new(2),
        );
        assert_eq!(
            result.err(),
            Some(LedgerError::Oracle(OracleError::TimestampRegressed(
                Version::new(2)
            )))
        );
    }

    #[test]
    fn test_plan_account_replays_staged_history() {
        let oracle = oracle();
        let mut history = genesis(&oracle);
        let product = ProductId::new("P");
        let params = ProductParams::default();
        let engine = SettlementEngine::new(&product, &params, Fixed::ZERO, false);

        let mut global = LedgerEntry::new(Version::new(1));
        global.open(Version::new(1), Side::Maker, f("10")).unwrap();
        global.open(Version::new(1), Side::Taker, f("10")).unwrap();
        let mut maker = LedgerEntry::new(Version::new(1));
        maker.open(Version::new(1), Side::Maker, f("10")).unwrap();
        let mut taker = LedgerEntry::new(Version::new(1));
        taker.open(Version::new(1), Side::Taker, f("10")).unwrap();

        let plan = engine
            .plan_global(&oracle, &history, &global, Version::new(4))
            .unwrap();
        let staged = plan.records.clone();
        let view = history.view(&staged);
        let maker_plan = engine
            .plan_account(view, &AccountId::new("m"), &maker, Version::new(4))
            .unwrap();
        let taker_plan = engine
            .plan_account(view, &AccountId::new("t"), &taker, Version::new(4))
            .unwrap();

        // Takers pay funding and gain the price move from v2 to v4.
        assert_eq!(
            maker_plan
                .settlement
                .delta
                .try_add(taker_plan.settlement.delta)
                .unwrap()
                .try_add(plan.settlement.fee)
                .unwrap(),
            Fixed::ZERO
        );
        assert_eq!(taker_plan.settlement.position, Position::taker(f("10")));

        let mut committed = LedgerEntry::default();
        plan.commit(&mut history, &mut committed);
        assert_eq!(committed.latest_version, Version::new(4));
        assert_eq!(history.position_at(Version::new(2)).taker, f("10"));
    }

    #[test]
    fn test_plan_account_closed_entry_jumps() {
        let oracle = oracle();
        let history = genesis(&oracle);
        let product = ProductId::new("P");
        let params = ProductParams::default();
        let engine = SettlementEngine::new(&product, &params, Fixed::ZERO, false);

        let plan = engine
            .plan_account(
                history.view(&[]),
                &AccountId::new("idle"),
                &LedgerEntry::default(),
                Version::new(1),
            )
            .unwrap();
        assert_eq!(plan.entry.latest_version, Version::new(1));
        assert_eq!(plan.settlement.delta, Fixed::ZERO);
    }
}
