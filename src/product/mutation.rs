//! Opens, closes, forced closes, and owner operations.
//!
//! Checks run in a fixed order and the first failure wins: pause, negative amount,
//! product closed (opens only), then, against the planned settlement, liquidation,
//! double-sided exposure, maker limit, over-close, projected collateral (opens only).

use super::{LedgerEvent, Product, Role, Staged};
use crate::config::ProductParams;
use crate::domain::{AccountId, ArithmeticError, Fixed, Position, Side};
use crate::engine::LedgerEntry;
use crate::error::LedgerError;
use crate::external::Deps;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Maintenance requirements for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// For the settled position.
    pub current: Fixed,
    /// For the position once the pending change folds.
    pub next: Fixed,
}

impl MaintenanceReport {
    pub fn compute(
        entry: &LedgerEntry,
        price: Fixed,
        params: &ProductParams,
    ) -> Result<Self, ArithmeticError> {
        let ratio = params.maintenance_ratio;
        let current = entry.position.maintenance(price, ratio)?;
        let mut next = entry.next_position()?.maintenance(price, ratio)?;
        if params.flash_maintenance {
            let gross = entry
                .position
                .try_add(&entry.pending.to_open)?
                .maintenance(price, ratio)?;
            next = next.max(gross);
        }
        Ok(Self { current, next })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Open,
    Close,
}

impl Product {
    pub fn open_maker(
        &mut self,
        deps: &mut Deps<'_>,
        account: &AccountId,
        amount: Fixed,
    ) -> Result<MaintenanceReport, LedgerError> {
        self.update_position(deps, account, Side::Maker, Change::Open, amount)
    }

    pub fn close_maker(
        &mut self,
        deps: &mut Deps<'_>,
        account: &AccountId,
        amount: Fixed,
    ) -> Result<MaintenanceReport, LedgerError> {
        self.update_position(deps, account, Side::Maker, Change::Close, amount)
    }

    /// Open taker exposure. Not capped by maker depth; takers beyond it are socialized.
    pub fn open_taker(
        &mut self,
        deps: &mut Deps<'_>,
        account: &AccountId,
        amount: Fixed,
    ) -> Result<MaintenanceReport, LedgerError> {
        self.update_position(deps, account, Side::Taker, Change::Open, amount)
    }

    pub fn close_taker(
        &mut self,
        deps: &mut Deps<'_>,
        account: &AccountId,
        amount: Fixed,
    ) -> Result<MaintenanceReport, LedgerError> {
        self.update_position(deps, account, Side::Taker, Change::Close, amount)
    }

    /// Force-close everything `account` holds or has pending and flag it as liquidating.
    /// Only the collateral service may call this. Returns the amount closed.
    pub fn close_all(
        &mut self,
        deps: &mut Deps<'_>,
        caller: &AccountId,
        account: &AccountId,
    ) -> Result<Position, LedgerError> {
        let result = self.try_close_all(deps, caller, account);
        match &result {
            Ok(closed) => info!(
                product = %self.id,
                account = %account,
                maker = %closed.maker,
                taker = %closed.taker,
                "closed all"
            ),
            Err(e) => warn!(
                product = %self.id,
                caller = %caller,
                account = %account,
                error = %e,
                "close all rejected"
            ),
        }
        result
    }

    /// Replace the economic parameters after settling under the old ones.
    pub fn update_params(
        &mut self,
        deps: &mut Deps<'_>,
        caller: &AccountId,
        params: ProductParams,
    ) -> Result<(), LedgerError> {
        self.roles
            .resolve(caller)
            .require(Role::Owner, "update parameters")?;
        validate_params(&params)?;
        self.ensure_not_paused(deps)?;
        let current = self.current_version(deps.oracle)?;
        self.settle_through(deps, current)?;

        self.params = params;
        self.events.push(LedgerEvent::ParamsUpdated { params });
        info!(product = %self.id, ?params, "parameters updated");
        Ok(())
    }

    /// Stop funding and price PnL. Closes stay allowed; opens are rejected from now on.
    pub fn close_product(
        &mut self,
        deps: &mut Deps<'_>,
        caller: &AccountId,
    ) -> Result<(), LedgerError> {
        self.roles
            .resolve(caller)
            .require(Role::Owner, "close product")?;
        self.ensure_not_paused(deps)?;
        let current = self.current_version(deps.oracle)?;
        self.settle_through(deps, current)?;

        if !self.closed {
            self.closed = true;
            self.events.push(LedgerEvent::ProductClosed { version: current });
            info!(product = %self.id, version = %current, "product closed");
        }
        Ok(())
    }

    fn update_position(
        &mut self,
        deps: &mut Deps<'_>,
        account: &AccountId,
        side: Side,
        change: Change,
        amount: Fixed,
    ) -> Result<MaintenanceReport, LedgerError> {
        let result = self.try_update_position(deps, account, side, change, amount);
        match &result {
            Ok(report) => info!(
                product = %self.id,
                account = %account,
                %side,
                ?change,
                %amount,
                maintenance_next = %report.next,
                "position updated"
            ),
            Err(e) => warn!(
                product = %self.id,
                account = %account,
                %side,
                ?change,
                %amount,
                error = %e,
                "position update rejected"
            ),
        }
        result
    }

    fn try_update_position(
        &mut self,
        deps: &mut Deps<'_>,
        account: &AccountId,
        side: Side,
        change: Change,
        amount: Fixed,
    ) -> Result<MaintenanceReport, LedgerError> {
        self.ensure_not_paused(deps)?;
        if amount.is_negative() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if change == Change::Open && self.closed {
            return Err(LedgerError::ProductClosed);
        }

        let current = self.current_version(deps.oracle)?;
        let engine = self.engine(deps);
        let global = engine.plan_global(deps.oracle, &self.history, &self.global, current)?;
        let mut staged = self.stage_account(&engine, &global, account)?;
        let mut entry = global.entry;
        let price = self.staged_price(&global)?;

        if staged.liquidating {
            return Err(LedgerError::InLiquidation(account.clone()));
        }
        let next = staged.plan.entry.next_position()?;
        match change {
            Change::Open => {
                if !next.get(side.opposite()).is_zero() {
                    return Err(LedgerError::DoubleSided(account.clone()));
                }
                if side == Side::Maker {
                    let requested = entry.next_position()?.maker.try_add(amount)?;
                    if requested > self.params.maker_limit {
                        return Err(LedgerError::MakerOverLimit {
                            limit: self.params.maker_limit,
                            requested,
                        });
                    }
                }
            }
            Change::Close => {
                let open = next.get(side);
                if amount > open {
                    return Err(LedgerError::OverClosed {
                        account: account.clone(),
                        side,
                        requested: amount,
                        open,
                    });
                }
            }
        }

        match change {
            Change::Open => {
                staged.plan.entry.open(current, side, amount)?;
                entry.open(current, side, amount)?;
            }
            Change::Close => {
                staged.plan.entry.close(current, side, amount)?;
                entry.close(current, side, amount)?;
            }
        }

        let report = MaintenanceReport::compute(&staged.plan.entry, price, &self.params)?;
        if change == Change::Open
            && deps
                .collateral
                .liquidatable_next(account, &self.id, report.next)?
        {
            return Err(LedgerError::InsufficientCollateral(account.clone()));
        }

        let staged = Staged {
            global,
            entry,
            account: Some(staged),
        };
        self.apply(staged, deps)?;

        let (account, version) = (account.clone(), current);
        self.events.push(match (side, change) {
            (Side::Maker, Change::Open) => LedgerEvent::MakeOpened {
                account,
                version,
                amount,
            },
            (Side::Maker, Change::Close) => LedgerEvent::MakeClosed {
                account,
                version,
                amount,
            },
            (Side::Taker, Change::Open) => LedgerEvent::TakeOpened {
                account,
                version,
                amount,
            },
            (Side::Taker, Change::Close) => LedgerEvent::TakeClosed {
                account,
                version,
                amount,
            },
        });
        Ok(report)
    }

    fn try_close_all(
        &mut self,
        deps: &mut Deps<'_>,
        caller: &AccountId,
        account: &AccountId,
    ) -> Result<Position, LedgerError> {
        self.roles
            .resolve(caller)
            .require(Role::Collateral, "close all")?;
        self.ensure_not_paused(deps)?;

        let current = self.current_version(deps.oracle)?;
        let engine = self.engine(deps);
        let global = engine.plan_global(deps.oracle, &self.history, &self.global, current)?;
        let mut staged = self.stage_account(&engine, &global, account)?;
        let mut entry = global.entry;

        let open = staged.plan.entry.next_position()?;
        let already_closed = open.is_empty() && staged.liquidating;
        for side in [Side::Maker, Side::Taker] {
            let amount = open.get(side);
            if !amount.is_zero() {
                staged.plan.entry.close(current, side, amount)?;
                entry.close(current, side, amount)?;
            }
        }
        staged.liquidating = true;

        let staged = Staged {
            global,
            entry,
            account: Some(staged),
        };
        self.apply(staged, deps)?;

        if !already_closed {
            self.events.push(LedgerEvent::AllClosed {
                account: account.clone(),
                version: current,
                closed: open,
            });
        }
        Ok(open)
    }
}

fn validate_params(params: &ProductParams) -> Result<(), LedgerError> {
    for fee in [params.maker_fee, params.taker_fee, params.funding_fee] {
        if fee.is_negative() || fee > Fixed::ONE {
            return Err(LedgerError::InvalidAmount(fee));
        }
    }
    for bound in [params.maintenance_ratio, params.maker_limit] {
        if bound.is_negative() {
            return Err(LedgerError::InvalidAmount(bound));
        }
    }
    Ok(())
}
