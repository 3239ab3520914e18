//! The product aggregate: one market's global ledger, its accounts, and its history.
//!
//! Every entry point that changes state follows the same shape. Settlement for the
//! aggregate (and the calling account, if any) is planned against the oracle without
//! touching `self`, and the request is validated against the planned state. The
//! aggregate catch-up is then published and committed on its own, followed by the
//! account and the request itself.
//!
//! A failure before the catch-up is published leaves the product exactly as it was. A
//! failure publishing the account leaves the aggregate caught up, the same state
//! `settle` would produce, so a retry never reports the same fee twice.

use crate::config::{Config, ProductParams};
use crate::domain::{Accumulator, AccountId, Fixed, PendingPosition, Position, ProductId, Version};
use crate::engine::{
    AccountEntry, AccountPlan, AccountSettlement, GlobalPlan, History, LedgerEntry,
    ProductSettlement, SettlementEngine,
};
use crate::error::LedgerError;
use crate::external::{Deps, OracleError, PriceOracle};
use std::collections::BTreeMap;
use tracing::info;

pub mod events;
pub mod mutation;
pub mod roles;

pub use events::LedgerEvent;
pub use mutation::MaintenanceReport;
pub use roles::{Caller, Role, Roles};

#[derive(Debug, Clone)]
pub struct Product {
    id: ProductId,
    roles: Roles,
    params: ProductParams,
    closed: bool,
    global: LedgerEntry,
    accounts: BTreeMap<AccountId, AccountEntry>,
    history: History,
    events: Vec<LedgerEvent>,
}

/// Settlement planned for one call but not yet committed.
struct Staged {
    global: GlobalPlan,
    /// Aggregate entry once the request is applied on top of the catch-up.
    entry: LedgerEntry,
    account: Option<StagedAccount>,
}

struct StagedAccount {
    id: AccountId,
    plan: AccountPlan,
    liquidating: bool,
}

impl StagedAccount {
    fn entry(&self) -> AccountEntry {
        AccountEntry {
            ledger: self.plan.entry,
            liquidating: self.liquidating,
        }
    }
}

impl Product {
    /// Create a product whose history starts at the oracle's current version.
    pub fn new(config: &Config, oracle: &dyn PriceOracle) -> Result<Self, LedgerError> {
        let genesis = oracle.at_version(oracle.current_version()?)?;
        info!(
            product = %config.product_id,
            version = %genesis.version,
            "product created"
        );
        Ok(Self {
            id: config.product_id.clone(),
            roles: Roles::new(config.owner.clone(), config.collateral.clone()),
            params: config.params,
            closed: false,
            global: LedgerEntry::new(genesis.version),
            accounts: BTreeMap::new(),
            history: History::genesis(genesis),
            events: Vec::new(),
        })
    }

    pub fn id(&self) -> &ProductId {
        &self.id
    }

    pub fn roles(&self) -> &Roles {
        &self.roles
    }

    pub fn params(&self) -> &ProductParams {
        &self.params
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Settled position of `account` as of its latest version.
    pub fn position(&self, account: &AccountId) -> Position {
        self.account(account).ledger.position
    }

    /// Aggregate settled position as of the global latest version.
    pub fn position_global(&self) -> Position {
        self.global.position
    }

    pub fn pre(&self, account: &AccountId) -> PendingPosition {
        self.account(account).ledger.pending
    }

    pub fn pre_global(&self) -> PendingPosition {
        self.global.pending
    }

    pub fn position_at_version(&self, version: Version) -> Position {
        self.history.position_at(version)
    }

    pub fn value_at_version(&self, version: Version) -> Accumulator {
        self.history.value_at(version)
    }

    pub fn share_at_version(&self, version: Version) -> Accumulator {
        self.history.share_at(version)
    }

    pub fn latest_version(&self) -> Version {
        self.global.latest_version
    }

    pub fn latest_version_of(&self, account: &AccountId) -> Version {
        self.account(account).ledger.latest_version
    }

    /// No settled or pending exposure for `account`.
    pub fn is_closed(&self, account: &AccountId) -> bool {
        self.account(account).ledger.is_closed()
    }

    pub fn is_product_closed(&self) -> bool {
        self.closed
    }

    pub fn is_liquidating(&self, account: &AccountId) -> bool {
        self.account(account).liquidating
    }

    /// Requirement for the settled position at the latest settled price.
    pub fn maintenance(&self, account: &AccountId) -> Result<Fixed, LedgerError> {
        Ok(self.maintenance_report(account)?.current)
    }

    /// Requirement once the pending change folds, at the latest settled price.
    pub fn maintenance_next(&self, account: &AccountId) -> Result<Fixed, LedgerError> {
        Ok(self.maintenance_report(account)?.next)
    }

    /// Drain the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Settle the aggregate through the oracle's current version.
    pub fn settle(&mut self, deps: &mut Deps<'_>) -> Result<ProductSettlement, LedgerError> {
        self.ensure_not_paused(deps)?;
        let current = self.current_version(deps.oracle)?;
        self.settle_through(deps, current)
    }

    /// Settle the aggregate through `target` only, which must lie between the latest
    /// settled version and the oracle's current version.
    pub fn settle_to(
        &mut self,
        deps: &mut Deps<'_>,
        target: Version,
    ) -> Result<ProductSettlement, LedgerError> {
        self.ensure_not_paused(deps)?;
        let current = self.current_version(deps.oracle)?;
        if target < self.global.latest_version || target > current {
            return Err(LedgerError::InvalidSettleTarget {
                target,
                latest: self.global.latest_version,
                current,
            });
        }
        self.settle_through(deps, target)
    }

    /// Settle the aggregate, then `account`, through the oracle's current version.
    pub fn settle_account(
        &mut self,
        deps: &mut Deps<'_>,
        account: &AccountId,
    ) -> Result<AccountSettlement, LedgerError> {
        self.ensure_not_paused(deps)?;
        let current = self.current_version(deps.oracle)?;
        let staged = self.stage(deps, current, Some(account))?;
        let (_, settled) = self.apply(staged, deps)?;
        settled.ok_or_else(|| LedgerError::HistoryGap(current))
    }

    fn settle_through(
        &mut self,
        deps: &mut Deps<'_>,
        target: Version,
    ) -> Result<ProductSettlement, LedgerError> {
        let staged = self.stage(deps, target, None)?;
        let (settlement, _) = self.apply(staged, deps)?;
        Ok(settlement)
    }

    fn account(&self, account: &AccountId) -> AccountEntry {
        self.accounts.get(account).copied().unwrap_or_default()
    }

    fn maintenance_report(&self, account: &AccountId) -> Result<MaintenanceReport, LedgerError> {
        let price = self
            .history
            .record(self.global.latest_version)
            .ok_or(LedgerError::HistoryGap(self.global.latest_version))?
            .oracle
            .price;
        Ok(MaintenanceReport::compute(
            &self.account(account).ledger,
            price,
            &self.params,
        )?)
    }

    fn ensure_not_paused(&self, deps: &Deps<'_>) -> Result<(), LedgerError> {
        if deps.registry.is_paused(&self.id) {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }

    /// Current oracle version, which may not precede what has already been settled.
    fn current_version(&self, oracle: &dyn PriceOracle) -> Result<Version, LedgerError> {
        let current = oracle.current_version()?;
        if current < self.global.latest_version {
            return Err(OracleError::VersionRegressed {
                settled: self.global.latest_version,
                current,
            }
            .into());
        }
        Ok(current)
    }

    fn engine(&self, deps: &Deps<'_>) -> SettlementEngine<'_> {
        SettlementEngine::new(
            &self.id,
            &self.params,
            deps.registry.min_funding_fee(),
            self.closed,
        )
    }

    fn stage(
        &self,
        deps: &Deps<'_>,
        target: Version,
        account: Option<&AccountId>,
    ) -> Result<Staged, LedgerError> {
        let engine = self.engine(deps);
        let global = engine.plan_global(deps.oracle, &self.history, &self.global, target)?;
        let account = match account {
            Some(id) => Some(self.stage_account(&engine, &global, id)?),
            None => None,
        };
        Ok(Staged {
            entry: global.entry,
            global,
            account,
        })
    }

    /// Plan `id` through the version `global` settles to. The liquidation flag drops once
    /// the account moves into a later version.
    fn stage_account(
        &self,
        engine: &SettlementEngine<'_>,
        global: &GlobalPlan,
        id: &AccountId,
    ) -> Result<StagedAccount, LedgerError> {
        let current = self.account(id);
        let plan = engine.plan_account(
            self.history.view(&global.records),
            id,
            &current.ledger,
            global.entry.latest_version,
        )?;
        let liquidating = current.liquidating && plan.settlement.is_noop();
        Ok(StagedAccount {
            id: id.clone(),
            plan,
            liquidating,
        })
    }

    /// Price at the version a staged settlement reaches.
    fn staged_price(&self, global: &GlobalPlan) -> Result<Fixed, LedgerError> {
        let version = global.entry.latest_version;
        global
            .records
            .last()
            .or_else(|| self.history.record(version))
            .map(|r| r.oracle.price)
            .ok_or(LedgerError::HistoryGap(version))
    }

    /// Publish and commit a staged call in two steps. The aggregate catch-up is committed
    /// as soon as the collateral service accepts its fee; the account and the request
    /// follow once the account's delta is accepted.
    fn apply(
        &mut self,
        staged: Staged,
        deps: &mut Deps<'_>,
    ) -> Result<(ProductSettlement, Option<AccountSettlement>), LedgerError> {
        let Staged {
            global,
            entry,
            account,
        } = staged;

        let product = &global.settlement;
        if !product.is_noop() {
            deps.collateral.settle_product(&self.id, product.fee)?;
            deps.incentives.product_settled(product);
        }
        let settlement = self.commit_global(global);

        let account = match account {
            Some(account) => {
                let settled = &account.plan.settlement;
                if !settled.is_noop() {
                    deps.collateral
                        .settle_account(&settled.account, settled.delta)?;
                    deps.incentives.account_settled(settled);
                }
                Some(self.commit_account(account))
            }
            None => None,
        };
        self.global = entry;
        Ok((settlement, account))
    }

    fn commit_global(&mut self, plan: GlobalPlan) -> ProductSettlement {
        let settlement = plan.commit(&mut self.history, &mut self.global);
        if !settlement.is_noop() {
            info!(
                product = %self.id,
                from = %settlement.from,
                to = %settlement.to,
                fee = %settlement.fee,
                "settled product"
            );
            self.events.push(LedgerEvent::from(&settlement));
        }
        settlement
    }

    fn commit_account(&mut self, staged: StagedAccount) -> AccountSettlement {
        let entry = staged.entry();
        let settled = staged.plan.settlement;
        if !settled.is_noop() {
            info!(
                product = %self.id,
                account = %settled.account,
                from = %settled.from,
                to = %settled.to,
                delta = %settled.delta,
                "settled account"
            );
            self.events.push(LedgerEvent::from(&settled));
        }
        self.accounts.insert(staged.id, entry);
        settled
    }
}
