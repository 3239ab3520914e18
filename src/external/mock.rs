//! In-memory collaborators for tests and simulations.

use super::{
    CollateralError, CollateralService, Deps, IncentiveDistributor, JumpRateCurve, OracleError,
    PriceOracle, ProtocolRegistry,
};
use crate::domain::{AccountId, Fixed, Position, ProductId, Timestamp, Version};
use crate::engine::{AccountSettlement, ProductSettlement};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy)]
enum RateModel {
    Constant(Fixed),
    Curve(JumpRateCurve),
}

/// Oracle with a scripted list of versions.
#[derive(Debug, Clone)]
pub struct MockOracle {
    versions: BTreeMap<Version, (Timestamp, Fixed)>,
    current: Version,
    rate: RateModel,
    unavailable: bool,
}

impl MockOracle {
    /// Create an oracle with no versions and a zero funding rate.
    pub fn new() -> Self {
        Self {
            versions: BTreeMap::new(),
            current: Version::default(),
            rate: RateModel::Constant(Fixed::ZERO),
            unavailable: false,
        }
    }

    /// Add a version and make it current if it is the newest.
    ///
    /// # Panics
    /// Panics if `price` is not a decimal string.
    pub fn with_version(mut self, version: u64, timestamp: u64, price: &str) -> Self {
        self.push_version(version, timestamp, price);
        self
    }

    /// Use a constant funding rate per second.
    pub fn with_rate(mut self, rate: &str) -> Self {
        self.set_rate(rate);
        self
    }

    /// Derive the funding rate from a utilization curve.
    pub fn with_curve(mut self, curve: JumpRateCurve) -> Self {
        self.rate = RateModel::Curve(curve);
        self
    }

    pub fn push_version(&mut self, version: u64, timestamp: u64, price: &str) {
        let price = Fixed::from_str_canonical(price).expect("mock price must be a decimal");
        let version = Version::new(version);
        self.versions
            .insert(version, (Timestamp::new(timestamp), price));
        if version > self.current {
            self.current = version;
        }
    }

    pub fn set_rate(&mut self, rate: &str) {
        let rate = Fixed::from_str_canonical(rate).expect("mock rate must be a decimal");
        self.rate = RateModel::Constant(rate);
    }

    /// Pin the current version, e.g. to replay history in smaller steps.
    pub fn set_current(&mut self, version: u64) {
        self.current = Version::new(version);
    }

    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    fn check_available(&self) -> Result<(), OracleError> {
        if self.unavailable {
            return Err(OracleError::Unavailable("mock outage".to_string()));
        }
        Ok(())
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceOracle for MockOracle {
    fn current_version(&self) -> Result<Version, OracleError> {
        self.check_available()?;
        Ok(self.current)
    }

    fn timestamp_at_version(&self, version: Version) -> Result<Timestamp, OracleError> {
        self.check_available()?;
        self.versions
            .get(&version)
            .map(|(timestamp, _)| *timestamp)
            .ok_or(OracleError::UnknownVersion(version))
    }

    fn price_at_version(&self, version: Version) -> Result<Fixed, OracleError> {
        self.check_available()?;
        self.versions
            .get(&version)
            .map(|(_, price)| *price)
            .ok_or(OracleError::UnknownVersion(version))
    }

    fn rate(&self, position: &Position) -> Result<Fixed, OracleError> {
        self.check_available()?;
        match self.rate {
            RateModel::Constant(rate) => Ok(rate),
            RateModel::Curve(curve) => curve
                .rate(position)
                .map_err(|e| OracleError::Unavailable(e.to_string())),
        }
    }
}

/// Collateral service that records every call.
#[derive(Debug, Clone, Default)]
pub struct MockCollateral {
    pub product_fees: Vec<(ProductId, Fixed)>,
    pub account_deltas: Vec<(AccountId, Fixed)>,
    liquidatable: BTreeSet<AccountId>,
    collateral: HashMap<AccountId, Fixed>,
    unavailable: bool,
    account_failures: usize,
}

impl MockCollateral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report this account as liquidatable regardless of its requirement.
    pub fn with_liquidatable(mut self, account: &AccountId) -> Self {
        self.liquidatable.insert(account.clone());
        self
    }

    /// Give an account a balance; it becomes liquidatable when its requirement exceeds it.
    pub fn with_collateral(mut self, account: &AccountId, amount: &str) -> Self {
        let amount = Fixed::from_str_canonical(amount).expect("mock collateral must be a decimal");
        self.collateral.insert(account.clone(), amount);
        self
    }

    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    /// Reject the next `count` account settlements while product settlements still go
    /// through.
    pub fn fail_account_settlements(&mut self, count: usize) {
        self.account_failures = count;
    }

    /// Sum of all fees credited to the protocol.
    pub fn total_fees(&self) -> Fixed {
        self.product_fees
            .iter()
            .fold(Fixed::ZERO, |acc, (_, fee)| acc + *fee)
    }

    /// Sum of all deltas applied to `account`.
    pub fn total_delta(&self, account: &AccountId) -> Fixed {
        self.account_deltas
            .iter()
            .filter(|(a, _)| a == account)
            .fold(Fixed::ZERO, |acc, (_, delta)| acc + *delta)
    }

    fn check_available(&self) -> Result<(), CollateralError> {
        if self.unavailable {
            return Err(CollateralError::Unavailable("mock outage".to_string()));
        }
        Ok(())
    }
}

impl CollateralService for MockCollateral {
    fn settle_product(&mut self, product: &ProductId, fee: Fixed) -> Result<(), CollateralError> {
        self.check_available()?;
        self.product_fees.push((product.clone(), fee));
        Ok(())
    }

    fn settle_account(&mut self, account: &AccountId, delta: Fixed) -> Result<(), CollateralError> {
        self.check_available()?;
        if self.account_failures > 0 {
            self.account_failures -= 1;
            return Err(CollateralError::Unavailable(format!(
                "mock rejected settlement for {account}"
            )));
        }
        self.account_deltas.push((account.clone(), delta));
        if let Some(balance) = self.collateral.get_mut(account) {
            *balance = *balance + delta;
        }
        Ok(())
    }

    fn liquidatable_next(
        &self,
        account: &AccountId,
        _product: &ProductId,
        maintenance_next: Fixed,
    ) -> Result<bool, CollateralError> {
        self.check_available()?;
        if self.liquidatable.contains(account) {
            return Ok(true);
        }
        Ok(self
            .collateral
            .get(account)
            .map(|balance| maintenance_next > *balance)
            .unwrap_or(false))
    }
}

/// Incentive distributor that keeps every notification.
#[derive(Debug, Clone, Default)]
pub struct MockIncentives {
    pub products: Vec<ProductSettlement>,
    pub accounts: Vec<AccountSettlement>,
}

impl MockIncentives {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IncentiveDistributor for MockIncentives {
    fn product_settled(&mut self, settlement: &ProductSettlement) {
        self.products.push(settlement.clone());
    }

    fn account_settled(&mut self, settlement: &AccountSettlement) {
        self.accounts.push(settlement.clone());
    }
}

/// Registry with a pause switch and a protocol funding-fee floor.
#[derive(Debug, Clone, Default)]
pub struct MockRegistry {
    pub paused: bool,
    pub min_funding_fee: Fixed,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_funding_fee(mut self, fee: &str) -> Self {
        self.min_funding_fee =
            Fixed::from_str_canonical(fee).expect("mock fee must be a decimal");
        self
    }
}

impl ProtocolRegistry for MockRegistry {
    fn is_paused(&self, _product: &ProductId) -> bool {
        self.paused
    }

    fn min_funding_fee(&self) -> Fixed {
        self.min_funding_fee
    }
}

/// All four mocks together, lending out a [`Deps`] per call.
#[derive(Debug, Clone, Default)]
pub struct MockEnv {
    pub oracle: MockOracle,
    pub collateral: MockCollateral,
    pub incentives: MockIncentives,
    pub registry: MockRegistry,
}

impl MockEnv {
    pub fn new(oracle: MockOracle) -> Self {
        Self {
            oracle,
            ..Default::default()
        }
    }

    pub fn with_collateral(mut self, collateral: MockCollateral) -> Self {
        self.collateral = collateral;
        self
    }

    pub fn with_registry(mut self, registry: MockRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn deps(&mut self) -> Deps<'_> {
        Deps::new(
            &self.oracle,
            &mut self.collateral,
            &mut self.incentives,
            &self.registry,
        )
    }
}
