//! Collaborators the ledger consumes: the price/version oracle, the collateral service,
//! the incentive distributor, and the protocol registry.
//!
//! All calls are synchronous. A collaborator either returns a value or an error; an error
//! aborts the whole ledger call.

use crate::domain::{AccountId, Fixed, Position, ProductId, Timestamp, Version};
use crate::engine::{AccountSettlement, ProductSettlement};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod mock;
pub mod rate_curve;

pub use mock::{MockCollateral, MockEnv, MockIncentives, MockOracle, MockRegistry};
pub use rate_curve::JumpRateCurve;

/// One oracle checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleVersion {
    pub version: Version,
    pub timestamp: Timestamp,
    pub price: Fixed,
}

/// Source of versions, prices and funding rates.
pub trait PriceOracle: fmt::Debug {
    /// The newest version the oracle has published.
    fn current_version(&self) -> Result<Version, OracleError>;

    fn timestamp_at_version(&self, version: Version) -> Result<Timestamp, OracleError>;

    /// Signed price at `version`. The sign encodes direction.
    fn price_at_version(&self, version: Version) -> Result<Fixed, OracleError>;

    /// Signed funding rate per second for the given aggregate position.
    /// Positive means takers pay makers.
    fn rate(&self, position: &Position) -> Result<Fixed, OracleError>;

    fn at_version(&self, version: Version) -> Result<OracleVersion, OracleError> {
        Ok(OracleVersion {
            version,
            timestamp: self.timestamp_at_version(version)?,
            price: self.price_at_version(version)?,
        })
    }
}

/// Holds collateral balances and applies the deltas the ledger produces.
pub trait CollateralService: fmt::Debug {
    /// Credit the protocol with fees withheld during a product settlement.
    fn settle_product(&mut self, product: &ProductId, fee: Fixed) -> Result<(), CollateralError>;

    /// Apply a signed funding/PnL delta to an account's collateral.
    fn settle_account(&mut self, account: &AccountId, delta: Fixed) -> Result<(), CollateralError>;

    /// Whether the account would be liquidatable if its requirement on `product` were
    /// `maintenance_next`.
    fn liquidatable_next(
        &self,
        account: &AccountId,
        product: &ProductId,
        maintenance_next: Fixed,
    ) -> Result<bool, CollateralError>;
}

/// Side-effect sink notified on every settlement.
pub trait IncentiveDistributor: fmt::Debug {
    fn product_settled(&mut self, settlement: &ProductSettlement);

    fn account_settled(&mut self, settlement: &AccountSettlement);
}

/// Protocol-wide switches and floors.
pub trait ProtocolRegistry: fmt::Debug {
    fn is_paused(&self, product: &ProductId) -> bool;

    /// Protocol minimum for the funding fee.
    fn min_funding_fee(&self) -> Fixed;
}

/// Borrowed collaborators handed to every ledger call.
pub struct Deps<'a> {
    pub oracle: &'a dyn PriceOracle,
    pub collateral: &'a mut dyn CollateralService,
    pub incentives: &'a mut dyn IncentiveDistributor,
    pub registry: &'a dyn ProtocolRegistry,
}

impl<'a> Deps<'a> {
    pub fn new(
        oracle: &'a dyn PriceOracle,
        collateral: &'a mut dyn CollateralService,
        incentives: &'a mut dyn IncentiveDistributor,
        registry: &'a dyn ProtocolRegistry,
    ) -> Self {
        Self {
            oracle,
            collateral,
            incentives,
            registry,
        }
    }
}

/// Oracle faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The oracle has no record of this version.
    UnknownVersion(Version),
    /// The oracle reports a current version older than one already settled.
    VersionRegressed { settled: Version, current: Version },
    /// A version's timestamp is earlier than its predecessor's.
    TimestampRegressed(Version),
    /// The oracle could not be reached or refused the call.
    Unavailable(String),
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::UnknownVersion(v) => write!(f, "Unknown oracle version {}", v),
            OracleError::VersionRegressed { settled, current } => write!(
                f,
                "Oracle version regressed: settled {} but current is {}",
                settled, current
            ),
            OracleError::TimestampRegressed(v) => {
                write!(f, "Oracle timestamp regressed at {}", v)
            }
            OracleError::Unavailable(msg) => write!(f, "Oracle unavailable: {}", msg),
        }
    }
}

impl std::error::Error for OracleError {}

/// Collateral service faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollateralError {
    #[error("collateral service unavailable: {0}")]
    Unavailable(String),
    #[error("collateral service rejected settlement: {0}")]
    Rejected(String),
}
