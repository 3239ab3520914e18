pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod external;
pub mod product;
pub mod telemetry;

pub use config::{Config, ConfigError, FundingFeePolicy, ProductParams};
pub use domain::{
    Accumulator, AccountId, ArithmeticError, Fixed, PendingPosition, Position, ProductId, Side,
    Timestamp, Version, VersionSnapshot,
};
pub use engine::{AccountSettlement, AccrualStep, ProductSettlement, VersionSteps};
pub use error::LedgerError;
pub use external::{
    CollateralError, CollateralService, Deps, IncentiveDistributor, JumpRateCurve, OracleError,
    OracleVersion, PriceOracle, ProtocolRegistry,
};
pub use product::{Caller, LedgerEvent, MaintenanceReport, Product, Role, Roles};
