//! Pure computation engine for deterministic ledger logic.
//!
//! Nothing here talks to a collaborator except through the oracle reads a settlement
//! plan needs; collateral and incentive calls are made by the product layer once a plan
//! has been validated.

pub mod accrual;
pub mod history;
pub mod ledger;
pub mod settlement;

pub use accrual::{accrue, AccrualParams, AccrualStep, SideTotals};
pub use history::{History, HistoryView, VersionRecord};
pub use ledger::{AccountEntry, LedgerEntry};
pub use settlement::{AccountSettlement, ProductSettlement, VersionSteps};
pub(crate) use settlement::{AccountPlan, GlobalPlan, SettlementEngine};
