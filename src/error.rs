use crate::domain::{AccountId, ArithmeticError, Fixed, Side, Version};
use crate::external::{CollateralError, OracleError};
use thiserror::Error;

/// Every way a ledger call can be rejected. A rejected call changes no state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("product is paused")]
    Paused,
    #[error("product is closed to new exposure")]
    ProductClosed,
    #[error("account {0} is being liquidated")]
    InLiquidation(AccountId),
    #[error("account {0} would hold both maker and taker exposure")]
    DoubleSided(AccountId),
    #[error("maker exposure {requested} would exceed the limit {limit}")]
    MakerOverLimit { limit: Fixed, requested: Fixed },
    #[error("account {account} cannot close {requested} {side}, only {open} is open")]
    OverClosed {
        account: AccountId,
        side: Side,
        requested: Fixed,
        open: Fixed,
    },
    #[error("account {0} would be liquidatable at the next version")]
    InsufficientCollateral(AccountId),
    #[error("caller {caller} may not {action}")]
    Unauthorized { caller: AccountId, action: &'static str },
    #[error("amount must not be negative, got {0}")]
    InvalidAmount(Fixed),
    #[error("cannot settle to {target}: ledger is at {latest} and oracle at {current}")]
    InvalidSettleTarget {
        target: Version,
        latest: Version,
        current: Version,
    },
    #[error("no settled history at {0}")]
    HistoryGap(Version),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Collateral(#[from] CollateralError),
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

impl LedgerError {
    /// True for rejections caused by the request itself rather than a dependency or
    /// arithmetic fault.
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::Paused
                | LedgerError::ProductClosed
                | LedgerError::InLiquidation(_)
                | LedgerError::DoubleSided(_)
                | LedgerError::MakerOverLimit { .. }
                | LedgerError::OverClosed { .. }
                | LedgerError::InsufficientCollateral(_)
                | LedgerError::Unauthorized { .. }
                | LedgerError::InvalidAmount(_)
                | LedgerError::InvalidSettleTarget { .. }
        )
    }
}
