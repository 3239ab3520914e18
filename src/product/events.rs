use crate::config::ProductParams;
use crate::domain::{Accumulator, AccountId, Fixed, Position, Version};
use crate::engine::{AccountSettlement, ProductSettlement};
use serde::{Deserialize, Serialize};

/// Observable record of a committed ledger change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Settled {
        from: Version,
        to: Version,
        fee: Fixed,
        value_delta: Accumulator,
        share_delta: Accumulator,
    },
    AccountSettled {
        account: AccountId,
        from: Version,
        to: Version,
        delta: Fixed,
        share: Fixed,
    },
    MakeOpened {
        account: AccountId,
        version: Version,
        amount: Fixed,
    },
    MakeClosed {
        account: AccountId,
        version: Version,
        amount: Fixed,
    },
    TakeOpened {
        account: AccountId,
        version: Version,
        amount: Fixed,
    },
    TakeClosed {
        account: AccountId,
        version: Version,
        amount: Fixed,
    },
    AllClosed {
        account: AccountId,
        version: Version,
        closed: Position,
    },
    ParamsUpdated {
        params: ProductParams,
    },
    ProductClosed {
        version: Version,
    },
}

impl From<&ProductSettlement> for LedgerEvent {
    fn from(s: &ProductSettlement) -> Self {
        LedgerEvent::Settled {
            from: s.from,
            to: s.to,
            fee: s.fee,
            value_delta: s.value_delta,
            share_delta: s.share_delta,
        }
    }
}

impl From<&AccountSettlement> for LedgerEvent {
    fn from(s: &AccountSettlement) -> Self {
        LedgerEvent::AccountSettled {
            account: s.account.clone(),
            from: s.from,
            to: s.to,
            delta: s.delta,
            share: s.share,
        }
    }
}
