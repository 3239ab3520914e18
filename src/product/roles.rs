use crate::domain::AccountId;
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};

/// Privileged accounts for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    pub owner: AccountId,
    pub collateral: AccountId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// May change parameters and close the product.
    Owner,
    /// May force-close accounts.
    Collateral,
    /// May act on its own account only.
    Account,
}

/// A caller with its roles resolved at call entry. One account may hold both
/// privileged roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    account: AccountId,
    owner: bool,
    collateral: bool,
}

impl Roles {
    pub fn new(owner: AccountId, collateral: AccountId) -> Self {
        Self { owner, collateral }
    }

    pub fn resolve(&self, caller: &AccountId) -> Caller {
        Caller {
            account: caller.clone(),
            owner: *caller == self.owner,
            collateral: *caller == self.collateral,
        }
    }
}

impl Caller {
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn holds(&self, role: Role) -> bool {
        match role {
            Role::Owner => self.owner,
            Role::Collateral => self.collateral,
            Role::Account => true,
        }
    }

    pub fn require(&self, role: Role, action: &'static str) -> Result<(), LedgerError> {
        if self.holds(role) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized {
                caller: self.account.clone(),
                action,
            })
        }
    }
}
