use crate::domain::{ArithmeticError, Fixed, PendingPosition, Position, Side, Version};
use serde::{Deserialize, Serialize};

/// Settled position plus the pending change staged on top of it.
///
/// The product keeps one entry for the aggregate and one per account. The aggregate's
/// `position` is the sum of every account's settled position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Exposure in force as of `latest_version`.
    pub position: Position,
    /// Opens and closes not yet folded into `position`.
    pub pending: PendingPosition,
    /// Last version this entry has been settled through.
    pub latest_version: Version,
}

impl LedgerEntry {
    pub fn new(latest_version: Version) -> Self {
        Self {
            position: Position::zero(),
            pending: PendingPosition::empty(),
            latest_version,
        }
    }

    /// Position once the pending change folds in.
    pub fn next_position(&self) -> Result<Position, ArithmeticError> {
        self.position.next(&self.pending)
    }

    /// No exposure settled and nothing pending.
    pub fn is_closed(&self) -> bool {
        self.position.is_empty() && self.pending.is_empty()
    }

    /// Fold the pending change into the settled position if it is due at `version`.
    /// Returns the folded change.
    pub fn fold_due(&mut self, version: Version) -> Result<Option<PendingPosition>, ArithmeticError> {
        match self.pending.settle_version() {
            Some(due) if due <= version => {
                let folded = self.pending;
                self.position = self.position.next(&folded)?;
                self.pending = PendingPosition::empty();
                Ok(Some(folded))
            }
            _ => Ok(None),
        }
    }

    pub fn open(&mut self, version: Version, side: Side, amount: Fixed) -> Result<(), ArithmeticError> {
        self.pending.open(version, side, amount)
    }

    pub fn close(&mut self, version: Version, side: Side, amount: Fixed) -> Result<(), ArithmeticError> {
        self.pending.close(version, side, amount)
    }
}

/// Per-account ledger state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub ledger: LedgerEntry,
    /// Set by a forced close; cleared once the account settles into a later version.
    pub liquidating: bool,
}
