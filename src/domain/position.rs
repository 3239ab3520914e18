//! Maker/taker exposure, staged pending changes, and aggregate snapshots.

use super::{ArithmeticError, Fixed, Side, Timestamp, Version};
use serde::{Deserialize, Serialize};

/// Exposure on each side of the book. Both components are non-negative; direction is
/// carried by the sign of the oracle price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub maker: Fixed,
    pub taker: Fixed,
}

impl Position {
    pub fn new(maker: Fixed, taker: Fixed) -> Self {
        Self { maker, taker }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn maker(amount: Fixed) -> Self {
        Self::new(amount, Fixed::ZERO)
    }

    pub fn taker(amount: Fixed) -> Self {
        Self::new(Fixed::ZERO, amount)
    }

    pub fn get(&self, side: Side) -> Fixed {
        match side {
            Side::Maker => self.maker,
            Side::Taker => self.taker,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.maker.is_zero() && self.taker.is_zero()
    }

    pub fn is_double_sided(&self) -> bool {
        !self.maker.is_zero() && !self.taker.is_zero()
    }

    pub fn try_add(&self, rhs: &Position) -> Result<Position, ArithmeticError> {
        Ok(Position {
            maker: self.maker.try_add(rhs.maker)?,
            taker: self.taker.try_add(rhs.taker)?,
        })
    }

    pub fn try_sub(&self, rhs: &Position) -> Result<Position, ArithmeticError> {
        Ok(Position {
            maker: self.maker.try_sub(rhs.maker)?,
            taker: self.taker.try_sub(rhs.taker)?,
        })
    }

    /// Exposure matched between the two sides: `min(maker, taker)`.
    pub fn matched(&self) -> Fixed {
        self.maker.min(self.taker)
    }

    /// `taker / maker`, or zero when there is no maker exposure.
    pub fn utilization(&self) -> Result<Fixed, ArithmeticError> {
        self.taker.div_or_zero(self.maker)
    }

    /// Fraction of taker exposure the makers can back: `min(1, maker / taker)`.
    /// One when there is no taker exposure.
    pub fn socialization_factor(&self) -> Result<Fixed, ArithmeticError> {
        if self.taker.is_zero() {
            return Ok(Fixed::ONE);
        }
        Ok(self.maker.try_div(self.taker)?.min(Fixed::ONE))
    }

    /// Collateral needed to hold this position: `(maker + taker) * |price| * ratio`.
    pub fn maintenance(&self, price: Fixed, ratio: Fixed) -> Result<Fixed, ArithmeticError> {
        self.maker
            .try_add(self.taker)?
            .try_mul(price.abs())?
            .try_mul(ratio)
    }

    /// Position after folding in `pending`.
    pub fn next(&self, pending: &PendingPosition) -> Result<Position, ArithmeticError> {
        self.try_add(&pending.to_open)?.try_sub(&pending.to_close)
    }
}

/// Opens and closes requested at `as_of_version` and not yet folded into the settled
/// position. They fold at `as_of_version + 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPosition {
    pub as_of_version: Version,
    pub to_open: Position,
    pub to_close: Position,
}

impl PendingPosition {
    /// Nothing pending. Tagged with the sentinel version 0.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.to_open.is_empty() && self.to_close.is_empty()
    }

    /// The version at which this pending change becomes part of the settled position.
    pub fn settle_version(&self) -> Option<Version> {
        if self.is_empty() {
            None
        } else {
            Some(self.as_of_version.next())
        }
    }

    pub fn open(&mut self, version: Version, side: Side, amount: Fixed) -> Result<(), ArithmeticError> {
        self.as_of_version = version;
        match side {
            Side::Maker => self.to_open.maker = self.to_open.maker.try_add(amount)?,
            Side::Taker => self.to_open.taker = self.to_open.taker.try_add(amount)?,
        }
        Ok(())
    }

    pub fn close(&mut self, version: Version, side: Side, amount: Fixed) -> Result<(), ArithmeticError> {
        self.as_of_version = version;
        match side {
            Side::Maker => self.to_close.maker = self.to_close.maker.try_add(amount)?,
            Side::Taker => self.to_close.taker = self.to_close.taker.try_add(amount)?,
        }
        Ok(())
    }

    /// Position fee charged when this change folds at `price`.
    pub fn fee(&self, price: Fixed, maker_fee: Fixed, taker_fee: Fixed) -> Result<Fixed, ArithmeticError> {
        let traded = self.to_open.try_add(&self.to_close)?;
        let maker = traded.maker.try_mul(price.abs())?.try_mul(maker_fee)?;
        let taker = traded.taker.try_mul(price.abs())?.try_mul(taker_fee)?;
        maker.try_add(taker)
    }
}

/// Aggregate settled position in force from `version` onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub version: Version,
    pub timestamp: Timestamp,
    pub position: Position,
}
