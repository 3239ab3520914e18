//! Per-unit running totals, one value per side.

use super::{ArithmeticError, Fixed, Position};
use serde::{Deserialize, Serialize};

/// Cumulative per-unit amount for each side since the product's first version.
///
/// Used for both the value accumulator (funding + PnL net of fee) and the share
/// accumulator (time-weighted exposure share). The amount owed to a holder over an
/// interval is `position * (acc_end - acc_start)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accumulator {
    pub maker: Fixed,
    pub taker: Fixed,
}

impl Accumulator {
    pub fn new(maker: Fixed, taker: Fixed) -> Self {
        Self { maker, taker }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn try_add(&self, rhs: &Accumulator) -> Result<Accumulator, ArithmeticError> {
        Ok(Accumulator {
            maker: self.maker.try_add(rhs.maker)?,
            taker: self.taker.try_add(rhs.taker)?,
        })
    }

    pub fn try_sub(&self, rhs: &Accumulator) -> Result<Accumulator, ArithmeticError> {
        Ok(Accumulator {
            maker: self.maker.try_sub(rhs.maker)?,
            taker: self.taker.try_sub(rhs.taker)?,
        })
    }

    /// Total owed to `position` for this per-unit delta.
    pub fn apply(&self, position: &Position) -> Result<Fixed, ArithmeticError> {
        let maker = position.maker.try_mul(self.maker)?;
        let taker = position.taker.try_mul(self.taker)?;
        maker.try_add(taker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_weights_each_side() {
        let delta = Accumulator::new(Fixed::from_int(2), Fixed::from_int(-3));
        assert_eq!(
            delta.apply(&Position::maker(Fixed::from_int(5))).unwrap(),
            Fixed::from_int(10)
        );
        assert_eq!(
            delta.apply(&Position::taker(Fixed::from_int(5))).unwrap(),
            Fixed::from_int(-15)
        );
    }

    #[test]
    fn test_interval_delta() {
        let start = Accumulator::new(Fixed::from_int(1), Fixed::from_int(1));
        let end = Accumulator::new(Fixed::from_int(4), Fixed::from_int(-1));
        let delta = end.try_sub(&start).unwrap();
        assert_eq!(delta, Accumulator::new(Fixed::from_int(3), Fixed::from_int(-2)));
        assert_eq!(start.try_add(&delta).unwrap(), end);
    }
}
