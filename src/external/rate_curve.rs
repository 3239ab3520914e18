//! Piecewise-linear funding rate as a function of utilization.

use crate::domain::{ArithmeticError, Fixed, Position};
use serde::{Deserialize, Serialize};

/// Jump-rate utilization curve. Rates are per second.
///
/// Interpolates `minimum_rate -> target_rate` over `[0, target_utilization]` and
/// `target_rate -> maximum_rate` over `[target_utilization, 1]`. Utilization above one
/// pays `maximum_rate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpRateCurve {
    pub minimum_rate: Fixed,
    pub maximum_rate: Fixed,
    pub target_rate: Fixed,
    pub target_utilization: Fixed,
}

impl JumpRateCurve {
    pub fn rate(&self, position: &Position) -> Result<Fixed, ArithmeticError> {
        self.rate_at(position.utilization()?)
    }

    pub fn rate_at(&self, utilization: Fixed) -> Result<Fixed, ArithmeticError> {
        if utilization >= Fixed::ONE {
            return Ok(self.maximum_rate);
        }
        if utilization < self.target_utilization {
            return interpolate(
                Fixed::ZERO,
                self.target_utilization,
                self.minimum_rate,
                self.target_rate,
                utilization,
            );
        }
        interpolate(
            self.target_utilization,
            Fixed::ONE,
            self.target_rate,
            self.maximum_rate,
            utilization,
        )
    }
}

fn interpolate(
    x0: Fixed,
    x1: Fixed,
    y0: Fixed,
    y1: Fixed,
    x: Fixed,
) -> Result<Fixed, ArithmeticError> {
    let span = x1.try_sub(x0)?;
    if span.is_zero() {
        return Ok(y1);
    }
    let progress = x.try_sub(x0)?.try_div(span)?;
    y0.try_add(y1.try_sub(y0)?.try_mul(progress)?)
}
