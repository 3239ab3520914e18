//! One accumulator step: funding, price PnL and time share between two oracle versions.
//!
//! Funding and PnL only flow on the matched notional `min(maker, taker)`. When takers
//! outnumber makers the unmatched remainder neither pays nor receives, which scales every
//! taker by `maker / taker` and fills every maker completely. The factor is taken from the
//! aggregate position in force for the step, so a later change to the aggregate never
//! rewrites an earlier step.

use crate::domain::{Accumulator, ArithmeticError, Fixed, Position, Version};
use crate::external::OracleVersion;
use serde::{Deserialize, Serialize};

/// Signed totals per side for one step. Positive is a credit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideTotals {
    pub maker: Fixed,
    pub taker: Fixed,
}

impl SideTotals {
    pub fn try_add(&self, rhs: &SideTotals) -> Result<SideTotals, ArithmeticError> {
        Ok(SideTotals {
            maker: self.maker.try_add(rhs.maker)?,
            taker: self.taker.try_add(rhs.taker)?,
        })
    }
}

/// Result of accruing one version boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualStep {
    pub version: Version,
    pub elapsed: u64,
    pub rate: Fixed,
    /// Aggregate position the step accrued against.
    pub position: Position,
    /// Funding transferred, with the fee already withheld from the receiving side.
    pub funding: SideTotals,
    pub funding_fee: Fixed,
    pub pnl: SideTotals,
    /// Per-unit value change (funding + PnL) for each side.
    pub value: Accumulator,
    /// Per-unit share change for each side.
    pub share: Accumulator,
}

impl AccrualStep {
    /// Total credited to makers across funding and PnL.
    pub fn maker_total(&self) -> Result<Fixed, ArithmeticError> {
        self.funding.maker.try_add(self.pnl.maker)
    }

    /// Total credited to takers across funding and PnL.
    pub fn taker_total(&self) -> Result<Fixed, ArithmeticError> {
        self.funding.taker.try_add(self.pnl.taker)
    }
}

/// Inputs that stay fixed for a whole settlement call.
#[derive(Debug, Clone, Copy)]
pub struct AccrualParams {
    /// Effective share of funding withheld as protocol fee.
    pub funding_fee: Fixed,
    /// When set, no funding or PnL flows; time share still accrues.
    pub closed: bool,
}

/// Accrue the step from `from` into `to` against the aggregate `position`.
pub fn accrue(
    position: &Position,
    from: &OracleVersion,
    to: &OracleVersion,
    elapsed: u64,
    rate: Fixed,
    params: AccrualParams,
) -> Result<AccrualStep, ArithmeticError> {
    let matched = position.matched();
    let (funding, funding_fee, pnl) = if params.closed || matched.is_zero() {
        (SideTotals::default(), Fixed::ZERO, SideTotals::default())
    } else {
        let (funding, fee) = funding(matched, from.price, elapsed, rate, params.funding_fee)?;
        (funding, fee, pnl(matched, from.price, to.price)?)
    };

    let value = Accumulator {
        maker: funding
            .maker
            .try_add(pnl.maker)?
            .div_or_zero(position.maker)?,
        taker: funding
            .taker
            .try_add(pnl.taker)?
            .div_or_zero(position.taker)?,
    };

    Ok(AccrualStep {
        version: to.version,
        elapsed,
        rate,
        position: *position,
        funding,
        funding_fee,
        pnl,
        value,
        share: share(position, elapsed)?,
    })
}

/// Funding on the matched notional at the starting price. Positive rates move value from
/// takers to makers; the fee comes out of whichever side receives.
fn funding(
    matched: Fixed,
    price: Fixed,
    elapsed: u64,
    rate: Fixed,
    fee_rate: Fixed,
) -> Result<(SideTotals, Fixed), ArithmeticError> {
    let notional = matched.try_mul(price.abs())?;
    let gross = rate
        .try_mul(Fixed::from(elapsed_i64(elapsed)?))?
        .try_mul(notional)?;
    let fee = gross.abs().try_mul(fee_rate)?;

    let totals = if gross.is_negative() {
        SideTotals {
            maker: gross,
            taker: gross.abs().try_sub(fee)?,
        }
    } else {
        SideTotals {
            maker: gross.try_sub(fee)?,
            taker: -gross,
        }
    };
    Ok((totals, fee))
}

/// Takers are long the signed price on the matched notional; makers hold the other side.
fn pnl(matched: Fixed, from_price: Fixed, to_price: Fixed) -> Result<SideTotals, ArithmeticError> {
    let taker = to_price.try_sub(from_price)?.try_mul(matched)?;
    Ok(SideTotals {
        maker: -taker,
        taker,
    })
}

/// `elapsed * min(utilization, 1)` for makers and `elapsed * min(1, maker / taker)` for
/// takers. A side with no exposure earns no share.
fn share(position: &Position, elapsed: u64) -> Result<Accumulator, ArithmeticError> {
    let elapsed = Fixed::from(elapsed_i64(elapsed)?);
    let maker = if position.maker.is_zero() {
        Fixed::ZERO
    } else {
        elapsed.try_mul(position.utilization()?.min(Fixed::ONE))?
    };
    let taker = if position.taker.is_zero() {
        Fixed::ZERO
    } else {
        elapsed.try_mul(position.socialization_factor()?)?
    };
    Ok(Accumulator { maker, taker })
}

fn elapsed_i64(elapsed: u64) -> Result<i64, ArithmeticError> {
    i64::try_from(elapsed).map_err(|_| ArithmeticError::Overflow)
}
