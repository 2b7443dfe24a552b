// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Price and amount rounding under the two venue precision models.
//!
//! Venues declare precision either as a number of decimal places or as a
//! tick size (values must be multiples of a declared increment). Rounding
//! is performed in decimal arithmetic to avoid binary-float artifacts and
//! surfaced as `f64`.

use rust_decimal::{Decimal, RoundingStrategy, prelude::FromPrimitive, prelude::ToPrimitive};
use thiserror::Error;

use crate::enums::Rounding;

/// Tick sizes at or below this value mark the market as untradable.
pub const MIN_TICK_SIZE: f64 = 1e-11;

/// Error type produced by the precision engine.
#[derive(Debug, Error, PartialEq)]
pub enum PrecisionError {
    /// The tick size is too small to round against reliably.
    #[error("tick size {0} below minimum {MIN_TICK_SIZE}, market untradable")]
    TickSizeTooSmall(f64),
    /// The value cannot be represented in decimal arithmetic.
    #[error("value {0} not representable as a decimal")]
    NotRepresentable(f64),
    /// The declared decimal-places precision is not a small non-negative integer.
    #[error("invalid decimal-places precision: {0}")]
    InvalidDecimalPlaces(f64),
}

/// Which precision model a venue declares.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionMode {
    /// Precision is an integer count of decimal places.
    DecimalPlaces,
    /// Precision is a float increment; values must be multiples of it.
    TickSize,
}

fn strategy(rounding: Rounding) -> RoundingStrategy {
    match rounding {
        Rounding::Round => RoundingStrategy::MidpointAwayFromZero,
        Rounding::RoundUp => RoundingStrategy::ToPositiveInfinity,
        Rounding::RoundDown => RoundingStrategy::ToNegativeInfinity,
        Rounding::Truncate => RoundingStrategy::ToZero,
    }
}

fn to_decimal(value: f64) -> Result<Decimal, PrecisionError> {
    Decimal::from_f64(value).ok_or(PrecisionError::NotRepresentable(value))
}

/// Rounds `value` to `digits` decimal places.
fn round_decimal_places(
    value: f64,
    digits: f64,
    rounding: Rounding,
) -> Result<f64, PrecisionError> {
    if digits < 0.0 || digits.fract() != 0.0 || digits > 28.0 {
        return Err(PrecisionError::InvalidDecimalPlaces(digits));
    }
    let rounded = to_decimal(value)?.round_dp_with_strategy(digits as u32, strategy(rounding));
    rounded
        .to_f64()
        .ok_or(PrecisionError::NotRepresentable(value))
}

/// Rounds `value` to a multiple of `tick`.
pub fn round_to_tick(value: f64, tick: f64, rounding: Rounding) -> Result<f64, PrecisionError> {
    if tick <= MIN_TICK_SIZE {
        return Err(PrecisionError::TickSizeTooSmall(tick));
    }
    let tick_dec = to_decimal(tick)?;
    let steps = (to_decimal(value)? / tick_dec).round_dp_with_strategy(0, strategy(rounding));
    (steps * tick_dec)
        .to_f64()
        .ok_or(PrecisionError::NotRepresentable(value))
}

/// Rounds a price to the venue's declared precision.
///
/// `precision` carries decimal places or tick size depending on `mode`; a
/// missing precision leaves the price untouched. Entry prices use
/// [`Rounding::Round`]; stop prices use `RoundUp` for longs and `RoundDown`
/// for shorts so the trigger never lands on the unsafe side.
pub fn price_to_precision(
    price: f64,
    precision: Option<f64>,
    mode: PrecisionMode,
    rounding: Rounding,
) -> Result<f64, PrecisionError> {
    let Some(precision) = precision else {
        return Ok(price);
    };
    match mode {
        PrecisionMode::DecimalPlaces => round_decimal_places(price, precision, rounding),
        PrecisionMode::TickSize => round_to_tick(price, precision, rounding),
    }
}

/// Rounds an amount down to the venue's declared precision.
///
/// Amounts always truncate: rounding up could exceed the caller's balance.
pub fn amount_to_precision(
    amount: f64,
    precision: Option<f64>,
    mode: PrecisionMode,
) -> Result<f64, PrecisionError> {
    price_to_precision(amount, precision, mode, Rounding::Truncate)
}

/// Returns the value of one pip for the given price precision.
pub fn one_pip(precision: f64, mode: PrecisionMode) -> f64 {
    match mode {
        PrecisionMode::TickSize => precision,
        PrecisionMode::DecimalPlaces => 10f64.powi(-(precision as i32)),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
