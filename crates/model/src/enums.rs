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

//! Enumerations shared across the engine and venue adapters.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The product class of a tradable market.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MarketKind {
    /// Plain spot market.
    Spot,
    /// Spot market with margin borrowing available.
    Margin,
    /// Perpetual swap settled in the quote currency.
    LinearSwap,
    /// Perpetual swap settled in the base currency.
    InverseSwap,
}

/// The candle flavour carried by an OHLCV table.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CandleKind {
    /// Regular spot candles.
    Spot,
    /// Regular futures candles.
    Futures,
    /// Mark-price candles.
    Mark,
    /// Index-price candles.
    Index,
    /// Premium-index candles.
    PremiumIndex,
    /// Funding-rate "candles" (rate packed into the open field).
    FundingRate,
}

impl CandleKind {
    /// Returns `true` for the regular tradable candle kinds.
    #[must_use]
    pub fn is_price(&self) -> bool {
        matches!(self, Self::Spot | Self::Futures)
    }
}

/// Trading mode the engine operates in.
#[derive(
    Copy, Clone, Debug, Display, PartialEq, Eq, Hash, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TradingMode {
    Spot,
    Margin,
    Futures,
}

impl TradingMode {
    /// Returns the candle kind matching this trading mode.
    #[must_use]
    pub fn candle_kind(&self) -> CandleKind {
        match self {
            Self::Futures => CandleKind::Futures,
            _ => CandleKind::Spot,
        }
    }
}

/// Margin mode for leveraged positions.
#[derive(
    Copy, Clone, Debug, Display, PartialEq, Eq, Hash, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MarginMode {
    Cross,
    Isolated,
}

/// Order side.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposing side.
    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Order type at the engine boundary.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
}

impl OrderType {
    /// Returns `true` for the stop (conditional) order types.
    #[must_use]
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::StopMarket | Self::StopLimit)
    }
}

/// Order lifecycle status.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
    Expired,
    Rejected,
}

impl OrderStatus {
    /// Returns `true` when the order can no longer fill.
    #[must_use]
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// Whether a price is being requested for entering or exiting a position.
#[derive(
    Copy, Clone, Debug, Display, PartialEq, Eq, Hash, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryExit {
    Entry,
    Exit,
}

/// Configured price-side policy for rate selection.
///
/// `Same` and `Other` resolve to a concrete bid/ask side depending on the
/// trade direction; `Bid` and `Ask` are used verbatim.
#[derive(
    Copy, Clone, Debug, Display, PartialEq, Eq, Hash, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PriceSide {
    Same,
    Other,
    Bid,
    Ask,
}

/// Concrete side of the book a rate is taken from.
#[derive(
    Copy, Clone, Debug, Display, PartialEq, Eq, Hash, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BidAsk {
    Bid,
    Ask,
}

/// Liquidity role of a fill, each carrying its own fee rate.
#[derive(
    Copy, Clone, Debug, Display, PartialEq, Eq, Hash, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MakerTaker {
    Maker,
    Taker,
}

/// Pagination dialect used for public trade history.
#[derive(
    Copy, Clone, Debug, Display, PartialEq, Eq, Hash, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaginationKind {
    Time,
    Id,
}

/// Rounding mode applied when sanitising prices and amounts.
#[derive(
    Copy, Clone, Debug, Display, PartialEq, Eq, Hash, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Rounding {
    /// Round half away from zero.
    Round,
    /// Round towards positive infinity.
    RoundUp,
    /// Round towards negative infinity.
    RoundDown,
    /// Round towards zero.
    Truncate,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_order_side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[rstest]
    #[case(CandleKind::Spot, true)]
    #[case(CandleKind::Futures, true)]
    #[case(CandleKind::Mark, false)]
    #[case(CandleKind::FundingRate, false)]
    fn test_candle_kind_is_price(#[case] kind: CandleKind, #[case] expected: bool) {
        assert_eq!(kind.is_price(), expected);
    }

    #[rstest]
    fn test_candle_kind_string_round_trip() {
        assert_eq!(CandleKind::PremiumIndex.to_string(), "premium_index");
        assert_eq!(
            CandleKind::from_str("funding_rate").unwrap(),
            CandleKind::FundingRate
        );
    }

    #[rstest]
    fn test_trading_mode_candle_kind() {
        assert_eq!(TradingMode::Spot.candle_kind(), CandleKind::Spot);
        assert_eq!(TradingMode::Margin.candle_kind(), CandleKind::Spot);
        assert_eq!(TradingMode::Futures.candle_kind(), CandleKind::Futures);
    }

    #[rstest]
    fn test_order_status_is_final() {
        assert!(!OrderStatus::Open.is_final());
        assert!(OrderStatus::Closed.is_final());
        assert!(OrderStatus::Canceled.is_final());
    }
}
