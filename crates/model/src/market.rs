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

//! Tradable-market descriptors as loaded from a venue.

use serde::{Deserialize, Serialize};

use crate::enums::MarketKind;

/// Trading limits declared by the venue for a market.
///
/// `amount` limits are in base-currency units (or contracts on contract
/// venues, converted at the adapter seam); `cost` limits are in quote
/// currency.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketLimits {
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
    pub cost_min: Option<f64>,
    pub cost_max: Option<f64>,
    pub leverage_max: Option<f64>,
}

/// Precision declaration for a market.
///
/// The interpretation depends on the engine-wide precision mode: a number
/// of decimal places, or a tick size increment.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketPrecision {
    pub amount: Option<f64>,
    pub price: Option<f64>,
}

/// A tradable symbol descriptor, identified by a `base/quote[:settle]` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Unified symbol, e.g. `ETH/USDT` or `ETH/USDT:USDT`.
    pub symbol: String,
    /// Base currency code.
    pub base: String,
    /// Quote currency code.
    pub quote: String,
    /// Settlement currency code for swaps.
    pub settle: Option<String>,
    /// Product class.
    pub kind: MarketKind,
    /// Whether the market is currently active for trading.
    pub active: bool,
    /// Multiplier between one venue contract and base-currency units.
    pub contract_size: f64,
    pub precision: MarketPrecision,
    pub limits: MarketLimits,
    /// Taker fee rate.
    pub taker: f64,
    /// Maker fee rate.
    pub maker: f64,
}

impl Market {
    /// Returns `true` for plain spot markets.
    #[must_use]
    pub fn is_spot(&self) -> bool {
        self.kind == MarketKind::Spot
    }

    /// Returns `true` for spot markets with margin borrowing.
    #[must_use]
    pub fn is_margin(&self) -> bool {
        self.kind == MarketKind::Margin
    }

    /// Returns `true` for linear perpetual swaps (the only futures kind the
    /// engine trades).
    #[must_use]
    pub fn is_future(&self) -> bool {
        self.kind == MarketKind::LinearSwap
    }

    /// Returns `true` for inverse perpetual swaps.
    #[must_use]
    pub fn is_inverse(&self) -> bool {
        self.kind == MarketKind::InverseSwap
    }

    /// A market is tradable when both precisions are declared.
    #[must_use]
    pub fn is_tradable(&self) -> bool {
        self.precision.amount.is_some() && self.precision.price.is_some()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn market(kind: MarketKind) -> Market {
        Market {
            symbol: "ETH/USDT".to_string(),
            base: "ETH".to_string(),
            quote: "USDT".to_string(),
            settle: None,
            kind,
            active: true,
            contract_size: 1.0,
            precision: MarketPrecision {
                amount: Some(3.0),
                price: Some(2.0),
            },
            limits: MarketLimits::default(),
            taker: 0.001,
            maker: 0.001,
        }
    }

    #[rstest]
    #[case(MarketKind::Spot, true, false, false)]
    #[case(MarketKind::Margin, false, true, false)]
    #[case(MarketKind::LinearSwap, false, false, true)]
    #[case(MarketKind::InverseSwap, false, false, false)]
    fn test_kind_predicates(
        #[case] kind: MarketKind,
        #[case] spot: bool,
        #[case] margin: bool,
        #[case] future: bool,
    ) {
        let market = market(kind);
        assert_eq!(market.is_spot(), spot);
        assert_eq!(market.is_margin(), margin);
        assert_eq!(market.is_future(), future);
    }

    #[rstest]
    fn test_tradable_requires_precision() {
        let mut market = market(MarketKind::Spot);
        assert!(market.is_tradable());
        market.precision.price = None;
        assert!(!market.is_tradable());
    }
}
