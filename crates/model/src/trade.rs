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

//! The public-trade value type.

use serde::{Deserialize, Serialize};

use crate::enums::OrderSide;

/// A single public trade as reported by a venue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Execution time in UTC milliseconds.
    pub ts_ms: i64,
    /// Venue-assigned trade id, unique per market.
    pub id: String,
    pub price: f64,
    /// Traded amount in base-currency units.
    pub amount: f64,
    pub side: OrderSide,
    /// Quote-currency cost (`price * amount`).
    pub cost: f64,
}

impl Trade {
    /// Creates a new [`Trade`] instance.
    #[must_use]
    pub fn new(
        ts_ms: i64,
        id: impl Into<String>,
        price: f64,
        amount: f64,
        side: OrderSide,
    ) -> Self {
        Self {
            ts_ms,
            id: id.into(),
            price,
            amount,
            side,
            cost: price * amount,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_cost_derived_from_price_and_amount() {
        let trade = Trade::new(1_700_000_000_000, "t-1", 10.0, 2.5, OrderSide::Buy);
        assert_eq!(trade.cost, 25.0);
    }

    #[rstest]
    fn test_serde_round_trip() {
        let trade = Trade::new(1_700_000_000_000, "t-1", 10.0, 2.5, OrderSide::Sell);
        let json = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trade);
    }
}
