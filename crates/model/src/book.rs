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

//! L2 order book and ticker value types.

use serde::{Deserialize, Serialize};

use crate::enums::{BidAsk, OrderSide};

/// One aggregated depth level: `(price, volume)`.
pub type BookLevel = (f64, f64);

/// Aggregated L2 order book depth.
///
/// Bids are sorted descending by price, asks ascending, as delivered by the
/// venue.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// Returns the side of the book a taker order of `side` fills against.
    #[must_use]
    pub fn opposite_side(&self, side: OrderSide) -> &[BookLevel] {
        match side {
            OrderSide::Buy => &self.asks,
            OrderSide::Sell => &self.bids,
        }
    }

    /// Returns the level at `depth` (1-based) on the given side.
    #[must_use]
    pub fn level_at(&self, side: BidAsk, depth: usize) -> Option<BookLevel> {
        let levels = match side {
            BidAsk::Bid => &self.bids,
            BidAsk::Ask => &self.asks,
        };
        depth.checked_sub(1).and_then(|i| levels.get(i)).copied()
    }
}

/// Snapshot ticker for a single market.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
}

impl Ticker {
    /// Returns the requested side of the ticker.
    #[must_use]
    pub fn side(&self, side: BidAsk) -> Option<f64> {
        match side {
            BidAsk::Bid => self.bid,
            BidAsk::Ask => self.ask,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
