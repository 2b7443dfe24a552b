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

//! Order and account value types at the engine boundary.

use serde::{Deserialize, Serialize};

use crate::enums::{OrderSide, OrderStatus, OrderType};

/// Fee attributed to an order or fill.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderFee {
    /// Currency the fee was charged in.
    pub currency: String,
    /// Absolute fee cost in `currency`.
    pub cost: f64,
    /// Fee rate, if the venue reported one.
    pub rate: Option<f64>,
}

/// An order record as seen by strategy callers.
///
/// `amount`, `filled` and `remaining` are always base-currency units at this
/// boundary; contract-denominated venues are converted on ingress/egress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Client-visible order id.
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Requested amount in base currency.
    pub amount: f64,
    /// Requested price; absent for pure market orders.
    pub price: Option<f64>,
    /// Average fill price.
    pub average: Option<f64>,
    pub filled: f64,
    pub remaining: f64,
    /// Quote-currency cost of the filled portion.
    pub cost: f64,
    pub status: OrderStatus,
    pub fee: Option<OrderFee>,
    /// Order creation time in UTC milliseconds.
    pub ts_ms: i64,
    /// Trigger price for stop orders.
    pub stop_price: Option<f64>,
    /// Sentinel marking orders the simulator must not fill against the book.
    #[serde(default)]
    pub is_stop: bool,
}

impl Order {
    /// Returns `true` when the order was cancelled without any fill.
    #[must_use]
    pub fn is_canceled_empty(&self) -> bool {
        self.status.is_final() && self.status != OrderStatus::Closed && self.filled == 0.0
    }

    /// Returns `true` when the record carries a usable fee substructure.
    #[must_use]
    pub fn has_fee(&self) -> bool {
        self.fee
            .as_ref()
            .is_some_and(|f| !f.currency.is_empty() && f.cost.is_finite())
    }
}

/// A fill belonging to one of the caller's own orders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderTrade {
    /// Id of the order this fill belongs to.
    pub order_id: String,
    pub ts_ms: i64,
    pub price: f64,
    pub amount: f64,
    pub side: OrderSide,
    pub cost: f64,
    pub fee: Option<OrderFee>,
}

/// Per-currency wallet balance.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub free: f64,
    pub used: f64,
    pub total: f64,
}

/// An open position as reported by a venue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: OrderSide,
    /// Position size in base-currency units.
    pub amount: f64,
    pub entry_price: Option<f64>,
    pub liquidation_price: Option<f64>,
    pub leverage: Option<f64>,
}

/// One funding payment from the venue's funding history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FundingPayment {
    pub ts_ms: i64,
    /// Settlement-currency amount; sign as reported by the venue.
    pub amount: f64,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
