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

//! Domain model for the TradeKit exchange-adapter engine.
//!
//! The `tradekit-model` crate defines the value types shared between the
//! engine and venue adapters: market descriptors, candles and timeframes,
//! public trades, orders, tickers and L2 order books, leverage tiers, and
//! the precision/rounding primitives used to sanitise values before they
//! reach a venue.
//!
//! All monetary values cross the crate boundary as `f64` in base-currency
//! units; contract-denominated venues are converted at the adapter seam.

#![warn(rustc::all)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_panics_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod book;
pub mod candle;
pub mod enums;
pub mod leverage;
pub mod market;
pub mod order;
pub mod precision;
pub mod timeframe;
pub mod trade;

pub use book::{BookLevel, OrderBook, Ticker};
pub use candle::Candle;
pub use enums::{
    BidAsk, CandleKind, EntryExit, MakerTaker, MarginMode, MarketKind, OrderSide, OrderStatus,
    OrderType, PaginationKind, PriceSide, Rounding, TradingMode,
};
pub use leverage::{LeverageTier, LeverageTierError, validate_tiers};
pub use market::{Market, MarketLimits, MarketPrecision};
pub use order::{Balance, FundingPayment, Order, OrderFee, OrderTrade, Position};
pub use precision::{
    MIN_TICK_SIZE, PrecisionError, PrecisionMode, amount_to_precision, one_pip,
    price_to_precision, round_to_tick,
};
pub use timeframe::{Timeframe, TimeframeError};
pub use trade::Trade;
