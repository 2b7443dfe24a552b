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

//! Unified exchange-adapter engine for the TradeKit trading stack.
//!
//! The `tradekit-exchange` crate mediates between strategy logic and
//! heterogeneous venue APIs behind a single surface: market metadata,
//! candle and public-trade history, order placement and querying, balance
//! and position inquiry, funding-fee accounting, leverage-tier lookup, and
//! a simulated (paper-trade) execution path.
//!
//! Venues plug in through the [`adapter::VenueAdapter`] trait plus a
//! per-venue capability record ([`features::Features`]); the engine
//! ([`engine::Exchange`]) consults capabilities before every call instead
//! of inspecting venue identity. Callers see synchronous methods; network
//! I/O runs on an internal single-threaded executor with bounded fan-out.

#![warn(rustc::all)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_panics_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod adapter;
pub mod cache;
pub mod candles;
pub mod config;
pub mod dry_run;
pub mod engine;
pub mod error;
pub mod features;
pub mod funding;
pub mod leverage;
pub mod markets;
pub mod orders;
pub mod pricing;
pub mod retry;
pub mod sidecar;
pub mod trades;
pub mod validate;
pub mod websocket;

pub use adapter::{FundingRateEntry, OrderParams, OrderRequest, VenueAdapter, adapter_has};
pub use config::{ExchangeConfig, OrderTypesConfig, PricingConfig};
pub use engine::{Exchange, REFRESH_BATCH_SIZE, TableKey};
pub use error::{ExchangeError, ExchangeResult};
pub use features::{DEFAULT_CANDLE_LIMIT, FeatureOverrides, Features};
pub use markets::MarketFilter;
pub use retry::{API_FETCH_ORDER_RETRY_COUNT, API_RETRY_COUNT, RetryManager};
pub use websocket::PushCache;
