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

//! The venue-adapter seam.
//!
//! Each venue implements [`VenueAdapter`]; the engine never talks to a wire
//! format directly. Default methods cover behaviour most venues share
//! (funding-rate packing, pagination-id validation); venues with quirks
//! override them. Implementations hold no mutable state beyond a reference
//! to their underlying client.

use ahash::AHashMap;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use tradekit_model::{
    Balance, Candle, CandleKind, FundingPayment, LeverageTier, MakerTaker, MarginMode, Market,
    Order, OrderBook, OrderSide, OrderTrade, Position, PrecisionMode, Ticker, Timeframe, Trade,
    TradingMode,
};

use crate::{
    error::{ExchangeError, ExchangeResult},
    features::FeatureOverrides,
};

/// Sanitised order request handed to a venue adapter.
///
/// `amount` and `price` are already rounded to venue precision and, on
/// contract venues, converted to contracts by the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    /// Venue order type token, e.g. `limit`, `market`, or a venue stop type.
    pub order_type: String,
    pub side: OrderSide,
    pub amount: f64,
    pub price: Option<f64>,
    pub params: OrderParams,
}

/// Venue-specific request parameters attached to an order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderParams {
    /// Time-in-force token, attached when not GTC.
    pub time_in_force: Option<String>,
    pub reduce_only: bool,
    /// Residual key/value parameters (stop trigger price and friends).
    pub extra: IndexMap<String, Value>,
}

/// One raw funding-rate history entry.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FundingRateEntry {
    pub ts_ms: i64,
    pub rate: f64,
}

/// The interface every venue must provide to the engine.
#[async_trait]
pub trait VenueAdapter: Send + Sync + std::fmt::Debug {
    /// Venue name used in logs and error messages.
    fn name(&self) -> &str;

    /// The venue's endpoint capability map (`fetchOHLCV` and friends).
    fn has(&self) -> &AHashMap<String, bool>;

    /// Timeframes the venue serves candles for.
    fn timeframes(&self) -> &[Timeframe];

    /// Venue-declared default candle limit per request, if any.
    fn default_candle_limit(&self) -> Option<u32> {
        None
    }

    /// Precision model the venue declares for amounts.
    fn precision_mode(&self) -> PrecisionMode {
        PrecisionMode::TickSize
    }

    /// Precision model for prices; defaults to the amount model.
    fn precision_mode_price(&self) -> PrecisionMode {
        self.precision_mode()
    }

    /// Capability overrides layered onto the built-in defaults.
    fn feature_overrides(&self) -> FeatureOverrides {
        FeatureOverrides::default()
    }

    /// Additional capability overrides applied when trading futures.
    fn feature_overrides_futures(&self) -> FeatureOverrides {
        FeatureOverrides::default()
    }

    /// Leveraged `(trading mode, margin mode)` combinations the venue
    /// supports; spot is always supported and not listed.
    fn supported_trading_modes(&self) -> Vec<(TradingMode, MarginMode)> {
        Vec::new()
    }

    // -- Market data ----------------------------------------------------------

    async fn load_markets(&self) -> ExchangeResult<AHashMap<String, Market>>;

    async fn fetch_ohlcv(
        &self,
        pair: &str,
        timeframe: Timeframe,
        kind: CandleKind,
        since_ms: Option<i64>,
        limit: u32,
    ) -> ExchangeResult<Vec<Candle>>;

    /// Raw funding-rate history; the engine packs entries into the candle
    /// layout. Venues with custom pagination override this.
    async fn fetch_funding_rate_history(
        &self,
        pair: &str,
        since_ms: Option<i64>,
        limit: u32,
    ) -> ExchangeResult<Vec<FundingRateEntry>>;

    async fn fetch_trades(
        &self,
        pair: &str,
        since_ms: Option<i64>,
        limit: u32,
    ) -> ExchangeResult<Vec<Trade>>;

    /// Id-cursor variant of [`Self::fetch_trades`]; `cursor_arg` names the
    /// request key carrying the id.
    async fn fetch_trades_from_id(
        &self,
        pair: &str,
        cursor_arg: &str,
        from_id: &str,
        limit: u32,
    ) -> ExchangeResult<Vec<Trade>>;

    /// Validates an id before it is used as a pagination cursor. Venues
    /// with occasionally-wrong ids override this to force the timestamp
    /// fallback.
    fn validate_trade_pagination_id(&self, _pair: &str, _from_id: &str) -> bool {
        true
    }

    async fn fetch_l2_order_book(
        &self,
        pair: &str,
        limit: Option<u32>,
    ) -> ExchangeResult<OrderBook>;

    async fn fetch_ticker(&self, pair: &str) -> ExchangeResult<Ticker>;

    async fn fetch_tickers(
        &self,
        symbols: Option<&[String]>,
        market_type: Option<TradingMode>,
    ) -> ExchangeResult<AHashMap<String, Ticker>>;

    async fn fetch_bids_asks(
        &self,
        symbols: Option<&[String]>,
    ) -> ExchangeResult<AHashMap<String, Ticker>>;

    // -- Orders ---------------------------------------------------------------

    async fn create_order(&self, request: &OrderRequest) -> ExchangeResult<Order>;

    async fn cancel_order(&self, order_id: &str, pair: &str) -> ExchangeResult<Order>;

    async fn fetch_order(&self, order_id: &str, pair: &str) -> ExchangeResult<Order>;

    async fn fetch_open_order(&self, order_id: &str, pair: &str) -> ExchangeResult<Order>;

    async fn fetch_closed_order(&self, order_id: &str, pair: &str) -> ExchangeResult<Order>;

    async fn fetch_orders(&self, pair: &str, since_ms: i64) -> ExchangeResult<Vec<Order>>;

    async fn fetch_open_orders(&self, pair: &str, since_ms: i64) -> ExchangeResult<Vec<Order>>;

    async fn fetch_closed_orders(&self, pair: &str, since_ms: i64) -> ExchangeResult<Vec<Order>>;

    async fn fetch_my_trades(&self, pair: &str, since_ms: i64) -> ExchangeResult<Vec<OrderTrade>>;

    // -- Account --------------------------------------------------------------

    async fn fetch_balances(&self) -> ExchangeResult<AHashMap<String, Balance>>;

    async fn fetch_positions(&self, pair: Option<&str>) -> ExchangeResult<Vec<Position>>;

    async fn set_leverage(&self, pair: &str, leverage: f64) -> ExchangeResult<()>;

    async fn set_margin_mode(&self, pair: &str, margin_mode: MarginMode) -> ExchangeResult<()>;

    // -- Funding & leverage ---------------------------------------------------

    async fn fetch_funding_history(
        &self,
        pair: &str,
        since_ms: i64,
    ) -> ExchangeResult<Vec<FundingPayment>>;

    async fn fetch_leverage_tiers(&self) -> ExchangeResult<AHashMap<String, Vec<LeverageTier>>>;

    async fn fetch_market_leverage_tiers(
        &self,
        symbol: &str,
    ) -> ExchangeResult<Vec<LeverageTier>>;

    // -- Fees -----------------------------------------------------------------

    /// Computes the fee rate the venue would charge for the described order.
    async fn calculate_fee(
        &self,
        symbol: &str,
        order_type: &str,
        side: OrderSide,
        amount: f64,
        price: f64,
        maker_taker: MakerTaker,
    ) -> ExchangeResult<f64>;
}

/// Checks a named endpoint against the adapter capability map.
pub fn adapter_has(adapter: &dyn VenueAdapter, endpoint: &str) -> bool {
    adapter.has().get(endpoint).copied().unwrap_or(false)
}

/// Helper constructing a "not supported" operational error.
pub fn unsupported(venue: &str, what: &str) -> ExchangeError {
    ExchangeError::Operational(format!("Exchange {venue} does not support {what}"))
}
