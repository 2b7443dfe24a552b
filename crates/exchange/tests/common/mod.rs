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

//! In-memory mock venue shared by the integration suites.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use ahash::AHashMap;
use async_trait::async_trait;
use tradekit_exchange::{
    ExchangeConfig, ExchangeError, ExchangeResult, FeatureOverrides, FundingRateEntry,
    OrderRequest, VenueAdapter,
};
use tradekit_model::{
    Balance, Candle, CandleKind, FundingPayment, LeverageTier, MakerTaker, MarginMode, Market,
    MarketKind, MarketLimits, MarketPrecision, Order, OrderBook, OrderSide, OrderStatus,
    OrderTrade, OrderType, Position, PrecisionMode, Ticker, Timeframe, Trade, TradingMode,
};

pub const SPOT_PAIR: &str = "ETH/USDT";
pub const FUTURES_PAIR: &str = "ETH/USDT:USDT";

pub fn spot_market() -> Market {
    Market {
        symbol: SPOT_PAIR.to_string(),
        base: "ETH".to_string(),
        quote: "USDT".to_string(),
        settle: None,
        kind: MarketKind::Spot,
        active: true,
        contract_size: 1.0,
        precision: MarketPrecision {
            amount: Some(8.0),
            price: Some(8.0),
        },
        limits: MarketLimits {
            amount_min: Some(0.01),
            amount_max: Some(1_000.0),
            cost_min: Some(10.0),
            cost_max: None,
            leverage_max: None,
        },
        taker: 0.003,
        maker: 0.001,
    }
}

pub fn futures_market() -> Market {
    Market {
        symbol: FUTURES_PAIR.to_string(),
        base: "ETH".to_string(),
        quote: "USDT".to_string(),
        settle: Some("USDT".to_string()),
        kind: MarketKind::LinearSwap,
        active: true,
        contract_size: 1.0,
        precision: MarketPrecision {
            amount: Some(8.0),
            price: Some(8.0),
        },
        limits: MarketLimits {
            amount_min: Some(0.01),
            amount_max: Some(1_000.0),
            cost_min: Some(10.0),
            cost_max: None,
            leverage_max: Some(50.0),
        },
        taker: 0.0005,
        maker: 0.0002,
    }
}

/// Linear swap denominated in contracts of 10 base units.
pub const CONTRACT_PAIR: &str = "DOT/USDT:USDT";

pub fn contract_market() -> Market {
    Market {
        symbol: CONTRACT_PAIR.to_string(),
        base: "DOT".to_string(),
        quote: "USDT".to_string(),
        settle: Some("USDT".to_string()),
        kind: MarketKind::LinearSwap,
        active: true,
        contract_size: 10.0,
        precision: MarketPrecision {
            amount: Some(8.0),
            price: Some(8.0),
        },
        limits: MarketLimits::default(),
        taker: 0.0005,
        maker: 0.0002,
    }
}

pub fn default_tiers() -> Vec<LeverageTier> {
    vec![
        LeverageTier {
            min_notional: 0.0,
            max_notional: 50_000.0,
            maintenance_margin_rate: 0.004,
            max_leverage: 50.0,
            maintenance_amount: None,
        },
        LeverageTier {
            min_notional: 50_000.0,
            max_notional: 250_000.0,
            maintenance_margin_rate: 0.005,
            max_leverage: 20.0,
            maintenance_amount: None,
        },
        LeverageTier {
            min_notional: 250_000.0,
            max_notional: 1_000_000.0,
            maintenance_margin_rate: 0.01,
            max_leverage: 10.0,
            maintenance_amount: None,
        },
    ]
}

/// Programmable in-memory venue.
///
/// Queue-valued fields pop one response per call; an empty queue yields an
/// empty result. Every call is recorded so tests can assert on call
/// counts and arguments.
#[derive(Debug, Default)]
pub struct MockVenue {
    pub markets: AHashMap<String, Market>,
    pub has: AHashMap<String, bool>,
    pub timeframes: Vec<Timeframe>,
    pub features: FeatureOverrides,
    pub futures_features: FeatureOverrides,
    pub trading_modes: Vec<(TradingMode, MarginMode)>,

    pub ohlcv_pages: Mutex<VecDeque<Vec<Candle>>>,
    pub ohlcv_calls: Mutex<Vec<(String, CandleKind, Option<i64>, u32)>>,
    pub funding_rate_pages: Mutex<VecDeque<Vec<FundingRateEntry>>>,

    pub trade_pages: Mutex<VecDeque<Vec<Trade>>>,
    pub trade_id_pages: Mutex<VecDeque<Vec<Trade>>>,
    pub trade_calls: Mutex<Vec<String>>,

    pub order_book: Mutex<OrderBook>,
    pub ticker: Mutex<Ticker>,
    pub tickers: Mutex<AHashMap<String, Ticker>>,

    pub created: Mutex<Vec<OrderRequest>>,
    pub order_responses: Mutex<VecDeque<Order>>,
    pub open_orders: Mutex<AHashMap<String, Order>>,
    pub closed_orders: Mutex<AHashMap<String, Order>>,
    pub my_trades: Mutex<Vec<OrderTrade>>,

    pub balances: Mutex<AHashMap<String, Balance>>,
    pub positions: Mutex<Vec<Position>>,
    pub funding_history: Mutex<Vec<FundingPayment>>,
    pub leverage_tiers: AHashMap<String, Vec<LeverageTier>>,

    pub leverage_calls: Mutex<Vec<(String, f64)>>,
    pub margin_mode_calls: Mutex<Vec<(String, MarginMode)>>,

    order_seq: AtomicU64,
}

impl MockVenue {
    /// Spot venue with one active ETH/USDT market.
    pub fn spot() -> Self {
        let mut venue = Self {
            markets: AHashMap::from_iter([(SPOT_PAIR.to_string(), spot_market())]),
            timeframes: vec![Timeframe::M1, Timeframe::M5, Timeframe::H1, Timeframe::H8],
            ticker: Mutex::new(Ticker {
                symbol: SPOT_PAIR.to_string(),
                bid: Some(99.0),
                ask: Some(101.0),
                last: Some(100.0),
            }),
            order_book: Mutex::new(OrderBook {
                bids: vec![(99.0, 5.0), (98.0, 5.0)],
                asks: vec![(101.0, 5.0), (102.0, 5.0)],
            }),
            ..Default::default()
        };
        for endpoint in [
            "fetchOHLCV",
            "fetchTicker",
            "fetchTickers",
            "fetchL2OrderBook",
            "fetchTrades",
            "createMarketOrder",
            "fetchOrder",
            "fetchMyTrades",
        ] {
            venue.has.insert(endpoint.to_string(), true);
        }
        venue
    }

    /// Futures venue with one linear swap, tiers and funding endpoints.
    pub fn futures() -> Self {
        let mut venue = Self::spot();
        venue
            .markets
            .insert(FUTURES_PAIR.to_string(), futures_market());
        venue
            .markets
            .insert(CONTRACT_PAIR.to_string(), contract_market());
        venue.trading_modes = vec![(TradingMode::Futures, MarginMode::Isolated)];
        for endpoint in [
            "fetchLeverageTiers",
            "fetchFundingHistory",
            "fetchPositions",
            "setLeverage",
            "setMarginMode",
        ] {
            venue.has.insert(endpoint.to_string(), true);
        }
        venue
            .leverage_tiers
            .insert(FUTURES_PAIR.to_string(), default_tiers());
        venue
    }

    pub fn queue_ohlcv(&self, page: Vec<Candle>) {
        self.ohlcv_pages
            .lock()
            .unwrap()
            .push_back(page);
    }

    pub fn queue_trades(&self, page: Vec<Trade>) {
        self.trade_pages.lock().unwrap().push_back(page);
    }

    pub fn queue_trades_by_id(&self, page: Vec<Trade>) {
        self.trade_id_pages.lock().unwrap().push_back(page);
    }

    pub fn set_book(&self, bids: Vec<(f64, f64)>, asks: Vec<(f64, f64)>) {
        *self.order_book.lock().unwrap() = OrderBook { bids, asks };
    }

    pub fn ohlcv_call_count(&self) -> usize {
        self.ohlcv_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl VenueAdapter for MockVenue {
    fn name(&self) -> &str {
        "mockvenue"
    }

    fn has(&self) -> &AHashMap<String, bool> {
        &self.has
    }

    fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    fn precision_mode(&self) -> PrecisionMode {
        PrecisionMode::DecimalPlaces
    }

    fn feature_overrides(&self) -> FeatureOverrides {
        self.features.clone()
    }

    fn feature_overrides_futures(&self) -> FeatureOverrides {
        self.futures_features.clone()
    }

    fn supported_trading_modes(&self) -> Vec<(TradingMode, MarginMode)> {
        self.trading_modes.clone()
    }

    async fn load_markets(&self) -> ExchangeResult<AHashMap<String, Market>> {
        Ok(self.markets.clone())
    }

    async fn fetch_ohlcv(
        &self,
        pair: &str,
        _timeframe: Timeframe,
        kind: CandleKind,
        since_ms: Option<i64>,
        limit: u32,
    ) -> ExchangeResult<Vec<Candle>> {
        self.ohlcv_calls
            .lock()
            .unwrap()
            .push((pair.to_string(), kind, since_ms, limit));
        Ok(self
            .ohlcv_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn fetch_funding_rate_history(
        &self,
        _pair: &str,
        _since_ms: Option<i64>,
        _limit: u32,
    ) -> ExchangeResult<Vec<FundingRateEntry>> {
        Ok(self
            .funding_rate_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn fetch_trades(
        &self,
        _pair: &str,
        since_ms: Option<i64>,
        _limit: u32,
    ) -> ExchangeResult<Vec<Trade>> {
        self.trade_calls
            .lock()
            .unwrap()
            .push(format!("since:{since_ms:?}"));
        Ok(self
            .trade_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn fetch_trades_from_id(
        &self,
        _pair: &str,
        cursor_arg: &str,
        from_id: &str,
        _limit: u32,
    ) -> ExchangeResult<Vec<Trade>> {
        self.trade_calls
            .lock()
            .unwrap()
            .push(format!("{cursor_arg}:{from_id}"));
        Ok(self
            .trade_id_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn fetch_l2_order_book(
        &self,
        _pair: &str,
        _limit: Option<u32>,
    ) -> ExchangeResult<OrderBook> {
        Ok(self.order_book.lock().unwrap().clone())
    }

    async fn fetch_ticker(&self, _pair: &str) -> ExchangeResult<Ticker> {
        Ok(self.ticker.lock().unwrap().clone())
    }

    async fn fetch_tickers(
        &self,
        _symbols: Option<&[String]>,
        _market_type: Option<TradingMode>,
    ) -> ExchangeResult<AHashMap<String, Ticker>> {
        Ok(self.tickers.lock().unwrap().clone())
    }

    async fn fetch_bids_asks(
        &self,
        _symbols: Option<&[String]>,
    ) -> ExchangeResult<AHashMap<String, Ticker>> {
        Ok(self.tickers.lock().unwrap().clone())
    }

    async fn create_order(&self, request: &OrderRequest) -> ExchangeResult<Order> {
        self.created.lock().unwrap().push(request.clone());
        if let Some(order) = self.order_responses.lock().unwrap().pop_front() {
            return Ok(order);
        }
        let seq = self.order_seq.fetch_add(1, Ordering::SeqCst);
        Ok(Order {
            id: format!("mock-{seq}"),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: if request.order_type == "market" {
                OrderType::Market
            } else {
                OrderType::Limit
            },
            amount: request.amount,
            price: request.price,
            average: None,
            filled: 0.0,
            remaining: request.amount,
            cost: 0.0,
            status: OrderStatus::Open,
            fee: None,
            ts_ms: 1_700_000_000_000,
            stop_price: None,
            is_stop: false,
        })
    }

    async fn cancel_order(&self, order_id: &str, pair: &str) -> ExchangeResult<Order> {
        let mut order = self
            .open_orders
            .lock()
            .unwrap()
            .remove(order_id)
            .ok_or_else(|| ExchangeError::InvalidOrder(format!("unknown order {order_id}")))?;
        assert_eq!(order.symbol, pair);
        order.status = OrderStatus::Canceled;
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str, pair: &str) -> ExchangeResult<Order> {
        self.fetch_open_order(order_id, pair).await.or(self
            .closed_orders
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| {
                ExchangeError::RetryableOrder(format!("order {order_id} not found"))
            }))
    }

    async fn fetch_open_order(&self, order_id: &str, _pair: &str) -> ExchangeResult<Order> {
        self.open_orders
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| ExchangeError::RetryableOrder(format!("order {order_id} not found")))
    }

    async fn fetch_closed_order(&self, order_id: &str, _pair: &str) -> ExchangeResult<Order> {
        self.closed_orders
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| ExchangeError::RetryableOrder(format!("order {order_id} not found")))
    }

    async fn fetch_orders(&self, pair: &str, since_ms: i64) -> ExchangeResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .open_orders
            .lock()
            .unwrap()
            .values()
            .chain(self.closed_orders.lock().unwrap().values())
            .filter(|o| o.symbol == pair && o.ts_ms >= since_ms)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.ts_ms.cmp(&b.ts_ms));
        Ok(orders)
    }

    async fn fetch_open_orders(&self, pair: &str, since_ms: i64) -> ExchangeResult<Vec<Order>> {
        Ok(self
            .open_orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.symbol == pair && o.ts_ms >= since_ms)
            .cloned()
            .collect())
    }

    async fn fetch_closed_orders(&self, pair: &str, since_ms: i64) -> ExchangeResult<Vec<Order>> {
        Ok(self
            .closed_orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.symbol == pair && o.ts_ms >= since_ms)
            .cloned()
            .collect())
    }

    async fn fetch_my_trades(&self, _pair: &str, since_ms: i64) -> ExchangeResult<Vec<OrderTrade>> {
        Ok(self
            .my_trades
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.ts_ms >= since_ms)
            .cloned()
            .collect())
    }

    async fn fetch_balances(&self) -> ExchangeResult<AHashMap<String, Balance>> {
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn fetch_positions(&self, pair: Option<&str>) -> ExchangeResult<Vec<Position>> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| pair.is_none_or(|pair| p.symbol == pair))
            .cloned()
            .collect())
    }

    async fn set_leverage(&self, pair: &str, leverage: f64) -> ExchangeResult<()> {
        self.leverage_calls
            .lock()
            .unwrap()
            .push((pair.to_string(), leverage));
        Ok(())
    }

    async fn set_margin_mode(&self, pair: &str, margin_mode: MarginMode) -> ExchangeResult<()> {
        self.margin_mode_calls
            .lock()
            .unwrap()
            .push((pair.to_string(), margin_mode));
        Ok(())
    }

    async fn fetch_funding_history(
        &self,
        _pair: &str,
        since_ms: i64,
    ) -> ExchangeResult<Vec<FundingPayment>> {
        Ok(self
            .funding_history
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.ts_ms >= since_ms)
            .cloned()
            .collect())
    }

    async fn fetch_leverage_tiers(
        &self,
    ) -> ExchangeResult<AHashMap<String, Vec<LeverageTier>>> {
        Ok(self.leverage_tiers.clone())
    }

    async fn fetch_market_leverage_tiers(
        &self,
        symbol: &str,
    ) -> ExchangeResult<Vec<LeverageTier>> {
        self.leverage_tiers
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExchangeError::Exchange(format!("no tiers for {symbol}")))
    }

    async fn calculate_fee(
        &self,
        symbol: &str,
        _order_type: &str,
        _side: OrderSide,
        _amount: f64,
        _price: f64,
        maker_taker: MakerTaker,
    ) -> ExchangeResult<f64> {
        let market = self
            .markets
            .get(symbol)
            .ok_or_else(|| ExchangeError::Exchange(format!("unknown symbol {symbol}")))?;
        Ok(match maker_taker {
            MakerTaker::Maker => market.maker,
            MakerTaker::Taker => market.taker,
        })
    }
}

/// Dry-run spot configuration rooted in a temp directory.
pub fn spot_config(datadir: &std::path::Path) -> ExchangeConfig {
    ExchangeConfig {
        dry_run: true,
        trading_mode: TradingMode::Spot,
        stake_currency: "USDT".to_string(),
        datadir: datadir.to_path_buf(),
        ..Default::default()
    }
}

/// Dry-run isolated-futures configuration rooted in a temp directory.
pub fn futures_config(datadir: &std::path::Path) -> ExchangeConfig {
    ExchangeConfig {
        dry_run: true,
        trading_mode: TradingMode::Futures,
        margin_mode: Some(MarginMode::Isolated),
        stake_currency: "USDT".to_string(),
        datadir: datadir.to_path_buf(),
        ..Default::default()
    }
}
