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

//! The central engine object owning all process-scoped state.
//!
//! The engine exposes synchronous methods to callers and drives network
//! I/O on an internal current-thread Tokio runtime. A single "loop lock"
//! serialises entry into that runtime from otherwise-parallel callers;
//! fan-out inside the runtime is bounded at 100 concurrent tasks per batch.

use std::{
    fmt::Display,
    future::Future,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use ahash::AHashMap;
use chrono::Utc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tradekit_model::{
    Candle, CandleKind, LeverageTier, Market, Order, PrecisionMode, Rounding, Ticker, Timeframe,
    Trade, amount_to_precision, one_pip, price_to_precision,
};

use crate::{
    adapter::VenueAdapter,
    cache::{PeriodicCache, TtlCache},
    config::ExchangeConfig,
    error::{ExchangeError, ExchangeResult},
    features::Features,
    retry::RetryManager,
    websocket::PushCache,
};

/// Refresh batches run at most this many concurrent venue calls.
pub const REFRESH_BATCH_SIZE: usize = 100;

/// Rate caches hold entries for this long.
pub(crate) const RATE_CACHE_TTL: Duration = Duration::from_secs(300);
/// Ticker cache holds entries for this long.
pub(crate) const TICKERS_CACHE_TTL: Duration = Duration::from_secs(600);
/// Market reload failures are tolerated for this many refresh intervals.
pub(crate) const MARKET_STALENESS_INTERVALS: u32 = 3;

/// Key of one in-memory OHLCV or trade table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub pair: String,
    pub timeframe: Timeframe,
    pub kind: CandleKind,
}

impl TableKey {
    /// Creates a new [`TableKey`] instance.
    #[must_use]
    pub fn new(pair: impl Into<String>, timeframe: Timeframe, kind: CandleKind) -> Self {
        Self {
            pair: pair.into(),
            timeframe,
            kind,
        }
    }
}

impl Display for TableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.pair, self.timeframe, self.kind)
    }
}

/// The unified exchange engine.
///
/// Wraps a [`VenueAdapter`] with market-data caching, order lifecycle
/// management, pricing, leverage and funding accounting. All shared state
/// is owned here and mutated only under its respective lock; there is no
/// ambient module state.
pub struct Exchange {
    pub(crate) adapter: Arc<dyn VenueAdapter>,
    pub(crate) config: ExchangeConfig,
    pub(crate) features: Features,
    runtime: Runtime,
    loop_lock: Mutex<()>,
    pub(crate) retry: RetryManager,
    pub(crate) cancel_token: CancellationToken,

    pub(crate) markets: RwLock<Arc<AHashMap<String, Market>>>,
    pub(crate) last_markets_refresh: Mutex<i64>,
    pub(crate) markets_reload_failures: Mutex<u32>,

    pub(crate) klines: Mutex<AHashMap<TableKey, Vec<Candle>>>,
    pub(crate) pairs_last_refresh: Mutex<AHashMap<TableKey, i64>>,
    pub(crate) expiring_candle_cache:
        Mutex<AHashMap<(Timeframe, i64), PeriodicCache<TableKey, Vec<Candle>>>>,

    pub(crate) trades: Mutex<AHashMap<TableKey, Vec<Trade>>>,

    pub(crate) dry_run_orders: Mutex<AHashMap<String, Order>>,
    pub(crate) dry_order_seq: std::sync::atomic::AtomicU64,

    pub(crate) entry_rate_cache: Mutex<TtlCache<String, f64>>,
    pub(crate) exit_rate_cache: Mutex<TtlCache<String, f64>>,
    pub(crate) tickers_cache: Mutex<TtlCache<String, AHashMap<String, Ticker>>>,

    pub(crate) leverage_tiers: RwLock<AHashMap<String, Vec<LeverageTier>>>,

    pub(crate) push: Option<Arc<PushCache>>,
    pub(crate) required_candle_call_count: u32,
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("venue", &self.adapter.name())
            .field("dry_run", &self.config.dry_run)
            .field("trading_mode", &self.config.trading_mode)
            .finish_non_exhaustive()
    }
}

impl Exchange {
    /// Creates the engine, loads markets and validates the configuration.
    ///
    /// The initial market load is retried; leverage tiers are bulk-loaded
    /// for futures configurations.
    pub fn new(
        adapter: Arc<dyn VenueAdapter>,
        config: ExchangeConfig,
    ) -> ExchangeResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| ExchangeError::Operational(format!("failed to build runtime: {e}")))?;

        let mut features = Features::merged(
            &adapter.feature_overrides(),
            (config.trading_mode == tradekit_model::TradingMode::Futures)
                .then(|| adapter.feature_overrides_futures())
                .as_ref(),
            &config.feature_overrides,
        );
        for tif in &mut features.order_time_in_force {
            *tif = tif.to_uppercase();
        }

        if config.dry_run {
            log::info!("Instance is running with dry_run enabled");
        }
        log::info!("Using exchange {}", adapter.name());

        let push = (features.ws_enabled && config.enable_ws).then(|| Arc::new(PushCache::new()));
        let retry = RetryManager::new(config.retry_delay_initial_ms, config.retry_delay_max_ms);

        let mut exchange = Self {
            adapter,
            config,
            features,
            runtime,
            loop_lock: Mutex::new(()),
            retry,
            cancel_token: CancellationToken::new(),
            markets: RwLock::new(Arc::new(AHashMap::new())),
            last_markets_refresh: Mutex::new(0),
            markets_reload_failures: Mutex::new(0),
            klines: Mutex::new(AHashMap::new()),
            pairs_last_refresh: Mutex::new(AHashMap::new()),
            expiring_candle_cache: Mutex::new(AHashMap::new()),
            trades: Mutex::new(AHashMap::new()),
            dry_run_orders: Mutex::new(AHashMap::new()),
            dry_order_seq: std::sync::atomic::AtomicU64::new(0),
            entry_rate_cache: Mutex::new(TtlCache::new(RATE_CACHE_TTL, 100)),
            exit_rate_cache: Mutex::new(TtlCache::new(RATE_CACHE_TTL, 100)),
            tickers_cache: Mutex::new(TtlCache::new(TICKERS_CACHE_TTL, 4)),
            leverage_tiers: RwLock::new(AHashMap::new()),
            push,
            required_candle_call_count: 1,
        };

        exchange.reload_markets(true)?;
        exchange.validate_config()?;
        exchange.required_candle_call_count = exchange.validate_required_startup_candles(
            exchange.config.startup_candle_count,
            exchange.config.timeframe,
        )?;

        if exchange.config.trading_mode == tradekit_model::TradingMode::Futures {
            exchange.fill_leverage_tiers()?;
        }

        Ok(exchange)
    }

    /// Shuts the engine down: cancels in-flight work and stops the
    /// WebSocket push cache. Sidecar writes are synchronous, so nothing is
    /// left pending.
    pub fn close(&self) {
        self.cancel_token.cancel();
        if let Some(push) = &self.push {
            push.reset_connections();
        }
        log::debug!("Exchange engine closed");
    }

    /// Runs a future on the internal runtime under the loop lock.
    pub(crate) fn run<F: Future>(&self, fut: F) -> F::Output {
        let _guard = self
            .loop_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.runtime.block_on(fut)
    }

    /// Venue name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    /// The merged capability record in force.
    #[must_use]
    pub fn features(&self) -> &Features {
        &self.features
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// The WebSocket push cache, when the venue feed is trusted.
    #[must_use]
    pub fn push_cache(&self) -> Option<&Arc<PushCache>> {
        self.push.as_ref()
    }

    /// Number of REST calls needed to satisfy the startup candle count.
    #[must_use]
    pub fn required_candle_call_count(&self) -> u32 {
        self.required_candle_call_count
    }

    /// Timeframes the venue supports.
    #[must_use]
    pub fn timeframes(&self) -> &[Timeframe] {
        self.adapter.timeframes()
    }

    /// Checks whether the venue implements a named endpoint, honouring
    /// capability overrides.
    #[must_use]
    pub fn exchange_has(&self, endpoint: &str) -> bool {
        if let Some(forced) = self.features.exchange_has_overrides.get(endpoint) {
            return *forced;
        }
        self.adapter.has().get(endpoint).copied().unwrap_or(false)
    }

    /// Resolves the candle limit for one `(timeframe, kind)` pull.
    #[must_use]
    pub fn ohlcv_candle_limit(&self, timeframe: Timeframe, kind: CandleKind) -> u32 {
        self.features
            .candle_limit(timeframe, kind, self.adapter.default_candle_limit())
    }

    /// Current UTC time in milliseconds.
    pub(crate) fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    // -- Precision & contracts ------------------------------------------------

    /// Rounds an amount down to the market's precision.
    pub fn amount_to_precision(&self, pair: &str, amount: f64) -> ExchangeResult<f64> {
        let market = self.market(pair)?;
        Ok(amount_to_precision(
            amount,
            market.precision.amount,
            self.adapter.precision_mode(),
        )?)
    }

    /// Rounds a price to the market's precision with the given mode.
    pub fn price_to_precision(
        &self,
        pair: &str,
        price: f64,
        rounding: Rounding,
    ) -> ExchangeResult<f64> {
        let market = self.market(pair)?;
        Ok(price_to_precision(
            price,
            market.precision.price,
            self.adapter.precision_mode_price(),
            rounding,
        )?)
    }

    /// The value of one pip for the pair.
    pub fn price_one_pip(&self, pair: &str) -> ExchangeResult<f64> {
        let market = self.market(pair)?;
        let precision = market
            .precision
            .price
            .ok_or_else(|| ExchangeError::Exchange(format!("no price precision for {pair}")))?;
        Ok(one_pip(precision, self.adapter.precision_mode_price()))
    }

    /// Contract size for the pair, when the market is contract-denominated.
    pub fn contract_size(&self, pair: &str) -> ExchangeResult<f64> {
        let market = self.market(pair)?;
        Ok(market.contract_size)
    }

    /// Converts base-currency units into venue contracts.
    pub fn amount_to_contracts(&self, pair: &str, amount: f64) -> ExchangeResult<f64> {
        Ok(amount / self.contract_size(pair)?)
    }

    /// Converts venue contracts into base-currency units.
    pub fn contracts_to_amount(&self, pair: &str, contracts: f64) -> ExchangeResult<f64> {
        Ok(contracts * self.contract_size(pair)?)
    }

    /// Rounds an amount to precision, respecting contract sizes.
    pub fn amount_to_contract_precision(&self, pair: &str, amount: f64) -> ExchangeResult<f64> {
        let contracts = self.amount_to_contracts(pair, amount)?;
        let market = self.market(pair)?;
        let rounded = amount_to_precision(
            contracts,
            market.precision.amount,
            self.adapter.precision_mode(),
        )?;
        self.contracts_to_amount(pair, rounded)
    }

    /// Converts the contract-denominated fields of an order into
    /// base-currency units, per the capability matrix.
    pub(crate) fn order_contracts_to_amount(&self, mut order: Order) -> Order {
        let Ok(contract_size) = self.contract_size(&order.symbol) else {
            return order;
        };
        if contract_size == 1.0 {
            return order;
        }
        for prop in &self.features.order_props_in_contracts {
            match prop.as_str() {
                "amount" => order.amount *= contract_size,
                "filled" => order.filled *= contract_size,
                "remaining" => order.remaining *= contract_size,
                "cost" => order.cost *= contract_size,
                _ => {}
            }
        }
        order
    }

    /// Converts trade amounts from contracts into base-currency units.
    pub(crate) fn convert_trade_amounts(&self, pair: &str, trades: &mut [Trade]) {
        let Ok(contract_size) = self.contract_size(pair) else {
            return;
        };
        if contract_size == 1.0 {
            return;
        }
        for trade in trades.iter_mut() {
            trade.amount *= contract_size;
            trade.cost = trade.price * trade.amount;
        }
    }

    /// Returns whether the engine trades futures with the given mode.
    pub(crate) fn is_futures(&self) -> bool {
        self.config.trading_mode == tradekit_model::TradingMode::Futures
    }

    /// Precision mode declared by the venue.
    #[must_use]
    pub fn precision_mode(&self) -> PrecisionMode {
        self.adapter.precision_mode()
    }
}
