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

//! Configuration structures for the exchange engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tradekit_model::{MarginMode, PriceSide, Timeframe, TradingMode};

use crate::features::FeatureOverrides;

/// Pricing policy for one trade direction (entry or exit).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Which side of the market the rate is taken from.
    pub price_side: PriceSide,
    /// Derive the rate from L2 depth instead of the ticker.
    pub use_order_book: bool,
    /// Book level (1-based) used when `use_order_book` is set.
    pub order_book_top: u32,
    /// Blend factor towards the last price when the chosen side is worse.
    pub price_last_balance: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            price_side: PriceSide::Same,
            use_order_book: false,
            order_book_top: 1,
            price_last_balance: 0.0,
        }
    }
}

/// User order-type configuration, including the stop-loss policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderTypesConfig {
    /// Place stop losses on the venue rather than emulating them.
    pub stoploss_on_exchange: bool,
    /// User intent for the stop order: `limit` or `market`.
    pub stoploss: String,
    /// Ratio between limit and trigger price for stop-limit orders.
    pub stoploss_on_exchange_limit_ratio: f64,
    /// Price type the stop trigger compares against, when configurable.
    pub stoploss_price_type: Option<String>,
}

impl Default for OrderTypesConfig {
    fn default() -> Self {
        Self {
            stoploss_on_exchange: false,
            stoploss: "market".to_string(),
            stoploss_on_exchange_limit_ratio: 0.99,
            stoploss_price_type: None,
        }
    }
}

/// Engine-wide configuration supplied by the caller at startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Serve orders from the in-memory simulator instead of the venue.
    pub dry_run: bool,
    pub trading_mode: TradingMode,
    pub margin_mode: Option<MarginMode>,
    /// Quote currency stakes are denominated in.
    pub stake_currency: String,
    /// Primary strategy timeframe.
    pub timeframe: Option<Timeframe>,
    /// Warm-up candles required before the strategy can run.
    pub startup_candle_count: u32,
    /// Data directory for persistence sidecars.
    pub datadir: PathBuf,
    /// Shift applied to estimated liquidation prices, away from zero.
    pub liquidation_buffer: f64,
    /// Safety margin reserved on top of the minimum stake.
    pub amount_reserve_percent: f64,
    /// Interval between scheduled market reloads, in minutes.
    pub markets_refresh_interval_mins: u64,
    /// Initial retry backoff in milliseconds.
    pub retry_delay_initial_ms: u64,
    /// Maximum retry backoff in milliseconds.
    pub retry_delay_max_ms: u64,
    pub entry_pricing: PricingConfig,
    pub exit_pricing: PricingConfig,
    pub order_types: OrderTypesConfig,
    /// Time-in-force tokens the strategy wants to use.
    pub order_time_in_force: Vec<String>,
    /// Static fee rate overriding venue fees in dry-run.
    pub fee: Option<f64>,
    /// Fallback rate for fees charged in an unconvertible currency.
    pub unknown_fee_rate: Option<f64>,
    /// Synthetic funding rate used when the venue has no funding history.
    pub futures_funding_rate: Option<f64>,
    /// Upper bound on candles kept for public-trade aggregation.
    pub orderflow_max_candles: u32,
    /// Maintain public-trade tables alongside candles.
    pub use_public_trades: bool,
    /// Keep the WebSocket candle feed enabled when the venue supports it.
    pub enable_ws: bool,
    /// User-level capability overrides, the highest merge layer.
    pub feature_overrides: FeatureOverrides,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            trading_mode: TradingMode::Spot,
            margin_mode: None,
            stake_currency: "USDT".to_string(),
            timeframe: None,
            startup_candle_count: 0,
            datadir: PathBuf::from("user_data"),
            liquidation_buffer: 0.05,
            amount_reserve_percent: 0.05,
            markets_refresh_interval_mins: 60,
            retry_delay_initial_ms: 1_000,
            retry_delay_max_ms: 10_000,
            entry_pricing: PricingConfig::default(),
            exit_pricing: PricingConfig::default(),
            order_types: OrderTypesConfig::default(),
            order_time_in_force: vec!["GTC".to_string()],
            fee: None,
            unknown_fee_rate: None,
            futures_funding_rate: None,
            orderflow_max_candles: 1_500,
            use_public_trades: false,
            enable_ws: true,
            feature_overrides: FeatureOverrides::default(),
        }
    }
}

impl ExchangeConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pricing policy for the given direction.
    #[must_use]
    pub fn pricing(&self, entry: bool) -> &PricingConfig {
        if entry {
            &self.entry_pricing
        } else {
            &self.exit_pricing
        }
    }

    /// Market reload interval in milliseconds.
    #[must_use]
    pub fn markets_refresh_interval_ms(&self) -> i64 {
        self.markets_refresh_interval_mins as i64 * 60 * 1_000
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
