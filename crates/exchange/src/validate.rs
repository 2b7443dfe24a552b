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

//! Startup validation of the user configuration against venue
//! capabilities. Everything here fails fast with
//! [`ExchangeError::Configuration`] before any trading call is made.

use chrono::Utc;
use tradekit_model::{Timeframe, TradingMode};

use crate::{
    engine::Exchange,
    error::{ExchangeError, ExchangeResult},
};

/// Paginated backfills are capped at this many calls per pair.
pub(crate) const MAX_STARTUP_CANDLE_CALLS: u32 = 5;

impl Exchange {
    /// Runs the full validation family against the loaded markets.
    pub(crate) fn validate_config(&self) -> ExchangeResult<()> {
        self.validate_timeframes()?;
        self.validate_stakecurrency()?;
        self.validate_ordertypes()?;
        self.validate_order_time_in_force()?;
        self.validate_trading_mode_and_margin_mode()?;
        self.validate_pricing()?;
        self.validate_orderflow()?;
        Ok(())
    }

    fn validate_timeframes(&self) -> ExchangeResult<()> {
        let Some(timeframe) = self.config.timeframe else {
            return Ok(());
        };
        if self.timeframes().is_empty() {
            return Err(ExchangeError::Operational(format!(
                "The venue {} does not provide a list of timeframes and is therefore not \
                 supported.",
                self.name()
            )));
        }
        if !self.timeframes().contains(&timeframe) {
            return Err(ExchangeError::Configuration(format!(
                "Invalid timeframe '{timeframe}'. This exchange supports: {:?}",
                self.timeframes()
            )));
        }
        Ok(())
    }

    fn validate_stakecurrency(&self) -> ExchangeResult<()> {
        let quotes = self.get_quote_currencies().map_err(|_| {
            ExchangeError::Operational(
                "Could not load markets, therefore cannot start. Please investigate the above \
                 error for more details."
                    .to_string(),
            )
        })?;
        if !quotes.contains(&self.config.stake_currency) {
            return Err(ExchangeError::Configuration(format!(
                "{} is not available as stake on {}. Available currencies are: {}",
                self.config.stake_currency,
                self.name(),
                quotes.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_ordertypes(&self) -> ExchangeResult<()> {
        if !self.exchange_has("createMarketOrder") {
            return Err(ExchangeError::Configuration(format!(
                "Exchange {} does not support market orders.",
                self.name()
            )));
        }
        let order_types = &self.config.order_types;
        if order_types.stoploss_on_exchange && !self.features.stoploss_on_exchange {
            return Err(ExchangeError::Configuration(format!(
                "On exchange stoploss is not supported for {}.",
                self.name()
            )));
        }
        if self.config.trading_mode == TradingMode::Futures
            && order_types.stoploss_on_exchange
            && let Some(price_type) = &order_types.stoploss_price_type
            && !self
                .features
                .stop_price_type_value_mapping
                .contains_key(price_type)
        {
            return Err(ExchangeError::Configuration(format!(
                "On exchange stoploss price type is not supported for {}.",
                self.name()
            )));
        }
        Ok(())
    }

    fn validate_order_time_in_force(&self) -> ExchangeResult<()> {
        for tif in &self.config.order_time_in_force {
            if !self
                .features
                .order_time_in_force
                .contains(&tif.to_uppercase())
            {
                return Err(ExchangeError::Configuration(format!(
                    "Time in force policies are not supported for {} yet.",
                    self.name()
                )));
            }
        }
        Ok(())
    }

    fn validate_trading_mode_and_margin_mode(&self) -> ExchangeResult<()> {
        if self.config.trading_mode == TradingMode::Spot {
            return Ok(());
        }
        let Some(margin_mode) = self.config.margin_mode else {
            return Err(ExchangeError::Configuration(
                "margin_mode must be configured for leveraged trading".to_string(),
            ));
        };
        let supported = self.adapter.supported_trading_modes();
        if !supported.contains(&(self.config.trading_mode, margin_mode)) {
            return Err(ExchangeError::Configuration(format!(
                "{} {} is not supported on {}.",
                margin_mode,
                self.config.trading_mode,
                self.name()
            )));
        }
        Ok(())
    }

    fn validate_pricing(&self) -> ExchangeResult<()> {
        for conf in [&self.config.entry_pricing, &self.config.exit_pricing] {
            if conf.use_order_book && !self.exchange_has("fetchL2OrderBook") {
                return Err(ExchangeError::Configuration(format!(
                    "Orderbook not available for {}.",
                    self.name()
                )));
            }
            if !conf.use_order_book && !self.exchange_has("fetchTicker") {
                return Err(ExchangeError::Configuration(format!(
                    "Ticker pricing not available for {}.",
                    self.name()
                )));
            }
        }
        Ok(())
    }

    fn validate_orderflow(&self) -> ExchangeResult<()> {
        if self.config.use_public_trades
            && (!self.exchange_has("fetchTrades") || !self.features.trades_has_history)
        {
            return Err(ExchangeError::Configuration(format!(
                "Trade data not available for {}. Can't use orderflow feature.",
                self.name()
            )));
        }
        Ok(())
    }

    /// Checks the startup candle requirement against the per-call candle
    /// limit and returns the number of calls a backfill needs.
    ///
    /// One extra candle accounts for the still-open one. Venues with
    /// candle history allow up to [`MAX_STARTUP_CANDLE_CALLS`] calls per
    /// pair; venues without history allow exactly one.
    pub(crate) fn validate_required_startup_candles(
        &self,
        startup_candles: u32,
        timeframe: Option<Timeframe>,
    ) -> ExchangeResult<u32> {
        let Some(timeframe) = timeframe else {
            return Ok(1);
        };
        let kind = self.config.trading_mode.candle_kind();
        let candle_limit = self.ohlcv_candle_limit(timeframe, kind);
        let candle_count = startup_candles + 1;
        let required_candle_call_count = candle_count.div_ceil(candle_limit);

        if self.features.ohlcv_has_history {
            if required_candle_call_count > MAX_STARTUP_CANDLE_CALLS {
                return Err(ExchangeError::Configuration(format!(
                    "This strategy requires {startup_candles} candles to start, which is more \
                     than {MAX_STARTUP_CANDLE_CALLS}x the amount of candles {} provides for \
                     {timeframe}.",
                    self.name()
                )));
            }
        } else if required_candle_call_count > 1 {
            return Err(ExchangeError::Configuration(format!(
                "This strategy requires {startup_candles} candles to start, which is more than \
                 the amount of candles {} provides for {timeframe}.",
                self.name()
            )));
        }
        if required_candle_call_count > 1 {
            log::warn!(
                "Using {required_candle_call_count} calls to get OHLCV. This can result in \
                 slower operations for the bot. Please check if you really need \
                 {startup_candles} candles for your strategy.",
            );
        }
        Ok(required_candle_call_count)
    }

    /// Epoch milliseconds `n` candles before now, used by startup-range
    /// estimation.
    #[must_use]
    pub fn candles_ago_ms(&self, timeframe: Timeframe, n: u32) -> i64 {
        timeframe.ts_minus_candles(Utc::now(), u64::from(n))
    }
}
