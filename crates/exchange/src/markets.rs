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

//! Market-table loading, atomic reload and filtered access.

use std::sync::Arc;

use ahash::AHashMap;
use tradekit_model::{Market, TradingMode};

use crate::{
    engine::{Exchange, MARKET_STALENESS_INTERVALS},
    error::{ExchangeError, ExchangeResult},
};

/// Filter applied by [`Exchange::get_markets`].
#[derive(Clone, Debug)]
pub struct MarketFilter {
    pub base_currencies: Vec<String>,
    pub quote_currencies: Vec<String>,
    pub spot_only: bool,
    pub margin_only: bool,
    pub futures_only: bool,
    pub tradable_only: bool,
    pub active_only: bool,
}

impl Default for MarketFilter {
    fn default() -> Self {
        Self {
            base_currencies: Vec::new(),
            quote_currencies: Vec::new(),
            spot_only: false,
            margin_only: false,
            futures_only: false,
            tradable_only: true,
            active_only: false,
        }
    }
}

impl Exchange {
    /// Reloads the market table when the refresh interval has passed.
    ///
    /// The reload is atomic: readers observe either the old or the new
    /// complete table. Failures on a scheduled reload keep the stale table
    /// and are tolerated for a bounded number of intervals before they
    /// surface as errors.
    pub fn reload_markets(&self, force: bool) -> ExchangeResult<()> {
        let now = self.now_ms();
        {
            let last = *self
                .last_markets_refresh
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if !force && last > 0 && last + self.config.markets_refresh_interval_ms() > now {
                return Ok(());
            }
        }
        log::debug!("Performing scheduled market reload");

        let retries = if force { 3 } else { 0 };
        let adapter = self.adapter.clone();
        let result = self.run(self.retry.execute("load_markets", retries, move || {
            let adapter = adapter.clone();
            async move { adapter.load_markets().await }
        }));

        match result {
            Ok(markets) => {
                *self.markets.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(markets);
                *self
                    .last_markets_refresh
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = now;
                *self
                    .markets_reload_failures
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = 0;
                Ok(())
            }
            Err(err) => {
                log::error!("Could not load markets: {err}");
                let empty = self
                    .markets
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .is_empty();
                if empty {
                    return Err(err);
                }
                let mut failures = self
                    .markets_reload_failures
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                *failures += 1;
                if *failures > MARKET_STALENESS_INTERVALS {
                    return Err(ExchangeError::Exchange(format!(
                        "market table stale for {failures} refresh intervals: {err}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Returns the current market table.
    pub fn markets(&self) -> ExchangeResult<Arc<AHashMap<String, Market>>> {
        let markets = self
            .markets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if markets.is_empty() {
            return Err(ExchangeError::Operational(
                "Markets were not loaded.".to_string(),
            ));
        }
        Ok(markets)
    }

    /// Returns the descriptor for one pair.
    pub fn market(&self, pair: &str) -> ExchangeResult<Market> {
        self.markets()?
            .get(pair)
            .cloned()
            .ok_or_else(|| ExchangeError::Exchange(format!("Pair {pair} not available")))
    }

    /// Returns markets passing the filter.
    pub fn get_markets(&self, filter: &MarketFilter) -> ExchangeResult<AHashMap<String, Market>> {
        let markets = self.markets()?;
        Ok(markets
            .iter()
            .filter(|(_, m)| {
                (filter.base_currencies.is_empty() || filter.base_currencies.contains(&m.base))
                    && (filter.quote_currencies.is_empty()
                        || filter.quote_currencies.contains(&m.quote))
                    && (!filter.tradable_only || self.market_is_tradable(m))
                    && (!filter.spot_only || m.is_spot())
                    && (!filter.margin_only || m.is_margin())
                    && (!filter.futures_only || m.is_future())
                    && (!filter.active_only || m.active)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// A market is tradable when its precision is declared and its kind
    /// matches the configured trading mode.
    #[must_use]
    pub fn market_is_tradable(&self, market: &Market) -> bool {
        let mode_ok = match self.config.trading_mode {
            TradingMode::Spot => market.is_spot() || market.is_margin(),
            TradingMode::Margin => market.is_margin(),
            TradingMode::Futures => market.is_future(),
        };
        mode_ok && !market.base.is_empty() && !market.quote.is_empty() && market.is_tradable()
    }

    /// Sorted distinct quote currencies on the venue.
    pub fn get_quote_currencies(&self) -> ExchangeResult<Vec<String>> {
        let markets = self.markets()?;
        let mut quotes: Vec<String> = markets.values().map(|m| m.quote.clone()).collect();
        quotes.sort();
        quotes.dedup();
        Ok(quotes)
    }

    /// Quote currency of a pair, empty when unknown.
    #[must_use]
    pub fn get_pair_quote_currency(&self, pair: &str) -> String {
        self.market(pair).map(|m| m.quote).unwrap_or_default()
    }

    /// Base currency of a pair, empty when unknown.
    #[must_use]
    pub fn get_pair_base_currency(&self, pair: &str) -> String {
        self.market(pair).map(|m| m.base).unwrap_or_default()
    }

    /// Active pairs combining two currencies, in preference order.
    pub fn get_valid_pair_combination(
        &self,
        curr_1: &str,
        curr_2: &str,
    ) -> ExchangeResult<Vec<String>> {
        let markets = self.markets()?;
        let candidates = [
            format!("{curr_1}/{curr_2}"),
            format!("{curr_2}/{curr_1}"),
            format!("{curr_1}/{curr_2}:{curr_2}"),
            format!("{curr_2}/{curr_1}:{curr_1}"),
        ];
        let found: Vec<String> = candidates
            .into_iter()
            .filter(|pair| markets.get(pair).is_some_and(|m| m.active))
            .collect();
        if found.is_empty() {
            return Err(ExchangeError::Exchange(format!(
                "Could not combine {curr_1} and {curr_2} to get a valid pair."
            )));
        }
        Ok(found)
    }
}
