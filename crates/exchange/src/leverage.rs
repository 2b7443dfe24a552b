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

//! Leverage tiers, margin-mode plumbing and liquidation estimates.

use ahash::AHashMap;
use futures_util::future::join_all;
use indexmap::IndexMap;
use tradekit_model::{
    Balance, LeverageTier, MarginMode, Position, TradingMode, validate_tiers,
};

use crate::{
    engine::{Exchange, REFRESH_BATCH_SIZE},
    error::{ExchangeError, ExchangeResult},
    retry::API_RETRY_COUNT,
};

impl Exchange {
    /// Snapshot of the in-memory leverage tiers.
    #[must_use]
    pub fn leverage_tiers(&self) -> AHashMap<String, Vec<LeverageTier>> {
        self.leverage_tiers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Loads leverage tiers into memory for futures configurations.
    pub(crate) fn fill_leverage_tiers(&self) -> ExchangeResult<()> {
        let tiers = self.load_leverage_tiers()?;
        let mut store = self
            .leverage_tiers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        store.clear();
        for (symbol, pair_tiers) in tiers {
            if let Err(err) = validate_tiers(&pair_tiers) {
                log::warn!("Leverage tiers for {symbol} violate invariants: {err}");
            }
            store.insert(symbol, pair_tiers);
        }
        Ok(())
    }

    /// Bulk-loads tiers in one call when the venue supports it, otherwise
    /// fetches per symbol concurrently with the disk cache as warm start.
    fn load_leverage_tiers(&self) -> ExchangeResult<IndexMap<String, Vec<LeverageTier>>> {
        if self.config.trading_mode != TradingMode::Futures {
            return Ok(IndexMap::new());
        }
        if self.exchange_has("fetchLeverageTiers") {
            let adapter = self.adapter.clone();
            let tiers = self.run(self.retry.execute(
                "fetch_leverage_tiers",
                API_RETRY_COUNT,
                move || {
                    let adapter = adapter.clone();
                    async move { adapter.fetch_leverage_tiers().await }
                },
            ))?;
            let mut sorted: Vec<(String, Vec<LeverageTier>)> = tiers.into_iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            return Ok(sorted.into_iter().collect());
        }
        if !self.exchange_has("fetchMarketLeverageTiers") {
            return Ok(IndexMap::new());
        }

        // Per-symbol loading is slow (one call per linear market), so the
        // disk cache is consulted first and only the gaps are fetched.
        let markets = self.markets()?;
        let mut symbols: Vec<String> = markets
            .values()
            .filter(|m| m.is_future() && m.quote == self.config.stake_currency)
            .map(|m| m.symbol.clone())
            .collect();
        symbols.sort();

        let mut tiers: IndexMap<String, Vec<LeverageTier>> =
            self.load_cached_leverage_tiers().unwrap_or_default();

        let missing: Vec<String> = symbols
            .iter()
            .filter(|s| !tiers.contains_key(*s))
            .cloned()
            .collect();
        if missing.is_empty() {
            log::info!("Using cached leverage_tiers.");
            return Ok(tiers);
        }
        log::info!(
            "Initializing leverage_tiers for {} markets. This will take about a minute.",
            symbols.len()
        );

        for batch in missing.chunks(REFRESH_BATCH_SIZE) {
            let results = self.run(join_all(batch.iter().map(|symbol| async move {
                let adapter = self.adapter.clone();
                let symbol_c = symbol.clone();
                let result = self
                    .retry
                    .execute("fetch_market_leverage_tiers", API_RETRY_COUNT, move || {
                        let adapter = adapter.clone();
                        let symbol = symbol_c.clone();
                        async move { adapter.fetch_market_leverage_tiers(&symbol).await }
                    })
                    .await;
                (symbol.clone(), result)
            })));
            for (symbol, result) in results {
                match result {
                    Ok(pair_tiers) => {
                        tiers.insert(symbol, pair_tiers);
                    }
                    Err(err) => log::warn!("Leverage tier exception for {symbol}: {err}"),
                }
            }
        }
        if let Err(err) = self.cache_leverage_tiers(&tiers) {
            log::warn!("Could not cache leverage tiers: {err}");
        }
        log::info!("Done initializing {} markets.", symbols.len());
        Ok(tiers)
    }

    /// Maximum leverage a pair can be traded at for the given stake.
    ///
    /// Futures scan the tier list; margin reads the market limits; spot is
    /// always 1.0.
    pub fn get_max_leverage(&self, pair: &str, stake_amount: Option<f64>) -> ExchangeResult<f64> {
        match self.config.trading_mode {
            TradingMode::Spot => Ok(1.0),
            TradingMode::Margin => {
                let market = self.market(pair)?;
                Ok(market.limits.leverage_max.unwrap_or(1.0))
            }
            TradingMode::Futures => {
                let stake_amount = stake_amount.ok_or_else(|| {
                    ExchangeError::Operational(format!(
                        "{}.get_max_leverage requires argument stake_amount",
                        self.name()
                    ))
                })?;
                let tiers = self.leverage_tiers.read().unwrap_or_else(|e| e.into_inner());
                let Some(pair_tiers) = tiers.get(pair) else {
                    return Ok(1.0);
                };
                let Some(first) = pair_tiers.first() else {
                    return Ok(1.0);
                };
                if stake_amount == 0.0 {
                    // Max leverage for the lowest notional bracket.
                    return Ok(first.max_leverage);
                }

                let mut prior_max_lev: Option<f64> = None;
                let mut max_stake = 0.0;
                for tier in pair_tiers {
                    let min_stake = tier.min_notional / prior_max_lev.unwrap_or(tier.max_leverage);
                    max_stake = tier.max_notional / tier.max_leverage;
                    prior_max_lev = Some(tier.max_leverage);
                    if min_stake <= stake_amount && stake_amount <= max_stake {
                        return Ok(tier.max_leverage);
                    }
                }
                if stake_amount > max_stake {
                    return Err(ExchangeError::InvalidOrder(format!(
                        "Amount {stake_amount} too high for {pair}"
                    )));
                }
                Err(ExchangeError::Operational(format!(
                    "Looped through all tiers without finding a max leverage for {pair}."
                )))
            }
        }
    }

    /// Max notional usable at the given leverage, from the tier list.
    pub(crate) fn max_notional_from_tiers(&self, pair: &str, leverage: f64) -> Option<f64> {
        if self.config.trading_mode != TradingMode::Futures {
            return None;
        }
        let tiers = self.leverage_tiers.read().unwrap_or_else(|e| e.into_inner());
        let pair_tiers = tiers.get(pair)?;
        pair_tiers
            .iter()
            .rev()
            .find(|tier| leverage <= tier.max_leverage)
            .map(|tier| tier.max_notional)
    }

    /// Maintenance margin rate and amount for a notional value.
    pub fn get_maintenance_ratio_and_amt(
        &self,
        pair: &str,
        notional_value: f64,
    ) -> ExchangeResult<(f64, Option<f64>)> {
        if notional_value < 0.0 {
            return Err(ExchangeError::Exchange(
                "nominal value can not be lower than 0".to_string(),
            ));
        }
        let tiers = self.leverage_tiers.read().unwrap_or_else(|e| e.into_inner());
        let pair_tiers = tiers.get(pair).ok_or_else(|| {
            ExchangeError::InvalidOrder(format!(
                "Maintenance margin rate for {pair} is unavailable for {}",
                self.name()
            ))
        })?;
        pair_tiers
            .iter()
            .rev()
            .find(|tier| notional_value >= tier.min_notional)
            .map(|tier| (tier.maintenance_margin_rate, tier.maintenance_amount))
            .ok_or_else(|| {
                ExchangeError::Exchange("nominal value can not be lower than 0".to_string())
            })
    }

    // -- Leverage & margin-mode plumbing --------------------------------------

    /// Sets the leverage for a pair before placement.
    pub fn set_leverage(&self, pair: &str, leverage: f64, accept_fail: bool) -> ExchangeResult<()> {
        self.run(self.set_leverage_async(pair, leverage, accept_fail))
    }

    pub(crate) async fn set_leverage_async(
        &self,
        pair: &str,
        mut leverage: f64,
        accept_fail: bool,
    ) -> ExchangeResult<()> {
        if self.config.dry_run || !self.exchange_has("setLeverage") {
            // Some venues only support one margin setup.
            return Ok(());
        }
        if self.features.floor_leverage {
            leverage = leverage.floor();
        }
        let result = self.adapter.set_leverage(pair, leverage).await;
        self.tolerate_pre_step(result, "set_leverage", accept_fail)
    }

    /// Sets the margin mode for a pair before placement.
    pub fn set_margin_mode(
        &self,
        pair: &str,
        margin_mode: MarginMode,
        accept_fail: bool,
    ) -> ExchangeResult<()> {
        self.run(self.set_margin_mode_async(pair, margin_mode, accept_fail))
    }

    pub(crate) async fn set_margin_mode_async(
        &self,
        pair: &str,
        margin_mode: MarginMode,
        accept_fail: bool,
    ) -> ExchangeResult<()> {
        if self.config.dry_run || !self.exchange_has("setMarginMode") {
            return Ok(());
        }
        let result = self.adapter.set_margin_mode(pair, margin_mode).await;
        self.tolerate_pre_step(result, "set_margin_mode", accept_fail)
    }

    fn tolerate_pre_step(
        &self,
        result: ExchangeResult<()>,
        operation: &str,
        accept_fail: bool,
    ) -> ExchangeResult<()> {
        match result {
            Ok(()) => Ok(()),
            Err(
                err @ (ExchangeError::Exchange(_)
                | ExchangeError::InvalidOrder(_)
                | ExchangeError::InsufficientFunds(_)),
            ) => {
                if accept_fail {
                    log::warn!("{operation} rejected and tolerated: {err}");
                    Ok(())
                } else {
                    Err(ExchangeError::Temporary(format!(
                        "Could not {operation}. Message: {err}"
                    )))
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Margin-mode and leverage preparation before placing an order.
    pub(crate) async fn lev_prep(
        &self,
        pair: &str,
        leverage: f64,
        accept_fail: bool,
    ) -> ExchangeResult<()> {
        if self.config.trading_mode == TradingMode::Spot {
            return Ok(());
        }
        let margin_mode = self.config.margin_mode.ok_or_else(|| {
            ExchangeError::Configuration("margin_mode is required for leveraged trading".into())
        })?;
        self.set_margin_mode_async(pair, margin_mode, accept_fail)
            .await?;
        self.set_leverage_async(pair, leverage, accept_fail).await
    }

    // -- Account --------------------------------------------------------------

    /// Wallet balances per currency.
    pub fn fetch_balances(&self) -> ExchangeResult<AHashMap<String, Balance>> {
        let adapter = self.adapter.clone();
        self.run(
            self.retry
                .execute("fetch_balances", API_RETRY_COUNT, move || {
                    let adapter = adapter.clone();
                    async move { adapter.fetch_balances().await }
                }),
        )
    }

    /// Open positions, optionally filtered to one pair.
    pub fn fetch_positions(&self, pair: Option<&str>) -> ExchangeResult<Vec<Position>> {
        let adapter = self.adapter.clone();
        let pair_owned = pair.map(String::from);
        self.run(
            self.retry
                .execute("fetch_positions", API_RETRY_COUNT, move || {
                    let adapter = adapter.clone();
                    let pair = pair_owned.clone();
                    async move { adapter.fetch_positions(pair.as_deref()).await }
                }),
        )
    }

    // -- Liquidation ----------------------------------------------------------

    /// Liquidation price for a position, estimated in dry-run and read from
    /// the venue otherwise. A configurable buffer shifts the result away
    /// from the position.
    #[allow(clippy::too_many_arguments)]
    pub fn get_liquidation_price(
        &self,
        pair: &str,
        open_rate: f64,
        is_short: bool,
        amount: f64,
        stake_amount: f64,
        leverage: f64,
        wallet_balance: f64,
    ) -> ExchangeResult<Option<f64>> {
        match self.config.trading_mode {
            TradingMode::Spot => return Ok(None),
            TradingMode::Futures => {}
            TradingMode::Margin => {
                return Err(ExchangeError::Operational(format!(
                    "{} does not support margin liquidation estimates",
                    self.name()
                )));
            }
        }

        let liquidation_price = if self.config.dry_run || !self.exchange_has("fetchPositions") {
            self.dry_run_liquidation_price(
                pair,
                open_rate,
                is_short,
                amount,
                stake_amount,
                leverage,
                wallet_balance,
            )?
        } else {
            let positions = self.fetch_positions(Some(pair))?;
            match positions.first() {
                Some(position) => position.liquidation_price,
                None => None,
            }
        };

        Ok(liquidation_price.map(|liq| {
            let buffer_amount = (open_rate - liq).abs() * self.config.liquidation_buffer;
            let buffered = if is_short {
                liq - buffer_amount
            } else {
                liq + buffer_amount
            };
            buffered.max(0.0)
        }))
    }

    /// Isolated-futures liquidation estimate for linear contracts.
    ///
    /// `liq = (open_rate ± wallet_balance / amount) / (1 ± (mmr + taker))`,
    /// with the sign depending on direction. Inverse contracts are
    /// rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn dry_run_liquidation_price(
        &self,
        pair: &str,
        open_rate: f64,
        is_short: bool,
        amount: f64,
        stake_amount: f64,
        _leverage: f64,
        wallet_balance: f64,
    ) -> ExchangeResult<Option<f64>> {
        let market = self.market(pair)?;
        if self.config.trading_mode != TradingMode::Futures
            || self.config.margin_mode != Some(MarginMode::Isolated)
        {
            return Err(ExchangeError::Operational(
                "Liquidation estimates are only supported for isolated futures".to_string(),
            ));
        }
        if market.is_inverse() {
            return Err(ExchangeError::Operational(
                "Inverse contracts are not supported".to_string(),
            ));
        }
        if amount == 0.0 {
            return Ok(None);
        }

        let taker_fee_rate = market.taker;
        let (mm_ratio, _) = self.get_maintenance_ratio_and_amt(pair, stake_amount)?;

        let value = wallet_balance / amount;
        let mm_ratio_taker = mm_ratio + taker_fee_rate;
        let liq = if is_short {
            (open_rate + value) / (1.0 + mm_ratio_taker)
        } else {
            (open_rate - value) / (1.0 - mm_ratio_taker)
        };
        Ok(Some(liq))
    }
}
