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

//! Pricing: rate selection, tickers, stake-amount bounds and fees.

use ahash::AHashMap;
use tradekit_model::{
    BidAsk, EntryExit, MakerTaker, OrderBook, OrderFee, OrderSide, PriceSide, Ticker, TradingMode,
};

use crate::{
    engine::Exchange,
    error::{ExchangeError, ExchangeResult},
    retry::API_RETRY_COUNT,
};

/// Resolves the configured price-side policy to a concrete book side.
///
/// `same`/`other` capture the bid-for-buying-longs convention and its
/// inverses for shorts.
pub(crate) fn effective_price_side(side: EntryExit, is_short: bool, policy: PriceSide) -> BidAsk {
    match policy {
        PriceSide::Bid => BidAsk::Bid,
        PriceSide::Ask => BidAsk::Ask,
        PriceSide::Same | PriceSide::Other => {
            let same = policy == PriceSide::Same;
            match (side, is_short) {
                (EntryExit::Entry, false) | (EntryExit::Exit, true) => {
                    if same { BidAsk::Bid } else { BidAsk::Ask }
                }
                (EntryExit::Entry, true) | (EntryExit::Exit, false) => {
                    if same { BidAsk::Ask } else { BidAsk::Bid }
                }
            }
        }
    }
}

/// Picks the next usable depth parameter from an allowed range.
pub(crate) fn next_limit_in_list(
    limit: u32,
    limit_range: Option<&[u32]>,
    range_required: bool,
    upper_limit: Option<u32>,
) -> Option<u32> {
    let Some(range) = limit_range.filter(|r| !r.is_empty()) else {
        return Some(match upper_limit {
            Some(upper) => limit.min(upper),
            None => limit,
        });
    };
    let result = range
        .iter()
        .copied()
        .filter(|x| limit <= *x)
        .min()
        .unwrap_or_else(|| range.iter().copied().max().unwrap_or(limit));
    if !range_required && limit > result {
        // Range not required, so no parameter can be sent at all.
        return None;
    }
    Some(result)
}

fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

impl Exchange {
    // -- Order book & ticker --------------------------------------------------

    /// Fetches L2 depth, honouring the venue's allowed depth parameters.
    pub fn fetch_l2_order_book(&self, pair: &str, limit: u32) -> ExchangeResult<OrderBook> {
        self.run(self.fetch_l2_order_book_async(pair, limit))
    }

    pub(crate) async fn fetch_l2_order_book_async(
        &self,
        pair: &str,
        limit: u32,
    ) -> ExchangeResult<OrderBook> {
        let depth = next_limit_in_list(
            limit,
            self.features.l2_limit_range.as_deref(),
            self.features.l2_limit_range_required,
            self.features.l2_limit_upper,
        );
        let adapter = self.adapter.clone();
        let pair = pair.to_string();
        self.retry
            .execute("fetch_l2_order_book", API_RETRY_COUNT, move || {
                let adapter = adapter.clone();
                let pair = pair.clone();
                async move { adapter.fetch_l2_order_book(&pair, depth).await }
            })
            .await
    }

    /// Fetches the ticker for an active pair.
    pub fn fetch_ticker(&self, pair: &str) -> ExchangeResult<Ticker> {
        self.run(self.fetch_ticker_async(pair))
    }

    pub(crate) async fn fetch_ticker_async(&self, pair: &str) -> ExchangeResult<Ticker> {
        let market = self.market(pair)?;
        if !market.active {
            return Err(ExchangeError::Exchange(format!("Pair {pair} not available")));
        }
        let adapter = self.adapter.clone();
        let pair = pair.to_string();
        self.retry
            .execute("fetch_ticker", API_RETRY_COUNT, move || {
                let adapter = adapter.clone();
                let pair = pair.clone();
                async move { adapter.fetch_ticker(&pair).await }
            })
            .await
    }

    /// Bulk tickers with a 10-minute cache per market type.
    pub fn get_tickers(
        &self,
        symbols: Option<&[String]>,
        cached: bool,
        market_type: Option<TradingMode>,
    ) -> ExchangeResult<AHashMap<String, Ticker>> {
        if !self.exchange_has("fetchTickers") {
            return Ok(AHashMap::new());
        }
        let cache_key = match market_type {
            Some(mt) => format!("fetch_tickers_{mt}"),
            None => "fetch_tickers".to_string(),
        };
        if cached
            && let Some(tickers) = self
                .tickers_cache
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&cache_key)
        {
            return Ok(tickers);
        }

        let adapter = self.adapter.clone();
        let symbols_owned: Option<Vec<String>> = symbols.map(<[String]>::to_vec);
        let tickers = self.run(self.retry.execute(
            "fetch_tickers",
            API_RETRY_COUNT,
            move || {
                let adapter = adapter.clone();
                let symbols = symbols_owned.clone();
                async move { adapter.fetch_tickers(symbols.as_deref(), market_type).await }
            },
        ))?;

        self.tickers_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(cache_key, tickers.clone());
        Ok(tickers)
    }

    /// Best bid/ask per symbol, cached alongside the ticker cache.
    pub fn fetch_bids_asks(
        &self,
        symbols: Option<&[String]>,
        cached: bool,
    ) -> ExchangeResult<AHashMap<String, Ticker>> {
        if !self.exchange_has("fetchBidsAsks") {
            return Ok(AHashMap::new());
        }
        let cache_key = "fetch_bids_asks".to_string();
        if cached
            && let Some(tickers) = self
                .tickers_cache
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&cache_key)
        {
            return Ok(tickers);
        }
        let adapter = self.adapter.clone();
        let symbols_owned: Option<Vec<String>> = symbols.map(<[String]>::to_vec);
        let tickers = self.run(self.retry.execute(
            "fetch_bids_asks",
            API_RETRY_COUNT,
            move || {
                let adapter = adapter.clone();
                let symbols = symbols_owned.clone();
                async move { adapter.fetch_bids_asks(symbols.as_deref()).await }
            },
        ))?;
        self.tickers_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(cache_key, tickers.clone());
        Ok(tickers)
    }

    // -- Rate selection -------------------------------------------------------

    /// Returns the single price used for pricing an entry or exit.
    ///
    /// Serves from a 300-second cache unless `refresh` is set; otherwise
    /// resolves via the order book or the ticker per the pricing config.
    pub fn get_rate(
        &self,
        pair: &str,
        refresh: bool,
        side: EntryExit,
        is_short: bool,
    ) -> ExchangeResult<f64> {
        if !refresh && let Some(rate) = self.cached_rate(pair, side) {
            log::debug!("Using cached {side} rate for {pair}.");
            return Ok(rate);
        }
        let rate = self.run(self.resolve_rate(pair, side, is_short, None, None))?;
        self.store_rate(pair, side, rate);
        Ok(rate)
    }

    /// Entry and exit rates in one pass, sharing the book/ticker fetch.
    pub fn get_rates(&self, pair: &str, refresh: bool, is_short: bool) -> ExchangeResult<(f64, f64)> {
        let mut entry_rate = None;
        let mut exit_rate = None;
        if !refresh {
            entry_rate = self.cached_rate(pair, EntryExit::Entry);
            exit_rate = self.cached_rate(pair, EntryExit::Exit);
        }

        if let (Some(entry), Some(exit)) = (entry_rate, exit_rate) {
            return Ok((entry, exit));
        }

        let (entry, exit) = self.run(async {
            let entry_conf = &self.config.entry_pricing;
            let exit_conf = &self.config.exit_pricing;
            let mut book: Option<OrderBook> = None;
            let mut ticker: Option<Ticker> = None;

            if entry_rate.is_none() {
                if entry_conf.use_order_book {
                    let depth = entry_conf.order_book_top.max(exit_conf.order_book_top);
                    book = Some(self.fetch_l2_order_book_async(pair, depth).await?);
                } else {
                    ticker = Some(self.fetch_ticker_async(pair).await?);
                }
            }
            let entry = match entry_rate {
                Some(rate) => rate,
                None => {
                    self.resolve_rate(pair, EntryExit::Entry, is_short, book.as_ref(), ticker.as_ref())
                        .await?
                }
            };
            let exit = match exit_rate {
                Some(rate) => rate,
                None => {
                    self.resolve_rate(pair, EntryExit::Exit, is_short, book.as_ref(), ticker.as_ref())
                        .await?
                }
            };
            Ok::<_, ExchangeError>((entry, exit))
        })?;

        if entry_rate.is_none() {
            self.store_rate(pair, EntryExit::Entry, entry);
        }
        if exit_rate.is_none() {
            self.store_rate(pair, EntryExit::Exit, exit);
        }
        Ok((entry, exit))
    }

    fn cached_rate(&self, pair: &str, side: EntryExit) -> Option<f64> {
        let cache = match side {
            EntryExit::Entry => &self.entry_rate_cache,
            EntryExit::Exit => &self.exit_rate_cache,
        };
        cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&pair.to_string())
    }

    fn store_rate(&self, pair: &str, side: EntryExit, rate: f64) {
        let cache = match side {
            EntryExit::Entry => &self.entry_rate_cache,
            EntryExit::Exit => &self.exit_rate_cache,
        };
        cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pair.to_string(), rate);
    }

    pub(crate) async fn resolve_rate(
        &self,
        pair: &str,
        side: EntryExit,
        is_short: bool,
        book: Option<&OrderBook>,
        ticker: Option<&Ticker>,
    ) -> ExchangeResult<f64> {
        let conf = self.config.pricing(side == EntryExit::Entry);
        let price_side = effective_price_side(side, is_short, conf.price_side);

        let rate = if conf.use_order_book {
            let fetched;
            let book = match book {
                Some(book) => book,
                None => {
                    fetched = self
                        .fetch_l2_order_book_async(pair, conf.order_book_top)
                        .await?;
                    &fetched
                }
            };
            self.rate_from_order_book(pair, side, book, price_side, conf.order_book_top)?
        } else {
            log::debug!("Using last {price_side} / last price");
            let fetched;
            let ticker = match ticker {
                Some(ticker) => ticker,
                None => {
                    fetched = self.fetch_ticker_async(pair).await?;
                    &fetched
                }
            };
            rate_from_ticker(side, ticker, conf.price_last_balance, price_side)
                .ok_or_else(|| ExchangeError::Pricing(format!("{side}-rate for {pair} was empty.")))?
        };
        Ok(rate)
    }

    fn rate_from_order_book(
        &self,
        pair: &str,
        side: EntryExit,
        book: &OrderBook,
        price_side: BidAsk,
        depth: u32,
    ) -> ExchangeResult<f64> {
        match book.level_at(price_side, depth as usize) {
            Some((price, _)) => {
                log::debug!(
                    "{pair} - {side} price from orderbook {price_side} side, top {depth}: {price:.8}"
                );
                Ok(price)
            }
            None => {
                log::warn!(
                    "{pair} - {side} price at location {depth} from orderbook could not be \
                     determined."
                );
                Err(ExchangeError::Pricing(format!(
                    "Orderbook rate for {pair} was empty."
                )))
            }
        }
    }

    // -- Conversion rates -----------------------------------------------------

    /// Proxy coin for the stake currency, when the venue aliases it.
    #[must_use]
    pub fn get_proxy_coin(&self) -> String {
        self.features
            .proxy_coin_mapping
            .get(&self.config.stake_currency)
            .cloned()
            .unwrap_or_else(|| self.config.stake_currency.clone())
    }

    /// Cached conversion rate between two currencies, `None` when no route
    /// exists on the venue.
    pub fn get_conversion_rate(&self, coin: &str, currency: &str) -> ExchangeResult<Option<f64>> {
        let mapping = &self.features.proxy_coin_mapping;
        let coin = mapping.get(coin).map_or(coin, String::as_str);
        let currency = mapping.get(currency).map_or(currency, String::as_str);
        if coin == currency {
            return Ok(Some(1.0));
        }

        let tickers = self.get_tickers(None, true, None)?;
        let Ok(combinations) = self.get_valid_pair_combination(coin, currency) else {
            return Ok(None);
        };
        for pair in combinations {
            let ticker = match tickers.get(&pair) {
                Some(ticker) => Some(ticker.clone()),
                None => {
                    let other_type = if self.config.trading_mode == TradingMode::Spot {
                        TradingMode::Futures
                    } else {
                        TradingMode::Spot
                    };
                    self.get_tickers(None, true, Some(other_type))?
                        .get(&pair)
                        .cloned()
                }
            };
            if let Some(ticker) = ticker {
                let mut rate = ticker.last.or(ticker.ask);
                if let Some(r) = rate
                    && r != 0.0
                    && pair.starts_with(currency)
                    && !pair.ends_with(currency)
                {
                    rate = Some(1.0 / r);
                }
                return Ok(rate);
            }
        }
        Ok(None)
    }

    // -- Fees -----------------------------------------------------------------

    /// Fee rate for the described order; market orders always pay taker.
    pub fn get_fee(
        &self,
        symbol: &str,
        order_type: &str,
        side: Option<OrderSide>,
        amount: f64,
        price: f64,
        maker_taker: MakerTaker,
    ) -> ExchangeResult<f64> {
        self.run(self.get_fee_async(symbol, order_type, side, amount, price, maker_taker))
    }

    pub(crate) async fn get_fee_async(
        &self,
        symbol: &str,
        order_type: &str,
        side: Option<OrderSide>,
        amount: f64,
        price: f64,
        maker_taker: MakerTaker,
    ) -> ExchangeResult<f64> {
        let maker_taker = if order_type == "market" {
            MakerTaker::Taker
        } else {
            maker_taker
        };
        if self.config.dry_run && let Some(fee) = self.config.fee {
            return Ok(fee);
        }
        let adapter = self.adapter.clone();
        let symbol = symbol.to_string();
        let order_type = order_type.to_string();
        let side = side.unwrap_or(OrderSide::Buy);
        self.retry
            .execute("get_fee", API_RETRY_COUNT, move || {
                let adapter = adapter.clone();
                let symbol = symbol.clone();
                let order_type = order_type.clone();
                async move {
                    adapter
                        .calculate_fee(&symbol, &order_type, side, amount, price, maker_taker)
                        .await
                }
            })
            .await
    }

    /// Derives a fee rate when the venue did not report one.
    ///
    /// Base-currency fees divide by amount, quote-currency fees by cost;
    /// third-currency fees convert to the stake currency first, falling
    /// back to the configured unknown-fee rate.
    pub fn calculate_fee_rate(
        &self,
        fee: &OrderFee,
        symbol: &str,
        cost: f64,
        amount: f64,
    ) -> Option<f64> {
        if fee.rate.is_some() {
            return fee.rate;
        }
        if fee.currency.is_empty() {
            return None;
        }
        let fee_cost = fee.cost;

        if fee.currency == self.get_pair_base_currency(symbol) {
            return (amount != 0.0).then(|| round8(fee_cost / amount));
        }
        if fee.currency == self.get_pair_quote_currency(symbol) {
            return (cost != 0.0).then(|| round8(fee_cost / cost));
        }
        if cost == 0.0 {
            return None;
        }
        let fee_to_quote_rate = match self
            .get_conversion_rate(&fee.currency, &self.config.stake_currency)
        {
            Ok(Some(rate)) if rate != 0.0 => rate,
            _ => self.config.unknown_fee_rate?,
        };
        Some(round8(fee_cost * fee_to_quote_rate / cost))
    }

    /// Extracts `(cost, currency, rate)` from an order fee.
    pub fn extract_cost_curr_rate(
        &self,
        fee: &OrderFee,
        symbol: &str,
        cost: f64,
        amount: f64,
    ) -> (f64, String, Option<f64>) {
        (
            fee.cost,
            fee.currency.clone(),
            self.calculate_fee_rate(fee, symbol, cost, amount),
        )
    }

    // -- Stake-amount bounds --------------------------------------------------

    /// Minimum stake for a pair, `None` when the venue declares no limits.
    pub fn get_min_pair_stake_amount(
        &self,
        pair: &str,
        price: f64,
        stoploss: f64,
        leverage: f64,
    ) -> ExchangeResult<Option<f64>> {
        self.stake_amount_limit(pair, price, stoploss, true, leverage)
    }

    /// Maximum stake for a pair, consolidating venue limits and tier caps.
    pub fn get_max_pair_stake_amount(
        &self,
        pair: &str,
        price: f64,
        leverage: f64,
    ) -> ExchangeResult<f64> {
        self.stake_amount_limit(pair, price, 0.0, false, leverage)?
            .ok_or_else(|| {
                ExchangeError::Operational(format!(
                    "{}: max stake amount resolved to None",
                    self.name()
                ))
            })
    }

    fn stake_amount_limit(
        &self,
        pair: &str,
        price: f64,
        stoploss: f64,
        is_min: bool,
        leverage: f64,
    ) -> ExchangeResult<Option<f64>> {
        let market = self.market(pair)?;
        let mut stake_limits: Vec<f64> = Vec::new();

        let (margin_reserve, stoploss_reserve) = if is_min {
            let margin_reserve = 1.0 + self.config.amount_reserve_percent;
            let stoploss_reserve = if stoploss.abs() == 1.0 {
                1.5
            } else {
                (margin_reserve / (1.0 - stoploss.abs())).clamp(1.0, 1.5)
            };
            (margin_reserve, stoploss_reserve)
        } else {
            if let Some(max_notional) = self.max_notional_from_tiers(pair, leverage) {
                stake_limits.push(max_notional);
            }
            (1.0, 1.0)
        };

        let cost_limit = if is_min {
            market.limits.cost_min
        } else {
            market.limits.cost_max
        };
        if let Some(cost) = cost_limit {
            stake_limits.push(self.contracts_to_amount(pair, cost)? * stoploss_reserve);
        }

        let amount_limit = if is_min {
            market.limits.amount_min
        } else {
            market.limits.amount_max
        };
        if let Some(amount) = amount_limit {
            stake_limits.push(self.contracts_to_amount(pair, amount)? * price * margin_reserve);
        }

        if stake_limits.is_empty() {
            return Ok(if is_min { None } else { Some(f64::INFINITY) });
        }

        // The bound must satisfy both the amount limit (base currency) and
        // the cost limit (quote currency).
        let stake = if is_min {
            stake_limits.iter().copied().fold(f64::MIN, f64::max)
        } else {
            stake_limits.iter().copied().fold(f64::MAX, f64::min)
        };
        // The caller supplies risk capital, not notional.
        Ok(Some(stake / if leverage > 0.0 { leverage } else { 1.0 }))
    }
}

/// Rate from a ticker with "last-price balance": when the chosen side is
/// worse than `last`, blend toward `last` by the configured factor. A
/// missing `last` yields the raw side price with no blend.
pub(crate) fn rate_from_ticker(
    side: EntryExit,
    ticker: &Ticker,
    price_last_balance: f64,
    price_side: BidAsk,
) -> Option<f64> {
    let ticker_rate = ticker.side(price_side)?;
    let Some(last) = ticker.last else {
        return Some(ticker_rate);
    };
    let rate = match side {
        EntryExit::Entry if ticker_rate > last => {
            ticker_rate + price_last_balance * (last - ticker_rate)
        }
        EntryExit::Exit if ticker_rate < last => {
            ticker_rate - price_last_balance * (ticker_rate - last)
        }
        _ => ticker_rate,
    };
    Some(rate)
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
