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

//! Public-trade tables: refresh engine and the two pagination dialects.
//!
//! Venues paginate trade history either by time (`since` advances to the
//! last trade's timestamp) or by id (seeded with a time-based call, then
//! cursored on the last trade's id). Both dialects honour cancellation at
//! page boundaries and return the partial result. Tables warm-start from a
//! disk sidecar and are rewritten after every merge that produced trades.

use ahash::AHashMap;
use chrono::Utc;
use futures_util::future::join_all;
use tradekit_model::{CandleKind, PaginationKind, Timeframe, Trade};

use crate::{
    engine::{Exchange, REFRESH_BATCH_SIZE, TableKey},
    error::{ExchangeError, ExchangeResult},
    retry::API_RETRY_COUNT,
};

/// Removes duplicate trade ids, keeping the first occurrence.
pub(crate) fn dedupe_trades(trades: Vec<Trade>) -> Vec<Trade> {
    let mut seen: ahash::AHashSet<String> = ahash::AHashSet::with_capacity(trades.len());
    trades
        .into_iter()
        .filter(|t| seen.insert(t.id.clone()))
        .collect()
}

impl Exchange {
    /// Returns a copy of the cached trade table for a key, if present.
    #[must_use]
    pub fn trades(&self, key: &TableKey) -> Option<Vec<Trade>> {
        self.trades
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Refreshes the in-memory trade tables for all keys.
    ///
    /// Start cursor per key is the later of the last stored trade and the
    /// earliest candle the orderflow window needs. Per-task failures are
    /// logged and skipped.
    pub fn refresh_latest_trades(
        &self,
        pair_list: &[TableKey],
        cache: bool,
    ) -> AHashMap<TableKey, Vec<Trade>> {
        log::debug!("Refreshing TRADES data for {} pairs", pair_list.len());

        let mut keys: Vec<TableKey> = Vec::new();
        for key in pair_list {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }

        let mut results: AHashMap<TableKey, Vec<Trade>> = AHashMap::new();
        for batch in keys.chunks(REFRESH_BATCH_SIZE) {
            let batch_results = self.run(join_all(
                batch.iter().map(|key| self.build_trades_job(key, cache)),
            ));
            for (key, table) in batch_results {
                if let Some(table) = table {
                    results.insert(key, table);
                }
            }
        }
        results
    }

    /// Downloads trade history for one pair.
    pub fn get_historic_trades(
        &self,
        pair: &str,
        since_ms: i64,
        until_ms: Option<i64>,
        from_id: Option<&str>,
    ) -> ExchangeResult<Vec<Trade>> {
        if !self.exchange_has("fetchTrades") {
            return Err(ExchangeError::Operational(
                "This exchange does not support downloading Trades.".to_string(),
            ));
        }
        self.run(self.get_trade_history(pair, since_ms, until_ms, from_id.map(String::from)))
    }

    /// Earliest trade timestamp the orderflow window requires.
    pub(crate) fn needed_candle_for_trades_ms(&self, timeframe: Timeframe, kind: CandleKind) -> i64 {
        let candle_limit = self.ohlcv_candle_limit(timeframe, kind) as i64;
        let tf_s = timeframe.as_secs() as i64;
        let candles_fetched = candle_limit * i64::from(self.required_candle_call_count);
        let max_candles = i64::from(self.config.orderflow_max_candles);

        let required_candles = max_candles.min(candles_fetched);
        let move_to_s = if required_candles > candle_limit {
            tf_s * candle_limit * required_candles
        } else {
            (max_candles + 1) * tf_s
        };

        let now = timeframe.next_candle_start(Utc::now());
        now - move_to_s * 1_000
    }

    fn now_is_time_to_refresh_trades(&self, key: &TableKey) -> bool {
        let Some(table) = self.trades(key) else {
            return true;
        };
        let Some(last) = table.last() else {
            return true;
        };
        let full_candle =
            key.timeframe.candle_start(last.ts_ms) + key.timeframe.as_millis();
        full_candle <= self.now_ms()
    }

    async fn build_trades_job(
        &self,
        key: &TableKey,
        cache: bool,
    ) -> (TableKey, Option<Vec<Trade>>) {
        let first_candle_ms = self.needed_candle_for_trades_ms(key.timeframe, key.kind);
        let is_in_cache = self
            .trades
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key);

        if is_in_cache && cache && !self.now_is_time_to_refresh_trades(key) {
            return (key.clone(), None);
        }
        log::debug!("Refreshing TRADES data for {}", key.pair);

        let mut since_ms: Option<i64> = None;
        let mut from_id: Option<String> = None;
        let mut stored: Vec<Trade> = Vec::new();
        let until: i64;

        if is_in_cache {
            let table = self.trades(key).unwrap_or_default();
            from_id = table.last().map(|t| t.id.clone());
            until = self.now_ms();
        } else {
            until = key.timeframe.prev_candle_start(Utc::now());
            stored = self.trades_sidecar_load(&key.pair);
            if !stored.is_empty() {
                let first_ts = stored.first().map(|t| t.ts_ms).unwrap_or(i64::MAX);
                let last_ts = stored.last().map(|t| t.ts_ms).unwrap_or(0);
                if last_ts > first_candle_ms && first_ts <= first_candle_ms {
                    from_id = stored.last().map(|t| t.id.clone());
                    since_ms = Some(last_ts.max(first_candle_ms));
                } else {
                    // Sidecar too old to bridge the window.
                    stored.clear();
                }
            }
        }

        let new_ticks = match self
            .get_trade_history(
                &key.pair,
                since_ms.unwrap_or(first_candle_ms),
                Some(until),
                from_id,
            )
            .await
        {
            Ok(ticks) => ticks,
            Err(err) => {
                log::warn!("Refreshing TRADES data for {} failed: {err}", key.pair);
                return (key.clone(), None);
            }
        };

        if new_ticks.is_empty() {
            log::error!("No new ticks for {}", key.pair);
            return (key.clone(), None);
        }

        stored.extend(new_ticks);
        let table = self.process_trades(key, stored, cache, first_candle_ms);
        if let Err(err) = self.trades_sidecar_store(&key.pair, &table) {
            log::warn!("Could not write trades sidecar for {}: {err}", key.pair);
        }
        (key.clone(), Some(table))
    }

    /// Merges fresh trades into the cached table, de-duplicating on id and
    /// ageing out rows older than the orderflow window.
    pub(crate) fn process_trades(
        &self,
        key: &TableKey,
        ticks: Vec<Trade>,
        cache: bool,
        first_required_ms: i64,
    ) -> Vec<Trade> {
        let mut table = if cache {
            let trades = self.trades.lock().unwrap_or_else(|e| e.into_inner());
            match trades.get(key) {
                Some(old) => {
                    let mut combined = old.clone();
                    combined.extend(ticks);
                    combined
                }
                None => ticks,
            }
        } else {
            ticks
        };
        table.sort_by(|a, b| a.ts_ms.cmp(&b.ts_ms));
        let mut table = dedupe_trades(table);
        table.retain(|t| t.ts_ms > first_required_ms);

        if cache {
            self.trades
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key.clone(), table.clone());
        }
        table
    }

    /// One `fetch_trades` page with retry and contract conversion.
    async fn fetch_trades_page(
        &self,
        pair: &str,
        since_ms: Option<i64>,
    ) -> ExchangeResult<Vec<Trade>> {
        let limit = self.features.trades_limit;
        log::debug!("Fetching trades for pair {pair}, since {since_ms:?}");
        let adapter = self.adapter.clone();
        let pair_c = pair.to_string();
        let mut trades = self
            .retry
            .execute("fetch_trades", API_RETRY_COUNT, move || {
                let adapter = adapter.clone();
                let pair = pair_c.clone();
                async move { adapter.fetch_trades(&pair, since_ms, limit).await }
            })
            .await?;
        self.convert_trade_amounts(pair, &mut trades);
        Ok(trades)
    }

    /// One id-cursored page with retry and contract conversion.
    async fn fetch_trades_page_by_id(
        &self,
        pair: &str,
        from_id: &str,
    ) -> ExchangeResult<Vec<Trade>> {
        let limit = self.features.trades_limit;
        let cursor_arg = self.features.trades_pagination_arg.clone();
        log::debug!("Fetching trades for pair {pair}, {cursor_arg}: {from_id}");
        let adapter = self.adapter.clone();
        let pair_c = pair.to_string();
        let from_id = from_id.to_string();
        let mut trades = self
            .retry
            .execute("fetch_trades", API_RETRY_COUNT, move || {
                let adapter = adapter.clone();
                let pair = pair_c.clone();
                let cursor_arg = cursor_arg.clone();
                let from_id = from_id.clone();
                async move {
                    adapter
                        .fetch_trades_from_id(&pair, &cursor_arg, &from_id, limit)
                        .await
                }
            })
            .await?;
        self.convert_trade_amounts(pair, &mut trades);
        Ok(trades)
    }

    /// Dispatches to the configured pagination dialect.
    pub(crate) async fn get_trade_history(
        &self,
        pair: &str,
        since_ms: i64,
        until_ms: Option<i64>,
        from_id: Option<String>,
    ) -> ExchangeResult<Vec<Trade>> {
        let until = until_ms.unwrap_or_else(|| self.now_ms());
        log::debug!(
            "get_trade_history(), pair: {pair}, since: {since_ms}, until: {until}, \
             from_id: {from_id:?}"
        );
        match self.features.trades_pagination {
            Some(PaginationKind::Time) => self.trade_history_time(pair, since_ms, until).await,
            Some(PaginationKind::Id) => {
                self.trade_history_id(pair, since_ms, until, from_id).await
            }
            None => Err(ExchangeError::NotPaginatable(format!(
                "Exchange {} does use neither time, nor id based pagination",
                self.name()
            ))),
        }
    }

    /// Time-based dialect: advance `since` to the last trade's timestamp.
    async fn trade_history_time(
        &self,
        pair: &str,
        mut since: i64,
        until: i64,
    ) -> ExchangeResult<Vec<Trade>> {
        let mut trades: Vec<Trade> = Vec::new();
        loop {
            if self.cancel_token.is_cancelled() {
                log::debug!("Interrupted, breaking trades DL loop.");
                break;
            }
            let page = self.fetch_trades_page(pair, Some(since)).await?;
            let Some(last) = page.last() else {
                log::debug!("Stopping as no more trades were returned.");
                break;
            };
            let since_next = last.ts_ms;
            // The venue is exhausted when it keeps returning the single
            // trade sitting exactly on the cursor.
            if since == since_next && page.len() == 1 {
                log::debug!("Stopping because no more trades are available.");
                break;
            }
            since = since_next;
            trades.extend(page);
            if since_next > until {
                log::debug!("Stopping because until was reached. {since_next} > {until}");
                break;
            }
        }
        Ok(trades)
    }

    /// Id-based dialect: seed with a time-based call, then cursor on ids.
    async fn trade_history_id(
        &self,
        pair: &str,
        since: i64,
        until: i64,
        mut from_id: Option<String>,
    ) -> ExchangeResult<Vec<Trade>> {
        let has_overlap = self.features.trades_pagination_overlap;
        // The last trade of each page is the cursor for the next call; with
        // overlap it re-appears there, so keep it out of the running result.
        fn page_slice(page: &[Trade], has_overlap: bool) -> &[Trade] {
            if has_overlap && !page.is_empty() {
                &page[..page.len() - 1]
            } else {
                page
            }
        }

        let mut trades: Vec<Trade> = Vec::new();

        let valid_id = from_id
            .as_deref()
            .is_some_and(|id| self.adapter.validate_trade_pagination_id(pair, id));
        if !valid_id {
            // Seed with a time-based call to obtain an id to paginate on.
            // Depending on the venue this can drift at the interval start.
            let page = self.fetch_trades_page(pair, Some(since)).await?;
            from_id = page.last().map(|t| t.id.clone());
            trades.extend_from_slice(page_slice(&page, has_overlap));
            if from_id.is_none() {
                return Ok(trades);
            }
        }

        loop {
            if self.cancel_token.is_cancelled() {
                log::debug!("Interrupted, breaking trades DL loop.");
                break;
            }
            let cursor = from_id.clone().expect("cursor checked above");
            let page = self.fetch_trades_page_by_id(pair, &cursor).await?;
            let Some(last) = page.last().cloned() else {
                log::debug!("Stopping as no more trades were returned.");
                break;
            };
            trades.extend_from_slice(page_slice(&page, has_overlap));
            if last.id == cursor || last.ts_ms > until {
                log::debug!("Stopping because from_id did not change or until was reached.");
                // End of the window: the held-back cursor trade belongs in
                // the result after all.
                if has_overlap {
                    trades.push(last);
                }
                break;
            }
            from_id = Some(last.id);
        }
        Ok(trades)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tradekit_model::OrderSide;

    use super::*;

    fn trade(ts: i64, id: &str) -> Trade {
        Trade::new(ts, id, 100.0, 1.0, OrderSide::Buy)
    }

    #[rstest]
    fn test_dedupe_keeps_first_occurrence() {
        let trades = vec![trade(1, "a"), trade(2, "b"), trade(3, "b"), trade(4, "c")];
        let deduped = dedupe_trades(trades);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[1].ts_ms, 2);
    }

    #[rstest]
    fn test_dedupe_unique_ids_untouched() {
        let trades = vec![trade(1, "a"), trade(2, "b")];
        assert_eq!(dedupe_trades(trades).len(), 2);
    }
}
