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

//! The market-data cache and refresh engine.
//!
//! Keeps one in-memory OHLCV table per `(pair, timeframe, kind)` key and
//! reconciles WebSocket pushes with scheduled REST pulls. For each key a
//! refresh decides among: cached hit, WebSocket hit, a single incremental
//! pull, or a paginated backfill bounded by the startup call budget.

use ahash::AHashMap;
use chrono::Utc;
use futures_util::future::join_all;
use tradekit_model::{Candle, CandleKind, Timeframe};

use crate::{
    cache::PeriodicCache,
    engine::{Exchange, REFRESH_BATCH_SIZE, TableKey},
    error::{ExchangeError, ExchangeResult},
    retry::API_RETRY_COUNT,
};

/// Sorts, de-duplicates (later row wins), optionally fills gaps with flat
/// candles and optionally drops the trailing partial candle.
pub(crate) fn clean_ohlcv(
    mut candles: Vec<Candle>,
    timeframe: Timeframe,
    fill_missing: bool,
    drop_incomplete: bool,
) -> Vec<Candle> {
    candles.sort_by_key(|c| c.ts_ms);
    let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match deduped.last_mut() {
            Some(last) if last.ts_ms == candle.ts_ms => *last = candle,
            _ => deduped.push(candle),
        }
    }

    let mut result = if fill_missing {
        let tf_ms = timeframe.as_millis();
        let mut filled: Vec<Candle> = Vec::with_capacity(deduped.len());
        for candle in deduped {
            if let Some(prev) = filled.last().copied() {
                let mut ts = prev.ts_ms + tf_ms;
                while ts < candle.ts_ms {
                    filled.push(Candle::fill_from_close(ts, prev.close));
                    ts += tf_ms;
                }
            }
            filled.push(candle);
        }
        filled
    } else {
        deduped
    };

    if drop_incomplete {
        result.pop();
    }
    result
}

/// How one key's refresh is served.
#[derive(Clone, Debug)]
enum OhlcvJob {
    /// Serve from the WebSocket push buffer, up to the given candle open.
    Push { until_ts: i64 },
    /// Single incremental REST pull.
    Single { since_ms: Option<i64> },
    /// Paginated backfill.
    Historic {
        since_ms: i64,
        until_ms: Option<i64>,
    },
}

impl Exchange {
    /// Returns a copy of the cached table for a key, if present.
    #[must_use]
    pub fn klines(&self, key: &TableKey) -> Option<Vec<Candle>> {
        self.klines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Refreshes the in-memory OHLCV tables for all keys.
    ///
    /// Jobs are grouped into batches of [`REFRESH_BATCH_SIZE`] concurrent
    /// tasks; per-task failures are logged and skipped so siblings keep
    /// their results. Returns the current table per key.
    pub fn refresh_latest_ohlcv(
        &self,
        pair_list: &[TableKey],
        since_ms: Option<i64>,
        cache: bool,
        drop_incomplete: Option<bool>,
    ) -> AHashMap<TableKey, Vec<Candle>> {
        log::debug!("Refreshing candle (OHLCV) data for {} pairs", pair_list.len());

        let (jobs, cached_keys) = self.build_ohlcv_jobs(pair_list, since_ms, cache);

        let mut results: AHashMap<TableKey, Vec<Candle>> = AHashMap::new();
        for batch in jobs.chunks(REFRESH_BATCH_SIZE) {
            let batch_results = self.run(join_all(
                batch
                    .iter()
                    .map(|(key, job)| self.execute_ohlcv_job(key.clone(), job.clone())),
            ));
            for (key, result) in batch_results {
                match result {
                    Ok(ticks) => {
                        let drop = drop_incomplete.unwrap_or(self.features.ohlcv_partial_candle);
                        let table = self.process_ohlcv(&key, ticks, cache, drop);
                        results.insert(key, table);
                    }
                    Err(err) => log::warn!("Candle refresh for {key} raised: {err}"),
                }
            }
        }

        for key in cached_keys {
            if let Some(table) = self.klines(&key) {
                results.insert(key, table);
            }
        }
        results
    }

    /// Refreshes candles through an expiring per-timeframe cache.
    ///
    /// Results go stale together when a new candle opens, for callers that
    /// need "on time" expiry rather than the long-lived table cache.
    pub fn refresh_ohlcv_with_cache(
        &self,
        pair_list: &[TableKey],
        since_ms: i64,
    ) -> AHashMap<TableKey, Vec<Candle>> {
        let mut candles: AHashMap<TableKey, Vec<Candle>> = AHashMap::new();
        let mut to_download: Vec<TableKey> = Vec::new();
        {
            let mut caches = self
                .expiring_candle_cache
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            for key in pair_list {
                let cache = caches
                    .entry((key.timeframe, since_ms))
                    .or_insert_with(|| PeriodicCache::new(key.timeframe.as_secs(), 1_000));
                match cache.get(key) {
                    Some(table) => {
                        candles.insert(key.clone(), table);
                    }
                    None => to_download.push(key.clone()),
                }
            }
        }

        if !to_download.is_empty() {
            let fresh = self.refresh_latest_ohlcv(&to_download, Some(since_ms), false, None);
            let mut caches = self
                .expiring_candle_cache
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            for (key, table) in fresh {
                if let Some(cache) = caches.get_mut(&(key.timeframe, since_ms)) {
                    cache.insert(key.clone(), table.clone());
                }
                candles.insert(key, table);
            }
        }
        candles
    }

    /// Downloads candle history for one pair without touching the cache.
    ///
    /// The trailing partial candle is dropped; gaps are left unfilled.
    pub fn get_historic_ohlcv(
        &self,
        pair: &str,
        timeframe: Timeframe,
        kind: CandleKind,
        since_ms: i64,
        until_ms: Option<i64>,
    ) -> ExchangeResult<Vec<Candle>> {
        let key = TableKey::new(pair, timeframe, kind);
        let ticks = self.run(self.fetch_historic_candles(&key, since_ms, until_ms))?;
        log::debug!("Downloaded {} candles for {pair}", ticks.len());
        Ok(clean_ohlcv(ticks, timeframe, false, true))
    }

    /// Whether the last refresh of a key is older than one full candle.
    pub(crate) fn now_is_time_to_refresh(&self, key: &TableKey) -> bool {
        let last = self
            .pairs_last_refresh
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0);
        let current_open = key.timeframe.prev_candle_start(Utc::now());
        last + key.timeframe.as_millis() < current_open
    }

    fn build_ohlcv_jobs(
        &self,
        pair_list: &[TableKey],
        since_ms: Option<i64>,
        cache: bool,
    ) -> (Vec<(TableKey, OhlcvJob)>, Vec<TableKey>) {
        let mut jobs: Vec<(TableKey, OhlcvJob)> = Vec::new();
        let mut cached_keys: Vec<TableKey> = Vec::new();
        let mut seen: Vec<TableKey> = Vec::new();

        for key in pair_list {
            if seen.contains(key) {
                continue;
            }
            seen.push(key.clone());

            if key.kind.is_price() && !self.timeframes().contains(&key.timeframe) {
                log::warn!(
                    "Cannot download ({}, {}): timeframe not available on {}",
                    key.pair,
                    key.timeframe,
                    self.name(),
                );
                continue;
            }

            let in_cache = self
                .klines
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains_key(key);
            // A request reaching back past the oldest retained candle can
            // never be served from cache, fresh or not.
            let needs_history = since_ms.is_some_and(|since| {
                self.klines(key)
                    .and_then(|t| t.first().map(|c| c.ts_ms))
                    .is_some_and(|oldest| oldest > since)
            });
            if in_cache && cache && !needs_history && !self.now_is_time_to_refresh(key) {
                log::debug!("Using cached candle (OHLCV) data for {key}");
                cached_keys.push(key.clone());
                continue;
            }

            jobs.push((key.clone(), self.build_ohlcv_job(key, since_ms, cache)));
        }
        (jobs, cached_keys)
    }

    fn build_ohlcv_job(&self, key: &TableKey, since_ms: Option<i64>, cache: bool) -> OhlcvJob {
        let timeframe = key.timeframe;
        let now = Utc::now();
        let mut not_all_data = cache && self.required_candle_call_count > 1;

        if cache
            && key.kind.is_price()
            && let Some(push) = &self.push
        {
            push.schedule(key.clone());
        }

        let in_cache = self
            .klines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key);
        if cache && in_cache {
            // Stale-history request: the caller wants more history than the
            // table retains, so the table is rebuilt from scratch.
            if let Some(since) = since_ms {
                let oldest = self
                    .klines(key)
                    .and_then(|t| t.first().map(|c| c.ts_ms))
                    .unwrap_or(i64::MAX);
                if oldest > since {
                    log::info!("Evicting {key}: requested history predates cached table");
                    self.evict_kline(key);
                    return OhlcvJob::Historic {
                        since_ms: since,
                        until_ms: None,
                    };
                }
            }

            let candle_limit = self.ohlcv_candle_limit(timeframe, key.kind);
            let min_ts = timeframe.ts_minus_candles(now, candle_limit.saturating_sub(5) as u64);

            if let Some(until_ts) = self.usable_push_buffer(key, now) {
                return OhlcvJob::Push { until_ts };
            }

            let last_refresh = self
                .pairs_last_refresh
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(key)
                .copied()
                .unwrap_or(0);
            if min_ts < last_refresh {
                // One call covers the hole.
                not_all_data = false;
            } else {
                log::info!("Time jump detected. Evicting cache for {key}");
                self.evict_kline(key);
            }
        }

        let mut since_ms = since_ms;
        if since_ms.is_none() && (self.features.ohlcv_require_since || not_all_data) {
            let candle_limit = self.ohlcv_candle_limit(timeframe, key.kind);
            let one_call = timeframe.as_millis() * i64::from(candle_limit);
            let move_to = one_call * i64::from(self.required_candle_call_count);
            since_ms = Some(timeframe.next_candle_start(now) - move_to);
        }

        match since_ms {
            Some(since) => OhlcvJob::Historic {
                since_ms: since,
                until_ms: None,
            },
            None => OhlcvJob::Single { since_ms: None },
        }
    }

    fn evict_kline(&self, key: &TableKey) {
        self.klines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    /// Checks whether the push buffer can serve this key: the buffer must
    /// reach back to the previous candle and have been refreshed within
    /// half a candle-period.
    fn usable_push_buffer(&self, key: &TableKey, now: chrono::DateTime<Utc>) -> Option<i64> {
        let push = self.push.as_ref()?;
        if !key.kind.is_price() {
            return None;
        }
        let candle_ts = key.timeframe.prev_candle_start(now);
        let prev_candle_ts = candle_ts - key.timeframe.as_millis();
        let half_candle = candle_ts - key.timeframe.as_millis() / 2;
        let candles = push.ohlcvs(&key.pair, key.timeframe);
        let last_refresh = push.klines_last_refresh(key);

        let buffer_ok = match candles.as_slice() {
            [] => false,
            [only] => only.ts_ms < candle_ts,
            [.., last] => last.ts_ms >= prev_candle_ts,
        };
        if buffer_ok && last_refresh >= half_candle {
            log::debug!("Reusing watch result for {key}, {last_refresh}");
            Some(candle_ts)
        } else {
            if !candles.is_empty() {
                log::info!("Couldn't reuse watch for {key}, falling back to REST");
            }
            None
        }
    }

    async fn execute_ohlcv_job(
        &self,
        key: TableKey,
        job: OhlcvJob,
    ) -> (TableKey, ExchangeResult<Vec<Candle>>) {
        let result = match job {
            OhlcvJob::Push { until_ts } => {
                let push = self.push.as_ref().expect("push job without push cache");
                Ok(push.ohlcv_until(&key.pair, key.timeframe, until_ts))
            }
            OhlcvJob::Single { since_ms } => self.fetch_candles_once(&key, since_ms).await,
            OhlcvJob::Historic { since_ms, until_ms } => {
                self.fetch_historic_candles(&key, since_ms, until_ms).await
            }
        };
        (key, result)
    }

    /// One REST pull with retry; funding-rate kinds route through the
    /// dedicated venue call and are packed into the candle layout.
    pub(crate) async fn fetch_candles_once(
        &self,
        key: &TableKey,
        since_ms: Option<i64>,
    ) -> ExchangeResult<Vec<Candle>> {
        let limit = self.ohlcv_candle_limit(key.timeframe, key.kind);
        log::debug!(
            "Fetching pair {}, {}, interval {}, since {since_ms:?}",
            key.pair,
            key.kind,
            key.timeframe,
        );
        let adapter = self.adapter.clone();
        let key_c = key.clone();
        let mut data = self
            .retry
            .execute("fetch_ohlcv", API_RETRY_COUNT, move || {
                let adapter = adapter.clone();
                let key = key_c.clone();
                async move {
                    if key.kind == CandleKind::FundingRate {
                        let entries = adapter
                            .fetch_funding_rate_history(&key.pair, since_ms, limit)
                            .await?;
                        Ok(entries
                            .iter()
                            .map(|e| Candle::funding_rate(e.ts_ms, e.rate))
                            .collect())
                    } else {
                        adapter
                            .fetch_ohlcv(&key.pair, key.timeframe, key.kind, since_ms, limit)
                            .await
                    }
                }
            })
            .await?;

        // Venues disagree on sort order; normalise to ascending.
        if data.first().map(|c| c.ts_ms) > data.last().map(|c| c.ts_ms) {
            data.sort_by_key(|c| c.ts_ms);
        }
        Ok(data)
    }

    /// Paginated backfill assuming `candle_limit` rows per call, fanned out
    /// in batches of [`REFRESH_BATCH_SIZE`].
    pub(crate) async fn fetch_historic_candles(
        &self,
        key: &TableKey,
        since_ms: i64,
        until_ms: Option<i64>,
    ) -> ExchangeResult<Vec<Candle>> {
        let limit = self.ohlcv_candle_limit(key.timeframe, key.kind);
        let one_call = key.timeframe.as_millis() * i64::from(limit);
        let until = until_ms.unwrap_or_else(|| self.now_ms());

        let starts: Vec<i64> = (since_ms..until).step_by(one_call.max(1) as usize).collect();
        let mut data: Vec<Candle> = Vec::new();
        let mut first_error: Option<ExchangeError> = None;
        for batch in starts.chunks(REFRESH_BATCH_SIZE) {
            let results = join_all(
                batch
                    .iter()
                    .map(|since| self.fetch_candles_once(key, Some(*since))),
            )
            .await;
            for result in results {
                match result {
                    Ok(ticks) => data.extend(ticks),
                    Err(err) => {
                        log::warn!("Async candle call raised: {err}");
                        first_error.get_or_insert(err);
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        // Calls resolve in task order, not time order.
        data.sort_by_key(|c| c.ts_ms);
        Ok(data)
    }

    /// Merges fresh rows into the cached table and bounds its length.
    pub(crate) fn process_ohlcv(
        &self,
        key: &TableKey,
        ticks: Vec<Candle>,
        cache: bool,
        drop_incomplete: bool,
    ) -> Vec<Candle> {
        if cache && !ticks.is_empty() {
            let idx = if drop_incomplete && ticks.len() > 1 {
                ticks.len() - 2
            } else {
                ticks.len() - 1
            };
            self.pairs_last_refresh
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key.clone(), ticks[idx].ts_ms);
        }

        let fresh = clean_ohlcv(ticks, key.timeframe, true, drop_incomplete);
        if !cache {
            return fresh;
        }

        let mut klines = self.klines.lock().unwrap_or_else(|e| e.into_inner());
        let combined = match klines.get(key) {
            Some(old) => {
                let mut merged = old.clone();
                merged.extend(fresh);
                let mut merged = clean_ohlcv(merged, key.timeframe, true, false);
                let keep = (self.ohlcv_candle_limit(key.timeframe, key.kind)
                    + self.config.startup_candle_count) as usize;
                if merged.len() > keep {
                    merged.drain(..merged.len() - keep);
                }
                merged
            }
            None => fresh,
        };
        klines.insert(key.clone(), combined.clone());
        combined
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn candle(ts: i64, close: f64) -> Candle {
        Candle::new(ts, close, close + 1.0, close - 1.0, close, 10.0)
    }

    const TF: Timeframe = Timeframe::M5;
    const TF_MS: i64 = 300_000;

    #[rstest]
    fn test_clean_sorts_and_dedupes_keeping_later() {
        let earlier = candle(TF_MS, 1.0);
        let later = candle(TF_MS, 2.0);
        let cleaned = clean_ohlcv(vec![candle(2 * TF_MS, 3.0), earlier, later], TF, false, false);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].close, 2.0);
        assert_eq!(cleaned[1].close, 3.0);
    }

    #[rstest]
    fn test_clean_fills_gaps_with_flat_candles() {
        let cleaned = clean_ohlcv(
            vec![candle(0, 10.0), candle(3 * TF_MS, 20.0)],
            TF,
            true,
            false,
        );
        assert_eq!(cleaned.len(), 4);
        assert_eq!(cleaned[1].ts_ms, TF_MS);
        assert_eq!(cleaned[1].open, 10.0);
        assert_eq!(cleaned[1].close, 10.0);
        assert_eq!(cleaned[1].volume, 0.0);
        assert_eq!(cleaned[2].ts_ms, 2 * TF_MS);
        // Spacing invariant after fill.
        for pair in cleaned.windows(2) {
            assert_eq!(pair[1].ts_ms - pair[0].ts_ms, TF_MS);
        }
    }

    #[rstest]
    fn test_clean_drops_partial_candle() {
        let cleaned = clean_ohlcv(
            vec![candle(0, 10.0), candle(TF_MS, 11.0), candle(2 * TF_MS, 12.0)],
            TF,
            false,
            true,
        );
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned.last().unwrap().ts_ms, TF_MS);
    }

    #[rstest]
    fn test_clean_is_idempotent() {
        let input = vec![candle(0, 10.0), candle(2 * TF_MS, 12.0), candle(TF_MS, 11.0)];
        let once = clean_ohlcv(input, TF, true, false);
        let twice = clean_ohlcv(once.clone(), TF, true, false);
        assert_eq!(once, twice);
    }

    #[rstest]
    fn test_clean_empty() {
        assert!(clean_ohlcv(Vec::new(), TF, true, true).is_empty());
    }
}
