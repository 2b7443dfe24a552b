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

//! Push-side candle cache fed by a WebSocket component.
//!
//! The transport itself lives outside the engine; whatever drives the
//! venue's candle stream ingests rows through [`PushCache::push_candle`].
//! The refresh engine consults the buffer and its last-refresh timestamps
//! to decide whether a key can be served without a REST pull.

use std::{
    collections::HashSet,
    sync::Mutex,
};

use ahash::AHashMap;
use chrono::Utc;
use tradekit_model::{Candle, Timeframe};

use crate::engine::TableKey;

/// Candles retained per push buffer.
const BUFFER_LIMIT: usize = 1_500;

/// Shared buffer of pushed candles plus subscription bookkeeping.
#[derive(Debug, Default)]
pub struct PushCache {
    subscriptions: Mutex<HashSet<TableKey>>,
    buffers: Mutex<AHashMap<(String, Timeframe), Vec<Candle>>>,
    last_refresh: Mutex<AHashMap<TableKey, i64>>,
}

impl PushCache {
    /// Creates a new [`PushCache`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key to the subscription set.
    pub fn schedule(&self, key: TableKey) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key);
    }

    /// Returns the currently scheduled keys.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<TableKey> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Ingests one pushed candle, replacing the in-progress row when the
    /// open time matches.
    pub fn push_candle(&self, key: &TableKey, candle: Candle) {
        let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        let buffer = buffers
            .entry((key.pair.clone(), key.timeframe))
            .or_default();
        match buffer.last_mut() {
            Some(last) if last.ts_ms == candle.ts_ms => *last = candle,
            Some(last) if last.ts_ms > candle.ts_ms => {
                // Out-of-order push; ignore rather than corrupt the buffer.
                log::debug!("Dropping out-of-order push for {key}");
                return;
            }
            _ => buffer.push(candle),
        }
        if buffer.len() > BUFFER_LIMIT {
            let excess = buffer.len() - BUFFER_LIMIT;
            buffer.drain(..excess);
        }
        self.last_refresh
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), Utc::now().timestamp_millis());
    }

    /// Returns the push buffer for a pair/timeframe.
    #[must_use]
    pub fn ohlcvs(&self, pair: &str, timeframe: Timeframe) -> Vec<Candle> {
        self.buffers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(pair.to_string(), timeframe))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the buffer trimmed to candles opening at or before
    /// `until_ts`.
    #[must_use]
    pub fn ohlcv_until(&self, pair: &str, timeframe: Timeframe, until_ts: i64) -> Vec<Candle> {
        let mut candles = self.ohlcvs(pair, timeframe);
        candles.retain(|c| c.ts_ms <= until_ts);
        candles
    }

    /// Timestamp of the last push for a key, 0 when never refreshed.
    #[must_use]
    pub fn klines_last_refresh(&self, key: &TableKey) -> i64 {
        self.last_refresh
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Periodic connection cycle: drops buffers and refresh marks while
    /// keeping the subscription set so the feed can resubscribe.
    pub fn reset_connections(&self) {
        self.buffers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.last_refresh
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
