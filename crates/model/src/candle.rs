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

//! The candle (OHLCV) value type.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A single candle: open time plus OHLCV values.
///
/// `ts_ms` is the candle-open time in UTC milliseconds. Funding-rate
/// "candles" pack the rate into `open` and zero the remaining fields so
/// downstream code can treat all kinds uniformly.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Candle-open time in UTC milliseconds.
    pub ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Creates a new [`Candle`] instance.
    #[must_use]
    pub fn new(ts_ms: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            ts_ms,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Packs a funding rate into the candle layout (rate in `open`).
    #[must_use]
    pub fn funding_rate(ts_ms: i64, rate: f64) -> Self {
        Self {
            ts_ms,
            open: rate,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0.0,
        }
    }

    /// Synthesizes a gap-filling candle from the previous close.
    #[must_use]
    pub fn fill_from_close(ts_ms: i64, close: f64) -> Self {
        Self {
            ts_ms,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }
}

impl Display for Candle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.ts_ms, self.open, self.high, self.low, self.close, self.volume
        )
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
