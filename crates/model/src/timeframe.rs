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

//! Candle timeframes and the calendar arithmetic built on them.

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error produced when parsing a timeframe token.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid timeframe: {0}")]
pub struct TimeframeError(String);

/// Duration of one candle, e.g. `5m`, `1h`, `1d`.
///
/// Internally held in seconds; formatting and parsing use the conventional
/// exchange tokens (`m`, `h`, `d`, `w`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timeframe {
    secs: u64,
}

impl Timeframe {
    pub const M1: Self = Self { secs: 60 };
    pub const M5: Self = Self { secs: 300 };
    pub const M15: Self = Self { secs: 900 };
    pub const H1: Self = Self { secs: 3_600 };
    pub const H4: Self = Self { secs: 14_400 };
    pub const H8: Self = Self { secs: 28_800 };
    pub const D1: Self = Self { secs: 86_400 };

    /// Creates a timeframe from whole seconds.
    ///
    /// Sub-minute timeframes are not supported by the engine.
    pub fn from_secs(secs: u64) -> Result<Self, TimeframeError> {
        if secs == 0 || secs % 60 != 0 {
            return Err(TimeframeError(format!("{secs}s")));
        }
        Ok(Self { secs })
    }

    /// Returns the timeframe duration in seconds.
    #[must_use]
    pub fn as_secs(&self) -> u64 {
        self.secs
    }

    /// Returns the timeframe duration in milliseconds.
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        self.secs as i64 * 1_000
    }

    /// Returns the timeframe duration in whole minutes.
    #[must_use]
    pub fn as_minutes(&self) -> u64 {
        self.secs / 60
    }

    /// Returns the open time of the candle containing `ts_ms` (floor).
    #[must_use]
    pub fn candle_start(&self, ts_ms: i64) -> i64 {
        let tf_ms = self.as_millis();
        ts_ms.div_euclid(tf_ms) * tf_ms
    }

    /// Returns the open time of the candle containing `now` (the current,
    /// still in-progress candle).
    #[must_use]
    pub fn prev_candle_start(&self, now: DateTime<Utc>) -> i64 {
        self.candle_start(now.timestamp_millis())
    }

    /// Returns the open time of the next candle after `now`.
    #[must_use]
    pub fn next_candle_start(&self, now: DateTime<Utc>) -> i64 {
        self.prev_candle_start(now) + self.as_millis()
    }

    /// Returns `now` moved back by `n` candles, snapped to a candle open.
    #[must_use]
    pub fn ts_minus_candles(&self, now: DateTime<Utc>, n: u64) -> i64 {
        self.prev_candle_start(now) - self.as_millis() * n as i64
    }

    /// Returns the timeframe as a [`TimeDelta`].
    #[must_use]
    pub fn as_timedelta(&self) -> TimeDelta {
        TimeDelta::seconds(self.secs as i64)
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.secs;
        if secs % 604_800 == 0 {
            write!(f, "{}w", secs / 604_800)
        } else if secs % 86_400 == 0 {
            write!(f, "{}d", secs / 86_400)
        } else if secs % 3_600 == 0 {
            write!(f, "{}h", secs / 3_600)
        } else {
            write!(f, "{}m", secs / 60)
        }
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit) = s.split_at(s.len().saturating_sub(1));
        let value: u64 = value.parse().map_err(|_| TimeframeError(s.to_string()))?;
        let secs = match unit {
            "m" => value.checked_mul(60),
            "h" => value.checked_mul(3_600),
            "d" => value.checked_mul(86_400),
            "w" => value.checked_mul(604_800),
            _ => None,
        }
        .ok_or_else(|| TimeframeError(s.to_string()))?;
        Self::from_secs(secs).map_err(|_| TimeframeError(s.to_string()))
    }
}

impl Serialize for Timeframe {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Timeframe {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
