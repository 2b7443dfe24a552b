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

//! Small in-process caches used by the rate and ticker paths.

use std::{hash::Hash, time::Duration};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// A bounded map whose entries expire `ttl` after insertion.
#[derive(Clone, Debug)]
pub struct TtlCache<K, V> {
    entries: IndexMap<K, (V, DateTime<Utc>)>,
    ttl: Duration,
    maxsize: usize,
}

impl<K: Hash + Eq + Clone, V: Clone> TtlCache<K, V> {
    /// Creates a cache with the given entry lifetime and capacity.
    #[must_use]
    pub fn new(ttl: Duration, maxsize: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            ttl,
            maxsize,
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, (_, expires)| *expires > now);
    }

    /// Returns the live value for `key`, if any.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = Utc::now();
        self.prune(now);
        self.entries.get(key).map(|(value, _)| value.clone())
    }

    /// Inserts a value, evicting the oldest entry when full.
    pub fn insert(&mut self, key: K, value: V) {
        let now = Utc::now();
        self.prune(now);
        if self.entries.len() >= self.maxsize && !self.entries.contains_key(&key) {
            self.entries.shift_remove_index(0);
        }
        let expires = now + self.ttl;
        self.entries.insert(key, (value, expires));
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A cache whose entries expire at wall-clock boundaries of `period`.
///
/// Used for candle results that must all go stale together when a new
/// candle opens, regardless of when each entry was inserted.
#[derive(Clone, Debug)]
pub struct PeriodicCache<K, V> {
    entries: IndexMap<K, (V, i64)>,
    period_secs: i64,
    maxsize: usize,
}

impl<K: Hash + Eq + Clone, V: Clone> PeriodicCache<K, V> {
    /// Creates a cache aligned to `period_secs` boundaries.
    #[must_use]
    pub fn new(period_secs: u64, maxsize: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            period_secs: period_secs as i64,
            maxsize,
        }
    }

    fn expiry_for(&self, now: DateTime<Utc>) -> i64 {
        (now.timestamp().div_euclid(self.period_secs) + 1) * self.period_secs
    }

    /// Returns the live value for `key`, if any.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = Utc::now().timestamp();
        self.entries.retain(|_, (_, expires)| *expires > now);
        self.entries.get(key).map(|(value, _)| value.clone())
    }

    /// Inserts a value expiring at the next period boundary.
    pub fn insert(&mut self, key: K, value: V) {
        let now = Utc::now();
        self.entries
            .retain(|_, (_, expires)| *expires > now.timestamp());
        if self.entries.len() >= self.maxsize && !self.entries.contains_key(&key) {
            self.entries.shift_remove_index(0);
        }
        let expires = self.expiry_for(now);
        self.entries.insert(key, (value, expires));
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_ttl_cache_round_trip() {
        let mut cache: TtlCache<String, f64> = TtlCache::new(Duration::from_secs(300), 4);
        assert_eq!(cache.get(&"ETH/USDT".to_string()), None);
        cache.insert("ETH/USDT".to_string(), 123.4);
        assert_eq!(cache.get(&"ETH/USDT".to_string()), Some(123.4));
    }

    #[rstest]
    fn test_ttl_cache_expiry() {
        let mut cache: TtlCache<String, f64> = TtlCache::new(Duration::ZERO, 4);
        cache.insert("ETH/USDT".to_string(), 123.4);
        assert_eq!(cache.get(&"ETH/USDT".to_string()), None);
    }

    #[rstest]
    fn test_ttl_cache_eviction_at_capacity() {
        let mut cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(300), 2);
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.insert(3, 3);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(2));
        assert_eq!(cache.get(&3), Some(3));
    }

    #[rstest]
    fn test_periodic_cache_round_trip() {
        let mut cache: PeriodicCache<u32, u32> = PeriodicCache::new(3_600, 10);
        cache.insert(1, 10);
        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.get(&2), None);
    }
}
