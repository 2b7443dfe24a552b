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

//! Persistence sidecars: the per-pair trade cache and the leverage-tier
//! cache.
//!
//! Neither file is authoritative; both are hints that survive restarts.
//! The trade sidecar warms the in-memory table and is rewritten after
//! every merge that produced new trades. The leverage-tier cache avoids
//! the slow per-symbol tier download on startup and expires after four
//! weeks.

use std::{fs, path::PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tradekit_model::{LeverageTier, Trade};

use crate::{engine::Exchange, error::ExchangeResult};

/// Maximum age of the leverage-tier cache.
pub(crate) fn leverage_tiers_cache_max_age() -> TimeDelta {
    TimeDelta::weeks(4)
}

/// Makes a pair safe to use as a file name.
pub(crate) fn pair_to_filename(pair: &str) -> String {
    pair.replace(['/', ':'], "_")
}

#[derive(Debug, Serialize, Deserialize)]
struct TiersFile {
    updated: DateTime<Utc>,
    data: IndexMap<String, Vec<LeverageTier>>,
}

impl Exchange {
    fn sidecar_dir(&self) -> PathBuf {
        if self.is_futures() {
            self.config.datadir.join("futures")
        } else {
            self.config.datadir.clone()
        }
    }

    pub(crate) fn trades_sidecar_path(&self, pair: &str) -> PathBuf {
        self.sidecar_dir()
            .join(format!("{}-cached", pair_to_filename(pair)))
    }

    /// Reads the trade sidecar; a missing or unreadable file is an empty
    /// table.
    pub(crate) fn trades_sidecar_load(&self, pair: &str) -> Vec<Trade> {
        let path = self.trades_sidecar_path(pair);
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(trades) => trades,
                Err(err) => {
                    log::warn!("Discarding unreadable trades sidecar {path:?}: {err}");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    /// Rewrites the trade sidecar with the full table.
    pub(crate) fn trades_sidecar_store(&self, pair: &str, trades: &[Trade]) -> ExchangeResult<()> {
        let path = self.trades_sidecar_path(pair);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string(trades)?)?;
        Ok(())
    }

    pub(crate) fn leverage_tiers_path(&self) -> PathBuf {
        self.config.datadir.join("futures").join(format!(
            "leverage_tiers_{}.json",
            self.config.stake_currency
        ))
    }

    /// Writes the leverage-tier cache keyed by stake currency.
    pub(crate) fn cache_leverage_tiers(
        &self,
        tiers: &IndexMap<String, Vec<LeverageTier>>,
    ) -> ExchangeResult<()> {
        let path = self.leverage_tiers_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = TiersFile {
            updated: Utc::now(),
            data: tiers.clone(),
        };
        fs::write(&path, serde_json::to_string(&file)?)?;
        Ok(())
    }

    /// Loads the leverage-tier cache unless it has expired.
    pub(crate) fn load_cached_leverage_tiers(
        &self,
    ) -> Option<IndexMap<String, Vec<LeverageTier>>> {
        let path = self.leverage_tiers_path();
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<TiersFile>(&content) {
            Ok(file) => {
                if file.updated < Utc::now() - leverage_tiers_cache_max_age() {
                    log::info!("Cached leverage tiers are outdated. Will update.");
                    return None;
                }
                Some(file.data)
            }
            Err(err) => {
                log::warn!("Error loading cached leverage tiers, refreshing: {err}");
                None
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
