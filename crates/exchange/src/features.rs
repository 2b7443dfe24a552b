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

//! Per-venue capability matrix.
//!
//! Each venue exposes a flat capability record enumerating supported
//! features and per-feature parameters. The merged record is consulted
//! before every call so the engine asks "can this venue do X?" instead of
//! inspecting venue identity. Merge precedence, lowest to highest: built-in
//! defaults, per-venue overrides, futures-specific overrides (when trading
//! futures), user configuration. Map-valued fields merge per key; all other
//! fields replace wholesale.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tradekit_model::{CandleKind, PaginationKind, Timeframe};

/// Fallback candle limit when neither the capability matrix nor the venue
/// declares one.
pub const DEFAULT_CANDLE_LIMIT: u32 = 500;

/// The merged capability record for a venue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// Venue accepts stop orders.
    pub stoploss_on_exchange: bool,
    /// Request key carrying the trigger price.
    pub stop_price_param: String,
    /// Response key carrying the trigger price.
    pub stop_price_prop: String,
    /// Exchange order subtype for each user intent (`limit`/`market`).
    pub stoploss_order_types: IndexMap<String, String>,
    /// Request key selecting the price the trigger compares against.
    pub stop_price_type_field: Option<String>,
    /// Mapping from price-type intent to the venue token.
    pub stop_price_type_value_mapping: IndexMap<String, String>,
    /// Supported time-in-force tokens, upper-cased.
    pub order_time_in_force: Vec<String>,
    /// REST history of candles is available.
    pub ohlcv_has_history: bool,
    /// The last candle of a pull may be in-progress.
    pub ohlcv_partial_candle: bool,
    /// `since` is required even for a latest-candles pull.
    pub ohlcv_require_since: bool,
    /// Max candle rows per call; `None` falls back to the venue default.
    pub ohlcv_candle_limit: Option<u32>,
    /// Per-timeframe overrides of the candle limit.
    pub ohlcv_candle_limit_per_timeframe: IndexMap<String, u32>,
    /// Candle limit override for funding-rate pulls.
    pub funding_fee_candle_limit: Option<u32>,
    /// Max trade rows per call.
    pub trades_limit: u32,
    /// Which cursor drives trade-history pagination.
    pub trades_pagination: Option<PaginationKind>,
    /// Request key carrying the pagination cursor.
    pub trades_pagination_arg: String,
    /// Last trade of a page repeats as the first of the next.
    pub trades_pagination_overlap: bool,
    /// History of public trades is available.
    pub trades_has_history: bool,
    /// Allowed depth parameters for L2 book requests.
    pub l2_limit_range: Option<Vec<u32>>,
    /// Whether a depth from the range must always be sent.
    pub l2_limit_range_required: bool,
    /// Upper bound on the depth parameter.
    pub l2_limit_upper: Option<u32>,
    /// Candle kind expressing the mark price.
    pub mark_ohlcv_price: CandleKind,
    /// Timeframe of mark-price candles.
    pub mark_ohlcv_timeframe: Timeframe,
    /// Interval at which funding is charged.
    pub funding_fee_timeframe: Timeframe,
    /// Leverage must be floored to an integer before submission.
    pub floor_leverage: bool,
    /// Order fields expressed in contracts, converted at the boundary.
    pub order_props_in_contracts: Vec<String>,
    /// Chunk duration in minutes for windowed order-history pulls.
    pub fetch_orders_limit_minutes: Option<u32>,
    /// Market orders must carry a reference price.
    pub market_order_requires_price: bool,
    /// Forces the truth value of a named endpoint capability.
    pub exchange_has_overrides: IndexMap<String, bool>,
    /// Alias table for conversion-rate lookup.
    pub proxy_coin_mapping: IndexMap<String, String>,
    /// WebSocket candle push is trusted.
    pub ws_enabled: bool,
    /// Residual keys for forward compatibility.
    pub extra: IndexMap<String, Value>,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            stoploss_on_exchange: false,
            stop_price_param: "stopLossPrice".to_string(),
            stop_price_prop: "stopLossPrice".to_string(),
            stoploss_order_types: IndexMap::new(),
            stop_price_type_field: None,
            stop_price_type_value_mapping: IndexMap::new(),
            order_time_in_force: vec!["GTC".to_string()],
            ohlcv_has_history: true,
            ohlcv_partial_candle: true,
            ohlcv_require_since: false,
            ohlcv_candle_limit: None,
            ohlcv_candle_limit_per_timeframe: IndexMap::new(),
            funding_fee_candle_limit: None,
            trades_limit: 1_000,
            trades_pagination: Some(PaginationKind::Time),
            trades_pagination_arg: "since".to_string(),
            trades_pagination_overlap: true,
            trades_has_history: false,
            l2_limit_range: None,
            l2_limit_range_required: true,
            l2_limit_upper: None,
            mark_ohlcv_price: CandleKind::Mark,
            mark_ohlcv_timeframe: Timeframe::H8,
            funding_fee_timeframe: Timeframe::H8,
            floor_leverage: false,
            order_props_in_contracts: vec![
                "amount".to_string(),
                "filled".to_string(),
                "remaining".to_string(),
            ],
            fetch_orders_limit_minutes: None,
            market_order_requires_price: false,
            exchange_has_overrides: IndexMap::new(),
            proxy_coin_mapping: IndexMap::new(),
            ws_enabled: false,
            extra: IndexMap::new(),
        }
    }
}

/// A partial capability record used as one merge layer.
///
/// Every field is optional; `None` leaves the lower-precedence value in
/// place. The five map-valued fields are deep-merged per key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureOverrides {
    pub stoploss_on_exchange: Option<bool>,
    pub stop_price_param: Option<String>,
    pub stop_price_prop: Option<String>,
    pub stoploss_order_types: IndexMap<String, String>,
    pub stop_price_type_field: Option<String>,
    pub stop_price_type_value_mapping: IndexMap<String, String>,
    pub order_time_in_force: Option<Vec<String>>,
    pub ohlcv_has_history: Option<bool>,
    pub ohlcv_partial_candle: Option<bool>,
    pub ohlcv_require_since: Option<bool>,
    pub ohlcv_candle_limit: Option<u32>,
    pub ohlcv_candle_limit_per_timeframe: IndexMap<String, u32>,
    pub funding_fee_candle_limit: Option<u32>,
    pub trades_limit: Option<u32>,
    /// Outer `Some` overrides the layer below; `Some(None)` marks the venue
    /// as not paginatable at all.
    pub trades_pagination: Option<Option<PaginationKind>>,
    pub trades_pagination_arg: Option<String>,
    pub trades_pagination_overlap: Option<bool>,
    pub trades_has_history: Option<bool>,
    pub l2_limit_range: Option<Vec<u32>>,
    pub l2_limit_range_required: Option<bool>,
    pub l2_limit_upper: Option<u32>,
    pub mark_ohlcv_price: Option<CandleKind>,
    pub mark_ohlcv_timeframe: Option<Timeframe>,
    pub funding_fee_timeframe: Option<Timeframe>,
    pub floor_leverage: Option<bool>,
    pub order_props_in_contracts: Option<Vec<String>>,
    pub fetch_orders_limit_minutes: Option<u32>,
    pub market_order_requires_price: Option<bool>,
    pub exchange_has_overrides: IndexMap<String, bool>,
    pub proxy_coin_mapping: IndexMap<String, String>,
    pub ws_enabled: Option<bool>,
    pub extra: IndexMap<String, Value>,
}

macro_rules! apply_opt {
    ($self:ident, $overrides:ident, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = &$overrides.$field {
                $self.$field = Some(value.clone());
            }
        )+
    };
}

macro_rules! apply_val {
    ($self:ident, $overrides:ident, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = &$overrides.$field {
                $self.$field = value.clone();
            }
        )+
    };
}

impl Features {
    /// Applies one override layer on top of this record.
    pub fn apply(&mut self, overrides: &FeatureOverrides) {
        apply_val!(
            self,
            overrides,
            stoploss_on_exchange,
            stop_price_param,
            stop_price_prop,
            order_time_in_force,
            ohlcv_has_history,
            ohlcv_partial_candle,
            ohlcv_require_since,
            trades_limit,
            trades_pagination_overlap,
            trades_has_history,
            l2_limit_range_required,
            mark_ohlcv_price,
            mark_ohlcv_timeframe,
            funding_fee_timeframe,
            floor_leverage,
            order_props_in_contracts,
            market_order_requires_price,
            ws_enabled,
        );
        apply_opt!(
            self,
            overrides,
            stop_price_type_field,
            ohlcv_candle_limit,
            funding_fee_candle_limit,
            l2_limit_range,
            l2_limit_upper,
            fetch_orders_limit_minutes,
        );
        if let Some(pagination) = overrides.trades_pagination {
            self.trades_pagination = pagination;
        }
        if let Some(arg) = &overrides.trades_pagination_arg {
            self.trades_pagination_arg = arg.clone();
        }
        // Map-valued fields merge per key, override winning.
        self.stoploss_order_types
            .extend(overrides.stoploss_order_types.clone());
        self.stop_price_type_value_mapping
            .extend(overrides.stop_price_type_value_mapping.clone());
        self.ohlcv_candle_limit_per_timeframe
            .extend(overrides.ohlcv_candle_limit_per_timeframe.clone());
        self.exchange_has_overrides
            .extend(overrides.exchange_has_overrides.clone());
        self.proxy_coin_mapping
            .extend(overrides.proxy_coin_mapping.clone());
        self.extra.extend(overrides.extra.clone());
    }

    /// Builds the merged record from the layered overrides.
    #[must_use]
    pub fn merged(
        venue: &FeatureOverrides,
        futures: Option<&FeatureOverrides>,
        user: &FeatureOverrides,
    ) -> Self {
        let mut features = Self::default();
        features.apply(venue);
        if let Some(futures) = futures {
            features.apply(futures);
        }
        features.apply(user);
        features
    }

    /// Resolves the candle limit for one `(timeframe, kind)` pull.
    ///
    /// Precedence: per-timeframe override, capability value (funding pulls
    /// may carry their own), venue feature default, 500.
    #[must_use]
    pub fn candle_limit(
        &self,
        timeframe: Timeframe,
        kind: CandleKind,
        venue_default: Option<u32>,
    ) -> u32 {
        let mut fallback = self
            .ohlcv_candle_limit
            .or(venue_default)
            .unwrap_or(DEFAULT_CANDLE_LIMIT);
        if kind == CandleKind::FundingRate {
            fallback = self.funding_fee_candle_limit.unwrap_or(fallback);
        }
        self.ohlcv_candle_limit_per_timeframe
            .get(&timeframe.to_string())
            .copied()
            .unwrap_or(fallback)
    }

    /// Returns a residual extension value by key.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
