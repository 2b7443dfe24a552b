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

//! Pricing, stake-bound, leverage and funding-fee integration tests.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::{FUTURES_PAIR, MockVenue, SPOT_PAIR, futures_config, spot_config};
use rstest::rstest;
use tradekit_exchange::{Exchange, ExchangeError, FundingRateEntry};
use tradekit_model::{Candle, EntryExit, Ticker, Timeframe};

fn dry_spot(venue: Arc<MockVenue>) -> (Exchange, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = spot_config(tmp.path());
    config.retry_delay_initial_ms = 0;
    config.retry_delay_max_ms = 0;
    (Exchange::new(venue, config).unwrap(), tmp)
}

fn dry_futures(venue: Arc<MockVenue>) -> (Exchange, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = futures_config(tmp.path());
    config.retry_delay_initial_ms = 0;
    config.retry_delay_max_ms = 0;
    (Exchange::new(venue, config).unwrap(), tmp)
}

#[rstest]
fn test_get_rate_from_ticker_sides_and_cache() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = dry_spot(venue.clone());

    // Default policy `same`: bid for long entries, ask for long exits.
    let entry = exchange
        .get_rate(SPOT_PAIR, true, EntryExit::Entry, false)
        .unwrap();
    let exit = exchange
        .get_rate(SPOT_PAIR, true, EntryExit::Exit, false)
        .unwrap();
    assert_eq!(entry, 99.0);
    assert_eq!(exit, 101.0);

    // Without refresh the cached value survives a ticker move.
    *venue.ticker.lock().unwrap() = Ticker {
        symbol: SPOT_PAIR.to_string(),
        bid: Some(90.0),
        ask: Some(92.0),
        last: Some(91.0),
    };
    let cached = exchange
        .get_rate(SPOT_PAIR, false, EntryExit::Entry, false)
        .unwrap();
    assert_eq!(cached, 99.0);
    let refreshed = exchange
        .get_rate(SPOT_PAIR, true, EntryExit::Entry, false)
        .unwrap();
    assert_eq!(refreshed, 90.0);
}

#[rstest]
fn test_get_rate_short_sides_inverted() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = dry_spot(venue);

    let entry = exchange
        .get_rate(SPOT_PAIR, true, EntryExit::Entry, true)
        .unwrap();
    let exit = exchange
        .get_rate(SPOT_PAIR, true, EntryExit::Exit, true)
        .unwrap();
    // Shorts enter on the ask and exit on the bid under `same`.
    assert_eq!(entry, 101.0);
    assert_eq!(exit, 99.0);
}

#[rstest]
fn test_get_rate_from_order_book_top() {
    let venue = Arc::new(MockVenue::spot());
    let tmp = tempfile::tempdir().unwrap();
    let mut config = spot_config(tmp.path());
    config.entry_pricing.use_order_book = true;
    config.entry_pricing.order_book_top = 2;
    let exchange = Exchange::new(venue.clone(), config).unwrap();

    venue.set_book(vec![(99.0, 1.0), (98.5, 2.0)], vec![(101.0, 1.0)]);
    let entry = exchange
        .get_rate(SPOT_PAIR, true, EntryExit::Entry, false)
        .unwrap();
    assert_eq!(entry, 98.5);
}

#[rstest]
fn test_get_rate_missing_book_level_is_pricing_error() {
    let venue = Arc::new(MockVenue::spot());
    let tmp = tempfile::tempdir().unwrap();
    let mut config = spot_config(tmp.path());
    config.entry_pricing.use_order_book = true;
    let exchange = Exchange::new(venue.clone(), config).unwrap();

    venue.set_book(Vec::new(), Vec::new());
    let result = exchange.get_rate(SPOT_PAIR, true, EntryExit::Entry, false);
    assert!(matches!(result, Err(ExchangeError::Pricing(_))));
}

#[rstest]
fn test_get_rates_shares_one_fetch() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = dry_spot(venue);

    let (entry, exit) = exchange.get_rates(SPOT_PAIR, true, false).unwrap();
    assert_eq!(entry, 99.0);
    assert_eq!(exit, 101.0);
}

#[rstest]
fn test_min_stake_consolidates_amount_and_cost_limits() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = dry_spot(venue);

    // amount_min: 0.01 * 100 * 1.05 = 1.05
    // cost_min: 10 * clamp(1.05 / 0.95, 1, 1.5) = 11.0526...
    let min_stake = exchange
        .get_min_pair_stake_amount(SPOT_PAIR, 100.0, -0.05, 1.0)
        .unwrap()
        .unwrap();
    assert!((min_stake - 10.0 * (1.05 / 0.95)).abs() < 1e-9);

    // The max bound from amount_max alone.
    let max_stake = exchange
        .get_max_pair_stake_amount(SPOT_PAIR, 100.0, 1.0)
        .unwrap();
    assert_eq!(max_stake, 1_000.0 * 100.0);

    // Both divided by leverage.
    let min_lev = exchange
        .get_min_pair_stake_amount(SPOT_PAIR, 100.0, -0.05, 5.0)
        .unwrap()
        .unwrap();
    assert!((min_lev - min_stake / 5.0).abs() < 1e-9);
}

#[rstest]
fn test_min_stake_not_above_max_stake() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = dry_spot(venue);
    let min_stake = exchange
        .get_min_pair_stake_amount(SPOT_PAIR, 100.0, -0.1, 1.0)
        .unwrap()
        .unwrap();
    let max_stake = exchange
        .get_max_pair_stake_amount(SPOT_PAIR, 100.0, 1.0)
        .unwrap();
    assert!(min_stake <= max_stake);
}

#[rstest]
fn test_max_leverage_tier_selection() {
    let venue = Arc::new(MockVenue::futures());
    let (exchange, _tmp) = dry_futures(venue);

    // Stake 2k lands in the first tier.
    assert_eq!(
        exchange.get_max_leverage(FUTURES_PAIR, Some(2_000.0)).unwrap(),
        50.0
    );
    // Stake 6k at 20x is 120k notional: second tier.
    assert_eq!(
        exchange.get_max_leverage(FUTURES_PAIR, Some(6_000.0)).unwrap(),
        20.0
    );
    // Zero stake returns the lowest bracket's leverage.
    assert_eq!(
        exchange.get_max_leverage(FUTURES_PAIR, Some(0.0)).unwrap(),
        50.0
    );
    // Beyond the last tier the stake is untradable.
    let result = exchange.get_max_leverage(FUTURES_PAIR, Some(2_000_000.0));
    assert!(matches!(result, Err(ExchangeError::InvalidOrder(_))));
}

#[rstest]
fn test_max_leverage_spot_is_one() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = dry_spot(venue);
    assert_eq!(exchange.get_max_leverage(SPOT_PAIR, Some(1_000.0)).unwrap(), 1.0);
}

#[rstest]
fn test_maintenance_ratio_reverse_scan() {
    let venue = Arc::new(MockVenue::futures());
    let (exchange, _tmp) = dry_futures(venue);

    assert_eq!(
        exchange
            .get_maintenance_ratio_and_amt(FUTURES_PAIR, 2_000.0)
            .unwrap(),
        (0.004, None)
    );
    assert_eq!(
        exchange
            .get_maintenance_ratio_and_amt(FUTURES_PAIR, 120_000.0)
            .unwrap(),
        (0.005, None)
    );
    let missing = exchange.get_maintenance_ratio_and_amt(SPOT_PAIR, 1_000.0);
    assert!(matches!(missing, Err(ExchangeError::InvalidOrder(_))));
}

#[rstest]
fn test_dry_run_liquidation_price_long_and_short() {
    let venue = Arc::new(MockVenue::futures());
    let (exchange, _tmp) = dry_futures(venue);

    // mmr 0.004 + taker 0.0005; wallet/amount = 100.
    let mmr_taker = 0.004 + 0.0005;
    let long = exchange
        .dry_run_liquidation_price(FUTURES_PAIR, 100.0, false, 10.0, 1_000.0, 1.0, 1_000.0)
        .unwrap()
        .unwrap();
    assert!((long - (100.0 - 100.0) / (1.0 - mmr_taker)).abs() < 1e-9);

    let short = exchange
        .dry_run_liquidation_price(FUTURES_PAIR, 100.0, true, 10.0, 1_000.0, 1.0, 1_000.0)
        .unwrap()
        .unwrap();
    assert!((short - 200.0 / (1.0 + mmr_taker)).abs() < 1e-9);
}

#[rstest]
fn test_liquidation_buffer_shifts_away_from_zero() {
    let venue = Arc::new(MockVenue::futures());
    let (exchange, _tmp) = dry_futures(venue);

    let long = exchange
        .get_liquidation_price(FUTURES_PAIR, 100.0, false, 10.0, 1_000.0, 1.0, 500.0)
        .unwrap()
        .unwrap();
    // Raw liq: (100 - 50) / (1 - 0.0045); buffered 5% of the distance
    // towards the entry.
    let raw = 50.0 / (1.0 - 0.0045);
    assert!((long - (raw + (100.0 - raw) * 0.05)).abs() < 1e-9);
}

#[rstest]
fn test_per_symbol_tiers_cached_to_disk() {
    let mut venue = MockVenue::futures();
    venue.has.remove("fetchLeverageTiers");
    venue
        .has
        .insert("fetchMarketLeverageTiers".to_string(), true);
    let venue = Arc::new(venue);

    let tmp = tempfile::tempdir().unwrap();
    let mut config = futures_config(tmp.path());
    config.retry_delay_initial_ms = 0;
    config.retry_delay_max_ms = 0;
    let exchange = Exchange::new(venue, config.clone()).unwrap();
    assert_eq!(
        exchange.get_max_leverage(FUTURES_PAIR, Some(2_000.0)).unwrap(),
        50.0
    );

    let sidecar = tmp.path().join("futures").join("leverage_tiers_USDT.json");
    assert!(sidecar.exists());

    // A venue that no longer serves tiers still starts from the cache.
    let mut bare = MockVenue::futures();
    bare.has.remove("fetchLeverageTiers");
    bare.has.insert("fetchMarketLeverageTiers".to_string(), true);
    bare.leverage_tiers.clear();
    let second = Exchange::new(Arc::new(bare), config).unwrap();
    assert_eq!(
        second.get_max_leverage(FUTURES_PAIR, Some(2_000.0)).unwrap(),
        50.0
    );
}

#[rstest]
fn test_funding_fees_live_sums_history() {
    let venue = Arc::new(MockVenue::futures());
    let tmp = tempfile::tempdir().unwrap();
    let mut config = futures_config(tmp.path());
    config.dry_run = false;
    config.retry_delay_initial_ms = 0;
    config.retry_delay_max_ms = 0;
    let exchange = Exchange::new(venue.clone(), config).unwrap();

    let open = Utc::now() - chrono::TimeDelta::hours(20);
    *venue.funding_history.lock().unwrap() = vec![
        tradekit_model::FundingPayment {
            ts_ms: open.timestamp_millis() + 1_000,
            amount: -0.5,
        },
        tradekit_model::FundingPayment {
            ts_ms: open.timestamp_millis() + 2_000,
            amount: 0.2,
        },
    ];

    let fees = exchange.get_funding_fees(FUTURES_PAIR, 10.0, false, open);
    assert!((fees + 0.3).abs() < 1e-12);
}

#[rstest]
fn test_funding_fees_dry_run_accumulates_mark_times_rate() {
    let venue = Arc::new(MockVenue::futures());
    let (exchange, _tmp) = dry_futures(venue.clone());

    let h8 = Timeframe::H8.as_millis();
    let t0 = Timeframe::H8.prev_candle_start(Utc::now()) - 2 * h8;

    venue.queue_ohlcv(vec![
        Candle::new(t0, 100.0, 100.0, 100.0, 100.0, 0.0),
        Candle::new(t0 + h8, 110.0, 110.0, 110.0, 110.0, 0.0),
        Candle::new(t0 + 2 * h8, 120.0, 120.0, 120.0, 120.0, 0.0),
    ]);
    venue.funding_rate_pages.lock().unwrap().push_back(vec![
        FundingRateEntry {
            ts_ms: t0,
            rate: 0.0001,
        },
        FundingRateEntry {
            ts_ms: t0 + h8,
            rate: 0.0002,
        },
        FundingRateEntry {
            ts_ms: t0 + 2 * h8,
            rate: 0.0003,
        },
    ]);

    let open = chrono::DateTime::from_timestamp_millis(t0).unwrap();
    let fees = exchange.get_funding_fees(FUTURES_PAIR, 10.0, false, open);

    let expected = 100.0 * 0.0001 * 10.0 + 110.0 * 0.0002 * 10.0 + 120.0 * 0.0003 * 10.0;
    // Longs pay when rates are positive.
    assert!((fees + expected).abs() < 1e-9);
}

#[rstest]
fn test_conversion_rate_uses_cached_tickers() {
    let venue = Arc::new(MockVenue::spot());
    venue.tickers.lock().unwrap().insert(
        SPOT_PAIR.to_string(),
        Ticker {
            symbol: SPOT_PAIR.to_string(),
            bid: Some(99.0),
            ask: Some(101.0),
            last: Some(100.0),
        },
    );
    let (exchange, _tmp) = dry_spot(venue);

    assert_eq!(
        exchange.get_conversion_rate("USDT", "USDT").unwrap(),
        Some(1.0)
    );
    assert_eq!(
        exchange.get_conversion_rate("ETH", "USDT").unwrap(),
        Some(100.0)
    );
    assert_eq!(exchange.get_conversion_rate("XRP", "USDT").unwrap(), None);
}
