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

//! Order-lifecycle tests: the dry-run simulator and the live placement
//! path.

mod common;

use std::sync::Arc;

use common::{MockVenue, SPOT_PAIR, spot_config};
use indexmap::IndexMap;
use rstest::rstest;
use tradekit_exchange::{Exchange, ExchangeConfig, ExchangeError};
use tradekit_model::{OrderSide, OrderStatus, OrderType};

fn dry_exchange(venue: Arc<MockVenue>) -> (Exchange, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = spot_config(tmp.path());
    config.retry_delay_initial_ms = 0;
    config.retry_delay_max_ms = 0;
    (Exchange::new(venue, config).unwrap(), tmp)
}

fn live_exchange(venue: Arc<MockVenue>, config: Option<ExchangeConfig>) -> (Exchange, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config.unwrap_or_else(|| spot_config(tmp.path()));
    config.dry_run = false;
    config.datadir = tmp.path().to_path_buf();
    config.retry_delay_initial_ms = 0;
    config.retry_delay_max_ms = 0;
    (Exchange::new(venue, config).unwrap(), tmp)
}

fn stop_venue() -> MockVenue {
    let mut venue = MockVenue::spot();
    venue.features.stoploss_on_exchange = Some(true);
    venue.features.stoploss_order_types = IndexMap::from([
        ("limit".to_string(), "stop-loss-limit".to_string()),
        ("market".to_string(), "stop-loss".to_string()),
    ]);
    venue
}

#[rstest]
fn test_dry_run_market_buy_fills_from_orderbook_walk() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = dry_exchange(venue.clone());
    venue.set_book(vec![(9.0, 10.0)], vec![(10.0, 1.0), (11.0, 2.0), (12.0, 5.0)]);

    let order = exchange
        .create_order(
            SPOT_PAIR,
            OrderType::Market,
            OrderSide::Buy,
            3.0,
            10.5,
            1.0,
            false,
            "GTC",
        )
        .unwrap();

    assert_eq!(order.status, OrderStatus::Closed);
    assert_eq!(order.filled, 3.0);
    assert_eq!(order.remaining, 0.0);
    // (10*1 + 11*2) / 3, below the 5% slippage cap of 11.025.
    let average = order.average.unwrap();
    assert!((average - 32.0 / 3.0).abs() < 1e-6);
    // Market orders pay taker.
    let fee = order.fee.as_ref().unwrap();
    assert_eq!(fee.rate, Some(0.003));
    assert_eq!(fee.currency, "USDT");
    assert!((fee.cost - order.cost * 0.003).abs() < 1e-9);
}

#[rstest]
fn test_dry_run_market_fill_respects_slippage_cap() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = dry_exchange(venue.clone());
    venue.set_book(vec![(9.0, 10.0)], vec![(10.0, 1.0), (11.0, 2.0), (12.0, 5.0)]);

    let order = exchange
        .create_order(
            SPOT_PAIR,
            OrderType::Market,
            OrderSide::Buy,
            3.0,
            10.0,
            1.0,
            false,
            "GTC",
        )
        .unwrap();
    // Raw walk gives 10.666..., capped at 10.0 * 1.05.
    assert!((order.average.unwrap() - 10.5).abs() < 1e-9);
}

#[rstest]
fn test_dry_run_limit_order_lifecycle() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = dry_exchange(venue.clone());
    venue.set_book(vec![(99.0, 5.0)], vec![(101.0, 5.0)]);

    let order = exchange
        .create_order(
            SPOT_PAIR,
            OrderType::Limit,
            OrderSide::Buy,
            1.0,
            100.5,
            1.0,
            false,
            "GTC",
        )
        .unwrap();
    assert_eq!(order.status, OrderStatus::Open);
    assert_eq!(order.filled, 0.0);
    assert!(order.fee.is_none());

    // Still open while the ask stays above the limit.
    let fetched = exchange.fetch_order(&order.id, SPOT_PAIR).unwrap();
    assert_eq!(fetched.id, order.id);
    assert_eq!(fetched.status, OrderStatus::Open);

    // Once the book crosses the limit the order closes at the limit price
    // and pays maker.
    venue.set_book(vec![(99.0, 5.0)], vec![(100.0, 5.0)]);
    let filled = exchange.fetch_order(&order.id, SPOT_PAIR).unwrap();
    assert_eq!(filled.id, order.id);
    assert_eq!(filled.status, OrderStatus::Closed);
    assert_eq!(filled.filled, 1.0);
    assert_eq!(filled.remaining, 0.0);
    assert_eq!(filled.price, Some(100.5));
    assert_eq!(filled.fee.as_ref().unwrap().rate, Some(0.001));
}

#[rstest]
fn test_dry_run_limit_crossing_spread_converts_to_market() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = dry_exchange(venue.clone());
    venue.set_book(vec![(99.0, 5.0)], vec![(101.0, 5.0)]);

    // 103 * 0.99 = 101.97 >= 101: crossing the spread by more than 1%.
    let order = exchange
        .create_order(
            SPOT_PAIR,
            OrderType::Limit,
            OrderSide::Buy,
            1.0,
            103.0,
            1.0,
            false,
            "GTC",
        )
        .unwrap();
    assert_eq!(order.order_type, OrderType::Market);
    assert_eq!(order.status, OrderStatus::Closed);
    assert_eq!(order.fee.as_ref().unwrap().rate, Some(0.003));
}

#[rstest]
fn test_dry_run_marketable_limit_fills_immediately_at_taker() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = dry_exchange(venue.clone());
    venue.set_book(vec![(99.0, 5.0)], vec![(101.0, 5.0)]);

    // Crosses the ask but within the 1% conversion threshold: stays a
    // limit order and fills immediately at taker.
    let order = exchange
        .create_order(
            SPOT_PAIR,
            OrderType::Limit,
            OrderSide::Buy,
            1.0,
            101.5,
            1.0,
            false,
            "GTC",
        )
        .unwrap();
    assert_eq!(order.order_type, OrderType::Limit);
    assert_eq!(order.status, OrderStatus::Closed);
    assert_eq!(order.fee.as_ref().unwrap().rate, Some(0.003));
}

#[rstest]
fn test_dry_run_stop_order_not_filled_against_book() {
    let venue = Arc::new(stop_venue());
    let (exchange, _tmp) = dry_exchange(venue.clone());
    venue.set_book(vec![(99.0, 5.0)], vec![(101.0, 5.0)]);

    let order = exchange
        .create_stoploss(SPOT_PAIR, 1.0, 95.0, OrderSide::Sell, 1.0)
        .unwrap();
    assert_eq!(order.status, OrderStatus::Open);
    assert!(order.is_stop);
    assert_eq!(order.stop_price, Some(95.0));

    // The cross-check must not fill stop orders even though the bid is
    // above the stop price.
    let fetched = exchange.fetch_order(&order.id, SPOT_PAIR).unwrap();
    assert_eq!(fetched.status, OrderStatus::Open);

    // Cancel reports the canonical empty-cancel shape.
    let canceled = exchange.cancel_order(&order.id, SPOT_PAIR).unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(canceled.filled, 0.0);
    assert_eq!(canceled.remaining, canceled.amount);
}

#[rstest]
fn test_stop_limit_rate_crossing_stop_is_invalid() {
    let venue = Arc::new(stop_venue());
    let tmp = tempfile::tempdir().unwrap();
    let mut config = spot_config(tmp.path());
    config.order_types.stoploss = "limit".to_string();
    config.order_types.stoploss_on_exchange_limit_ratio = 1.01;
    let exchange = Exchange::new(venue, config).unwrap();

    // stop 100, ratio 1.01, sell: limit 101 > stop.
    let result = exchange.create_stoploss(SPOT_PAIR, 1.0, 100.0, OrderSide::Sell, 1.0);
    assert!(matches!(result, Err(ExchangeError::InvalidOrder(_))));
}

#[rstest]
fn test_fetch_unknown_dry_run_order_is_invalid() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = dry_exchange(venue);
    let result = exchange.fetch_order("missing", SPOT_PAIR);
    assert!(matches!(result, Err(ExchangeError::InvalidOrder(_))));
}

#[rstest]
fn test_live_market_order_needs_no_price() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = live_exchange(venue.clone(), None);

    let order = exchange
        .create_order(
            SPOT_PAIR,
            OrderType::Market,
            OrderSide::Buy,
            1.23456789,
            100.0,
            1.0,
            false,
            "GTC",
        )
        .unwrap();
    assert_eq!(order.symbol, SPOT_PAIR);

    let requests = venue.created.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].order_type, "market");
    assert_eq!(requests[0].price, None);
    assert_eq!(requests[0].params.time_in_force, None);
}

#[rstest]
fn test_live_limit_order_carries_time_in_force() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = live_exchange(venue.clone(), None);

    exchange
        .create_order(
            SPOT_PAIR,
            OrderType::Limit,
            OrderSide::Sell,
            1.0,
            100.123456789,
            1.0,
            false,
            "ioc",
        )
        .unwrap();

    let requests = venue.created.lock().unwrap().clone();
    assert_eq!(requests[0].params.time_in_force, Some("IOC".to_string()));
    // Price rounded to the venue's eight decimal places.
    assert_eq!(requests[0].price, Some(100.12345679));
}

#[rstest]
fn test_live_market_order_requires_price_capability() {
    let mut venue = MockVenue::spot();
    venue.features.market_order_requires_price = Some(true);
    let venue = Arc::new(venue);
    let (exchange, _tmp) = live_exchange(venue.clone(), None);

    exchange
        .create_order(
            SPOT_PAIR,
            OrderType::Market,
            OrderSide::Buy,
            1.0,
            100.0,
            1.0,
            false,
            "GTC",
        )
        .unwrap();
    let requests = venue.created.lock().unwrap().clone();
    assert_eq!(requests[0].price, Some(100.0));
}

#[rstest]
fn test_emulated_fetch_order_falls_back_to_closed() {
    let mut venue = MockVenue::spot();
    venue.has.remove("fetchOrder");
    let venue = Arc::new(venue);
    let (exchange, _tmp) = live_exchange(venue.clone(), None);

    let closed = tradekit_model::Order {
        id: "o-1".to_string(),
        symbol: SPOT_PAIR.to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        amount: 1.0,
        price: Some(100.0),
        average: Some(100.0),
        filled: 1.0,
        remaining: 0.0,
        cost: 100.0,
        status: OrderStatus::Closed,
        fee: None,
        ts_ms: 1_700_000_000_000,
        stop_price: None,
        is_stop: false,
    };
    venue
        .closed_orders
        .lock()
        .unwrap()
        .insert("o-1".to_string(), closed.clone());

    let order = exchange.fetch_order("o-1", SPOT_PAIR).unwrap();
    assert_eq!(order.status, OrderStatus::Closed);
    assert_eq!(order.filled, 1.0);
}

#[rstest]
fn test_fetch_orders_windowed_deduplicates() {
    let mut venue = MockVenue::spot();
    venue.has.insert("fetchOrders".to_string(), true);
    venue.features.fetch_orders_limit_minutes = Some(60);
    let venue = Arc::new(venue);
    let (exchange, _tmp) = live_exchange(venue.clone(), None);

    let now = chrono::Utc::now().timestamp_millis();
    for (id, offset) in [("o-1", 150), ("o-2", 30)] {
        let order = tradekit_model::Order {
            id: id.to_string(),
            symbol: SPOT_PAIR.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            amount: 1.0,
            price: Some(100.0),
            average: None,
            filled: 0.0,
            remaining: 1.0,
            cost: 0.0,
            status: OrderStatus::Open,
            fee: None,
            ts_ms: now - offset * 60_000,
            stop_price: None,
            is_stop: false,
        };
        venue
            .open_orders
            .lock()
            .unwrap()
            .insert(id.to_string(), order);
    }

    // Three hours of history in one-hour windows: orders repeat across
    // windows and must come back unique.
    let orders = exchange.fetch_orders(SPOT_PAIR, now - 180 * 60_000).unwrap();
    assert_eq!(orders.len(), 2);
}

#[rstest]
fn test_get_trades_for_order_filters_by_id() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = live_exchange(venue.clone(), None);

    let now = 1_700_000_000_000;
    let fills = vec![
        tradekit_model::OrderTrade {
            order_id: "o-1".to_string(),
            ts_ms: now,
            price: 100.0,
            amount: 0.5,
            side: OrderSide::Buy,
            cost: 50.0,
            fee: None,
        },
        tradekit_model::OrderTrade {
            order_id: "o-2".to_string(),
            ts_ms: now,
            price: 100.0,
            amount: 0.7,
            side: OrderSide::Buy,
            cost: 70.0,
            fee: None,
        },
    ];
    *venue.my_trades.lock().unwrap() = fills;

    let trades = exchange.get_trades_for_order("o-1", SPOT_PAIR, now).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].amount, 0.5);
}

#[rstest]
fn test_contract_conversion_round_trips_through_placement() {
    let venue = Arc::new(MockVenue::futures());
    let tmp = tempfile::tempdir().unwrap();
    let mut config = common::futures_config(tmp.path());
    config.dry_run = false;
    config.retry_delay_initial_ms = 0;
    config.retry_delay_max_ms = 0;
    let exchange = Exchange::new(venue.clone(), config).unwrap();

    // One contract is 10 base units.
    let contracts = exchange
        .amount_to_contracts(common::CONTRACT_PAIR, 5.0)
        .unwrap();
    assert_eq!(contracts, 0.5);
    assert_eq!(
        exchange
            .contracts_to_amount(common::CONTRACT_PAIR, contracts)
            .unwrap(),
        5.0
    );

    // Placement sends contracts to the venue; the returned order comes
    // back in base units.
    let order = exchange
        .create_order(
            common::CONTRACT_PAIR,
            OrderType::Limit,
            OrderSide::Buy,
            5.0,
            10.0,
            2.0,
            false,
            "GTC",
        )
        .unwrap();
    let requests = venue.created.lock().unwrap().clone();
    assert_eq!(requests[0].amount, 0.5);
    assert_eq!(order.amount, 5.0);
    assert_eq!(order.remaining, 5.0);

    // Margin mode and leverage were prepared before placement.
    assert_eq!(venue.margin_mode_calls.lock().unwrap().len(), 1);
    assert_eq!(
        venue.leverage_calls.lock().unwrap().first(),
        Some(&(common::CONTRACT_PAIR.to_string(), 2.0))
    );
}

#[rstest]
fn test_cancel_order_with_result_synthesizes_record() {
    let venue = Arc::new(MockVenue::spot());
    let (exchange, _tmp) = live_exchange(venue.clone(), None);

    // Unknown to the venue: cancel raises InvalidOrder, fetch retries and
    // finally a synthetic record is produced.
    let mut venue_order = tradekit_model::Order {
        id: "gone".to_string(),
        symbol: SPOT_PAIR.to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        amount: 2.0,
        price: Some(100.0),
        average: None,
        filled: 0.0,
        remaining: 2.0,
        cost: 0.0,
        status: OrderStatus::Open,
        fee: None,
        ts_ms: 1_700_000_000_000,
        stop_price: None,
        is_stop: false,
    };
    venue_order.fee = None;
    venue
        .open_orders
        .lock()
        .unwrap()
        .insert("gone".to_string(), venue_order);

    // Cancel succeeds but without fee information, fetch then finds the
    // order gone (mock cancel removed it) and the engine falls back to the
    // canceled order returned by fetch... in this case fetch_order itself
    // errors as RetryableOrder, surfaced after bounded retries.
    let result = exchange.cancel_order_with_result("gone", SPOT_PAIR, 2.0);
    assert!(matches!(result, Err(ExchangeError::RetryableOrder(_))));
}
