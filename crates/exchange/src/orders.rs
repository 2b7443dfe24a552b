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

//! The order lifecycle manager: placement, fetch, cancel and history.
//!
//! Inputs are sanitised before they reach the venue: amounts round to
//! venue precision (in contracts on contract venues), entry prices round
//! with `Round`, stop prices with `RoundUp` for longs and `RoundDown` for
//! shorts. Venues signal "order not found" with
//! [`ExchangeError::RetryableOrder`]; the emulated fetch path relies on
//! that to fall from open to closed orders.

use chrono::TimeDelta;
use indexmap::IndexMap;
use serde_json::json;
use tradekit_model::{
    Order, OrderSide, OrderStatus, OrderTrade, OrderType, Rounding, TradingMode,
};

use crate::{
    adapter::{OrderParams, OrderRequest},
    engine::Exchange,
    error::{ExchangeError, ExchangeResult},
    retry::{API_FETCH_ORDER_RETRY_COUNT, API_RETRY_COUNT},
};

impl Exchange {
    /// Places an order on the venue, or in the simulator when dry-run.
    #[allow(clippy::too_many_arguments)]
    pub fn create_order(
        &self,
        pair: &str,
        order_type: OrderType,
        side: OrderSide,
        amount: f64,
        rate: f64,
        leverage: f64,
        reduce_only: bool,
        time_in_force: &str,
    ) -> ExchangeResult<Order> {
        if self.config.dry_run {
            let rate = self.price_to_precision(pair, rate, Rounding::Round)?;
            return self
                .run(self.create_dry_run_order(pair, order_type, side, amount, rate, leverage, false));
        }

        let params = self.order_params(order_type, reduce_only, time_in_force);
        let amount = self.contract_amount_for_order(pair, amount)?;
        let needs_price = self.order_needs_price(order_type);
        let rate_for_order = if needs_price {
            Some(self.price_to_precision(pair, rate, Rounding::Round)?)
        } else {
            None
        };

        let request = OrderRequest {
            symbol: pair.to_string(),
            order_type: order_type.to_string(),
            side,
            amount,
            price: rate_for_order,
            params,
        };

        let order = self.run(async {
            if !reduce_only {
                self.lev_prep(pair, leverage, false).await?;
            }
            // No retries: an unacknowledged retry risks double-placement.
            self.retry
                .execute("create_order", 0, || async {
                    self.adapter.create_order(&request).await
                })
                .await
        })?;
        log::debug!("create_order: {order:?}");
        Ok(self.order_contracts_to_amount(order))
    }

    /// Places a stop order on the venue, per the configured stop policy.
    pub fn create_stoploss(
        &self,
        pair: &str,
        amount: f64,
        stop_price: f64,
        side: OrderSide,
        leverage: f64,
    ) -> ExchangeResult<Order> {
        if !self.features.stoploss_on_exchange {
            return Err(ExchangeError::Operational(format!(
                "stoploss is not implemented for {}.",
                self.name()
            )));
        }

        let (venue_type, user_order_type) = self.stop_order_type();
        // Stop prices must never land on the unsafe side of the trigger.
        let round_mode = if side == OrderSide::Buy {
            Rounding::RoundDown
        } else {
            Rounding::RoundUp
        };
        let stop_price_norm = self.price_to_precision(pair, stop_price, round_mode)?;
        let limit_rate = if user_order_type == OrderType::Limit {
            let rate = stop_limit_rate(
                stop_price,
                self.config.order_types.stoploss_on_exchange_limit_ratio,
                side,
            )?;
            Some(self.price_to_precision(pair, rate, round_mode)?)
        } else {
            None
        };

        if self.config.dry_run {
            return self.run(self.create_dry_run_order(
                pair,
                user_order_type,
                side,
                amount,
                stop_price_norm,
                leverage,
                true,
            ));
        }

        let mut params = OrderParams::default();
        params.extra.insert(
            self.features.stop_price_param.clone(),
            json!(stop_price_norm),
        );
        if self.config.trading_mode == TradingMode::Futures {
            params.reduce_only = true;
            if let (Some(price_type), Some(field)) = (
                self.config.order_types.stoploss_price_type.as_ref(),
                self.features.stop_price_type_field.as_ref(),
            ) && let Some(value) = self.features.stop_price_type_value_mapping.get(price_type)
            {
                params.extra.insert(field.clone(), json!(value));
            }
        }

        let amount = self.contract_amount_for_order(pair, amount)?;
        let request = OrderRequest {
            symbol: pair.to_string(),
            order_type: venue_type,
            side,
            amount,
            price: limit_rate,
            params,
        };

        let order = self.run(async {
            // Pre-steps may be declared acceptable failures for stops.
            self.lev_prep(pair, leverage, true).await?;
            self.retry
                .execute("create_stoploss", 0, || async {
                    self.adapter.create_order(&request).await
                })
                .await
        })?;
        log::info!(
            "stoploss {user_order_type} order added for {pair}. stop price: {stop_price}. \
             limit: {limit_rate:?}"
        );
        Ok(self.order_contracts_to_amount(order))
    }

    /// Whether an existing stop order must be replaced to track the new
    /// stop price.
    pub fn stoploss_adjust(&self, stop_loss: f64, order: &Order, side: OrderSide) -> ExchangeResult<bool> {
        if !self.features.stoploss_on_exchange {
            return Err(ExchangeError::Operational(format!(
                "stoploss is not implemented for {}.",
                self.name()
            )));
        }
        Ok(match order.stop_price {
            None => true,
            Some(stop_price) => match side {
                OrderSide::Sell => stop_loss > stop_price,
                OrderSide::Buy => stop_loss < stop_price,
            },
        })
    }

    /// Fetches an order, emulating `fetch_order` when the venue lacks it.
    pub fn fetch_order(&self, order_id: &str, pair: &str) -> ExchangeResult<Order> {
        if self.config.dry_run {
            return self.fetch_dry_run_order(order_id);
        }
        self.run(self.retry.execute(
            "fetch_order",
            API_FETCH_ORDER_RETRY_COUNT,
            || async {
                let order = if self.exchange_has("fetchOrder") {
                    self.adapter.fetch_order(order_id, pair).await?
                } else {
                    self.fetch_order_emulated(order_id, pair).await?
                };
                log::debug!("fetch_order: {order:?}");
                Ok(self.order_contracts_to_amount(order))
            },
        ))
    }

    /// Open orders first; on a miss, closed orders. Missing in both is a
    /// retryable error, as venue-side visibility can lag placement.
    async fn fetch_order_emulated(&self, order_id: &str, pair: &str) -> ExchangeResult<Order> {
        match self.adapter.fetch_open_order(order_id, pair).await {
            Ok(order) => Ok(order),
            Err(ExchangeError::RetryableOrder(_)) => {
                match self.adapter.fetch_closed_order(order_id, pair).await {
                    Ok(order) => Ok(order),
                    Err(ExchangeError::RetryableOrder(msg)) => Err(ExchangeError::RetryableOrder(
                        format!("Order not found (pair: {pair} id: {order_id}). Message: {msg}"),
                    )),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Stop-order fetch; identical to [`Self::fetch_order`] on venues with
    /// a unified endpoint.
    pub fn fetch_stoploss_order(&self, order_id: &str, pair: &str) -> ExchangeResult<Order> {
        self.fetch_order(order_id, pair)
    }

    /// Dispatches to the stop or regular fetch.
    pub fn fetch_order_or_stoploss_order(
        &self,
        order_id: &str,
        pair: &str,
        stoploss_order: bool,
    ) -> ExchangeResult<Order> {
        if stoploss_order {
            self.fetch_stoploss_order(order_id, pair)
        } else {
            self.fetch_order(order_id, pair)
        }
    }

    /// Cancels an order. Simulated cancels report
    /// `{canceled, filled: 0, remaining: amount}`.
    pub fn cancel_order(&self, order_id: &str, pair: &str) -> ExchangeResult<Order> {
        if self.config.dry_run {
            let mut order = self.fetch_dry_run_order(order_id)?;
            order.status = OrderStatus::Canceled;
            order.filled = 0.0;
            order.remaining = order.amount;
            self.dry_run_orders
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(order.id.clone(), order.clone());
            return Ok(order);
        }
        let order = self.run(self.retry.execute(
            "cancel_order",
            API_RETRY_COUNT,
            || async { self.adapter.cancel_order(order_id, pair).await },
        ))?;
        log::debug!("cancel_order: {order:?}");
        Ok(self.order_contracts_to_amount(order))
    }

    /// Stop-order cancel; identical on venues with a unified endpoint.
    pub fn cancel_stoploss_order(&self, order_id: &str, pair: &str) -> ExchangeResult<Order> {
        self.cancel_order(order_id, pair)
    }

    /// Whether a cancel result is complete enough to be used as the final
    /// order record.
    #[must_use]
    pub fn is_cancel_order_result_suitable(&self, order: &Order) -> bool {
        order.fee.is_some()
    }

    /// Cancels and always returns a usable order record, synthesizing one
    /// when the venue returns nothing useful.
    pub fn cancel_order_with_result(
        &self,
        order_id: &str,
        pair: &str,
        amount: f64,
    ) -> ExchangeResult<Order> {
        match self.cancel_order(order_id, pair) {
            Ok(order) if self.is_cancel_order_result_suitable(&order) => return Ok(order),
            Ok(_) => {}
            Err(ExchangeError::InvalidOrder(_)) => {
                log::warn!("Could not cancel order {order_id} for {pair}.");
            }
            Err(err) => return Err(err),
        }
        match self.fetch_order(order_id, pair) {
            Ok(order) => Ok(order),
            Err(ExchangeError::InvalidOrder(_)) => {
                log::warn!("Could not fetch cancelled order {order_id}.");
                Ok(synthesized_cancel(order_id, pair, amount))
            }
            Err(err) => Err(err),
        }
    }

    /// Stop-order variant of [`Self::cancel_order_with_result`].
    pub fn cancel_stoploss_order_with_result(
        &self,
        order_id: &str,
        pair: &str,
        amount: f64,
    ) -> ExchangeResult<Order> {
        let order = self.cancel_stoploss_order(order_id, pair)?;
        if self.is_cancel_order_result_suitable(&order) {
            return Ok(order);
        }
        match self.fetch_stoploss_order(order_id, pair) {
            Ok(order) => Ok(order),
            Err(ExchangeError::InvalidOrder(_)) => {
                log::warn!("Could not fetch cancelled stoploss order {order_id}.");
                Ok(synthesized_cancel(order_id, pair, amount))
            }
            Err(err) => Err(err),
        }
    }

    /// All orders for a pair since a timestamp, using overlapping windows
    /// on venues that bound the query duration.
    pub fn fetch_orders(&self, pair: &str, since_ms: i64) -> ExchangeResult<Vec<Order>> {
        if self.config.dry_run {
            return Ok(Vec::new());
        }
        let Some(limit_minutes) = self.features.fetch_orders_limit_minutes else {
            return self.fetch_orders_window(pair, since_ms);
        };

        let mut orders: Vec<Order> = Vec::new();
        let mut since = since_ms;
        let now = self.now_ms();
        // One minute of overlap between windows; de-duplicated below.
        let step = TimeDelta::minutes(i64::from(limit_minutes) - 1).num_milliseconds();
        while since < now {
            orders.extend(self.fetch_orders_window(pair, since)?);
            since += step;
        }
        let mut unique: IndexMap<String, Order> = IndexMap::new();
        for order in orders {
            unique.insert(order.id.clone(), order);
        }
        Ok(unique.into_values().collect())
    }

    fn fetch_orders_window(&self, pair: &str, since_ms: i64) -> ExchangeResult<Vec<Order>> {
        // Widen by ten seconds to catch boundary orders.
        let since_ms = since_ms - 10_000;
        let orders = self.run(self.retry.execute("fetch_orders", 0, || async {
            if self.exchange_has("fetchOrders") {
                self.adapter.fetch_orders(pair, since_ms).await
            } else {
                self.fetch_orders_emulate(pair, since_ms).await
            }
        }))?;
        Ok(orders
            .into_iter()
            .map(|o| self.order_contracts_to_amount(o))
            .collect())
    }

    async fn fetch_orders_emulate(&self, pair: &str, since_ms: i64) -> ExchangeResult<Vec<Order>> {
        let mut orders = Vec::new();
        if self.exchange_has("fetchClosedOrders") {
            orders = self.adapter.fetch_closed_orders(pair, since_ms).await?;
            if self.exchange_has("fetchOpenOrders") {
                orders.extend(self.adapter.fetch_open_orders(pair, since_ms).await?);
            }
        }
        Ok(orders)
    }

    /// Own fills belonging to one order.
    pub fn get_trades_for_order(
        &self,
        order_id: &str,
        pair: &str,
        since_ms: i64,
    ) -> ExchangeResult<Vec<OrderTrade>> {
        if self.config.dry_run || !self.exchange_has("fetchMyTrades") {
            return Ok(Vec::new());
        }
        // Five seconds of slack against venue clock skew.
        let since_ms = since_ms - 5_000;
        let mut trades = self.run(self.retry.execute(
            "fetch_my_trades",
            API_RETRY_COUNT,
            || async { self.adapter.fetch_my_trades(pair, since_ms).await },
        ))?;
        trades.retain(|t| t.order_id == order_id);
        if let Ok(contract_size) = self.contract_size(pair)
            && contract_size != 1.0
        {
            for trade in &mut trades {
                trade.amount *= contract_size;
                trade.cost = trade.price * trade.amount;
            }
        }
        log::debug!("get_trades_for_order: {} fills", trades.len());
        Ok(trades)
    }

    /// Whether an order was cancelled without any fill.
    #[must_use]
    pub fn check_order_canceled_empty(&self, order: &Order) -> bool {
        order.is_canceled_empty()
    }

    // -- Placement helpers ----------------------------------------------------

    fn order_params(
        &self,
        order_type: OrderType,
        reduce_only: bool,
        time_in_force: &str,
    ) -> OrderParams {
        let mut params = OrderParams::default();
        let tif = time_in_force.to_uppercase();
        if tif != "GTC" && order_type != OrderType::Market {
            params.time_in_force = Some(tif);
        }
        params.reduce_only = reduce_only;
        params
    }

    fn order_needs_price(&self, order_type: OrderType) -> bool {
        order_type != OrderType::Market || self.features.market_order_requires_price
    }

    fn contract_amount_for_order(&self, pair: &str, amount: f64) -> ExchangeResult<f64> {
        let contracts = self.amount_to_contracts(pair, amount)?;
        let market = self.market(pair)?;
        Ok(tradekit_model::amount_to_precision(
            contracts,
            market.precision.amount,
            self.precision_mode(),
        )?)
    }

    /// Maps the user stop intent to a venue order type, falling back to the
    /// single supported one.
    fn stop_order_type(&self) -> (String, OrderType) {
        let configured = &self.config.order_types.stoploss;
        let types = &self.features.stoploss_order_types;
        if let Some(venue_type) = types.get(configured) {
            let user_type = if configured == "limit" {
                OrderType::Limit
            } else {
                OrderType::Market
            };
            return (venue_type.clone(), user_type);
        }
        match types.first() {
            Some((user, venue)) => {
                let user_type = if user == "limit" {
                    OrderType::Limit
                } else {
                    OrderType::Market
                };
                (venue.clone(), user_type)
            }
            None => (configured.clone(), OrderType::Market),
        }
    }
}

/// Limit rate for a stop-limit: `stop_price * ratio` for sells and
/// `stop_price * (2 - ratio)` for buys. A limit landing on the wrong side
/// of the stop is unplaceable.
pub(crate) fn stop_limit_rate(
    stop_price: f64,
    limit_ratio: f64,
    side: OrderSide,
) -> ExchangeResult<f64> {
    let limit_rate = match side {
        OrderSide::Sell => stop_price * limit_ratio,
        OrderSide::Buy => stop_price * (2.0 - limit_ratio),
    };
    let bad_stop_price = match side {
        OrderSide::Sell => stop_price < limit_rate,
        OrderSide::Buy => stop_price > limit_rate,
    };
    if bad_stop_price {
        // Happens when the stop or liquidation price collapses to zero
        // after a market order closes immediately.
        return Err(ExchangeError::InvalidOrder(format!(
            "In stoploss limit order, stop price should be more than limit price. Stop price: \
             {stop_price}, Limit price: {limit_rate}, Limit Price pct: {limit_ratio}"
        )));
    }
    Ok(limit_rate)
}

fn synthesized_cancel(order_id: &str, pair: &str, amount: f64) -> Order {
    Order {
        id: order_id.to_string(),
        symbol: pair.to_string(),
        side: OrderSide::Sell,
        order_type: OrderType::Limit,
        amount,
        price: None,
        average: None,
        filled: 0.0,
        remaining: amount,
        cost: 0.0,
        status: OrderStatus::Canceled,
        fee: None,
        ts_ms: 0,
        stop_price: None,
        is_stop: false,
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
    fn test_stop_limit_rate_sell() {
        let rate = stop_limit_rate(100.0, 0.99, OrderSide::Sell).unwrap();
        assert_eq!(rate, 99.0);
    }

    #[rstest]
    fn test_stop_limit_rate_buy() {
        let rate = stop_limit_rate(100.0, 0.99, OrderSide::Buy).unwrap();
        assert!((rate - 101.0).abs() < 1e-12);
    }

    #[rstest]
    fn test_stop_limit_rate_invalid_when_crossing() {
        // ratio > 1 puts the sell limit above the stop price.
        let err = stop_limit_rate(100.0, 1.01, OrderSide::Sell).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidOrder(_)));
    }
}
