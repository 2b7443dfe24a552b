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

//! The paper-trade order simulator.
//!
//! When dry-run is enabled every order lives in an in-memory map. Market
//! orders fill immediately at an orderbook-walk estimate bounded by a
//! slippage cap; limit orders fill when the top of book crosses their
//! price; stop orders carry a sentinel so the cross-check never fills them
//! against the current book.

use std::sync::atomic::Ordering;

use tradekit_model::{
    BookLevel, MakerTaker, Order, OrderBook, OrderFee, OrderSide, OrderStatus, OrderType, Rounding,
};

use crate::{
    engine::Exchange,
    error::{ExchangeError, ExchangeResult},
};

/// Slippage cap applied to simulated market fills.
const DRY_RUN_SLIPPAGE: f64 = 0.05;
/// Spread-crossing threshold converting a fresh limit order to market.
const LIMIT_TO_MARKET_THRESHOLD: f64 = 0.01;

/// Walks one side of the book and returns the average fill price for
/// `amount`. When the book is exhausted the remainder fills at the last
/// seen level.
pub(crate) fn orderbook_average_price(amount: f64, levels: &[BookLevel]) -> f64 {
    let mut remaining = amount;
    let mut filled_value = 0.0;
    let mut last_price = 0.0;
    let mut exhausted = true;
    for (price, volume) in levels {
        last_price = *price;
        if remaining <= 0.0 {
            exhausted = false;
            break;
        }
        if remaining < *volume {
            filled_value += remaining * price;
            remaining = 0.0;
            exhausted = false;
            break;
        }
        filled_value += volume * price;
        remaining -= volume;
    }
    if exhausted && remaining > 0.0 {
        filled_value += remaining * last_price;
    }
    filled_value.max(0.0) / amount
}

impl Exchange {
    /// Creates a simulated order, filling market orders immediately.
    pub(crate) async fn create_dry_run_order(
        &self,
        pair: &str,
        order_type: OrderType,
        side: OrderSide,
        amount: f64,
        rate: f64,
        _leverage: f64,
        stop_loss: bool,
    ) -> ExchangeResult<Order> {
        let now = self.now_ms();
        let seq = self.dry_order_seq.fetch_add(1, Ordering::SeqCst);
        let order_id = format!("dry_run_{side}_{pair}_{now}_{seq}");
        // Rounding must respect contract sizes.
        let amount = self.amount_to_contract_precision(pair, amount)?;

        let mut order = Order {
            id: order_id,
            symbol: pair.to_string(),
            side,
            order_type: match (order_type, stop_loss) {
                (OrderType::Limit, true) => OrderType::StopLimit,
                (OrderType::Market, true) => OrderType::StopMarket,
                (other, _) => other,
            },
            amount,
            price: Some(rate),
            average: Some(rate),
            filled: 0.0,
            remaining: amount,
            cost: amount * rate,
            status: OrderStatus::Open,
            fee: None,
            ts_ms: now,
            stop_price: stop_loss.then_some(rate),
            is_stop: stop_loss,
        };

        let orderbook = if self.exchange_has("fetchL2OrderBook") {
            Some(self.fetch_l2_order_book_async(pair, 20).await?)
        } else {
            None
        };

        if order.order_type == OrderType::Limit
            && let Some(book) = &orderbook
            && self
                .dry_is_price_crossed(pair, side, rate, Some(book), LIMIT_TO_MARKET_THRESHOLD)
                .await?
        {
            log::info!(
                "Converted order {pair} to market order due to price {rate} crossing spread by \
                 more than {LIMIT_TO_MARKET_THRESHOLD:.2}.",
            );
            order.order_type = OrderType::Market;
        }

        if order.order_type == OrderType::Market && !order.is_stop {
            let average = self
                .get_dry_market_fill_price(pair, side, amount, rate, orderbook.as_ref())
                .await?;
            order.average = Some(average);
            order.filled = amount;
            order.remaining = 0.0;
            order.status = OrderStatus::Closed;
            order.cost = amount * average;
            // Market orders always incur taker fees.
            self.add_dry_order_fee(pair, &mut order, MakerTaker::Taker)
                .await?;
        }

        let order = self
            .check_dry_limit_order_filled(order, true, orderbook.as_ref())
            .await?;

        self.dry_run_orders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn add_dry_order_fee(
        &self,
        pair: &str,
        order: &mut Order,
        taker_or_maker: MakerTaker,
    ) -> ExchangeResult<()> {
        let rate = self
            .get_fee_async(pair, "", None, 1.0, 1.0, taker_or_maker)
            .await?;
        order.fee = Some(OrderFee {
            currency: self.get_pair_quote_currency(pair),
            cost: order.cost * rate,
            rate: Some(rate),
        });
        Ok(())
    }

    /// Estimated market-order fill price from orderbook interpolation,
    /// clamped to `rate * (1 ± slippage)`.
    pub(crate) async fn get_dry_market_fill_price(
        &self,
        pair: &str,
        side: OrderSide,
        amount: f64,
        rate: f64,
        orderbook: Option<&OrderBook>,
    ) -> ExchangeResult<f64> {
        if !self.exchange_has("fetchL2OrderBook") {
            return Ok(rate);
        }
        let fetched;
        let book = match orderbook {
            Some(book) => book,
            None => {
                fetched = self.fetch_l2_order_book_async(pair, 20).await?;
                &fetched
            }
        };
        let max_slippage_val = rate
            * if side == OrderSide::Buy {
                1.0 + DRY_RUN_SLIPPAGE
            } else {
                1.0 - DRY_RUN_SLIPPAGE
            };

        let mut forecast_avg_filled_price = orderbook_average_price(amount, book.opposite_side(side));
        forecast_avg_filled_price = if side == OrderSide::Buy {
            forecast_avg_filled_price.min(max_slippage_val)
        } else {
            forecast_avg_filled_price.max(max_slippage_val)
        };

        self.price_to_precision(pair, forecast_avg_filled_price, Rounding::Round)
    }

    /// Whether the top of book crosses a limit price by `offset`.
    pub(crate) async fn dry_is_price_crossed(
        &self,
        pair: &str,
        side: OrderSide,
        limit: f64,
        orderbook: Option<&OrderBook>,
        offset: f64,
    ) -> ExchangeResult<bool> {
        if !self.exchange_has("fetchL2OrderBook") {
            return Ok(true);
        }
        let fetched;
        let book = match orderbook {
            Some(book) => book,
            None => {
                fetched = self.fetch_l2_order_book_async(pair, 1).await?;
                &fetched
            }
        };
        // Empty books are not an error; the order can fill next poll.
        Ok(match side {
            OrderSide::Buy => book
                .asks
                .first()
                .is_some_and(|(price, _)| limit * (1.0 - offset) >= *price),
            OrderSide::Sell => book
                .bids
                .first()
                .is_some_and(|(price, _)| limit * (1.0 + offset) <= *price),
        })
    }

    /// Transitions an open simulated limit order to `closed` when the book
    /// crosses its price; fee is taker on immediate fills, maker later.
    pub(crate) async fn check_dry_limit_order_filled(
        &self,
        mut order: Order,
        immediate: bool,
        orderbook: Option<&OrderBook>,
    ) -> ExchangeResult<Order> {
        if order.status != OrderStatus::Closed
            && order.order_type == OrderType::Limit
            && !order.is_stop
        {
            let pair = order.symbol.clone();
            let limit = order.price.unwrap_or_default();
            if self
                .dry_is_price_crossed(&pair, order.side, limit, orderbook, 0.0)
                .await?
            {
                order.status = OrderStatus::Closed;
                order.filled = order.amount;
                order.remaining = 0.0;
                let fee_kind = if immediate {
                    MakerTaker::Taker
                } else {
                    MakerTaker::Maker
                };
                self.add_dry_order_fee(&pair, &mut order, fee_kind).await?;
            }
        }
        Ok(order)
    }

    /// Returns a simulated order by id, re-checking limit fills.
    pub fn fetch_dry_run_order(&self, order_id: &str) -> ExchangeResult<Order> {
        self.run(self.fetch_dry_run_order_async(order_id))
    }

    pub(crate) async fn fetch_dry_run_order_async(&self, order_id: &str) -> ExchangeResult<Order> {
        let order = self
            .dry_run_orders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(order_id)
            .cloned()
            .ok_or_else(|| {
                ExchangeError::InvalidOrder(format!(
                    "Tried to get an invalid dry-run-order (id: {order_id})."
                ))
            })?;
        let order = self.check_dry_limit_order_filled(order, false, None).await?;
        self.dry_run_orders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(order.id.clone(), order.clone());
        Ok(order)
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
    fn test_orderbook_average_price_partial_level() {
        // Buy 3 against asks [(10, 1), (11, 2), (12, 5)]:
        // (10*1 + 11*2) / 3 = 10.666...
        let asks = vec![(10.0, 1.0), (11.0, 2.0), (12.0, 5.0)];
        let avg = orderbook_average_price(3.0, &asks);
        assert!((avg - 32.0 / 3.0).abs() < 1e-12);
    }

    #[rstest]
    fn test_orderbook_average_price_single_level() {
        let asks = vec![(10.0, 5.0)];
        assert_eq!(orderbook_average_price(2.0, &asks), 10.0);
    }

    #[rstest]
    fn test_orderbook_average_price_exhausted_book() {
        // Book holds 3 units, order wants 5: remainder fills at the last
        // level's price.
        let asks = vec![(10.0, 1.0), (11.0, 2.0)];
        let avg = orderbook_average_price(5.0, &asks);
        assert!((avg - (10.0 + 22.0 + 2.0 * 11.0) / 5.0).abs() < 1e-12);
    }
}
