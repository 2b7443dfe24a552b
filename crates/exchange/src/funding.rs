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

//! Funding-fee accounting for perpetual swaps.
//!
//! Live mode sums the venue-reported funding history. Dry-run mode
//! reconstructs the fees from mark-price and funding-rate candles:
//! `Σ mark_open · funding_open · amount` over the position's lifetime,
//! negated for longs (venues report funding as payable-by-short positive).

use chrono::{DateTime, Timelike, Utc};
use tradekit_model::{Candle, CandleKind, Timeframe, TradingMode};

use crate::{
    engine::{Exchange, TableKey},
    error::{ExchangeError, ExchangeResult},
    retry::API_RETRY_COUNT,
};

/// One joined funding row: `(ts_ms, mark_open, funding_open)`.
type FundingRow = (i64, f64, f64);

/// Joins funding-rate and mark-price candles on timestamp.
///
/// Inner join by default; with a synthetic funding rate configured the
/// join is outer over mark rows, missing rates filled with the synthetic
/// value.
pub(crate) fn combine_funding_and_mark(
    funding: &[Candle],
    mark: &[Candle],
    futures_funding_rate: Option<f64>,
) -> Vec<FundingRow> {
    match futures_funding_rate {
        None => mark
            .iter()
            .filter_map(|m| {
                funding
                    .iter()
                    .find(|f| f.ts_ms == m.ts_ms)
                    .map(|f| (m.ts_ms, m.open, f.open))
            })
            .collect(),
        Some(fallback) => mark
            .iter()
            .map(|m| {
                let rate = funding
                    .iter()
                    .find(|f| f.ts_ms == m.ts_ms)
                    .map_or(fallback, |f| f.open);
                (m.ts_ms, m.open, rate)
            })
            .collect(),
    }
}

/// Accumulates funding fees over `[open_ms, close_ms]`.
pub(crate) fn calculate_funding_fees(
    rows: &[FundingRow],
    amount: f64,
    is_short: bool,
    open_ms: i64,
    close_ms: i64,
) -> f64 {
    let mut fees: f64 = rows
        .iter()
        .filter(|(ts, _, _)| *ts >= open_ms && *ts <= close_ms)
        .map(|(_, mark_open, funding_open)| mark_open * funding_open * amount)
        .sum();
    if fees.is_nan() {
        fees = 0.0;
    }
    if is_short { fees } else { -fees }
}

/// Whether the open time sits exactly on a funding cutoff boundary.
pub(crate) fn funding_fee_cutoff(open_date: DateTime<Utc>) -> bool {
    open_date.minute() == 0 && open_date.second() == 0
}

impl Exchange {
    /// Funding fees accrued for a position since `open_date`.
    ///
    /// Futures only; venue errors are tolerated with a warning and a zero
    /// result so the trading loop keeps running.
    pub fn get_funding_fees(
        &self,
        pair: &str,
        amount: f64,
        is_short: bool,
        open_date: DateTime<Utc>,
    ) -> f64 {
        if self.config.trading_mode != TradingMode::Futures {
            return 0.0;
        }
        let result = if self.config.dry_run {
            self.fetch_and_calculate_funding_fees(pair, amount, is_short, open_date, None)
        } else {
            self.funding_fees_from_exchange(pair, open_date.timestamp_millis())
        };
        match result {
            Ok(fees) => fees,
            Err(err) => {
                log::warn!("Could not update funding fees for {pair}: {err}");
                0.0
            }
        }
    }

    /// Sum of venue-reported funding payments since `since_ms`.
    pub(crate) fn funding_fees_from_exchange(
        &self,
        pair: &str,
        since_ms: i64,
    ) -> ExchangeResult<f64> {
        if !self.exchange_has("fetchFundingHistory") {
            return Err(ExchangeError::Operational(format!(
                "fetch_funding_history() is not available using {}",
                self.name()
            )));
        }
        let adapter = self.adapter.clone();
        let pair_owned = pair.to_string();
        let history = self.run(self.retry.execute(
            "fetch_funding_history",
            API_RETRY_COUNT,
            move || {
                let adapter = adapter.clone();
                let pair = pair_owned.clone();
                async move { adapter.fetch_funding_history(&pair, since_ms).await }
            },
        ))?;
        log::debug!("funding_history for {pair}: {} records", history.len());
        Ok(history.iter().map(|payment| payment.amount).sum())
    }

    /// Reconstructs funding fees from mark and funding-rate candles.
    pub(crate) fn fetch_and_calculate_funding_fees(
        &self,
        pair: &str,
        amount: f64,
        is_short: bool,
        mut open_date: DateTime<Utc>,
        close_date: Option<DateTime<Utc>>,
    ) -> ExchangeResult<f64> {
        if funding_fee_cutoff(open_date) {
            // Trades opening exactly on the boundary belong to the candle
            // that just closed.
            let aligned = Timeframe::H1.candle_start(open_date.timestamp_millis());
            open_date = DateTime::from_timestamp_millis(aligned).unwrap_or(open_date);
        }
        let mark_tf = self.features.mark_ohlcv_timeframe;
        let funding_tf = self.features.funding_fee_timeframe;
        let mark_kind = self.features.mark_ohlcv_price;

        let close_ms = close_date
            .unwrap_or_else(Utc::now)
            .timestamp_millis();
        let since_ms = mark_tf.candle_start(open_date.timestamp_millis());

        let mark_key = TableKey::new(pair, mark_tf, mark_kind);
        let funding_key = TableKey::new(pair, funding_tf, CandleKind::FundingRate);

        let histories = self.refresh_latest_ohlcv(
            &[mark_key.clone(), funding_key.clone()],
            Some(since_ms),
            false,
            Some(false),
        );
        // Histories are not guaranteed, e.g. during venue downtime.
        let (Some(funding_rates), Some(mark_rates)) =
            (histories.get(&funding_key), histories.get(&mark_key))
        else {
            return Err(ExchangeError::Exchange(
                "Could not find funding rates.".to_string(),
            ));
        };

        let rows =
            combine_funding_and_mark(funding_rates, mark_rates, self.config.futures_funding_rate);
        Ok(calculate_funding_fees(
            &rows,
            amount,
            is_short,
            open_date.timestamp_millis(),
            close_ms,
        ))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;

    const H8: i64 = 8 * 3_600_000;

    fn mark(ts: i64, open: f64) -> Candle {
        Candle::new(ts, open, open, open, open, 0.0)
    }

    #[rstest]
    fn test_combine_inner_join() {
        let mark_rates = vec![mark(0, 100.0), mark(H8, 110.0), mark(2 * H8, 120.0)];
        let funding = vec![
            Candle::funding_rate(0, 0.0001),
            Candle::funding_rate(2 * H8, 0.0003),
        ];
        let rows = combine_funding_and_mark(&funding, &mark_rates, None);
        // The 08:00 mark candle has no funding partner and drops out.
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (0, 100.0, 0.0001));
        assert_eq!(rows[1], (2 * H8, 120.0, 0.0003));
    }

    #[rstest]
    fn test_combine_outer_join_with_fill() {
        let mark_rates = vec![mark(0, 100.0), mark(H8, 110.0)];
        let funding = vec![Candle::funding_rate(0, 0.0001)];
        let rows = combine_funding_and_mark(&funding, &mark_rates, Some(0.0002));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], (H8, 110.0, 0.0002));
    }

    #[rstest]
    fn test_combine_outer_join_empty_funding() {
        let mark_rates = vec![mark(0, 100.0)];
        let rows = combine_funding_and_mark(&[], &mark_rates, Some(0.0005));
        assert_eq!(rows, vec![(0, 100.0, 0.0005)]);
    }

    #[rstest]
    fn test_calculate_funding_fees_signs() {
        let rows = vec![(0, 100.0, 0.0001), (H8, 110.0, 0.0002)];
        let short_fees = calculate_funding_fees(&rows, 10.0, true, 0, 2 * H8);
        let long_fees = calculate_funding_fees(&rows, 10.0, false, 0, 2 * H8);
        let expected = 100.0 * 0.0001 * 10.0 + 110.0 * 0.0002 * 10.0;
        assert!((short_fees - expected).abs() < 1e-12);
        assert!((long_fees + expected).abs() < 1e-12);
    }

    #[rstest]
    fn test_calculate_funding_fees_window() {
        let rows = vec![(0, 100.0, 0.0001), (H8, 110.0, 0.0002)];
        // Window excluding the first row.
        let fees = calculate_funding_fees(&rows, 10.0, true, 1, 2 * H8);
        assert!((fees - 110.0 * 0.0002 * 10.0).abs() < 1e-12);
    }

    #[rstest]
    fn test_funding_fee_cutoff() {
        let on_boundary = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 1).unwrap();
        assert!(funding_fee_cutoff(on_boundary));
        assert!(!funding_fee_cutoff(after));
    }
}
