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

//! Declarative retry policy wrapping venue calls.
//!
//! Every engine operation runs through [`RetryManager::execute`], which
//! classifies the raised error and either sleeps and retries or rethrows.
//! Retries are bounded; the bound is lowered to zero for mutating
//! operations where an unacknowledged retry could double-place an order.

use std::{future::Future, time::Duration};

use crate::error::{ExchangeError, ExchangeResult};

/// Default retry budget for read operations.
pub const API_RETRY_COUNT: u32 = 4;
/// Retry budget for order fetches racing venue-side visibility.
pub const API_FETCH_ORDER_RETRY_COUNT: u32 = 3;

/// Bounded exponential-backoff retry executor.
#[derive(Clone, Debug)]
pub struct RetryManager {
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryManager {
    /// Creates a manager with explicit backoff bounds.
    #[must_use]
    pub fn new(initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1_u64 << attempt.min(10))
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Runs `call`, retrying retryable errors up to `retries` times.
    ///
    /// Rate-limit and order-visibility errors sleep with exponential
    /// backoff between attempts; plain transient errors retry immediately.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        retries: u32,
        mut call: F,
    ) -> ExchangeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ExchangeResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < retries => {
                    let sleeps = matches!(
                        err,
                        ExchangeError::DDosProtection(_) | ExchangeError::RetryableOrder(_)
                    );
                    log::warn!(
                        "{operation} returned {err}, retrying ({}/{retries})",
                        attempt + 1,
                    );
                    if sleeps {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    if attempt >= retries && err.is_retryable() {
                        log::warn!("{operation} giving up after {attempt} retries: {err}");
                    }
                    return Err(err);
                }
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
