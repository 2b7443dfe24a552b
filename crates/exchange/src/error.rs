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

//! Unified error taxonomy for the exchange engine.
//!
//! Every error a venue adapter or engine operation can surface maps onto one
//! of these kinds, ordered by increasing severity. The retry layer consults
//! [`ExchangeError::is_retryable`] to decide between backoff-and-retry and
//! rethrow; nothing outside this taxonomy escapes the engine.

use tradekit_model::PrecisionError;

use thiserror::Error;

/// The error type for all engine and adapter operations.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Venue rate-limit response; retried with exponential backoff.
    #[error("DDoS protection triggered: {0}")]
    DDosProtection(String),

    /// Transient network failure, 5xx, or timeout; retried.
    #[error("Temporary error: {0}")]
    Temporary(String),

    /// Order not found where one was expected; retried with bounded attempts.
    #[error("Retryable order error: {0}")]
    RetryableOrder(String),

    /// Venue rejected the order as malformed or unplaceable; not retried.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// Account balance too low for the requested operation.
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// No usable price could be determined.
    #[error("Pricing error: {0}")]
    Pricing(String),

    /// Venue-side semantic failure.
    #[error("Exchange error: {0}")]
    Exchange(String),

    /// User configuration disallows the call; surfaced at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invariant violation or unsupported venue; fatal for the caller.
    #[error("Operational error: {0}")]
    Operational(String),

    /// Neither time- nor id-based trade pagination is configured.
    #[error("Venue does not support trade pagination for {0}")]
    NotPaginatable(String),
}

impl ExchangeError {
    /// Returns `true` when the retry layer may re-attempt the operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DDosProtection(_) | Self::Temporary(_) | Self::RetryableOrder(_)
        )
    }

    /// Returns `true` for errors that abort the caller.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Operational(_))
    }
}

impl From<PrecisionError> for ExchangeError {
    fn from(error: PrecisionError) -> Self {
        match error {
            PrecisionError::TickSizeTooSmall(_) => Self::Operational(error.to_string()),
            _ => Self::Exchange(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Exchange(format!("JSON error: {error}"))
    }
}

impl From<std::io::Error> for ExchangeError {
    fn from(error: std::io::Error) -> Self {
        Self::Temporary(format!("I/O error: {error}"))
    }
}

/// Convenience alias used across the engine.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
