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

//! Leverage tiers for futures markets.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error produced when a tier list violates its structural invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeverageTierError {
    #[error("leverage tiers are empty")]
    Empty,
    #[error("leverage tiers do not start at notional 0 (first min: {0})")]
    GapAtZero(String),
    #[error("leverage tiers are not contiguous at notional {0}")]
    Gap(String),
    #[error("leverage tier max_leverage is not strictly descending at notional {0}")]
    LeverageOrder(String),
}

/// One leverage tier: a notional bracket with its maintenance parameters.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeverageTier {
    pub min_notional: f64,
    pub max_notional: f64,
    pub maintenance_margin_rate: f64,
    pub max_leverage: f64,
    /// Venue-specific cumulative maintenance amount, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_amount: Option<f64>,
}

/// Validates that tiers are contiguous on `[0, max_notional_last)` and that
/// `max_leverage` strictly decreases as notional grows.
pub fn validate_tiers(tiers: &[LeverageTier]) -> Result<(), LeverageTierError> {
    let first = tiers.first().ok_or(LeverageTierError::Empty)?;
    if first.min_notional != 0.0 {
        return Err(LeverageTierError::GapAtZero(first.min_notional.to_string()));
    }
    for pair in tiers.windows(2) {
        if pair[1].min_notional != pair[0].max_notional {
            return Err(LeverageTierError::Gap(pair[1].min_notional.to_string()));
        }
        if pair[1].max_leverage >= pair[0].max_leverage {
            return Err(LeverageTierError::LeverageOrder(
                pair[1].min_notional.to_string(),
            ));
        }
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn tier(min: f64, max: f64, mmr: f64, lev: f64) -> LeverageTier {
        LeverageTier {
            min_notional: min,
            max_notional: max,
            maintenance_margin_rate: mmr,
            max_leverage: lev,
            maintenance_amount: None,
        }
    }

    #[rstest]
    fn test_valid_tiers() {
        let tiers = [
            tier(0.0, 50_000.0, 0.004, 50.0),
            tier(50_000.0, 250_000.0, 0.005, 20.0),
            tier(250_000.0, 1_000_000.0, 0.01, 10.0),
        ];
        assert!(validate_tiers(&tiers).is_ok());
    }

    #[rstest]
    fn test_empty_rejected() {
        assert_eq!(validate_tiers(&[]), Err(LeverageTierError::Empty));
    }

    #[rstest]
    fn test_gap_rejected() {
        let tiers = [
            tier(0.0, 50_000.0, 0.004, 50.0),
            tier(60_000.0, 250_000.0, 0.005, 20.0),
        ];
        assert!(matches!(
            validate_tiers(&tiers),
            Err(LeverageTierError::Gap(_))
        ));
    }

    #[rstest]
    fn test_nonzero_start_rejected() {
        let tiers = [tier(10.0, 50_000.0, 0.004, 50.0)];
        assert!(matches!(
            validate_tiers(&tiers),
            Err(LeverageTierError::GapAtZero(_))
        ));
    }

    #[rstest]
    fn test_leverage_order_rejected() {
        let tiers = [
            tier(0.0, 50_000.0, 0.004, 20.0),
            tier(50_000.0, 250_000.0, 0.005, 20.0),
        ];
        assert!(matches!(
            validate_tiers(&tiers),
            Err(LeverageTierError::LeverageOrder(_))
        ));
    }

    #[rstest]
    fn test_serde_camel_case() {
        let json = r#"{
            "minNotional": 0.0,
            "maxNotional": 50000.0,
            "maintenanceMarginRate": 0.004,
            "maxLeverage": 50.0
        }"#;
        let tier: LeverageTier = serde_json::from_str(json).unwrap();
        assert_eq!(tier.max_leverage, 50.0);
        assert_eq!(tier.maintenance_amount, None);
    }
}
