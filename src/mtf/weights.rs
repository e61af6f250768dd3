// =============================================================================
// Dynamic timeframe weights
// =============================================================================
//
// Volatility (normalised 0..1 realized volatility) picks one of three weight
// tables:
//
//   vol > high    → fast timeframes dominate   (0.7 / 0.2 / 0.1 / 0.0)
//   vol > normal  → balanced                   (0.5 / 0.3 / 0.15 / 0.05)
//   otherwise     → slow timeframes gain       (0.3 / 0.3 / 0.25 / 0.15)

use serde::{Deserialize, Serialize};

use crate::mtf::Timeframe;
use crate::runtime_config::MtfParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityBand {
    High,
    Normal,
    Low,
}

impl std::fmt::Display for VolatilityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "HIGH"),
            Self::Normal => write!(f, "NORMAL"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

pub fn volatility_band(volatility: f64, params: &MtfParams) -> VolatilityBand {
    if volatility > params.high_volatility {
        VolatilityBand::High
    } else if volatility > params.normal_volatility {
        VolatilityBand::Normal
    } else {
        VolatilityBand::Low
    }
}

/// Weight per configured timeframe for the given volatility.  Each table
/// sums to 1 (checked by `MtfParams::validate`).
pub fn dynamic_weights(volatility: f64, params: &MtfParams) -> Vec<(Timeframe, f64)> {
    let table = match volatility_band(volatility, params) {
        VolatilityBand::High => &params.high_vol_weights,
        VolatilityBand::Normal => &params.normal_vol_weights,
        VolatilityBand::Low => &params.low_vol_weights,
    };
    params
        .timeframes
        .iter()
        .copied()
        .zip(table.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_follow_volatility() {
        let p = MtfParams::default();
        assert_eq!(volatility_band(0.9, &p), VolatilityBand::High);
        assert_eq!(volatility_band(0.8, &p), VolatilityBand::Normal);
        assert_eq!(volatility_band(0.5, &p), VolatilityBand::Normal);
        assert_eq!(volatility_band(0.4, &p), VolatilityBand::Low);
        assert_eq!(volatility_band(f64::NAN, &p), VolatilityBand::Low);
    }

    #[test]
    fn high_volatility_favours_fast_timeframes() {
        let p = MtfParams::default();
        let w = dynamic_weights(0.95, &p);
        assert_eq!(w[0], (Timeframe::M1, 0.7));
        assert_eq!(w[3], (Timeframe::H1, 0.0));
        let low = dynamic_weights(0.1, &p);
        assert!(low[3].1 > w[3].1);
    }

    #[test]
    fn every_band_sums_to_one() {
        let p = MtfParams::default();
        for vol in [0.1, 0.5, 0.9] {
            let total: f64 = dynamic_weights(vol, &p).iter().map(|(_, w)| w).sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }
}
