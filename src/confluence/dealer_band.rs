// =============================================================================
// Dealer Confluence — volatility-banded score around the current price
// =============================================================================
//
// The band widens with the volatility index (defaults):
//
//   VIX < 15  →  6 ticks
//   VIX < 22  → 10 ticks
//   otherwise → 14 ticks
//
// Each dealer level inside the band contributes `weight × exp(-(d / band)²)`.
// Gamma and GEX levels add, swing levels add, blind spots subtract.

use serde::{Deserialize, Serialize};

use crate::levels::DealerLevels;
use crate::runtime_config::BiasParams;
use crate::types::LevelSource;

/// Band half-width in ticks for a volatility index reading.
pub fn band_ticks(vix: f64, params: &BiasParams) -> f64 {
    if vix < params.band_calm_vix {
        params.band_calm_ticks
    } else if vix < params.band_normal_vix {
        params.band_normal_ticks
    } else {
        params.band_stressed_ticks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandLevelKind {
    Gamma,
    BlindSpot,
    Swing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandLevel {
    pub kind: BandLevelKind,
    pub source: LevelSource,
    pub price: f64,
    pub distance_ticks: f64,
    /// Signed contribution to the total (negative for blind spots).
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealerConfluence {
    pub score: f64,
    pub gamma_score: f64,
    pub blind_spot_score: f64,
    pub swing_score: f64,
    pub band_ticks: f64,
    pub nearby: Vec<BandLevel>,
}

/// Volatility-banded confluence of dealer levels around `price`.
pub fn dealer_confluence_score(
    levels: &DealerLevels,
    price: f64,
    vix: f64,
    tick_size: f64,
    params: &BiasParams,
) -> DealerConfluence {
    let band = band_ticks(vix, params);
    let mut gamma_score = 0.0;
    let mut blind_spot_score = 0.0;
    let mut swing_score = 0.0;
    let mut nearby = Vec::new();

    for level in levels.to_price_levels() {
        let d = (price - level.price).abs() / tick_size;
        if d > band {
            continue;
        }
        let magnitude = level.source.weight() * (-(d / band).powi(2)).exp();
        let (kind, contribution) = match level.source {
            LevelSource::DealerBlindSpot => {
                blind_spot_score -= magnitude;
                (BandLevelKind::BlindSpot, -magnitude)
            }
            LevelSource::DealerSwing => {
                swing_score += magnitude;
                (BandLevelKind::Swing, magnitude)
            }
            _ => {
                gamma_score += magnitude;
                (BandLevelKind::Gamma, magnitude)
            }
        };
        nearby.push(BandLevel {
            kind,
            source: level.source,
            price: level.price,
            distance_ticks: d,
            contribution,
        });
    }

    nearby.sort_by(|a, b| a.distance_ticks.total_cmp(&b.distance_ticks));

    DealerConfluence {
        score: gamma_score + blind_spot_score + swing_score,
        gamma_score,
        blind_spot_score,
        swing_score,
        band_ticks: band,
        nearby,
    }
}
