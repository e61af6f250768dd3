// =============================================================================
// Bias Components — six sub-scores in [0, 1]
// =============================================================================
//
// 0.5 is neutral, above leans bullish, below leans bearish.  A component
// whose input category is empty returns 0.5.
//
//   resistance  nearest within N ticks → 0.2, below all of them → 0.3,
//               above → 0.7
//   support     nearest within N ticks → 0.8, above it → 0.7, below → 0.3
//   danger      blind spot within N ticks → 0.1, otherwise 0.5
//   reversal    mean of 0.7 (level below) / 0.3 (level above) for swing
//               levels within N ticks
//   skew        share of GEX levels above price > 0.7 → 0.3, < 0.3 → 0.7
//   volatility  VIX < calm → 0.7, otherwise 0.5

use serde::{Deserialize, Serialize};

use crate::runtime_config::BiasParams;

pub const NEUTRAL: f64 = 0.5;

/// The six component scores of one bias reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasComponents {
    pub resistance: f64,
    pub support: f64,
    pub danger: f64,
    pub reversal: f64,
    pub skew: f64,
    pub volatility: f64,
}

impl Default for BiasComponents {
    fn default() -> Self {
        Self {
            resistance: NEUTRAL,
            support: NEUTRAL,
            danger: NEUTRAL,
            reversal: NEUTRAL,
            skew: NEUTRAL,
            volatility: NEUTRAL,
        }
    }
}

impl BiasComponents {
    /// Weighted sum of the components, in `[0, 1]` for weights summing to 1.
    pub fn composite(&self, params: &BiasParams) -> f64 {
        let w = &params.weights;
        w.resistance * self.resistance
            + w.support * self.support
            + w.danger * self.danger
            + w.reversal * self.reversal
            + w.skew * self.skew
            + w.volatility * self.volatility
    }
}

fn distance_ticks(price: f64, level: f64, tick_size: f64) -> f64 {
    (price - level).abs() / tick_size
}

fn nearest(price: f64, levels: &[f64]) -> Option<f64> {
    levels
        .iter()
        .copied()
        .min_by(|a, b| (price - a).abs().total_cmp(&(price - b).abs()))
}

pub fn resistance_score(price: f64, levels: &[f64], tick_size: f64, params: &BiasParams) -> f64 {
    let Some(closest) = nearest(price, levels) else {
        return NEUTRAL;
    };
    let lowest = levels.iter().copied().fold(f64::INFINITY, f64::min);
    if distance_ticks(price, closest, tick_size) <= params.resistance_proximity_ticks {
        0.2
    } else if price < lowest {
        0.3
    } else {
        0.7
    }
}

pub fn support_score(price: f64, levels: &[f64], tick_size: f64, params: &BiasParams) -> f64 {
    let Some(closest) = nearest(price, levels) else {
        return NEUTRAL;
    };
    if distance_ticks(price, closest, tick_size) <= params.support_proximity_ticks {
        0.8
    } else if price > closest {
        0.7
    } else {
        0.3
    }
}

pub fn danger_score(price: f64, levels: &[f64], tick_size: f64, params: &BiasParams) -> f64 {
    match nearest(price, levels) {
        Some(closest) if distance_ticks(price, closest, tick_size) <= params.danger_proximity_ticks => 0.1,
        _ => NEUTRAL,
    }
}

pub fn reversal_score(price: f64, levels: &[f64], tick_size: f64, params: &BiasParams) -> f64 {
    let votes: Vec<f64> = levels
        .iter()
        .filter(|l| distance_ticks(price, **l, tick_size) <= params.reversal_proximity_ticks)
        .map(|l| if *l < price { 0.7 } else { 0.3 })
        .collect();
    if votes.is_empty() {
        NEUTRAL
    } else {
        votes.iter().sum::<f64>() / votes.len() as f64
    }
}

/// Share of levels strictly above `price` among those not at `price`.
pub fn fraction_above(price: f64, levels: &[f64]) -> f64 {
    let above = levels.iter().filter(|l| **l > price).count();
    let below = levels.iter().filter(|l| **l < price).count();
    match above + below {
        0 => NEUTRAL,
        total => above as f64 / total as f64,
    }
}

pub fn skew_score(price: f64, levels: &[f64], params: &BiasParams) -> f64 {
    if levels.is_empty() {
        return NEUTRAL;
    }
    let frac = fraction_above(price, levels);
    if frac > params.skew_bearish_fraction {
        0.3
    } else if frac < params.skew_bullish_fraction {
        0.7
    } else {
        NEUTRAL
    }
}

/// Calm markets amplify the bullish drift; stressed markets neutralise it.
pub fn volatility_score(vix: Option<f64>, params: &BiasParams) -> f64 {
    match vix {
        Some(v) if v.is_finite() && v > params.vix_stress => NEUTRAL,
        Some(v) if v.is_finite() && v < params.vix_calm => 0.7,
        _ => NEUTRAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: f64 = 0.25;

    fn params() -> BiasParams {
        BiasParams::default()
    }

    #[test]
    fn empty_categories_are_neutral() {
        let p = params();
        assert!((resistance_score(5300.0, &[], TICK, &p) - 0.5).abs() < 1e-10);
        assert!((support_score(5300.0, &[], TICK, &p) - 0.5).abs() < 1e-10);
        assert!((danger_score(5300.0, &[], TICK, &p) - 0.5).abs() < 1e-10);
        assert!((reversal_score(5300.0, &[], TICK, &p) - 0.5).abs() < 1e-10);
        assert!((skew_score(5300.0, &[], &p) - 0.5).abs() < 1e-10);
        assert!((volatility_score(None, &p) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn resistance_rules() {
        let p = params();
        assert!((resistance_score(5298.0, &[5300.0], TICK, &p) - 0.2).abs() < 1e-10);
        assert!((resistance_score(5290.0, &[5300.0, 5310.0], TICK, &p) - 0.3).abs() < 1e-10);
        assert!((resistance_score(5310.0, &[5300.0], TICK, &p) - 0.7).abs() < 1e-10);
    }

    #[test]
    fn support_rules() {
        let p = params();
        assert!((support_score(5300.0, &[5298.0], TICK, &p) - 0.8).abs() < 1e-10);
        assert!((support_score(5300.0, &[5290.0], TICK, &p) - 0.7).abs() < 1e-10);
        assert!((support_score(5280.0, &[5290.0], TICK, &p) - 0.3).abs() < 1e-10);
    }

    #[test]
    fn danger_only_fires_close_to_a_blind_spot() {
        let p = params();
        assert!((danger_score(5300.0, &[5301.0], TICK, &p) - 0.1).abs() < 1e-10);
        assert!((danger_score(5300.0, &[5302.0], TICK, &p) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn reversal_averages_nearby_swing_levels() {
        let p = params();
        // two below (0.7), one above (0.3), one too far away
        let levels = [5298.0, 5297.0, 5302.0, 5320.0];
        let expected = (0.7 + 0.7 + 0.3) / 3.0;
        assert!((reversal_score(5300.0, &levels, TICK, &p) - expected).abs() < 1e-10);
        assert!((reversal_score(5300.0, &[5320.0], TICK, &p) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn skew_follows_share_of_levels_above() {
        let p = params();
        assert!((skew_score(5300.0, &[5310.0, 5320.0, 5330.0, 5290.0], &p) - 0.3).abs() < 1e-10);
        assert!((skew_score(5300.0, &[5280.0, 5290.0, 5295.0, 5310.0], &p) - 0.7).abs() < 1e-10);
        assert!((skew_score(5300.0, &[5290.0, 5310.0], &p) - 0.5).abs() < 1e-10);
        // levels at price are ignored
        assert!((fraction_above(5300.0, &[5300.0]) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn volatility_regimes() {
        let p = params();
        assert!((volatility_score(Some(12.0), &p) - 0.7).abs() < 1e-10);
        assert!((volatility_score(Some(20.0), &p) - 0.5).abs() < 1e-10);
        assert!((volatility_score(Some(30.0), &p) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn neutral_components_compose_to_half() {
        let c = BiasComponents::default();
        assert!((c.composite(&params()) - 0.5).abs() < 1e-10);
    }
}
