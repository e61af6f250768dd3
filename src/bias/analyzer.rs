// =============================================================================
// Dealer's Bias Analyzer
// =============================================================================
//
// Turns one dealer-level snapshot into a directional bias:
//
//   components (six scores in [0, 1])
//     → weighted composite in [0, 1]
//     → raw = clamp(2 × composite − 1, −1, 1)
//     → smoothed = α × raw + (1 − α) × previous      (first reading: raw)
//     → classification on the smoothed score
//
// The previous smoothed value is the only mutable state.  It lives behind a
// mutex held across the whole read-modify-write, so one analyzer per symbol
// can be shared between tasks.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bias::components::{
    danger_score, resistance_score, reversal_score, skew_score, support_score, volatility_score,
    BiasComponents,
};
use crate::error::ConfigError;
use crate::levels::{DealerCategory, DealerLevels};
use crate::runtime_config::{BiasParams, EngineConfig};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for BiasDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "BULLISH"),
            Self::Bearish => write!(f, "BEARISH"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasStrength {
    Weak,
    Moderate,
    Strong,
}

impl std::fmt::Display for BiasStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weak => write!(f, "WEAK"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::Strong => write!(f, "STRONG"),
        }
    }
}

/// A dealer level close enough to price to drive its component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveLevel {
    pub label: String,
    pub price: f64,
    pub distance_ticks: f64,
    pub category: DealerCategory,
}

/// One bias reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealersBias {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: f64,
    /// Unsmoothed score in `[-1, 1]`.
    pub raw_score: f64,
    /// EMA-smoothed score in `[-1, 1]`.  Equal to `raw_score` when produced
    /// by `evaluate`.
    pub score: f64,
    /// Weighted component sum before mapping to `[-1, 1]`.
    pub composite: f64,
    pub components: BiasComponents,
    pub direction: BiasDirection,
    pub strength: BiasStrength,
    /// Data quality in `[0, 1]` from staleness and category coverage.
    pub quality_score: f64,
    /// Seconds since the dealer feed refreshed, when known.
    pub data_age_secs: Option<i64>,
    pub active_levels: Vec<ActiveLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveLevelCounts {
    pub resistance: usize,
    pub support: usize,
    pub danger: usize,
    pub reversal: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasSummary {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: f64,
    pub score: f64,
    pub direction: BiasDirection,
    pub strength: BiasStrength,
    pub quality_score: f64,
    pub data_age_secs: Option<i64>,
    pub components: BiasComponents,
    pub active_levels: ActiveLevelCounts,
}

impl DealersBias {
    pub fn summary(&self) -> BiasSummary {
        let count = |c: DealerCategory| self.active_levels.iter().filter(|l| l.category == c).count();
        BiasSummary {
            timestamp: self.timestamp,
            symbol: self.symbol.clone(),
            price: self.price,
            score: self.score,
            direction: self.direction,
            strength: self.strength,
            quality_score: self.quality_score,
            data_age_secs: self.data_age_secs,
            components: self.components.clone(),
            active_levels: ActiveLevelCounts {
                resistance: count(DealerCategory::Resistance),
                support: count(DealerCategory::Support),
                danger: count(DealerCategory::Danger),
                reversal: count(DealerCategory::Reversal),
            },
        }
    }
}

// =============================================================================
// Pure helpers
// =============================================================================

/// Direction and strength of a score in `[-1, 1]`.
pub fn classify(score: f64, params: &BiasParams) -> (BiasDirection, BiasStrength) {
    let magnitude = score.abs();
    if magnitude < params.neutral_cutoff {
        return (BiasDirection::Neutral, BiasStrength::Weak);
    }
    let direction = if score > 0.0 {
        BiasDirection::Bullish
    } else {
        BiasDirection::Bearish
    };
    let strength = if magnitude < params.strong_cutoff {
        BiasStrength::Moderate
    } else {
        BiasStrength::Strong
    };
    (direction, strength)
}

/// Staleness score: fresh data 1.0, then 0.8 / 0.6 / 0.2.  Unknown age is
/// treated as the oldest bucket.
pub fn age_score(data_age_secs: Option<i64>) -> f64 {
    match data_age_secs {
        Some(age) if age < 60 => 1.0,
        Some(age) if age < 300 => 0.8,
        Some(age) if age < 600 => 0.6,
        _ => 0.2,
    }
}

/// Combined data-quality score.
pub fn quality_score(levels: &DealerLevels, data_age_secs: Option<i64>, params: &BiasParams) -> f64 {
    let categories = levels.category_count() as f64 / DealerCategory::ALL.len() as f64;
    let count = (levels.level_count() as f64 / params.full_coverage_levels).min(1.0);
    let coverage = 0.5 * categories + 0.5 * count;
    0.7 * age_score(data_age_secs) + 0.3 * coverage
}

pub fn compute_components(
    price: f64,
    vix: Option<f64>,
    levels: &DealerLevels,
    tick_size: f64,
    params: &BiasParams,
) -> BiasComponents {
    BiasComponents {
        resistance: resistance_score(price, &levels.prices(DealerCategory::Resistance), tick_size, params),
        support: support_score(price, &levels.prices(DealerCategory::Support), tick_size, params),
        danger: danger_score(price, &levels.prices(DealerCategory::Danger), tick_size, params),
        reversal: reversal_score(price, &levels.prices(DealerCategory::Reversal), tick_size, params),
        skew: skew_score(price, &levels.prices(DealerCategory::Skew), params),
        volatility: volatility_score(vix, params),
    }
}

fn active_levels(price: f64, levels: &DealerLevels, tick_size: f64, params: &BiasParams) -> Vec<ActiveLevel> {
    let windows = [
        (DealerCategory::Resistance, params.resistance_proximity_ticks),
        (DealerCategory::Support, params.support_proximity_ticks),
        (DealerCategory::Danger, params.danger_proximity_ticks),
        (DealerCategory::Reversal, params.reversal_proximity_ticks),
    ];
    let mut out = Vec::new();
    for (category, window) in windows {
        for (label, level_price) in levels.labeled(category) {
            let distance_ticks = (price - level_price).abs() / tick_size;
            if distance_ticks <= window {
                out.push(ActiveLevel {
                    label,
                    price: level_price,
                    distance_ticks,
                    category,
                });
            }
        }
    }
    out
}

// =============================================================================
// DealersBiasAnalyzer
// =============================================================================

pub struct DealersBiasAnalyzer {
    symbol: String,
    tick_size: f64,
    params: BiasParams,
    /// Last smoothed score, `None` until the first `analyze`.
    previous: Mutex<Option<f64>>,
}

impl DealersBiasAnalyzer {
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            symbol = %config.symbol,
            alpha = config.bias.smoothing_alpha,
            "dealer bias analyzer ready"
        );
        Ok(Self {
            symbol: config.symbol.clone(),
            tick_size: config.tick_size,
            params: config.bias.clone(),
            previous: Mutex::new(None),
        })
    }

    pub fn params(&self) -> &BiasParams {
        &self.params
    }

    /// Unsmoothed reading.  Does not touch the smoothing state.
    pub fn evaluate(&self, price: f64, vix: Option<f64>, levels: &DealerLevels) -> DealersBias {
        self.evaluate_at(price, vix, levels, Utc::now())
    }

    /// Unsmoothed reading with an explicit clock for data-age computation.
    pub fn evaluate_at(
        &self,
        price: f64,
        vix: Option<f64>,
        levels: &DealerLevels,
        now: DateTime<Utc>,
    ) -> DealersBias {
        let components = compute_components(price, vix, levels, self.tick_size, &self.params);
        let composite = components.composite(&self.params);
        let raw_score = (2.0 * composite - 1.0).clamp(-1.0, 1.0);
        let data_age_secs = levels.age_secs(now);
        let (direction, strength) = classify(raw_score, &self.params);

        DealersBias {
            timestamp: now,
            symbol: self.symbol.clone(),
            price,
            raw_score,
            score: raw_score,
            composite,
            components,
            direction,
            strength,
            quality_score: quality_score(levels, data_age_secs, &self.params),
            data_age_secs,
            active_levels: active_levels(price, levels, self.tick_size, &self.params),
        }
    }

    /// Smoothed reading.  Updates the analyzer's previous score.
    pub fn analyze(&self, price: f64, vix: Option<f64>, levels: &DealerLevels) -> DealersBias {
        let mut bias = self.evaluate(price, vix, levels);

        let smoothed = {
            let mut previous = self.previous.lock();
            let alpha = self.params.smoothing_alpha;
            let smoothed = match *previous {
                Some(prev) => alpha * bias.raw_score + (1.0 - alpha) * prev,
                None => bias.raw_score,
            };
            *previous = Some(smoothed);
            smoothed
        };

        bias.score = smoothed;
        let (direction, strength) = classify(smoothed, &self.params);
        bias.direction = direction;
        bias.strength = strength;

        match bias.data_age_secs {
            Some(age) if age >= self.params.stale_after_secs => {
                warn!(symbol = %self.symbol, age_secs = age, "dealer levels are stale")
            }
            None if levels.level_count() > 0 => {
                warn!(symbol = %self.symbol, "dealer levels carry no update time")
            }
            _ => {}
        }

        debug!(
            symbol = %self.symbol,
            price,
            raw = format!("{:.3}", bias.raw_score),
            smoothed = format!("{:.3}", bias.score),
            direction = %bias.direction,
            strength = %bias.strength,
            quality = format!("{:.3}", bias.quality_score),
            active = bias.active_levels.len(),
            "Dealer bias updated"
        );

        bias
    }

    /// Last smoothed score, if any reading has been taken.
    pub fn last_score(&self) -> Option<f64> {
        *self.previous.lock()
    }

    /// Forget the smoothing history.
    pub fn reset(&self) {
        *self.previous.lock() = None;
    }
}
