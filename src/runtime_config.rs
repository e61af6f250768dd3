// =============================================================================
// Runtime Configuration — Tunable scoring tables with atomic save
// =============================================================================
//
// Every heuristic threshold of the pipeline lives here so the scoring rules
// stay auditable and can be tested in isolation: age decay, touch bonus,
// quality cut-offs, proximity windows, bias weights, timeframe weight bands.
//
// Persistence uses an atomic tmp + rename pattern.  All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file.  Validation is a separate step run by every analyzer
// constructor, so a bad file fails fast instead of per call.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::mtf::Timeframe;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_symbol() -> String {
    "ES".to_string()
}

fn default_tick_size() -> f64 {
    0.25
}

fn default_refresh_interval_secs() -> u64 {
    30
}

fn default_tolerance_ticks() -> f64 {
    3.0
}

fn default_max_level_distance() -> f64 {
    200.0
}

fn default_round_number_step() -> f64 {
    25.0
}

fn default_psychological_step() -> f64 {
    100.0
}

fn default_zone_score_normalizer() -> f64 {
    8.0
}

fn default_age_horizon_minutes() -> f64 {
    1440.0
}

fn default_min_age_factor() -> f64 {
    0.1
}

fn default_touch_bonus_step() -> f64 {
    0.2
}

fn default_max_touch_bonus() -> f64 {
    2.0
}

fn default_price_score_window_ticks() -> f64 {
    10.0
}

fn default_price_score_divisor() -> f64 {
    5.0
}

fn default_proximity_window_ticks() -> f64 {
    20.0
}

fn default_near_price_ticks() -> f64 {
    10.0
}

fn default_history_capacity() -> usize {
    100
}

fn default_smoothing_alpha() -> f64 {
    0.2
}

fn default_level_proximity_ticks() -> f64 {
    10.0
}

fn default_danger_proximity_ticks() -> f64 {
    5.0
}

fn default_reversal_proximity_ticks() -> f64 {
    15.0
}

fn default_skew_bearish_fraction() -> f64 {
    0.7
}

fn default_skew_bullish_fraction() -> f64 {
    0.3
}

fn default_vix_calm() -> f64 {
    15.0
}

fn default_vix_stress() -> f64 {
    25.0
}

fn default_neutral_cutoff() -> f64 {
    0.15
}

fn default_strong_cutoff() -> f64 {
    0.45
}

fn default_full_coverage_levels() -> f64 {
    20.0
}

fn default_stale_after_secs() -> i64 {
    600
}

fn default_band_calm_vix() -> f64 {
    15.0
}

fn default_band_normal_vix() -> f64 {
    22.0
}

fn default_band_calm_ticks() -> f64 {
    6.0
}

fn default_band_normal_ticks() -> f64 {
    10.0
}

fn default_band_stressed_ticks() -> f64 {
    14.0
}

fn default_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::M1, Timeframe::M5, Timeframe::M15, Timeframe::H1]
}

fn default_high_volatility() -> f64 {
    0.8
}

fn default_normal_volatility() -> f64 {
    0.4
}

fn default_high_vol_weights() -> Vec<f64> {
    vec![0.7, 0.2, 0.1, 0.0]
}

fn default_normal_vol_weights() -> Vec<f64> {
    vec![0.5, 0.3, 0.15, 0.05]
}

fn default_low_vol_weights() -> Vec<f64> {
    vec![0.3, 0.3, 0.25, 0.15]
}

fn default_confident_threshold() -> f64 {
    0.6
}

fn default_agreement_threshold() -> f64 {
    0.2
}

fn default_alignment_bonus() -> f64 {
    0.15
}

fn default_divergence_min_weight() -> f64 {
    0.3
}

fn default_divergence_min_confidence() -> f64 {
    0.5
}

fn default_divergence_signal() -> f64 {
    0.4
}

fn default_divergence_penalty() -> f64 {
    0.2
}

fn default_golden_rule_multiplier() -> f64 {
    1.15
}

fn default_quality_bonus_tiers() -> Vec<QualityBonusTier> {
    vec![
        QualityBonusTier { above: 0.8, bonus: 0.12 },
        QualityBonusTier { above: 0.7, bonus: 0.08 },
        QualityBonusTier { above: 0.6, bonus: 0.04 },
    ]
}

fn default_weak_threshold() -> f64 {
    0.1
}

fn default_elite_threshold() -> f64 {
    0.75
}

fn default_standard_threshold() -> f64 {
    0.35
}

fn default_extreme_score() -> f64 {
    0.8
}

fn default_extreme_count() -> usize {
    7
}

fn default_strong_score() -> f64 {
    0.6
}

fn default_strong_count() -> usize {
    5
}

fn default_moderate_score() -> f64 {
    0.4
}

fn default_moderate_count() -> usize {
    3
}

fn default_bias_resistance() -> f64 {
    0.25
}

fn default_bias_support() -> f64 {
    0.20
}

fn default_bias_danger() -> f64 {
    0.20
}

fn default_bias_reversal() -> f64 {
    0.15
}

fn default_bias_skew() -> f64 {
    0.15
}

fn default_bias_volatility() -> f64 {
    0.05
}

fn ensure_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

// =============================================================================
// Zone quality thresholds
// =============================================================================

/// Score / member-count cut-offs for each quality class.  A zone reaches a
/// class when either its score or its member count clears the bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityThresholds {
    #[serde(default = "default_extreme_score")]
    pub extreme_score: f64,
    #[serde(default = "default_extreme_count")]
    pub extreme_count: usize,
    #[serde(default = "default_strong_score")]
    pub strong_score: f64,
    #[serde(default = "default_strong_count")]
    pub strong_count: usize,
    #[serde(default = "default_moderate_score")]
    pub moderate_score: f64,
    #[serde(default = "default_moderate_count")]
    pub moderate_count: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            extreme_score: default_extreme_score(),
            extreme_count: default_extreme_count(),
            strong_score: default_strong_score(),
            strong_count: default_strong_count(),
            moderate_score: default_moderate_score(),
            moderate_count: default_moderate_count(),
        }
    }
}

// =============================================================================
// ConfluenceParams
// =============================================================================

/// Ingestion, clustering, zone scoring and query parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceParams {
    /// Clustering tolerance in ticks (tolerance distance = ticks × tick size).
    #[serde(default = "default_tolerance_ticks")]
    pub tolerance_ticks: f64,

    /// Levels further than this many price units from the reference price are
    /// discarded during ingestion.
    #[serde(default = "default_max_level_distance")]
    pub max_level_distance: f64,

    /// Emit round-number and psychological levels around the reference price.
    #[serde(default = "default_true")]
    pub generate_round_numbers: bool,

    /// Spacing of generated round-number levels (price units).
    #[serde(default = "default_round_number_step")]
    pub round_number_step: f64,

    /// Spacing of generated psychological levels (price units).
    #[serde(default = "default_psychological_step")]
    pub psychological_step: f64,

    /// Divisor turning summed weighted strength into a `[0, 1]` zone score.
    #[serde(default = "default_zone_score_normalizer")]
    pub zone_score_normalizer: f64,

    /// Age (minutes) over which a level's strength decays to the floor.
    #[serde(default = "default_age_horizon_minutes")]
    pub age_horizon_minutes: f64,

    /// Floor of the age decay factor.
    #[serde(default = "default_min_age_factor")]
    pub min_age_factor: f64,

    /// Bonus per touch.
    #[serde(default = "default_touch_bonus_step")]
    pub touch_bonus_step: f64,

    /// Cap on the touch multiplier.
    #[serde(default = "default_max_touch_bonus")]
    pub max_touch_bonus: f64,

    #[serde(default)]
    pub quality: QualityThresholds,

    /// Linear decay window (ticks) for the score-at-price query.
    #[serde(default = "default_price_score_window_ticks")]
    pub price_score_window_ticks: f64,

    /// Divisor normalising the score-at-price query.
    #[serde(default = "default_price_score_divisor")]
    pub price_score_divisor: f64,

    /// Window (ticks) for the strong-zone proximity score.
    #[serde(default = "default_proximity_window_ticks")]
    pub proximity_window_ticks: f64,

    /// Default window (ticks) for "zones near price" lookups.
    #[serde(default = "default_near_price_ticks")]
    pub near_price_ticks: f64,

    /// Number of recent analyses kept in memory.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for ConfluenceParams {
    fn default() -> Self {
        Self {
            tolerance_ticks: default_tolerance_ticks(),
            max_level_distance: default_max_level_distance(),
            generate_round_numbers: true,
            round_number_step: default_round_number_step(),
            psychological_step: default_psychological_step(),
            zone_score_normalizer: default_zone_score_normalizer(),
            age_horizon_minutes: default_age_horizon_minutes(),
            min_age_factor: default_min_age_factor(),
            touch_bonus_step: default_touch_bonus_step(),
            max_touch_bonus: default_max_touch_bonus(),
            quality: QualityThresholds::default(),
            price_score_window_ticks: default_price_score_window_ticks(),
            price_score_divisor: default_price_score_divisor(),
            proximity_window_ticks: default_proximity_window_ticks(),
            near_price_ticks: default_near_price_ticks(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl ConfluenceParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance_ticks.is_finite() && self.tolerance_ticks > 0.0) {
            return Err(ConfigError::Tolerance(self.tolerance_ticks));
        }
        ensure_positive("max_level_distance", self.max_level_distance)?;
        ensure_positive("round_number_step", self.round_number_step)?;
        ensure_positive("psychological_step", self.psychological_step)?;
        ensure_positive("zone_score_normalizer", self.zone_score_normalizer)?;
        ensure_positive("age_horizon_minutes", self.age_horizon_minutes)?;
        ensure_positive("max_touch_bonus", self.max_touch_bonus)?;
        if !(self.min_age_factor.is_finite() && (0.0..=1.0).contains(&self.min_age_factor)) {
            return Err(ConfigError::OutOfUnitRange {
                name: "min_age_factor",
                value: self.min_age_factor,
            });
        }
        if !(self.touch_bonus_step.is_finite() && self.touch_bonus_step >= 0.0) {
            return Err(ConfigError::Negative {
                name: "touch_bonus_step",
                value: self.touch_bonus_step,
            });
        }
        ensure_positive("price_score_window_ticks", self.price_score_window_ticks)?;
        ensure_positive("price_score_divisor", self.price_score_divisor)?;
        ensure_positive("proximity_window_ticks", self.proximity_window_ticks)?;
        Ok(())
    }
}

// =============================================================================
// BiasParams
// =============================================================================

/// Weights of the six bias components.  They need not sum to one; the
/// composite is clamped afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasWeights {
    #[serde(default = "default_bias_resistance")]
    pub resistance: f64,
    #[serde(default = "default_bias_support")]
    pub support: f64,
    #[serde(default = "default_bias_danger")]
    pub danger: f64,
    #[serde(default = "default_bias_reversal")]
    pub reversal: f64,
    #[serde(default = "default_bias_skew")]
    pub skew: f64,
    #[serde(default = "default_bias_volatility")]
    pub volatility: f64,
}

impl Default for BiasWeights {
    fn default() -> Self {
        Self {
            resistance: default_bias_resistance(),
            support: default_bias_support(),
            danger: default_bias_danger(),
            reversal: default_bias_reversal(),
            skew: default_bias_skew(),
            volatility: default_bias_volatility(),
        }
    }
}

impl BiasWeights {
    fn named(&self) -> [(&'static str, f64); 6] {
        [
            ("resistance", self.resistance),
            ("support", self.support),
            ("danger", self.danger),
            ("reversal", self.reversal),
            ("skew", self.skew),
            ("volatility", self.volatility),
        ]
    }

    pub fn total(&self) -> f64 {
        self.named().iter().map(|(_, w)| w).sum()
    }
}

/// Thresholds of the dealer's bias composite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasParams {
    #[serde(default)]
    pub weights: BiasWeights,

    /// EMA coefficient applied to successive bias readings.
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,

    /// Distance (ticks) at which the nearest resistance-equivalent dominates.
    #[serde(default = "default_level_proximity_ticks")]
    pub resistance_proximity_ticks: f64,

    /// Distance (ticks) at which the nearest support-equivalent dominates.
    #[serde(default = "default_level_proximity_ticks")]
    pub support_proximity_ticks: f64,

    /// Distance (ticks) inside which a danger marker is considered hit.
    #[serde(default = "default_danger_proximity_ticks")]
    pub danger_proximity_ticks: f64,

    /// Distance (ticks) inside which reversal markers are counted.
    #[serde(default = "default_reversal_proximity_ticks")]
    pub reversal_proximity_ticks: f64,

    /// Fraction of skew markers above price beyond which the skew is bearish.
    #[serde(default = "default_skew_bearish_fraction")]
    pub skew_bearish_fraction: f64,

    /// Fraction of skew markers above price below which the skew is bullish.
    #[serde(default = "default_skew_bullish_fraction")]
    pub skew_bullish_fraction: f64,

    /// Volatility index below which the regime is calm.
    #[serde(default = "default_vix_calm")]
    pub vix_calm: f64,

    /// Volatility index above which the regime is stressed.
    #[serde(default = "default_vix_stress")]
    pub vix_stress: f64,

    /// `|score|` below this is neutral.
    #[serde(default = "default_neutral_cutoff")]
    pub neutral_cutoff: f64,

    /// `|score|` at or above this is strong.
    #[serde(default = "default_strong_cutoff")]
    pub strong_cutoff: f64,

    /// Dealer level count at which data coverage saturates.
    #[serde(default = "default_full_coverage_levels")]
    pub full_coverage_levels: f64,

    /// Dealer data older than this (seconds) is reported as stale.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: i64,

    /// Volatility index below which the dealer band is narrowest.
    #[serde(default = "default_band_calm_vix")]
    pub band_calm_vix: f64,

    /// Volatility index below which the dealer band is of normal width.
    #[serde(default = "default_band_normal_vix")]
    pub band_normal_vix: f64,

    #[serde(default = "default_band_calm_ticks")]
    pub band_calm_ticks: f64,

    #[serde(default = "default_band_normal_ticks")]
    pub band_normal_ticks: f64,

    #[serde(default = "default_band_stressed_ticks")]
    pub band_stressed_ticks: f64,
}

impl Default for BiasParams {
    fn default() -> Self {
        Self {
            weights: BiasWeights::default(),
            smoothing_alpha: default_smoothing_alpha(),
            resistance_proximity_ticks: default_level_proximity_ticks(),
            support_proximity_ticks: default_level_proximity_ticks(),
            danger_proximity_ticks: default_danger_proximity_ticks(),
            reversal_proximity_ticks: default_reversal_proximity_ticks(),
            skew_bearish_fraction: default_skew_bearish_fraction(),
            skew_bullish_fraction: default_skew_bullish_fraction(),
            vix_calm: default_vix_calm(),
            vix_stress: default_vix_stress(),
            neutral_cutoff: default_neutral_cutoff(),
            strong_cutoff: default_strong_cutoff(),
            full_coverage_levels: default_full_coverage_levels(),
            stale_after_secs: default_stale_after_secs(),
            band_calm_vix: default_band_calm_vix(),
            band_normal_vix: default_band_normal_vix(),
            band_calm_ticks: default_band_calm_ticks(),
            band_normal_ticks: default_band_normal_ticks(),
            band_stressed_ticks: default_band_stressed_ticks(),
        }
    }
}

impl BiasParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let alpha = self.smoothing_alpha;
        if !(alpha.is_finite() && alpha > 0.0 && alpha <= 1.0) {
            return Err(ConfigError::SmoothingAlpha(alpha));
        }
        for (name, value) in self.weights.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeWeight { name, value });
            }
        }
        if self.weights.total() <= 0.0 {
            return Err(ConfigError::ZeroWeights);
        }
        ensure_positive("resistance_proximity_ticks", self.resistance_proximity_ticks)?;
        ensure_positive("support_proximity_ticks", self.support_proximity_ticks)?;
        ensure_positive("danger_proximity_ticks", self.danger_proximity_ticks)?;
        ensure_positive("reversal_proximity_ticks", self.reversal_proximity_ticks)?;
        ensure_positive("full_coverage_levels", self.full_coverage_levels)?;
        ensure_positive("band_calm_ticks", self.band_calm_ticks)?;
        ensure_positive("band_normal_ticks", self.band_normal_ticks)?;
        ensure_positive("band_stressed_ticks", self.band_stressed_ticks)?;
        Ok(())
    }
}

// =============================================================================
// MtfParams
// =============================================================================

/// One step of the pattern-quality bonus: a weighted mean quality strictly
/// above `above` earns `bonus`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBonusTier {
    pub above: f64,
    pub bonus: f64,
}

/// Multi-timeframe fusion tables.  Weight vectors are indexed like
/// `timeframes` (fastest first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtfParams {
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,

    /// Normalised volatility above which fast timeframes dominate.
    #[serde(default = "default_high_volatility")]
    pub high_volatility: f64,

    /// Normalised volatility above which the normal band applies.
    #[serde(default = "default_normal_volatility")]
    pub normal_volatility: f64,

    #[serde(default = "default_high_vol_weights")]
    pub high_vol_weights: Vec<f64>,

    #[serde(default = "default_normal_vol_weights")]
    pub normal_vol_weights: Vec<f64>,

    #[serde(default = "default_low_vol_weights")]
    pub low_vol_weights: Vec<f64>,

    /// Confidence above which a timeframe takes part in the alignment check.
    #[serde(default = "default_confident_threshold")]
    pub confident_threshold: f64,

    /// Minimum `|signal|` for a confident timeframe to count as agreeing.
    #[serde(default = "default_agreement_threshold")]
    pub agreement_threshold: f64,

    /// Bonus when every confident timeframe agrees, scaled by their share.
    #[serde(default = "default_alignment_bonus")]
    pub alignment_bonus: f64,

    #[serde(default = "default_divergence_min_weight")]
    pub divergence_min_weight: f64,

    #[serde(default = "default_divergence_min_confidence")]
    pub divergence_min_confidence: f64,

    /// `|signal|` beyond which a heavy timeframe counts as a strong vote.
    #[serde(default = "default_divergence_signal")]
    pub divergence_signal: f64,

    #[serde(default = "default_divergence_penalty")]
    pub divergence_penalty: f64,

    /// Confidence multiplier when the golden-rule pattern holds.
    #[serde(default = "default_golden_rule_multiplier")]
    pub golden_rule_multiplier: f64,

    /// Quality bonus steps, highest cut-off first.  The first tier cleared
    /// applies.
    #[serde(default = "default_quality_bonus_tiers")]
    pub quality_bonus_tiers: Vec<QualityBonusTier>,

    /// `|score|` beyond which a fused score reads as weak or negative
    /// rather than no confluence.
    #[serde(default = "default_weak_threshold")]
    pub weak_threshold: f64,

    #[serde(default = "default_elite_threshold")]
    pub elite_threshold: f64,

    #[serde(default = "default_standard_threshold")]
    pub standard_threshold: f64,
}

impl Default for MtfParams {
    fn default() -> Self {
        Self {
            timeframes: default_timeframes(),
            high_volatility: default_high_volatility(),
            normal_volatility: default_normal_volatility(),
            high_vol_weights: default_high_vol_weights(),
            normal_vol_weights: default_normal_vol_weights(),
            low_vol_weights: default_low_vol_weights(),
            confident_threshold: default_confident_threshold(),
            agreement_threshold: default_agreement_threshold(),
            alignment_bonus: default_alignment_bonus(),
            divergence_min_weight: default_divergence_min_weight(),
            divergence_min_confidence: default_divergence_min_confidence(),
            divergence_signal: default_divergence_signal(),
            divergence_penalty: default_divergence_penalty(),
            golden_rule_multiplier: default_golden_rule_multiplier(),
            quality_bonus_tiers: default_quality_bonus_tiers(),
            weak_threshold: default_weak_threshold(),
            elite_threshold: default_elite_threshold(),
            standard_threshold: default_standard_threshold(),
        }
    }
}

impl MtfParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeframes.is_empty() {
            return Err(ConfigError::NoTimeframes);
        }
        if self.high_volatility <= self.normal_volatility {
            return Err(ConfigError::VolatilityBands {
                high: self.high_volatility,
                normal: self.normal_volatility,
            });
        }
        let bands = [
            ("high_vol_weights", &self.high_vol_weights),
            ("normal_vol_weights", &self.normal_vol_weights),
            ("low_vol_weights", &self.low_vol_weights),
        ];
        for (band, weights) in bands {
            if weights.len() != self.timeframes.len() {
                return Err(ConfigError::WeightBandLength {
                    band,
                    expected: self.timeframes.len(),
                    got: weights.len(),
                });
            }
            let sum: f64 = weights.iter().sum();
            if (sum - 1.0).abs() > 1e-6 || weights.iter().any(|w| *w < 0.0) {
                return Err(ConfigError::WeightBand { band, sum });
            }
        }
        Ok(())
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the confluence engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Instrument the levels belong to.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Minimum price increment of the instrument.
    #[serde(default = "default_tick_size")]
    pub tick_size: f64,

    /// Cadence of the runner loop.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    #[serde(default)]
    pub confluence: ConfluenceParams,

    #[serde(default)]
    pub bias: BiasParams,

    #[serde(default)]
    pub mtf: MtfParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            tick_size: default_tick_size(),
            refresh_interval_secs: default_refresh_interval_secs(),
            confluence: ConfluenceParams::default(),
            bias: BiasParams::default(),
            mtf: MtfParams::default(),
        }
    }
}

impl EngineConfig {
    /// Check the whole configuration.  Analyzer constructors call this so a
    /// bad value is reported once, before any analysis runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_size.is_finite() && self.tick_size > 0.0) {
            return Err(ConfigError::TickSize(self.tick_size));
        }
        self.confluence.validate()?;
        self.bias.validate()?;
        self.mtf.validate()?;
        Ok(())
    }

    /// Clustering tolerance in price units.
    pub fn tolerance_price(&self) -> f64 {
        self.confluence.tolerance_ticks * self.tick_size
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("invalid engine config in {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            tick_size = config.tick_size,
            tolerance_ticks = config.confluence.tolerance_ticks,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.symbol, "ES");
        assert!((cfg.tick_size - 0.25).abs() < f64::EPSILON);
        assert!((cfg.confluence.tolerance_ticks - 3.0).abs() < f64::EPSILON);
        assert!((cfg.tolerance_price() - 0.75).abs() < 1e-12);
        assert!((cfg.bias.smoothing_alpha - 0.2).abs() < f64::EPSILON);
        assert!((cfg.bias.weights.total() - 1.0).abs() < 1e-12);
        assert_eq!(cfg.mtf.timeframes.len(), 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.refresh_interval_secs, 30);
        assert!(cfg.confluence.generate_round_numbers);
        assert_eq!(cfg.confluence.quality.extreme_count, 7);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "tick_size": 0.1, "confluence": { "tolerance_ticks": 5.0 } }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert!((cfg.tick_size - 0.1).abs() < f64::EPSILON);
        assert!((cfg.confluence.tolerance_ticks - 5.0).abs() < f64::EPSILON);
        assert!((cfg.confluence.max_level_distance - 200.0).abs() < f64::EPSILON);
        assert!((cfg.bias.weights.resistance - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_nested_tables_keep_remaining_defaults() {
        let json = r#"{
            "confluence": { "quality": { "extreme_count": 9 } },
            "bias": { "weights": { "skew": 0.3 }, "stale_after_secs": 120 },
            "mtf": { "weak_threshold": 0.05 }
        }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.confluence.quality.extreme_count, 9);
        assert!((cfg.confluence.quality.strong_score - 0.6).abs() < f64::EPSILON);
        assert_eq!(cfg.confluence.quality.moderate_count, 3);
        assert!((cfg.bias.weights.skew - 0.3).abs() < f64::EPSILON);
        assert!((cfg.bias.weights.danger - 0.2).abs() < f64::EPSILON);
        assert_eq!(cfg.bias.stale_after_secs, 120);
        assert!((cfg.bias.band_normal_vix - 22.0).abs() < f64::EPSILON);
        assert!((cfg.mtf.weak_threshold - 0.05).abs() < f64::EPSILON);
        assert_eq!(cfg.mtf.quality_bonus_tiers.len(), 3);
    }

    #[test]
    fn rejects_age_floor_outside_unit_range() {
        let mut cfg = EngineConfig::default();
        cfg.confluence.min_age_factor = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::OutOfUnitRange { name: "min_age_factor", .. })
        ));
        cfg.confluence.min_age_factor = 0.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_negative_touch_bonus_step() {
        let mut cfg = EngineConfig::default();
        cfg.confluence.touch_bonus_step = -0.1;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Negative { name: "touch_bonus_step", .. })
        ));
        cfg.confluence.touch_bonus_step = 0.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_tick_size() {
        let cfg = EngineConfig {
            tick_size: 0.0,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::TickSize(0.0)));
    }

    #[test]
    fn rejects_non_positive_tolerance() {
        let mut cfg = EngineConfig::default();
        cfg.confluence.tolerance_ticks = -1.0;
        assert_eq!(cfg.validate(), Err(ConfigError::Tolerance(-1.0)));
    }

    #[test]
    fn rejects_bad_smoothing_alpha() {
        let mut cfg = EngineConfig::default();
        cfg.bias.smoothing_alpha = 1.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::SmoothingAlpha(_))));
    }

    #[test]
    fn rejects_weight_band_not_summing_to_one() {
        let mut cfg = EngineConfig::default();
        cfg.mtf.low_vol_weights = vec![0.5, 0.5, 0.5, 0.0];
        assert!(matches!(cfg.validate(), Err(ConfigError::WeightBand { .. })));
    }

    #[test]
    fn rejects_weight_band_of_wrong_length() {
        let mut cfg = EngineConfig::default();
        cfg.mtf.high_vol_weights = vec![1.0];
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::WeightBandLength { expected: 4, got: 1, .. })
        ));
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = std::env::temp_dir().join(format!("confluence-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.json");

        let mut cfg = EngineConfig::default();
        cfg.symbol = "NQ".to_string();
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.symbol, "NQ");
        assert!((loaded.tick_size - cfg.tick_size).abs() < f64::EPSILON);
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_rejects_invalid_file() {
        let dir = std::env::temp_dir().join(format!("confluence-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.json");
        std::fs::write(&path, r#"{ "tick_size": -0.25 }"#).unwrap();

        assert!(EngineConfig::load(&path).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
