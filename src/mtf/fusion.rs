// =============================================================================
// Multi-Timeframe Fusion — volatility-weighted signal confluence
// =============================================================================
//
//   base        = Σ(signal × confidence × weight) / Σweight
//   alignment   = +0.15 × confident / configured timeframes, when every
//                 confident timeframe (confidence > 0.6) agrees beyond ±0.2
//                 and there are >= 2
//   quality     = first tier cleared by the weighted mean of
//                 (pattern quality + completeness) / 2, by default
//                 0.12 / 0.08 / 0.04 above 0.8 / 0.7 / 0.6
//   divergence  = −0.2 when heavy timeframes (weight >= 0.3, confidence
//                 > 0.5) vote beyond +0.4 and below −0.4 at the same time
//   final       = clamp(base + alignment + quality − divergence, −1, 1)
//
// Sums run over timeframes with positive weight that produced a signal.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::mtf::weights::{dynamic_weights, volatility_band, VolatilityBand};
use crate::mtf::Timeframe;
use crate::runtime_config::{EngineConfig, MtfParams};

// =============================================================================
// Per-timeframe signal
// =============================================================================

/// One timeframe's directional reading.  Deserialised readings go through
/// [`MtfSignalComponent::new`] and are clamped like constructed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SignalRecord")]
pub struct MtfSignalComponent {
    pub timeframe: Timeframe,
    /// Direction and conviction in `[-1, 1]`.
    pub signal_strength: f64,
    pub confidence: f64,
    pub base_quality: f64,
    pub volume_confirmation: f64,
    /// Red-under-green confirmation pattern present.
    pub golden_rule: bool,
    pub pattern_completeness: f64,
}

/// Wire form of a reading before range clamping.
#[derive(Deserialize)]
struct SignalRecord {
    timeframe: Timeframe,
    signal_strength: f64,
    confidence: f64,
    base_quality: f64,
    volume_confirmation: f64,
    golden_rule: bool,
    pattern_completeness: f64,
}

impl From<SignalRecord> for MtfSignalComponent {
    fn from(r: SignalRecord) -> Self {
        Self::new(
            r.timeframe,
            r.signal_strength,
            r.confidence,
            r.base_quality,
            r.volume_confirmation,
            r.golden_rule,
            r.pattern_completeness,
        )
    }
}

fn unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn signed_unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

impl MtfSignalComponent {
    /// Build a component with an explicit confidence.  Inputs are clamped
    /// into range; non-finite values become 0.
    pub fn new(
        timeframe: Timeframe,
        signal_strength: f64,
        confidence: f64,
        base_quality: f64,
        volume_confirmation: f64,
        golden_rule: bool,
        pattern_completeness: f64,
    ) -> Self {
        Self {
            timeframe,
            signal_strength: signed_unit(signal_strength),
            confidence: unit(confidence),
            base_quality: unit(base_quality),
            volume_confirmation: unit(volume_confirmation),
            golden_rule,
            pattern_completeness: unit(pattern_completeness),
        }
    }

    /// Build a component deriving confidence from the pattern metrics: the
    /// mean of quality, volume confirmation and completeness, boosted when
    /// the golden rule holds and capped at 1.
    pub fn assess(
        timeframe: Timeframe,
        signal_strength: f64,
        base_quality: f64,
        volume_confirmation: f64,
        golden_rule: bool,
        pattern_completeness: f64,
        params: &MtfParams,
    ) -> Self {
        let mut component = Self::new(
            timeframe,
            signal_strength,
            0.0,
            base_quality,
            volume_confirmation,
            golden_rule,
            pattern_completeness,
        );
        let mut confidence = (component.base_quality
            + component.volume_confirmation
            + component.pattern_completeness)
            / 3.0;
        if golden_rule {
            confidence *= params.golden_rule_multiplier;
        }
        component.confidence = unit(confidence);
        component
    }

    /// Mean of pattern quality and completeness, used by the quality bonus.
    pub fn pattern_score(&self) -> f64 {
        (self.base_quality + self.pattern_completeness) / 2.0
    }

    pub fn quality_rating(&self) -> QualityRating {
        let avg = (self.base_quality + self.volume_confirmation + self.pattern_completeness) / 3.0;
        if avg > 0.8 {
            QualityRating::Excellent
        } else if avg > 0.6 {
            QualityRating::Good
        } else if avg > 0.4 {
            QualityRating::Fair
        } else {
            QualityRating::Poor
        }
    }

    pub fn recommendation(&self) -> TimeframeRecommendation {
        let s = self.signal_strength;
        let long = s > 0.0;
        if self.confidence > 0.7 && s.abs() > 0.5 {
            if long {
                TimeframeRecommendation::StrongLong
            } else {
                TimeframeRecommendation::StrongShort
            }
        } else if self.confidence > 0.5 && s.abs() > 0.3 {
            if long {
                TimeframeRecommendation::ModerateLong
            } else {
                TimeframeRecommendation::ModerateShort
            }
        } else {
            TimeframeRecommendation::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRating {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl std::fmt::Display for QualityRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "EXCELLENT"),
            Self::Good => write!(f, "GOOD"),
            Self::Fair => write!(f, "FAIR"),
            Self::Poor => write!(f, "POOR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeframeRecommendation {
    StrongLong,
    ModerateLong,
    Neutral,
    ModerateShort,
    StrongShort,
}

impl std::fmt::Display for TimeframeRecommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrongLong => write!(f, "STRONG LONG"),
            Self::ModerateLong => write!(f, "MODERATE LONG"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::ModerateShort => write!(f, "MODERATE SHORT"),
            Self::StrongShort => write!(f, "STRONG SHORT"),
        }
    }
}

// =============================================================================
// Signal providers
// =============================================================================

/// Source of per-timeframe readings.  Returning `None` leaves the timeframe
/// out of the fusion.
pub trait SignalProvider {
    fn signal(&self, timeframe: Timeframe) -> Option<MtfSignalComponent>;
}

impl SignalProvider for [MtfSignalComponent] {
    fn signal(&self, timeframe: Timeframe) -> Option<MtfSignalComponent> {
        self.iter().find(|s| s.timeframe == timeframe).cloned()
    }
}

impl SignalProvider for Vec<MtfSignalComponent> {
    fn signal(&self, timeframe: Timeframe) -> Option<MtfSignalComponent> {
        self.as_slice().signal(timeframe)
    }
}

impl SignalProvider for BTreeMap<Timeframe, MtfSignalComponent> {
    fn signal(&self, timeframe: Timeframe) -> Option<MtfSignalComponent> {
        self.get(&timeframe).cloned()
    }
}

impl SignalProvider for HashMap<Timeframe, MtfSignalComponent> {
    fn signal(&self, timeframe: Timeframe) -> Option<MtfSignalComponent> {
        self.get(&timeframe).cloned()
    }
}

// =============================================================================
// Result
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionInterpretation {
    Elite,
    Standard,
    Weak,
    Negative,
    NoConfluence,
}

impl std::fmt::Display for FusionInterpretation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Elite => write!(f, "ELITE"),
            Self::Standard => write!(f, "STANDARD"),
            Self::Weak => write!(f, "WEAK"),
            Self::Negative => write!(f, "NEGATIVE"),
            Self::NoConfluence => write!(f, "NONE"),
        }
    }
}

/// What one timeframe contributed to a fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeBreakdown {
    pub timeframe: Timeframe,
    pub weight: f64,
    /// `None` when the provider had no reading for this timeframe.
    pub signal: Option<MtfSignalComponent>,
    /// `signal × confidence × weight`, before normalisation.
    pub contribution: f64,
    pub quality_rating: Option<QualityRating>,
    pub recommendation: Option<TimeframeRecommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiTimeframeFusionResult {
    pub timestamp: DateTime<Utc>,
    pub volatility: f64,
    pub volatility_band: VolatilityBand,
    pub base_score: f64,
    pub alignment_bonus: f64,
    pub quality_bonus: f64,
    pub divergence_penalty: f64,
    pub final_score: f64,
    pub interpretation: FusionInterpretation,
    pub timeframes: Vec<TimeframeBreakdown>,
}

// =============================================================================
// Fusion steps
// =============================================================================

/// Weighted signals that take part in the fusion.
fn active<'a>(rows: &'a [TimeframeBreakdown]) -> impl Iterator<Item = (f64, &'a MtfSignalComponent)> + 'a {
    rows.iter()
        .filter(|r| r.weight > 0.0)
        .filter_map(|r| r.signal.as_ref().map(|s| (r.weight, s)))
}

fn base_score(rows: &[TimeframeBreakdown]) -> f64 {
    let (num, den) = active(rows).fold((0.0, 0.0), |(num, den), (w, s)| {
        (num + s.signal_strength * s.confidence * w, den + w)
    });
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

fn alignment_bonus(rows: &[TimeframeBreakdown], params: &MtfParams) -> f64 {
    let configured = params.timeframes.len().max(1);
    let confident: Vec<f64> = active(rows)
        .filter(|(_, s)| s.confidence > params.confident_threshold)
        .map(|(_, s)| s.signal_strength)
        .collect();
    if confident.len() < 2 {
        return 0.0;
    }
    let t = params.agreement_threshold;
    let all_long = confident.iter().all(|s| *s > t);
    let all_short = confident.iter().all(|s| *s < -t);
    if all_long || all_short {
        params.alignment_bonus * confident.len() as f64 / configured as f64
    } else {
        0.0
    }
}

fn quality_bonus(rows: &[TimeframeBreakdown], params: &MtfParams) -> f64 {
    let (num, den) = active(rows).fold((0.0, 0.0), |(num, den), (w, s)| (num + s.pattern_score() * w, den + w));
    if den <= 0.0 {
        return 0.0;
    }
    let avg = num / den;
    params
        .quality_bonus_tiers
        .iter()
        .find(|tier| avg > tier.above)
        .map_or(0.0, |tier| tier.bonus)
}

fn divergence_penalty(rows: &[TimeframeBreakdown], params: &MtfParams) -> f64 {
    let heavy: Vec<f64> = active(rows)
        .filter(|(w, s)| *w >= params.divergence_min_weight && s.confidence > params.divergence_min_confidence)
        .map(|(_, s)| s.signal_strength)
        .collect();
    if heavy.len() < 2 {
        return 0.0;
    }
    let t = params.divergence_signal;
    let long = heavy.iter().any(|s| *s > t);
    let short = heavy.iter().any(|s| *s < -t);
    if long && short {
        params.divergence_penalty
    } else {
        0.0
    }
}

pub fn interpret(score: f64, params: &MtfParams) -> FusionInterpretation {
    if score > params.elite_threshold {
        FusionInterpretation::Elite
    } else if score > params.standard_threshold {
        FusionInterpretation::Standard
    } else if score > params.weak_threshold {
        FusionInterpretation::Weak
    } else if score < -params.weak_threshold {
        FusionInterpretation::Negative
    } else {
        FusionInterpretation::NoConfluence
    }
}

// =============================================================================
// MtfFusion
// =============================================================================

/// Stateless fusion engine over validated parameters.
pub struct MtfFusion {
    params: MtfParams,
}

impl MtfFusion {
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(timeframes = config.mtf.timeframes.len(), "multi-timeframe fusion ready");
        Ok(Self {
            params: config.mtf.clone(),
        })
    }

    pub fn params(&self) -> &MtfParams {
        &self.params
    }

    /// Fuse whatever readings `provider` has for the configured timeframes.
    pub fn fuse<P>(&self, volatility: f64, provider: &P) -> MultiTimeframeFusionResult
    where
        P: SignalProvider + ?Sized,
    {
        let rows: Vec<TimeframeBreakdown> = dynamic_weights(volatility, &self.params)
            .into_iter()
            .map(|(timeframe, weight)| {
                let signal = provider.signal(timeframe);
                let contribution = signal
                    .as_ref()
                    .map(|s| s.signal_strength * s.confidence * weight)
                    .unwrap_or(0.0);
                TimeframeBreakdown {
                    timeframe,
                    weight,
                    quality_rating: signal.as_ref().map(|s| s.quality_rating()),
                    recommendation: signal.as_ref().map(|s| s.recommendation()),
                    signal,
                    contribution,
                }
            })
            .collect();

        let base_score = base_score(&rows);
        let alignment_bonus = alignment_bonus(&rows, &self.params);
        let quality_bonus = quality_bonus(&rows, &self.params);
        let divergence_penalty = divergence_penalty(&rows, &self.params);
        let final_score = (base_score + alignment_bonus + quality_bonus - divergence_penalty).clamp(-1.0, 1.0);
        let interpretation = interpret(final_score, &self.params);

        debug!(
            volatility = format!("{:.3}", volatility),
            base = format!("{:.3}", base_score),
            alignment = format!("{:.3}", alignment_bonus),
            quality = format!("{:.3}", quality_bonus),
            divergence = format!("{:.3}", divergence_penalty),
            fused = format!("{:.3}", final_score),
            interpretation = %interpretation,
            "Multi-timeframe fusion"
        );

        MultiTimeframeFusionResult {
            timestamp: Utc::now(),
            volatility,
            volatility_band: volatility_band(volatility, &self.params),
            base_score,
            alignment_bonus,
            quality_bonus,
            divergence_penalty,
            final_score,
            interpretation,
            timeframes: rows,
        }
    }
}
