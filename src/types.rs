// =============================================================================
// Shared types used across the confluence engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Every category of price level the engine knows how to weigh.
///
/// Per-source behaviour (source weight, maximum age) lives in lookup methods
/// on the enum rather than in scattered constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelSource {
    // --- Derived option pricing ----------------------------------------------
    GammaCallWall,
    GammaPutWall,
    GammaFlip,

    // --- Session volume profile ----------------------------------------------
    Poc,
    ValueAreaHigh,
    ValueAreaLow,
    PrevPoc,
    PrevValueAreaHigh,
    PrevValueAreaLow,

    // --- Moving-average bands --------------------------------------------------
    Vwap,
    VwapUpper1,
    VwapLower1,
    VwapUpper2,
    VwapLower2,

    VolumeNode,

    // --- Session statistics ----------------------------------------------------
    SessionHigh,
    SessionLow,
    OvernightHigh,
    OvernightLow,

    RoundNumber,
    Psychological,

    // --- Externally supplied dealer levels ---------------------------------------
    DealerCallResistance,
    DealerPutSupport,
    DealerHvl,
    DealerDayMin,
    DealerDayMax,
    DealerCallResistance0dte,
    DealerPutSupport0dte,
    DealerHvl0dte,
    DealerGammaWall0dte,
    DealerGex,
    DealerBlindSpot,
    DealerSwing,
}

impl LevelSource {
    /// Prior reflecting how predictive this category is assumed to be.
    pub fn weight(self) -> f64 {
        match self {
            Self::GammaCallWall | Self::GammaPutWall => 1.0,
            Self::GammaFlip => 0.9,

            Self::Poc => 0.9,
            Self::ValueAreaHigh | Self::ValueAreaLow => 0.8,
            Self::PrevPoc => 0.7,
            Self::PrevValueAreaHigh | Self::PrevValueAreaLow => 0.6,

            Self::Vwap => 0.8,
            Self::VwapUpper1 | Self::VwapLower1 => 0.7,
            Self::VwapUpper2 | Self::VwapLower2 => 0.6,

            Self::VolumeNode => 0.6,

            Self::SessionHigh | Self::SessionLow => 0.5,
            Self::OvernightHigh | Self::OvernightLow => 0.4,

            Self::RoundNumber => 0.3,
            Self::Psychological => 0.2,

            Self::DealerCallResistance | Self::DealerPutSupport => 0.95,
            Self::DealerHvl => 0.90,
            Self::DealerDayMin | Self::DealerDayMax => 0.85,
            Self::DealerCallResistance0dte
            | Self::DealerPutSupport0dte
            | Self::DealerGammaWall0dte => 0.90,
            Self::DealerHvl0dte => 0.85,
            Self::DealerGex => 0.85,
            Self::DealerBlindSpot => 0.80,
            Self::DealerSwing => 0.75,
        }
    }

    /// Maximum age in minutes before a level of this category is discarded.
    /// `None` means the level never goes stale.
    pub fn max_age_minutes(self) -> Option<f64> {
        match self {
            Self::GammaCallWall | Self::GammaPutWall => Some(480.0),
            Self::GammaFlip => Some(720.0),
            Self::RoundNumber | Self::Psychological => None,
            _ => Some(1440.0),
        }
    }

    /// True for levels tied to same-day option expiry.
    pub fn is_zero_dte(self) -> bool {
        matches!(
            self,
            Self::DealerCallResistance0dte
                | Self::DealerPutSupport0dte
                | Self::DealerHvl0dte
                | Self::DealerGammaWall0dte
        )
    }

    /// True for levels handed in by the external dealer-positioning feed.
    pub fn is_dealer(self) -> bool {
        matches!(
            self,
            Self::DealerCallResistance
                | Self::DealerPutSupport
                | Self::DealerHvl
                | Self::DealerDayMin
                | Self::DealerDayMax
                | Self::DealerCallResistance0dte
                | Self::DealerPutSupport0dte
                | Self::DealerHvl0dte
                | Self::DealerGammaWall0dte
                | Self::DealerGex
                | Self::DealerBlindSpot
                | Self::DealerSwing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GammaCallWall => "gamma_call_wall",
            Self::GammaPutWall => "gamma_put_wall",
            Self::GammaFlip => "gamma_flip",
            Self::Poc => "poc",
            Self::ValueAreaHigh => "vah",
            Self::ValueAreaLow => "val",
            Self::PrevPoc => "ppoc",
            Self::PrevValueAreaHigh => "pvah",
            Self::PrevValueAreaLow => "pval",
            Self::Vwap => "vwap",
            Self::VwapUpper1 => "vwap_sd1_up",
            Self::VwapLower1 => "vwap_sd1_down",
            Self::VwapUpper2 => "vwap_sd2_up",
            Self::VwapLower2 => "vwap_sd2_down",
            Self::VolumeNode => "volume_node",
            Self::SessionHigh => "session_high",
            Self::SessionLow => "session_low",
            Self::OvernightHigh => "overnight_high",
            Self::OvernightLow => "overnight_low",
            Self::RoundNumber => "round_number",
            Self::Psychological => "psychological",
            Self::DealerCallResistance => "dealer_call_resistance",
            Self::DealerPutSupport => "dealer_put_support",
            Self::DealerHvl => "dealer_hvl",
            Self::DealerDayMin => "dealer_1d_min",
            Self::DealerDayMax => "dealer_1d_max",
            Self::DealerCallResistance0dte => "dealer_call_resistance_0dte",
            Self::DealerPutSupport0dte => "dealer_put_support_0dte",
            Self::DealerHvl0dte => "dealer_hvl_0dte",
            Self::DealerGammaWall0dte => "dealer_gamma_wall_0dte",
            Self::DealerGex => "dealer_gex",
            Self::DealerBlindSpot => "dealer_blind_spot",
            Self::DealerSwing => "dealer_swing",
        }
    }
}

impl std::fmt::Display for LevelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single price point with its metadata. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub source: LevelSource,
    /// Source-defined prior in `[0, 1]`.
    pub base_strength: f64,
    /// Minutes since the level was observed.
    pub age_minutes: f64,
    /// Times price has revisited the level.
    pub touch_count: u32,
}

impl PriceLevel {
    /// Build a level, rejecting non-finite or non-positive prices.
    ///
    /// `base_strength` is clamped into `[0, 1]` and a negative or non-finite
    /// age is treated as fresh.
    pub fn new(
        price: f64,
        source: LevelSource,
        base_strength: f64,
        age_minutes: f64,
        touch_count: u32,
    ) -> Option<Self> {
        if !price.is_finite() || price <= 0.0 {
            return None;
        }
        let base_strength = if base_strength.is_finite() {
            base_strength.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let age_minutes = if age_minutes.is_finite() && age_minutes > 0.0 {
            age_minutes
        } else {
            0.0
        };
        Some(Self {
            price,
            source,
            base_strength,
            age_minutes,
            touch_count,
        })
    }

    /// Whether the level is still inside its category's age limit.
    pub fn is_fresh(&self) -> bool {
        match self.source.max_age_minutes() {
            Some(max_age) => self.age_minutes <= max_age,
            None => true,
        }
    }
}

/// Quality class of a confluence zone, ordered weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneQuality {
    Weak,
    Moderate,
    Strong,
    Extreme,
}

impl ZoneQuality {
    /// Multiplier applied by the proximity score.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Extreme => 1.0,
            Self::Strong => 0.8,
            Self::Moderate => 0.6,
            Self::Weak => 0.4,
        }
    }
}

impl std::fmt::Display for ZoneQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weak => write!(f, "WEAK"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::Strong => write!(f, "STRONG"),
            Self::Extreme => write!(f, "EXTREME"),
        }
    }
}

/// Side of the reference price a zone sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneDirection {
    Support,
    Resistance,
    Neutral,
}

impl std::fmt::Display for ZoneDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Support => write!(f, "SUPPORT"),
            Self::Resistance => write!(f, "RESISTANCE"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_price() {
        assert!(PriceLevel::new(0.0, LevelSource::Poc, 0.8, 0.0, 0).is_none());
        assert!(PriceLevel::new(-4500.0, LevelSource::Poc, 0.8, 0.0, 0).is_none());
        assert!(PriceLevel::new(f64::NAN, LevelSource::Poc, 0.8, 0.0, 0).is_none());
    }

    #[test]
    fn clamps_strength_and_age() {
        let level = PriceLevel::new(4500.0, LevelSource::Vwap, 1.7, -5.0, 2).unwrap();
        assert!((level.base_strength - 1.0).abs() < f64::EPSILON);
        assert!(level.age_minutes.abs() < f64::EPSILON);
    }

    #[test]
    fn round_numbers_never_go_stale() {
        let level = PriceLevel::new(4500.0, LevelSource::RoundNumber, 0.3, 1e7, 0).unwrap();
        assert!(level.is_fresh());
        let wall = PriceLevel::new(4500.0, LevelSource::GammaCallWall, 0.9, 481.0, 0).unwrap();
        assert!(!wall.is_fresh());
    }

    #[test]
    fn source_weights_span_expected_range() {
        assert!((LevelSource::Psychological.weight() - 0.2).abs() < f64::EPSILON);
        assert!((LevelSource::GammaCallWall.weight() - 1.0).abs() < f64::EPSILON);
        assert!(LevelSource::DealerGammaWall0dte.weight() >= 0.9);
        assert!(LevelSource::DealerGammaWall0dte.is_zero_dte());
        assert!(!LevelSource::DealerGex.is_zero_dte());
    }

    #[test]
    fn quality_orders_weakest_first() {
        assert!(ZoneQuality::Weak < ZoneQuality::Moderate);
        assert!(ZoneQuality::Strong < ZoneQuality::Extreme);
        assert_eq!(format!("{}", ZoneQuality::Extreme), "EXTREME");
        assert_eq!(format!("{}", ZoneDirection::Support), "SUPPORT");
    }
}
