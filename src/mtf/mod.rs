pub mod fusion;
pub mod weights;

use serde::{Deserialize, Serialize};

pub use fusion::{
    FusionInterpretation, MtfFusion, MtfSignalComponent, MultiTimeframeFusionResult, QualityRating,
    SignalProvider, TimeframeBreakdown, TimeframeRecommendation,
};
pub use weights::{dynamic_weights, VolatilityBand};

/// Chart timeframes, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1min")]
    M1,
    #[serde(rename = "5min")]
    M5,
    #[serde(rename = "15min")]
    M15,
    #[serde(rename = "1hour")]
    H1,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1min",
            Self::M5 => "5min",
            Self::M15 => "15min",
            Self::H1 => "1hour",
        }
    }

    pub fn minutes(self) -> u32 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::H1 => 60,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
