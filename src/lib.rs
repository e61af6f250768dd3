// =============================================================================
// Level Confluence Engine
// =============================================================================
//
// Fuses heterogeneous price levels into confluence zones, a dealer-positioning
// bias and an optional multi-timeframe confirmation score.  All inputs are
// in-memory records; the core performs no I/O beyond config and snapshot
// loading helpers.

pub mod bias;
pub mod confluence;
pub mod error;
pub mod levels;
pub mod mtf;
pub mod runtime_config;
pub mod snapshot;
pub mod types;

pub use bias::{DealersBias, DealersBiasAnalyzer};
pub use confluence::{ConfluenceAnalysis, ConfluenceAnalyzer, ConfluenceZone};
pub use error::ConfigError;
pub use levels::{DealerLevels, LevelSources};
pub use mtf::{MtfFusion, MtfSignalComponent, MultiTimeframeFusionResult, Timeframe};
pub use runtime_config::EngineConfig;
pub use snapshot::MarketSnapshot;
pub use types::{LevelSource, PriceLevel, ZoneDirection, ZoneQuality};
