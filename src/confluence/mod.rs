pub mod analyzer;
pub mod cluster;
pub mod dealer_band;
pub mod query;
pub mod scoring;

pub use analyzer::{
    build_analysis, AnalyzerStats, ConfluenceAnalysis, ConfluenceAnalyzer, ConfluenceSummary, ZoneRef,
};
pub use cluster::{cluster_levels, ConfluenceZone};
pub use dealer_band::{dealer_confluence_score, DealerConfluence};
