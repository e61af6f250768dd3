pub mod dealer;
pub mod ingest;

pub use dealer::{DealerCategory, DealerLevels};
pub use ingest::{
    ingest, normalize_levels, round_number_levels, LevelSources, RawLevel, SourcePayload,
};
