pub mod analyzer;
pub mod components;

pub use analyzer::{
    classify, ActiveLevel, BiasDirection, BiasStrength, BiasSummary, DealersBias, DealersBiasAnalyzer,
};
pub use components::BiasComponents;
