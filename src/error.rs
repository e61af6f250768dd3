// =============================================================================
// Engine errors
// =============================================================================
//
// Only configuration problems surface as errors. Malformed or missing level
// data is dropped or degraded to neutral defaults inside the pipeline.

use thiserror::Error;

/// Invalid configuration, detected once at analyzer construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("tick size must be positive and finite, got {0}")]
    TickSize(f64),

    #[error("clustering tolerance must be positive and finite, got {0} ticks")]
    Tolerance(f64),

    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("{name} must lie in [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("{name} must be non-negative, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("smoothing alpha must lie in (0, 1], got {0}")]
    SmoothingAlpha(f64),

    #[error("bias weight `{name}` must be non-negative, got {value}")]
    NegativeWeight { name: &'static str, value: f64 },

    #[error("bias weights sum to zero")]
    ZeroWeights,

    #[error("timeframe weight band `{band}` sums to {sum}, expected 1.0")]
    WeightBand { band: &'static str, sum: f64 },

    #[error("timeframe weight band `{band}` has {got} weights for {expected} timeframes")]
    WeightBandLength {
        band: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("volatility thresholds inverted: high {high} must exceed normal {normal}")]
    VolatilityBands { high: f64, normal: f64 },

    #[error("no timeframes configured for fusion")]
    NoTimeframes,
}
