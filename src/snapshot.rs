// =============================================================================
// Market Snapshot — one pipeline input as handed in by the adapters
// =============================================================================
//
// The runner reads this record from disk on every tick.  Everything except the
// reference price is optional; missing parts degrade to neutral results.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::levels::{DealerLevels, LevelSources};
use crate::mtf::MtfSignalComponent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Overrides the configured symbol when set.
    #[serde(default)]
    pub symbol: Option<String>,

    pub reference_price: f64,

    /// Volatility index level for the bias composite.
    #[serde(default)]
    pub vix: Option<f64>,

    /// Normalised realized volatility (0..1) for timeframe weighting.
    #[serde(default)]
    pub realized_volatility: Option<f64>,

    #[serde(default)]
    pub levels: LevelSources,

    #[serde(default)]
    pub timeframe_signals: Vec<MtfSignalComponent>,
}

impl MarketSnapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot from {}", path.display()))?;

        let snapshot: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse snapshot from {}", path.display()))?;

        ensure!(
            snapshot.reference_price.is_finite() && snapshot.reference_price > 0.0,
            "snapshot {} has invalid reference price {}",
            path.display(),
            snapshot.reference_price
        );

        debug!(
            path = %path.display(),
            reference_price = snapshot.reference_price,
            signals = snapshot.timeframe_signals.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Dealer levels, or an empty set when the feed is absent.
    pub fn dealer_levels(&self) -> DealerLevels {
        self.levels.dealer.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtf::Timeframe;

    #[test]
    fn parses_a_full_snapshot() {
        let json = r#"{
            "symbol": "ESZ5",
            "reference_price": 5300.25,
            "vix": 17.5,
            "realized_volatility": 0.55,
            "levels": {
                "gamma": { "call_wall": 5320.0, "put_wall": { "price": 5280.0, "age_minutes": 30 } },
                "market_profile": { "poc": 5301.0 },
                "volume_nodes": [5298.5, { "price": 5305.0, "touches": 4 }],
                "dealer": {
                    "call_resistance": 5310.0,
                    "hvl": 5295.0,
                    "blind_spots": { "BL 1": 5302.0 },
                    "last_update": "2026-10-18T14:30:00Z"
                }
            },
            "timeframe_signals": [
                { "timeframe": "1min", "signal_strength": 0.4, "confidence": 0.7,
                  "base_quality": 0.6, "volume_confirmation": 0.5,
                  "golden_rule": false, "pattern_completeness": 0.8 }
            ]
        }"#;
        let snap: MarketSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.symbol.as_deref(), Some("ESZ5"));
        assert_eq!(snap.levels.volume_nodes.as_ref().map(Vec::len), Some(2));
        assert_eq!(snap.dealer_levels().hvl, Some(5295.0));
        assert!(snap.dealer_levels().last_update.is_some());
        assert_eq!(snap.timeframe_signals[0].timeframe, Timeframe::M1);
    }

    #[test]
    fn out_of_range_signals_are_clamped_on_load() {
        let json = r#"{
            "reference_price": 5300.0,
            "timeframe_signals": [
                { "timeframe": "5min", "signal_strength": 1.8, "confidence": 1.4,
                  "base_quality": -0.2, "volume_confirmation": 0.5,
                  "golden_rule": true, "pattern_completeness": 2.0 }
            ]
        }"#;
        let snap: MarketSnapshot = serde_json::from_str(json).unwrap();
        let s = &snap.timeframe_signals[0];
        assert!((s.signal_strength - 1.0).abs() < f64::EPSILON);
        assert!((s.confidence - 1.0).abs() < f64::EPSILON);
        assert!(s.base_quality.abs() < f64::EPSILON);
        assert!((s.pattern_completeness - 1.0).abs() < f64::EPSILON);
        assert!((s.volume_confirmation - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn minimal_snapshot_only_needs_a_price() {
        let snap: MarketSnapshot = serde_json::from_str(r#"{ "reference_price": 5300.0 }"#).unwrap();
        assert!(snap.vix.is_none());
        assert!(snap.levels.gamma.is_none());
        assert_eq!(snap.dealer_levels(), DealerLevels::default());
    }

    #[test]
    fn load_rejects_missing_file_and_bad_price() {
        let dir = std::env::temp_dir().join(format!("snapshot-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        assert!(MarketSnapshot::load(dir.join("missing.json")).is_err());

        let path = dir.join("bad.json");
        std::fs::write(&path, r#"{ "reference_price": -1.0 }"#).unwrap();
        assert!(MarketSnapshot::load(&path).is_err());

        let path = dir.join("good.json");
        std::fs::write(&path, r#"{ "reference_price": 5300.0 }"#).unwrap();
        assert!(MarketSnapshot::load(&path).is_ok());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
