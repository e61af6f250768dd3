// =============================================================================
// Dealer Levels — Externally supplied options-positioning levels
// =============================================================================
//
// The dealer feed hands in five categories of levels:
//
//   resistance  call resistance, 0DTE call resistance, 0DTE gamma wall
//   support     put support, 0DTE put support, HVL, 0DTE HVL
//   danger      blind spots (BL 1..BL 10)
//   reversal    swing levels (SG1..SG9)
//   skew        gamma-exposure levels (GEX 1..GEX 10)
//
// plus the prior-day range.  Any field may be missing; missing or
// non-positive prices are ignored everywhere downstream.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::{LevelSource, PriceLevel};

/// Base strength of dealer gamma levels in the confluence map.
const GAMMA_STRENGTH: f64 = 0.9;
/// Blind spots are strong but double as danger markers.
const BLIND_SPOT_STRENGTH: f64 = 0.8;
const SWING_STRENGTH: f64 = 0.75;

/// Which bias input a dealer level feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealerCategory {
    Resistance,
    Support,
    Danger,
    Reversal,
    Skew,
}

impl DealerCategory {
    pub const ALL: [DealerCategory; 5] = [
        Self::Resistance,
        Self::Support,
        Self::Danger,
        Self::Reversal,
        Self::Skew,
    ];
}

impl std::fmt::Display for DealerCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resistance => write!(f, "resistance"),
            Self::Support => write!(f, "support"),
            Self::Danger => write!(f, "danger"),
            Self::Reversal => write!(f, "reversal"),
            Self::Skew => write!(f, "skew"),
        }
    }
}

fn valid_price(price: Option<f64>) -> Option<f64> {
    price.filter(|p| p.is_finite() && *p > 0.0)
}

/// One dealer-feed snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealerLevels {
    #[serde(default)]
    pub call_resistance: Option<f64>,
    #[serde(default)]
    pub call_resistance_0dte: Option<f64>,
    #[serde(default)]
    pub gamma_wall_0dte: Option<f64>,
    #[serde(default)]
    pub put_support: Option<f64>,
    #[serde(default)]
    pub put_support_0dte: Option<f64>,
    #[serde(default)]
    pub hvl: Option<f64>,
    #[serde(default)]
    pub hvl_0dte: Option<f64>,
    #[serde(default)]
    pub day_min: Option<f64>,
    #[serde(default)]
    pub day_max: Option<f64>,
    /// Gamma-exposure levels keyed by label ("GEX 1").
    #[serde(default)]
    pub gex: BTreeMap<String, Option<f64>>,
    /// Blind spots keyed by label ("BL 1").
    #[serde(default)]
    pub blind_spots: BTreeMap<String, Option<f64>>,
    /// Swing levels keyed by label ("SG1").
    #[serde(default)]
    pub swing: BTreeMap<String, Option<f64>>,
    /// When the feed last refreshed these levels.
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

impl DealerLevels {
    /// Build from flat `(label, price)` pairs as exported by the chart dumper,
    /// e.g. `call_resistance_0dte`, `gex_3`, `blind_spot_2`, `swing_lvl_7`.
    ///
    /// Unknown labels and non-positive prices are skipped.
    pub fn from_labeled<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut levels = Self::default();
        for (label, price) in pairs {
            if valid_price(Some(price)).is_none() {
                continue;
            }
            let label = label.trim().to_ascii_lowercase();
            let zero_dte = label.contains("0dte");

            if label.contains("call_resistance") {
                if zero_dte {
                    levels.call_resistance_0dte = Some(price);
                } else {
                    levels.call_resistance = Some(price);
                }
            } else if label.contains("put_support") {
                if zero_dte {
                    levels.put_support_0dte = Some(price);
                } else {
                    levels.put_support = Some(price);
                }
            } else if label.contains("hvl") {
                if zero_dte {
                    levels.hvl_0dte = Some(price);
                } else {
                    levels.hvl = Some(price);
                }
            } else if label.contains("gamma_wall") {
                levels.gamma_wall_0dte = Some(price);
            } else if label.contains("1d_max") {
                levels.day_max = Some(price);
            } else if label.contains("1d_min") {
                levels.day_min = Some(price);
            } else if let Some(n) = label.strip_prefix("gex_") {
                levels.gex.insert(format!("GEX {n}"), Some(price));
            } else if let Some(n) = label.strip_prefix("blind_spot_") {
                levels.blind_spots.insert(format!("BL {n}"), Some(price));
            } else if let Some(n) = label.strip_prefix("swing_lvl_") {
                levels.swing.insert(format!("SG{n}"), Some(price));
            } else {
                trace!(label = %label, "unknown dealer level label ignored");
            }
        }
        levels
    }

    /// Valid levels of one category, with their labels.
    pub fn labeled(&self, category: DealerCategory) -> Vec<(String, f64)> {
        let fixed = |pairs: &[(&str, Option<f64>)]| -> Vec<(String, f64)> {
            pairs
                .iter()
                .filter_map(|(label, price)| valid_price(*price).map(|p| (label.to_string(), p)))
                .collect()
        };
        let mapped = |map: &BTreeMap<String, Option<f64>>| -> Vec<(String, f64)> {
            map.iter()
                .filter_map(|(label, price)| valid_price(*price).map(|p| (label.clone(), p)))
                .collect()
        };

        match category {
            DealerCategory::Resistance => fixed(&[
                ("call_resistance", self.call_resistance),
                ("call_resistance_0dte", self.call_resistance_0dte),
                ("gamma_wall_0dte", self.gamma_wall_0dte),
            ]),
            DealerCategory::Support => fixed(&[
                ("put_support", self.put_support),
                ("put_support_0dte", self.put_support_0dte),
                ("hvl", self.hvl),
                ("hvl_0dte", self.hvl_0dte),
            ]),
            DealerCategory::Danger => mapped(&self.blind_spots),
            DealerCategory::Reversal => mapped(&self.swing),
            DealerCategory::Skew => mapped(&self.gex),
        }
    }

    /// Valid prices of one category.
    pub fn prices(&self, category: DealerCategory) -> Vec<f64> {
        self.labeled(category).into_iter().map(|(_, p)| p).collect()
    }

    /// Number of valid levels across the five bias categories.
    pub fn level_count(&self) -> usize {
        DealerCategory::ALL
            .iter()
            .map(|c| self.labeled(*c).len())
            .sum()
    }

    /// Number of bias categories holding at least one valid level.
    pub fn category_count(&self) -> usize {
        DealerCategory::ALL
            .iter()
            .filter(|c| !self.labeled(**c).is_empty())
            .count()
    }

    /// Convert into confluence levels.  Dealer levels are always fresh.
    pub fn to_price_levels(&self) -> Vec<PriceLevel> {
        let fixed = [
            (self.call_resistance, LevelSource::DealerCallResistance),
            (self.put_support, LevelSource::DealerPutSupport),
            (self.hvl, LevelSource::DealerHvl),
            (self.day_min, LevelSource::DealerDayMin),
            (self.day_max, LevelSource::DealerDayMax),
            (self.call_resistance_0dte, LevelSource::DealerCallResistance0dte),
            (self.put_support_0dte, LevelSource::DealerPutSupport0dte),
            (self.hvl_0dte, LevelSource::DealerHvl0dte),
            (self.gamma_wall_0dte, LevelSource::DealerGammaWall0dte),
        ];

        let mut out: Vec<PriceLevel> = fixed
            .iter()
            .filter_map(|(price, source)| {
                valid_price(*price).and_then(|p| PriceLevel::new(p, *source, GAMMA_STRENGTH, 0.0, 0))
            })
            .collect();

        let keyed = [
            (DealerCategory::Skew, LevelSource::DealerGex, GAMMA_STRENGTH),
            (DealerCategory::Danger, LevelSource::DealerBlindSpot, BLIND_SPOT_STRENGTH),
            (DealerCategory::Reversal, LevelSource::DealerSwing, SWING_STRENGTH),
        ];
        for (category, source, strength) in keyed {
            out.extend(
                self.prices(category)
                    .into_iter()
                    .filter_map(|p| PriceLevel::new(p, source, strength, 0.0, 0)),
            );
        }
        out
    }

    /// Seconds since the feed last refreshed, if known.
    pub fn age_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_update
            .map(|ts| (now - ts).num_seconds().max(0))
    }
}
