// =============================================================================
// Level Ingestion — Validate, tag and age levels from every source
// =============================================================================
//
// Each source adapter hands in a payload of named fields.  Every field maps to
// one `LevelSource` with default strength / age / touch metadata that the
// payload may override.  Candidates are then filtered:
//
//   - price must be finite and > 0
//   - |price - reference| must not exceed `max_level_distance`
//   - age must not exceed the category's maximum age
//
// and the survivors are returned sorted by price.  Missing sources, unknown
// field names and malformed entries are dropped without error.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, trace};

use crate::levels::dealer::DealerLevels;
use crate::runtime_config::ConfluenceParams;
use crate::types::{LevelSource, PriceLevel};

// =============================================================================
// Raw payload types
// =============================================================================

/// One raw field from a source adapter.
///
/// Deserialises from a bare number (`4502.5`), from an object
/// (`{"price": 4502.5, "age_minutes": 30, "touches": 2}`) or from anything
/// else, in which case the entry carries no price and is dropped later.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawLevel {
    pub price: Option<f64>,
    pub age_minutes: Option<f64>,
    pub touches: Option<u32>,
    pub strength: Option<f64>,
}

impl RawLevel {
    pub fn at(price: f64) -> Self {
        Self {
            price: Some(price),
            ..Self::default()
        }
    }

    pub fn with_age(mut self, age_minutes: f64) -> Self {
        self.age_minutes = Some(age_minutes);
        self
    }

    pub fn with_touches(mut self, touches: u32) -> Self {
        self.touches = Some(touches);
        self
    }
}

impl From<f64> for RawLevel {
    fn from(price: f64) -> Self {
        Self::at(price)
    }
}

#[derive(Deserialize)]
struct DetailedLevel {
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    age_minutes: Option<f64>,
    #[serde(default)]
    touches: Option<u32>,
    #[serde(default)]
    strength: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLevelRepr {
    Bare(f64),
    Detailed(DetailedLevel),
    Malformed(serde_json::Value),
}

impl<'de> Deserialize<'de> for RawLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawLevelRepr::deserialize(deserializer)? {
            RawLevelRepr::Bare(price) => RawLevel::at(price),
            RawLevelRepr::Detailed(d) => RawLevel {
                price: d.price,
                age_minutes: d.age_minutes,
                touches: d.touches,
                strength: d.strength,
            },
            RawLevelRepr::Malformed(value) => {
                trace!(%value, "malformed raw level dropped");
                RawLevel::default()
            }
        })
    }
}

/// Named fields of one source, e.g. `{"poc": 4502.0, "vah": 4515.0}`.
pub type SourcePayload = BTreeMap<String, RawLevel>;

/// Everything the adapters delivered for one analysis call.  Every source is
/// optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelSources {
    /// Derived option-pricing levels: `call_wall`, `put_wall`, `gamma_flip`.
    #[serde(default)]
    pub gamma: Option<SourcePayload>,
    /// Volume profile: `poc`, `vah`, `val`, `ppoc`, `pvah`, `pval`.
    #[serde(default)]
    pub market_profile: Option<SourcePayload>,
    /// Moving-average bands: `vwap`, `vwap_sd1_up`, `vwap_sd1_down`, ...
    #[serde(default)]
    pub vwap: Option<SourcePayload>,
    /// High-volume nodes.
    #[serde(default)]
    pub volume_nodes: Option<Vec<RawLevel>>,
    /// Session statistics: `session_high`, `session_low`, `overnight_*`.
    #[serde(default)]
    pub session: Option<SourcePayload>,
    /// Externally supplied dealer levels.
    #[serde(default)]
    pub dealer: Option<DealerLevels>,
}

// =============================================================================
// Field tables
// =============================================================================

/// Extraction defaults for one named field.
struct FieldSpec {
    name: &'static str,
    source: LevelSource,
    strength: f64,
    age_minutes: f64,
    touches: u32,
}

const fn field(
    name: &'static str,
    source: LevelSource,
    strength: f64,
    age_minutes: f64,
    touches: u32,
) -> FieldSpec {
    FieldSpec {
        name,
        source,
        strength,
        age_minutes,
        touches,
    }
}

const GAMMA_FIELDS: &[FieldSpec] = &[
    field("call_wall", LevelSource::GammaCallWall, 0.9, 60.0, 0),
    field("put_wall", LevelSource::GammaPutWall, 0.9, 60.0, 0),
    field("gamma_flip", LevelSource::GammaFlip, 0.8, 120.0, 0),
];

const PROFILE_FIELDS: &[FieldSpec] = &[
    field("poc", LevelSource::Poc, 0.8, 180.0, 1),
    field("vah", LevelSource::ValueAreaHigh, 0.7, 180.0, 0),
    field("val", LevelSource::ValueAreaLow, 0.7, 180.0, 0),
    field("ppoc", LevelSource::PrevPoc, 0.6, 1440.0, 2),
    field("pvah", LevelSource::PrevValueAreaHigh, 0.5, 1440.0, 1),
    field("pval", LevelSource::PrevValueAreaLow, 0.5, 1440.0, 1),
];

const VWAP_FIELDS: &[FieldSpec] = &[
    field("vwap", LevelSource::Vwap, 0.7, 300.0, 3),
    field("vwap_sd1_up", LevelSource::VwapUpper1, 0.6, 300.0, 1),
    field("vwap_sd1_down", LevelSource::VwapLower1, 0.6, 300.0, 1),
    field("vwap_sd2_up", LevelSource::VwapUpper2, 0.5, 300.0, 0),
    field("vwap_sd2_down", LevelSource::VwapLower2, 0.5, 300.0, 0),
];

const SESSION_FIELDS: &[FieldSpec] = &[
    field("session_high", LevelSource::SessionHigh, 0.4, 240.0, 1),
    field("session_low", LevelSource::SessionLow, 0.4, 240.0, 1),
    field("overnight_high", LevelSource::OvernightHigh, 0.3, 600.0, 1),
    field("overnight_low", LevelSource::OvernightLow, 0.3, 600.0, 1),
];

const VOLUME_NODE: FieldSpec = field("volume_node", LevelSource::VolumeNode, 0.5, 360.0, 2);

fn build_level(raw: &RawLevel, spec: &FieldSpec) -> Option<PriceLevel> {
    PriceLevel::new(
        raw.price?,
        spec.source,
        raw.strength.unwrap_or(spec.strength),
        raw.age_minutes.unwrap_or(spec.age_minutes),
        raw.touches.unwrap_or(spec.touches),
    )
}

fn extract_payload(payload: &SourcePayload, specs: &[FieldSpec], out: &mut Vec<PriceLevel>) {
    for (name, raw) in payload {
        match specs.iter().find(|s| s.name == name.as_str()) {
            Some(spec) => {
                if let Some(level) = build_level(raw, spec) {
                    out.push(level);
                } else {
                    trace!(field = %name, "raw level without valid price dropped");
                }
            }
            None => trace!(field = %name, "unknown level field ignored"),
        }
    }
}

impl LevelSources {
    /// All candidate levels before validation, in source order.
    pub fn candidates(&self) -> Vec<PriceLevel> {
        let mut out = Vec::new();
        if let Some(gamma) = &self.gamma {
            extract_payload(gamma, GAMMA_FIELDS, &mut out);
        }
        if let Some(profile) = &self.market_profile {
            extract_payload(profile, PROFILE_FIELDS, &mut out);
        }
        if let Some(vwap) = &self.vwap {
            extract_payload(vwap, VWAP_FIELDS, &mut out);
        }
        if let Some(nodes) = &self.volume_nodes {
            out.extend(nodes.iter().filter_map(|raw| build_level(raw, &VOLUME_NODE)));
        }
        if let Some(session) = &self.session {
            extract_payload(session, SESSION_FIELDS, &mut out);
        }
        if let Some(dealer) = &self.dealer {
            out.extend(dealer.to_price_levels());
        }
        out
    }
}

// =============================================================================
// Round numbers
// =============================================================================

/// Round-number levels every `round_number_step` within two steps of price,
/// plus psychological levels every `psychological_step` within one step.
pub fn round_number_levels(reference_price: f64, params: &ConfluenceParams) -> Vec<PriceLevel> {
    let mut out = Vec::new();
    let step = params.round_number_step;
    let base = (reference_price / step).floor() * step;
    for k in -2..=2 {
        let price = base + k as f64 * step;
        if (price - reference_price).abs() <= 2.0 * step {
            out.extend(PriceLevel::new(price, LevelSource::RoundNumber, 0.3, 0.0, 0));
        }
    }

    let step = params.psychological_step;
    let base = (reference_price / step).floor() * step;
    for k in -1..=1 {
        let price = base + k as f64 * step;
        if (price - reference_price).abs() <= step {
            out.extend(PriceLevel::new(price, LevelSource::Psychological, 0.2, 0.0, 0));
        }
    }
    out
}

// =============================================================================
// Normalization
// =============================================================================

/// Filter candidate levels against the reference price and sort them by price.
pub fn normalize_levels<I>(candidates: I, reference_price: f64, params: &ConfluenceParams) -> Vec<PriceLevel>
where
    I: IntoIterator<Item = PriceLevel>,
{
    let mut rejected = 0usize;
    let mut levels: Vec<PriceLevel> = candidates
        .into_iter()
        .filter(|level| {
            let keep = level.price.is_finite()
                && level.price > 0.0
                && (level.price - reference_price).abs() <= params.max_level_distance
                && level.is_fresh();
            if !keep {
                rejected += 1;
                trace!(
                    price = level.price,
                    source = %level.source,
                    age_minutes = level.age_minutes,
                    "level rejected"
                );
            }
            keep
        })
        .collect();

    levels.sort_by(|a, b| a.price.total_cmp(&b.price));

    debug!(
        kept = levels.len(),
        rejected,
        reference_price,
        "levels normalized"
    );
    levels
}

/// Collect every source (plus generated round numbers when enabled) into one
/// validated, price-sorted sequence.
pub fn ingest(sources: &LevelSources, reference_price: f64, params: &ConfluenceParams) -> Vec<PriceLevel> {
    let mut candidates = sources.candidates();
    if params.generate_round_numbers {
        candidates.extend(round_number_levels(reference_price, params));
    }
    normalize_levels(candidates, reference_price, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConfluenceParams {
        ConfluenceParams {
            generate_round_numbers: false,
            ..ConfluenceParams::default()
        }
    }

    fn payload(pairs: &[(&str, RawLevel)]) -> SourcePayload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn raw_level_accepts_number_object_and_garbage() {
        let json = r#"{
            "poc": 4502.0,
            "vah": { "price": 4515.0, "age_minutes": 30, "touches": 2 },
            "val": { "price": 4485.0, "age_minutes": "old" },
            "ppoc": null
        }"#;
        let p: SourcePayload = serde_json::from_str(json).unwrap();
        assert_eq!(p["poc"], RawLevel::at(4502.0));
        assert_eq!(p["vah"], RawLevel::at(4515.0).with_age(30.0).with_touches(2));
        assert_eq!(p["val"], RawLevel::default());
        assert_eq!(p["ppoc"], RawLevel::default());
    }

    #[test]
    fn applies_field_defaults() {
        let sources = LevelSources {
            market_profile: Some(payload(&[("poc", 4502.0.into())])),
            ..LevelSources::default()
        };
        let levels = sources.candidates();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].source, LevelSource::Poc);
        assert!((levels[0].base_strength - 0.8).abs() < 1e-12);
        assert!((levels[0].age_minutes - 180.0).abs() < 1e-12);
        assert_eq!(levels[0].touch_count, 1);
    }

    #[test]
    fn drops_far_stale_and_invalid_levels() {
        let sources = LevelSources {
            gamma: Some(payload(&[
                ("call_wall", RawLevel::at(4520.0).with_age(500.0)),
                ("put_wall", RawLevel::at(4480.0)),
                ("gamma_flip", RawLevel::at(-1.0)),
            ])),
            session: Some(payload(&[
                ("session_high", RawLevel::at(4750.0)),
                ("bogus_field", RawLevel::at(4500.0)),
            ])),
            ..LevelSources::default()
        };
        let levels = ingest(&sources, 4505.0, &params());
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].source, LevelSource::GammaPutWall);
    }

    #[test]
    fn keeps_level_exactly_at_distance_limit() {
        let sources = LevelSources {
            volume_nodes: Some(vec![RawLevel::at(4700.0), RawLevel::at(4300.0)]),
            ..LevelSources::default()
        };
        let levels = ingest(&sources, 4500.0, &params());
        assert_eq!(levels.len(), 2);
    }

    #[test]
    fn output_is_sorted_by_price() {
        let sources = LevelSources {
            vwap: Some(payload(&[
                ("vwap", 4503.0.into()),
                ("vwap_sd1_up", 4508.0.into()),
                ("vwap_sd1_down", 4498.0.into()),
            ])),
            volume_nodes: Some(vec![4500.0.into(), 4505.0.into()]),
            ..LevelSources::default()
        };
        let levels = ingest(&sources, 4505.0, &params());
        assert_eq!(levels.len(), 5);
        assert!(levels.windows(2).all(|w| w[0].price <= w[1].price));
    }

    #[test]
    fn empty_sources_yield_no_levels() {
        assert!(ingest(&LevelSources::default(), 4500.0, &params()).is_empty());
    }

    #[test]
    fn generates_round_numbers_around_price() {
        let levels = round_number_levels(4505.0, &ConfluenceParams::default());
        let rounds: Vec<f64> = levels
            .iter()
            .filter(|l| l.source == LevelSource::RoundNumber)
            .map(|l| l.price)
            .collect();
        // 4450 sits 55 points away and falls outside the two-step window
        assert_eq!(rounds, vec![4475.0, 4500.0, 4525.0, 4550.0]);
        let psych: Vec<f64> = levels
            .iter()
            .filter(|l| l.source == LevelSource::Psychological)
            .map(|l| l.price)
            .collect();
        assert_eq!(psych, vec![4500.0, 4600.0]);
    }

    #[test]
    fn dealer_levels_join_the_candidates() {
        let sources = LevelSources {
            dealer: Some(DealerLevels::from_labeled([("hvl_0dte", 4501.0), ("gex_1", 4510.0)])),
            ..LevelSources::default()
        };
        let levels = ingest(&sources, 4505.0, &params());
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].source, LevelSource::DealerHvl0dte);
        assert_eq!(levels[1].source, LevelSource::DealerGex);
    }
}
