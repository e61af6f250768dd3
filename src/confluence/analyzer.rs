// =============================================================================
// Confluence Analyzer
// =============================================================================
//
// Runs the full confluence pipeline for one reference price:
//
//   sources → ingest (validate, age, sort) → cluster → score → analysis
//
// The pipeline itself is a pure function (`build_analysis`).  The analyzer
// wraps it with validated configuration, running statistics and a bounded
// in-memory window of recent analyses.

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::confluence::cluster::{cluster_levels, ConfluenceZone};
use crate::confluence::query;
use crate::confluence::scoring::score_zones;
use crate::error::ConfigError;
use crate::levels::{ingest, normalize_levels, LevelSources};
use crate::runtime_config::{ConfluenceParams, EngineConfig};
use crate::types::{PriceLevel, ZoneQuality};

// =============================================================================
// Results
// =============================================================================

/// Snapshot produced by one analysis pass.  Never mutated once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceAnalysis {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub reference_price: f64,
    pub tick_size: f64,
    /// Zones ordered by price.
    pub zones: Vec<ConfluenceZone>,
    pub nearest_support: Option<ConfluenceZone>,
    pub nearest_resistance: Option<ConfluenceZone>,
    /// Level strength around the reference price, `[0, 1]`.
    pub confluence_at_price: f64,
    /// Pull of nearby strong zones, `[0, 1]`.
    pub proximity_score: f64,
    /// Levels that survived ingestion.
    pub level_count: usize,
}

/// Compact view of a zone for summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRef {
    pub price: f64,
    pub distance_ticks: f64,
    pub quality: ZoneQuality,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceSummary {
    pub timestamp: DateTime<Utc>,
    pub reference_price: f64,
    pub total_zones: usize,
    pub strong_zones: usize,
    pub confluence_at_price: f64,
    pub proximity_score: f64,
    pub nearest_support: Option<ZoneRef>,
    pub nearest_resistance: Option<ZoneRef>,
}

impl ConfluenceAnalysis {
    /// Zones at or above `min` quality, in price order.
    pub fn zones_by_quality(&self, min: ZoneQuality) -> Vec<&ConfluenceZone> {
        self.zones.iter().filter(|z| z.quality >= min).collect()
    }

    pub fn zones_near_price(&self, price: f64, max_ticks: f64) -> Vec<&ConfluenceZone> {
        query::zones_near_price(&self.zones, price, max_ticks, self.tick_size)
    }

    /// Score-at-price re-aggregated over every zone member.
    pub fn score_for_price(&self, price: f64, params: &ConfluenceParams) -> f64 {
        query::score_at_price(
            self.zones.iter().flat_map(|z| z.members.iter()),
            price,
            self.tick_size,
            params,
        )
    }

    pub fn strong_zone_count(&self) -> usize {
        self.zones.iter().filter(|z| z.is_strong()).count()
    }

    fn zone_ref(&self, zone: &ConfluenceZone) -> ZoneRef {
        ZoneRef {
            price: zone.center_price,
            distance_ticks: zone.distance_ticks_to(self.reference_price, self.tick_size),
            quality: zone.quality,
        }
    }

    pub fn summary(&self) -> ConfluenceSummary {
        ConfluenceSummary {
            timestamp: self.timestamp,
            reference_price: self.reference_price,
            total_zones: self.zones.len(),
            strong_zones: self.strong_zone_count(),
            confluence_at_price: self.confluence_at_price,
            proximity_score: self.proximity_score,
            nearest_support: self.nearest_support.as_ref().map(|z| self.zone_ref(z)),
            nearest_resistance: self.nearest_resistance.as_ref().map(|z| self.zone_ref(z)),
        }
    }
}

/// Cluster, score and query already-validated, price-sorted levels.
pub fn build_analysis(
    levels: &[PriceLevel],
    reference_price: f64,
    tick_size: f64,
    params: &ConfluenceParams,
) -> ConfluenceAnalysis {
    let tolerance = params.tolerance_ticks * tick_size;
    let zones = score_zones(cluster_levels(levels, tolerance), reference_price, params);

    let nearest_support = query::nearest_support(&zones, reference_price, tick_size).cloned();
    let nearest_resistance = query::nearest_resistance(&zones, reference_price, tick_size).cloned();
    let confluence_at_price = query::score_at_price(levels, reference_price, tick_size, params);
    let proximity_score = query::proximity_score(&zones, reference_price, tick_size, params);

    ConfluenceAnalysis {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        reference_price,
        tick_size,
        zones,
        nearest_support,
        nearest_resistance,
        confluence_at_price,
        proximity_score,
        level_count: levels.len(),
    }
}

// =============================================================================
// ConfluenceAnalyzer
// =============================================================================

/// Running counters across analyses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzerStats {
    pub analyses_count: u64,
    /// Running mean wall time of one analysis.
    pub avg_analysis_ms: f64,
    pub zones_detected: u64,
    pub strong_zones_detected: u64,
    pub last_analysis: Option<DateTime<Utc>>,
}

pub struct ConfluenceAnalyzer {
    symbol: String,
    tick_size: f64,
    params: ConfluenceParams,
    stats: RwLock<AnalyzerStats>,
    history: RwLock<VecDeque<ConfluenceAnalysis>>,
}

impl ConfluenceAnalyzer {
    /// Validate `config` and build an analyzer for its instrument.
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            symbol = %config.symbol,
            tick_size = config.tick_size,
            tolerance_ticks = config.confluence.tolerance_ticks,
            "confluence analyzer ready"
        );
        Ok(Self {
            symbol: config.symbol.clone(),
            tick_size: config.tick_size,
            params: config.confluence.clone(),
            stats: RwLock::new(AnalyzerStats::default()),
            history: RwLock::new(VecDeque::with_capacity(config.confluence.history_capacity)),
        })
    }

    pub fn params(&self) -> &ConfluenceParams {
        &self.params
    }

    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    /// Ingest every source around `reference_price` and analyse the result.
    pub fn analyze(&self, sources: &LevelSources, reference_price: f64) -> ConfluenceAnalysis {
        let levels = ingest(sources, reference_price, &self.params);
        self.run(&levels, reference_price)
    }

    /// Analyse caller-built levels.  They still pass the distance and age
    /// filters but no round numbers are added.
    pub fn analyze_levels(&self, levels: Vec<PriceLevel>, reference_price: f64) -> ConfluenceAnalysis {
        let levels = normalize_levels(levels, reference_price, &self.params);
        self.run(&levels, reference_price)
    }

    fn run(&self, levels: &[PriceLevel], reference_price: f64) -> ConfluenceAnalysis {
        let started = Instant::now();
        let analysis = build_analysis(levels, reference_price, self.tick_size, &self.params);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let strong = analysis.strong_zone_count();
        {
            let mut stats = self.stats.write();
            stats.analyses_count += 1;
            let n = stats.analyses_count as f64;
            stats.avg_analysis_ms += (elapsed_ms - stats.avg_analysis_ms) / n;
            stats.zones_detected += analysis.zones.len() as u64;
            stats.strong_zones_detected += strong as u64;
            stats.last_analysis = Some(analysis.timestamp);
        }
        {
            let mut history = self.history.write();
            if self.params.history_capacity > 0 {
                while history.len() >= self.params.history_capacity {
                    history.pop_front();
                }
                history.push_back(analysis.clone());
            }
        }

        debug!(
            symbol = %self.symbol,
            reference_price,
            levels = analysis.level_count,
            zones = analysis.zones.len(),
            strong_zones = strong,
            confluence_at_price = format!("{:.3}", analysis.confluence_at_price),
            proximity = format!("{:.3}", analysis.proximity_score),
            elapsed_ms = format!("{:.3}", elapsed_ms),
            "Confluence analysis complete"
        );

        analysis
    }

    pub fn score_for_price(&self, analysis: &ConfluenceAnalysis, price: f64) -> f64 {
        analysis.score_for_price(price, &self.params)
    }

    /// Zones within the configured default window of `price`.
    pub fn zones_near_price<'a>(&self, analysis: &'a ConfluenceAnalysis, price: f64) -> Vec<&'a ConfluenceZone> {
        analysis.zones_near_price(price, self.params.near_price_ticks)
    }

    pub fn stats(&self) -> AnalyzerStats {
        self.stats.read().clone()
    }

    pub fn latest(&self) -> Option<ConfluenceAnalysis> {
        self.history.read().back().cloned()
    }

    /// Recent analyses, oldest first.
    pub fn history(&self) -> Vec<ConfluenceAnalysis> {
        self.history.read().iter().cloned().collect()
    }
}
