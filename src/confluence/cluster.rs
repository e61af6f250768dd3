// =============================================================================
// Zone Clustering — Group nearby levels into confluence zones
// =============================================================================
//
// Single left-to-right sweep over price-sorted levels:
//
//   1. The next unclaimed level seeds a new zone.
//   2. Every following level with `price - seed <= tolerance` joins it.
//   3. The first level beyond `seed + tolerance` ends the zone and seeds
//      the next one.
//
// Each level therefore lands in exactly one zone.  A zone may hold a single
// level.  Zones come out unscored; `scoring::score_zones` fills in score,
// quality and direction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{LevelSource, PriceLevel, ZoneDirection, ZoneQuality};

/// A price region where one or more levels cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceZone {
    /// Mean price of the member levels.
    pub center_price: f64,
    /// Lowest member price minus half the tolerance.
    pub price_min: f64,
    /// Highest member price plus half the tolerance.
    pub price_max: f64,
    pub members: Vec<PriceLevel>,
    /// Normalised weighted strength in `[0, 1]`.
    pub confluence_score: f64,
    pub quality: ZoneQuality,
    /// Side of the reference price the zone sits on.
    pub direction: ZoneDirection,
}

impl ConfluenceZone {
    /// Build an unscored zone from its members.
    ///
    /// # Panics
    ///
    /// Panics when `members` is empty.  Clustering never produces an empty
    /// zone, so reaching this is a bug rather than bad input.
    pub fn from_members(members: Vec<PriceLevel>, tolerance: f64) -> Self {
        assert!(!members.is_empty(), "confluence zone built without member levels");

        let n = members.len() as f64;
        let center_price = members.iter().map(|l| l.price).sum::<f64>() / n;
        let lowest = members.iter().map(|l| l.price).fold(f64::INFINITY, f64::min);
        let highest = members.iter().map(|l| l.price).fold(f64::NEG_INFINITY, f64::max);
        let half = tolerance.max(0.0) / 2.0;

        Self {
            center_price,
            price_min: lowest - half,
            price_max: highest + half,
            members,
            confluence_score: 0.0,
            quality: ZoneQuality::Weak,
            direction: ZoneDirection::Neutral,
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains_price(&self, price: f64) -> bool {
        price >= self.price_min && price <= self.price_max
    }

    /// Distance in ticks from `price` to the nearer zone edge, 0 when inside.
    pub fn distance_ticks_to(&self, price: f64, tick_size: f64) -> f64 {
        if self.contains_price(price) {
            0.0
        } else if price < self.price_min {
            (self.price_min - price) / tick_size
        } else {
            (price - self.price_max) / tick_size
        }
    }

    /// Width of the zone in ticks.
    pub fn range_ticks(&self, tick_size: f64) -> f64 {
        (self.price_max - self.price_min) / tick_size
    }

    /// Up to three most frequent source types, most frequent first.
    pub fn dominant_sources(&self) -> Vec<LevelSource> {
        let mut counts: BTreeMap<LevelSource, usize> = BTreeMap::new();
        for level in &self.members {
            *counts.entry(level.source).or_insert(0) += 1;
        }
        let mut ranked: Vec<(LevelSource, usize)> = counts.into_iter().collect();
        // Stable sort keeps enum order among equal counts.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.into_iter().take(3).map(|(source, _)| source).collect()
    }

    pub fn is_strong(&self) -> bool {
        self.quality >= ZoneQuality::Strong
    }
}

/// Cluster price-sorted `levels` into zones.
///
/// `tolerance` is in price units.  Two levels exactly `tolerance` apart share
/// a zone; a tolerance of 0 yields one zone per distinct price.  Unsorted
/// input is sorted first.
pub fn cluster_levels(levels: &[PriceLevel], tolerance: f64) -> Vec<ConfluenceZone> {
    let mut sorted: Vec<PriceLevel> = levels.to_vec();
    if !sorted.windows(2).all(|w| w[0].price <= w[1].price) {
        sorted.sort_by(|a, b| a.price.total_cmp(&b.price));
    }
    let tolerance = tolerance.max(0.0);

    let mut zones = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(seed) = iter.next() {
        let seed_price = seed.price;
        let mut members = vec![seed];
        while let Some(next) = iter.peek() {
            if next.price - seed_price > tolerance {
                break;
            }
            if let Some(level) = iter.next() {
                members.push(level);
            }
        }
        zones.push(ConfluenceZone::from_members(members, tolerance));
    }
    zones
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: f64) -> PriceLevel {
        PriceLevel::new(price, LevelSource::VolumeNode, 0.5, 0.0, 0).unwrap()
    }

    fn tagged(price: f64, source: LevelSource) -> PriceLevel {
        PriceLevel::new(price, source, 0.5, 0.0, 0).unwrap()
    }

    #[test]
    fn empty_input_gives_no_zones() {
        assert!(cluster_levels(&[], 0.75).is_empty());
    }

    #[test]
    fn single_level_forms_its_own_zone() {
        let zones = cluster_levels(&[level(4500.0)], 0.75);
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].member_count(), 1);
        assert!((zones[0].center_price - 4500.0).abs() < 1e-10);
        assert!((zones[0].price_min - 4499.625).abs() < 1e-10);
        assert!((zones[0].price_max - 4500.375).abs() < 1e-10);
    }

    #[test]
    fn boundary_is_inclusive() {
        let zones = cluster_levels(&[level(4500.0), level(4500.75)], 0.75);
        assert_eq!(zones.len(), 1);
        let zones = cluster_levels(&[level(4500.0), level(4501.0)], 0.75);
        assert_eq!(zones.len(), 2);
    }

    #[test]
    fn absorption_is_measured_from_the_seed() {
        // 4501.0 is within tolerance of 4500.5 but not of the seed 4500.0.
        let levels = [level(4500.0), level(4500.5), level(4501.0)];
        let zones = cluster_levels(&levels, 0.75);
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].member_count(), 2);
        assert_eq!(zones[1].member_count(), 1);
    }

    #[test]
    fn zero_tolerance_gives_one_zone_per_distinct_price() {
        let levels = [level(4500.0), level(4500.0), level(4500.25), level(4501.0)];
        let zones = cluster_levels(&levels, 0.0);
        assert_eq!(zones.len(), 3);
        assert_eq!(zones[0].member_count(), 2);
    }

    #[test]
    fn every_level_lands_in_exactly_one_zone() {
        let prices = [
            4480.0, 4490.25, 4490.5, 4491.0, 4500.0, 4500.25, 4500.5, 4500.75, 4503.0, 4520.0,
        ];
        let levels: Vec<PriceLevel> = prices.iter().map(|p| level(*p)).collect();
        let zones = cluster_levels(&levels, 0.75);

        let mut seen: Vec<f64> = zones
            .iter()
            .flat_map(|z| z.members.iter().map(|l| l.price))
            .collect();
        seen.sort_by(f64::total_cmp);
        assert_eq!(seen, prices.to_vec());

        for zone in &zones {
            assert!(zone.price_min <= zone.center_price);
            assert!(zone.center_price <= zone.price_max);
            if zone.member_count() > 1 {
                for m in &zone.members {
                    assert!(zone
                        .members
                        .iter()
                        .any(|o| !std::ptr::eq(o, m) && (o.price - m.price).abs() <= 0.75));
                }
            }
        }
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let zones = cluster_levels(&[level(4510.0), level(4500.0), level(4500.5)], 0.75);
        assert_eq!(zones.len(), 2);
        assert!((zones[0].center_price - 4500.25).abs() < 1e-10);
    }

    #[test]
    fn distance_is_zero_inside_and_edge_based_outside() {
        let zone = ConfluenceZone::from_members(vec![level(4500.0), level(4500.5)], 0.5);
        // bounds: 4499.75 .. 4500.75
        assert!(zone.distance_ticks_to(4500.25, 0.25).abs() < 1e-10);
        assert!((zone.distance_ticks_to(4502.75, 0.25) - 8.0).abs() < 1e-10);
        assert!((zone.distance_ticks_to(4499.25, 0.25) - 2.0).abs() < 1e-10);
        assert!((zone.range_ticks(0.25) - 4.0).abs() < 1e-10);
    }

    #[test]
    fn dominant_sources_rank_by_frequency() {
        let zone = ConfluenceZone::from_members(
            vec![
                tagged(4500.0, LevelSource::Vwap),
                tagged(4500.0, LevelSource::Poc),
                tagged(4500.25, LevelSource::Poc),
                tagged(4500.25, LevelSource::SessionHigh),
                tagged(4500.5, LevelSource::RoundNumber),
            ],
            0.75,
        );
        let top = zone.dominant_sources();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0], LevelSource::Poc);
    }

    #[test]
    #[should_panic(expected = "without member levels")]
    fn empty_zone_is_a_bug() {
        let _ = ConfluenceZone::from_members(Vec::new(), 0.75);
    }
}
