// =============================================================================
// Confluence Queries — read-only lookups over scored zones
// =============================================================================
//
// All queries are O(zones) or O(levels) and allocate at most the returned
// vector, so callers may run them many times per analysis.

use crate::confluence::cluster::ConfluenceZone;
use crate::confluence::scoring::{classify_direction, weighted_strength};
use crate::runtime_config::ConfluenceParams;
use crate::types::{PriceLevel, ZoneDirection, ZoneQuality};

fn nearest_in_direction<'a>(
    zones: &'a [ConfluenceZone],
    price: f64,
    tick_size: f64,
    direction: ZoneDirection,
) -> Option<&'a ConfluenceZone> {
    zones
        .iter()
        .filter(|z| classify_direction(z.center_price, price) == direction)
        .min_by(|a, b| {
            a.distance_ticks_to(price, tick_size)
                .total_cmp(&b.distance_ticks_to(price, tick_size))
        })
}

/// Closest zone centred below `price`.
pub fn nearest_support(zones: &[ConfluenceZone], price: f64, tick_size: f64) -> Option<&ConfluenceZone> {
    nearest_in_direction(zones, price, tick_size, ZoneDirection::Support)
}

/// Closest zone centred above `price`.
pub fn nearest_resistance(zones: &[ConfluenceZone], price: f64, tick_size: f64) -> Option<&ConfluenceZone> {
    nearest_in_direction(zones, price, tick_size, ZoneDirection::Resistance)
}

/// Level strength around `price` with linear decay to zero at the window
/// edge, normalised into `[0, 1]`.
pub fn score_at_price<'a, I>(levels: I, price: f64, tick_size: f64, params: &ConfluenceParams) -> f64
where
    I: IntoIterator<Item = &'a PriceLevel>,
{
    let window = params.price_score_window_ticks;
    let total: f64 = levels
        .into_iter()
        .filter_map(|level| {
            let d = (level.price - price).abs() / tick_size;
            (d <= window).then(|| weighted_strength(level, params) * (1.0 - d / window))
        })
        .sum();
    (total / params.price_score_divisor).min(1.0)
}

/// Pull of strong and extreme zones near `price`, capped at 1.
pub fn proximity_score(zones: &[ConfluenceZone], price: f64, tick_size: f64, params: &ConfluenceParams) -> f64 {
    let window = params.proximity_window_ticks;
    let total: f64 = zones
        .iter()
        .filter(|z| z.quality >= ZoneQuality::Strong)
        .filter_map(|z| {
            let d = z.distance_ticks_to(price, tick_size);
            (d <= window).then(|| z.confluence_score * (1.0 - d / window) * z.quality.multiplier())
        })
        .sum();
    total.min(1.0)
}

/// Zones within `max_ticks` of `price`, nearest first.
pub fn zones_near_price(
    zones: &[ConfluenceZone],
    price: f64,
    max_ticks: f64,
    tick_size: f64,
) -> Vec<&ConfluenceZone> {
    let mut near: Vec<(f64, &ConfluenceZone)> = zones
        .iter()
        .map(|z| (z.distance_ticks_to(price, tick_size), z))
        .filter(|(d, _)| *d <= max_ticks)
        .collect();
    near.sort_by(|a, b| a.0.total_cmp(&b.0));
    near.into_iter().map(|(_, z)| z).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confluence::cluster::cluster_levels;
    use crate::confluence::scoring::score_zones;
    use crate::types::LevelSource;

    const TICK: f64 = 0.25;

    fn zones_at(prices: &[f64], reference: f64) -> Vec<ConfluenceZone> {
        let levels: Vec<PriceLevel> = prices
            .iter()
            .map(|p| PriceLevel::new(*p, LevelSource::Poc, 0.8, 0.0, 0).unwrap())
            .collect();
        score_zones(cluster_levels(&levels, 0.75), reference, &ConfluenceParams::default())
    }

    #[test]
    fn nearest_zones_by_direction() {
        let zones = zones_at(&[4490.0, 4498.0, 4510.0, 4520.0], 4500.0);
        let s = nearest_support(&zones, 4500.0, TICK).unwrap();
        let r = nearest_resistance(&zones, 4500.0, TICK).unwrap();
        assert!((s.center_price - 4498.0).abs() < 1e-10);
        assert!((r.center_price - 4510.0).abs() < 1e-10);
    }

    #[test]
    fn nearest_is_none_without_zones_on_that_side() {
        let zones = zones_at(&[4490.0, 4495.0], 4500.0);
        assert!(nearest_resistance(&zones, 4500.0, TICK).is_none());
        assert!(nearest_support(&[], 4500.0, TICK).is_none());
    }

    #[test]
    fn score_at_price_decays_linearly() {
        let p = ConfluenceParams::default();
        let level = PriceLevel::new(4500.0, LevelSource::GammaCallWall, 1.0, 0.0, 0).unwrap();
        // at the level: 1.0 × 1.0 / 5
        assert!((score_at_price([&level], 4500.0, TICK, &p) - 0.2).abs() < 1e-10);
        // five ticks away: half weight
        assert!((score_at_price([&level], 4501.25, TICK, &p) - 0.1).abs() < 1e-10);
        // beyond ten ticks: nothing
        assert!(score_at_price([&level], 4503.0, TICK, &p).abs() < 1e-10);
    }

    #[test]
    fn score_at_price_applies_source_weight_once() {
        let p = ConfluenceParams::default();
        let level = PriceLevel::new(4500.0, LevelSource::Poc, 1.0, 0.0, 0).unwrap();
        // Poc weighs 0.9: 0.9 / 5
        assert!((score_at_price([&level], 4500.0, TICK, &p) - 0.18).abs() < 1e-10);
        assert!((score_at_price([&level], 4498.75, TICK, &p) - 0.09).abs() < 1e-10);
    }

    #[test]
    fn proximity_ignores_weak_zones() {
        let zones = zones_at(&[4500.0], 4500.0);
        assert_eq!(zones[0].quality, ZoneQuality::Weak);
        assert!(proximity_score(&zones, 4500.0, TICK, &ConfluenceParams::default()).abs() < 1e-10);
    }

    #[test]
    fn proximity_weights_strong_zones_by_distance_and_quality() {
        let p = ConfluenceParams::default();
        let mut zones = zones_at(&[4500.0], 4500.0);
        zones[0].quality = ZoneQuality::Strong;
        zones[0].confluence_score = 0.6;
        let inside = proximity_score(&zones, 4500.0, TICK, &p);
        assert!((inside - 0.6 * 0.8).abs() < 1e-10);

        // zone top edge is 4500.375; 4502.875 is 10 ticks away
        let half = proximity_score(&zones, 4502.875, TICK, &p);
        assert!((half - 0.6 * 0.5 * 0.8).abs() < 1e-10);
    }

    #[test]
    fn near_price_sorted_by_distance() {
        let zones = zones_at(&[4490.0, 4498.0, 4501.0, 4530.0], 4500.0);
        let near = zones_near_price(&zones, 4500.0, 10.0, TICK);
        assert_eq!(near.len(), 2);
        assert!((near[0].center_price - 4501.0).abs() < 1e-10);
        assert!((near[1].center_price - 4498.0).abs() < 1e-10);
    }
}
