// =============================================================================
// Zone Scoring & Qualification
// =============================================================================
//
//   weighted_strength = base_strength × age_decay × touch_bonus × source_weight
//   age_decay         = max(min_age_factor, 1 − age / age_horizon)
//   touch_bonus       = min(max_touch_bonus, 1 + touch_bonus_step × touches)
//   zone score        = min(1, Σ weighted_strength / zone_score_normalizer)
//
// Quality: a zone reaches a class when its score OR its member count clears
// that class's bar (extreme 0.8 / 7, strong 0.6 / 5, moderate 0.4 / 3).
// Direction is relative to the reference price of the analysis.

use crate::confluence::cluster::ConfluenceZone;
use crate::runtime_config::{ConfluenceParams, QualityThresholds};
use crate::types::{PriceLevel, ZoneDirection, ZoneQuality};

pub fn age_decay(age_minutes: f64, params: &ConfluenceParams) -> f64 {
    (1.0 - age_minutes / params.age_horizon_minutes).max(params.min_age_factor)
}

pub fn touch_bonus(touch_count: u32, params: &ConfluenceParams) -> f64 {
    (1.0 + params.touch_bonus_step * touch_count as f64).min(params.max_touch_bonus)
}

/// Strength of one level after age decay, touch bonus and source weight.
pub fn weighted_strength(level: &PriceLevel, params: &ConfluenceParams) -> f64 {
    level.base_strength
        * age_decay(level.age_minutes, params)
        * touch_bonus(level.touch_count, params)
        * level.source.weight()
}

/// Normalised zone score in `[0, 1]`.
pub fn zone_score(members: &[PriceLevel], params: &ConfluenceParams) -> f64 {
    let total: f64 = members.iter().map(|l| weighted_strength(l, params)).sum();
    (total / params.zone_score_normalizer).min(1.0)
}

pub fn classify_quality(score: f64, member_count: usize, t: &QualityThresholds) -> ZoneQuality {
    if score >= t.extreme_score || member_count >= t.extreme_count {
        ZoneQuality::Extreme
    } else if score >= t.strong_score || member_count >= t.strong_count {
        ZoneQuality::Strong
    } else if score >= t.moderate_score || member_count >= t.moderate_count {
        ZoneQuality::Moderate
    } else {
        ZoneQuality::Weak
    }
}

pub fn classify_direction(center_price: f64, reference_price: f64) -> ZoneDirection {
    if center_price > reference_price {
        ZoneDirection::Resistance
    } else if center_price < reference_price {
        ZoneDirection::Support
    } else {
        ZoneDirection::Neutral
    }
}

/// Fill in score, quality and direction of a freshly clustered zone.
pub fn score_zone(mut zone: ConfluenceZone, reference_price: f64, params: &ConfluenceParams) -> ConfluenceZone {
    zone.confluence_score = zone_score(&zone.members, params);
    zone.quality = classify_quality(zone.confluence_score, zone.member_count(), &params.quality);
    zone.direction = classify_direction(zone.center_price, reference_price);
    zone
}

pub fn score_zones(
    zones: Vec<ConfluenceZone>,
    reference_price: f64,
    params: &ConfluenceParams,
) -> Vec<ConfluenceZone> {
    zones
        .into_iter()
        .map(|z| score_zone(z, reference_price, params))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confluence::cluster::cluster_levels;
    use crate::types::LevelSource;

    fn params() -> ConfluenceParams {
        ConfluenceParams::default()
    }

    #[test]
    fn single_fresh_level_scores_weak() {
        // weight 0.9 source, strength 1.0, fresh, untouched
        let level = PriceLevel::new(4500.0, LevelSource::Poc, 1.0, 0.0, 0).unwrap();
        let zones = score_zones(cluster_levels(&[level], 0.75), 4505.0, &params());
        assert_eq!(zones.len(), 1);
        assert!((zones[0].confluence_score - 0.9 / 8.0).abs() < 1e-10);
        assert_eq!(zones[0].quality, ZoneQuality::Weak);
        assert_eq!(zones[0].direction, ZoneDirection::Support);
    }

    #[test]
    fn seven_members_are_extreme_regardless_of_score() {
        let levels: Vec<PriceLevel> = (0..7)
            .map(|i| PriceLevel::new(4500.0 + 0.05 * i as f64, LevelSource::SessionHigh, 0.1, 0.0, 0).unwrap())
            .collect();
        let zones = score_zones(cluster_levels(&levels, 0.75), 4490.0, &params());
        assert_eq!(zones.len(), 1);
        assert!(zones[0].confluence_score < 0.4);
        assert_eq!(zones[0].quality, ZoneQuality::Extreme);
        assert_eq!(zones[0].direction, ZoneDirection::Resistance);
    }

    #[test]
    fn age_decay_is_floored() {
        let p = params();
        assert!((age_decay(0.0, &p) - 1.0).abs() < 1e-10);
        assert!((age_decay(720.0, &p) - 0.5).abs() < 1e-10);
        assert!((age_decay(5000.0, &p) - 0.1).abs() < 1e-10);
    }

    #[test]
    fn touch_bonus_is_capped() {
        let p = params();
        assert!((touch_bonus(0, &p) - 1.0).abs() < 1e-10);
        assert!((touch_bonus(3, &p) - 1.6).abs() < 1e-10);
        assert!((touch_bonus(50, &p) - 2.0).abs() < 1e-10);
    }

    #[test]
    fn more_touches_never_weaken_a_level() {
        let p = params();
        let mut prev = 0.0;
        for touches in 0..20 {
            let level = PriceLevel::new(4500.0, LevelSource::Vwap, 0.7, 300.0, touches).unwrap();
            let ws = weighted_strength(&level, &p);
            assert!(ws >= prev);
            prev = ws;
        }
    }

    #[test]
    fn zone_score_is_capped_at_one() {
        let levels: Vec<PriceLevel> = (0..20)
            .map(|_| PriceLevel::new(4500.0, LevelSource::GammaCallWall, 1.0, 0.0, 5).unwrap())
            .collect();
        assert!((zone_score(&levels, &params()) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn quality_cutoffs() {
        let t = QualityThresholds::default();
        assert_eq!(classify_quality(0.8, 1, &t), ZoneQuality::Extreme);
        assert_eq!(classify_quality(0.6, 1, &t), ZoneQuality::Strong);
        assert_eq!(classify_quality(0.1, 5, &t), ZoneQuality::Strong);
        assert_eq!(classify_quality(0.4, 1, &t), ZoneQuality::Moderate);
        assert_eq!(classify_quality(0.1, 3, &t), ZoneQuality::Moderate);
        assert_eq!(classify_quality(0.39, 2, &t), ZoneQuality::Weak);
    }

    #[test]
    fn zone_at_reference_price_is_neutral() {
        assert_eq!(classify_direction(4500.0, 4500.0), ZoneDirection::Neutral);
        assert_eq!(classify_direction(4500.25, 4500.0), ZoneDirection::Resistance);
    }
}
