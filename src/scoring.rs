//! Ranking policies for nearby memories.
//!
//! Two policies exist and each call site picks one explicitly:
//!
//! - [`proximity_affect_score`] ranks a single best pick, in `[0, 1]`.
//! - [`admission_priority`] orders the scheduler queue and is unbounded.

use serde::{Deserialize, Serialize};

use crate::geofence::distance_if_inside;
use crate::memory::{Memory, Relationship, UserLocation};

pub const PROXIMITY_SIGMA_M: f64 = 10.0;
pub const PROXIMITY_WEIGHT: f64 = 0.7;
pub const AFFECT_WEIGHT: f64 = 0.3;
pub const DEFAULT_EMOTION: f64 = 0.5;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Tunables for the queue-admission priority.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub owner_weight: f64,
    pub friend_weight: f64,
    pub public_weight: f64,
    /// Priority gained per meter of slack inside the radius.
    pub distance_per_m: f64,
    /// Priority gained per hour the memory is younger than the window.
    pub freshness_per_hour: f64,
    pub freshness_window_hours: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            owner_weight: 3.0,
            friend_weight: 2.0,
            public_weight: 1.0,
            distance_per_m: 0.1,
            freshness_per_hour: 0.01,
            freshness_window_hours: 24.0,
        }
    }
}

impl ScoringWeights {
    #[must_use]
    pub fn role_weight(&self, relationship: Relationship) -> f64 {
        match relationship {
            Relationship::Owner => self.owner_weight,
            Relationship::Friend => self.friend_weight,
            Relationship::Public => self.public_weight,
        }
    }
}

#[inline]
#[must_use]
pub fn gaussian_falloff(distance_m: f64, sigma_m: f64) -> f64 {
    (-(distance_m * distance_m) / (2.0 * sigma_m * sigma_m)).exp()
}

/// Emotion clamped to `[0, 1]`; missing or non-finite values become neutral.
#[must_use]
pub fn normalized_emotion(emotion: Option<f64>) -> f64 {
    match emotion {
        Some(value) if value.is_finite() => value.clamp(0.0, 1.0),
        _ => DEFAULT_EMOTION,
    }
}

/// Best-single-pick score: `0.7 * falloff(d) + 0.3 * emotion`, clamped to `[0, 1]`.
#[must_use]
pub fn proximity_affect_score(distance_m: f64, emotion: Option<f64>) -> f64 {
    let proximity = gaussian_falloff(distance_m.abs(), PROXIMITY_SIGMA_M);
    let score = PROXIMITY_WEIGHT * proximity + AFFECT_WEIGHT * normalized_emotion(emotion);
    score.clamp(0.0, 1.0)
}

/// Hours since creation; memories stamped in the future count as new.
#[must_use]
pub fn age_hours(created_at_ms: u64, now_ms: u64) -> f64 {
    now_ms.saturating_sub(created_at_ms) as f64 / MS_PER_HOUR
}

/// Queue ordering priority:
/// `role + (radius - distance) * distance_per_m + max(0, window - age) * freshness_per_hour`.
#[must_use]
pub fn admission_priority(
    radius_m: f64,
    distance_m: f64,
    relationship: Relationship,
    created_at_ms: u64,
    now_ms: u64,
    weights: &ScoringWeights,
) -> f64 {
    let role = weights.role_weight(relationship);
    let proximity = (radius_m - distance_m) * weights.distance_per_m;
    let fresh_hours = (weights.freshness_window_hours - age_hours(created_at_ms, now_ms)).max(0.0);
    role + proximity + fresh_hours * weights.freshness_per_hour
}

/// Picks the geofence-admitted memory with the highest proximity+affect score.
/// Ties keep the first candidate seen.
#[must_use]
pub fn best_nearby<'a>(
    candidates: &'a [Memory],
    location: &UserLocation,
) -> Option<(&'a Memory, f64)> {
    let mut best: Option<(&Memory, f64)> = None;
    for memory in candidates {
        let Some(distance) = distance_if_inside(memory, location) else {
            continue;
        };
        let score = proximity_affect_score(distance, memory.emotion);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((memory, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const HOUR_MS: u64 = 3_600_000;

    #[test]
    fn zero_distance_full_emotion_scores_one() {
        assert!((proximity_affect_score(0.0, Some(1.0)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_emotion_defaults_to_neutral() {
        let expected = PROXIMITY_WEIGHT + AFFECT_WEIGHT * 0.5;
        assert!((proximity_affect_score(0.0, None) - expected).abs() < 1e-12);
        assert!((proximity_affect_score(0.0, Some(f64::NAN)) - expected).abs() < 1e-12);
    }

    #[test]
    fn falloff_at_one_sigma_matches_gaussian() {
        let expected = (-0.5_f64).exp();
        assert!((gaussian_falloff(10.0, 10.0) - expected).abs() < 1e-12);
    }

    #[rstest]
    #[case(Relationship::Owner, 6.0)]
    #[case(Relationship::Friend, 5.0)]
    #[case(Relationship::Public, 4.0)]
    fn stale_memory_at_center_uses_role_plus_radius(
        #[case] relationship: Relationship,
        #[case] expected: f64,
    ) {
        let now = 100 * HOUR_MS;
        let created = now - 48 * HOUR_MS;
        let priority = admission_priority(
            30.0,
            0.0,
            relationship,
            created,
            now,
            &ScoringWeights::default(),
        );
        assert!((priority - expected).abs() < 1e-9, "got {priority}");
    }

    #[test]
    fn fresh_memory_gets_full_freshness_bonus() {
        let now = 10 * HOUR_MS;
        let priority = admission_priority(
            30.0,
            0.0,
            Relationship::Owner,
            now,
            now,
            &ScoringWeights::default(),
        );
        assert!((priority - 6.24).abs() < 1e-9, "got {priority}");
    }

    #[test]
    fn future_creation_time_counts_as_brand_new() {
        assert_eq!(age_hours(5_000, 1_000), 0.0);
    }

    #[test]
    fn best_nearby_prefers_closer_memory_for_equal_emotion() {
        let make = |id: &str, latitude: f64| Memory {
            id: id.to_string(),
            latitude: Some(latitude),
            longitude: Some(0.0),
            radius_m: Some(100.0),
            audio_ref: None,
            owner_id: "x".to_string(),
            created_at_ms: 0,
            emotion: Some(0.2),
        };
        let candidates = vec![make("farther", 0.0002), make("closer", 0.00005)];
        let here = UserLocation {
            latitude: 0.0,
            longitude: 0.0,
            accuracy_m: 3.0,
            timestamp_ms: 0,
        };
        let (best, score) = best_nearby(&candidates, &here).expect("one candidate is inside");
        assert_eq!(best.id, "closer");
        assert!(score > 0.0 && score <= 1.0);
    }

    proptest! {
        #[test]
        fn proximity_score_stays_in_unit_interval(
            distance in 0.0f64..100_000.0,
            emotion in proptest::option::of(-2.0f64..3.0),
        ) {
            let score = proximity_affect_score(distance, emotion);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn proximity_score_strictly_decreases_with_distance(
            near in 0.0f64..50.0,
            gap in 0.01f64..10.0,
            emotion in 0.0f64..=1.0,
        ) {
            let closer = proximity_affect_score(near, Some(emotion));
            let farther = proximity_affect_score(near + gap, Some(emotion));
            prop_assert!(closer > farther);
        }

        #[test]
        fn priority_decreases_with_distance_and_age(
            distance in 0.0f64..100.0,
            extra in 0.1f64..50.0,
            age_h in 0u64..23,
        ) {
            let weights = ScoringWeights::default();
            let now = 1_000 * HOUR_MS;
            let created = now - age_h * HOUR_MS;
            let base = admission_priority(200.0, distance, Relationship::Friend, created, now, &weights);
            let farther = admission_priority(200.0, distance + extra, Relationship::Friend, created, now, &weights);
            let older = admission_priority(200.0, distance, Relationship::Friend, created - HOUR_MS, now, &weights);
            prop_assert!(base > farther);
            prop_assert!(base > older);
        }
    }
}
