//! Exact-radius admission test over candidate memories.

use crate::geo::haversine_distance_m;
use crate::memory::{Memory, UserLocation};

/// Distance from `location` to `memory` when the memory is inside its own
/// trigger radius. Memories missing coordinates or radius never match.
#[must_use]
pub fn distance_if_inside(memory: &Memory, location: &UserLocation) -> Option<f64> {
    let center = memory.coordinates()?;
    let radius = memory.trigger_radius_m()?;
    let distance = haversine_distance_m(location.coordinates(), center);
    (distance <= radius).then_some(distance)
}

/// Subset of `candidates` whose geofence contains `location`, in input order.
#[must_use]
pub fn filter_inside<'a>(candidates: &'a [Memory], location: &UserLocation) -> Vec<&'a Memory> {
    candidates
        .iter()
        .filter(|memory| distance_if_inside(memory, location).is_some())
        .collect()
}
