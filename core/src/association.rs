//! Nearest-neighbor data association.
//!
//! Candidates are pre-gated per particle so the sets are small; a linear scan is used instead of a
//! spatial index.
use crate::map::Landmark;
use crate::{Observation, UNASSIGNED};

/// Closest candidate to the point (`x`, `y`) as `(id, distance)`.
///
/// The comparison is strict, so the first candidate encountered wins a tie. Returns `None` when there
/// are no candidates.
pub fn nearest_landmark(candidates: &[Landmark], x: f64, y: f64) -> Option<(i32, f64)> {
    let mut nearest: Option<(i32, f64)> = None;
    for landmark in candidates {
        let distance = (landmark.x - x).hypot(landmark.y - y);
        match nearest {
            Some((_, best)) if !(distance < best) => {}
            _ => nearest = Some((landmark.id, distance)),
        }
    }
    nearest
}

/// Assign each observation the id of its nearest candidate landmark.
///
/// With no candidates every observation gets the [`UNASSIGNED`] id.
pub fn associate(candidates: &[Landmark], observations: &mut [Observation]) {
    for observation in observations.iter_mut() {
        observation.id = nearest_landmark(candidates, observation.x, observation.y)
            .map_or(UNASSIGNED, |(id, _)| id);
    }
}
