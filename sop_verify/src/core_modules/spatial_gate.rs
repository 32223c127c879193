// THEORY:
// The spatial gate is a stateless utility, the smallest decision in the engine:
// is this hand position inside this zone? Zones are closed rectangles, so a point
// resting exactly on an edge counts as inside. Comparisons against NaN are always
// false, so a malformed point is never inside anything.

use crate::core_modules::zone::{Bounds, Point, ZoneId, ZoneRegistry};

pub mod spatial_gate {
    use super::*;

    /// Returns true when `point` lies within `bounds`, boundary included.
    pub fn contains(point: Point, bounds: &Bounds) -> bool {
        bounds.top_left.x <= point.x
            && point.x <= bounds.bottom_right.x
            && bounds.top_left.y <= point.y
            && point.y <= bounds.bottom_right.y
    }

    /// Every zone of the registry that contains `point`, in registry order.
    pub fn zones_containing(point: Point, registry: &ZoneRegistry) -> impl Iterator<Item = ZoneId> + '_ {
        registry
            .ids()
            .filter(move |&id| registry.bounds(id).is_some_and(|bounds| contains(point, bounds)))
    }
}
