// THEORY:
// The `zone` module is the lowest layer of the verification engine. It owns the
// static geometry of a work station: a set of named, axis-aligned rectangles laid
// over the camera frame, each one a checkpoint the operator's hand must visit.
//
// Key architectural principles:
// 1.  **Validate Once**: The `ZoneRegistry` is built a single time from
//     configuration. Every rectangle is checked (finite, top-left <= bottom-right)
//     and every name must be unique. After that the registry is immutable.
// 2.  **Interned Identity**: Names are resolved to a `ZoneId` at construction time.
//     Everything downstream (the SOP plan, the session's status table) indexes by
//     `ZoneId`, so no string lookups happen while observations are flowing.
// 3.  **Stable Order**: Zones keep their configuration order. Status reports and
//     snapshots enumerate zones in that order, so two runs of the same station
//     always render identically.

use crate::error::ConfigurationError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A point in the station's shared 2D coordinate space (frame pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A closed, axis-aligned rectangle given by its top-left and bottom-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub top_left: Point,
    pub bottom_right: Point,
}

impl Bounds {
    pub fn new(top_left: impl Into<Point>, bottom_right: impl Into<Point>) -> Self {
        Self {
            top_left: top_left.into(),
            bottom_right: bottom_right.into(),
        }
    }

    /// Explains why these bounds cannot describe a zone, if they can't.
    fn defect(&self) -> Option<&'static str> {
        if !self.top_left.is_finite() || !self.bottom_right.is_finite() {
            Some("corner coordinates must be finite")
        } else if self.top_left.x > self.bottom_right.x || self.top_left.y > self.bottom_right.y {
            Some("top-left corner must not lie right of or below the bottom-right corner")
        } else {
            None
        }
    }
}

/// A validated handle to a zone inside one `ZoneRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(usize);

impl ZoneId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A named rectangular checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub bounds: Bounds,
}

impl Zone {
    pub fn new(name: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            name: name.into(),
            bounds,
        }
    }
}

/// The immutable set of zones for a station, in configuration order.
#[derive(Debug, Clone)]
pub struct ZoneRegistry {
    zones: IndexMap<String, Bounds>,
}

impl ZoneRegistry {
    pub fn new(zones: impl IntoIterator<Item = Zone>) -> Result<Self, ConfigurationError> {
        let mut registry = IndexMap::new();
        for zone in zones {
            if let Some(reason) = zone.bounds.defect() {
                return Err(ConfigurationError::InvalidZone {
                    name: zone.name,
                    reason: reason.to_string(),
                });
            }
            if registry.contains_key(&zone.name) {
                return Err(ConfigurationError::DuplicateZone(zone.name));
            }
            registry.insert(zone.name, zone.bounds);
        }

        if registry.is_empty() {
            return Err(ConfigurationError::EmptyRegistry);
        }

        Ok(Self { zones: registry })
    }

    /// Resolves a zone name to its identifier.
    pub fn lookup(&self, name: &str) -> Result<ZoneId, ConfigurationError> {
        self.zones
            .get_index_of(name)
            .map(ZoneId)
            .ok_or_else(|| ConfigurationError::UnknownZone(name.to_string()))
    }

    /// `None` for an identifier that belongs to another registry.
    pub fn bounds(&self, id: ZoneId) -> Option<&Bounds> {
        self.zones.get_index(id.0).map(|(_, bounds)| bounds)
    }

    pub fn name(&self, id: ZoneId) -> &str {
        self.zones
            .get_index(id.0)
            .map(|(name, _)| name.as_str())
            .unwrap_or_default()
    }

    /// All zone identifiers in configuration order.
    pub fn ids(&self) -> impl Iterator<Item = ZoneId> + '_ {
        (0..self.zones.len()).map(ZoneId)
    }

    /// All zone names in configuration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.zones.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Zone {
        Zone::new(name, Bounds::new((x0, y0), (x1, y1)))
    }

    #[test]
    fn lookup_resolves_names_in_configuration_order() {
        let registry = ZoneRegistry::new(vec![
            square("box3", 300.0, 50.0, 500.0, 250.0),
            square("box1", 50.0, 50.0, 250.0, 250.0),
        ])
        .expect("valid registry");

        assert_eq!(registry.lookup("box3").unwrap().index(), 0);
        assert_eq!(registry.lookup("box1").unwrap().index(), 1);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["box3", "box1"]);
        assert_eq!(registry.name(registry.lookup("box1").unwrap()), "box1");
    }

    #[test]
    fn unknown_zone_is_reported_by_name() {
        let registry = ZoneRegistry::new(vec![square("box1", 0.0, 0.0, 1.0, 1.0)]).unwrap();
        match registry.lookup("box9") {
            Err(ConfigurationError::UnknownZone(name)) => assert_eq!(name, "box9"),
            other => panic!("expected UnknownZone, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let result = ZoneRegistry::new(vec![
            square("box1", 0.0, 0.0, 1.0, 1.0),
            square("box1", 2.0, 2.0, 3.0, 3.0),
        ]);
        assert!(matches!(result, Err(ConfigurationError::DuplicateZone(name)) if name == "box1"));
    }

    #[test]
    fn rejects_inverted_and_non_finite_bounds() {
        let inverted = ZoneRegistry::new(vec![square("flipped", 10.0, 0.0, 5.0, 5.0)]);
        assert!(matches!(inverted, Err(ConfigurationError::InvalidZone { .. })));

        let non_finite = ZoneRegistry::new(vec![square("nan", f64::NAN, 0.0, 5.0, 5.0)]);
        assert!(matches!(non_finite, Err(ConfigurationError::InvalidZone { .. })));
    }

    #[test]
    fn degenerate_zone_is_allowed() {
        let registry = ZoneRegistry::new(vec![square("dot", 5.0, 5.0, 5.0, 5.0)]);
        assert!(registry.is_ok());
    }

    #[test]
    fn rejects_empty_registry() {
        let result = ZoneRegistry::new(Vec::new());
        assert!(matches!(result, Err(ConfigurationError::EmptyRegistry)));
    }

    #[test]
    fn foreign_ids_have_no_bounds() {
        let wide = ZoneRegistry::new(vec![
            square("box1", 0.0, 0.0, 1.0, 1.0),
            square("box2", 2.0, 2.0, 3.0, 3.0),
        ])
        .unwrap();
        let narrow = ZoneRegistry::new(vec![square("box1", 0.0, 0.0, 1.0, 1.0)]).unwrap();
        let box2 = wide.lookup("box2").unwrap();

        assert!(narrow.bounds(box2).is_none());
        assert_eq!(narrow.name(box2), "");
        assert!(wide.bounds(box2).is_some());
    }
}
