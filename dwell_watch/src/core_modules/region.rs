// THEORY:
// The `region` module is the spatial leaf of the engine. It owns the geometry
// every other layer speaks in: an axis-aligned `Rect` in image-pixel space, a
// named `Region` carrying its own dwell threshold, and the `RegionSet` that a
// stream is configured with for its whole session.
//
// Key architectural principles:
// 1.  **Immutability**: A `RegionSet` is validated once when it is built and
//     never mutated afterwards. It is shared between stream workers behind an
//     `Arc` with no locking.
// 2.  **Deterministic Order**: Regions are kept in load order. The tracker walks
//     them in that order every frame, so the event sequence of a frame is a pure
//     function of its inputs.
// 3.  **Overlap, not Containment**: Membership is decided by `overlaps`, which
//     is true whenever a box touches a region at all. A person whose box merely
//     grazes a region's edge is already "in" it. Dwell timers therefore start
//     earlier than a full-containment test would start them, and that is the
//     behavior callers rely on.

use crate::config::SessionConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// An axis-aligned rectangle in image-pixel coordinates.
///
/// Serialised as `[x_min, y_min, x_max, y_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Rect {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Rect {
    pub const fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn is_finite(&self) -> bool {
        self.x_min.is_finite()
            && self.y_min.is_finite()
            && self.x_max.is_finite()
            && self.y_max.is_finite()
    }

    /// True when `x_min <= x_max` and `y_min <= y_max`.
    pub fn is_ordered(&self) -> bool {
        self.x_min <= self.x_max && self.y_min <= self.y_max
    }

    /// Returns the same rectangle with each axis' bounds put back in order.
    pub fn normalized(&self) -> Self {
        Self {
            x_min: self.x_min.min(self.x_max),
            y_min: self.y_min.min(self.y_max),
            x_max: self.x_min.max(self.x_max),
            y_max: self.y_min.max(self.y_max),
        }
    }
}

impl From<[f64; 4]> for Rect {
    fn from([x_min, y_min, x_max, y_max]: [f64; 4]) -> Self {
        Self::new(x_min, y_min, x_max, y_max)
    }
}

impl From<Rect> for [f64; 4] {
    fn from(rect: Rect) -> Self {
        [rect.x_min, rect.y_min, rect.x_max, rect.y_max]
    }
}

/// The membership test used by the dwell tracker.
///
/// True unless the two rectangles are disjoint. Shared edges count as overlap.
pub fn overlaps(bbox: &Rect, rect: &Rect) -> bool {
    !(bbox.x_max < rect.x_min
        || bbox.x_min > rect.x_max
        || bbox.y_max < rect.y_min
        || bbox.y_min > rect.y_max)
}

/// A named region of interest with its own dwell threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    /// Identifier, unique within its `RegionSet`.
    pub id: String,
    /// The region's rectangle.
    pub rect: Rect,
    /// Seconds a track must stay before a dwell alert fires. Zero or negative
    /// alerts on the first overlapping frame after entry.
    pub threshold: f64,
}

impl Region {
    pub fn new(id: impl Into<String>, rect: Rect, threshold: f64) -> Self {
        Self {
            id: id.into(),
            rect,
            threshold,
        }
    }
}

/// The ordered, immutable set of regions a stream is watched against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSet {
    regions: Vec<Region>,
}

impl RegionSet {
    /// Builds a set, rejecting empty input, duplicate ids, non-finite or
    /// inverted rectangles and non-finite thresholds.
    pub fn new(regions: Vec<Region>) -> Result<Self, ConfigError> {
        if regions.is_empty() {
            return Err(ConfigError::NoRegions);
        }

        let mut seen = HashSet::with_capacity(regions.len());
        for region in &regions {
            if !seen.insert(region.id.as_str()) {
                return Err(ConfigError::DuplicateRegion(region.id.clone()));
            }
            if !region.rect.is_finite() || !region.rect.is_ordered() {
                return Err(ConfigError::InvalidRect {
                    id: region.id.clone(),
                });
            }
            if region.threshold.is_nan() {
                return Err(ConfigError::InvalidThreshold {
                    id: region.id.clone(),
                });
            }
        }

        Ok(Self { regions })
    }

    /// Loads the regions of a JSON region file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        SessionConfig::load(path).map(|config| config.regions)
    }

    /// Regions in load order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|region| region.id == id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl<'a> IntoIterator for &'a RegionSet {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Rect {
        Rect::new(x_min, y_min, x_max, y_max)
    }

    #[test]
    fn overlap_is_not_containment() {
        let region = rect(0.0, 0.0, 10.0, 10.0);

        assert!(overlaps(&rect(1.0, 1.0, 2.0, 2.0), &region));
        // Only the right half of the box is inside.
        assert!(overlaps(&rect(-5.0, 2.0, 3.0, 4.0), &region));
        // The box encloses the whole region.
        assert!(overlaps(&rect(-1.0, -1.0, 11.0, 11.0), &region));
    }

    #[test]
    fn touching_edges_overlap() {
        let region = rect(0.0, 0.0, 10.0, 10.0);

        assert!(overlaps(&rect(10.0, 3.0, 12.0, 4.0), &region));
        assert!(overlaps(&rect(-4.0, -4.0, 0.0, 0.0), &region));
    }

    #[test]
    fn disjoint_boxes_do_not_overlap() {
        let region = rect(0.0, 0.0, 10.0, 10.0);

        assert!(!overlaps(&rect(10.5, 0.0, 12.0, 10.0), &region));
        assert!(!overlaps(&rect(-3.0, 0.0, -0.5, 10.0), &region));
        assert!(!overlaps(&rect(0.0, 11.0, 10.0, 20.0), &region));
        assert!(!overlaps(&rect(0.0, -9.0, 10.0, -1.0), &region));
    }

    #[test]
    fn zero_area_region_still_matches_boxes_covering_it() {
        let point = rect(5.0, 5.0, 5.0, 5.0);
        assert_eq!(point.area(), 0.0);

        assert!(overlaps(&rect(4.0, 4.0, 6.0, 6.0), &point));
        assert!(!overlaps(&rect(6.0, 6.0, 7.0, 7.0), &point));
    }

    #[test]
    fn normalized_swaps_inverted_bounds() {
        let inverted = rect(10.0, 8.0, 2.0, 4.0);
        assert!(!inverted.is_ordered());

        assert_eq!(inverted.normalized(), rect(2.0, 4.0, 10.0, 8.0));
    }

    #[test]
    fn rect_reads_from_coordinate_array() {
        let parsed: Rect = serde_json::from_str("[1, 2.5, 3, 4]").unwrap();
        assert_eq!(parsed, rect(1.0, 2.5, 3.0, 4.0));
    }

    #[test]
    fn region_set_keeps_load_order() {
        let set = RegionSet::new(vec![
            Region::new("door", rect(0.0, 0.0, 1.0, 1.0), 5.0),
            Region::new("desk", rect(2.0, 2.0, 3.0, 3.0), 5.0),
            Region::new("aisle", rect(4.0, 4.0, 5.0, 5.0), 5.0),
        ])
        .unwrap();

        let ids: Vec<&str> = set.regions().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["door", "desk", "aisle"]);
        assert!(set.iter().map(|r| &r.id).eq(set.regions().iter().map(|r| &r.id)));
        assert_eq!(set.get("desk").unwrap().rect, rect(2.0, 2.0, 3.0, 3.0));
        assert!(set.get("lobby").is_none());
    }

    #[test]
    fn region_set_rejects_bad_input() {
        assert!(matches!(RegionSet::new(vec![]), Err(ConfigError::NoRegions)));

        let duplicate = RegionSet::new(vec![
            Region::new("a", rect(0.0, 0.0, 1.0, 1.0), 1.0),
            Region::new("a", rect(0.0, 0.0, 2.0, 2.0), 1.0),
        ]);
        assert!(matches!(duplicate, Err(ConfigError::DuplicateRegion(id)) if id == "a"));

        let inverted = RegionSet::new(vec![Region::new("a", rect(5.0, 0.0, 1.0, 1.0), 1.0)]);
        assert!(matches!(inverted, Err(ConfigError::InvalidRect { .. })));

        let nan = RegionSet::new(vec![Region::new("a", rect(0.0, 0.0, 1.0, 1.0), f64::NAN)]);
        assert!(matches!(nan, Err(ConfigError::InvalidThreshold { .. })));
    }

    #[test]
    fn non_positive_thresholds_are_legal() {
        let set = RegionSet::new(vec![
            Region::new("instant", rect(0.0, 0.0, 1.0, 1.0), 0.0),
            Region::new("negative", rect(0.0, 0.0, 1.0, 1.0), -2.0),
        ]);
        assert!(set.is_ok());
    }
}
