// THEORY:
// Configuration is loaded once, before a stream starts, and is immutable for
// the rest of the session. The on-disk format is the JSON region file the
// camera operators already maintain:
//
//     {
//       "dwell_threshold_seconds": 5,
//       "grace_period_seconds": 3.0,
//       "regions": [
//         { "id": "register", "coordinates": [120, 80, 340, 400] },
//         { "id": "exit", "coordinates": [500, 0, 640, 480], "threshold_seconds": 2.5 }
//       ]
//     }
//
// Everything except `regions` is optional. Raw file structs are private and
// converted into validated domain types (`RegionSet`, `TrackerConfig`) so a
// half-valid configuration can never reach a running stream.

use crate::core_modules::region::{Rect, Region, RegionSet};
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Dwell threshold applied to regions that do not set their own.
pub const DEFAULT_DWELL_THRESHOLD_SECONDS: f64 = 5.0;
/// How long an absent track is remembered before its record is dropped.
pub const DEFAULT_GRACE_PERIOD_SECONDS: f64 = 3.0;
/// COCO class id of "person", the class the dwell alerts were built for.
pub const PERSON_CLASS_ID: u32 = 0;

/// Tunables of the occupancy state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Seconds of continuous absence after which a stay record is deleted.
    /// An absence of exactly this long is still within grace.
    pub grace_period_seconds: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            grace_period_seconds: DEFAULT_GRACE_PERIOD_SECONDS,
        }
    }
}

/// Configuration for a `StreamPipeline`, i.e. everything around the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Keep only detections of this class. Detections without a class are kept.
    pub class_filter: Option<u32>,
    /// Drop detections below this confidence. Detections without a confidence are kept.
    pub min_confidence: Option<f32>,
    /// Report a `DwellAlert` once per stay instead of on every qualifying frame.
    /// The tracker itself still raises it every frame.
    pub one_shot_alerts: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            class_filter: Some(PERSON_CLASS_ID),
            min_confidence: None,
            one_shot_alerts: false,
        }
    }
}

/// A fully validated region file.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub regions: RegionSet,
    pub tracker: TrackerConfig,
}

#[derive(Debug, Deserialize)]
struct RegionFile {
    #[serde(default)]
    dwell_threshold_seconds: Option<f64>,
    #[serde(default)]
    grace_period_seconds: Option<f64>,
    regions: Vec<RegionEntry>,
}

#[derive(Debug, Deserialize)]
struct RegionEntry {
    id: String,
    coordinates: [i64; 4],
    #[serde(default)]
    threshold_seconds: Option<f64>,
}

impl SessionConfig {
    /// Reads and validates a region file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let file: RegionFile = serde_json::from_str(contents)?;
        Self::from_file(file)
    }

    fn from_file(file: RegionFile) -> Result<Self, ConfigError> {
        let grace = file
            .grace_period_seconds
            .unwrap_or(DEFAULT_GRACE_PERIOD_SECONDS);
        if !grace.is_finite() || grace < 0.0 {
            return Err(ConfigError::InvalidGracePeriod(grace));
        }

        let default_threshold = file
            .dwell_threshold_seconds
            .unwrap_or(DEFAULT_DWELL_THRESHOLD_SECONDS);

        let regions = file
            .regions
            .into_iter()
            .map(|entry| {
                let [x_min, y_min, x_max, y_max] = entry.coordinates;
                Region::new(
                    entry.id,
                    Rect::new(x_min as f64, y_min as f64, x_max as f64, y_max as f64),
                    entry.threshold_seconds.unwrap_or(default_threshold),
                )
            })
            .collect();

        Ok(Self {
            regions: RegionSet::new(regions)?,
            tracker: TrackerConfig {
                grace_period_seconds: grace,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{"regions": [{"id": "r1", "coordinates": [0, 0, 10, 10]}]}"#,
        )
        .unwrap();

        assert_eq!(config.tracker, TrackerConfig::default());
        let region = config.regions.get("r1").unwrap();
        assert_eq!(region.rect, Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(region.threshold, DEFAULT_DWELL_THRESHOLD_SECONDS);
    }

    #[test]
    fn per_region_threshold_overrides_default() {
        let config = SessionConfig::from_json_str(
            r#"{
                "dwell_threshold_seconds": 8,
                "grace_period_seconds": 1.5,
                "regions": [
                    {"id": "a", "coordinates": [0, 0, 10, 10]},
                    {"id": "b", "coordinates": [20, 0, 30, 10], "threshold_seconds": 2.5}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.regions.get("a").unwrap().threshold, 8.0);
        assert_eq!(config.regions.get("b").unwrap().threshold, 2.5);
        assert_eq!(config.tracker.grace_period_seconds, 1.5);
    }

    #[test]
    fn empty_region_list_is_rejected() {
        let result = SessionConfig::from_json_str(r#"{"regions": []}"#);
        assert!(matches!(result, Err(ConfigError::NoRegions)));
    }

    #[test]
    fn missing_fields_are_rejected() {
        let no_regions = SessionConfig::from_json_str(r#"{"grace_period_seconds": 3}"#);
        let no_coordinates = SessionConfig::from_json_str(r#"{"regions": [{"id": "a"}]}"#);
        let short_coordinates =
            SessionConfig::from_json_str(r#"{"regions": [{"id": "a", "coordinates": [0, 0, 1]}]}"#);
        let float_coordinates = SessionConfig::from_json_str(
            r#"{"regions": [{"id": "a", "coordinates": [0.5, 0, 1, 1]}]}"#,
        );

        for result in [no_regions, no_coordinates, short_coordinates, float_coordinates] {
            assert!(matches!(result, Err(ConfigError::Parse(_))));
        }
    }

    #[test]
    fn negative_grace_is_rejected() {
        let result = SessionConfig::from_json_str(
            r#"{"grace_period_seconds": -1, "regions": [{"id": "a", "coordinates": [0, 0, 1, 1]}]}"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidGracePeriod(g)) if g == -1.0));
    }

    #[test]
    fn load_reads_region_file_from_disk() {
        let path = std::env::temp_dir().join(format!("dwell_watch_regions_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"regions": [{"id": "desk", "coordinates": [5, 5, 50, 50]}, {"id": "door", "coordinates": [60, 0, 80, 90]}]}"#,
        )
        .unwrap();

        let regions = RegionSet::load(&path);
        std::fs::remove_file(&path).ok();

        let ids: Vec<String> = regions.unwrap().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, ["desk", "door"]);
    }

    #[test]
    fn unreadable_file_reports_path() {
        let missing = std::env::temp_dir().join("dwell_watch_definitely_missing.json");

        match SessionConfig::load(&missing) {
            Err(ConfigError::Io { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected an io error, got {other:?}"),
        }
    }
}
