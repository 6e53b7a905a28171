// THEORY:
// A `Detection` is the boundary contract with the external detector/tracker.
// It is a single-frame snapshot: a box, the identity the tracker assigned to
// it (if any), and whatever class/confidence metadata the detector attached.
// Nothing in this crate keeps a `Detection` beyond the frame it arrived in.
//
// Geometry is cleaned up here, at the edge, and never inside the dwell state
// machine: inverted boxes are put back in order and boxes with NaN or infinite
// coordinates are refused.

use crate::core_modules::region::Rect;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable per-object identity assigned by the upstream tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

impl From<u64> for TrackId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// One detected object in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Identity from the upstream tracker. Detections without one are never tracked.
    #[serde(default)]
    pub track_id: Option<TrackId>,
    /// The object's bounding box, `[x_min, y_min, x_max, y_max]` on the wire.
    #[serde(rename = "box")]
    pub bbox: Rect,
    /// Detector class, e.g. `0` for "person" on COCO-trained models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Detection {
    pub fn new(track_id: Option<TrackId>, bbox: Rect) -> Self {
        Self {
            track_id,
            bbox,
            class_id: None,
            confidence: None,
        }
    }

    /// Shorthand for a detection the upstream tracker has identified.
    pub fn tracked(track_id: impl Into<TrackId>, bbox: Rect) -> Self {
        Self::new(Some(track_id.into()), bbox)
    }

    pub fn with_class(mut self, class_id: u32) -> Self {
        self.class_id = Some(class_id);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Returns the detection with an ordered box, or `None` if any coordinate
    /// is NaN or infinite.
    pub fn sanitized(mut self) -> Option<Self> {
        if !self.bbox.is_finite() {
            return None;
        }
        self.bbox = self.bbox.normalized();
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_orders_inverted_boxes() {
        let detection = Detection::tracked(7, Rect::new(20.0, 30.0, 10.0, 5.0));

        let clean = detection.sanitized().unwrap();
        assert_eq!(clean.bbox, Rect::new(10.0, 5.0, 20.0, 30.0));
        assert_eq!(clean.track_id, Some(TrackId(7)));
    }

    #[test]
    fn sanitized_rejects_non_finite_boxes() {
        let nan = Detection::tracked(1, Rect::new(f64::NAN, 0.0, 1.0, 1.0));
        let inf = Detection::tracked(1, Rect::new(0.0, 0.0, f64::INFINITY, 1.0));

        assert!(nan.sanitized().is_none());
        assert!(inf.sanitized().is_none());
    }

    #[test]
    fn parses_detector_output() {
        let detection: Detection = serde_json::from_str(
            r#"{"track_id": 12, "box": [100, 40, 180, 300], "class_id": 0, "confidence": 0.83}"#,
        )
        .unwrap();

        assert_eq!(detection.track_id, Some(TrackId(12)));
        assert_eq!(detection.bbox, Rect::new(100.0, 40.0, 180.0, 300.0));
        assert_eq!(detection.class_id, Some(0));
    }

    #[test]
    fn missing_identity_parses_as_none() {
        let with_null: Detection =
            serde_json::from_str(r#"{"track_id": null, "box": [0, 0, 1, 1]}"#).unwrap();
        let without: Detection = serde_json::from_str(r#"{"box": [0, 0, 1, 1]}"#).unwrap();

        assert_eq!(with_null.track_id, None);
        assert_eq!(without.track_id, None);
    }
}
