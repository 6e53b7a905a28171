// THEORY:
// The `pipeline` module is the top-level, per-stream API of the engine. It
// wraps the occupancy tracker in the plumbing every caller would otherwise
// rewrite: cleaning detector output at the boundary, remembering which session
// it belongs to, logging what happened, and handing back a single report per
// frame.
//
// One `StreamPipeline` serves exactly one video stream. It owns its tracker
// outright; the only thing it shares is the read-only `RegionSet`.

use crate::config::{PipelineConfig, TrackerConfig};
use crate::core_modules::detection::{Detection, TrackId};
use crate::core_modules::event::OccupancyEvent;
use crate::core_modules::region::RegionSet;
use crate::core_modules::tracker::OccupancyTracker;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::tracker::StayRecord;

/// One frame of detector output, stamped with the caller's clock in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub timestamp: f64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            timestamp,
            detections,
        }
    }
}

/// The output of a `StreamPipeline` for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    /// Zero-based position of the frame in its stream.
    pub frame_index: u64,
    pub timestamp: f64,
    /// The tracker's events, in region order, after one-shot filtering.
    pub events: Vec<OccupancyEvent>,
    /// Detections refused at the boundary (class, confidence or broken geometry).
    pub dropped_detections: usize,
    /// Detections passed to the tracker without an identity.
    pub anonymous_detections: usize,
    /// The frame's timestamp was not finite, so the tracker never saw it.
    pub rejected: bool,
}

impl FrameReport {
    pub fn alerts(&self) -> impl Iterator<Item = &OccupancyEvent> {
        self.events.iter().filter(|event| event.is_alert())
    }

    pub fn has_alerts(&self) -> bool {
        self.alerts().next().is_some()
    }
}

/// Running totals for a stream, reported when it shuts down.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamSummary {
    pub stream: String,
    pub frames_processed: u64,
    /// Frames refused because their timestamp was not finite.
    pub frames_rejected: u64,
    pub alerts_raised: u64,
    /// Tracks still inside a region (not in a grace window) at the last frame.
    pub active_tracks: usize,
}

/// The per-stream engine: boundary cleanup, occupancy tracking and logging.
pub struct StreamPipeline {
    name: String,
    regions: Arc<RegionSet>,
    tracker: OccupancyTracker,
    config: PipelineConfig,
    frames_processed: u64,
    frames_rejected: u64,
    alerts_raised: u64,
    /// (track, region) pairs already alerted in their current stay. Only used
    /// with `one_shot_alerts`.
    alerted: HashSet<(TrackId, String)>,
}

impl StreamPipeline {
    pub fn new(
        name: impl Into<String>,
        regions: Arc<RegionSet>,
        tracker_config: TrackerConfig,
        config: PipelineConfig,
    ) -> Self {
        Self {
            name: name.into(),
            regions,
            tracker: OccupancyTracker::new(tracker_config),
            config,
            frames_processed: 0,
            frames_rejected: 0,
            alerts_raised: 0,
            alerted: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn tracker(&self) -> &OccupancyTracker {
        &self.tracker
    }

    /// Convenience wrapper around `process_frame` for callers that only need
    /// to know whether anything crossed a dwell threshold.
    pub fn alert_detected(&mut self, frame: &Frame) -> bool {
        self.process_frame(frame).has_alerts()
    }

    pub fn process_frame(&mut self, frame: &Frame) -> FrameReport {
        let frame_index = self.frames_processed + self.frames_rejected;

        // Stage 1: Boundary cleanup
        // Non-finite clocks are refused before they reach any stay record.
        if !frame.timestamp.is_finite() {
            warn!(stream = %self.name, frame_index, timestamp = frame.timestamp, "rejecting frame with non-finite timestamp");
            self.frames_rejected += 1;
            return FrameReport {
                frame_index,
                timestamp: frame.timestamp,
                events: Vec::new(),
                dropped_detections: frame.detections.len(),
                anonymous_detections: 0,
                rejected: true,
            };
        }

        let total = frame.detections.len();
        let detections: Vec<Detection> = frame
            .detections
            .iter()
            .filter(|d| self.accepts(d))
            .filter_map(|d| {
                let clean = d.clone().sanitized();
                if clean.is_none() {
                    debug!(stream = %self.name, bbox = ?d.bbox, "dropping detection with non-finite box");
                }
                clean
            })
            .collect();
        let dropped_detections = total - detections.len();
        let anonymous_detections = detections.iter().filter(|d| d.track_id.is_none()).count();
        if anonymous_detections > 0 {
            trace!(stream = %self.name, count = anonymous_detections, "detections without track id skipped");
        }

        // Stage 2: Occupancy tracking
        let raw_events = self
            .tracker
            .update(frame.timestamp, &detections, &self.regions);

        // Stage 3: Alert cadence
        let events = if self.config.one_shot_alerts {
            self.suppress_repeat_alerts(raw_events)
        } else {
            raw_events
        };

        // Stage 4: Reporting
        for event in &events {
            self.log_event(event);
        }
        self.alerts_raised += events.iter().filter(|e| e.is_alert()).count() as u64;

        let report = FrameReport {
            frame_index,
            timestamp: frame.timestamp,
            events,
            dropped_detections,
            anonymous_detections,
            rejected: false,
        };
        self.frames_processed += 1;
        report
    }

    pub fn summary(&self) -> StreamSummary {
        StreamSummary {
            stream: self.name.clone(),
            frames_processed: self.frames_processed,
            frames_rejected: self.frames_rejected,
            alerts_raised: self.alerts_raised,
            active_tracks: self.tracker.active_tracks().count(),
        }
    }

    fn accepts(&self, detection: &Detection) -> bool {
        if let (Some(wanted), Some(class_id)) = (self.config.class_filter, detection.class_id) {
            if wanted != class_id {
                return false;
            }
        }
        if let (Some(floor), Some(confidence)) = (self.config.min_confidence, detection.confidence) {
            if confidence < floor {
                return false;
            }
        }
        true
    }

    fn suppress_repeat_alerts(&mut self, events: Vec<OccupancyEvent>) -> Vec<OccupancyEvent> {
        let mut kept = Vec::with_capacity(events.len());
        for event in events {
            match &event {
                OccupancyEvent::Entered { track_id, .. }
                | OccupancyEvent::RegionChanged { track_id, .. }
                | OccupancyEvent::Removed { track_id, .. } => {
                    self.alerted.retain(|(alerted, _)| alerted != track_id);
                }
                OccupancyEvent::DwellAlert {
                    track_id,
                    region_id,
                    ..
                } => {
                    if !self.alerted.insert((*track_id, region_id.clone())) {
                        continue;
                    }
                }
                OccupancyEvent::RegionEmpty { .. } => {}
            }
            kept.push(event);
        }
        kept
    }

    fn log_event(&self, event: &OccupancyEvent) {
        let stream = self.name.as_str();
        match event {
            OccupancyEvent::Entered {
                track_id,
                region_id,
                at,
            } => info!(stream, %track_id, region = %region_id, at, "track entered region"),
            OccupancyEvent::RegionChanged {
                track_id,
                from,
                to,
                at,
            } => info!(stream, %track_id, from = %from, to = %to, at, "track changed region"),
            OccupancyEvent::DwellAlert {
                track_id,
                region_id,
                stay,
            } => warn!(stream, %track_id, region = %region_id, stay, "dwell threshold exceeded"),
            OccupancyEvent::Removed {
                track_id,
                region_id,
            } => info!(stream, %track_id, region = %region_id, "track left region"),
            OccupancyEvent::RegionEmpty { region_id } => {
                trace!(stream, region = %region_id, "region empty")
            }
        }
    }
}
