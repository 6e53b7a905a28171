// THEORY:
// The `tracker` module is the heart of the engine. It adds memory to a stream
// of stateless per-frame detections: for every identified object it remembers
// which region the object is staying in, when that stay began, and, once the
// object has been seen outside, when it left.
//
// Key architectural principles:
// 1.  **One Record per Track**: The `OccupancyTracker` owns a map from
//     `TrackId` to `StayRecord`. A track is staying in at most one region at a
//     time; moving straight into another region overwrites the record and
//     restarts the dwell clock.
// 2.  **Region-Major Evaluation**: Each frame is evaluated region by region in
//     the `RegionSet`'s order. Within a region every identified detection is
//     tested for overlap, and afterwards every record pointing at that region
//     that was not reaffirmed goes through the exit/grace rule exactly once.
// 3.  **Grace Before Removal**: A track that leaves (or simply stops being
//     detected) is not forgotten immediately. Its `exit_time` is stamped on the
//     first frame of absence and the record is dropped only once the absence
//     exceeds the grace period. Coming back inside the window resumes the
//     original stay, so a person briefly occluded keeps accruing dwell time.
// 4.  **Logical Time**: The tracker never reads a clock. Every decision is a
//     function of the `now` the caller passes in, which keeps it deterministic
//     and testable without sleeping.
// 5.  **No Side Effects**: `update` performs no I/O and never fails. It returns
//     the frame's events and keeps none of them.

use crate::config::TrackerConfig;
use crate::core_modules::detection::{Detection, TrackId};
use crate::core_modules::event::OccupancyEvent;
use crate::core_modules::region::{overlaps, RegionSet};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};

/// What the tracker remembers about one identified object.
#[derive(Debug, Clone, PartialEq)]
pub struct StayRecord {
    /// The region the track is staying in, or last stayed in while its grace
    /// window runs.
    pub region_id: String,
    /// When the current stay in `region_id` began.
    pub start_time: f64,
    /// The first frame the track was seen absent from `region_id`. Set once and
    /// cleared only by re-entry.
    pub exit_time: Option<f64>,
}

impl StayRecord {
    fn new(region_id: String, now: f64) -> Self {
        Self {
            region_id,
            start_time: now,
            exit_time: None,
        }
    }

    /// Seconds since the current stay began.
    pub fn stay(&self, now: f64) -> f64 {
        now - self.start_time
    }

    /// True while the track is absent but not yet reclaimed.
    pub fn is_pending_exit(&self) -> bool {
        self.exit_time.is_some()
    }
}

/// Per-stream region occupancy and dwell-time state machine.
///
/// One instance per video stream. It is not shared between streams and is
/// never updated concurrently, so it carries no locks.
#[derive(Debug, Clone, Default)]
pub struct OccupancyTracker {
    /// Ordered so that grace handling emits events in track-id order.
    records: BTreeMap<TrackId, StayRecord>,
    config: TrackerConfig,
}

impl OccupancyTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            records: BTreeMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Ingests one frame of detections observed at `now` and returns the
    /// frame's events in region order.
    pub fn update(
        &mut self,
        now: f64,
        detections: &[Detection],
        regions: &RegionSet,
    ) -> Vec<OccupancyEvent> {
        let mut events = Vec::new();
        let mut reaffirmed: HashSet<TrackId> = HashSet::with_capacity(detections.len());
        let grace = self.config.grace_period_seconds;

        for region in regions {
            reaffirmed.clear();
            let mut occupied = false;

            // --- 1. Membership ---
            let identified = detections
                .iter()
                .filter_map(|d| d.track_id.map(|track_id| (track_id, &d.bbox)));

            for (track_id, bbox) in identified {
                if !overlaps(bbox, &region.rect) {
                    continue;
                }
                occupied = true;
                reaffirmed.insert(track_id);

                let record = match self.records.entry(track_id) {
                    Entry::Vacant(slot) => {
                        events.push(OccupancyEvent::Entered {
                            track_id,
                            region_id: region.id.clone(),
                            at: now,
                        });
                        slot.insert(StayRecord::new(region.id.clone(), now))
                    }
                    Entry::Occupied(slot) => {
                        let record = slot.into_mut();
                        if record.region_id == region.id {
                            record.exit_time = None;
                        } else {
                            let from = std::mem::replace(&mut record.region_id, region.id.clone());
                            record.start_time = now;
                            record.exit_time = None;
                            events.push(OccupancyEvent::RegionChanged {
                                track_id,
                                from,
                                to: region.id.clone(),
                                at: now,
                            });
                        }
                        record
                    }
                };

                // A fresh stay is zero seconds old, so this only fires on entry
                // for regions with a non-positive threshold.
                let stay = record.stay(now);
                if stay >= region.threshold {
                    events.push(OccupancyEvent::DwellAlert {
                        track_id,
                        region_id: region.id.clone(),
                        stay,
                    });
                }
            }

            // --- 2. Exit and grace ---
            self.records.retain(|track_id, record| {
                if record.region_id != region.id || reaffirmed.contains(track_id) {
                    return true;
                }
                let exit_time = *record.exit_time.get_or_insert(now);
                if now - exit_time > grace {
                    events.push(OccupancyEvent::Removed {
                        track_id: *track_id,
                        region_id: region.id.clone(),
                    });
                    return false;
                }
                true
            });

            // --- 3. Empty region ---
            if !occupied {
                events.push(OccupancyEvent::RegionEmpty {
                    region_id: region.id.clone(),
                });
            }
        }

        events
    }

    /// The stay record for a track, if the tracker still holds one.
    pub fn record(&self, track_id: TrackId) -> Option<&StayRecord> {
        self.records.get(&track_id)
    }

    /// All held records, including those in their grace window, in track order.
    pub fn records(&self) -> impl Iterator<Item = (TrackId, &StayRecord)> {
        self.records.iter().map(|(id, record)| (*id, record))
    }

    /// Tracks currently seen inside their region (not in a grace window).
    pub fn active_tracks(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.records
            .iter()
            .filter(|(_, record)| !record.is_pending_exit())
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forgets every record, as if the stream had just started.
    pub fn reset(&mut self) {
        self.records.clear();
    }
}
