use crate::core_modules::detection::TrackId;
use serde::Serialize;

/// Everything the occupancy tracker reports about a single frame.
///
/// Times are in the caller's timestamp domain (seconds). `stay` is the number
/// of seconds since the current stay began.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OccupancyEvent {
    /// A track with no stay record started staying in a region.
    Entered {
        track_id: TrackId,
        region_id: String,
        at: f64,
    },
    /// A track moved straight from one region to another. Its dwell clock restarted.
    RegionChanged {
        track_id: TrackId,
        from: String,
        to: String,
        at: f64,
    },
    /// A track has stayed in a region for at least the region's threshold.
    /// Repeats on every frame the condition holds.
    DwellAlert {
        track_id: TrackId,
        region_id: String,
        stay: f64,
    },
    /// A track was absent from its region for longer than the grace period
    /// and its record was dropped.
    Removed { track_id: TrackId, region_id: String },
    /// No identified detection overlapped the region this frame.
    RegionEmpty { region_id: String },
}

impl OccupancyEvent {
    /// The track this event is about, if any.
    pub fn track_id(&self) -> Option<TrackId> {
        match self {
            Self::Entered { track_id, .. }
            | Self::RegionChanged { track_id, .. }
            | Self::DwellAlert { track_id, .. }
            | Self::Removed { track_id, .. } => Some(*track_id),
            Self::RegionEmpty { .. } => None,
        }
    }

    /// The region this event is about. For `RegionChanged` this is the new region.
    pub fn region_id(&self) -> &str {
        match self {
            Self::Entered { region_id, .. }
            | Self::DwellAlert { region_id, .. }
            | Self::Removed { region_id, .. }
            | Self::RegionEmpty { region_id } => region_id,
            Self::RegionChanged { to, .. } => to,
        }
    }

    pub fn is_alert(&self) -> bool {
        matches!(self, Self::DwellAlert { .. })
    }
}
