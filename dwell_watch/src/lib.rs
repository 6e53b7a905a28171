// THEORY:
// This file is the main entry point for the `dwell_watch` library crate. It
// exports the per-stream `StreamPipeline`, the multi-stream
// `MultiStreamPipeline`, and the data structures they speak (`RegionSet`,
// `Detection`, `Frame`, `FrameReport`, `OccupancyEvent`), which together are
// the interface to the engine.
//
// The dwell-time state machine itself lives in `core_modules::tracker` and can
// be driven directly by callers that bring their own frame loop.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{PipelineConfig, SessionConfig, TrackerConfig};
pub use core_modules::detection::{Detection, TrackId};
pub use core_modules::event::OccupancyEvent;
pub use core_modules::region::{overlaps, Rect, Region, RegionSet};
pub use core_modules::tracker::{OccupancyTracker, StayRecord};
pub use error::{ConfigError, PipelineError};
pub use parallel_pipeline::{MultiStreamPipeline, StreamHandle, StreamReport};
pub use pipeline::{Frame, FrameReport, StreamPipeline, StreamSummary};
