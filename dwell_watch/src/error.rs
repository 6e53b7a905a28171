use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::StreamSummary;

/// Failures while loading or validating a region configuration.
///
/// Any of these is fatal for the stream that requested the configuration: the
/// stream does not start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read region file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed region configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("region configuration contains no regions")]
    NoRegions,

    #[error("region id `{0}` is defined more than once")]
    DuplicateRegion(String),

    #[error("region `{id}` has a non-finite or inverted rectangle")]
    InvalidRect { id: String },

    #[error("region `{id}` has a dwell threshold that is not a number")]
    InvalidThreshold { id: String },

    #[error("grace period must be finite and non-negative, got {0}")]
    InvalidGracePeriod(f64),
}

/// Failures of the multi-stream runner. The dwell algorithm itself never fails.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stream `{0}` is already registered")]
    DuplicateStream(String),

    #[error("stream `{0}` is no longer accepting frames")]
    StreamClosed(String),

    /// One or more workers panicked. The summaries of the streams that did
    /// finish are kept.
    #[error("workers for streams {streams:?} panicked")]
    WorkerPanicked {
        streams: Vec<String>,
        summaries: Vec<StreamSummary>,
    },
}
