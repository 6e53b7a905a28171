// THEORY:
// The `parallel_pipeline` module runs many video streams at once. Each stream
// gets its own tokio task that owns a `StreamPipeline` outright and processes
// its frames strictly in arrival order; there is no worker pool shuffling
// frames between tasks, because dwell state only makes sense when a single
// owner sees every frame of its stream.
//
// Key architectural principles:
// 1.  **Share Nothing Mutable**: The only shared value is the `RegionSet`,
//     behind an `Arc`. Trackers never leave their task, so no locks are needed.
// 2.  **Channels at the Edges**: Frames go in through a per-stream bounded
//     `mpsc` channel (back-pressure on a slow stream stays on that stream) and
//     reports come out through one shared channel tagged with the stream name.
// 3.  **Cancellation by Dropping**: Dropping a `StreamHandle` closes that
//     stream's input. Its task drains what is queued and exits; nothing needs
//     flushing because nothing is persisted.

use crate::config::{PipelineConfig, TrackerConfig};
use crate::core_modules::region::RegionSet;
use crate::error::PipelineError;
use crate::pipeline::{Frame, FrameReport, StreamPipeline, StreamSummary};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const FRAME_QUEUE_DEPTH: usize = 32;
const REPORT_QUEUE_DEPTH: usize = 256;

/// A report tagged with the stream it came from.
#[derive(Debug, Clone)]
pub struct StreamReport {
    pub stream: String,
    pub report: FrameReport,
}

/// The input side of one running stream.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    name: String,
    frame_sender: mpsc::Sender<Frame>,
}

impl StreamHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues a frame for the stream's worker, waiting if its queue is full.
    pub async fn submit(&self, frame: Frame) -> Result<(), PipelineError> {
        self.frame_sender
            .send(frame)
            .await
            .map_err(|_| PipelineError::StreamClosed(self.name.clone()))
    }
}

/// Runs one `StreamPipeline` per stream, each on its own task.
pub struct MultiStreamPipeline {
    regions: Arc<RegionSet>,
    tracker_config: TrackerConfig,
    config: PipelineConfig,
    report_sender: mpsc::Sender<StreamReport>,
    workers: HashMap<String, JoinHandle<StreamSummary>>,
}

impl MultiStreamPipeline {
    /// Creates the runner and the receiver every stream's reports arrive on.
    ///
    /// The receiver must be drained; a full report queue pauses the workers.
    pub fn new(
        regions: Arc<RegionSet>,
        tracker_config: TrackerConfig,
        config: PipelineConfig,
    ) -> (Self, mpsc::Receiver<StreamReport>) {
        let (report_sender, report_receiver) = mpsc::channel(REPORT_QUEUE_DEPTH);
        let runner = Self {
            regions,
            tracker_config,
            config,
            report_sender,
            workers: HashMap::new(),
        };
        (runner, report_receiver)
    }

    pub fn stream_count(&self) -> usize {
        self.workers.len()
    }

    /// Starts a worker for a new stream and returns its input handle.
    pub fn add_stream(&mut self, name: impl Into<String>) -> Result<StreamHandle, PipelineError> {
        let name = name.into();
        if self.workers.contains_key(&name) {
            return Err(PipelineError::DuplicateStream(name));
        }

        let (frame_sender, frame_receiver) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let pipeline = StreamPipeline::new(
            name.clone(),
            Arc::clone(&self.regions),
            self.tracker_config.clone(),
            self.config.clone(),
        );
        let worker = tokio::spawn(Self::run_stream(
            pipeline,
            frame_receiver,
            self.report_sender.clone(),
        ));
        self.workers.insert(name.clone(), worker);
        info!(stream = %name, "stream started");

        Ok(StreamHandle { name, frame_sender })
    }

    async fn run_stream(
        mut pipeline: StreamPipeline,
        mut frame_receiver: mpsc::Receiver<Frame>,
        report_sender: mpsc::Sender<StreamReport>,
    ) -> StreamSummary {
        while let Some(frame) = frame_receiver.recv().await {
            let report = pipeline.process_frame(&frame);
            let tagged = StreamReport {
                stream: pipeline.name().to_string(),
                report,
            };
            if report_sender.send(tagged).await.is_err() {
                debug!(stream = %pipeline.name(), "report receiver dropped, stopping stream");
                break;
            }
        }
        let summary = pipeline.summary();
        info!(
            stream = %summary.stream,
            frames = summary.frames_processed,
            alerts = summary.alerts_raised,
            "stream stopped"
        );
        summary
    }

    /// Waits for every stream to finish and returns their summaries, sorted by
    /// stream name.
    ///
    /// Every worker is joined even if some panicked; the error then carries the
    /// failed stream names and the summaries of the rest.
    ///
    /// Streams finish once all of their `StreamHandle`s are dropped, so drop
    /// (or stop using) the handles before awaiting this.
    pub async fn shutdown(self) -> Result<Vec<StreamSummary>, PipelineError> {
        let Self {
            workers,
            report_sender,
            ..
        } = self;
        drop(report_sender);

        let (names, handles): (Vec<String>, Vec<JoinHandle<StreamSummary>>) =
            workers.into_iter().unzip();
        let mut summaries = Vec::with_capacity(names.len());
        let mut failed = Vec::new();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(err) => {
                    warn!(stream = %name, error = %err, "stream worker failed");
                    failed.push(name);
                }
            }
        }
        summaries.sort_by(|a, b| a.stream.cmp(&b.stream));

        if failed.is_empty() {
            Ok(summaries)
        } else {
            failed.sort();
            Err(PipelineError::WorkerPanicked {
                streams: failed,
                summaries,
            })
        }
    }
}
