use anyhow::{bail, Context, Result};
use clap::Parser;
use dwell_watch::{
    Frame, MultiStreamPipeline, OccupancyEvent, PipelineConfig, SessionConfig, StreamHandle,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Replays recorded detector/tracker output through the dwell engine.
///
/// Each stream file holds one JSON frame per line:
/// `{"timestamp": 12.4, "detections": [{"track_id": 3, "box": [10, 20, 80, 200], "class_id": 0}]}`
#[derive(Parser, Debug)]
#[command(name = "replay_tester", version, about = "Replay detection logs through the dwell engine")]
struct Args {
    /// JSON region file.
    #[arg(long, value_name = "PATH")]
    regions: PathBuf,

    /// A stream to replay, as NAME=PATH. Repeat for several cameras.
    #[arg(long = "stream", value_name = "NAME=PATH", value_parser = parse_stream, required = true)]
    streams: Vec<(String, PathBuf)>,

    /// Only track this detector class (0 = person on COCO models).
    #[arg(long, default_value_t = 0, conflicts_with = "all_classes")]
    class_filter: u32,

    /// Track every detector class.
    #[arg(long)]
    all_classes: bool,

    /// Ignore detections below this confidence.
    #[arg(long, value_name = "SCORE")]
    min_confidence: Option<f32>,

    /// Report each dwell alert once per stay instead of on every frame.
    #[arg(long)]
    one_shot: bool,

    /// Print every event to stdout as a JSON line.
    #[arg(long)]
    json: bool,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Serialize)]
struct EventLine<'a> {
    stream: &'a str,
    frame: u64,
    timestamp: f64,
    #[serde(flatten)]
    event: &'a OccupancyEvent,
}

fn parse_stream(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got `{raw}`")),
    }
}

async fn replay(handle: StreamHandle, path: PathBuf) -> Result<u64> {
    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut frames = 0u64;
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let frame: Frame = serde_json::from_str(&line)
            .with_context(|| format!("{}:{line_number}: malformed frame", path.display()))?;
        if !frame.timestamp.is_finite() {
            bail!("{}:{line_number}: frame timestamp is not finite", path.display());
        }
        handle.submit(frame).await?;
        frames += 1;
    }

    info!(stream = handle.name(), frames, "replay finished");
    Ok(frames)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // --- 1. Configuration ---
    let session = SessionConfig::load(&args.regions)
        .with_context(|| format!("loading regions from {}", args.regions.display()))?;
    info!(
        regions = session.regions.len(),
        grace = session.tracker.grace_period_seconds,
        "region file loaded"
    );

    let config = PipelineConfig {
        class_filter: (!args.all_classes).then_some(args.class_filter),
        min_confidence: args.min_confidence,
        one_shot_alerts: args.one_shot,
    };

    // --- 2. Stream Workers ---
    let (mut runner, mut reports) =
        MultiStreamPipeline::new(Arc::new(session.regions), session.tracker, config);

    let mut replays = Vec::with_capacity(args.streams.len());
    for (name, path) in args.streams {
        let handle = runner.add_stream(name.clone())?;
        replays.push((name, tokio::spawn(replay(handle, path))));
    }

    // --- 3. Report Sink ---
    let print_json = args.json;
    let sink = tokio::spawn(async move {
        let mut alerts = 0u64;
        while let Some(tagged) = reports.recv().await {
            alerts += tagged.report.alerts().count() as u64;
            if print_json {
                for event in &tagged.report.events {
                    let line = EventLine {
                        stream: &tagged.stream,
                        frame: tagged.report.frame_index,
                        timestamp: tagged.report.timestamp,
                        event,
                    };
                    match serde_json::to_string(&line) {
                        Ok(json) => println!("{json}"),
                        Err(err) => error!(error = %err, "failed to encode event"),
                    }
                }
            }
        }
        alerts
    });

    // --- 4. Teardown ---
    let mut failed = false;
    for (name, replay) in replays {
        match replay.await.context("replay task panicked")? {
            Ok(_) => {}
            Err(err) => {
                error!(stream = %name, "replay failed: {err:#}");
                failed = true;
            }
        }
    }

    let summaries = runner.shutdown().await?;
    let alerts = sink.await.context("report sink panicked")?;

    for summary in &summaries {
        info!(
            stream = %summary.stream,
            frames = summary.frames_processed,
            alerts = summary.alerts_raised,
            active_tracks = summary.active_tracks,
            "stream summary"
        );
    }
    info!(streams = summaries.len(), alerts, "replay complete");

    if failed {
        bail!("one or more streams failed to replay");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_argument_splits_on_first_equals() {
        assert_eq!(
            parse_stream("cam0=logs/a=b.jsonl").unwrap(),
            ("cam0".to_string(), PathBuf::from("logs/a=b.jsonl"))
        );
        assert!(parse_stream("cam0").is_err());
        assert!(parse_stream("=path").is_err());
        assert!(parse_stream("cam0=").is_err());
    }

    #[test]
    fn arguments_build_pipeline_config() {
        let args = Args::parse_from([
            "replay_tester",
            "--regions",
            "regions.json",
            "--stream",
            "cam0=cam0.jsonl",
            "--stream",
            "cam1=cam1.jsonl",
            "--all-classes",
            "--one-shot",
        ]);

        assert_eq!(args.streams.len(), 2);
        assert!(args.all_classes);
        assert!(args.one_shot);
        assert_eq!(args.min_confidence, None);
    }

    #[test]
    fn event_line_flattens_event() {
        let event = OccupancyEvent::RegionEmpty {
            region_id: "r1".to_string(),
        };
        let line = EventLine {
            stream: "cam0",
            frame: 4,
            timestamp: 1.25,
            event: &event,
        };

        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"stream": "cam0", "frame": 4, "timestamp": 1.25, "event": "region_empty", "region_id": "r1"})
        );
    }
}
