//! Detection worker thread.
//!
//! Receives frames from the work queue, runs them through the pipeline and
//! writes one JSON line per processed frame.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::Receiver;
use tracing::{debug, error, info, warn};

use super::queue::FrameWorkItem;
use super::{FrameReport, Pipeline};

#[derive(Serialize)]
struct FrameLine<'a> {
    index: u32,
    path: &'a Path,
    queued_at: DateTime<Utc>,
    #[serde(flatten)]
    report: &'a FrameReport,
}

/// Counts reported when the queue closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub processed: usize,
    pub skipped: usize,
}

/// Runs the worker loop until the sender side of the queue is dropped.
///
/// Frames that cannot be loaded are skipped. Output write failures are
/// logged and the frame still counts as processed.
pub fn run_detection_worker<W: Write>(
    receiver: Receiver<FrameWorkItem>,
    mut pipeline: Pipeline,
    mut output: W,
) -> WorkerSummary {
    info!("Detection worker started");
    let mut summary = WorkerSummary::default();

    for item in receiver {
        debug!("Processing frame {} ({})", item.index, item.path.display());

        let frame = match image::open(&item.path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!("Skipping frame {} ({}): {}", item.index, item.path.display(), e);
                summary.skipped += 1;
                continue;
            }
        };

        let report = pipeline.process_frame(&frame);
        if let Some(transition) = &report.transition {
            info!(
                "Frame {}: {} -> {}",
                item.index, transition.from_state, transition.to_state
            );
        }

        let line = FrameLine {
            index: item.index,
            path: &item.path,
            queued_at: item.queued_at,
            report: &report,
        };
        let written = serde_json::to_string(&line)
            .map_err(anyhow::Error::from)
            .and_then(|json| writeln!(output, "{}", json).map_err(anyhow::Error::from));
        if let Err(e) = written {
            error!("Failed to write report for frame {}: {:#}", item.index, e);
        }
        summary.processed += 1;
    }

    if let Err(e) = output.flush() {
        error!("Failed to flush reports: {}", e);
    }
    info!(
        "Detection worker finished: {} processed, {} skipped",
        summary.processed, summary.skipped
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::detection::pixel::tests::idle_frame;
    use crate::detection::TemplateMatcher;
    use crate::ocr::NullRecognizer;
    use crate::pipeline::{create_work_queue, queue_frames};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn pipeline() -> Pipeline {
        Pipeline::new(
            &EngineConfig::default(),
            Arc::new(NullRecognizer),
            Box::new(TemplateMatcher::default()),
        )
    }

    #[test]
    fn test_worker_skips_unreadable_frames() {
        let dir = TempDir::new().unwrap();
        idle_frame().save(dir.path().join("0001.png")).unwrap();
        std::fs::write(dir.path().join("0002.png"), b"not a png").unwrap();
        image::RgbImage::new(64, 64).save(dir.path().join("0003.png")).unwrap();

        let (sender, receiver) = create_work_queue();
        let handle = thread::spawn(move || run_detection_worker(receiver, pipeline(), Vec::new()));
        queue_frames(dir.path(), &sender).unwrap();
        drop(sender);

        let summary = handle.join().unwrap();
        assert_eq!(summary, WorkerSummary { processed: 2, skipped: 1 });
    }

    #[test]
    fn test_worker_writes_json_lines() {
        let dir = TempDir::new().unwrap();
        idle_frame().save(dir.path().join("0001.png")).unwrap();
        image::RgbImage::new(64, 64).save(dir.path().join("0002.png")).unwrap();

        let (sender, receiver) = create_work_queue();
        queue_frames(dir.path(), &sender).unwrap();
        drop(sender);

        let mut output = Vec::new();
        let summary = run_detection_worker(receiver, pipeline(), &mut output);
        assert_eq!(summary.processed, 2);

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0]["index"], 1);
        assert_eq!(lines[0]["detection"]["state"], "idle");
        assert!(lines[0]["transition"].is_null());

        // Black frame: loading, confident enough to transition
        assert_eq!(lines[1]["detection"]["state"], "loading");
        assert_eq!(lines[1]["state"], "loading");
        assert_eq!(lines[1]["transition"]["to_state"], "loading");
    }
}
