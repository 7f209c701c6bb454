//! Work queue between the frame producer and the detection worker.
//!
//! A plain `std::sync::mpsc` channel: the producer sends frame paths in
//! capture order, the single worker receives and processes them.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::{debug, info};
use walkdir::WalkDir;

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// A frame waiting for detection.
#[derive(Debug, Clone)]
pub struct FrameWorkItem {
    pub path: PathBuf,
    /// Position in the capture sequence (1-based)
    pub index: u32,
    pub queued_at: DateTime<Utc>,
}

impl FrameWorkItem {
    pub fn new(path: PathBuf, index: u32) -> Self {
        Self {
            path,
            index,
            queued_at: Utc::now(),
        }
    }
}

/// Unbounded: frames queue up if detection is slower than capture.
pub fn create_work_queue() -> (Sender<FrameWorkItem>, Receiver<FrameWorkItem>) {
    channel()
}

fn is_frame(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| FRAME_EXTENSIONS.iter().any(|f| ext.eq_ignore_ascii_case(f)))
}

/// Queues every image directly inside `dir` in file name order.
/// Returns the number of frames queued.
pub fn queue_frames(dir: &Path, sender: &Sender<FrameWorkItem>) -> Result<usize> {
    if !dir.is_dir() {
        return Err(anyhow!("Frame directory not found: {}", dir.display()));
    }

    let mut count = 0u32;
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .follow_links(false)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Error reading frame directory: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_frame(entry.path()) {
            continue;
        }

        count += 1;
        sender
            .send(FrameWorkItem::new(entry.into_path(), count))
            .map_err(|_| anyhow!("Detection worker stopped before all frames were queued"))?;
    }

    info!("Queued {} frames from {}", count, dir.display());
    Ok(count as usize)
}
