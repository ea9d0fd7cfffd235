//! Progress monitoring for a running encode.
//!
//! The monitor polls the newest line of the encoder log, turns `frame=` /
//! `speed=` telemetry into a percentage and forwards only increases. When the
//! encoder exits the supervisor cancels the token and the monitor sends the
//! terminal 100% sample exactly once.

use std::sync::LazyLock;
use std::time::Duration;
use log::{debug, warn};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use crate::events::{EventSink, PipelineEvent, ProgressSample};
use crate::tail::LogTail;

static FRAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"frame=\s*(\d+)").expect("Invalid regex"));
static SPEED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"speed=\s*(\S+)").expect("Invalid regex"));

/// Frame number and speed token from an ffmpeg status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub frame: u64,
    pub speed: String,
}

/// Extract `frame=` and `speed=` from a status line; both must be present
pub fn parse_status_line(line: &str) -> Option<StatusLine> {
    if !line.contains("frame=") {
        return None;
    }

    let frame = FRAME_RE.captures(line)?.get(1)?.as_str().parse::<u64>().ok()?;
    let speed = SPEED_RE.captures(line)?.get(1)?.as_str().trim().to_string();

    Some(StatusLine { frame, speed })
}

/// Converts status lines into monotonically increasing samples
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_frames: u64,
    last_percentage: f64,
}

impl ProgressTracker {
    pub fn new(total_frames: u64) -> Self {
        Self {
            total_frames,
            last_percentage: 0.0,
        }
    }

    /// Feed one log line. Returns a sample only when progress strictly increased.
    ///
    /// With an unknown frame total (0) no per-line samples are produced. A line
    /// at or past the frame total produces nothing either; 100% is reserved for
    /// the terminal sample sent once the encoder exits.
    pub fn observe(&mut self, line: &str) -> Option<ProgressSample> {
        let status = parse_status_line(line)?;

        if self.total_frames == 0 {
            return None;
        }

        let percentage = status.frame as f64 / self.total_frames as f64 * 100.0;
        if percentage >= 100.0 || percentage <= self.last_percentage {
            return None;
        }

        self.last_percentage = percentage;
        Some(ProgressSample {
            percentage,
            speed_factor: status.speed,
        })
    }

    pub fn last_percentage(&self) -> f64 {
        self.last_percentage
    }
}

/// Poll `tail` until `done` is cancelled, forwarding progress to `sink`.
///
/// Always finishes with a single `{100, ""}` sample.
pub async fn monitor_progress<T: LogTail>(
    mut tail: T,
    total_frames: u64,
    sink: &dyn EventSink,
    done: CancellationToken,
    poll_interval: Duration,
) {
    let mut tracker = ProgressTracker::new(total_frames);
    if total_frames == 0 {
        warn!("Total frame count unknown, progress will only be reported on completion");
    }

    loop {
        if done.is_cancelled() {
            break;
        }

        match tail.latest_line().await {
            Ok(Some(line)) => {
                if let Some(sample) = tracker.observe(&line) {
                    debug!("Progress: {:.2}%, speed: {}", sample.percentage, sample.speed_factor);
                    sink.emit(PipelineEvent::Progress(sample));
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Error reading encoder log: {}", e),
        }

        tokio::select! {
            _ = done.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    sink.emit(PipelineEvent::Progress(ProgressSample::finished()));
}
