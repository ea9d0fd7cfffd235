//! Runs the ffmpeg encode for a single job.
//!
//! ffmpeg's stdout and stderr both go to one log file per job. The progress
//! monitor tails that same file while it is being written; the two sides share
//! nothing else.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, error, info, warn};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::events::{EventSink, PipelineEvent};
use crate::job::Job;
use crate::progress::monitor_progress;
use crate::tail::FileTail;

/// Fixed SVT-AV1 encode policy
pub const VIDEO_ENCODER: &str = "libsvtav1";
pub const CRF: u8 = 30;
pub const PRESET: u8 = 6;
pub const SVTAV1_PARAMS: &str = "tune=0";

/// Build the ffmpeg argument list for one conversion
///
/// Video is re-encoded with SVT-AV1, audio streams are copied untouched and
/// an existing output file is overwritten.
pub fn build_encode_args(input: &Path, output: &Path) -> Vec<String> {
    let mut args = Vec::new();

    // Input file
    args.push("-i".to_string());
    args.push(input.to_string_lossy().to_string());

    // Video codec and SVT-AV1 parameters
    args.push("-c:v".to_string());
    args.push(VIDEO_ENCODER.to_string());
    args.push("-crf".to_string());
    args.push(CRF.to_string());
    args.push("-preset".to_string());
    args.push(PRESET.to_string());
    args.push("-svtav1-params".to_string());
    args.push(SVTAV1_PARAMS.to_string());

    // Copy audio without re-encoding
    args.push("-c:a".to_string());
    args.push("copy".to_string());

    // Overwrite output
    args.push("-y".to_string());
    args.push(output.to_string_lossy().to_string());

    args
}

/// Launches and supervises the encoder for one job at a time
#[derive(Debug, Clone)]
pub struct Supervisor {
    ffmpeg_bin: PathBuf,
    logs_dir: PathBuf,
    poll_interval: Duration,
    tail_window: u64,
    settle_delay: Duration,
}

impl Supervisor {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>, logs_dir: impl Into<PathBuf>, cfg: &PipelineConfig) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            logs_dir: logs_dir.into(),
            poll_interval: cfg.poll_interval(),
            tail_window: cfg.tail_window_bytes,
            settle_delay: cfg.settle_delay(),
        }
    }

    pub fn ffmpeg_bin(&self) -> &Path {
        &self.ffmpeg_bin
    }

    /// Where the combined encoder output for `job` is written
    pub fn log_path_for(&self, job: &Job) -> PathBuf {
        self.logs_dir.join(format!("{}_ffmpeg.log", job.output_stem()))
    }

    /// Convert one job, reporting progress and exactly one completion or
    /// error event through `sink`.
    ///
    /// Returns the output path on success. Errors only concern this job.
    pub async fn convert(&self, job: &Job, sink: &Arc<dyn EventSink>) -> Result<PathBuf> {
        let result = self.encode(job, sink).await;

        match &result {
            Ok(output_path) => {
                info!("Job {}: ✅ Conversion completed: {}", job.id, output_path.display());
                sink.emit(PipelineEvent::Completion {
                    output_path: output_path.clone(),
                });
            }
            Err(e) => {
                error!("Job {}: ❌ {}", job.id, e);
                sink.emit(PipelineEvent::Error {
                    message: e.to_string(),
                });
            }
        }

        result
    }

    async fn encode(&self, job: &Job, sink: &Arc<dyn EventSink>) -> Result<PathBuf> {
        let output_path = job.output_path.clone();

        // Create output directory if it doesn't exist
        tokio::fs::create_dir_all(&job.destination)
            .await
            .map_err(|source| PipelineError::Directory {
                path: job.destination.clone(),
                source,
            })?;

        // One log file receives both stdout and stderr
        let log_path = self.log_path_for(job);
        let log_err = |source| PipelineError::LogCreate {
            path: log_path.clone(),
            source,
        };
        let stdout_log = std::fs::File::create(&log_path).map_err(log_err)?;
        let stderr_log = stdout_log.try_clone().map_err(log_err)?;

        let args = build_encode_args(job.source_path(), &output_path);
        debug!("Job {}: ffmpeg args: {:?}", job.id, args);
        info!(
            "Job {}: Starting ffmpeg: {} -> {} (log: {})",
            job.id,
            job.source_path().display(),
            output_path.display(),
            log_path.display()
        );

        let mut child = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_log))
            .stderr(Stdio::from(stderr_log))
            .spawn()
            .map_err(|e| PipelineError::encode(format!("failed to start ffmpeg: {}", e)))?;

        // Monitor progress alongside the encoder
        let done = CancellationToken::new();
        let monitor = {
            let tail = FileTail::new(&log_path, self.tail_window);
            let total_frames = job.media.frame_count;
            let sink = Arc::clone(sink);
            let done = done.clone();
            let interval = self.poll_interval;
            tokio::spawn(async move {
                monitor_progress(tail, total_frames, sink.as_ref(), done, interval).await;
            })
        };

        let status = child.wait().await;

        // The monitor sends its final 100% sample before we report the outcome
        done.cancel();
        if let Err(e) = monitor.await {
            warn!("Job {}: progress monitor task failed: {}", job.id, e);
        }

        let status = status.map_err(|e| PipelineError::encode(format!("failed to wait for ffmpeg: {}", e)))?;
        if !status.success() {
            return Err(PipelineError::encode(format!(
                "{} (see {})",
                status,
                log_path.display()
            )));
        }

        // Short wait so the 100% sample reaches the UI before completion
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        Ok(output_path)
    }
}
