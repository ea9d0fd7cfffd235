//! Queue driver: probes submitted files, then runs jobs one at a time.
//!
//! Per job the event order is: progress samples, one terminal 100% sample,
//! one completion-or-error event, then one `next` event before the following
//! job is dequeued.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{info, warn};
use tokio_util::sync::CancellationToken;
use crate::config::PipelineConfig;
use crate::events::{EventSink, PipelineEvent};
use crate::ffprobe::{MediaDescriptor, ProbeReport, Prober};
use crate::job::Job;
use crate::queue::{JobOutcome, JobQueue};
use crate::supervisor::Supervisor;
use crate::tools::ToolPaths;

/// Totals for one drain of the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
}

pub struct Pipeline {
    queue: Arc<JobQueue>,
    prober: Prober,
    supervisor: Supervisor,
    sink: Arc<dyn EventSink>,
    output_suffix: String,
}

impl Pipeline {
    pub fn new(tools: &ToolPaths, logs_dir: &Path, cfg: &PipelineConfig, sink: Arc<dyn EventSink>) -> Self {
        Self::from_parts(
            Prober::new(&tools.ffprobe),
            Supervisor::new(&tools.ffmpeg, logs_dir, cfg),
            sink,
            &cfg.output_suffix,
        )
    }

    pub fn from_parts(prober: Prober, supervisor: Supervisor, sink: Arc<dyn EventSink>, output_suffix: &str) -> Self {
        Self {
            queue: Arc::new(JobQueue::new()),
            prober,
            supervisor,
            sink,
            output_suffix: output_suffix.to_string(),
        }
    }

    /// Shared handle for presentation layers that edit or display the queue
    pub fn queue(&self) -> Arc<JobQueue> {
        Arc::clone(&self.queue)
    }

    /// Probe `paths` and enqueue a job for every file that probed cleanly.
    ///
    /// Probe failures are returned in the report and never block the others.
    pub async fn submit(&self, paths: &[PathBuf], destination: &Path) -> ProbeReport {
        let report = self.prober.probe_batch(paths).await;
        self.enqueue_media(report.descriptors.iter().cloned(), destination);
        report
    }

    /// Enqueue already-probed media
    pub fn enqueue_media(
        &self,
        media: impl IntoIterator<Item = MediaDescriptor>,
        destination: &Path,
    ) {
        let jobs = media
            .into_iter()
            .map(|m| Job::new(m, destination, &self.output_suffix));
        self.queue.enqueue(jobs);
    }

    /// Convert one dequeued job, record its outcome and announce `next`
    pub async fn run_job(&self, job: Job) -> JobOutcome {
        let outcome = match self.supervisor.convert(&job, &self.sink).await {
            Ok(_) => JobOutcome::Completed,
            Err(e) => {
                if !e.is_job_scoped() {
                    warn!("Job {}: unexpected error kind from conversion: {}", job.id, e);
                }
                JobOutcome::Failed(e.to_string())
            }
        };

        if self.queue.finish(outcome.clone()).is_none() {
            warn!("Job {}: finished but was not marked running", job.id);
        }
        self.sink.emit(PipelineEvent::Next);

        outcome
    }

    /// Run queued jobs until the queue is empty or `stop` is cancelled.
    ///
    /// `stop` is only checked between jobs; a running encode always finishes.
    pub async fn run_until_drained(&self, stop: &CancellationToken) -> RunSummary {
        let mut summary = RunSummary::default();

        while !stop.is_cancelled() {
            let Some(job) = self.queue.advance() else {
                break;
            };
            match self.run_job(job).await {
                JobOutcome::Completed => summary.completed += 1,
                JobOutcome::Failed(_) => summary.failed += 1,
            }
        }

        if stop.is_cancelled() && self.queue.pending_len() > 0 {
            info!("Stopping with {} job(s) still queued", self.queue.pending_len());
        } else {
            info!("Queue drained: {} completed, {} failed", summary.completed, summary.failed);
        }
        summary
    }

    /// Keep running jobs as they arrive until `shutdown` is cancelled
    pub async fn serve(&self, shutdown: CancellationToken) -> RunSummary {
        let mut total = RunSummary::default();

        loop {
            let summary = self.run_until_drained(&shutdown).await;
            total.completed += summary.completed;
            total.failed += summary.failed;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.queue.wait_for_jobs() => {}
            }
        }

        total
    }
}
