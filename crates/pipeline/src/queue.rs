//! Sequential job queue.
//!
//! The queue owns every queued job plus the single "current" slot. All
//! operations take the same lock, so `advance` and `finish` are atomic with
//! respect to each other and to queue edits: at most one job is ever running.

use std::collections::VecDeque;
use chrono::Utc;
use log::{debug, info};
use parking_lot::Mutex;
use tokio::sync::Notify;
use crate::error::QueueError;
use crate::job::{Job, JobStatus};

/// How the running job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
}

/// Point-in-time copy of the queue for presentation layers
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub pending: Vec<Job>,
    pub running: Option<Job>,
    pub finished: Vec<Job>,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Job>,
    running: Option<Job>,
    finished: Vec<Job>,
}

#[derive(Debug, Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    enqueued: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append jobs to the tail; safe while a job is running
    pub fn enqueue(&self, jobs: impl IntoIterator<Item = Job>) {
        let added = {
            let mut state = self.state.lock();
            let before = state.pending.len();
            state.pending.extend(jobs.into_iter().map(|mut job| {
                job.status = JobStatus::Queued;
                job
            }));
            state.pending.len() - before
        };

        if added > 0 {
            info!("Enqueued {} job(s)", added);
            self.enqueued.notify_one();
        }
    }

    /// Start the head job if nothing is running.
    ///
    /// Returns the started job, or `None` when a job is already running or the
    /// queue is empty. Calling it repeatedly never starts a second job.
    pub fn advance(&self) -> Option<Job> {
        let mut state = self.state.lock();

        if let Some(running) = &state.running {
            debug!("Job {} still running, not advancing", running.id);
            return None;
        }

        let mut job = state.pending.pop_front()?;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        state.running = Some(job.clone());

        info!("Job {}: started {}", job.id, job.source_path().display());
        Some(job)
    }

    /// Clear the running slot and record how the job ended
    pub fn finish(&self, outcome: JobOutcome) -> Option<Job> {
        let mut state = self.state.lock();
        let mut job = state.running.take()?;

        match outcome {
            JobOutcome::Completed => job.status = JobStatus::Completed,
            JobOutcome::Failed(reason) => {
                job.status = JobStatus::Failed;
                job.reason = Some(reason);
            }
        }
        job.finished_at = Some(Utc::now());
        state.finished.push(job.clone());

        Some(job)
    }

    /// Remove a queued (not running) job by its index in the pending list
    pub fn remove(&self, index: usize) -> Result<Job, QueueError> {
        let mut state = self.state.lock();
        let len = state.pending.len();
        state
            .pending
            .remove(index)
            .ok_or(QueueError::IndexOutOfRange { index, len })
    }

    /// Move a queued job from one pending position to another
    pub fn move_job(&self, from: usize, to: usize) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        let len = state.pending.len();
        if from >= len {
            return Err(QueueError::IndexOutOfRange { index: from, len });
        }
        if to >= len {
            return Err(QueueError::IndexOutOfRange { index: to, len });
        }

        if let Some(job) = state.pending.remove(from) {
            state.pending.insert(to, job);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// True when nothing is queued or running
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.pending.is_empty() && state.running.is_none()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock();
        QueueSnapshot {
            pending: state.pending.iter().cloned().collect(),
            running: state.running.clone(),
            finished: state.finished.clone(),
        }
    }

    /// Resolves after the next `enqueue` that added at least one job
    pub async fn wait_for_jobs(&self) {
        self.enqueued.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffprobe::MediaDescriptor;
    use proptest::prelude::*;
    use std::path::{Path, PathBuf};

    fn job(name: &str, frames: u64) -> Job {
        let media = MediaDescriptor {
            full_path: PathBuf::from(format!("/videos/{}.mp4", name)),
            duration: "00:00:10:00".to_string(),
            frame_count: frames,
            codec: "h264".to_string(),
            size: "1.00 MB".to_string(),
        };
        Job::new(media, Path::new("/out"), "_av1.mp4")
    }

    fn names(jobs: &[Job]) -> Vec<String> {
        jobs.iter().map(|j| j.file_name()).collect()
    }

    #[test]
    fn test_advance_twice_starts_only_one_job() {
        let queue = JobQueue::new();
        queue.enqueue(vec![job("A", 100), job("B", 50)]);

        let first = queue.advance();
        assert!(first.is_some());
        assert_eq!(first.unwrap().status, JobStatus::Running);
        assert!(queue.advance().is_none());
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn test_advance_on_empty_queue() {
        let queue = JobQueue::new();
        assert!(queue.advance().is_none());
        assert!(queue.is_idle());
    }

    #[test]
    fn test_fifo_order_and_finish() {
        let queue = JobQueue::new();
        queue.enqueue(vec![job("A", 100), job("B", 50)]);

        let a = queue.advance().unwrap();
        assert_eq!(a.file_name(), "A.mp4");
        let done = queue.finish(JobOutcome::Completed).unwrap();
        assert_eq!(done.id, a.id);
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.finished_at.is_some());

        let b = queue.advance().unwrap();
        assert_eq!(b.file_name(), "B.mp4");
        let failed = queue.finish(JobOutcome::Failed("exit status: 1".into())).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.reason.as_deref(), Some("exit status: 1"));

        assert!(queue.advance().is_none());
        assert!(queue.is_idle());
        assert_eq!(names(&queue.snapshot().finished), vec!["A.mp4", "B.mp4"]);
    }

    #[test]
    fn test_finish_without_running_job() {
        let queue = JobQueue::new();
        assert!(queue.finish(JobOutcome::Completed).is_none());
    }

    #[test]
    fn test_enqueue_while_running() {
        let queue = JobQueue::new();
        queue.enqueue(vec![job("A", 100)]);
        queue.advance().unwrap();
        queue.enqueue(vec![job("B", 50)]);

        assert!(queue.advance().is_none());
        queue.finish(JobOutcome::Completed);
        assert_eq!(queue.advance().unwrap().file_name(), "B.mp4");
    }

    #[test]
    fn test_duplicates_are_kept() {
        let queue = JobQueue::new();
        queue.enqueue(vec![job("A", 100), job("A", 100)]);
        assert_eq!(queue.pending_len(), 2);
    }

    #[test]
    fn test_remove_and_reorder_queued_jobs() {
        let queue = JobQueue::new();
        queue.enqueue(vec![job("A", 1), job("B", 1), job("C", 1), job("D", 1)]);
        queue.advance().unwrap(); // A is running and no longer addressable

        queue.move_job(2, 0).unwrap();
        assert_eq!(names(&queue.snapshot().pending), vec!["D.mp4", "B.mp4", "C.mp4"]);

        let removed = queue.remove(1).unwrap();
        assert_eq!(removed.file_name(), "B.mp4");
        assert_eq!(names(&queue.snapshot().pending), vec!["D.mp4", "C.mp4"]);

        assert_eq!(queue.remove(5).unwrap_err(), QueueError::IndexOutOfRange { index: 5, len: 2 });
        assert_eq!(queue.move_job(0, 2).unwrap_err(), QueueError::IndexOutOfRange { index: 2, len: 2 });
        assert_eq!(queue.snapshot().running.unwrap().file_name(), "A.mp4");
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiter() {
        let queue = std::sync::Arc::new(JobQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait_for_jobs().await })
        };
        queue.enqueue(vec![job("A", 1)]);
        tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .expect("waiter was not woken")
            .unwrap();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue(u8),
        Advance,
        Finish(bool),
        Remove(usize),
        Move(usize, usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u8..4).prop_map(Op::Enqueue),
            Just(Op::Advance),
            prop::bool::ANY.prop_map(Op::Finish),
            (0usize..6).prop_map(Op::Remove),
            ((0usize..6), (0usize..6)).prop_map(|(a, b)| Op::Move(a, b)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any sequence of queue operations, advance never starts a job
        /// while another one is still running
        #[test]
        fn test_at_most_one_running(ops in prop::collection::vec(op(), 1..60)) {
            let queue = JobQueue::new();
            let mut running = false;

            for op in ops {
                match op {
                    Op::Enqueue(n) => queue.enqueue((0..n).map(|i| job(&format!("j{}", i), 10))),
                    Op::Advance => {
                        let had_pending = queue.pending_len() > 0;
                        let started = queue.advance();
                        if running {
                            prop_assert!(started.is_none());
                        } else {
                            prop_assert_eq!(started.is_some(), had_pending);
                            running = started.is_some();
                        }
                    }
                    Op::Finish(ok) => {
                        let outcome = if ok { JobOutcome::Completed } else { JobOutcome::Failed("boom".into()) };
                        let finished = queue.finish(outcome);
                        prop_assert_eq!(finished.is_some(), running);
                        running = false;
                    }
                    Op::Remove(i) => { let _ = queue.remove(i); }
                    Op::Move(a, b) => { let _ = queue.move_job(a, b); }
                }

                let snapshot = queue.snapshot();
                prop_assert_eq!(snapshot.running.is_some(), running);
                prop_assert!(snapshot.pending.iter().all(|j| j.status == JobStatus::Queued));
            }
        }
    }
}
