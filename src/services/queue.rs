use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::models::job::{Job, JobCounts, JobKind, JobOptions, JobPayload, JobState};

/// In-memory job queue with four state buckets.
///
/// All structural state lives behind a single mutex, so submissions,
/// dispatches and settlements of distinct jobs can interleave freely without
/// losing a count: any observer sees every job in exactly one bucket.
/// Terminal jobs are retained for the process lifetime; nothing here
/// survives a restart.
pub struct JobQueue {
    inner: Mutex<QueueInner>,
    /// Wakes the scheduler when work arrives (submit or requeue).
    notify: Notify,
}

struct QueueInner {
    /// Every job ever submitted, keyed by id. The `state` field on the job
    /// is the single source of truth for bucket membership.
    jobs: HashMap<Uuid, Job>,
    /// FIFO admission order for jobs in `Waiting`.
    waiting: VecDeque<Uuid>,
    /// Maintained incrementally on every transition; always consistent
    /// with the `jobs` map because both change under the same lock.
    counts: JobCounts,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                jobs: HashMap::new(),
                waiting: VecDeque::new(),
                counts: JobCounts::default(),
            }),
            notify: Notify::new(),
        }
    }

    /// Create a job in `Waiting` state with a fresh id.
    ///
    /// Payload semantics are the caller's responsibility; the queue only
    /// stores it.
    pub fn submit(&self, kind: JobKind, payload: JobPayload, options: JobOptions) -> Job {
        let job = Job::new(kind, payload, options);
        {
            let mut inner = self.inner.lock().expect("queue lock poisoned");
            inner.waiting.push_back(job.id);
            inner.counts.waiting += 1;
            inner.jobs.insert(job.id, job.clone());
        }

        metrics::counter!("photo_jobs_submitted_total").increment(1);
        tracing::info!(job_id = %job.id, kind = %job.kind, record_id = %job.payload.record_id, "Job queued");

        self.notify.notify_one();
        job
    }

    /// Look up a job by id.
    pub fn get(&self, job_id: Uuid) -> Result<Job, QueueError> {
        let inner = self.inner.lock().expect("queue lock poisoned");
        inner
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(QueueError::NotFound(job_id))
    }

    /// Consistent snapshot of the per-state counts.
    pub fn counts(&self) -> JobCounts {
        self.inner.lock().expect("queue lock poisoned").counts
    }

    /// Record an advisory progress value on an active job. No-op for
    /// unknown or terminal jobs.
    pub fn set_progress(&self, job_id: Uuid, progress: u8) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            if !job.state.is_terminal() {
                job.progress = progress.min(100);
            }
        }
    }

    /// Wait until new work may be available. Used by the scheduler.
    pub async fn work_available(&self) {
        self.notify.notified().await;
    }

    /// Admit the head of the waiting queue if the active set has room.
    ///
    /// On admission the job moves to `Active`, `started_at` is stamped and
    /// `attempts` is incremented; the returned clone is what the scheduler
    /// hands to the processor.
    pub(crate) fn next_for_dispatch(&self, concurrency_limit: usize) -> Option<Job> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        if inner.counts.active >= concurrency_limit {
            return None;
        }
        let job_id = inner.waiting.pop_front()?;
        inner.counts.waiting -= 1;
        inner.counts.active += 1;

        let job = inner
            .jobs
            .get_mut(&job_id)
            .expect("waiting id without job entry");
        job.state = JobState::Active;
        job.started_at = Some(Utc::now());
        job.attempts += 1;
        let snapshot = job.clone();
        drop(inner);

        metrics::gauge!("photo_queue_waiting").set(self.counts().waiting as f64);
        Some(snapshot)
    }

    /// Settle an active job as completed.
    pub(crate) fn complete(&self, job_id: Uuid, result: serde_json::Value) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            if job.state != JobState::Active {
                return;
            }
            job.state = JobState::Completed;
            job.completed_at = Some(Utc::now());
            job.progress = 100;
            job.result = Some(result);
            job.error = None;
            inner.counts.active -= 1;
            inner.counts.completed += 1;
        }
        drop(inner);
        metrics::counter!("photo_jobs_completed_total").increment(1);
    }

    /// Settle a failed attempt: requeue to the tail of `waiting` while the
    /// attempt budget lasts, otherwise mark the job permanently failed.
    ///
    /// Returns true if the job was requeued.
    pub(crate) fn fail_or_requeue(&self, job_id: Uuid, error: String) -> bool {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let Some(job) = inner.jobs.get_mut(&job_id) else {
            return false;
        };
        if job.state != JobState::Active {
            return false;
        }

        if job.attempts < job.max_attempts {
            job.state = JobState::Waiting;
            job.progress = 0;
            inner.waiting.push_back(job_id);
            inner.counts.active -= 1;
            inner.counts.waiting += 1;
            drop(inner);
            self.notify.notify_one();
            true
        } else {
            job.state = JobState::Failed;
            job.completed_at = Some(Utc::now());
            job.error = Some(error);
            job.result = None;
            inner.counts.active -= 1;
            inner.counts.failed += 1;
            drop(inner);
            metrics::counter!("photo_jobs_failed_total").increment(1);
            false
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job not found: {0}")]
    NotFound(Uuid),
}
