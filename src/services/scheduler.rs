use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::job::{Job, JobKind};
use crate::services::queue::JobQueue;

/// Error surfaced by a processor. Recorded on the job; never propagated to
/// the submitter.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ProcessError(pub String);

impl From<String> for ProcessError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ProcessError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Handle a processor uses to report advisory progress on its job.
pub struct JobContext {
    queue: Arc<JobQueue>,
    job_id: Uuid,
}

impl JobContext {
    pub fn set_progress(&self, progress: u8) {
        self.queue.set_progress(self.job_id, progress);
    }
}

/// One logical unit of work per job kind.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, job: &Job, ctx: &JobContext) -> Result<serde_json::Value, ProcessError>;
}

/// Drives job lifecycle: admits waiting jobs under the concurrency cap and
/// settles them when their processor resolves.
///
/// Admission is FIFO. Each admitted job runs in its own task, so a slow
/// processor never stalls the dispatch loop or other active jobs. A failed
/// attempt is requeued to the tail of `waiting` while `attempts <
/// max_attempts`, then the job is terminally failed.
pub struct Scheduler {
    queue: Arc<JobQueue>,
    registry: HashMap<JobKind, Arc<dyn Processor>>,
    concurrency_limit: usize,
    dispatch_interval: Duration,
}

impl Scheduler {
    pub fn new(queue: Arc<JobQueue>, concurrency_limit: usize, dispatch_interval: Duration) -> Self {
        Self {
            queue,
            registry: HashMap::new(),
            concurrency_limit: concurrency_limit.max(1),
            dispatch_interval,
        }
    }

    /// Register the processor for a job kind. Last registration wins.
    pub fn register(&mut self, kind: JobKind, processor: Arc<dyn Processor>) {
        self.registry.insert(kind, processor);
    }

    /// Consume the scheduler and run its dispatch loop on a new task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        tracing::info!(
            concurrency_limit = self.concurrency_limit,
            dispatch_interval_ms = self.dispatch_interval.as_millis() as u64,
            "Scheduler started"
        );

        let mut tick = tokio::time::interval(self.dispatch_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            // Wake on submit/requeue for low latency; the interval tick is
            // the fallback that picks up capacity freed by settlements.
            tokio::select! {
                _ = self.queue.work_available() => {}
                _ = tick.tick() => {}
            }
            self.dispatch();
        }
    }

    /// Admit waiting jobs until the active set is full, fanning each out to
    /// its own task. Never blocks on job execution.
    fn dispatch(&self) {
        while let Some(job) = self.queue.next_for_dispatch(self.concurrency_limit) {
            let processor = self.registry.get(&job.kind).cloned();
            let queue = Arc::clone(&self.queue);

            tracing::debug!(
                job_id = %job.id,
                kind = %job.kind,
                attempt = job.attempts,
                "Dispatching job"
            );

            tokio::spawn(async move {
                let start = std::time::Instant::now();
                let ctx = JobContext {
                    queue: Arc::clone(&queue),
                    job_id: job.id,
                };

                let outcome = match processor {
                    Some(processor) => processor.process(&job, &ctx).await,
                    None => Err(ProcessError(format!(
                        "no processor registered for kind '{}'",
                        job.kind
                    ))),
                };

                metrics::histogram!("photo_job_processing_seconds")
                    .record(start.elapsed().as_secs_f64());

                match outcome {
                    Ok(result) => {
                        queue.complete(job.id, result);
                        tracing::info!(
                            job_id = %job.id,
                            kind = %job.kind,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Job completed"
                        );
                    }
                    Err(e) => {
                        let requeued = queue.fail_or_requeue(job.id, e.to_string());
                        if requeued {
                            tracing::warn!(
                                job_id = %job.id,
                                attempt = job.attempts,
                                max_attempts = job.max_attempts,
                                error = %e,
                                "Job attempt failed, re-queued for retry"
                            );
                        } else {
                            tracing::error!(
                                job_id = %job.id,
                                attempts = job.attempts,
                                error = %e,
                                "Job failed permanently"
                            );
                        }
                    }
                }
            });
        }
    }
}
