//! Lifecycle tests for the queue + scheduler pair: FIFO admission, the
//! concurrency bound, retry/exhaustion semantics and count invariants.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use photo_pipeline::models::job::{Job, JobKind, JobOptions, JobPayload, JobState};
use photo_pipeline::services::queue::JobQueue;
use photo_pipeline::services::scheduler::{JobContext, ProcessError, Processor, Scheduler};

fn payload(record: &str) -> JobPayload {
    JobPayload {
        record_id: record.to_string(),
        photo_path: format!("{record}.jpg"),
        project_id: None,
        mode: None,
    }
}

fn scheduler(queue: &Arc<JobQueue>, limit: usize) -> Scheduler {
    Scheduler::new(Arc::clone(queue), limit, Duration::from_millis(10))
}

/// Poll until the job reaches a terminal state.
async fn wait_for_terminal(queue: &JobQueue, id: Uuid, timeout: Duration) -> Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = queue.get(id).expect("job should exist");
        if job.state.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for job {id} (state {:?})",
            job.state
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Completes every job with a fixed result after an optional delay,
/// recording execution order and the peak number of concurrent invocations.
struct RecordingProcessor {
    delay: Duration,
    order: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingProcessor {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            order: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Processor for RecordingProcessor {
    async fn process(&self, job: &Job, ctx: &JobContext) -> Result<serde_json::Value, ProcessError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        self.order
            .lock()
            .unwrap()
            .push(job.payload.record_id.clone());
        ctx.set_progress(50);
        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(serde_json::json!({ "record_id": job.payload.record_id }))
    }
}

/// Fails until the attempt counter reaches `succeed_on`.
struct FlakyProcessor {
    succeed_on: u32,
}

#[async_trait]
impl Processor for FlakyProcessor {
    async fn process(&self, job: &Job, _ctx: &JobContext) -> Result<serde_json::Value, ProcessError> {
        if job.attempts < self.succeed_on {
            Err(ProcessError(format!("transient failure on attempt {}", job.attempts)))
        } else {
            Ok(serde_json::json!({ "attempts": job.attempts }))
        }
    }
}

struct AlwaysFailProcessor;

#[async_trait]
impl Processor for AlwaysFailProcessor {
    async fn process(&self, _job: &Job, _ctx: &JobContext) -> Result<serde_json::Value, ProcessError> {
        Err(ProcessError("simulated detector crash".to_string()))
    }
}

#[tokio::test]
async fn jobs_complete_end_to_end() {
    let queue = Arc::new(JobQueue::new());
    let mut sched = scheduler(&queue, 3);
    sched.register(JobKind::BackgroundRemoval, RecordingProcessor::new(Duration::ZERO));
    sched.spawn();

    let job = queue.submit(JobKind::BackgroundRemoval, payload("r1"), JobOptions::default());
    // Submission is non-blocking: the job is observable immediately.
    let early = queue.get(job.id).unwrap();
    assert!(matches!(early.state, JobState::Waiting | JobState::Active | JobState::Completed));

    let done = wait_for_terminal(&queue, job.id, Duration::from_secs(2)).await;
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.result.unwrap()["record_id"], "r1");
    assert!(done.started_at.is_some() && done.completed_at.is_some());
    assert!(queue.counts().completed >= 1);
}

#[tokio::test]
async fn admission_is_fifo_with_single_worker() {
    let queue = Arc::new(JobQueue::new());
    let processor = RecordingProcessor::new(Duration::from_millis(5));
    // Coerce before the call: `Arc::clone` would otherwise infer the
    // trait-object type and reject `&Arc<RecordingProcessor>`.
    let worker: Arc<dyn Processor> = processor.clone();
    let mut sched = scheduler(&queue, 1);
    sched.register(JobKind::FaceCrop, worker);
    sched.spawn();

    let ids: Vec<Uuid> = (0..5)
        .map(|i| {
            queue
                .submit(JobKind::FaceCrop, payload(&format!("j{i}")), JobOptions::default())
                .id
        })
        .collect();

    for id in &ids {
        wait_for_terminal(&queue, *id, Duration::from_secs(2)).await;
    }

    let order = processor.order.lock().unwrap().clone();
    assert_eq!(order, vec!["j0", "j1", "j2", "j3", "j4"]);
}

#[tokio::test]
async fn active_jobs_never_exceed_concurrency_limit() {
    let queue = Arc::new(JobQueue::new());
    let processor = RecordingProcessor::new(Duration::from_millis(30));
    let worker: Arc<dyn Processor> = processor.clone();
    let mut sched = scheduler(&queue, 3);
    sched.register(JobKind::FaceCrop, worker);
    sched.spawn();

    let ids: Vec<Uuid> = (0..10)
        .map(|i| {
            queue
                .submit(JobKind::FaceCrop, payload(&format!("j{i}")), JobOptions::default())
                .id
        })
        .collect();

    // Sample the active count while jobs drain.
    for _ in 0..50 {
        assert!(queue.counts().active <= 3, "active count exceeded the limit");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for id in &ids {
        wait_for_terminal(&queue, *id, Duration::from_secs(5)).await;
    }

    assert!(processor.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(queue.counts().completed, 10);
}

#[tokio::test]
async fn failed_attempts_requeue_until_budget_is_spent() {
    let queue = Arc::new(JobQueue::new());
    let mut sched = scheduler(&queue, 1);
    sched.register(JobKind::FaceCrop, Arc::new(FlakyProcessor { succeed_on: 3 }));
    sched.spawn();

    let job = queue.submit(
        JobKind::FaceCrop,
        payload("flaky"),
        JobOptions { max_attempts: 3 },
    );

    let done = wait_for_terminal(&queue, job.id, Duration::from_secs(2)).await;
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.attempts, 3);
    assert_eq!(done.result.unwrap()["attempts"], 3);
}

#[tokio::test]
async fn exhausted_job_fails_with_error_after_one_attempt() {
    let queue = Arc::new(JobQueue::new());
    let mut sched = scheduler(&queue, 1);
    sched.register(JobKind::FaceCrop, Arc::new(AlwaysFailProcessor));
    sched.spawn();

    let job = queue.submit(JobKind::FaceCrop, payload("doomed"), JobOptions { max_attempts: 1 });

    let done = wait_for_terminal(&queue, job.id, Duration::from_secs(2)).await;
    assert_eq!(done.state, JobState::Failed);
    assert_eq!(done.attempts, 1);
    assert_eq!(done.error.as_deref(), Some("simulated detector crash"));
    assert!(done.result.is_none());
}

#[tokio::test]
async fn unregistered_kind_fails_the_job_not_the_scheduler() {
    let queue = Arc::new(JobQueue::new());
    let mut sched = scheduler(&queue, 1);
    sched.register(JobKind::FaceCrop, RecordingProcessor::new(Duration::ZERO));
    sched.spawn();

    let orphan = queue.submit(JobKind::BackgroundRemoval, payload("orphan"), JobOptions::default());
    let ok = queue.submit(JobKind::FaceCrop, payload("fine"), JobOptions::default());

    let failed = wait_for_terminal(&queue, orphan.id, Duration::from_secs(2)).await;
    assert_eq!(failed.state, JobState::Failed);
    assert!(failed.error.unwrap().contains("no processor registered"));

    // The scheduler keeps dispatching after the failure.
    let done = wait_for_terminal(&queue, ok.id, Duration::from_secs(2)).await;
    assert_eq!(done.state, JobState::Completed);
}

#[tokio::test]
async fn counts_always_partition_all_submitted_jobs() {
    let queue = Arc::new(JobQueue::new());
    let mut sched = scheduler(&queue, 2);
    sched.register(JobKind::FaceCrop, RecordingProcessor::new(Duration::from_millis(10)));
    sched.register(JobKind::BackgroundRemoval, Arc::new(AlwaysFailProcessor));
    sched.spawn();

    let mut ids = Vec::new();
    for i in 0..8 {
        let kind = if i % 4 == 0 { JobKind::BackgroundRemoval } else { JobKind::FaceCrop };
        ids.push(queue.submit(kind, payload(&format!("j{i}")), JobOptions::default()).id);
    }

    // Every snapshot must account for all eight jobs, with no job lost or
    // double-counted mid-transition.
    for _ in 0..40 {
        assert_eq!(queue.counts().total(), 8);
        tokio::time::sleep(Duration::from_millis(3)).await;
    }
    for id in &ids {
        wait_for_terminal(&queue, *id, Duration::from_secs(5)).await;
    }

    let counts = queue.counts();
    assert_eq!(counts.total(), 8);
    assert_eq!(counts.completed, 6);
    assert_eq!(counts.failed, 2);
    assert_eq!(counts.waiting + counts.active, 0);
}
