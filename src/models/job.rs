use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle state of a job in the queue.
///
/// Transitions are monotonic: `Waiting → Active → {Completed | Failed}`,
/// except that a failed attempt with budget left moves the job back to
/// `Waiting` for a retry. Terminal states are never left.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Which registered processor handles a job.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum JobKind {
    FaceCrop,
    BackgroundRemoval,
}

/// Caller-supplied work description, immutable after submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    /// Identifier of the record the photo belongs to.
    pub record_id: String,
    /// Path to the source image on local disk.
    pub photo_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Crop mode hint (e.g. "passport", "portrait"); advisory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Per-job submission options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    /// Ceiling on execution attempts before the job is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for JobOptions {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

/// One unit of queued background work.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub payload: JobPayload,
    pub state: JobState,
    /// Execution attempts made so far (incremented on each dispatch).
    pub attempts: u32,
    pub max_attempts: u32,
    /// Advisory 0–100 progress indicator; never consulted by scheduling.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Present iff `state == Completed`.
    pub result: Option<serde_json::Value>,
    /// Present iff `state == Failed`.
    pub error: Option<String>,
}

impl Job {
    pub fn new(kind: JobKind, payload: JobPayload, options: JobOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            state: JobState::Waiting,
            attempts: 0,
            max_attempts: options.max_attempts.max(1),
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}

/// Snapshot of how many jobs occupy each state bucket.
///
/// Taken under the queue lock, so a job is never double-counted or missed
/// mid-transition.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct JobCounts {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn total(&self) -> usize {
        self.waiting + self.active + self.completed + self.failed
    }
}
