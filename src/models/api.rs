use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{Job, JobCounts, JobKind, JobOptions, JobState};

/// Request to enqueue one processing job.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    #[garde(skip)]
    pub kind: JobKind,

    #[garde(dive)]
    pub payload: PayloadBody,

    #[garde(skip)]
    #[serde(default)]
    pub options: Option<OptionsBody>,
}

/// Request to enqueue many jobs of the same kind in one call.
#[derive(Debug, Deserialize, Validate)]
pub struct BulkSubmitRequest {
    #[garde(skip)]
    pub kind: JobKind,

    // Per-item validation happens in the handler so the caller is told
    // which index was rejected.
    #[garde(length(min = 1, max = 500))]
    pub payloads: Vec<PayloadBody>,

    #[garde(skip)]
    #[serde(default)]
    pub options: Option<OptionsBody>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PayloadBody {
    #[garde(length(min = 1, max = 100))]
    pub record_id: String,

    #[garde(length(min = 1, max = 500))]
    pub photo_path: String,

    #[garde(length(min = 1, max = 100))]
    #[serde(default)]
    pub project_id: Option<String>,

    #[garde(length(min = 1, max = 50))]
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OptionsBody {
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl OptionsBody {
    pub fn into_job_options(self) -> JobOptions {
        JobOptions {
            max_attempts: self.max_attempts.unwrap_or(1),
        }
    }
}

impl PayloadBody {
    pub fn into_payload(self) -> crate::models::job::JobPayload {
        crate::models::job::JobPayload {
            record_id: self.record_id,
            photo_path: self.photo_path,
            project_id: self.project_id,
            mode: self.mode,
        }
    }
}

/// Response after submitting a job.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub message: String,
}

/// Response after a bulk submission.
#[derive(Debug, Serialize)]
pub struct BulkSubmitResponse {
    pub job_ids: Vec<Uuid>,
    pub count: usize,
    pub message: String,
}

/// Read-only projection of a job for polling clients.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub progress: u8,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            state: job.state,
            progress: job.progress,
            attempts: job.attempts,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            result: job.result,
            error: job.error,
        }
    }
}

/// Queue-level counts for operational monitoring.
#[derive(Debug, Serialize)]
pub struct QueueStatsResponse {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub timestamp: DateTime<Utc>,
}

impl From<JobCounts> for QueueStatsResponse {
    fn from(counts: JobCounts) -> Self {
        Self {
            waiting: counts.waiting,
            active: counts.active,
            completed: counts.completed,
            failed: counts.failed,
            timestamp: Utc::now(),
        }
    }
}

/// Uniform error body for rejected requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
