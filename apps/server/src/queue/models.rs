//! Job queue data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One queued unit of work, mirroring a row of the `jobs` table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    /// Stored as text; see [`JobStatus`] for the closed set of values.
    pub status: String,
    pub priority: i32,
    pub parameters: serde_json::Value,
    pub progress: Option<serde_json::Value>,
    pub retry_policy: serde_json::Value,
    pub retry_count: i32,
    pub processed_items: i32,
    pub total_items: Option<i32>,
    pub error_message: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
}

impl Job {
    pub fn get_retry_policy(&self) -> RetryPolicy {
        serde_json::from_value(self.retry_policy.clone()).unwrap_or_default()
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.get_retry_policy().max_retries
    }

    pub fn progress_percent(&self) -> Option<f64> {
        self.total_items.and_then(|total| {
            (total > 0).then(|| (self.processed_items as f64 / total as f64) * 100.0)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPriority {
    Low = 0,
    Normal = 1,
    High = 2,
}

/// Broker-level retry policy for infrastructure failures (payload decode, DB
/// unavailability). Statement-level write failures are handled by the batch
/// writer and never reach this policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: i32,
    pub initial_delay_seconds: u64,
    pub max_delay_seconds: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_seconds: 5,
            max_delay_seconds: 300,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay in seconds before the given retry attempt (0-based), with
    /// exponential backoff capped at `max_delay_seconds`.
    pub fn calculate_delay(&self, retry_count: i32) -> u64 {
        let factor = self.backoff_multiplier.powi(retry_count.max(0));
        let delay = (self.initial_delay_seconds as f64 * factor).round() as u64;
        delay.min(self.max_delay_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_backs_off_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.calculate_delay(0), 5);
        assert_eq!(policy.calculate_delay(1), 10);
        assert_eq!(policy.calculate_delay(2), 20);
    }

    #[test]
    fn retry_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.calculate_delay(10), 300);
    }

    #[test]
    fn malformed_policy_json_falls_back_to_default() {
        let job = Job {
            id: uuid::Uuid::new_v4(),
            job_type: crate::queue::STAGE_BATCH_JOB_TYPE.into(),
            status: JobStatus::Pending.as_str().into(),
            priority: JobPriority::Normal as i32,
            parameters: serde_json::json!({}),
            progress: None,
            retry_policy: serde_json::json!("not-a-policy"),
            retry_count: 0,
            processed_items: 0,
            total_items: None,
            error_message: None,
            last_error_at: None,
            scheduled_at: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            worker_id: None,
        };
        assert_eq!(job.get_retry_policy().max_retries, 3);
        assert!(job.can_retry());
    }

    #[test]
    fn progress_percent_needs_a_total() {
        let mut job = Job {
            id: uuid::Uuid::new_v4(),
            job_type: crate::queue::STAGE_BATCH_JOB_TYPE.into(),
            status: JobStatus::Running.as_str().into(),
            priority: JobPriority::Normal as i32,
            parameters: serde_json::json!({}),
            progress: None,
            retry_policy: serde_json::json!({}),
            retry_count: 0,
            processed_items: 5,
            total_items: None,
            error_message: None,
            last_error_at: None,
            scheduled_at: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            worker_id: None,
        };
        assert_eq!(job.progress_percent(), None);
        job.total_items = Some(10);
        assert_eq!(job.progress_percent(), Some(50.0));
    }
}
