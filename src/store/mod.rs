pub mod file;
pub mod journal;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{JobKind, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

/// A one-shot delayed action, persisted until it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub user: UserId,
    pub kind: JobKind,
    pub fire_at: DateTime<Utc>,
    /// Generated text for `MainDelivery`; empty for reminders.
    pub payload: Option<String>,
}

/// Users who already received their free consultation.
pub trait CompletionLedger: Send + Sync {
    fn is_completed(&self, user: UserId) -> Result<bool, StoreError>;
    fn mark_completed(&self, user: UserId) -> Result<(), StoreError>;
    /// Returns whether a record existed. Clearing twice is harmless. Also
    /// reopens the user's feedback flow.
    fn clear_completed(&self, user: UserId) -> Result<bool, StoreError>;
    fn completed_count(&self) -> Result<usize, StoreError>;

    fn is_feedback_closed(&self, user: UserId) -> Result<bool, StoreError>;
    /// Returns false if the flow was already closed.
    fn close_feedback(&self, user: UserId) -> Result<bool, StoreError>;
}

/// Pending scheduled jobs.
pub trait JobStore: Send + Sync {
    fn insert_job(
        &self,
        user: UserId,
        kind: JobKind,
        fire_at: DateTime<Utc>,
        payload: Option<String>,
    ) -> Result<ScheduledJob, StoreError>;

    /// Remove and return the job. Only the first caller gets `Some`.
    fn take_job(&self, id: JobId) -> Result<Option<ScheduledJob>, StoreError>;

    fn pending_jobs(&self) -> Result<Vec<ScheduledJob>, StoreError>;

    fn has_pending(&self, user: UserId, kind: JobKind) -> Result<bool, StoreError> {
        Ok(self
            .pending_jobs()?
            .iter()
            .any(|j| j.user == user && j.kind == kind))
    }
}
