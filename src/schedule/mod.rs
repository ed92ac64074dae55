//! Durable one-shot delayed jobs.
//!
//! A job is written to the [`JobStore`] before its timer is armed, and taken
//! out of the store right before it fires. Whoever takes it runs it, so a job
//! fires at most once even if it was armed twice (e.g. recovered after a
//! restart while an old timer was still around).

pub mod fulfillment;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::store::{JobStore, ScheduledJob, StoreError};
use crate::types::{JobKind, UserId};

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("could not persist job: {0}")]
    Store(#[from] StoreError),
    #[error("delay is too large to schedule")]
    DelayOutOfRange,
}

/// Runs a job when its time comes.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn fire(&self, job: ScheduledJob);
}

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    handler: Arc<dyn JobHandler>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, handler: Arc<dyn JobHandler>) -> Self {
        Self { store, handler }
    }

    /// Persist a job due after `delay` and arm its timer.
    pub fn schedule(
        &self,
        user: UserId,
        kind: JobKind,
        delay: Duration,
        payload: Option<String>,
    ) -> Result<ScheduledJob, SchedulingError> {
        let offset =
            chrono::Duration::from_std(delay).map_err(|_| SchedulingError::DelayOutOfRange)?;
        let fire_at = Utc::now()
            .checked_add_signed(offset)
            .ok_or(SchedulingError::DelayOutOfRange)?;
        let job = self.store.insert_job(user, kind, fire_at, payload)?;
        info!(
            user = user.0,
            job_id = job.id.0,
            kind = kind.as_str(),
            delay_secs = delay.as_secs(),
            "job scheduled"
        );
        self.arm(job.clone(), delay);
        Ok(job)
    }

    /// Re-arm every persisted job, firing overdue ones right away.
    pub fn recover(&self) -> Result<usize, SchedulingError> {
        let jobs = self.store.pending_jobs()?;
        let now = Utc::now();
        for job in &jobs {
            let remaining = (job.fire_at - now).to_std().unwrap_or(Duration::ZERO);
            info!(
                user = job.user.0,
                job_id = job.id.0,
                kind = job.kind.as_str(),
                remaining_secs = remaining.as_secs(),
                "job recovered"
            );
            self.arm(job.clone(), remaining);
        }
        Ok(jobs.len())
    }

    #[cfg(test)]
    pub fn pending(&self) -> Result<Vec<ScheduledJob>, SchedulingError> {
        Ok(self.store.pending_jobs()?)
    }

    fn arm(&self, job: ScheduledJob, delay: Duration) {
        let store = self.store.clone();
        let handler = self.handler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match store.take_job(job.id) {
                Ok(Some(job)) => {
                    debug!(job_id = job.id.0, kind = job.kind.as_str(), "job firing");
                    handler.fire(job).await;
                }
                Ok(None) => debug!(job_id = job.id.0, "job already taken"),
                Err(e) => error!(job_id = job.id.0, error = %e, "could not take job, left pending"),
            }
        });
    }
}
