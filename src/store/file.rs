use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CompletionLedger, JobId, JobStore, ScheduledJob, StoreError};
use crate::types::{JobKind, UserId};

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    next_job_id: u64,
    completed: BTreeSet<UserId>,
    #[serde(default)]
    feedback_closed: BTreeSet<UserId>,
    jobs: BTreeMap<JobId, ScheduledJob>,
}

/// Completion records and pending jobs in one JSON document, rewritten
/// atomically on every mutation. Without a path it keeps state in memory.
#[derive(Debug)]
pub struct FileStore {
    path: Option<PathBuf>,
    state: Mutex<State>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let text = fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                State::default()
            } else {
                serde_json::from_str(&text)?
            }
        } else {
            State::default()
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `f` and persist. The in-memory state is rolled back when the
    /// write fails, so memory never runs ahead of disk.
    fn mutate<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, StoreError> {
        let mut state = self.lock();
        let snapshot = serde_json::to_string(&*state)?;
        let out = f(&mut state);
        if let Some(path) = &self.path {
            if let Err(e) = write_atomic(path, &*state) {
                *state = serde_json::from_str(&snapshot)?;
                return Err(e);
            }
        }
        Ok(out)
    }
}

fn write_atomic(path: &Path, state: &State) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl CompletionLedger for FileStore {
    fn is_completed(&self, user: UserId) -> Result<bool, StoreError> {
        Ok(self.lock().completed.contains(&user))
    }

    fn mark_completed(&self, user: UserId) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.completed.insert(user);
        })
    }

    fn clear_completed(&self, user: UserId) -> Result<bool, StoreError> {
        {
            let state = self.lock();
            if !state.completed.contains(&user) && !state.feedback_closed.contains(&user) {
                return Ok(false);
            }
        }
        self.mutate(|s| {
            s.feedback_closed.remove(&user);
            s.completed.remove(&user)
        })
    }

    fn completed_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock().completed.len())
    }

    fn is_feedback_closed(&self, user: UserId) -> Result<bool, StoreError> {
        Ok(self.lock().feedback_closed.contains(&user))
    }

    fn close_feedback(&self, user: UserId) -> Result<bool, StoreError> {
        if self.is_feedback_closed(user)? {
            return Ok(false);
        }
        self.mutate(|s| s.feedback_closed.insert(user))
    }
}

impl JobStore for FileStore {
    fn insert_job(
        &self,
        user: UserId,
        kind: JobKind,
        fire_at: DateTime<Utc>,
        payload: Option<String>,
    ) -> Result<ScheduledJob, StoreError> {
        self.mutate(|s| {
            s.next_job_id += 1;
            let job = ScheduledJob {
                id: JobId(s.next_job_id),
                user,
                kind,
                fire_at,
                payload,
            };
            s.jobs.insert(job.id, job.clone());
            job
        })
    }

    fn take_job(&self, id: JobId) -> Result<Option<ScheduledJob>, StoreError> {
        if !self.lock().jobs.contains_key(&id) {
            return Ok(None);
        }
        self.mutate(|s| s.jobs.remove(&id))
    }

    fn pending_jobs(&self) -> Result<Vec<ScheduledJob>, StoreError> {
        Ok(self.lock().jobs.values().cloned().collect())
    }
}
