use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use tracing::error;

use crate::intake::machine::Gate;
use crate::store::{CompletionLedger, JobStore, StoreError};
use crate::types::{JobKind, UserId};

/// Enforces one free consultation per user. A user is "in progress" while
/// their request is generating or delivering (held here) or while their
/// main delivery job is pending in the store.
pub struct CompletionGate {
    ledger: Arc<dyn CompletionLedger>,
    jobs: Arc<dyn JobStore>,
    held: Mutex<HashSet<UserId>>,
}

impl CompletionGate {
    pub fn new(ledger: Arc<dyn CompletionLedger>, jobs: Arc<dyn JobStore>) -> Self {
        Self {
            ledger,
            jobs,
            held: Mutex::new(HashSet::new()),
        }
    }

    pub fn status(&self, user: UserId) -> Gate {
        match self.try_status(user) {
            Ok(gate) => gate,
            Err(e) => {
                // Unknown standing: refuse to open a second request.
                error!(user = user.0, error = %e, "completion gate lookup failed");
                Gate::InProgress
            }
        }
    }

    fn try_status(&self, user: UserId) -> Result<Gate, StoreError> {
        if self.ledger.is_completed(user)? {
            return Ok(Gate::Served);
        }
        if self.is_held(user) || self.jobs.has_pending(user, JobKind::MainDelivery)? {
            return Ok(Gate::InProgress);
        }
        Ok(Gate::Open)
    }

    #[cfg(test)]
    pub fn is_completed(&self, user: UserId) -> Result<bool, StoreError> {
        self.ledger.is_completed(user)
    }

    pub fn mark_completed(&self, user: UserId) -> Result<(), StoreError> {
        self.ledger.mark_completed(user)
    }

    /// Administrative override; clearing an absent record is a no-op.
    pub fn clear(&self, user: UserId) -> Result<bool, StoreError> {
        self.ledger.clear_completed(user)
    }

    pub fn served_count(&self) -> Result<usize, StoreError> {
        self.ledger.completed_count()
    }

    /// Mark the user in progress. Returns false if already held.
    pub fn hold(&self, user: UserId) -> bool {
        self.lock().insert(user)
    }

    pub fn release(&self, user: UserId) {
        self.lock().remove(&user);
    }

    pub fn is_held(&self, user: UserId) -> bool {
        self.lock().contains(&user)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<UserId>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::file::FileStore;

    fn gate() -> (Arc<FileStore>, CompletionGate) {
        let store = Arc::new(FileStore::in_memory());
        let gate = CompletionGate::new(store.clone(), store.clone());
        (store, gate)
    }

    #[test]
    fn status_moves_from_open_to_served() {
        let (store, gate) = gate();
        let user = UserId(3);
        assert_eq!(gate.status(user), Gate::Open);

        assert!(gate.hold(user));
        assert!(!gate.hold(user));
        assert_eq!(gate.status(user), Gate::InProgress);
        gate.release(user);

        let job = store
            .insert_job(user, JobKind::MainDelivery, Utc::now(), Some("x".into()))
            .expect("insert");
        assert_eq!(gate.status(user), Gate::InProgress);
        store.take_job(job.id).expect("take");

        gate.mark_completed(user).expect("mark");
        assert_eq!(gate.status(user), Gate::Served);
    }

    #[test]
    fn pending_reminder_does_not_block() {
        let (store, gate) = gate();
        store
            .insert_job(UserId(1), JobKind::ReviewReminder, Utc::now(), None)
            .expect("insert");
        assert_eq!(gate.status(UserId(1)), Gate::Open);
    }

    #[test]
    fn clear_reopens_and_is_idempotent() {
        let (_store, gate) = gate();
        gate.mark_completed(UserId(9)).expect("mark");
        assert!(gate.clear(UserId(9)).expect("clear"));
        assert!(!gate.clear(UserId(9)).expect("clear again"));
        assert_eq!(gate.status(UserId(9)), Gate::Open);
    }
}
