use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use crate::types::{Field, ServiceKind, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeState {
    ChooseService,
    AskField(Field),
    ReviewAndEdit,
    Submitted,
    Cancelled,
}

impl IntakeState {
    /// Terminal states never stay in the session map.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Submitted | Self::Cancelled)
    }
}

/// Per-user form in progress. Lives only in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub service: Option<ServiceKind>,
    pub state: IntakeState,
    pub fields: BTreeMap<Field, String>,
    /// Set while a single field is being re-collected from the review hub.
    pub editing: Option<Field>,
}

impl Session {
    pub fn choosing() -> Self {
        Self {
            service: None,
            state: IntakeState::ChooseService,
            fields: BTreeMap::new(),
            editing: None,
        }
    }

    pub fn for_service(service: ServiceKind) -> Self {
        Self {
            service: Some(service),
            state: IntakeState::AskField(service.first_field()),
            fields: BTreeMap::new(),
            editing: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.service
            .is_some_and(|s| s.fields().iter().all(|f| self.fields.contains_key(f)))
    }
}

/// Live sessions keyed by user. One session per user at most.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<UserId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user: UserId) -> Option<Session> {
        self.lock().get(&user).cloned()
    }

    pub fn put(&self, user: UserId, session: Session) {
        self.lock().insert(user, session);
    }

    pub fn remove(&self, user: UserId) -> Option<Session> {
        self.lock().remove(&user)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Store `next` for `user`, or drop the entry when there is none or the
    /// session reached a terminal state.
    pub fn replace(&self, user: UserId, next: Option<Session>) {
        match next {
            Some(session) if !session.state.is_terminal() => self.put(user, session),
            _ => {
                self.remove(user);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, Session>> {
        // Sessions are ephemeral; a poisoned map is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
