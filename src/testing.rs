//! Fakes shared by unit tests across modules.

use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::agent::provider::GenerationBackend;
use crate::delivery::ChatTransport;
use crate::intake::payload::RequestPayload;
use crate::notify::{Alert, Notifier};
use crate::types::{ChatId, Field, Outgoing, ServiceKind, UserId};

#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

/// Chat transport that records delivered messages. The first `fail_first`
/// calls fail as if the platform rejected them.
pub struct RecordingChat {
    max_len: usize,
    fail_first: usize,
    calls: Mutex<usize>,
    sent: Mutex<Vec<(ChatId, Outgoing)>>,
}

impl RecordingChat {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            fail_first: 0,
            calls: Mutex::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn sent(&self) -> Vec<(ChatId, Outgoing)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages_to(&self, user: UserId) -> Vec<Outgoing> {
        let chat = ChatId::from(user);
        self.sent()
            .into_iter()
            .filter(|(to, _)| *to == chat)
            .map(|(_, msg)| msg)
            .collect()
    }

    pub fn texts_to(&self, user: UserId) -> Vec<String> {
        self.messages_to(user).into_iter().map(|m| m.text).collect()
    }

    pub fn last_to(&self, user: UserId) -> Option<Outgoing> {
        self.messages_to(user).pop()
    }
}

#[async_trait]
impl ChatTransport for RecordingChat {
    async fn send(&self, chat: ChatId, msg: &Outgoing) -> Result<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if call <= self.fail_first {
            return Err(anyhow!("Bad Gateway"));
        }
        self.sent.lock().unwrap().push((chat, msg.clone()));
        Ok(())
    }

    fn max_message_len(&self) -> usize {
        self.max_len
    }
}

/// Fails the first `failures` calls, then returns `reply`.
pub struct ScriptedBackend {
    failures: usize,
    reply: String,
    calls: Mutex<usize>,
}

impl ScriptedBackend {
    pub fn new(failures: usize, reply: impl Into<String>) -> Self {
        Self {
            failures,
            reply: reply.into(),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if n <= self.failures {
            return Err(anyhow!("503 Service Unavailable"));
        }
        Ok(self.reply.clone())
    }
}

pub fn matrix_payload() -> RequestPayload {
    RequestPayload {
        user: UserId(42),
        service: ServiceKind::Matrix,
        fields: vec![
            (Field::Name, "Анна".to_string()),
            (Field::BirthDate, "14.03.1992".to_string()),
        ],
    }
}
