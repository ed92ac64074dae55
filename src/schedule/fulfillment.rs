use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::JobHandler;
use crate::delivery::ChatTransport;
use crate::delivery::chunk::{ChunkPolicy, DeliveryError, send_long};
use crate::feedback;
use crate::gate::CompletionGate;
use crate::notify::{Alert, Notifier};
use crate::store::ScheduledJob;
use crate::store::journal::{Journal, JournalEvent};
use crate::texts;
use crate::types::{ChatId, JobKind, Outgoing, UserId};

/// Executes fired jobs: the main delivery and the review reminder.
pub struct Fulfillment {
    chat: Arc<dyn ChatTransport>,
    gate: Arc<CompletionGate>,
    notifier: Arc<dyn Notifier>,
    journal: Journal,
    chunk: ChunkPolicy,
    human_contact: String,
}

impl Fulfillment {
    pub fn new(
        chat: Arc<dyn ChatTransport>,
        gate: Arc<CompletionGate>,
        notifier: Arc<dyn Notifier>,
        journal: Journal,
        chunk: ChunkPolicy,
        human_contact: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            gate,
            notifier,
            journal,
            chunk,
            human_contact: human_contact.into(),
        }
    }

    /// Deliver the generated text, ask for feedback, then close the user's
    /// free slot. Never retried: a failure apologises and points to a human.
    async fn main_delivery(&self, user: UserId, text: Option<String>) {
        // The submission worker may still hold the user; leave its hold alone.
        let acquired = self.gate.hold(user);
        let result = match text.as_deref() {
            Some(text) => send_long(self.chat.as_ref(), ChatId::from(user), text, &self.chunk).await,
            None => Err(DeliveryError::Empty),
        };

        match result {
            Ok(report) => {
                info!(
                    user = user.0,
                    segments = report.segments,
                    failed = report.failed,
                    "main delivery sent"
                );
                self.journal.record(
                    JournalEvent::Delivered,
                    user,
                    &format!("{} segments, {} dropped", report.segments, report.failed),
                );
                if let Err(e) = self.chat.send(user.into(), &feedback::prompt()).await {
                    warn!(user = user.0, error = %e, "feedback prompt not sent");
                }
                if let Err(e) = self.gate.mark_completed(user) {
                    error!(user = user.0, error = %e, "completion record not written");
                    self.notifier
                        .notify(Alert::DeliveryFailed {
                            user,
                            error: format!("delivered but completion record failed: {e}"),
                        })
                        .await;
                }
            }
            Err(e) => {
                error!(user = user.0, error = %e, "main delivery failed");
                self.journal
                    .record(JournalEvent::DeliveryFailed, user, &e.to_string());
                self.notifier
                    .notify(Alert::DeliveryFailed {
                        user,
                        error: e.to_string(),
                    })
                    .await;
                let apology = Outgoing::text(texts::human_fallback(&self.human_contact));
                if let Err(e) = self.chat.send(user.into(), &apology).await {
                    warn!(user = user.0, error = %e, "apology not sent");
                }
            }
        }
        if acquired {
            self.gate.release(user);
        }
    }

    async fn review_reminder(&self, user: UserId) {
        match self
            .chat
            .send(user.into(), &Outgoing::text(texts::REVIEW_REMINDER))
            .await
        {
            Ok(()) => {
                info!(user = user.0, "review reminder sent");
                self.journal.record(JournalEvent::ReminderSent, user, "");
            }
            Err(e) => warn!(user = user.0, error = %e, "review reminder not sent"),
        }
    }
}

#[async_trait]
impl JobHandler for Fulfillment {
    async fn fire(&self, job: ScheduledJob) {
        match job.kind {
            JobKind::MainDelivery => self.main_delivery(job.user, job.payload).await,
            JobKind::ReviewReminder => self.review_reminder(job.user).await,
        }
    }
}
