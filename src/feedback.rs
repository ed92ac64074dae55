use std::{sync::Arc, time::Duration};

use tracing::{error, info};

use crate::notify::{Alert, Notifier};
use crate::schedule::Scheduler;
use crate::store::{CompletionLedger, JobStore};
use crate::store::journal::{Journal, JournalEvent};
use crate::texts;
use crate::types::{Button, JobKind, Outgoing, Rating, UserId};

/// Satisfaction question sent right after the main delivery.
pub fn prompt() -> Outgoing {
    Outgoing::with_keyboard(
        texts::FEEDBACK_QUESTION,
        vec![vec![Button::FeedbackYes, Button::FeedbackNo]],
    )
}

fn rating_menu() -> Outgoing {
    let mut keyboard: Vec<Vec<Button>> = Rating::ALL
        .into_iter()
        .map(|r| vec![Button::Rate(r)])
        .collect();
    keyboard.push(vec![Button::SkipRating]);
    Outgoing::with_keyboard(texts::RATING_QUESTION, keyboard)
}

/// Post-delivery feedback. A non-skip rating arms one review reminder;
/// "no" and "skip" close the flow. The closed flag is durable, so old
/// buttons pressed after a restart do nothing.
pub struct FeedbackLoop {
    scheduler: Scheduler,
    ledger: Arc<dyn CompletionLedger>,
    jobs: Arc<dyn JobStore>,
    notifier: Arc<dyn Notifier>,
    journal: Journal,
    review_delay: Duration,
}

impl FeedbackLoop {
    pub fn new(
        scheduler: Scheduler,
        ledger: Arc<dyn CompletionLedger>,
        jobs: Arc<dyn JobStore>,
        notifier: Arc<dyn Notifier>,
        journal: Journal,
        review_delay: Duration,
    ) -> Self {
        Self {
            scheduler,
            ledger,
            jobs,
            notifier,
            journal,
            review_delay,
        }
    }

    /// React to a feedback button. Repeated presses after the flow closed
    /// only get a thank-you.
    pub async fn handle(&self, user: UserId, button: Button) -> Option<Outgoing> {
        if self.is_answered(user) && button.is_feedback() {
            return Some(Outgoing::text(texts::FEEDBACK_THANKS));
        }
        match button {
            Button::FeedbackYes => Some(rating_menu()),
            Button::FeedbackNo => {
                self.close(user, "no");
                Some(Outgoing::text(texts::FEEDBACK_SORRY))
            }
            Button::SkipRating => {
                self.close(user, "skip");
                Some(Outgoing::text(texts::FEEDBACK_THANKS))
            }
            Button::Rate(rating) => {
                if !self.close(user, rating.as_str()) {
                    return Some(Outgoing::text(texts::FEEDBACK_THANKS));
                }
                self.arm_reminder(user).await;
                self.notifier.notify(Alert::Rated { user, rating }).await;
                Some(Outgoing::text(texts::FEEDBACK_THANKS))
            }
            _ => None,
        }
    }

    async fn arm_reminder(&self, user: UserId) {
        match self.jobs.has_pending(user, JobKind::ReviewReminder) {
            Ok(true) => {
                info!(user = user.0, "review reminder already pending");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!(user = user.0, error = %e, "pending reminder lookup failed");
                return;
            }
        }
        if let Err(e) =
            self.scheduler
                .schedule(user, JobKind::ReviewReminder, self.review_delay, None)
        {
            error!(user = user.0, error = %e, "review reminder not scheduled");
            self.journal
                .record(JournalEvent::SchedulingFailed, user, &e.to_string());
            self.notifier
                .notify(Alert::SchedulingFailed {
                    user,
                    kind: JobKind::ReviewReminder,
                    error: e.to_string(),
                })
                .await;
        }
    }

    /// Record the answer and close the flow. Returns false when the flow
    /// was already closed or the flag could not be written.
    fn close(&self, user: UserId, answer: &str) -> bool {
        match self.ledger.close_feedback(user) {
            Ok(true) => {
                info!(user = user.0, answer, "feedback received");
                self.journal.record(JournalEvent::Feedback, user, answer);
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!(user = user.0, error = %e, "feedback flag not written");
                false
            }
        }
    }

    fn is_answered(&self, user: UserId) -> bool {
        self.ledger.is_feedback_closed(user).unwrap_or_else(|e| {
            // Unknown standing: never risk a second reminder.
            error!(user = user.0, error = %e, "feedback flag lookup failed");
            true
        })
    }
}
