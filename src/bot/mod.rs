//! Event dispatch and the submission worker.
//!
//! [`Bot`] routes every inbound event: admin commands, feedback buttons and
//! the retry button are handled here, everything else goes through the
//! intake machine. Confirmed forms are queued on a channel that the
//! [`Pipeline`] drains, one task per request, so a slow generation never
//! blocks the polling loop.

#[cfg(test)]
mod tests;

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{Local, NaiveDate};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::agent::orchestrator::{Generation, Orchestrator, RetryPolicy};
use crate::agent::provider::GenerationBackend;
use crate::config::Tunables;
use crate::delivery::ChatTransport;
use crate::delivery::chunk::ChunkPolicy;
use crate::feedback::FeedbackLoop;
use crate::gate::CompletionGate;
use crate::intake::machine::{Gate, IntakeEvent, IntakeMachine};
use crate::intake::payload::RequestPayload;
use crate::intake::session::SessionStore;
use crate::intake::validate::FieldLimits;
use crate::notify::{Alert, Notifier};
use crate::schedule::Scheduler;
use crate::schedule::fulfillment::Fulfillment;
use crate::store::journal::{Journal, JournalEvent};
use crate::store::{CompletionLedger, JobStore};
use crate::texts;
use crate::types::{Button, Command, EventKind, InboundEvent, JobKind, Outgoing, UserId};

/// Runtime knobs the dispatcher and the worker need.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub limits: FieldLimits,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub max_tokens: u32,
    pub chunk: ChunkPolicy,
    pub delivery_delay: Duration,
    pub review_delay: Duration,
    pub admins: Vec<UserId>,
    pub human_contact: String,
}

impl BotConfig {
    pub fn from_tunables(t: &Tunables) -> Self {
        Self {
            limits: FieldLimits {
                participants: t.min_participants_len,
                backstory: t.min_backstory_len,
                question: t.min_question_len,
            },
            concurrency: t.concurrency,
            retry: RetryPolicy {
                attempts: t.retry_attempts,
                base: t.retry_base(),
            },
            max_tokens: t.max_tokens,
            chunk: ChunkPolicy {
                max_len: t.chunk_size,
                pause: t.chunk_pause(),
                attempts: t.chunk_attempts,
            },
            delivery_delay: t.delivery_delay(),
            review_delay: t.review_delay(),
            admins: t.admins(),
            human_contact: t.human_contact.clone(),
        }
    }
}

/// Requests whose generation failed, waiting for the user to press retry.
/// Ephemeral: lost on restart.
#[derive(Debug, Default)]
pub struct ParkedRequests {
    inner: Mutex<HashMap<UserId, RequestPayload>>,
}

impl ParkedRequests {
    pub fn park(&self, payload: RequestPayload) {
        self.lock().insert(payload.user, payload);
    }

    pub fn take(&self, user: UserId) -> Option<RequestPayload> {
        self.lock().remove(&user)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, RequestPayload>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────────────

pub struct Bot {
    sessions: SessionStore,
    machine: IntakeMachine,
    gate: Arc<CompletionGate>,
    chat: Arc<dyn ChatTransport>,
    feedback: FeedbackLoop,
    submissions: mpsc::UnboundedSender<RequestPayload>,
    parked: Arc<ParkedRequests>,
    admins: HashSet<UserId>,
    jobs: Arc<dyn JobStore>,
    notifier: Arc<dyn Notifier>,
    journal: Journal,
    human_contact: String,
    today: fn() -> NaiveDate,
}

impl Bot {
    /// Handle one inbound event and send whatever it produces. Per-request
    /// failures are contained here.
    pub async fn handle(&self, event: InboundEvent) {
        let user = event.user;
        let replies = match event.kind {
            EventKind::Command(cmd) if cmd.is_admin() && self.admins.contains(&user) => {
                vec![self.admin(user, cmd)]
            }
            EventKind::Button(Button::RetryGeneration) => vec![self.retry(user).await],
            EventKind::Button(button) if button.is_feedback() => {
                self.feedback.handle(user, button).await.into_iter().collect()
            }
            kind => self.intake(user, &kind).await,
        };

        for reply in &replies {
            if let Err(e) = self.chat.send(user.into(), reply).await {
                warn!(user = user.0, error = %e, "reply not sent");
            }
        }
    }

    async fn intake(&self, user: UserId, kind: &EventKind) -> Vec<Outgoing> {
        let Some(event) = intake_event(kind) else {
            return Vec::new();
        };
        let session = self.sessions.get(user);
        let gate = self.gate.status(user);
        let step = self
            .machine
            .advance(user, session, event, gate, (self.today)());
        self.sessions.replace(user, step.session);

        if let Some(payload) = step.submit {
            if let Some(refusal) = self.submit(payload).await {
                return vec![refusal];
            }
        }
        step.replies
    }

    /// Queue a confirmed request. Returns a reply that replaces the normal
    /// acknowledgement when the request could not be queued.
    async fn submit(&self, payload: RequestPayload) -> Option<Outgoing> {
        let user = payload.user;
        // A form opened before another request got under way must not
        // produce a second delivery.
        let gate = self.gate.status(user);
        if gate != Gate::Open || !self.gate.hold(user) {
            warn!(user = user.0, ?gate, "duplicate submission refused");
            self.sessions.remove(user);
            let text = match gate {
                Gate::Served => texts::ALREADY_SERVED,
                Gate::Open | Gate::InProgress => texts::IN_PROGRESS,
            };
            return Some(Outgoing::text(text));
        }
        // A fresh submission supersedes whatever was parked.
        self.parked.take(user);

        let summary = payload.summary();
        info!(user = user.0, service = payload.service.as_str(), "request submitted");
        self.journal.record(JournalEvent::Submitted, user, &summary);

        if let Err(e) = self.submissions.send(payload) {
            error!(user = user.0, error = %e, "submission queue closed");
            self.gate.release(user);
            return Some(Outgoing::text(texts::human_fallback(&self.human_contact)));
        }
        self.notifier.notify(Alert::Submitted { user, summary }).await;
        None
    }

    async fn retry(&self, user: UserId) -> Outgoing {
        if self.gate.status(user) != Gate::Open {
            return Outgoing::text(texts::NOTHING_TO_RETRY);
        }
        let Some(payload) = self.parked.take(user) else {
            return Outgoing::text(texts::NOTHING_TO_RETRY);
        };
        info!(user = user.0, "manual generation retry");
        // The retried request replaces any form started in the meantime.
        self.sessions.remove(user);
        match self.submit(payload).await {
            Some(refusal) => refusal,
            None => Outgoing::text(texts::RETRY_QUEUED),
        }
    }

    fn admin(&self, admin: UserId, cmd: Command) -> Outgoing {
        info!(admin = admin.0, command = ?cmd, "admin command");
        let text = match cmd {
            Command::Unblock(None) => texts::ADMIN_UNBLOCK_USAGE.to_string(),
            Command::Unblock(Some(target)) => match self.gate.clear(target) {
                Ok(existed) => {
                    self.journal.record(
                        JournalEvent::AdminUnblock,
                        target,
                        &format!("by {admin}, record existed: {existed}"),
                    );
                    texts::admin_unblocked(target, existed)
                }
                Err(e) => texts::admin_error(&e.to_string()),
            },
            Command::Pending => match self.jobs.pending_jobs() {
                Ok(jobs) => {
                    let deliveries = jobs
                        .iter()
                        .filter(|j| j.kind == JobKind::MainDelivery)
                        .count();
                    texts::admin_pending(deliveries, jobs.len() - deliveries)
                }
                Err(e) => texts::admin_error(&e.to_string()),
            },
            Command::Stats => match self.gate.served_count() {
                Ok(served) => texts::admin_stats(served, self.sessions.len(), self.parked.len()),
                Err(e) => texts::admin_error(&e.to_string()),
            },
            Command::Start
            | Command::Restart
            | Command::Cancel
            | Command::Help
            | Command::Unknown(_) => texts::UNKNOWN_COMMAND.to_string(),
        };
        Outgoing::text(text)
    }
}

fn intake_event(kind: &EventKind) -> Option<IntakeEvent<'_>> {
    let event = match kind {
        EventKind::Command(cmd) => match cmd {
            Command::Start => IntakeEvent::Start,
            Command::Restart => IntakeEvent::Restart,
            Command::Cancel => IntakeEvent::Cancel,
            Command::Help => IntakeEvent::Help,
            // Admin commands from everyone else look unknown.
            Command::Unblock(_) | Command::Pending | Command::Stats | Command::Unknown(_) => {
                IntakeEvent::UnknownCommand
            }
        },
        EventKind::Button(button) => match button {
            Button::Service(kind) => IntakeEvent::ChooseService(*kind),
            Button::Confirm => IntakeEvent::Confirm,
            Button::Edit => IntakeEvent::Edit,
            Button::EditField(field) => IntakeEvent::EditField(*field),
            Button::Cancel => IntakeEvent::Cancel,
            Button::Restart => IntakeEvent::Restart,
            Button::RetryGeneration
            | Button::FeedbackYes
            | Button::FeedbackNo
            | Button::Rate(_)
            | Button::SkipRating => return None,
        },
        EventKind::Text(text) => IntakeEvent::Input(text),
        EventKind::Media => IntakeEvent::Media,
    };
    Some(event)
}

// ── Submission worker ────────────────────────────────────────────────────────

pub struct Pipeline {
    orchestrator: Orchestrator,
    scheduler: Scheduler,
    gate: Arc<CompletionGate>,
    chat: Arc<dyn ChatTransport>,
    parked: Arc<ParkedRequests>,
    notifier: Arc<dyn Notifier>,
    journal: Journal,
    delivery_delay: Duration,
    human_contact: String,
}

impl Pipeline {
    /// Drain the submission queue until every sender is gone.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<RequestPayload>) {
        while let Some(payload) = rx.recv().await {
            let this = self.clone();
            tokio::spawn(async move { this.process(payload).await });
        }
        info!("submission queue closed, worker stopping");
    }

    /// Generate, then hand the result to the scheduler. The user's hold is
    /// released at the end; a pending delivery job keeps them in progress.
    pub async fn process(&self, payload: RequestPayload) {
        let user = payload.user;
        match self.orchestrator.generate(&payload).await {
            Generation::Text(text) => {
                self.journal.record(
                    JournalEvent::Generated,
                    user,
                    &format!("{} chars", text.chars().count()),
                );
                self.schedule_delivery(user, text).await;
            }
            Generation::Failed => {
                self.journal
                    .record(JournalEvent::GenerationFailed, user, &payload.summary());
                self.parked.park(payload);
                let msg = Outgoing::with_keyboard(
                    texts::generation_failed(),
                    vec![vec![Button::RetryGeneration]],
                );
                if let Err(e) = self.chat.send(user.into(), &msg).await {
                    warn!(user = user.0, error = %e, "generation apology not sent");
                }
            }
        }
        self.gate.release(user);
    }

    async fn schedule_delivery(&self, user: UserId, text: String) {
        match self
            .scheduler
            .schedule(user, JobKind::MainDelivery, self.delivery_delay, Some(text))
        {
            Ok(job) => self.journal.record(
                JournalEvent::Scheduled,
                user,
                &format!("job {} at {}", job.id.0, job.fire_at.to_rfc3339()),
            ),
            Err(e) => {
                error!(user = user.0, error = %e, "main delivery not scheduled");
                self.journal
                    .record(JournalEvent::SchedulingFailed, user, &e.to_string());
                self.notifier
                    .notify(Alert::SchedulingFailed {
                        user,
                        kind: JobKind::MainDelivery,
                        error: e.to_string(),
                    })
                    .await;
                let msg = Outgoing::text(texts::human_fallback(&self.human_contact));
                if let Err(e) = self.chat.send(user.into(), &msg).await {
                    warn!(user = user.0, error = %e, "fallback not sent");
                }
            }
        }
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────────

pub struct Assembly {
    pub bot: Arc<Bot>,
    pub pipeline: Arc<Pipeline>,
    pub scheduler: Scheduler,
    pub submissions: mpsc::UnboundedReceiver<RequestPayload>,
}

/// Wire every component around one durable store.
pub fn assemble<S>(
    config: BotConfig,
    store: Arc<S>,
    chat: Arc<dyn ChatTransport>,
    backend: Arc<dyn GenerationBackend>,
    notifier: Arc<dyn Notifier>,
    journal: Journal,
) -> Assembly
where
    S: CompletionLedger + JobStore + 'static,
{
    let jobs: Arc<dyn JobStore> = store.clone();
    let ledger: Arc<dyn CompletionLedger> = store;
    let gate = Arc::new(CompletionGate::new(ledger.clone(), jobs.clone()));

    let fulfillment = Arc::new(Fulfillment::new(
        chat.clone(),
        gate.clone(),
        notifier.clone(),
        journal.clone(),
        config.chunk,
        config.human_contact.clone(),
    ));
    let scheduler = Scheduler::new(jobs.clone(), fulfillment);
    let feedback = FeedbackLoop::new(
        scheduler.clone(),
        ledger,
        jobs.clone(),
        notifier.clone(),
        journal.clone(),
        config.review_delay,
    );
    let orchestrator = Orchestrator::new(
        backend,
        config.concurrency,
        config.retry,
        config.max_tokens,
        notifier.clone(),
    );

    let parked = Arc::new(ParkedRequests::default());
    let (tx, rx) = mpsc::unbounded_channel();

    let bot = Arc::new(Bot {
        sessions: SessionStore::new(),
        machine: IntakeMachine::new(config.limits),
        gate: gate.clone(),
        chat: chat.clone(),
        feedback,
        submissions: tx,
        parked: parked.clone(),
        admins: config.admins.iter().copied().collect(),
        jobs,
        notifier: notifier.clone(),
        journal: journal.clone(),
        human_contact: config.human_contact.clone(),
        today: local_today,
    });
    let pipeline = Arc::new(Pipeline {
        orchestrator,
        scheduler: scheduler.clone(),
        gate,
        chat,
        parked,
        notifier,
        journal,
        delivery_delay: config.delivery_delay,
        human_contact: config.human_contact,
    });

    Assembly {
        bot,
        pipeline,
        scheduler,
        submissions: rx,
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}
