use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::store::file::FileStore;
use crate::testing::{RecordingChat, RecordingNotifier, ScriptedBackend};
use crate::types::{Rating, ServiceKind};

const USER: UserId = UserId(501);
const ADMIN: UserId = UserId(1);
const HOUR: Duration = Duration::from_secs(60 * 60);

struct Harness {
    bot: Arc<Bot>,
    store: Arc<FileStore>,
    chat: Arc<RecordingChat>,
    backend: Arc<ScriptedBackend>,
    notifier: Arc<RecordingNotifier>,
}

fn config() -> BotConfig {
    BotConfig {
        limits: FieldLimits::default(),
        concurrency: 3,
        retry: RetryPolicy {
            attempts: 3,
            base: Duration::from_secs(2),
        },
        max_tokens: 3_500,
        chunk: ChunkPolicy {
            max_len: 50,
            pause: Duration::from_millis(700),
            attempts: 3,
        },
        delivery_delay: 2 * HOUR,
        review_delay: 2 * HOUR,
        admins: vec![ADMIN],
        human_contact: "@mira".to_string(),
    }
}

fn harness(backend: ScriptedBackend) -> Harness {
    harness_with(config(), backend)
}

fn harness_with(config: BotConfig, backend: ScriptedBackend) -> Harness {
    let store = Arc::new(FileStore::in_memory());
    let chat = Arc::new(RecordingChat::new(4096));
    let backend = Arc::new(backend);
    let notifier = Arc::new(RecordingNotifier::default());
    let assembly = assemble(
        config,
        store.clone(),
        chat.clone(),
        backend.clone(),
        notifier.clone(),
        Journal::disabled(),
    );
    tokio::spawn(assembly.pipeline.clone().run(assembly.submissions));
    Harness {
        bot: assembly.bot,
        store,
        chat,
        backend,
        notifier,
    }
}

impl Harness {
    async fn command(&self, user: UserId, text: &str) {
        self.bot.handle(InboundEvent::from_text(user, text)).await;
    }

    async fn text(&self, text: &str) {
        self.bot.handle(InboundEvent::from_text(USER, text)).await;
    }

    async fn press(&self, button: Button) {
        self.bot
            .handle(InboundEvent::new(USER, EventKind::Button(button)))
            .await;
    }

    async fn submit_matrix(&self) {
        self.command(USER, "/start").await;
        self.press(Button::Service(ServiceKind::Matrix)).await;
        self.text("Анна").await;
        self.text("14.03.1992").await;
        self.press(Button::Confirm).await;
    }

    fn last_text(&self) -> String {
        self.chat.last_to(USER).map(|m| m.text).unwrap_or_default()
    }

    fn pending(&self, kind: JobKind) -> usize {
        self.store
            .pending_jobs()
            .expect("list")
            .iter()
            .filter(|j| j.kind == kind)
            .count()
    }
}

/// Let spawned tasks run; advances the paused clock by one second.
async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn full_flow_delivers_in_chunks_then_arms_one_reminder() {
    let h = harness(ScriptedBackend::new(0, "Р".repeat(120)));

    h.submit_matrix().await;
    assert_eq!(h.last_text(), texts::SUBMITTED);
    settle().await;

    assert_eq!(h.backend.calls(), 1);
    assert_eq!(h.pending(JobKind::MainDelivery), 1);
    assert!(matches!(h.notifier.alerts()[0], Alert::Submitted { .. }));

    // Nothing reaches the user before the delivery delay.
    h.command(USER, "/start").await;
    assert_eq!(h.last_text(), texts::IN_PROGRESS);
    let before = h.chat.texts_to(USER).len();

    tokio::time::sleep(2 * HOUR).await;
    settle().await;

    let delivered = h.chat.texts_to(USER)[before..].to_vec();
    assert_eq!(delivered.len(), 4, "three segments and the feedback question");
    assert_eq!(delivered[..3].concat(), "Р".repeat(120));
    assert_eq!(delivered[3], texts::FEEDBACK_QUESTION);
    assert_eq!(h.pending(JobKind::MainDelivery), 0);

    h.press(Button::FeedbackYes).await;
    assert_eq!(h.last_text(), texts::RATING_QUESTION);
    h.press(Button::Rate(Rating::Good)).await;
    h.press(Button::Rate(Rating::Excellent)).await;
    assert_eq!(h.pending(JobKind::ReviewReminder), 1);

    tokio::time::sleep(2 * HOUR).await;
    settle().await;
    assert_eq!(h.last_text(), texts::REVIEW_REMINDER);
    assert_eq!(h.pending(JobKind::ReviewReminder), 0);

    h.command(USER, "/start").await;
    assert_eq!(h.last_text(), texts::ALREADY_SERVED);
}

#[tokio::test(start_paused = true)]
async fn negative_feedback_schedules_no_reminder() {
    let h = harness(ScriptedBackend::new(0, "разбор"));
    h.submit_matrix().await;
    tokio::time::sleep(2 * HOUR + Duration::from_secs(5)).await;

    h.press(Button::FeedbackNo).await;
    assert_eq!(h.last_text(), texts::FEEDBACK_SORRY);
    assert_eq!(h.pending(JobKind::ReviewReminder), 0);

    tokio::time::sleep(3 * HOUR).await;
    assert!(!h.chat.texts_to(USER).iter().any(|t| t == texts::REVIEW_REMINDER));
}

#[tokio::test(start_paused = true)]
async fn served_user_is_refused_at_every_entry_point() {
    let h = harness(ScriptedBackend::new(0, "разбор"));
    h.store.mark_completed(USER).expect("mark");

    h.command(USER, "/start").await;
    assert_eq!(h.last_text(), texts::ALREADY_SERVED);
    h.press(Button::Service(ServiceKind::Tarot)).await;
    assert_eq!(h.last_text(), texts::ALREADY_SERVED);
    h.text("привет").await;
    assert_eq!(h.last_text(), texts::ALREADY_SERVED);
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_generation_parks_request_for_one_retry() {
    let h = harness(ScriptedBackend::new(3, "разбор"));
    h.submit_matrix().await;
    // Three attempts with 2 s and 4 s of backoff between them.
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.backend.calls(), 3);
    let apology = h.chat.last_to(USER).expect("apology");
    assert_eq!(apology.text, texts::generation_failed());
    assert_eq!(apology.keyboard, vec![vec![Button::RetryGeneration]]);
    assert_eq!(h.pending(JobKind::MainDelivery), 0);
    assert!(
        h.notifier
            .alerts()
            .iter()
            .any(|a| matches!(a, Alert::GenerationFailed { .. }))
    );

    h.press(Button::RetryGeneration).await;
    assert_eq!(h.last_text(), texts::RETRY_QUEUED);
    h.press(Button::RetryGeneration).await;
    assert_eq!(h.last_text(), texts::NOTHING_TO_RETRY);
    settle().await;

    assert_eq!(h.backend.calls(), 4);
    assert_eq!(h.pending(JobKind::MainDelivery), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_with_a_form_open_delivers_only_once() {
    let h = harness(ScriptedBackend::new(3, "разбор"));
    h.submit_matrix().await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.chat.last_to(USER).expect("apology").text, texts::generation_failed());

    // A second form is filled while the failed request waits for retry.
    h.command(USER, "/start").await;
    h.press(Button::Service(ServiceKind::Matrix)).await;
    h.text("Анна").await;
    h.text("14.03.1992").await;

    h.press(Button::RetryGeneration).await;
    assert_eq!(h.last_text(), texts::RETRY_QUEUED);
    h.press(Button::Confirm).await;
    assert_eq!(h.last_text(), texts::IN_PROGRESS);
    settle().await;

    assert_eq!(h.backend.calls(), 4);
    assert_eq!(h.pending(JobKind::MainDelivery), 1);

    // Still refused once generation is done and only the job is pending.
    h.command(USER, "/start").await;
    assert_eq!(h.last_text(), texts::IN_PROGRESS);
}

#[tokio::test(start_paused = true)]
async fn confirm_is_refused_while_a_delivery_is_pending() {
    let h = harness(ScriptedBackend::new(0, "разбор"));
    h.command(USER, "/start").await;
    h.press(Button::Service(ServiceKind::Matrix)).await;
    h.text("Анна").await;
    h.text("14.03.1992").await;

    // Another request of the same user is already scheduled.
    h.store
        .insert_job(
            USER,
            JobKind::MainDelivery,
            chrono::Utc::now() + chrono::Duration::hours(2),
            Some("разбор".into()),
        )
        .expect("insert");

    h.press(Button::Confirm).await;
    assert_eq!(h.last_text(), texts::IN_PROGRESS);
    settle().await;
    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.pending(JobKind::MainDelivery), 1);
    assert!(h.bot.sessions.get(USER).is_none());
}

#[tokio::test(start_paused = true)]
async fn scheduling_failure_falls_back_to_a_human() {
    let mut config = config();
    config.delivery_delay = Duration::MAX;
    let h = harness_with(config, ScriptedBackend::new(0, "разбор"));

    h.submit_matrix().await;
    settle().await;

    assert_eq!(h.backend.calls(), 1);
    assert_eq!(h.last_text(), texts::human_fallback("@mira"));
    assert!(h.notifier.alerts().iter().any(|a| matches!(
        a,
        Alert::SchedulingFailed {
            kind: JobKind::MainDelivery,
            ..
        }
    )));
    assert_eq!(h.pending(JobKind::MainDelivery), 0);
    assert!(!h.bot.gate.is_held(USER));
    assert_eq!(h.bot.gate.status(USER), Gate::Open);
}

#[tokio::test(start_paused = true)]
async fn media_mid_form_keeps_the_current_step() {
    let h = harness(ScriptedBackend::new(0, "разбор"));
    h.command(USER, "/start").await;
    h.press(Button::Service(ServiceKind::Matrix)).await;
    h.text("Анна").await;

    h.bot.handle(InboundEvent::new(USER, EventKind::Media)).await;
    assert_eq!(h.last_text(), texts::TEXT_ONLY);

    h.text("14.03.1992").await;
    assert!(h.last_text().contains("14.03.1992"));
}

#[tokio::test(start_paused = true)]
async fn admin_commands_are_reserved_to_admins() {
    let h = harness(ScriptedBackend::new(0, "разбор"));
    h.command(USER, "/stats").await;
    assert_eq!(h.last_text(), texts::UNKNOWN_COMMAND);

    h.store.mark_completed(USER).expect("mark");

    h.command(ADMIN, "/stats").await;
    let stats = h.chat.last_to(ADMIN).expect("stats").text;
    assert!(stats.contains("Обслужено: 1"));

    h.command(ADMIN, &format!("/unblock {}", USER.0)).await;
    h.command(ADMIN, &format!("/unblock {}", USER.0)).await;
    let replies = h.chat.texts_to(ADMIN);
    assert_eq!(replies[1], texts::admin_unblocked(USER, true));
    assert_eq!(replies[2], texts::admin_unblocked(USER, false));

    h.command(USER, "/start").await;
    assert!(h.last_text().starts_with(texts::WELCOME));
}

#[tokio::test(start_paused = true)]
async fn pending_command_counts_jobs_by_kind() {
    let h = harness(ScriptedBackend::new(0, "разбор"));
    h.submit_matrix().await;
    settle().await;

    h.command(ADMIN, "/pending").await;
    assert_eq!(
        h.chat.last_to(ADMIN).expect("reply").text,
        texts::admin_pending(1, 0)
    );
}
