mod agent;
mod bot;
mod config;
mod delivery;
mod feedback;
mod gate;
mod intake;
mod notify;
mod schedule;
mod store;
mod texts;
mod types;

#[cfg(test)]
mod testing;

use std::{sync::Arc, time::Duration};

use agent::provider::{OpenAiProvider, build_http_client};
use bot::{BotConfig, assemble};
use config::Settings;
use delivery::telegram::TelegramBot;
use notify::OperatorNotifier;
use store::file::FileStore;
use store::journal::Journal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use types::ChatId;

const GENERATION_TIMEOUT: Duration = Duration::from_secs(300);
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MIRABOT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let settings = Settings::load()?;
    let t = &settings.tunables;

    let store = Arc::new(FileStore::open(t.state_path())?);
    let journal = Journal::new(t.journal_path());
    info!(state = %t.state_path().display(), journal = ?journal.path(), "storage opened");

    // Long polling holds the request open for the poll timeout.
    let telegram_client = build_http_client(Duration::from_secs(t.poll_timeout_secs + 15))?;
    let telegram = Arc::new(TelegramBot::new(
        telegram_client,
        &t.telegram_base_url,
        &settings.telegram_token,
    ));
    let backend = Arc::new(OpenAiProvider::new(
        build_http_client(GENERATION_TIMEOUT)?,
        t.openai_base_url.clone(),
        settings.openai_api_key.clone(),
        t.model.clone(),
        t.temperature,
    ));
    let notifier = Arc::new(OperatorNotifier::new(
        telegram.clone(),
        t.operator_chat_id.map(ChatId),
    ));

    let assembly = assemble(
        BotConfig::from_tunables(t),
        store,
        telegram.clone(),
        backend,
        notifier,
        journal,
    );
    let recovered = assembly.scheduler.recover()?;
    info!(recovered, "pending jobs re-armed");
    tokio::spawn(assembly.pipeline.clone().run(assembly.submissions));

    info!(model = %t.model, concurrency = t.concurrency, "bot started");
    let bot = assembly.bot;
    let mut offset = 0i64;
    loop {
        let updates = match telegram.get_updates(offset, t.poll_timeout_secs).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "getUpdates failed");
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            if let Some(id) = &update.callback_id {
                if let Err(e) = telegram.answer_callback(id).await {
                    warn!(error = %e, "answerCallbackQuery failed");
                }
            }
            if let Some(event) = update.event {
                bot.handle(event).await;
            }
        }
    }
}
