use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::types::UserId;

const ENV_CONFIG_FILE: &str = "MIRABOT_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "mirabot.toml";

/// Tunables read from the optional TOML file. Every key may also be set
/// through a `MIRABOT_<KEY>` environment variable, which wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub concurrency: usize,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
    pub chunk_size: usize,
    pub chunk_pause_ms: u64,
    pub chunk_attempts: u32,
    pub delivery_delay_secs: u64,
    pub review_delay_secs: u64,
    pub min_participants_len: usize,
    pub min_backstory_len: usize,
    pub min_question_len: usize,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub poll_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub admin_ids: Vec<i64>,
    pub operator_chat_id: Option<i64>,
    pub human_contact: String,
    pub openai_base_url: String,
    pub telegram_base_url: String,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retry_attempts: 3,
            retry_base_ms: 2_000,
            chunk_size: 4_000,
            chunk_pause_ms: 700,
            chunk_attempts: 3,
            delivery_delay_secs: 2 * 60 * 60,
            review_delay_secs: 2 * 60 * 60,
            min_participants_len: 2,
            min_backstory_len: 20,
            min_question_len: 10,
            model: "gpt-4o".to_string(),
            max_tokens: 3_500,
            temperature: 0.85,
            poll_timeout_secs: 30,
            data_dir: PathBuf::from("data"),
            admin_ids: Vec::new(),
            operator_chat_id: None,
            human_contact: "@mira_tarot".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            telegram_base_url: "https://api.telegram.org".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub telegram_token: String,
    pub openai_api_key: String,
    pub tunables: Tunables,
}

impl Settings {
    /// Load `.env`, the TOML file and environment overrides. Missing
    /// credentials are the one startup error that stops the process.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = std::env::var(ENV_CONFIG_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut tunables = read_tunables(&path)?;
        apply_env_overrides(&mut tunables, |key| std::env::var(key).ok())?;

        let telegram_token =
            std::env::var("TELEGRAM_TOKEN").context("TELEGRAM_TOKEN env var not set")?;
        let openai_api_key =
            std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY env var not set")?;

        let settings = Self {
            telegram_token,
            openai_api_key,
            tunables,
        };
        settings.tunables.validate()?;
        Ok(settings)
    }
}

impl Tunables {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.retry_attempts == 0 {
            bail!("retry_attempts must be at least 1");
        }
        if self.chunk_size == 0 {
            bail!("chunk_size must be at least 1");
        }
        if self.chunk_attempts == 0 {
            bail!("chunk_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn chunk_pause(&self) -> Duration {
        Duration::from_millis(self.chunk_pause_ms)
    }

    pub fn delivery_delay(&self) -> Duration {
        Duration::from_secs(self.delivery_delay_secs)
    }

    pub fn review_delay(&self) -> Duration {
        Duration::from_secs(self.review_delay_secs)
    }

    pub fn admins(&self) -> Vec<UserId> {
        self.admin_ids.iter().copied().map(UserId).collect()
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("journal.jsonl")
    }
}

fn read_tunables(path: &Path) -> Result<Tunables> {
    if !path.exists() {
        return Ok(Tunables::default());
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read `{}`", path.display()))?;
    parse_tunables(&text).with_context(|| format!("invalid config `{}`", path.display()))
}

pub(crate) fn parse_tunables(text: &str) -> Result<Tunables> {
    toml::from_str(text).map_err(Into::into)
}

pub(crate) fn apply_env_overrides<F>(t: &mut Tunables, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    set_num(&lookup, "MIRABOT_CONCURRENCY", &mut t.concurrency)?;
    set_num(&lookup, "MIRABOT_RETRY_ATTEMPTS", &mut t.retry_attempts)?;
    set_num(&lookup, "MIRABOT_RETRY_BASE_MS", &mut t.retry_base_ms)?;
    set_num(&lookup, "MIRABOT_CHUNK_SIZE", &mut t.chunk_size)?;
    set_num(&lookup, "MIRABOT_CHUNK_PAUSE_MS", &mut t.chunk_pause_ms)?;
    set_num(&lookup, "MIRABOT_CHUNK_ATTEMPTS", &mut t.chunk_attempts)?;
    set_num(&lookup, "MIRABOT_DELIVERY_DELAY_SECS", &mut t.delivery_delay_secs)?;
    set_num(&lookup, "MIRABOT_REVIEW_DELAY_SECS", &mut t.review_delay_secs)?;
    set_num(&lookup, "MIRABOT_MIN_PARTICIPANTS_LEN", &mut t.min_participants_len)?;
    set_num(&lookup, "MIRABOT_MIN_BACKSTORY_LEN", &mut t.min_backstory_len)?;
    set_num(&lookup, "MIRABOT_MIN_QUESTION_LEN", &mut t.min_question_len)?;
    set_num(&lookup, "MIRABOT_MAX_TOKENS", &mut t.max_tokens)?;
    set_num(&lookup, "MIRABOT_TEMPERATURE", &mut t.temperature)?;
    set_num(&lookup, "MIRABOT_POLL_TIMEOUT_SECS", &mut t.poll_timeout_secs)?;

    if let Some(model) = lookup("MIRABOT_MODEL") {
        t.model = model;
    }
    if let Some(dir) = lookup("MIRABOT_DATA_DIR") {
        t.data_dir = PathBuf::from(dir);
    }
    if let Some(contact) = lookup("MIRABOT_HUMAN_CONTACT") {
        t.human_contact = contact;
    }
    if let Some(url) = lookup("OPENAI_BASE_URL") {
        t.openai_base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(raw) = lookup("MIRABOT_OPERATOR_CHAT_ID") {
        t.operator_chat_id = Some(parse_num("MIRABOT_OPERATOR_CHAT_ID", &raw)?);
    }
    if let Some(raw) = lookup("MIRABOT_ADMIN_IDS") {
        t.admin_ids = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_num("MIRABOT_ADMIN_IDS", s))
            .collect::<Result<_>>()?;
    }
    Ok(())
}

fn set_num<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = parse_num(key, &raw)?;
    }
    Ok(())
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{key} must be a number, got `{raw}`"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn toml_keys_override_defaults() {
        let t = parse_tunables(
            r#"
            concurrency = 5
            chunk_size = 3000
            admin_ids = [1, 2]
            "#,
        )
        .expect("parse should succeed");
        assert_eq!(t.concurrency, 5);
        assert_eq!(t.chunk_size, 3000);
        assert_eq!(t.admins(), vec![UserId(1), UserId(2)]);
        assert_eq!(t.retry_attempts, 3);
    }

    #[test]
    fn env_overrides_win_over_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MIRABOT_CONCURRENCY", "7"),
            ("MIRABOT_ADMIN_IDS", "10, 20"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1/"),
        ]);
        let mut t = Tunables::default();
        apply_env_overrides(&mut t, |k| env.get(k).map(|v| v.to_string()))
            .expect("overrides should apply");
        assert_eq!(t.concurrency, 7);
        assert_eq!(t.admin_ids, vec![10, 20]);
        assert_eq!(t.openai_base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn bad_number_is_reported() {
        let mut t = Tunables::default();
        let err = apply_env_overrides(&mut t, |k| {
            (k == "MIRABOT_CHUNK_SIZE").then(|| "lots".to_string())
        })
        .expect_err("should reject");
        assert!(err.to_string().contains("MIRABOT_CHUNK_SIZE"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let t = Tunables {
            concurrency: 0,
            ..Tunables::default()
        };
        assert!(t.validate().is_err());
    }
}
