use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::json;
use tracing::warn;

use crate::types::UserId;

const SUMMARY_LIMIT_CHARS: usize = 600;
const TRUNCATION_MARKER: &str = "…(truncated)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalEvent {
    Submitted,
    Generated,
    GenerationFailed,
    Scheduled,
    SchedulingFailed,
    Delivered,
    DeliveryFailed,
    ReminderSent,
    Feedback,
    AdminUnblock,
}

impl JournalEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Generated => "generated",
            Self::GenerationFailed => "generation_failed",
            Self::Scheduled => "scheduled",
            Self::SchedulingFailed => "scheduling_failed",
            Self::Delivered => "delivered",
            Self::DeliveryFailed => "delivery_failed",
            Self::ReminderSent => "reminder_sent",
            Self::Feedback => "feedback",
            Self::AdminUnblock => "admin_unblock",
        }
    }
}

/// Append-only JSONL record of request lifecycle events.
#[derive(Debug, Clone)]
pub struct Journal {
    path: Option<PathBuf>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A journal that drops every record.
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a record. Failures are logged and never reach the caller.
    pub fn record(&self, event: JournalEvent, user: UserId, summary: &str) {
        if let Err(e) = self.write(event, user, summary) {
            warn!(event = event.as_str(), error = %e, "journal write failed");
        }
    }

    fn write(&self, event: JournalEvent, user: UserId, summary: &str) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open `{}`", path.display()))?;

        let line = json!({
            "ts": Local::now().to_rfc3339(),
            "event": event.as_str(),
            "user_id": user.0,
            "summary": truncate_chars(summary, SUMMARY_LIMIT_CHARS),
        });
        writeln!(file, "{line}")?;
        Ok(())
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max <= marker_len {
        return TRUNCATION_MARKER.chars().take(max).collect();
    }
    let mut out: String = s.chars().take(max - marker_len).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_appended_as_json_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = Journal::new(dir.path().join("logs").join("journal.jsonl"));
        journal.record(JournalEvent::Submitted, UserId(1), "Матрица судьбы");
        journal.record(JournalEvent::Delivered, UserId(1), "3 segments");

        let text = fs::read_to_string(journal.path().expect("path")).expect("read");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "submitted");
        assert_eq!(lines[1]["user_id"], 1);
    }

    #[test]
    fn long_summaries_are_truncated() {
        let out = truncate_chars(&"я".repeat(1000), 100);
        assert_eq!(out.chars().count(), 100);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(truncate_chars("короткий", 100), "короткий");
        assert_eq!(truncate_chars(&"я".repeat(50), 5), "…(tru");
    }
}
