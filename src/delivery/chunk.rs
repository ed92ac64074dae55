use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::ChatTransport;
use crate::types::{ChatId, Outgoing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub max_len: usize,
    /// Pause between consecutive segments.
    pub pause: Duration,
    /// Send attempts per segment, first try included.
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("nothing to deliver")]
    Empty,
    #[error("first segment could not be delivered: {0}")]
    FirstSegment(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    pub segments: usize,
    /// Later segments dropped after exhausting their retries.
    pub failed: usize,
}

/// Split `text` into segments of at most `max_len` characters. Concatenating
/// the segments yields `text` exactly.
pub fn split_chunks(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut out = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in text.chars() {
        if count == max_len {
            out.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Send a long text as sequential segments. A failed first segment is an
/// error (the user got nothing); later failures are logged and skipped.
pub async fn send_long(
    chat: &dyn ChatTransport,
    to: ChatId,
    text: &str,
    policy: &ChunkPolicy,
) -> Result<DeliveryReport, DeliveryError> {
    let max_len = policy.max_len.min(chat.max_message_len());
    let segments = split_chunks(text, max_len);
    if segments.is_empty() {
        return Err(DeliveryError::Empty);
    }

    let mut report = DeliveryReport {
        segments: segments.len(),
        failed: 0,
    };
    for (idx, segment) in segments.iter().enumerate() {
        if idx > 0 {
            tokio::time::sleep(policy.pause).await;
        }
        let msg = Outgoing::text(segment.as_str());
        if let Err(e) = send_with_retry(chat, to, &msg, policy).await {
            if idx == 0 {
                return Err(DeliveryError::FirstSegment(e.to_string()));
            }
            warn!(chat = to.0, segment = idx, error = %e, "dropping undeliverable segment");
            report.failed += 1;
        }
    }
    Ok(report)
}

async fn send_with_retry(
    chat: &dyn ChatTransport,
    to: ChatId,
    msg: &Outgoing,
    policy: &ChunkPolicy,
) -> anyhow::Result<()> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        match chat.send(to, msg).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt + 1 >= attempts => return Err(e),
            Err(e) => {
                debug!(chat = to.0, attempt, error = %e, "segment send failed, retrying");
                tokio::time::sleep(backoff(policy.pause, attempt)).await;
                attempt += 1;
            }
        }
    }
}

/// Wait after failed attempt `attempt` (0-based): `pause * 2^attempt`.
fn backoff(pause: Duration, attempt: u32) -> Duration {
    pause.saturating_mul(2u32.saturating_pow(attempt))
}
