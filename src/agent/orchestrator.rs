use std::{sync::Arc, time::Duration};

use chrono::{Local, NaiveDate};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::agent::prompt::{self, TimeWindow};
use crate::agent::provider::GenerationBackend;
use crate::intake::payload::RequestPayload;
use crate::notify::{Alert, Notifier};

/// Outcome of a generation request. `Failed` means every attempt was used up;
/// the operator has already been alerted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Text(String),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub attempts: u32,
    pub base: Duration,
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (0-based): `base * 2^attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

pub struct Orchestrator {
    backend: Arc<dyn GenerationBackend>,
    permits: Semaphore,
    retry: RetryPolicy,
    max_tokens: u32,
    notifier: Arc<dyn Notifier>,
    today: fn() -> NaiveDate,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        concurrency: usize,
        retry: RetryPolicy,
        max_tokens: u32,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            backend,
            permits: Semaphore::new(concurrency.max(1)),
            retry,
            max_tokens,
            notifier,
            today: local_today,
        }
    }

    /// Replace the calendar source used for the time window.
    #[cfg(test)]
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    #[cfg(test)]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Render the payload's template and call the backend, retrying with
    /// exponential backoff. Never returns an error.
    pub async fn generate(&self, payload: &RequestPayload) -> Generation {
        let attempts = self.retry.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            // Rebuilt per attempt so the labels match the moment of the call.
            let window = TimeWindow::at((self.today)());
            let prompt = prompt::render(payload, &window);

            let result = {
                let Ok(_permit) = self.permits.acquire().await else {
                    last_error = "generation permits closed".to_string();
                    break;
                };
                self.backend.complete(&prompt, self.max_tokens).await
            };

            match result {
                Ok(text) => {
                    info!(
                        user = payload.user.0,
                        service = payload.service.as_str(),
                        attempt,
                        chars = text.chars().count(),
                        "generation succeeded"
                    );
                    return Generation::Text(text);
                }
                Err(e) => {
                    warn!(user = payload.user.0, attempt, error = %e, "generation attempt failed");
                    last_error = e.to_string();
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.retry.delay(attempt)).await;
                    }
                }
            }
        }

        self.notifier
            .notify(Alert::GenerationFailed {
                user: payload.user,
                error: last_error,
            })
            .await;
        Generation::Failed
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}
