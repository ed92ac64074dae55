use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::delivery::ChatTransport;
use crate::types::{ChatId, JobKind, Outgoing, Rating, UserId};

const DETAIL_LIMIT_CHARS: usize = 1_500;

/// Operator-facing alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    Submitted { user: UserId, summary: String },
    GenerationFailed { user: UserId, error: String },
    SchedulingFailed { user: UserId, kind: JobKind, error: String },
    DeliveryFailed { user: UserId, error: String },
    Rated { user: UserId, rating: Rating },
}

impl Alert {
    pub fn render(&self) -> String {
        match self {
            Self::Submitted { user, summary } => {
                format!("📝 Новая заявка от {user}\n\n{}", truncate(summary))
            }
            Self::GenerationFailed { user, error } => {
                format!("⚠️ Генерация не удалась для {user}: {}", truncate(error))
            }
            Self::SchedulingFailed { user, kind, error } => format!(
                "🛑 Не удалось запланировать {} для {user}: {}",
                kind.as_str(),
                truncate(error)
            ),
            Self::DeliveryFailed { user, error } => {
                format!("🛑 Доставка не удалась для {user}: {}", truncate(error))
            }
            Self::Rated { user, rating } => {
                format!("⭐ {user} оценил(а) разбор: {}", rating.as_str())
            }
        }
    }

    fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::GenerationFailed { .. } | Self::SchedulingFailed { .. } | Self::DeliveryFailed { .. }
        )
    }
}

/// Fire-and-forget alert sink. Implementations never fail the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: Alert);
}

/// Logs every alert and forwards it to the operator chat when one is set.
pub struct OperatorNotifier {
    chat: Arc<dyn ChatTransport>,
    operator: Option<ChatId>,
}

impl OperatorNotifier {
    pub fn new(chat: Arc<dyn ChatTransport>, operator: Option<ChatId>) -> Self {
        Self { chat, operator }
    }
}

#[async_trait]
impl Notifier for OperatorNotifier {
    async fn notify(&self, alert: Alert) {
        let text = alert.render();
        if alert.is_failure() {
            warn!(alert = %text, "operator alert");
        } else {
            info!(alert = %text, "operator alert");
        }
        let Some(operator) = self.operator else {
            return;
        };
        if let Err(e) = self.chat.send(operator, &Outgoing::text(text)).await {
            warn!(error = %e, "failed to reach operator chat");
        }
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= DETAIL_LIMIT_CHARS {
        return s.to_string();
    }
    let mut out: String = s.chars().take(DETAIL_LIMIT_CHARS).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_details_are_truncated() {
        let alert = Alert::GenerationFailed {
            user: UserId(1),
            error: "x".repeat(5_000),
        };
        let text = alert.render();
        assert!(text.chars().count() < 1_600);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn failures_are_flagged() {
        assert!(
            Alert::DeliveryFailed {
                user: UserId(1),
                error: "boom".into()
            }
            .is_failure()
        );
        assert!(
            !Alert::Rated {
                user: UserId(1),
                rating: Rating::Good
            }
            .is_failure()
        );
    }
}
