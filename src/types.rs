use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque chat-platform user id. Private chats share the id with the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound chat target: a user's private chat or the operator group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl From<UserId> for ChatId {
    fn from(user: UserId) -> Self {
        Self(user.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Tarot,
    Matrix,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Tarot, ServiceKind::Matrix];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tarot => "tarot",
            Self::Matrix => "matrix",
        }
    }

    /// Fields collected for this service, in asking order.
    pub fn fields(self) -> &'static [Field] {
        match self {
            Self::Tarot => &[
                Field::Name,
                Field::BirthDate,
                Field::Participants,
                Field::Backstory,
                Field::Question,
            ],
            Self::Matrix => &[Field::Name, Field::BirthDate],
        }
    }

    pub fn first_field(self) -> Field {
        self.fields()[0]
    }

    /// Field asked after `field`, or `None` when the form is complete.
    pub fn next_field(self, field: Field) -> Option<Field> {
        let fields = self.fields();
        let idx = fields.iter().position(|f| *f == field)?;
        fields.get(idx + 1).copied()
    }

    pub fn has_field(self, field: Field) -> bool {
        self.fields().contains(&field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    BirthDate,
    Participants,
    Backstory,
    Question,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::BirthDate => "birth_date",
            Self::Participants => "participants",
            Self::Backstory => "backstory",
            Self::Question => "question",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(Self::Name),
            "birth_date" => Some(Self::BirthDate),
            "participants" => Some(Self::Participants),
            "backstory" => Some(Self::Backstory),
            "question" => Some(Self::Question),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Excellent,
    Good,
    Okay,
}

impl Rating {
    pub const ALL: [Rating; 3] = [Rating::Excellent, Rating::Good, Rating::Okay];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Okay => "okay",
        }
    }
}

/// Every button the bot can render. Callback payloads round-trip through
/// [`Button::callback_data`] and [`Button::parse`]; anything else is dropped
/// at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Service(ServiceKind),
    Confirm,
    Edit,
    EditField(Field),
    Cancel,
    Restart,
    RetryGeneration,
    FeedbackYes,
    FeedbackNo,
    Rate(Rating),
    SkipRating,
}

impl Button {
    pub fn callback_data(self) -> String {
        match self {
            Self::Service(kind) => format!("service:{}", kind.as_str()),
            Self::Confirm => "confirm".to_string(),
            Self::Edit => "edit".to_string(),
            Self::EditField(field) => format!("edit:{}", field.as_str()),
            Self::Cancel => "cancel".to_string(),
            Self::Restart => "restart".to_string(),
            Self::RetryGeneration => "retry".to_string(),
            Self::FeedbackYes => "feedback:yes".to_string(),
            Self::FeedbackNo => "feedback:no".to_string(),
            Self::Rate(rating) => format!("rate:{}", rating.as_str()),
            Self::SkipRating => "rate:skip".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "confirm" => return Some(Self::Confirm),
            "edit" => return Some(Self::Edit),
            "cancel" => return Some(Self::Cancel),
            "restart" => return Some(Self::Restart),
            "retry" => return Some(Self::RetryGeneration),
            "feedback:yes" => return Some(Self::FeedbackYes),
            "feedback:no" => return Some(Self::FeedbackNo),
            "rate:skip" => return Some(Self::SkipRating),
            _ => {}
        }
        let (prefix, value) = data.split_once(':')?;
        match prefix {
            "service" => ServiceKind::ALL
                .into_iter()
                .find(|k| k.as_str() == value)
                .map(Self::Service),
            "edit" => Field::parse(value).map(Self::EditField),
            "rate" => Rating::ALL
                .into_iter()
                .find(|r| r.as_str() == value)
                .map(Self::Rate),
            _ => None,
        }
    }

    pub fn is_feedback(self) -> bool {
        matches!(
            self,
            Self::FeedbackYes | Self::FeedbackNo | Self::Rate(_) | Self::SkipRating
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Restart,
    Cancel,
    Help,
    /// Admin: clear a user's completion record.
    Unblock(Option<UserId>),
    /// Admin: number of pending scheduled jobs.
    Pending,
    /// Admin: number of served users.
    Stats,
    Unknown(String),
}

impl Command {
    /// Parse `/name args`, tolerating the `@botname` suffix group chats add.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let body = text.strip_prefix('/')?;
        let mut parts = body.split_whitespace();
        let head = parts.next().unwrap_or_default();
        let name = head.split('@').next().unwrap_or_default();
        let cmd = match name {
            "start" => Self::Start,
            "restart" => Self::Restart,
            "cancel" => Self::Cancel,
            "help" => Self::Help,
            "unblock" => Self::Unblock(parts.next().and_then(|s| s.parse().ok()).map(UserId)),
            "pending" => Self::Pending,
            "stats" => Self::Stats,
            other => Self::Unknown(other.to_string()),
        };
        Some(cmd)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Unblock(_) | Self::Pending | Self::Stats)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Command(Command),
    Button(Button),
    Text(String),
    /// Photos, stickers, documents and other non-text payloads.
    Media,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user: UserId,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn new(user: UserId, kind: EventKind) -> Self {
        Self { user, kind }
    }

    /// Classify a raw text message as a command or free text.
    pub fn from_text(user: UserId, text: &str) -> Self {
        let kind = match Command::parse(text) {
            Some(cmd) => EventKind::Command(cmd),
            None => EventKind::Text(text.to_string()),
        };
        Self { user, kind }
    }
}

/// One outbound chat message, optionally with an inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outgoing {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

impl Outgoing {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Vec<Vec<Button>>) -> Self {
        Self {
            text: text.into(),
            keyboard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    MainDelivery,
    ReviewReminder,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MainDelivery => "main_delivery",
            Self::ReviewReminder => "review_reminder",
        }
    }
}
