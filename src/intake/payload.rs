use serde::{Deserialize, Serialize};

use crate::intake::session::Session;
use crate::texts;
use crate::types::{Field, ServiceKind, UserId};

/// Read-only view of a completed form, ready to be rendered into a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub user: UserId,
    pub service: ServiceKind,
    pub fields: Vec<(Field, String)>,
}

impl RequestPayload {
    /// Build the payload from a session. `None` unless every field of the
    /// chosen service has a validated value.
    pub fn from_session(user: UserId, session: &Session) -> Option<Self> {
        let service = session.service?;
        let fields = service
            .fields()
            .iter()
            .map(|f| session.fields.get(f).map(|v| (*f, v.clone())))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            user,
            service,
            fields,
        })
    }

    pub fn value(&self, field: Field) -> Option<&str> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Client data block inserted into the generation prompt.
    pub fn client_block(&self) -> String {
        match self.service {
            ServiceKind::Tarot => self.labelled_lines(),
            ServiceKind::Matrix => {
                // The matrix reading is driven by the birth date, so it leads.
                let mut out = String::new();
                if let Some(date) = self.value(Field::BirthDate) {
                    out.push_str(&format!("Дата рождения: {date}\n"));
                }
                if let Some(name) = self.value(Field::Name) {
                    out.push_str(&format!("Имя: {name}\n"));
                }
                out
            }
        }
    }

    /// Summary shown on the review screen and in operator alerts.
    pub fn summary(&self) -> String {
        format!(
            "{}\n\n{}",
            texts::service_title(self.service),
            self.labelled_lines()
        )
    }

    fn labelled_lines(&self) -> String {
        self.fields
            .iter()
            .map(|(f, v)| format!("{}: {v}\n", texts::field_title(*f)))
            .collect()
    }
}
