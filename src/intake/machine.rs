use chrono::NaiveDate;

use crate::intake::payload::RequestPayload;
use crate::intake::session::{IntakeState, Session};
use crate::intake::validate::{FieldLimits, validate_field};
use crate::texts;
use crate::types::{Button, Field, Outgoing, ServiceKind, UserId};

/// Where the user stands with respect to the one free consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Open,
    /// A submission is being generated or waits for delivery.
    InProgress,
    Served,
}

/// Inputs the intake flow reacts to. Feedback, retry and admin traffic is
/// routed elsewhere before it gets here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeEvent<'a> {
    Start,
    Restart,
    Cancel,
    Help,
    ChooseService(ServiceKind),
    Input(&'a str),
    Confirm,
    Edit,
    EditField(Field),
    Media,
    UnknownCommand,
}

/// Result of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Session after the transition. Terminal states are returned so the
    /// caller can observe them; the session store drops them.
    pub session: Option<Session>,
    pub replies: Vec<Outgoing>,
    /// Set exactly when the transition reached `Submitted`.
    pub submit: Option<RequestPayload>,
}

impl Step {
    fn stay(session: Option<Session>, reply: Outgoing) -> Self {
        Self {
            session,
            replies: vec![reply],
            submit: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntakeMachine {
    limits: FieldLimits,
}

impl IntakeMachine {
    pub fn new(limits: FieldLimits) -> Self {
        Self { limits }
    }

    pub fn advance(
        &self,
        user: UserId,
        session: Option<Session>,
        event: IntakeEvent<'_>,
        gate: Gate,
        today: NaiveDate,
    ) -> Step {
        use IntakeEvent as E;

        let opens_session =
            session.is_none() || matches!(event, E::Start | E::Restart | E::ChooseService(_));
        if opens_session && gate != Gate::Open {
            return Step::stay(None, gate_reply(gate));
        }

        match (session, event) {
            (_, E::Start) => {
                let mut welcome = service_menu();
                welcome.text = format!("{}\n\n{}", texts::WELCOME, welcome.text);
                Step::stay(Some(Session::choosing()), welcome)
            }
            (_, E::Restart) => Step::stay(Some(Session::choosing()), service_menu()),
            (_, E::ChooseService(kind)) => {
                let next = Session::for_service(kind);
                let reply = current_prompt(&next);
                Step::stay(Some(next), reply)
            }

            (None, E::Cancel) => Step::stay(None, Outgoing::text(texts::NOTHING_TO_CANCEL)),
            (Some(mut s), E::Cancel) => {
                s.state = IntakeState::Cancelled;
                Step::stay(Some(s), Outgoing::text(texts::CANCELLED))
            }

            (session, E::Help) => Step::stay(session, Outgoing::text(texts::HELP)),
            (session, E::Media) => Step::stay(session, Outgoing::text(texts::TEXT_ONLY)),
            (session, E::UnknownCommand) => {
                Step::stay(session, Outgoing::text(texts::UNKNOWN_COMMAND))
            }

            // Free text or a stale button with nothing in progress opens the menu.
            (None, E::Input(_) | E::Confirm | E::Edit | E::EditField(_)) => {
                Step::stay(Some(Session::choosing()), service_menu())
            }

            (Some(s), E::Input(text)) => self.on_input(s, text, today),
            (Some(s), E::Confirm) => on_confirm(user, s),
            (Some(s), E::Edit) => on_edit(s),
            (Some(s), E::EditField(field)) => on_edit_field(s, field),
        }
    }

    fn on_input(&self, mut s: Session, text: &str, today: NaiveDate) -> Step {
        let field = match s.state {
            IntakeState::AskField(field) => field,
            IntakeState::ReviewAndEdit => {
                let reply = current_prompt(&s);
                return Step {
                    replies: vec![Outgoing::text(texts::USE_BUTTONS), reply],
                    session: Some(s),
                    submit: None,
                };
            }
            IntakeState::ChooseService | IntakeState::Submitted | IntakeState::Cancelled => {
                let reply = current_prompt(&s);
                return Step::stay(Some(s), reply);
            }
        };

        let value = match validate_field(field, text, &self.limits, today) {
            Ok(value) => value,
            Err(err) => {
                let reply = current_prompt(&s);
                return Step {
                    replies: vec![Outgoing::text(err.user_message()), reply],
                    session: Some(s),
                    submit: None,
                };
            }
        };
        s.fields.insert(field, value);

        // An edit jumps straight back to the review hub.
        if s.editing.take() == Some(field) && s.is_complete() {
            s.state = IntakeState::ReviewAndEdit;
        } else {
            s.state = match s.service.and_then(|svc| svc.next_field(field)) {
                Some(next) => IntakeState::AskField(next),
                None => IntakeState::ReviewAndEdit,
            };
        }
        let reply = current_prompt(&s);
        Step::stay(Some(s), reply)
    }
}

fn on_confirm(user: UserId, mut s: Session) -> Step {
    if s.state != IntakeState::ReviewAndEdit {
        let reply = current_prompt(&s);
        return Step::stay(Some(s), reply);
    }
    let Some(payload) = RequestPayload::from_session(user, &s) else {
        let reply = current_prompt(&s);
        return Step::stay(Some(s), reply);
    };
    s.state = IntakeState::Submitted;
    Step {
        session: Some(s),
        replies: vec![Outgoing::text(texts::SUBMITTED)],
        submit: Some(payload),
    }
}

fn on_edit(s: Session) -> Step {
    let Some(service) = s.service.filter(|_| s.state == IntakeState::ReviewAndEdit) else {
        let reply = current_prompt(&s);
        return Step::stay(Some(s), reply);
    };
    let mut keyboard: Vec<Vec<Button>> = service
        .fields()
        .iter()
        .map(|f| vec![Button::EditField(*f)])
        .collect();
    keyboard.push(vec![Button::Cancel]);
    Step::stay(Some(s), Outgoing::with_keyboard(texts::PICK_FIELD, keyboard))
}

fn on_edit_field(mut s: Session, field: Field) -> Step {
    let editable = s.state == IntakeState::ReviewAndEdit
        && s.service.is_some_and(|svc| svc.has_field(field));
    if editable {
        s.editing = Some(field);
        s.state = IntakeState::AskField(field);
    }
    let reply = current_prompt(&s);
    Step::stay(Some(s), reply)
}

fn gate_reply(gate: Gate) -> Outgoing {
    match gate {
        Gate::Served => Outgoing::text(texts::ALREADY_SERVED),
        Gate::InProgress | Gate::Open => Outgoing::text(texts::IN_PROGRESS),
    }
}

fn service_menu() -> Outgoing {
    let keyboard = ServiceKind::ALL
        .into_iter()
        .map(|k| vec![Button::Service(k)])
        .collect();
    Outgoing::with_keyboard(texts::CHOOSE_SERVICE, keyboard)
}

/// The prompt for the state the session is in; re-sent on invalid input.
pub fn current_prompt(s: &Session) -> Outgoing {
    match s.state {
        IntakeState::ChooseService => service_menu(),
        IntakeState::AskField(field) => Outgoing::with_keyboard(
            texts::field_prompt(field),
            vec![vec![Button::Cancel, Button::Restart]],
        ),
        IntakeState::ReviewAndEdit => {
            let body = match s.service {
                Some(service) => {
                    let mut out = format!("Проверьте данные — {}:\n\n", texts::service_title(service));
                    for field in service.fields() {
                        let value = s.fields.get(field).map(String::as_str).unwrap_or("—");
                        out.push_str(&format!("{}: {value}\n", texts::field_title(*field)));
                    }
                    out
                }
                None => String::new(),
            };
            Outgoing::with_keyboard(
                body,
                vec![
                    vec![Button::Confirm],
                    vec![Button::Edit],
                    vec![Button::Cancel],
                ],
            )
        }
        IntakeState::Submitted => Outgoing::text(texts::SUBMITTED),
        IntakeState::Cancelled => Outgoing::text(texts::CANCELLED),
    }
}
