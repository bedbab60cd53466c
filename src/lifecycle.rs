//! Send lifecycle: `Idle -> Sending -> Idle`.
//!
//! The controller owns the conversation, the live send session and the started flag.
//! It never awaits. Starting a send hands back a [`Dispatch`] that the host runs on
//! the runtime; the resulting [`Completion`] is fed back through
//! [`Controller::complete`]. Every mutation therefore happens on the caller's
//! single UI context.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::conversation::{Conversation, Message, Role};
use crate::error::SendError;
use crate::format::{escape, render_markup};
use crate::preferences::Audience;
use crate::webhook::Transport;

pub const CANCELLED_BY_USER: &str = "Request cancelled.";
pub const CANCELLED_IN_FLIGHT: &str = "Request was cancelled.";
pub const GENERIC_APOLOGY: &str = "Sorry, something went wrong. Please try again.";

pub fn connection_apology(detail: &str) -> String {
    format!(
        "Sorry, I'm having trouble connecting right now. Please try again in a moment. (Error: {})",
        detail
    )
}

/// Side effects the controller drives. Calls are fire-and-forget.
pub trait Presenter {
    fn render_message(&mut self, role: Role, markup: &str);
    fn render_typing_indicator(&mut self);
    fn remove_typing_indicator(&mut self);
    fn clear_input_field(&mut self);
    fn reveal_main_ui(&mut self);
}

/// User actions that can start or interrupt a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Send button. Acts as the cancel button while a reply is awaited.
    ComposerSubmit(String),
    EnterPressed { text: String, shift: bool },
    StarterChosen(String),
    CtaPressed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    AwaitingReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

#[derive(Debug)]
struct SendSession {
    id: SessionId,
    token: CancellationToken,
    audience: Audience,
}

#[derive(Debug)]
enum State {
    Idle,
    Sending(SendSession),
}

/// What a UI event is allowed to attempt in the current state.
#[derive(Debug, PartialEq, Eq)]
enum Transition {
    Start(String),
    Cancel,
    Ignore,
}

/// Outbound work for one send session.
#[derive(Debug)]
pub struct Dispatch {
    pub session: SessionId,
    pub user_text: String,
    /// Log as of the send, already holding the escaped user entry.
    pub history: Vec<Message>,
    pub audience: Audience,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub session: SessionId,
    pub outcome: Result<String, SendError>,
}

impl Dispatch {
    /// Runs the transport call in its own task so a panic surfaces as an unexpected failure.
    pub async fn run(self, transport: Arc<dyn Transport>) -> Completion {
        let Dispatch {
            session,
            user_text,
            history,
            audience,
            cancel,
        } = self;

        let handle = tokio::spawn(async move {
            transport
                .send(&user_text, &history, audience, cancel)
                .await
        });

        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(SendError::Unexpected {
                message: e.to_string(),
            }),
        };

        Completion { session, outcome }
    }
}

pub struct Controller<P: Presenter> {
    presenter: P,
    conversation: Conversation,
    state: State,
    started: bool,
    audience: Audience,
    last_session: u64,
}

impl<P: Presenter> Controller<P> {
    pub fn new(presenter: P, audience: Audience) -> Self {
        Controller {
            presenter,
            conversation: Conversation::new(),
            state: State::Idle,
            started: false,
            audience,
            last_session: 0,
        }
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    #[allow(dead_code)]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn mode(&self) -> Mode {
        match self.state {
            State::Idle => Mode::Idle,
            State::Sending(_) => Mode::AwaitingReply,
        }
    }

    #[allow(dead_code)]
    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Applies to the next send. A send already in flight keeps the audience it started with.
    pub fn set_audience(&mut self, audience: Audience) {
        self.audience = audience;
    }

    /// Maps the event to one transition and applies it. Returns the job to run when a send starts.
    pub fn dispatch(&mut self, event: UiEvent) -> Option<Dispatch> {
        match self.transition_for(event) {
            Transition::Start(text) => Some(self.start(text)),
            Transition::Cancel => {
                self.cancel();
                None
            }
            Transition::Ignore => None,
        }
    }

    fn transition_for(&self, event: UiEvent) -> Transition {
        let sending = matches!(self.state, State::Sending(_));
        match event {
            UiEvent::ComposerSubmit(_) if sending => Transition::Cancel,
            UiEvent::EnterPressed { shift: true, .. } => Transition::Ignore,
            UiEvent::EnterPressed { .. } | UiEvent::StarterChosen(_) | UiEvent::CtaPressed(_)
                if sending =>
            {
                Transition::Ignore
            }
            UiEvent::ComposerSubmit(text)
            | UiEvent::EnterPressed { text, .. }
            | UiEvent::StarterChosen(text)
            | UiEvent::CtaPressed(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Transition::Ignore
                } else {
                    Transition::Start(trimmed.to_string())
                }
            }
        }
    }

    fn start(&mut self, text: String) -> Dispatch {
        if !self.started {
            self.started = true;
            self.presenter.reveal_main_ui();
        }

        self.append(Role::User, escape(&text));
        let history = self.conversation.snapshot();
        self.presenter.clear_input_field();
        self.presenter.render_typing_indicator();

        self.last_session += 1;
        let id = SessionId(self.last_session);
        let token = CancellationToken::new();
        self.state = State::Sending(SendSession {
            id,
            token: token.clone(),
            audience: self.audience,
        });
        debug!(session = id.0, audience = self.audience.as_str(), "send started");

        Dispatch {
            session: id,
            user_text: text,
            history,
            audience: self.audience,
            cancel: token,
        }
    }

    /// Cancels the live session, if any. Returns whether one was cancelled.
    pub fn cancel(&mut self) -> bool {
        let State::Sending(session) = std::mem::replace(&mut self.state, State::Idle) else {
            return false;
        };

        session.token.cancel();
        debug!(
            session = session.id.0,
            audience = session.audience.as_str(),
            "send cancelled by user"
        );
        self.presenter.remove_typing_indicator();
        self.append(Role::Assistant, CANCELLED_BY_USER.to_string());
        true
    }

    /// Applies a finished send. Completions from a session that is no longer live are dropped.
    pub fn complete(&mut self, completion: Completion) {
        let live = match &self.state {
            State::Sending(session) => session.id == completion.session,
            State::Idle => false,
        };
        if !live {
            debug!(session = completion.session.0, "dropping stale completion");
            return;
        }

        self.state = State::Idle;
        self.presenter.remove_typing_indicator();

        let markup = match completion.outcome {
            Ok(reply) => render_markup(&reply),
            Err(SendError::Cancelled) => CANCELLED_IN_FLIGHT.to_string(),
            Err(e) if e.is_transport() => connection_apology(&e.to_string()),
            Err(e) => {
                error!("Send error: {}", e);
                GENERIC_APOLOGY.to_string()
            }
        };
        self.append(Role::Assistant, markup);
    }

    fn append(&mut self, role: Role, content: String) {
        let message = self.conversation.append(role, content);
        self.presenter.render_message(message.role, &message.content);
    }
}

impl<P: Presenter> Drop for Controller<P> {
    fn drop(&mut self) {
        if let State::Sending(session) = &self.state {
            warn!(session = session.id.0, "controller dropped with a send in flight");
            session.token.cancel();
        }
    }
}
