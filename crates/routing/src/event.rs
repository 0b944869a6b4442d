//! Transport-neutral inbound events.

use tunegrab_common::types::{ChoiceResponse, MessageRef, SessionKey};

/// One event from the inbound stream, already attributed to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub session: SessionKey,
    /// Sender's username, for logs only.
    pub sender: Option<String>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A button press answering a prompt.
    Response(ChoiceResponse),
    /// Anything that needs a handler task.
    Request(Request),
}

/// Work dispatched to a freshly spawned handler task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `/name args`, with any `@botname` suffix already stripped.
    Command {
        name: String,
        args: String,
        message: MessageRef,
    },
    /// Free-form text.
    Text { text: String, message: MessageRef },
}

impl Request {
    /// The inbound message this request came from.
    #[must_use]
    pub fn message(&self) -> MessageRef {
        match self {
            Self::Command { message, .. } | Self::Text { message, .. } => *message,
        }
    }
}

impl InboundEvent {
    pub fn response(session: SessionKey, response: ChoiceResponse) -> Self {
        Self {
            session,
            sender: None,
            kind: EventKind::Response(response),
        }
    }

    pub fn text(session: SessionKey, message: MessageRef, text: impl Into<String>) -> Self {
        Self {
            session,
            sender: None,
            kind: EventKind::Request(Request::Text {
                text: text.into(),
                message,
            }),
        }
    }

    pub fn command(
        session: SessionKey,
        message: MessageRef,
        name: impl Into<String>,
        args: impl Into<String>,
    ) -> Self {
        Self {
            session,
            sender: None,
            kind: EventKind::Request(Request::Command {
                name: name.into(),
                args: args.into(),
                message,
            }),
        }
    }

    #[must_use]
    pub fn with_sender(mut self, sender: Option<String>) -> Self {
        self.sender = sender;
        self
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match &self.kind {
            EventKind::Response(_) => "response",
            EventKind::Request(Request::Command { .. }) => "command",
            EventKind::Request(Request::Text { .. }) => "message",
        }
    }
}
