//! Core value types shared by the router, the transport, and the sessions
//! registry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of one conversation (the Telegram chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(pub i64);

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SessionKey {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Handle to a message inside a conversation.
///
/// Inline keyboards are attached to a message, so the handle of the message
/// carrying the buttons doubles as the prompt identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub i32);

/// Identifier of a prompt awaiting a choice.
pub type PromptId = MessageRef;

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A button press: which prompt it belongs to and the value it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceResponse {
    /// Prompt whose keyboard was pressed.
    pub prompt: PromptId,
    /// Opaque value attached to the pressed button.
    pub value: String,
    /// Transport-level id used to acknowledge the press, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<String>,
}

impl ChoiceResponse {
    pub fn new(prompt: PromptId, value: impl Into<String>) -> Self {
        Self {
            prompt,
            value: value.into(),
            ack_id: None,
        }
    }

    #[must_use]
    pub fn with_ack_id(mut self, ack_id: impl Into<String>) -> Self {
        self.ack_id = Some(ack_id.into());
        self
    }
}
