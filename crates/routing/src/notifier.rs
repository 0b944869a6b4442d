use {
    anyhow::Result,
    async_trait::async_trait,
    tunegrab_common::types::{MessageRef, SessionKey},
};

/// One inline button: the label shown and the value sent back when pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceButton {
    pub label: String,
    pub value: String,
}

impl ChoiceButton {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Outbound side of the transport.
///
/// Delivery is best effort: callers decide whether a failure matters.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, session: SessionKey, text: &str) -> Result<MessageRef>;

    /// Send `text` with one button per row, optionally as a reply.
    async fn send_choices(
        &self,
        session: SessionKey,
        text: &str,
        reply_to: Option<MessageRef>,
        choices: &[ChoiceButton],
    ) -> Result<MessageRef>;

    async fn edit_text(&self, session: SessionKey, message: MessageRef, text: &str) -> Result<()>;

    /// Remove the inline keyboard from a message.
    async fn strip_controls(&self, session: SessionKey, message: MessageRef) -> Result<()>;

    async fn send_file(
        &self,
        session: SessionKey,
        reply_to: Option<MessageRef>,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<MessageRef>;

    /// Acknowledge a button press so the client stops showing progress.
    /// No-op by default.
    async fn acknowledge(&self, _ack_id: &str) -> Result<()> {
        Ok(())
    }
}
