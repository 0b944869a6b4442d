//! Recording [`Notifier`] shared by the unit tests.

use std::sync::{
    Mutex,
    atomic::{AtomicI32, Ordering},
};

use {
    anyhow::Result,
    async_trait::async_trait,
    tunegrab_common::types::{MessageRef, SessionKey},
};

use crate::notifier::{ChoiceButton, Notifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SendText(SessionKey, String),
    SendChoices(SessionKey, String, Vec<String>),
    Edit(SessionKey, MessageRef, String),
    Strip(SessionKey, MessageRef),
    SendFile(SessionKey, String, usize),
    Ack(String),
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: Mutex<Vec<Call>>,
    next_id: AtomicI32,
    /// Make `strip_controls` fail, to exercise best-effort cleanup.
    pub fail_strip: bool,
    /// Make `strip_controls` hang after recording the call.
    pub stall_strip: bool,
}

impl RecordingNotifier {
    pub fn failing_strip() -> Self {
        Self {
            fail_strip: true,
            ..Default::default()
        }
    }

    pub fn stalling_strip() -> Self {
        Self {
            stall_strip: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stripped(&self) -> Vec<MessageRef> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Strip(_, m) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> MessageRef {
        self.calls.lock().unwrap().push(call);
        MessageRef(1000 + self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_text(&self, session: SessionKey, text: &str) -> Result<MessageRef> {
        Ok(self.record(Call::SendText(session, text.to_string())))
    }

    async fn send_choices(
        &self,
        session: SessionKey,
        text: &str,
        _reply_to: Option<MessageRef>,
        choices: &[ChoiceButton],
    ) -> Result<MessageRef> {
        let values = choices.iter().map(|c| c.value.clone()).collect();
        Ok(self.record(Call::SendChoices(session, text.to_string(), values)))
    }

    async fn edit_text(&self, session: SessionKey, message: MessageRef, text: &str) -> Result<()> {
        self.record(Call::Edit(session, message, text.to_string()));
        Ok(())
    }

    async fn strip_controls(&self, session: SessionKey, message: MessageRef) -> Result<()> {
        self.record(Call::Strip(session, message));
        if self.stall_strip {
            std::future::pending::<()>().await;
        }
        if self.fail_strip {
            anyhow::bail!("message to edit not found");
        }
        Ok(())
    }

    async fn send_file(
        &self,
        session: SessionKey,
        _reply_to: Option<MessageRef>,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<MessageRef> {
        Ok(self.record(Call::SendFile(session, file_name.to_string(), bytes.len())))
    }

    async fn acknowledge(&self, ack_id: &str) -> Result<()> {
        self.record(Call::Ack(ack_id.to_string()));
        Ok(())
    }
}
