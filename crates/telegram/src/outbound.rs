use {
    anyhow::Result,
    async_trait::async_trait,
    std::{future::Future, time::Duration},
    teloxide::{
        ApiError, RequestError,
        payloads::{EditMessageReplyMarkupSetters, SendAudioSetters, SendMessageSetters},
        prelude::*,
        types::{
            ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId,
            ReplyParameters,
        },
    },
    tracing::{debug, warn},
};

use {
    tunegrab_common::types::{MessageRef, SessionKey},
    tunegrab_routing::{ChoiceButton, Notifier},
};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// [`Notifier`] that talks to the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn run_telegram_request_with_retry<T, F, Fut>(
        &self,
        session: SessionKey,
        operation: &'static str,
        mut request: F,
    ) -> std::result::Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let mut retries = 0usize;

        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        return Err(err);
                    };

                    if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            %session,
                            operation,
                            retries,
                            max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                            retry_after_secs = wait.as_secs(),
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }

                    retries += 1;
                    warn!(
                        %session,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }
}

fn chat(session: SessionKey) -> ChatId {
    ChatId(session.0)
}

fn reply_params(reply_to: Option<MessageRef>) -> Option<ReplyParameters> {
    reply_to.map(|m| ReplyParameters::new(MessageId(m.0)).allow_sending_without_reply())
}

/// One button per row, in the order given.
fn keyboard(choices: &[ChoiceButton]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(
        choices
            .iter()
            .map(|c| vec![InlineKeyboardButton::callback(c.label.clone(), c.value.clone())]),
    )
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, session: SessionKey, text: &str) -> Result<MessageRef> {
        let message = self
            .run_telegram_request_with_retry(session, "send message", || {
                let req = self.bot.send_message(chat(session), text);
                async move { req.await }
            })
            .await?;
        debug!(%session, message_id = message.id.0, "telegram message sent");
        Ok(MessageRef(message.id.0))
    }

    async fn send_choices(
        &self,
        session: SessionKey,
        text: &str,
        reply_to: Option<MessageRef>,
        choices: &[ChoiceButton],
    ) -> Result<MessageRef> {
        let markup = keyboard(choices);
        let rp = reply_params(reply_to);
        let message = self
            .run_telegram_request_with_retry(session, "send choices", || {
                let mut req = self
                    .bot
                    .send_message(chat(session), text)
                    .reply_markup(markup.clone());
                if let Some(ref rp) = rp {
                    req = req.reply_parameters(rp.clone());
                }
                async move { req.await }
            })
            .await?;
        debug!(%session, message_id = message.id.0, buttons = choices.len(), "choice prompt sent");
        Ok(MessageRef(message.id.0))
    }

    async fn edit_text(&self, session: SessionKey, message: MessageRef, text: &str) -> Result<()> {
        let result = self
            .run_telegram_request_with_retry(session, "edit message", || {
                let req = self
                    .bot
                    .edit_message_text(chat(session), MessageId(message.0), text);
                async move { req.await }
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn strip_controls(&self, session: SessionKey, message: MessageRef) -> Result<()> {
        let result = self
            .run_telegram_request_with_retry(session, "remove buttons", || {
                let req = self
                    .bot
                    .edit_message_reply_markup(chat(session), MessageId(message.0))
                    .reply_markup(InlineKeyboardMarkup::default());
                async move { req.await }
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn send_file(
        &self,
        session: SessionKey,
        reply_to: Option<MessageRef>,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<MessageRef> {
        let rp = reply_params(reply_to);
        let size = bytes.len();
        let message = self
            .run_telegram_request_with_retry(session, "send audio", || {
                let input = InputFile::memory(bytes.clone()).file_name(file_name.to_string());
                let mut req = self.bot.send_audio(chat(session), input);
                if let Some(ref rp) = rp {
                    req = req.reply_parameters(rp.clone());
                }
                async move { req.await }
            })
            .await?;
        debug!(%session, file_name, size, "audio sent");
        Ok(MessageRef(message.id.0))
    }

    async fn acknowledge(&self, ack_id: &str) -> Result<()> {
        self.bot.answer_callback_query(ack_id.to_string()).await?;
        Ok(())
    }
}
