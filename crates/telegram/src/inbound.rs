//! Conversion of Telegram updates into transport-neutral inbound events.

use {
    teloxide::types::{CallbackQuery, Message, Update, UpdateKind},
    tracing::{debug, trace},
};

use {
    tunegrab_common::types::{ChoiceResponse, MessageRef, SessionKey},
    tunegrab_routing::InboundEvent,
};

/// A `/command` split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub name: &'a str,
    pub args: &'a str,
    /// False when the command names a different bot (`/start@other_bot`).
    pub for_us: bool,
}

/// Parse `text` as a bot command. Returns `None` for plain text.
pub fn parse_command<'a>(text: &'a str, bot_username: Option<&str>) -> Option<ParsedCommand<'a>> {
    let rest = text.strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    let (name, for_us) = match head.split_once('@') {
        Some((name, target)) => (
            name,
            bot_username.is_none_or(|me| target.eq_ignore_ascii_case(me)),
        ),
        None => (head, true),
    };
    if name.is_empty() {
        return None;
    }
    Some(ParsedCommand { name, args, for_us })
}

/// Convert one update. Updates the bot does not act on yield `None`.
pub fn event_from_update(update: Update, bot_username: Option<&str>) -> Option<InboundEvent> {
    match update.kind {
        UpdateKind::Message(msg) => event_from_message(&msg, bot_username),
        UpdateKind::CallbackQuery(query) => event_from_callback(&query),
        _ => {
            trace!(update_id = update.id.0, "ignoring unsupported update");
            None
        },
    }
}

fn event_from_message(msg: &Message, bot_username: Option<&str>) -> Option<InboundEvent> {
    let Some(text) = msg.text() else {
        debug!(chat_id = msg.chat.id.0, "ignoring message without text");
        return None;
    };
    let session = SessionKey(msg.chat.id.0);
    let message = MessageRef(msg.id.0);
    let sender = msg.from.as_ref().and_then(|u| u.username.clone());

    let event = match parse_command(text, bot_username) {
        Some(cmd) if !cmd.for_us => {
            debug!(chat_id = session.0, command = cmd.name, "ignoring command for another bot");
            return None;
        },
        Some(cmd) => InboundEvent::command(session, message, cmd.name, cmd.args),
        None => InboundEvent::text(session, message, text),
    };
    Some(event.with_sender(sender))
}

fn event_from_callback(query: &CallbackQuery) -> Option<InboundEvent> {
    let Some(message) = query.message.as_ref() else {
        debug!(callback_id = %query.id, "ignoring callback query without a message");
        return None;
    };
    let Some(data) = query.data.as_deref() else {
        debug!(callback_id = %query.id, "ignoring callback query without data");
        return None;
    };
    let session = SessionKey(message.chat().id.0);
    let response =
        ChoiceResponse::new(MessageRef(message.id().0), data).with_ack_id(query.id.to_string());
    Some(InboundEvent::response(session, response).with_sender(query.from.username.clone()))
}
