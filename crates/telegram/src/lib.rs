//! Telegram transport for tunegrab.
//!
//! Long-polls the Bot API, turns updates into [`InboundEvent`]s for the
//! router, and implements the outbound [`Notifier`] with teloxide. The
//! conversation itself lives in [`handlers`].
//!
//! [`InboundEvent`]: tunegrab_routing::InboundEvent
//! [`Notifier`]: tunegrab_routing::Notifier

pub mod bot;
pub mod error;
pub mod handlers;
pub mod inbound;
pub mod outbound;

pub use {
    bot::{Connection, connect, spawn_polling},
    error::{Error, Result},
    handlers::{ConversationHandler, ExpiryNotice, FlowError},
    outbound::TelegramNotifier,
};
