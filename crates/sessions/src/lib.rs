//! In-memory session management for the bot.
//!
//! A session is created lazily for every chat that sends an event and holds
//! the bounded queue of button presses waiting for that chat's active choice
//! prompt. The [`Reaper`] evicts sessions that have been idle for too long.

pub mod error;
pub mod reaper;
pub mod registry;

pub use {
    error::{Error, Result},
    reaper::{EvictionListener, Reaper},
    registry::{ChoiceSlot, Delivery, Session, SessionRegistry, SessionSnapshot},
};
