//! Session-based interaction routing.
//!
//! Demultiplexes the single ordered stream of inbound bot events into
//! per-chat flows:
//!
//! - [`IngressRouter`] resolves the session for each event, records activity,
//!   and either queues a button press or spawns a handler task.
//! - [`ChoiceCoordinator`] waits, under a deadline, for the press that
//!   answers one specific prompt, discarding stray presses.
//! - [`DeadlineRunner`] races a long-running operation against its own
//!   deadline.

pub mod choice;
pub mod error;
pub mod event;
pub mod ingress;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod notifier;
pub mod runner;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod test_support;

pub use {
    choice::{CANCEL_CHOICE, ChoiceCoordinator, PendingChoice},
    error::{Error, Phase, Result},
    event::{EventKind, InboundEvent, Request},
    ingress::{Ingested, IngressRouter, UpdateHandler},
    notifier::{ChoiceButton, Notifier},
    runner::{DeadlineRunner, run_with_deadline},
};
