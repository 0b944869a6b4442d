//! Deadline-bound wait for the button press answering one prompt.

use std::{sync::Arc, time::Duration};

use {
    tokio::time::Instant,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use metrics::counter;

use {
    tunegrab_common::types::{ChoiceResponse, PromptId, SessionKey},
    tunegrab_sessions::{ChoiceSlot, SessionRegistry},
};

use crate::{
    error::{Error, Phase, Result},
    notifier::Notifier,
};

#[cfg(feature = "metrics")]
use crate::metrics as routing_metrics;

/// Button value that aborts a choice. Returned to the caller like any
/// other value.
pub const CANCEL_CHOICE: &str = "cancel";

enum Outcome {
    Matched(String),
    TimedOut,
    Canceled,
}

impl Outcome {
    #[cfg(feature = "metrics")]
    fn label(&self) -> &'static str {
        match self {
            Self::Matched(_) => "matched",
            Self::TimedOut => "timeout",
            Self::Canceled => "canceled",
        }
    }
}

/// Waits for the response to a specific prompt on a session's queue.
///
/// At most one wait per session is outstanding. Presses for other
/// prompts that arrive during the wait are discarded and their buttons
/// removed. When the wait ends, for any reason, the prompt's own buttons
/// are removed too.
pub struct ChoiceCoordinator {
    registry: Arc<SessionRegistry>,
    notifier: Arc<dyn Notifier>,
}

/// A claimed choice slot whose prompt has not been sent yet.
///
/// Presses delivered while this is held are queued for [`ChoiceCoordinator::wait_for`].
/// Dropping it without waiting releases the session.
#[derive(Debug)]
pub struct PendingChoice {
    slot: ChoiceSlot,
}

impl PendingChoice {
    #[must_use]
    pub fn session(&self) -> SessionKey {
        self.slot.session()
    }
}

impl ChoiceCoordinator {
    pub fn new(registry: Arc<SessionRegistry>, notifier: Arc<dyn Notifier>) -> Self {
        Self { registry, notifier }
    }

    /// Whether `session` has a wait outstanding right now.
    pub fn is_waiting(&self, session: SessionKey) -> bool {
        self.registry.is_choice_active(session)
    }

    /// Claim `session` for a choice before its prompt goes out, so a press
    /// landing right after the prompt is sent is queued rather than dropped.
    ///
    /// Presses left over from earlier prompts are discarded. Fails with
    /// [`Error::SessionBusy`] if the session already has a wait outstanding.
    pub fn begin(&self, session: SessionKey) -> Result<PendingChoice> {
        let slot = match self.registry.begin_choice(session) {
            Ok(slot) => slot,
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(routing_metrics::CHOICE_OUTCOMES_TOTAL, "outcome" => "busy").increment(1);
                warn!(%session, "choice requested while another is outstanding");
                return Err(e.into());
            },
        };

        for stale in slot.discard_pending() {
            debug!(%session, prompt = %stale.prompt, "discarding press left over from an earlier prompt");
            self.discard_stray(session, stale);
        }
        Ok(PendingChoice { slot })
    }

    /// Wait up to `wait` for the press answering `prompt` and return its
    /// value.
    ///
    /// Fails with [`Error::Timeout`] once the deadline passes and
    /// [`Error::Canceled`] if `cancel` fires or the session is deleted
    /// mid-wait. A press arriving at exactly the deadline loses.
    pub async fn wait_for(
        &self,
        pending: PendingChoice,
        prompt: PromptId,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let PendingChoice { slot } = pending;
        let session = slot.session();
        let deadline = Instant::now() + wait;
        debug!(%session, %prompt, wait_secs = wait.as_secs_f64(), "waiting for choice");

        let outcome = self.wait(&slot, prompt, deadline, cancel).await;
        drop(slot);
        self.release_prompt(session, prompt);

        #[cfg(feature = "metrics")]
        counter!(routing_metrics::CHOICE_OUTCOMES_TOTAL, "outcome" => outcome.label()).increment(1);

        match outcome {
            Outcome::Matched(value) => {
                info!(%session, %prompt, choice = %value, "choice received");
                Ok(value)
            },
            Outcome::TimedOut => {
                info!(%session, %prompt, "no choice made in time");
                Err(Error::Timeout {
                    phase: Phase::Choice,
                    after: wait,
                })
            },
            Outcome::Canceled => {
                debug!(%session, %prompt, "choice wait canceled");
                Err(Error::Canceled {
                    phase: Phase::Choice,
                })
            },
        }
    }

    /// [`begin`](Self::begin) and [`wait_for`](Self::wait_for) in one step,
    /// for a prompt that is already on screen.
    pub async fn request_choice(
        &self,
        session: SessionKey,
        prompt: PromptId,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let pending = self.begin(session)?;
        self.wait_for(pending, prompt, wait, cancel).await
    }

    async fn wait(
        &self,
        slot: &ChoiceSlot,
        prompt: PromptId,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Outcome {
        let session = slot.session();
        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Outcome::Canceled,
                () = &mut expiry => return Outcome::TimedOut,
                next = slot.recv() => match next {
                    Some(response) if response.prompt == prompt => {
                        self.acknowledge(&response).await;
                        return Outcome::Matched(response.value);
                    },
                    Some(stray) => {
                        debug!(%session, %prompt, stray = %stray.prompt, "discarding press for another prompt");
                        self.discard_stray(session, stray);
                    },
                    None => {
                        debug!(%session, "session closed while waiting for a choice");
                        return Outcome::Canceled;
                    },
                },
            }
        }
    }

    async fn acknowledge(&self, response: &ChoiceResponse) {
        if let Some(ack_id) = &response.ack_id
            && let Err(e) = self.notifier.acknowledge(ack_id).await
        {
            debug!(error = %e, "failed to acknowledge button press");
        }
    }

    /// Remove the prompt's buttons once the wait is over. The session is
    /// already released, so slow cleanup never delays the outcome.
    fn release_prompt(&self, session: SessionKey, prompt: PromptId) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.strip_controls(session, prompt).await {
                debug!(%session, %prompt, error = %e, "could not remove prompt buttons");
            }
        });
    }

    /// Remove a stray press's buttons without holding up the wait.
    fn discard_stray(&self, session: SessionKey, stray: ChoiceResponse) {
        #[cfg(feature = "metrics")]
        counter!(routing_metrics::STRAY_RESPONSES_TOTAL).increment(1);

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.strip_controls(session, stray.prompt).await {
                debug!(%session, prompt = %stray.prompt, error = %e, "could not remove stray buttons");
            }
            if let Some(ack_id) = &stray.ack_id
                && let Err(e) = notifier.acknowledge(ack_id).await
            {
                debug!(error = %e, "failed to acknowledge stray press");
            }
        });
    }
}
