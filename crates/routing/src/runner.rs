//! Deadline-bound execution of a single long-running operation.

use std::{future::Future, time::Duration};

use {
    tokio::{sync::oneshot, time::Instant},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

use crate::error::{Error, Phase, Result};

#[cfg(feature = "metrics")]
use crate::metrics as routing_metrics;

/// Runs operations under a fixed deadline.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineRunner {
    timeout: Duration,
}

impl DeadlineRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// See [`run_with_deadline`].
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, op: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        run_with_deadline(op, self.timeout, cancel).await
    }
}

/// Start `op` and wait for its result, the deadline, or `cancel`,
/// whichever comes first.
///
/// The operation runs on its own task and receives a token that is
/// cancelled as soon as the caller stops waiting, for any reason. A
/// result that arrives after that point is discarded. A result that is
/// ready at the same instant as the deadline wins.
pub async fn run_with_deadline<T, F, Fut>(
    op: F,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let op_cancel = cancel.child_token();
    let _abandon = op_cancel.clone().drop_guard();
    let (tx, rx) = oneshot::channel();
    let started = Instant::now();

    let fut = op(op_cancel);
    tokio::spawn(async move {
        let result = fut.await;
        if tx.send(result).is_err() {
            debug!("task finished after its caller stopped waiting, result discarded");
        }
    });

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let outcome = tokio::select! {
        biased;
        result = rx => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(error = %e, "task failed");
                Err(Error::task(e))
            },
            Err(_) => {
                warn!("task ended without reporting a result");
                Err(Error::TaskAborted)
            },
        },
        () = cancel.cancelled() => {
            debug!("task canceled by caller");
            Err(Error::Canceled { phase: Phase::Task })
        },
        () = &mut deadline => {
            warn!(timeout_secs = timeout.as_secs_f64(), "task deadline exceeded");
            Err(Error::Timeout { phase: Phase::Task, after: timeout })
        },
    };

    #[cfg(feature = "metrics")]
    {
        let label = match &outcome {
            Ok(_) => "success",
            Err(Error::Timeout { .. }) => "timeout",
            Err(Error::Canceled { .. }) => "canceled",
            Err(_) => "failure",
        };
        counter!(routing_metrics::TASK_OUTCOMES_TOTAL, "outcome" => label).increment(1);
        histogram!(routing_metrics::TASK_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    }
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, ok = outcome.is_ok(), "task finished");

    outcome
}
