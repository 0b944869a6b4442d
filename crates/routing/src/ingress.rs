//! Single-consumer ingestion of the inbound event stream.

use std::sync::Arc;

use {
    async_trait::async_trait,
    futures::{Stream, StreamExt},
    tokio::{sync::Semaphore, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, trace, warn},
};

#[cfg(feature = "metrics")]
use metrics::counter;

use {
    tunegrab_common::types::{ChoiceResponse, SessionKey},
    tunegrab_sessions::SessionRegistry,
};

use crate::event::{EventKind, InboundEvent, Request};

#[cfg(feature = "metrics")]
use crate::metrics as routing_metrics;

/// Application logic run for each request, on its own task.
#[async_trait]
pub trait UpdateHandler: Send + Sync + 'static {
    async fn handle(&self, session: SessionKey, request: Request) -> anyhow::Result<()>;

    /// Called after `handle` fails. The error is already logged.
    async fn report_error(&self, _session: SessionKey, _error: &anyhow::Error) {}

    /// Called for a button press that could not be queued.
    async fn response_dropped(&self, _session: SessionKey, _response: ChoiceResponse) {}
}

/// What [`IngressRouter::ingest`] did with an event.
#[derive(Debug)]
pub enum Ingested {
    /// A button press was queued on its session.
    Queued,
    /// A button press was dropped, with the reason.
    Dropped(&'static str),
    /// A handler task was spawned for a request.
    Dispatched(JoinHandle<()>),
}

/// Routes each inbound event to its session.
///
/// Ingestion never blocks on a handler: requests are spawned, and button
/// presses are queued without waiting.
pub struct IngressRouter {
    registry: Arc<SessionRegistry>,
    handler: Arc<dyn UpdateHandler>,
    in_flight: Option<Arc<Semaphore>>,
}

impl IngressRouter {
    pub fn new(registry: Arc<SessionRegistry>, handler: Arc<dyn UpdateHandler>) -> Self {
        Self {
            registry,
            handler,
            in_flight: None,
        }
    }

    /// Cap the number of handler tasks running at once. Excess tasks are
    /// still spawned but wait for a permit.
    #[must_use]
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.in_flight = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Process one event. Every event counts as activity for its session.
    pub fn ingest(&self, event: InboundEvent) -> Ingested {
        #[cfg(feature = "metrics")]
        counter!(routing_metrics::EVENTS_INGESTED_TOTAL, "kind" => event.kind_label()).increment(1);

        let InboundEvent {
            session,
            sender,
            kind,
        } = event;
        self.registry.touch_or_create(session);

        match kind {
            EventKind::Response(response) => self.route_response(session, response),
            EventKind::Request(request) => {
                debug!(%session, sender = sender.as_deref().unwrap_or("-"), message = %request.message(), "update received");
                Ingested::Dispatched(self.dispatch(session, request))
            },
        }
    }

    fn route_response(&self, session: SessionKey, response: ChoiceResponse) -> Ingested {
        let prompt = response.prompt;
        let delivery = self.registry.deliver(session, response);
        if delivery.is_queued() {
            trace!(%session, %prompt, "button press routed");
            return Ingested::Queued;
        }

        let reason = delivery.label();
        debug!(%session, %prompt, reason, "button press dropped");
        #[cfg(feature = "metrics")]
        counter!(routing_metrics::RESPONSES_DROPPED_TOTAL, "reason" => reason).increment(1);

        if let Some(response) = delivery.into_rejected() {
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                handler.response_dropped(session, response).await;
            });
        }
        Ingested::Dropped(reason)
    }

    fn dispatch(&self, session: SessionKey, request: Request) -> JoinHandle<()> {
        let handler = Arc::clone(&self.handler);
        let limiter = self.in_flight.clone();
        tokio::spawn(async move {
            let _permit = match limiter {
                Some(limiter) => match limiter.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };
            if let Err(e) = handler.handle(session, request).await {
                #[cfg(feature = "metrics")]
                counter!(routing_metrics::HANDLER_ERRORS_TOTAL).increment(1);
                warn!(%session, error = %e, "update handler failed");
                handler.report_error(session, &e).await;
            }
        })
    }

    /// Consume `events` in order until the stream ends or `cancel` fires.
    /// Returns the number of events ingested.
    pub async fn run<S>(&self, mut events: S, cancel: CancellationToken) -> u64
    where
        S: Stream<Item = InboundEvent> + Unpin,
    {
        info!("ingress router started");
        let mut ingested = 0u64;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(ingested, "ingress router stopped");
                    break;
                },
                next = events.next() => match next {
                    Some(event) => {
                        self.ingest(event);
                        ingested += 1;
                    },
                    None => {
                        info!(ingested, "inbound stream closed");
                        break;
                    },
                },
            }
        }
        ingested
    }
}
