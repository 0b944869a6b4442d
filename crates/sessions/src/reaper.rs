//! Periodic eviction of idle sessions.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tokio::{
        task::JoinHandle,
        time::{Instant, MissedTickBehavior},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use tunegrab_common::types::SessionKey;

use crate::registry::SessionRegistry;

/// Default sweep period.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default idle threshold after which a session is evicted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Told about every evicted session, after the eviction is committed.
#[async_trait]
pub trait EvictionListener: Send + Sync {
    async fn session_evicted(&self, session: SessionKey) -> anyhow::Result<()>;
}

/// Sweeps the registry on a fixed period and deletes idle sessions.
pub struct Reaper {
    registry: Arc<SessionRegistry>,
    interval: Duration,
    idle_timeout: Duration,
    listener: Option<Arc<dyn EvictionListener>>,
}

impl Reaper {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            interval: DEFAULT_SWEEP_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            listener: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn EvictionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Run one sweep now and return the evicted keys.
    ///
    /// Listener failures are logged and never abort the sweep.
    pub async fn sweep(&self) -> Vec<SessionKey> {
        let evicted = self.registry.reap_idle(self.idle_timeout, Instant::now());
        for &session in &evicted {
            info!(%session, "removed inactive session");
            if let Some(listener) = &self.listener
                && let Err(e) = listener.session_evicted(session).await
            {
                warn!(%session, error = %e, "failed to notify evicted session");
            }
        }
        if evicted.is_empty() {
            debug!(live = self.registry.len(), "reaper sweep found no idle sessions");
        }
        evicted
    }

    /// Spawn the sweep loop. It stops when `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing can be idle yet.
            ticker.tick().await;

            info!(
                interval_secs = self.interval.as_secs(),
                idle_timeout_secs = self.idle_timeout.as_secs(),
                "session reaper started"
            );
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("session reaper stopped");
                        break;
                    },
                    _ = ticker.tick() => {
                        self.sweep().await;
                    },
                }
            }
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    const A: SessionKey = SessionKey(10);
    const B: SessionKey = SessionKey(20);

    #[derive(Default)]
    struct RecordingListener {
        seen: Mutex<Vec<SessionKey>>,
        failures: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EvictionListener for RecordingListener {
        async fn session_evicted(&self, session: SessionKey) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(session);
            if self.fail {
                self.failures.fetch_add(1, Ordering::Relaxed);
                anyhow::bail!("chat is gone");
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_idle_sessions() {
        let registry = Arc::new(SessionRegistry::default());
        registry.get_or_create(A);
        registry.get_or_create(B);
        let reaper = Reaper::new(Arc::clone(&registry));

        tokio::time::advance(Duration::from_secs(299)).await;
        registry.touch(B);
        assert!(reaper.sweep().await.is_empty());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(reaper.sweep().await, vec![A]);
        assert!(registry.contains(B));
    }

    #[tokio::test(start_paused = true)]
    async fn listener_failure_is_swallowed() {
        let registry = Arc::new(SessionRegistry::default());
        registry.get_or_create(A);
        registry.get_or_create(B);
        let listener = Arc::new(RecordingListener {
            fail: true,
            ..Default::default()
        });
        let reaper = Reaper::new(Arc::clone(&registry)).with_listener(listener.clone());

        tokio::time::advance(Duration::from_secs(301)).await;
        let mut evicted = reaper.sweep().await;
        evicted.sort();

        assert_eq!(evicted, vec![A, B]);
        assert_eq!(listener.failures.load(Ordering::Relaxed), 2);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_reaper_runs_on_its_interval() {
        let registry = Arc::new(SessionRegistry::default());
        let listener = Arc::new(RecordingListener::default());
        let cancel = CancellationToken::new();
        let handle = Reaper::new(Arc::clone(&registry))
            .with_interval(Duration::from_secs(60))
            .with_idle_timeout(Duration::from_secs(90))
            .with_listener(listener.clone())
            .spawn(cancel.clone());

        registry.get_or_create(A);
        // t=60: idle 60s, kept. t=120: idle 120s, evicted.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(registry.contains(A));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!registry.contains(A));
        assert_eq!(*listener.seen.lock().unwrap(), vec![A]);

        cancel.cancel();
        handle.await.unwrap();
    }
}
