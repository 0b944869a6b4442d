//! Thread-safe table of live sessions.
//!
//! Every mutation (create, touch, delete, queue send, choice slot changes)
//! happens under a single `std::sync::Mutex`. The lock is never held across
//! an `.await`, so a plain mutex is enough; queue consumers only hold the
//! per-session receiver, which lives outside the table lock.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use {
    tokio::{
        sync::{Mutex as AsyncMutex, mpsc, mpsc::error::TrySendError},
        time::Instant,
    },
    tracing::{debug, trace},
};

use tunegrab_common::types::{ChoiceResponse, SessionKey};

use crate::error::{Error, Result};

/// Default capacity of a session's button-press queue.
pub const DEFAULT_CALLBACK_BUFFER: usize = 5;

type ResponseReceiver = Arc<AsyncMutex<mpsc::Receiver<ChoiceResponse>>>;

struct SessionEntry {
    generation: u64,
    /// The only sender for this queue. Dropping the entry closes the queue.
    sender: mpsc::Sender<ChoiceResponse>,
    receiver: ResponseReceiver,
    last_activity: Instant,
    active_choice: bool,
}

impl SessionEntry {
    fn new(generation: u64, capacity: usize, now: Instant) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            generation,
            sender,
            receiver: Arc::new(AsyncMutex::new(receiver)),
            last_activity: now,
            active_choice: false,
        }
    }

    fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

#[derive(Default)]
struct Table {
    sessions: HashMap<SessionKey, SessionEntry>,
    next_generation: u64,
}

impl Table {
    fn get_or_insert(&mut self, key: SessionKey, now: Instant, capacity: usize) -> &mut SessionEntry {
        let Table {
            sessions,
            next_generation,
        } = self;
        sessions.entry(key).or_insert_with(|| {
            *next_generation += 1;
            debug!(session = %key, generation = *next_generation, "session created");
            SessionEntry::new(*next_generation, capacity, now)
        })
    }
}

/// Handle to a live session.
///
/// `generation` distinguishes a session from a later one created for the same
/// key after an eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub key: SessionKey,
    pub generation: u64,
}

/// Point-in-time view of a session, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub last_activity: Instant,
    pub active_choice: bool,
    pub queued: usize,
}

/// Result of handing a button press to a session.
///
/// Every variant except `Queued` gives the response back so the caller can
/// still acknowledge it to the user.
#[derive(Debug)]
pub enum Delivery {
    Queued,
    /// No session exists for the key.
    NoSession(ChoiceResponse),
    /// The session is not waiting for a choice; the press is stale.
    NoWaiter(ChoiceResponse),
    /// The waiter is not keeping up; the press is dropped.
    QueueFull(ChoiceResponse),
}

impl Delivery {
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::NoSession(_) => "no_session",
            Self::NoWaiter(_) => "no_waiter",
            Self::QueueFull(_) => "queue_full",
        }
    }

    /// The response that was not queued, if any.
    #[must_use]
    pub fn into_rejected(self) -> Option<ChoiceResponse> {
        match self {
            Self::Queued => None,
            Self::NoSession(r) | Self::NoWaiter(r) | Self::QueueFull(r) => Some(r),
        }
    }
}

/// Owns every live session, keyed by chat.
pub struct SessionRegistry {
    table: Mutex<Table>,
    callback_buffer: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CALLBACK_BUFFER)
    }
}

impl SessionRegistry {
    /// Create a registry whose sessions queue up to `callback_buffer` presses.
    pub fn new(callback_buffer: usize) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            callback_buffer: callback_buffer.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the session for `key`, creating it if it does not exist.
    ///
    /// A new session starts with an empty queue, no active choice, and its
    /// creation time as last activity.
    pub fn get_or_create(&self, key: SessionKey) -> Session {
        let now = Instant::now();
        let mut table = self.lock();
        let entry = table.get_or_insert(key, now, self.callback_buffer);
        Session {
            key,
            generation: entry.generation,
        }
    }

    /// Record activity on an existing session. Returns `false` for unknown keys.
    pub fn touch(&self, key: SessionKey) -> bool {
        let now = Instant::now();
        let mut table = self.lock();
        match table.sessions.get_mut(&key) {
            Some(entry) => {
                entry.last_activity = now;
                true
            },
            None => false,
        }
    }

    /// Create-if-missing and record activity in one critical section, so a
    /// sweep can never slip in between the two.
    pub fn touch_or_create(&self, key: SessionKey) -> Session {
        let now = Instant::now();
        let mut table = self.lock();
        let entry = table.get_or_insert(key, now, self.callback_buffer);
        entry.last_activity = now;
        Session {
            key,
            generation: entry.generation,
        }
    }

    /// Remove a session and close its queue.
    ///
    /// A consumer blocked on the queue wakes up with `None` once buffered
    /// presses are drained.
    pub fn delete(&self, key: SessionKey) -> bool {
        let removed = self.lock().sessions.remove(&key);
        match removed {
            Some(entry) => {
                debug!(session = %key, generation = entry.generation, "session deleted");
                true
            },
            None => false,
        }
    }

    /// Delete every session idle for longer than `threshold` as of `now`,
    /// calling `f` for each deleted key while the table is still locked.
    ///
    /// Sessions with an outstanding choice wait are skipped; their wait is
    /// bounded by its own deadline and the next sweep picks them up.
    pub fn for_each_idle(
        &self,
        threshold: Duration,
        now: Instant,
        mut f: impl FnMut(&SessionKey),
    ) -> usize {
        let mut table = self.lock();
        let before = table.sessions.len();
        table.sessions.retain(|key, entry| {
            let idle = now.saturating_duration_since(entry.last_activity) > threshold;
            if idle && !entry.active_choice {
                f(key);
                false
            } else {
                true
            }
        });
        before - table.sessions.len()
    }

    /// Delete idle sessions and return their keys.
    pub fn reap_idle(&self, threshold: Duration, now: Instant) -> Vec<SessionKey> {
        let mut evicted = Vec::new();
        self.for_each_idle(threshold, now, |key| evicted.push(*key));
        evicted
    }

    /// Hand a button press to the session's queue without blocking.
    ///
    /// Presses are only queued while a choice wait is outstanding; a full
    /// queue drops the press.
    pub fn deliver(&self, key: SessionKey, response: ChoiceResponse) -> Delivery {
        let table = self.lock();
        let Some(entry) = table.sessions.get(&key) else {
            return Delivery::NoSession(response);
        };
        if !entry.active_choice {
            return Delivery::NoWaiter(response);
        }
        match entry.sender.try_send(response) {
            Ok(()) => {
                trace!(session = %key, queued = entry.queued(), "button press queued");
                Delivery::Queued
            },
            Err(TrySendError::Full(r)) => Delivery::QueueFull(r),
            Err(TrySendError::Closed(r)) => Delivery::NoSession(r),
        }
    }

    /// Claim the session's choice slot.
    ///
    /// Fails with [`Error::Busy`] if another wait is outstanding. The slot is
    /// released when the returned [`ChoiceSlot`] is dropped.
    pub fn begin_choice(self: &Arc<Self>, key: SessionKey) -> Result<ChoiceSlot> {
        let now = Instant::now();
        let mut table = self.lock();
        let entry = table.get_or_insert(key, now, self.callback_buffer);
        if entry.active_choice {
            return Err(Error::Busy { session: key });
        }
        entry.active_choice = true;
        trace!(session = %key, generation = entry.generation, "choice slot claimed");
        Ok(ChoiceSlot {
            registry: Arc::clone(self),
            key,
            generation: entry.generation,
            receiver: Arc::clone(&entry.receiver),
        })
    }

    fn end_choice(&self, key: SessionKey, generation: u64) {
        let mut table = self.lock();
        if let Some(entry) = table.sessions.get_mut(&key)
            && entry.generation == generation
        {
            entry.active_choice = false;
            trace!(session = %key, generation, "choice slot released");
        }
    }

    /// Whether the session currently has an outstanding choice wait.
    #[must_use]
    pub fn is_choice_active(&self, key: SessionKey) -> bool {
        self.lock()
            .sessions
            .get(&key)
            .is_some_and(|entry| entry.active_choice)
    }

    #[must_use]
    pub fn snapshot(&self, key: SessionKey) -> Option<SessionSnapshot> {
        self.lock().sessions.get(&key).map(|entry| SessionSnapshot {
            generation: entry.generation,
            last_activity: entry.last_activity,
            active_choice: entry.active_choice,
            queued: entry.queued(),
        })
    }

    #[must_use]
    pub fn contains(&self, key: SessionKey) -> bool {
        self.lock().sessions.contains_key(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of all live sessions, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<SessionKey> {
        self.lock().sessions.keys().copied().collect()
    }
}

/// Exclusive right to consume one session's button-press queue.
///
/// Dropping the slot clears the session's active-choice flag, whatever path
/// the wait took to finish.
pub struct ChoiceSlot {
    registry: Arc<SessionRegistry>,
    key: SessionKey,
    generation: u64,
    receiver: ResponseReceiver,
}

impl ChoiceSlot {
    #[must_use]
    pub fn session(&self) -> SessionKey {
        self.key
    }

    /// Next queued press. `None` once the session has been deleted and the
    /// queue is drained.
    ///
    /// Cancel-safe: dropping the future never loses a press.
    pub async fn recv(&self) -> Option<ChoiceResponse> {
        self.receiver.lock().await.recv().await
    }

    /// Remove presses left over from an earlier prompt.
    pub fn discard_pending(&self) -> Vec<ChoiceResponse> {
        let mut stale = Vec::new();
        if let Ok(mut rx) = self.receiver.try_lock() {
            while let Ok(response) = rx.try_recv() {
                stale.push(response);
            }
        }
        stale
    }
}

impl Drop for ChoiceSlot {
    fn drop(&mut self) {
        self.registry.end_choice(self.key, self.generation);
    }
}

impl std::fmt::Debug for ChoiceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChoiceSlot")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
