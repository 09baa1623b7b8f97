//! Debounced autosave.
//!
//! Every note id gets its own small state machine:
//!
//! - `Idle`: nothing to write.
//! - `Pending`: the latest content is waiting, either for its quiet window to
//!   elapse or, after a failed write, for an explicit retry.
//! - `Flushing`: a write for this note is in progress.
//!
//! Edits move a note to `Pending` and push its deadline out; the timer task
//! writes once the deadline passes untouched. Writes for one note are
//! serialized behind a per-note async mutex that remembers the last sequence
//! number issued, so an older payload can never land after a newer one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::Result;
use crate::projection::NoteList;
use crate::store::{NoteStore, NoteSummary};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosavePhase {
    Idle,
    Pending,
    Flushing,
}

/// Outcome of every write the coordinator issues, for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveEvent {
    Saved(NoteSummary),
    Failed { id: String, error: String },
}

#[derive(Debug)]
struct Payload {
    seq: u64,
    content: String,
}

#[derive(Debug, Default)]
struct SlotState {
    next_seq: u64,
    pending: Option<Payload>,
    /// Set while the pending payload waits for its quiet window; None once it
    /// is retained after a failed write
    deadline: Option<Instant>,
    timer_armed: bool,
    flushing: bool,
}

#[derive(Debug, Default)]
struct NoteSlot {
    state: Mutex<SlotState>,
    /// Held for the duration of a write; guards the last sequence number issued
    write_lock: tokio::sync::Mutex<u64>,
}

impl NoteSlot {
    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushMode {
    /// Timer expiry: only write if the quiet window really elapsed
    Due,
    /// Switch, close or explicit save
    Force,
}

struct Inner {
    store: Arc<NoteStore>,
    debounce: Duration,
    projection: Arc<RwLock<NoteList>>,
    slots: Mutex<HashMap<String, Arc<NoteSlot>>>,
    events: broadcast::Sender<AutosaveEvent>,
    runtime: Handle,
}

#[derive(Clone)]
pub struct AutosaveCoordinator {
    inner: Arc<Inner>,
}

impl AutosaveCoordinator {
    /// Must be called from within a tokio runtime; timers run on that runtime.
    pub fn new(store: Arc<NoteStore>, projection: Arc<RwLock<NoteList>>, debounce: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                debounce,
                projection,
                slots: Mutex::new(HashMap::new()),
                events,
                runtime: Handle::current(),
            }),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AutosaveEvent> {
        self.inner.events.subscribe()
    }

    /// Record the latest content for a note and (re)start its quiet window.
    pub fn update(&self, id: &str, content: String) {
        let slot = self.inner.slot(id);
        let arm_timer = {
            let mut state = slot.state();
            state.next_seq += 1;
            let seq = state.next_seq;
            state.pending = Some(Payload { seq, content });
            state.deadline = Some(Instant::now() + self.inner.debounce);
            if state.timer_armed {
                false
            } else {
                state.timer_armed = true;
                true
            }
        };

        if arm_timer {
            let inner = Arc::clone(&self.inner);
            let id = id.to_string();
            self.inner.runtime.spawn(async move {
                inner.run_timer(id, slot).await;
            });
        }
    }

    /// Write any pending or retained content for `id` now and wait for it,
    /// including a write already in flight. Returns the saved summary if this
    /// call wrote something.
    pub async fn flush(&self, id: &str) -> Result<Option<NoteSummary>> {
        let slot = match self.inner.existing_slot(id) {
            Some(slot) => slot,
            None => return Ok(None),
        };
        self.inner.flush_slot(id, &slot, FlushMode::Force).await
    }

    /// Flush every note. All notes are attempted; the first error is returned.
    pub async fn flush_all(&self) -> Result<usize> {
        let slots: Vec<(String, Arc<NoteSlot>)> = {
            let slots = self.inner.slots();
            slots.iter().map(|(id, slot)| (id.clone(), Arc::clone(slot))).collect()
        };

        let mut written = 0usize;
        let mut first_error = None;
        for (id, slot) in slots {
            match self.inner.flush_slot(&id, &slot, FlushMode::Force).await {
                Ok(Some(_)) => written += 1,
                Ok(None) => {}
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Forget a note's pending content, waiting out any write in flight.
    pub async fn discard(&self, id: &str) {
        self.discard_with(id, || async {}).await
    }

    /// Forget a note's pending content and run `op` while the note's write
    /// lock is held. A flush queued behind the lock (even one for an edit made
    /// while `op` runs) starts only after `op` is done. Used around delete so
    /// no autosave can recreate the note.
    pub async fn discard_with<T, F, Fut>(&self, id: &str, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let slot = self.inner.slot(id);
        let _write_guard = slot.write_lock.lock().await;
        {
            let mut state = slot.state();
            if state.pending.take().is_some() {
                log::debug!("[autosave] Discarded pending content for {}", id);
            }
            state.deadline = None;
        }

        let output = op().await;

        let mut slots = self.inner.slots();
        if slots.get(id).map_or(false, |current| Arc::ptr_eq(current, &slot)) {
            slots.remove(id);
        }
        output
    }

    pub fn phase(&self, id: &str) -> AutosavePhase {
        match self.inner.existing_slot(id) {
            Some(slot) => {
                let state = slot.state();
                if state.flushing {
                    AutosavePhase::Flushing
                } else if state.pending.is_some() {
                    AutosavePhase::Pending
                } else {
                    AutosavePhase::Idle
                }
            }
            None => AutosavePhase::Idle,
        }
    }

    /// Whether content for `id` has not reached disk yet (waiting or failed).
    pub fn has_unsaved(&self, id: &str) -> bool {
        self.unsaved_content(id).is_some()
    }

    pub fn unsaved_content(&self, id: &str) -> Option<String> {
        let slot = self.inner.existing_slot(id)?;
        let state = slot.state();
        state.pending.as_ref().map(|p| p.content.clone())
    }
}

impl Inner {
    fn slots(&self) -> MutexGuard<'_, HashMap<String, Arc<NoteSlot>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, id: &str) -> Arc<NoteSlot> {
        let mut slots = self.slots();
        Arc::clone(slots.entry(id.to_string()).or_default())
    }

    fn existing_slot(&self, id: &str) -> Option<Arc<NoteSlot>> {
        self.slots().get(id).map(Arc::clone)
    }

    /// Sleep until the pending payload's deadline; write it if no newer edit
    /// moved the deadline meanwhile. Exits once nothing is scheduled.
    async fn run_timer(self: Arc<Self>, id: String, slot: Arc<NoteSlot>) {
        loop {
            let wait_until = {
                let mut state = slot.state();
                let scheduled = if state.pending.is_some() { state.deadline } else { None };
                match scheduled {
                    Some(deadline) if Instant::now() >= deadline => None,
                    Some(deadline) => Some(deadline),
                    None => {
                        state.timer_armed = false;
                        return;
                    }
                }
            };

            match wait_until {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => {
                    // Failures are already logged and broadcast
                    let _ = self.flush_slot(&id, &slot, FlushMode::Due).await;
                }
            }
        }
    }

    async fn flush_slot(&self, id: &str, slot: &Arc<NoteSlot>, mode: FlushMode) -> Result<Option<NoteSummary>> {
        let mut last_issued = slot.write_lock.lock().await;

        let payload = {
            let mut state = slot.state();
            let due = match mode {
                FlushMode::Force => true,
                FlushMode::Due => state.deadline.map(|d| Instant::now() >= d).unwrap_or(false),
            };
            if !due {
                return Ok(None);
            }
            match state.pending.take() {
                Some(payload) => {
                    state.deadline = None;
                    state.flushing = true;
                    payload
                }
                None => return Ok(None),
            }
        };

        if payload.seq < *last_issued {
            log::error!(
                "[autosave] Dropping stale payload #{} for {} (#{} already issued)",
                payload.seq,
                id,
                last_issued
            );
            slot.state().flushing = false;
            return Ok(None);
        }

        let write_id = id.to_string();
        let content = payload.content.clone();
        let result = self.store.run(move |store| store.write(&write_id, &content)).await;
        *last_issued = payload.seq;

        let retained = {
            let mut state = slot.state();
            state.flushing = false;
            match &result {
                Err(_) if state.pending.is_none() => {
                    state.pending = Some(payload);
                    true
                }
                _ => false,
            }
        };

        match result {
            Ok(summary) => {
                log::debug!("[autosave] Saved {}", id);
                if let Ok(mut list) = self.projection.write() {
                    list.upsert_to_front(summary.clone());
                }
                let _ = self.events.send(AutosaveEvent::Saved(summary.clone()));
                Ok(Some(summary))
            }
            Err(e) => {
                log::warn!(
                    "[autosave] Failed to save {} ({}): {}",
                    id,
                    if retained { "content kept" } else { "superseded by newer edit" },
                    e
                );
                let _ = self.events.send(AutosaveEvent::Failed {
                    id: id.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
