//! Host environment: the seams through which the engine reads time,
//! touches client storage, arms timers and listeners, and renders.
//!
//! A browser host backs these with `Date`, `localStorage`/`sessionStorage`,
//! `setTimeout` and DOM listeners. The in-memory implementations here drive
//! the engine deterministically from tests and the simulation CLI.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local};
use dashmap::DashMap;
use parking_lot::Mutex;
use popup_core::PopupResult;

use crate::presentation::DisplayRequest;

/// Local wall-clock time. The offset matters for calendar-day comparisons.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// String key-value storage (durable or session scoped).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> PopupResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> PopupResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// One-shot timers. The host reports expiry back with `HostEvent::TimerFired`.
pub trait Scheduler: Send + Sync {
    fn set_timeout(&self, after: Duration) -> TimerId;
    fn clear_timeout(&self, id: TimerId);
}

/// Event sources the engine may subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerKind {
    Scroll,
    MouseLeave,
    /// Clicks, close and form submission inside the displayed popup.
    PopupInteraction { popup_id: String },
}

pub trait ListenerRegistry: Send + Sync {
    fn subscribe(&self, kind: ListenerKind) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId);
}

/// Puts a popup on screen and takes it down again.
pub trait Renderer: Send + Sync {
    fn show(&self, request: &DisplayRequest) -> PopupResult<()>;
    fn remove(&self, popup_id: &str);
}

/// Everything the engine needs from its host, bundled per page load.
#[derive(Clone)]
pub struct Environment {
    pub clock: Arc<dyn Clock>,
    pub durable: Arc<dyn KeyValueStore>,
    pub session: Arc<dyn KeyValueStore>,
    pub timers: Arc<dyn Scheduler>,
    pub listeners: Arc<dyn ListenerRegistry>,
    pub renderer: Arc<dyn Renderer>,
}

impl Environment {
    /// In-memory environment backed by one [`RecordingHost`].
    pub fn in_memory(clock: Arc<dyn Clock>, host: Arc<RecordingHost>) -> Self {
        Self {
            clock,
            durable: Arc::new(MemoryStore::new()),
            session: Arc::new(MemoryStore::new()),
            timers: host.clone(),
            listeners: host.clone(),
            renderer: host,
        }
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<FixedOffset>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> PopupResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> PopupResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Host double that records every timer, listener and render call.
#[derive(Default)]
pub struct RecordingHost {
    next_id: AtomicU64,
    timers: Mutex<Vec<(TimerId, Duration)>>,
    listeners: Mutex<Vec<(ListenerId, ListenerKind)>>,
    shown: Mutex<Vec<DisplayRequest>>,
    removed: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Timers set and not yet cleared.
    pub fn pending_timers(&self) -> Vec<(TimerId, Duration)> {
        self.timers.lock().clone()
    }

    /// Listeners subscribed and not yet removed.
    pub fn active_listeners(&self) -> Vec<(ListenerId, ListenerKind)> {
        self.listeners.lock().clone()
    }

    pub fn has_listener(&self, kind: &ListenerKind) -> bool {
        self.listeners.lock().iter().any(|(_, k)| k == kind)
    }

    pub fn shown(&self) -> Vec<DisplayRequest> {
        self.shown.lock().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().clone()
    }
}

impl Scheduler for RecordingHost {
    fn set_timeout(&self, after: Duration) -> TimerId {
        let id = TimerId(self.next());
        self.timers.lock().push((id, after));
        id
    }

    fn clear_timeout(&self, id: TimerId) {
        self.timers.lock().retain(|(t, _)| *t != id);
    }
}

impl ListenerRegistry for RecordingHost {
    fn subscribe(&self, kind: ListenerKind) -> ListenerId {
        let id = ListenerId(self.next());
        self.listeners.lock().push((id, kind));
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.lock().retain(|(l, _)| *l != id);
    }
}

impl Renderer for RecordingHost {
    fn show(&self, request: &DisplayRequest) -> PopupResult<()> {
        self.shown.lock().push(request.clone());
        Ok(())
    }

    fn remove(&self, popup_id: &str) {
        self.removed.lock().push(popup_id.to_string());
    }
}
