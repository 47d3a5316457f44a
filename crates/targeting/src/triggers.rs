//! Trigger arming and the scroll / exit-intent predicates.

use std::time::Duration;

use popup_core::types::{PopupDefinition, TriggerMode};
use tracing::debug;

use crate::environment::{ListenerId, ListenerKind, ListenerRegistry, Scheduler, TimerId};

/// Scroll position reported by the host with every scroll event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_y: f64,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

impl ScrollMetrics {
    /// Percentage of the scrollable range covered. A page that can't
    /// scroll counts as fully scrolled.
    pub fn percent(&self) -> f64 {
        let scrollable = self.scroll_height - self.viewport_height;
        if scrollable <= 0.0 {
            return 100.0;
        }
        (self.scroll_y / scrollable * 100.0).max(0.0)
    }
}

/// Exit intent fires when the pointer leaves through the top edge.
pub fn is_exit_intent(client_y: f64) -> bool {
    client_y <= 0.0
}

/// Host resource backing an armed trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerHandle {
    Listener(ListenerId),
    Timer(TimerId),
}

/// The single pending trigger for the selected definition.
#[derive(Debug, Clone)]
pub struct ArmedTrigger {
    pub definition: PopupDefinition,
    pub mode: TriggerMode,
    pub handle: TriggerHandle,
}

impl ArmedTrigger {
    /// Subscribes or sets a timer for `definition`. Returns `None` for a
    /// zero delay, which means "display now".
    pub fn arm(
        definition: &PopupDefinition,
        timers: &dyn Scheduler,
        listeners: &dyn ListenerRegistry,
    ) -> Option<Self> {
        let mode = definition.trigger.mode();
        let handle = match mode {
            TriggerMode::Scroll { .. } => TriggerHandle::Listener(listeners.subscribe(ListenerKind::Scroll)),
            TriggerMode::ExitIntent => {
                TriggerHandle::Listener(listeners.subscribe(ListenerKind::MouseLeave))
            }
            TriggerMode::Delay { secs: 0 } => return None,
            TriggerMode::Delay { secs } => {
                TriggerHandle::Timer(timers.set_timeout(Duration::from_secs(u64::from(secs))))
            }
        };
        debug!(popup_id = %definition.id, ?mode, "trigger armed");
        Some(Self {
            definition: definition.clone(),
            mode,
            handle,
        })
    }

    /// Releases the host resource.
    pub fn disarm(&self, timers: &dyn Scheduler, listeners: &dyn ListenerRegistry) {
        match self.handle {
            TriggerHandle::Listener(id) => listeners.unsubscribe(id),
            TriggerHandle::Timer(id) => timers.clear_timeout(id),
        }
    }

    pub fn fires_on_scroll(&self, metrics: &ScrollMetrics) -> bool {
        match self.mode {
            TriggerMode::Scroll { threshold } => metrics.percent() >= threshold,
            _ => false,
        }
    }

    pub fn fires_on_mouse_leave(&self, client_y: f64) -> bool {
        matches!(self.mode, TriggerMode::ExitIntent) && is_exit_intent(client_y)
    }

    pub fn fires_on_timer(&self, id: TimerId) -> bool {
        self.handle == TriggerHandle::Timer(id)
    }
}
