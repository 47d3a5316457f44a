//! Signal bus: trait for handing popup analytics signals to whatever
//! transports them (HTTP collector, in-process aggregator, test capture).
//!
//! The engine holds an `Arc<dyn SignalSink>`. Emission is best-effort: an
//! `Err` is logged by the caller and never blocks a display decision.

use crate::error::PopupResult;
use crate::types::{Signal, SignalKind, VisitorContext};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives signals emitted by the engine.
pub trait SignalSink: Send + Sync {
    fn emit(&self, signal: Signal) -> PopupResult<()>;
}

/// No-op sink for hosts that don't record analytics.
pub struct NoOpSink;

impl SignalSink for NoOpSink {
    fn emit(&self, _signal: Signal) -> PopupResult<()> {
        Ok(())
    }
}

/// In-memory sink that captures signals for testing.
#[derive(Default)]
pub struct CaptureSink {
    signals: Mutex<Vec<Signal>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            signals: Mutex::new(Vec::new()),
        }
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.signals.lock().len()
    }

    pub fn count_kind(&self, kind: SignalKind) -> usize {
        self.signals.lock().iter().filter(|s| s.kind == kind).count()
    }

    pub fn clear(&self) {
        self.signals.lock().clear();
    }
}

impl SignalSink for CaptureSink {
    fn emit(&self, signal: Signal) -> PopupResult<()> {
        self.signals.lock().push(signal);
        Ok(())
    }
}

/// Builds a `Signal` stamped with the visitor's context and the current time.
pub fn make_signal(
    kind: SignalKind,
    popup_id: impl Into<String>,
    context: &VisitorContext,
    shop: impl Into<String>,
    metadata: Option<serde_json::Value>,
) -> Signal {
    make_signal_at(kind, popup_id, context, shop, metadata, Utc::now())
}

/// Same as [`make_signal`], with the emission time supplied by the caller's clock.
pub fn make_signal_at(
    kind: SignalKind,
    popup_id: impl Into<String>,
    context: &VisitorContext,
    shop: impl Into<String>,
    metadata: Option<serde_json::Value>,
    emitted_at: DateTime<Utc>,
) -> Signal {
    Signal {
        popup_id: popup_id.into(),
        kind,
        device: context.device,
        country: context.country.clone(),
        page: context.page.clone(),
        metadata,
        session_id: context.session_id.clone(),
        shop: shop.into(),
        emitted_at,
    }
}

pub fn noop_sink() -> Arc<dyn SignalSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
