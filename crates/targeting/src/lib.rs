//! Popup targeting engine.
//!
//! Decides, per page view, which configured popup (if any) a visitor sees
//! and when. Selection walks the definitions in order and takes the first
//! one passing the schedule, frequency, device, page and country guards.
//! The winner is armed on exactly one trigger (scroll depth, exit intent
//! or delay) and displayed when it fires.
//!
//! All host capabilities (clock, storage, timers, listeners, rendering)
//! come in through [`environment::Environment`], so the engine runs the
//! same against a browser bridge or the in-memory doubles.

pub mod context;
pub mod display_state;
pub mod engine;
pub mod environment;
pub mod guards;
pub mod newsletter;
pub mod presentation;
pub mod triggers;

pub use context::{build_context, classify_device, PageFacts};
pub use display_state::DisplayStateStore;
pub use engine::{
    ClickTarget, Decision, EngineSettings, EnginePhase, EventOutcome, HostEvent, PopupEngine,
    UserAction,
};
pub use environment::{Environment, ManualClock, MemoryStore, RecordingHost, SystemClock};
pub use newsletter::NewsletterOutcome;
pub use presentation::DisplayRequest;
pub use triggers::ScrollMetrics;
