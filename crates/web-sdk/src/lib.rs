//! Storefront-side plumbing around the popup engine: decoding the popup
//! records served by the backend, posting signals, the newsletter subscribe
//! call, geo lookup, and aggregating signals into per-popup metrics.
//!
//! # Modules
//!
//! - [`events`]: popup records, the definitions feed, event bodies
//! - [`collector`]: per-popup metrics with device/country/page breakdowns
//! - [`transport`]: HTTP client and the background signal sink

pub mod collector;
pub mod events;
pub mod transport;

pub use collector::{PopupMetrics, ShopSummary, SignalCollector};
pub use events::{EventPayload, PopupFeed, PopupRecord};
pub use transport::{HttpSignalSink, HttpTransport};
