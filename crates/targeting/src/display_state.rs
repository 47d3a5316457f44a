//! Durable per-popup display state: when each popup was last shown.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use popup_core::{PopupError, PopupResult};

use crate::environment::KeyValueStore;

/// Last-shown timestamps stored as RFC 3339 strings under `<prefix>_<popup id>`.
#[derive(Clone)]
pub struct DisplayStateStore {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl DisplayStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, popup_id: &str) -> String {
        format!("{}_{}", self.prefix, popup_id)
    }

    /// `None` means the popup was never shown.
    pub fn last_shown(&self, popup_id: &str) -> PopupResult<Option<DateTime<FixedOffset>>> {
        let key = self.key(popup_id);
        match self.store.get(&key)? {
            None => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
                .map(Some)
                .map_err(|e| PopupError::Storage(format!("bad timestamp under {key}: {e}"))),
        }
    }

    pub fn record_shown(&self, popup_id: &str, at: DateTime<FixedOffset>) -> PopupResult<()> {
        self.store.set(&self.key(popup_id), &at.to_rfc3339())
    }
}
