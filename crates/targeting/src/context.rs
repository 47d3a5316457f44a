//! Visitor context: device class, page, country and session id, computed
//! once per page view.

use popup_core::config::BreakpointConfig;
use popup_core::types::{DeviceClass, VisitorContext};
use popup_core::PopupResult;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::environment::KeyValueStore;

const SESSION_ID_LEN: usize = 9;

/// `< mobile_max_width` is mobile, `< tablet_max_width` tablet, otherwise desktop.
pub fn classify_device(viewport_width: u32, breakpoints: &BreakpointConfig) -> DeviceClass {
    if viewport_width < breakpoints.mobile_max_width {
        DeviceClass::Mobile
    } else if viewport_width < breakpoints.tablet_max_width {
        DeviceClass::Tablet
    } else {
        DeviceClass::Desktop
    }
}

/// Returns the session id stored under `key`, creating one on first use.
pub fn session_id(store: &dyn KeyValueStore, key: &str) -> PopupResult<String> {
    if let Some(existing) = store.get(key)? {
        if !existing.is_empty() {
            return Ok(existing);
        }
    }
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    let id = format!("sess_{suffix}");
    store.set(key, &id)?;
    debug!(session_id = %id, "created visitor session id");
    Ok(id)
}

/// Raw page facts the host reads synchronously.
#[derive(Debug, Clone)]
pub struct PageFacts {
    pub viewport_width: u32,
    pub path: String,
}

/// Assembles the visitor context. `country` is the already-awaited geo
/// lookup result; `None` keeps country targeting open.
pub fn build_context(
    page: &PageFacts,
    country: Option<String>,
    session_store: &dyn KeyValueStore,
    session_key: &str,
    breakpoints: &BreakpointConfig,
) -> PopupResult<VisitorContext> {
    Ok(VisitorContext {
        device: classify_device(page.viewport_width, breakpoints),
        page: page.path.clone(),
        country: country.map(|c| c.trim().to_ascii_uppercase()).filter(|c| !c.is_empty()),
        session_id: session_id(session_store, session_key)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MemoryStore;

    #[test]
    fn test_breakpoints() {
        let bp = BreakpointConfig::default();
        assert_eq!(classify_device(375, &bp), DeviceClass::Mobile);
        assert_eq!(classify_device(767, &bp), DeviceClass::Mobile);
        assert_eq!(classify_device(768, &bp), DeviceClass::Tablet);
        assert_eq!(classify_device(1023, &bp), DeviceClass::Tablet);
        assert_eq!(classify_device(1024, &bp), DeviceClass::Desktop);
        assert_eq!(classify_device(2560, &bp), DeviceClass::Desktop);
    }

    #[test]
    fn test_session_id_is_stable() {
        let store = MemoryStore::new();
        let first = session_id(&store, "popup_session_id").unwrap();
        let second = session_id(&store, "popup_session_id").unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("sess_"));
        assert_eq!(first.len(), "sess_".len() + SESSION_ID_LEN);
    }

    #[test]
    fn test_build_context_normalises_country() {
        let store = MemoryStore::new();
        let page = PageFacts {
            viewport_width: 900,
            path: "/products/mug".into(),
        };
        let ctx = build_context(
            &page,
            Some(" us\n".into()),
            &store,
            "popup_session_id",
            &BreakpointConfig::default(),
        )
        .unwrap();
        assert_eq!(ctx.device, DeviceClass::Tablet);
        assert_eq!(ctx.country.as_deref(), Some("US"));

        let ctx = build_context(&page, Some("".into()), &store, "popup_session_id", &BreakpointConfig::default())
            .unwrap();
        assert!(ctx.country.is_none());
    }
}
