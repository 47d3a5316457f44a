//! Signal collector: folds event bodies into per-popup metrics with device,
//! country and page breakdowns. Also usable directly as a [`SignalSink`] for
//! in-process aggregation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use popup_core::event_bus::SignalSink;
use popup_core::types::{Signal, SignalKind};
use popup_core::PopupResult;

use crate::events::EventPayload;

/// Aggregate counters for one popup.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PopupMetrics {
    pub popup_id: String,
    pub shop: String,
    pub impressions: u64,
    pub clicks: u64,
    pub closes: u64,
    pub conversions: u64,
    pub device_breakdown: BTreeMap<String, u64>,
    pub country_breakdown: BTreeMap<String, u64>,
    pub page_breakdown: BTreeMap<String, u64>,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl PopupMetrics {
    /// Clicks per hundred impressions, two decimals.
    pub fn click_rate(&self) -> f64 {
        percentage(self.clicks, self.impressions)
    }

    /// Conversions per hundred impressions, two decimals.
    pub fn conversion_rate(&self) -> f64 {
        percentage(self.conversions, self.impressions)
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let raw = part as f64 / whole as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Shop-wide totals across every popup.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShopSummary {
    pub popups: usize,
    pub impressions: u64,
    pub clicks: u64,
    pub closes: u64,
    pub conversions: u64,
    pub click_rate: f64,
    pub conversion_rate: f64,
}

#[derive(Default)]
pub struct SignalCollector {
    metrics: DashMap<String, PopupMetrics>,
}

impl SignalCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and folds one event body. Returns the id assigned to it.
    pub fn record(&self, payload: &EventPayload) -> PopupResult<Uuid> {
        self.record_at(payload, Utc::now())
    }

    /// Like [`record`](Self::record), with the event time taken from the caller.
    pub fn record_at(&self, payload: &EventPayload, at: DateTime<Utc>) -> PopupResult<Uuid> {
        payload.validate()?;
        let event_id = Uuid::new_v4();

        let mut metrics = self
            .metrics
            .entry(payload.popup_id.clone())
            .or_insert_with(|| PopupMetrics {
                popup_id: payload.popup_id.clone(),
                shop: payload.shop.clone(),
                ..Default::default()
            });

        match payload.event_type {
            SignalKind::Impression => metrics.impressions += 1,
            SignalKind::Click => metrics.clicks += 1,
            SignalKind::Close => metrics.closes += 1,
            SignalKind::Conversion => metrics.conversions += 1,
        }
        if let Some(device) = payload.device_type {
            *metrics
                .device_breakdown
                .entry(device.as_str().to_string())
                .or_insert(0) += 1;
        }
        if let Some(country) = payload.country.as_deref().filter(|c| !c.is_empty()) {
            *metrics.country_breakdown.entry(country.to_string()).or_insert(0) += 1;
        }
        if let Some(page) = payload.page.as_deref().filter(|p| !p.is_empty()) {
            *metrics.page_breakdown.entry(page.to_string()).or_insert(0) += 1;
        }
        metrics.last_event_at = Some(at);

        debug!(
            event_id = %event_id,
            popup_id = %payload.popup_id,
            event_type = payload.event_type.as_str(),
            "popup event recorded"
        );
        Ok(event_id)
    }

    pub fn metrics(&self, popup_id: &str) -> Option<PopupMetrics> {
        self.metrics.get(popup_id).map(|m| m.clone())
    }

    /// All popups, highest impression count first.
    pub fn all_metrics(&self) -> Vec<PopupMetrics> {
        let mut all: Vec<PopupMetrics> = self
            .metrics
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| {
            b.impressions
                .cmp(&a.impressions)
                .then_with(|| a.popup_id.cmp(&b.popup_id))
        });
        all
    }

    pub fn shop_summary(&self, shop: &str) -> ShopSummary {
        let mut summary = ShopSummary::default();
        for entry in self.metrics.iter().filter(|e| e.shop == shop) {
            summary.popups += 1;
            summary.impressions += entry.impressions;
            summary.clicks += entry.clicks;
            summary.closes += entry.closes;
            summary.conversions += entry.conversions;
        }
        summary.click_rate = percentage(summary.clicks, summary.impressions);
        summary.conversion_rate = percentage(summary.conversions, summary.impressions);
        summary
    }
}

impl SignalSink for SignalCollector {
    fn emit(&self, signal: Signal) -> PopupResult<()> {
        self.record_at(&EventPayload::from(&signal), signal.emitted_at)
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use popup_core::types::DeviceClass;
    use popup_core::PopupError;

    fn payload(kind: SignalKind, device: DeviceClass, country: Option<&str>) -> EventPayload {
        EventPayload {
            popup_id: "p1".into(),
            event_type: kind,
            device_type: Some(device),
            country: country.map(str::to_string),
            page: Some("/".into()),
            metadata: None,
            session_id: Some("sess_1".into()),
            shop: "demo.myshopify.com".into(),
        }
    }

    #[test]
    fn test_counts_and_breakdowns() {
        let collector = SignalCollector::new();
        collector
            .record(&payload(SignalKind::Impression, DeviceClass::Mobile, Some("US")))
            .unwrap();
        collector
            .record(&payload(SignalKind::Impression, DeviceClass::Desktop, Some("US")))
            .unwrap();
        collector
            .record(&payload(SignalKind::Impression, DeviceClass::Desktop, None))
            .unwrap();
        collector
            .record(&payload(SignalKind::Click, DeviceClass::Desktop, Some("DE")))
            .unwrap();
        collector
            .record(&payload(SignalKind::Close, DeviceClass::Mobile, Some("US")))
            .unwrap();

        let m = collector.metrics("p1").unwrap();
        assert_eq!(m.impressions, 3);
        assert_eq!(m.clicks, 1);
        assert_eq!(m.closes, 1);
        assert_eq!(m.device_breakdown["DESKTOP"], 3);
        assert_eq!(m.device_breakdown["MOBILE"], 2);
        assert_eq!(m.country_breakdown["US"], 3);
        assert_eq!(m.country_breakdown["DE"], 1);
        assert_eq!(m.page_breakdown["/"], 5);
        assert_eq!(m.click_rate(), 33.33);
        assert_eq!(m.conversion_rate(), 0.0);
    }

    #[test]
    fn test_rejects_incomplete_payload() {
        let collector = SignalCollector::new();
        let mut p = payload(SignalKind::Click, DeviceClass::Mobile, None);
        p.shop.clear();
        assert!(matches!(collector.record(&p), Err(PopupError::Validation(_))));
        assert!(collector.metrics("p1").is_none());
    }

    #[test]
    fn test_sink_keeps_signal_time() {
        use popup_core::event_bus::make_signal_at;
        use popup_core::types::VisitorContext;

        let collector = SignalCollector::new();
        let ctx = VisitorContext {
            device: DeviceClass::Mobile,
            page: "/".into(),
            country: None,
            session_id: "sess_1".into(),
        };
        let at = DateTime::parse_from_rfc3339("2024-04-02T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        collector
            .emit(make_signal_at(SignalKind::Impression, "p1", &ctx, "shop", None, at))
            .unwrap();
        assert_eq!(collector.metrics("p1").unwrap().last_event_at, Some(at));
    }

    #[test]
    fn test_shop_summary() {
        let collector = SignalCollector::new();
        for _ in 0..4 {
            collector
                .record(&payload(SignalKind::Impression, DeviceClass::Tablet, None))
                .unwrap();
        }
        collector
            .record(&payload(SignalKind::Conversion, DeviceClass::Tablet, None))
            .unwrap();
        let mut other = payload(SignalKind::Impression, DeviceClass::Tablet, None);
        other.popup_id = "p2".into();
        other.shop = "other.myshopify.com".into();
        collector.record(&other).unwrap();

        let summary = collector.shop_summary("demo.myshopify.com");
        assert_eq!(summary.popups, 1);
        assert_eq!(summary.impressions, 4);
        assert_eq!(summary.conversion_rate, 25.0);
        assert_eq!(collector.all_metrics()[0].popup_id, "p1");
    }
}
