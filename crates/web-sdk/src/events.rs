//! Wire formats shared with the storefront backend: the popup records served
//! by the definitions feed and the event body posted for every signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use popup_core::types::{
    Animation, DeviceClass, Frequency, NewsletterCopy, PopupDefinition, PopupType, Position,
    Presentation, Schedule, Signal, SignalKind, Targeting, Theme, TriggerSpec,
};
use popup_core::{PopupError, PopupResult};

fn default_enabled() -> bool {
    true
}

/// A popup as stored by the admin app. Allow-lists arrive as JSON-encoded
/// strings (`"[\"MOBILE\",\"TABLET\"]"`), enums as upper-case strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupRecord {
    pub id: String,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, rename = "type", alias = "popupType")]
    pub popup_type: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub animation: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub custom_css: Option<String>,
    #[serde(default)]
    pub button_text: Option<String>,
    #[serde(default)]
    pub button_color: Option<String>,
    #[serde(default)]
    pub button_text_color: Option<String>,
    #[serde(default)]
    pub email_placeholder: Option<String>,
    #[serde(default)]
    pub secondary_button_text: Option<String>,
    #[serde(default)]
    pub success_message: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub device_types: Option<Value>,
    #[serde(default)]
    pub show_on_pages: Option<Value>,
    #[serde(default)]
    pub countries: Option<Value>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub delay: Option<f64>,
    #[serde(default, alias = "exitIntentEnabled")]
    pub exit_intent: Option<bool>,
    #[serde(default)]
    pub scroll_trigger_enabled: Option<bool>,
    #[serde(default, alias = "scrollTriggerPercentage")]
    pub scroll_trigger: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl PopupRecord {
    /// Converts to the engine's definition. Never fails: bad fields fall
    /// back to their defaults and drop only the restriction they encode.
    pub fn into_definition(self) -> PopupDefinition {
        let id = self.id;

        let frequency = wire_enum(&id, "frequency", self.frequency.as_deref(), Frequency::from_wire);
        let popup_type = wire_enum(&id, "type", self.popup_type.as_deref(), PopupType::from_wire);
        let position = wire_enum(&id, "position", self.position.as_deref(), Position::from_wire);
        let theme = wire_enum(&id, "theme", self.theme.as_deref(), Theme::from_wire);
        let animation = wire_enum(&id, "animation", self.animation.as_deref(), Animation::from_wire);

        let devices = allow_list(&id, "deviceTypes", self.device_types).map(|raw| {
            raw.iter()
                .filter_map(|d| {
                    let parsed = DeviceClass::from_wire(d);
                    if parsed.is_none() {
                        warn!(popup_id = %id, device = %d, "unknown device type ignored");
                    }
                    parsed
                })
                .collect()
        });

        let schedule = Schedule {
            start: timestamp(&id, "startDate", self.start_date.as_deref()),
            end: timestamp(&id, "endDate", self.end_date.as_deref()),
        };

        let delay_secs = match self.delay {
            Some(d) if d.is_finite() && d > 0.0 => d.min(f64::from(u32::MAX)) as u32,
            _ => 0,
        };
        let scroll_percent = match (self.scroll_trigger_enabled, self.scroll_trigger) {
            (Some(false), _) => None,
            (_, Some(p)) if p.is_finite() => Some(p.clamp(0.0, 100.0)),
            _ => None,
        };

        PopupDefinition {
            schedule,
            frequency,
            targeting: Targeting {
                devices,
                pages: allow_list(&id, "showOnPages", self.show_on_pages),
                countries: allow_list(&id, "countries", self.countries),
            },
            trigger: TriggerSpec {
                delay_secs,
                scroll_percent,
                exit_intent: self.exit_intent.unwrap_or(false),
            },
            presentation: Presentation {
                title: self.title,
                content: self.content,
                image: self.image.filter(|s| !s.is_empty()),
                popup_type,
                position,
                theme,
                animation,
                custom_css: self.custom_css,
                button_text: self.button_text,
                button_color: self.button_color,
                button_text_color: self.button_text_color,
                newsletter: NewsletterCopy {
                    email_placeholder: self.email_placeholder,
                    secondary_button_text: self.secondary_button_text,
                    success_message: self.success_message,
                    error_message: self.error_message,
                },
            },
            enabled: self.is_enabled,
            id,
        }
    }
}

fn wire_enum<T: Default>(
    popup_id: &str,
    field: &str,
    raw: Option<&str>,
    parse: fn(&str) -> Option<T>,
) -> T {
    match raw {
        None => T::default(),
        Some(value) => parse(value).unwrap_or_else(|| {
            warn!(popup_id, field, value, "unknown value, using default");
            T::default()
        }),
    }
}

/// Accepts a JSON-encoded string or a bare array. Anything unreadable
/// removes the restriction.
fn allow_list(popup_id: &str, field: &str, raw: Option<Value>) -> Option<Vec<String>> {
    let values = match raw? {
        Value::Null => return None,
        Value::String(s) if s.trim().is_empty() => return None,
        Value::String(s) => match serde_json::from_str::<Vec<Value>>(&s) {
            Ok(values) => values,
            Err(e) => {
                warn!(popup_id, field, error = %e, "malformed allow-list dropped");
                return None;
            }
        },
        Value::Array(values) => values,
        other => {
            warn!(popup_id, field, value = %other, "allow-list is not an array, dropped");
            return None;
        }
    };
    Some(
        values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
    )
}

fn timestamp(popup_id: &str, field: &str, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!(popup_id, field, value = raw, error = %e, "unparseable date ignored");
            None
        }
    }
}

/// Body of the definitions feed: `{"popups": [...]}`, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PopupFeed {
    #[serde(default)]
    pub popups: Vec<Value>,
}

impl PopupFeed {
    pub fn parse(body: &str) -> PopupResult<Self> {
        serde_json::from_str(body).map_err(|e| PopupError::Decode(format!("definitions feed: {e}")))
    }

    /// Decodes every record, skipping the ones that aren't objects with an id.
    pub fn into_definitions(self) -> Vec<PopupDefinition> {
        self.popups
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value::<PopupRecord>(value) {
                Ok(record) => Some(record.into_definition()),
                Err(e) => {
                    warn!(index, error = %e, "skipping undecodable popup record");
                    None
                }
            })
            .collect()
    }
}

/// Body posted to the events endpoint for every signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub popup_id: String,
    pub event_type: SignalKind,
    #[serde(default)]
    pub device_type: Option<DeviceClass>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub shop: String,
}

impl EventPayload {
    pub fn validate(&self) -> PopupResult<()> {
        if self.popup_id.is_empty() || self.shop.is_empty() {
            return Err(PopupError::Validation("missing required fields".into()));
        }
        Ok(())
    }
}

impl From<&Signal> for EventPayload {
    fn from(signal: &Signal) -> Self {
        Self {
            popup_id: signal.popup_id.clone(),
            event_type: signal.kind,
            device_type: Some(signal.device),
            country: signal.country.clone(),
            page: Some(signal.page.clone()),
            // the endpoint always receives an object
            metadata: Some(signal.metadata.clone().unwrap_or_else(|| Value::Object(Default::default()))),
            session_id: Some(signal.session_id.clone()),
            shop: signal.shop.clone(),
        }
    }
}
