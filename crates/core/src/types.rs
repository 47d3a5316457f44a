use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device class derived from the viewport width.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Mobile => "MOBILE",
            DeviceClass::Tablet => "TABLET",
            DeviceClass::Desktop => "DESKTOP",
        }
    }

    /// Parses the wire spelling. Unknown values are `None`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MOBILE" => Some(DeviceClass::Mobile),
            "TABLET" => Some(DeviceClass::Tablet),
            "DESKTOP" => Some(DeviceClass::Desktop),
            _ => None,
        }
    }
}

/// Re-display suppression policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    #[default]
    Always,
    Once,
    Daily,
    Weekly,
}

impl Frequency {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ALWAYS" => Some(Frequency::Always),
            "ONCE" => Some(Frequency::Once),
            "DAILY" => Some(Frequency::Daily),
            "WEEKLY" => Some(Frequency::Weekly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PopupType {
    Newsletter,
    Promotion,
    Announcement,
    #[default]
    Standard,
}

impl PopupType {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NEWSLETTER" => Some(PopupType::Newsletter),
            "PROMOTION" | "DISCOUNT" => Some(PopupType::Promotion),
            "ANNOUNCEMENT" => Some(PopupType::Announcement),
            "STANDARD" => Some(PopupType::Standard),
            _ => None,
        }
    }

    pub fn collects_email(&self) -> bool {
        matches!(self, PopupType::Newsletter)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Position {
    #[default]
    Center,
    Top,
    Bottom,
    Left,
    Right,
}

impl Position {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CENTER" => Some(Position::Center),
            "TOP" => Some(Position::Top),
            "BOTTOM" => Some(Position::Bottom),
            "LEFT" => Some(Position::Left),
            "RIGHT" => Some(Position::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Custom,
}

impl Theme {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LIGHT" => Some(Theme::Light),
            "DARK" => Some(Theme::Dark),
            "CUSTOM" => Some(Theme::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Animation {
    #[default]
    Fade,
    Slide,
    Bounce,
}

impl Animation {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FADE" => Some(Animation::Fade),
            "SLIDE" => Some(Animation::Slide),
            "BOUNCE" => Some(Animation::Bounce),
            _ => None,
        }
    }
}

/// Inclusive display window. `None` on either side means unbounded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Allow-lists restricting who sees a popup. `None` means unrestricted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Targeting {
    pub devices: Option<Vec<DeviceClass>>,
    pub pages: Option<Vec<String>>,
    pub countries: Option<Vec<String>>,
}

/// Raw trigger settings as configured on the definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TriggerSpec {
    pub delay_secs: u32,
    pub scroll_percent: Option<f64>,
    pub exit_intent: bool,
}

/// The single trigger that governs when a selected popup appears.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerMode {
    Scroll { threshold: f64 },
    ExitIntent,
    Delay { secs: u32 },
}

impl TriggerSpec {
    /// Scroll wins over exit intent, which wins over the plain delay.
    pub fn mode(&self) -> TriggerMode {
        if let Some(threshold) = self.scroll_percent {
            TriggerMode::Scroll { threshold }
        } else if self.exit_intent {
            TriggerMode::ExitIntent
        } else {
            TriggerMode::Delay {
                secs: self.delay_secs,
            }
        }
    }
}

/// Copy for the email-capture form of newsletter popups.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsletterCopy {
    pub email_placeholder: Option<String>,
    pub secondary_button_text: Option<String>,
    pub success_message: Option<String>,
    pub error_message: Option<String>,
}

/// Everything the renderer needs. The engine passes it through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Presentation {
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    pub popup_type: PopupType,
    pub position: Position,
    pub theme: Theme,
    pub animation: Animation,
    /// JSON object of style overrides, applied only with [`Theme::Custom`].
    pub custom_css: Option<String>,
    pub button_text: Option<String>,
    pub button_color: Option<String>,
    pub button_text_color: Option<String>,
    pub newsletter: NewsletterCopy,
}

/// A configured popup: rules plus presentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PopupDefinition {
    pub id: String,
    pub enabled: bool,
    pub schedule: Schedule,
    pub frequency: Frequency,
    pub targeting: Targeting,
    pub trigger: TriggerSpec,
    pub presentation: Presentation,
}

impl PopupDefinition {
    /// An enabled, unrestricted, immediately shown popup.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            schedule: Schedule::default(),
            frequency: Frequency::Always,
            targeting: Targeting::default(),
            trigger: TriggerSpec::default(),
            presentation: Presentation::default(),
        }
    }
}

/// Per-page-view facts about the visitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisitorContext {
    pub device: DeviceClass,
    pub page: String,
    pub country: Option<String>,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Impression,
    Click,
    Close,
    Conversion,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Impression => "IMPRESSION",
            SignalKind::Click => "CLICK",
            SignalKind::Close => "CLOSE",
            SignalKind::Conversion => "CONVERSION",
        }
    }
}

/// Analytics signal emitted by the engine for collaborator persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub popup_id: String,
    pub kind: SignalKind,
    pub device: DeviceClass,
    pub country: Option<String>,
    pub page: String,
    pub metadata: Option<serde_json::Value>,
    pub session_id: String,
    pub shop: String,
    pub emitted_at: DateTime<Utc>,
}

/// Body of the `subscribe` call made by email-capture popups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub email: String,
    pub popup_id: String,
    pub shop: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscribeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_mode_precedence() {
        let spec = TriggerSpec {
            delay_secs: 5,
            scroll_percent: Some(40.0),
            exit_intent: true,
        };
        assert_eq!(spec.mode(), TriggerMode::Scroll { threshold: 40.0 });

        let spec = TriggerSpec {
            delay_secs: 5,
            scroll_percent: None,
            exit_intent: true,
        };
        assert_eq!(spec.mode(), TriggerMode::ExitIntent);

        assert_eq!(
            TriggerSpec::default().mode(),
            TriggerMode::Delay { secs: 0 }
        );
    }

    #[test]
    fn test_wire_enums() {
        assert_eq!(Frequency::from_wire("daily"), Some(Frequency::Daily));
        assert_eq!(Frequency::from_wire("HOURLY"), None);
        assert_eq!(DeviceClass::from_wire(" tablet "), Some(DeviceClass::Tablet));
        assert_eq!(Theme::from_wire("neon"), None);
        assert!(PopupType::Newsletter.collects_email());
        assert!(!PopupType::Announcement.collects_email());
    }

    #[test]
    fn test_signal_kind_serde() {
        let json = serde_json::to_string(&SignalKind::Conversion).unwrap();
        assert_eq!(json, "\"CONVERSION\"");
        assert_eq!(SignalKind::Close.as_str(), "CLOSE");
    }

    #[test]
    fn test_subscribe_wire_shape() {
        let req = SubscribeRequest {
            email: "ada@example.com".into(),
            popup_id: "p-9".into(),
            shop: "demo.myshopify.com".into(),
            metadata: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["popupId"], "p-9");
        assert!(json.get("metadata").is_none());

        let resp: SubscribeResponse =
            serde_json::from_str(r#"{"error":"Invalid email format"}"#).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("Invalid email format"));
    }
}
