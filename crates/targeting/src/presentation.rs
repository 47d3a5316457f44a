//! Presentation resolution: turns a definition's position, theme,
//! animation and custom style into flat style declarations for the renderer.

use std::collections::BTreeMap;

use popup_core::types::{Animation, PopupDefinition, PopupType, Position, Presentation, Theme};
use serde::Serialize;
use tracing::warn;

const DEFAULT_BUTTON_COLOR: &str = "#5c6ac4";
const DEFAULT_BUTTON_TEXT_COLOR: &str = "#fff";

pub type StyleMap = BTreeMap<String, String>;

/// Interactive controls rendered inside the popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Controls {
    Newsletter {
        placeholder: String,
        submit_text: String,
        dismiss_text: String,
    },
    CloseButton {
        text: String,
    },
}

/// What the renderer receives for one display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRequest {
    pub popup_id: String,
    pub presentation: Presentation,
    pub container_style: StyleMap,
    pub button_style: StyleMap,
    pub controls: Controls,
}

impl DisplayRequest {
    pub fn for_definition(definition: &PopupDefinition) -> Self {
        let presentation = &definition.presentation;
        Self {
            popup_id: definition.id.clone(),
            presentation: presentation.clone(),
            container_style: container_style(presentation),
            button_style: button_style(presentation),
            controls: controls(presentation),
        }
    }
}

fn set(style: &mut StyleMap, key: &str, value: &str) {
    style.insert(key.to_string(), value.to_string());
}

pub fn container_style(presentation: &Presentation) -> StyleMap {
    let mut style = StyleMap::new();
    set(&mut style, "position", "fixed");
    set(&mut style, "padding", "20px");
    set(&mut style, "border-radius", "8px");
    set(&mut style, "max-width", "400px");
    set(&mut style, "width", "90%");
    set(&mut style, "box-shadow", "0 2px 8px rgba(0, 0, 0, 0.15)");
    set(&mut style, "z-index", "999999");

    let (anchors, transform): (&[(&str, &str)], &str) = match presentation.position {
        Position::Center => (&[("top", "50%"), ("left", "50%")], "translate(-50%, -50%)"),
        Position::Top => (&[("top", "20px"), ("left", "50%")], "translateX(-50%)"),
        Position::Bottom => (&[("bottom", "20px"), ("left", "50%")], "translateX(-50%)"),
        Position::Left => (&[("left", "20px"), ("top", "50%")], "translateY(-50%)"),
        Position::Right => (&[("right", "20px"), ("top", "50%")], "translateY(-50%)"),
    };
    for (k, v) in anchors {
        set(&mut style, k, v);
    }
    set(&mut style, "transform", transform);

    let animation = match presentation.animation {
        Animation::Fade => "fade 0.3s ease-out",
        Animation::Slide => "slide 0.3s ease-out",
        Animation::Bounce => "bounce 0.5s ease-out",
    };
    set(&mut style, "animation", animation);

    match presentation.theme {
        Theme::Dark => {
            set(&mut style, "background-color", "#333");
            set(&mut style, "color", "#fff");
        }
        Theme::Light => apply_light(&mut style),
        Theme::Custom => {
            apply_light(&mut style);
            if let Some(raw) = presentation.custom_css.as_deref() {
                match parse_custom_style(raw) {
                    Some(overrides) => style.extend(overrides),
                    None => warn!("custom popup style is not a JSON object, using defaults"),
                }
            }
        }
    }
    style
}

fn apply_light(style: &mut StyleMap) {
    set(style, "background-color", "#fff");
    set(style, "color", "#333");
}

pub fn button_style(presentation: &Presentation) -> StyleMap {
    let mut style = StyleMap::new();
    set(
        &mut style,
        "background",
        presentation.button_color.as_deref().unwrap_or(DEFAULT_BUTTON_COLOR),
    );
    set(
        &mut style,
        "color",
        presentation
            .button_text_color
            .as_deref()
            .unwrap_or(DEFAULT_BUTTON_TEXT_COLOR),
    );
    style
}

pub fn controls(presentation: &Presentation) -> Controls {
    let button_text = presentation.button_text.clone();
    match presentation.popup_type {
        PopupType::Newsletter => {
            let copy = &presentation.newsletter;
            Controls::Newsletter {
                placeholder: copy
                    .email_placeholder
                    .clone()
                    .unwrap_or_else(|| "Enter your email".to_string()),
                submit_text: button_text.unwrap_or_else(|| "Subscribe".to_string()),
                dismiss_text: copy
                    .secondary_button_text
                    .clone()
                    .unwrap_or_else(|| "No, thanks".to_string()),
            }
        }
        _ => Controls::CloseButton {
            text: button_text.unwrap_or_else(|| "Close".to_string()),
        },
    }
}

/// Parses a JSON object of style overrides. Keys may be camelCase DOM
/// style names; they are normalised to CSS property names.
pub fn parse_custom_style(raw: &str) -> Option<StyleMap> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let mut style = StyleMap::new();
    for (key, value) in object {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            // nested or null values have no CSS meaning
            _ => continue,
        };
        style.insert(kebab_case(key), rendered);
    }
    Some(style)
}

fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
