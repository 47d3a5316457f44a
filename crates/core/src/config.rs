use serde::Deserialize;

/// Root configuration. Loaded from environment variables with the prefix
/// `POPUP_ENGINE__`, e.g. `POPUP_ENGINE__STORAGE__KEY_PREFIX=my_popup`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_shop")]
    pub shop: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_geo_lookup_url")]
    pub geo_lookup_url: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub breakpoints: BreakpointConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub newsletter: NewsletterConfig,
}

/// Client storage keys.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Durable last-shown keys are `<key_prefix>_<popup id>`.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_session_key")]
    pub session_key: String,
}

/// Viewport widths (exclusive upper bounds) for device classification.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakpointConfig {
    #[serde(default = "default_mobile_max_width")]
    pub mobile_max_width: u32,
    #[serde(default = "default_tablet_max_width")]
    pub tablet_max_width: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsletterConfig {
    #[serde(default = "default_dismiss_after_ms")]
    pub dismiss_after_ms: u64,
}

// Default functions
fn default_shop() -> String {
    "demo.myshopify.com".to_string()
}
fn default_api_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_geo_lookup_url() -> String {
    "https://ipapi.co/country".to_string()
}
fn default_key_prefix() -> String {
    "shopify_popup".to_string()
}
fn default_session_key() -> String {
    "popup_session_id".to_string()
}
fn default_mobile_max_width() -> u32 {
    768
}
fn default_tablet_max_width() -> u32 {
    1024
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_queue_capacity() -> usize {
    10_000
}
fn default_dismiss_after_ms() -> u64 {
    3000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            session_key: default_session_key(),
        }
    }
}

impl Default for BreakpointConfig {
    fn default() -> Self {
        Self {
            mobile_max_width: default_mobile_max_width(),
            tablet_max_width: default_tablet_max_width(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for NewsletterConfig {
    fn default() -> Self {
        Self {
            dismiss_after_ms: default_dismiss_after_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            shop: default_shop(),
            api_base_url: default_api_base_url(),
            geo_lookup_url: default_geo_lookup_url(),
            storage: StorageConfig::default(),
            breakpoints: BreakpointConfig::default(),
            transport: TransportConfig::default(),
            newsletter: NewsletterConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("POPUP_ENGINE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
