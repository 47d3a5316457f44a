//! HTTP transport to the storefront backend: definitions feed, geo lookup,
//! event posting and newsletter subscription.
//!
//! Signals go out through [`HttpSignalSink`], which enqueues onto a bounded
//! channel drained by a background task so the engine never waits on the
//! network.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use popup_core::config::AppConfig;
use popup_core::event_bus::SignalSink;
use popup_core::types::{PopupDefinition, Signal, SubscribeRequest, SubscribeResponse};
use popup_core::{PopupError, PopupResult};

use crate::events::{EventPayload, PopupFeed};

pub struct HttpTransport {
    client: reqwest::Client,
    api_base: Url,
    geo_lookup: Url,
}

impl HttpTransport {
    pub fn new(config: &AppConfig) -> PopupResult<Self> {
        let api_base = parse_url("api_base_url", &config.api_base_url)?;
        let geo_lookup = parse_url("geo_lookup_url", &config.geo_lookup_url)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.transport.request_timeout_ms))
            .build()
            .map_err(|e| PopupError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            api_base,
            geo_lookup,
        })
    }

    fn endpoint(&self, path: &str) -> PopupResult<Url> {
        self.api_base
            .join(path)
            .map_err(|e| PopupError::Config(format!("endpoint {path}: {e}")))
    }

    /// Enabled popups for `shop`, in the backend's priority order.
    pub async fn fetch_definitions(&self, shop: &str) -> PopupResult<Vec<PopupDefinition>> {
        let mut url = self.endpoint("api/popups")?;
        url.query_pairs_mut().append_pair("shop", shop);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PopupError::Transport(format!("definitions feed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PopupError::Transport(format!("definitions feed body: {e}")))?;
        if !status.is_success() {
            return Err(PopupError::Transport(format!(
                "definitions feed returned {status}"
            )));
        }

        let definitions = PopupFeed::parse(&body)?.into_definitions();
        info!(shop, count = definitions.len(), "loaded popup definitions");
        Ok(definitions)
    }

    /// Visitor country as an upper-case ISO code. Any failure yields `None`,
    /// which disables country restrictions.
    pub async fn lookup_country(&self) -> Option<String> {
        let response = match self.client.get(self.geo_lookup.clone()).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), "geo lookup rejected");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "geo lookup failed");
                return None;
            }
        };
        match response.text().await {
            Ok(body) => parse_country(&body),
            Err(e) => {
                warn!(error = %e, "geo lookup body unreadable");
                None
            }
        }
    }

    pub async fn post_event(&self, payload: &EventPayload) -> PopupResult<()> {
        let url = self.endpoint("api/events")?;
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| PopupError::Transport(format!("event post: {e}")))?;
        if !response.status().is_success() {
            return Err(PopupError::Transport(format!(
                "event post returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Posts the subscription. Rejections come back as a response with
    /// `success: false`, only network and decode problems are errors.
    pub async fn subscribe(&self, request: &SubscribeRequest) -> PopupResult<SubscribeResponse> {
        let url = self.endpoint("api/subscribe")?;
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| PopupError::Subscription(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PopupError::Subscription(e.to_string()))?;
        let parsed: SubscribeResponse = serde_json::from_str(&body)
            .map_err(|e| PopupError::Subscription(format!("status {status}: {e}")))?;
        debug!(popup_id = %request.popup_id, %status, success = parsed.success, "subscribe answered");
        Ok(parsed)
    }
}

fn parse_url(field: &str, raw: &str) -> PopupResult<Url> {
    Url::parse(raw).map_err(|e| PopupError::Config(format!("{field} {raw:?}: {e}")))
}

/// Accepts a two-letter code, tolerating whitespace and case.
pub fn parse_country(body: &str) -> Option<String> {
    let code = body.trim();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        debug!(body = %code, "geo lookup returned no country");
        None
    }
}

/// Fire-and-forget signal delivery.
pub struct HttpSignalSink {
    sender: mpsc::Sender<EventPayload>,
}

impl HttpSignalSink {
    /// Spawns the delivery task. Must be called inside a tokio runtime.
    /// The task ends once every sink clone is dropped and the queue drains.
    pub fn spawn(transport: Arc<HttpTransport>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<EventPayload>(capacity.max(1));
        let handle = tokio::spawn(async move {
            let mut delivered = 0u64;
            while let Some(payload) = receiver.recv().await {
                match transport.post_event(&payload).await {
                    Ok(()) => delivered += 1,
                    Err(e) => warn!(
                        popup_id = %payload.popup_id,
                        event_type = payload.event_type.as_str(),
                        error = %e,
                        "failed to deliver popup event"
                    ),
                }
            }
            debug!(delivered, "signal delivery task stopped");
        });
        (Self { sender }, handle)
    }
}

impl SignalSink for HttpSignalSink {
    fn emit(&self, signal: Signal) -> PopupResult<()> {
        self.sender
            .try_send(EventPayload::from(&signal))
            .map_err(|e| {
                warn!(popup_id = %signal.popup_id, "popup event dropped: {}", e);
                PopupError::Transport(format!("event queue: {e}"))
            })
    }
}
