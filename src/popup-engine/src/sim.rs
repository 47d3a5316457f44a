//! Scripted page visit: drives one engine through the in-memory host the
//! way a storefront would, step by step.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local};
use serde::Deserialize;
use tracing::{debug, info, warn};

use popup_core::config::AppConfig;
use popup_core::event_bus::SignalSink;
use popup_core::types::{PopupDefinition, Signal, SubscribeResponse};
use popup_core::PopupResult;
use popup_targeting::environment::{Clock, ListenerKind, Scheduler, TimerId};
use popup_targeting::{
    build_context, ClickTarget, Decision, EngineSettings, Environment, EventOutcome, HostEvent,
    ManualClock, PageFacts, PopupEngine, RecordingHost, ScrollMetrics, UserAction,
};
use popup_web_sdk::{HttpTransport, SignalCollector};

fn default_viewport_width() -> u32 {
    1280
}

fn default_page() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitScript {
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_page")]
    pub page: String,
    #[serde(default)]
    pub country: Option<String>,
    /// Visit start in local time. Defaults to now.
    #[serde(default)]
    pub start: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Step {
    Scroll {
        percent: f64,
    },
    MouseLeave {
        #[serde(default, rename = "clientY")]
        client_y: f64,
    },
    Advance {
        seconds: u64,
    },
    Visibility {
        visible: bool,
    },
    Click {
        #[serde(default = "default_element", rename = "elementType")]
        element_type: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default, rename = "withinButton")]
        within_button: bool,
        #[serde(default, rename = "withinForm")]
        within_form: bool,
    },
    Close,
    Subscribe {
        email: String,
    },
    Navigate {
        page: String,
    },
}

fn default_element() -> String {
    "div".to_string()
}

/// Forwards every signal to the local collector and, when online, the
/// HTTP sink.
pub struct TeeSink {
    pub collector: Arc<SignalCollector>,
    pub remote: Option<Arc<dyn SignalSink>>,
}

impl SignalSink for TeeSink {
    fn emit(&self, signal: Signal) -> PopupResult<()> {
        self.collector.emit(signal.clone())?;
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.emit(signal) {
                warn!(error = %e, "remote signal delivery skipped");
            }
        }
        Ok(())
    }
}

pub struct Simulation {
    config: AppConfig,
    engine: PopupEngine,
    env: Environment,
    host: Arc<RecordingHost>,
    clock: Arc<ManualClock>,
    definitions: Vec<PopupDefinition>,
    viewport_width: u32,
    country: Option<String>,
    transport: Option<Arc<HttpTransport>>,
    due: Vec<(TimerId, DateTime<FixedOffset>)>,
}

impl Simulation {
    pub fn new(
        config: AppConfig,
        script: &VisitScript,
        definitions: Vec<PopupDefinition>,
        sink: Arc<dyn SignalSink>,
        transport: Option<Arc<HttpTransport>>,
    ) -> Self {
        let start = script.start.unwrap_or_else(|| Local::now().fixed_offset());
        let clock = Arc::new(ManualClock::new(start));
        let host = Arc::new(RecordingHost::new());
        let env = Environment::in_memory(clock.clone(), host.clone());
        let engine = PopupEngine::new(env.clone(), EngineSettings::from_config(&config))
            .with_signal_sink(sink);
        Self {
            config,
            engine,
            env,
            host,
            clock,
            definitions,
            viewport_width: script.viewport_width,
            country: script.country.clone(),
            transport,
            due: Vec::new(),
        }
    }

    pub fn engine(&self) -> &PopupEngine {
        &self.engine
    }

    /// Runs the page load and every step. Returns the popups displayed, in order.
    pub async fn run(&mut self, script: &VisitScript) -> anyhow::Result<Vec<String>> {
        let mut displayed = Vec::new();

        if self.country.is_none() {
            if let Some(transport) = &self.transport {
                self.country = transport.lookup_country().await;
            }
        }

        self.load_page(&script.page, &mut displayed)?;

        for (index, step) in script.steps.iter().enumerate() {
            debug!(index, ?step, "applying step");
            match step {
                Step::Scroll { percent } => {
                    if self.host.has_listener(&ListenerKind::Scroll) {
                        let metrics = ScrollMetrics {
                            scroll_y: percent.clamp(0.0, 100.0) * 20.0,
                            scroll_height: 3000.0,
                            viewport_height: 1000.0,
                        };
                        self.apply(HostEvent::Scroll(metrics), &mut displayed);
                    }
                }
                Step::MouseLeave { client_y } => {
                    if self.host.has_listener(&ListenerKind::MouseLeave) {
                        self.apply(HostEvent::MouseLeave { client_y: *client_y }, &mut displayed);
                    }
                }
                Step::Advance { seconds } => {
                    let target = self.clock.now() + chrono::Duration::seconds(*seconds as i64);
                    self.advance_to(target, &mut displayed);
                }
                Step::Visibility { visible } => {
                    self.apply(HostEvent::VisibilityChanged { visible: *visible }, &mut displayed);
                }
                Step::Click {
                    element_type,
                    text,
                    within_button,
                    within_form,
                } => {
                    if let Some(popup_id) = self.interactive_popup() {
                        let target = ClickTarget {
                            element_type: element_type.clone(),
                            text: text.clone(),
                            within_button: *within_button,
                            within_form: *within_form,
                        };
                        self.engine.on_user_action(&popup_id, UserAction::Click(target));
                    }
                }
                Step::Close => {
                    if let Some(popup_id) = self.interactive_popup() {
                        self.engine.on_user_action(&popup_id, UserAction::Close);
                    }
                }
                Step::Subscribe { email } => self.subscribe(email).await,
                Step::Navigate { page } => {
                    self.engine.reset();
                    self.load_page(page, &mut displayed)?;
                }
            }
            self.track_new_timers();
        }
        Ok(displayed)
    }

    fn load_page(&mut self, path: &str, displayed: &mut Vec<String>) -> anyhow::Result<()> {
        let facts = PageFacts {
            viewport_width: self.viewport_width,
            path: path.to_string(),
        };
        let context = build_context(
            &facts,
            self.country.clone(),
            self.env.session.as_ref(),
            &self.config.storage.session_key,
            &self.config.breakpoints,
        )?;
        info!(
            page = %context.page,
            device = context.device.as_str(),
            country = context.country.as_deref().unwrap_or("unknown"),
            session_id = %context.session_id,
            "page loaded"
        );

        let decision = self.engine.select_and_schedule(&self.definitions, &context);
        info!(?decision, "selection finished");
        if let Decision::Displayed { popup_id } = decision {
            displayed.push(popup_id);
        }
        self.track_new_timers();
        Ok(())
    }

    fn apply(&mut self, event: HostEvent, displayed: &mut Vec<String>) {
        let outcome = self.engine.handle_event(event);
        match &outcome {
            EventOutcome::Displayed { popup_id }
            | EventOutcome::Reevaluated(Decision::Displayed { popup_id }) => {
                displayed.push(popup_id.clone());
            }
            _ => {}
        }
        if outcome != EventOutcome::Ignored {
            info!(?outcome, "host event handled");
        }
        self.track_new_timers();
    }

    /// Remembers when each newly set timer is due.
    fn track_new_timers(&mut self) {
        let now = self.clock.now();
        let pending = self.host.pending_timers();
        self.due.retain(|(id, _)| pending.iter().any(|(p, _)| p == id));
        for (id, after) in pending {
            if self.due.iter().all(|(known, _)| *known != id) {
                let after = chrono::Duration::from_std(after).unwrap_or(chrono::Duration::zero());
                self.due.push((id, now + after));
            }
        }
    }

    /// Moves the clock forward, firing timers in due order.
    fn advance_to(&mut self, target: DateTime<FixedOffset>, displayed: &mut Vec<String>) {
        loop {
            self.track_new_timers();
            let next = self
                .due
                .iter()
                .filter(|(_, due)| *due <= target)
                .min_by_key(|(_, due)| *due)
                .copied();
            let Some((id, due)) = next else {
                break;
            };
            self.clock.set(due);
            self.due.retain(|(known, _)| *known != id);
            self.host_clears(id);
            self.apply(HostEvent::TimerFired(id), displayed);
        }
        self.clock.set(target);
    }

    // a fired one-shot timer is no longer pending on the host
    fn host_clears(&self, id: TimerId) {
        self.host.clear_timeout(id);
    }

    fn interactive_popup(&self) -> Option<String> {
        let popup = self.engine.displayed_popup()?;
        let listening = self.host.has_listener(&ListenerKind::PopupInteraction {
            popup_id: popup.id.clone(),
        });
        listening.then(|| popup.id.clone())
    }

    async fn subscribe(&mut self, email: &str) {
        let request = match self.engine.submit_email(email) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "email not submitted");
                return;
            }
        };
        let result = match &self.transport {
            Some(transport) => transport.subscribe(&request).await,
            None => Ok(SubscribeResponse {
                success: true,
                error: None,
            }),
        };
        let outcome = self.engine.on_subscribe_result(result);
        info!(?outcome, "newsletter submission finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use popup_core::types::{Frequency, PopupType};
    use popup_targeting::EnginePhase;

    fn script(json: &str) -> VisitScript {
        serde_json::from_str(json).unwrap()
    }

    fn offline(script: &VisitScript, definitions: Vec<PopupDefinition>) -> (Simulation, Arc<SignalCollector>) {
        let collector = Arc::new(SignalCollector::new());
        let sink = Arc::new(TeeSink {
            collector: collector.clone(),
            remote: None,
        });
        let sim = Simulation::new(AppConfig::default(), script, definitions, sink, None);
        (sim, collector)
    }

    struct FullQueue;

    impl SignalSink for FullQueue {
        fn emit(&self, _signal: Signal) -> PopupResult<()> {
            Err(popup_core::PopupError::Transport("signal queue full".into()))
        }
    }

    #[tokio::test]
    async fn test_local_report_survives_remote_failure() {
        let s = script(r#"{"steps":[]}"#);
        let collector = Arc::new(SignalCollector::new());
        let sink = Arc::new(TeeSink {
            collector: collector.clone(),
            remote: Some(Arc::new(FullQueue) as Arc<dyn SignalSink>),
        });
        let mut sim = Simulation::new(
            AppConfig::default(),
            &s,
            vec![PopupDefinition::new("welcome")],
            sink,
            None,
        );

        let displayed = sim.run(&s).await.unwrap();
        assert_eq!(displayed, vec!["welcome".to_string()]);
        assert_eq!(collector.metrics("welcome").unwrap().impressions, 1);
    }

    #[test]
    fn test_script_parsing() {
        let s = script(
            r#"{"viewportWidth":400,"steps":[
                {"type":"scroll","percent":40},
                {"type":"mouseLeave","clientY":-3},
                {"type":"click","elementType":"IMG"},
                {"type":"advance","seconds":5},
                {"type":"navigate","page":"/cart"}
            ]}"#,
        );
        assert_eq!(s.viewport_width, 400);
        assert_eq!(s.page, "/");
        assert_eq!(s.steps.len(), 5);
        assert!(matches!(s.steps[1], Step::MouseLeave { client_y } if client_y == -3.0));
    }

    #[tokio::test]
    async fn test_delayed_popup_fires_on_advance() {
        let s = script(
            r#"{"start":"2024-05-10T12:00:00+02:00","steps":[
                {"type":"advance","seconds":2},
                {"type":"advance","seconds":2},
                {"type":"click","elementType":"P","text":"Free shipping"},
                {"type":"close"}
            ]}"#,
        );
        let mut delayed = PopupDefinition::new("delayed");
        delayed.trigger.delay_secs = 3;
        let (mut sim, collector) = offline(&s, vec![delayed]);

        let displayed = sim.run(&s).await.unwrap();
        assert_eq!(displayed, vec!["delayed".to_string()]);
        assert_eq!(sim.engine().phase(), EnginePhase::Idle);

        let metrics = collector.metrics("delayed").unwrap();
        assert_eq!(metrics.impressions, 1);
        assert_eq!(metrics.clicks, 1);
        assert_eq!(metrics.closes, 1);
    }

    #[tokio::test]
    async fn test_newsletter_and_navigation() {
        let s = script(
            r#"{"start":"2024-05-10T12:00:00+00:00","viewportWidth":390,"steps":[
                {"type":"subscribe","email":"ada@example.com"},
                {"type":"advance","seconds":3},
                {"type":"navigate","page":"/collections/all"}
            ]}"#,
        );
        let mut news = PopupDefinition::new("news");
        news.presentation.popup_type = PopupType::Newsletter;
        news.frequency = Frequency::Once;
        let (mut sim, collector) = offline(&s, vec![news, PopupDefinition::new("fallback")]);

        let displayed = sim.run(&s).await.unwrap();
        assert_eq!(displayed, vec!["news".to_string(), "fallback".to_string()]);

        let metrics = collector.metrics("news").unwrap();
        assert_eq!(metrics.conversions, 1);
        assert_eq!(metrics.device_breakdown["MOBILE"], 2);
        assert_eq!(collector.metrics("fallback").unwrap().impressions, 1);
        assert!(collector
            .all_metrics()
            .iter()
            .all(|m| m.closes == 0 && m.clicks == 0));
    }
}
