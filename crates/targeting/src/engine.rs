use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use popup_core::config::AppConfig;
use popup_core::event_bus::{make_signal_at, noop_sink, SignalSink};
use popup_core::types::{
    PopupDefinition, SignalKind, SubscribeRequest, SubscribeResponse, TriggerMode, VisitorContext,
};
use popup_core::{PopupError, PopupResult};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::display_state::DisplayStateStore;
use crate::environment::{Environment, ListenerId, ListenerKind, TimerId};
use crate::guards::{self, Guard};
use crate::newsletter::{self, NewsletterOutcome};
use crate::presentation::DisplayRequest;
use crate::triggers::{ArmedTrigger, ScrollMetrics};

/// Per-shop engine settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub shop: String,
    pub key_prefix: String,
    /// How long the success message stays up before a newsletter popup closes itself.
    pub dismiss_after: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            shop: config.shop.clone(),
            key_prefix: config.storage.key_prefix.clone(),
            dismiss_after: Duration::from_millis(config.newsletter.dismiss_after_ms),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Events the host forwards from its subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Scroll(ScrollMetrics),
    MouseLeave { client_y: f64 },
    TimerFired(TimerId),
    VisibilityChanged { visible: bool },
}

/// Element a click inside the popup landed on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClickTarget {
    pub element_type: String,
    pub text: Option<String>,
    pub within_button: bool,
    pub within_form: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    Click(ClickTarget),
    Close,
    Conversion(Option<serde_json::Value>),
}

/// Result of one selection pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// A popup is already armed or on screen.
    AlreadyActive,
    NoMatch,
    Armed { popup_id: String, mode: TriggerMode },
    Displayed { popup_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Ignored,
    Displayed { popup_id: String },
    Dismissed { popup_id: String },
    Reevaluated(Decision),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Armed,
    Displayed,
}

struct ActiveDisplay {
    definition: PopupDefinition,
    interaction: ListenerId,
    pending_email: Option<String>,
    dismiss_timer: Option<TimerId>,
}

enum EngineState {
    Idle,
    Armed(ArmedTrigger),
    Displayed(ActiveDisplay),
}

/// Targeting and scheduling engine for one page load.
///
/// Selection is first-match-wins over the supplied list order. At most one
/// popup is armed or displayed at a time; every host callback funnels
/// through [`PopupEngine::handle_event`] or [`PopupEngine::on_user_action`].
pub struct PopupEngine {
    env: Environment,
    display_state: DisplayStateStore,
    settings: EngineSettings,
    sink: Arc<dyn SignalSink>,
    state: EngineState,
    definitions: Vec<PopupDefinition>,
    context: Option<VisitorContext>,
}

impl std::fmt::Debug for PopupEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopupEngine")
            .field("shop", &self.settings.shop)
            .field("phase", &self.phase())
            .field("definitions", &self.definitions.len())
            .finish()
    }
}

impl PopupEngine {
    pub fn new(env: Environment, settings: EngineSettings) -> Self {
        let display_state = DisplayStateStore::new(env.durable.clone(), settings.key_prefix.clone());
        Self {
            env,
            display_state,
            settings,
            sink: noop_sink(),
            state: EngineState::Idle,
            definitions: Vec::new(),
            context: None,
        }
    }

    /// Attach a sink for impression/click/close/conversion signals.
    pub fn with_signal_sink(mut self, sink: Arc<dyn SignalSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn phase(&self) -> EnginePhase {
        match self.state {
            EngineState::Idle => EnginePhase::Idle,
            EngineState::Armed(_) => EnginePhase::Armed,
            EngineState::Displayed(_) => EnginePhase::Displayed,
        }
    }

    pub fn displayed_popup(&self) -> Option<&PopupDefinition> {
        match &self.state {
            EngineState::Displayed(active) => Some(&active.definition),
            _ => None,
        }
    }

    pub fn display_state(&self) -> &DisplayStateStore {
        &self.display_state
    }

    /// Evaluates `definitions` against `context` and schedules the first
    /// eligible one. Both are kept for re-evaluation when the page becomes
    /// visible again.
    pub fn select_and_schedule(
        &mut self,
        definitions: &[PopupDefinition],
        context: &VisitorContext,
    ) -> Decision {
        self.definitions = definitions.to_vec();
        self.context = Some(context.clone());
        self.evaluate()
    }

    fn evaluate(&mut self) -> Decision {
        if !matches!(self.state, EngineState::Idle) {
            debug!(phase = ?self.phase(), "popup already active, skipping evaluation");
            return Decision::AlreadyActive;
        }
        let Some(context) = self.context.as_ref() else {
            return Decision::NoMatch;
        };

        let now = self.env.clock.now();
        let Some(selected) = self.select(&self.definitions, context, now).cloned() else {
            info!(
                candidates = self.definitions.len(),
                device = context.device.as_str(),
                page = %context.page,
                "no eligible popup"
            );
            return Decision::NoMatch;
        };

        match ArmedTrigger::arm(&selected, self.env.timers.as_ref(), self.env.listeners.as_ref()) {
            Some(armed) => {
                let decision = Decision::Armed {
                    popup_id: selected.id.clone(),
                    mode: armed.mode,
                };
                info!(popup_id = %selected.id, mode = ?armed.mode, "popup selected, trigger armed");
                self.state = EngineState::Armed(armed);
                decision
            }
            None => {
                let popup_id = selected.id.clone();
                self.on_display(selected);
                Decision::Displayed { popup_id }
            }
        }
    }

    /// First enabled definition passing every guard, in list order.
    pub fn select<'a>(
        &self,
        definitions: &'a [PopupDefinition],
        context: &VisitorContext,
        now: DateTime<FixedOffset>,
    ) -> Option<&'a PopupDefinition> {
        for definition in definitions {
            if !definition.enabled {
                debug!(popup_id = %definition.id, "skipping disabled popup");
                continue;
            }
            match guards::first_failing_guard(definition, context, now, &self.display_state) {
                Ok(None) => return Some(definition),
                Ok(Some(guard)) => log_rejection(&definition.id, guard),
                Err(e) => {
                    warn!(popup_id = %definition.id, error = %e, "guard evaluation failed, skipping popup")
                }
            }
        }
        None
    }

    /// Shows `definition`: impression signal, last-shown write, render,
    /// interaction listener. A failing step is logged and the rest still run.
    pub fn on_display(&mut self, definition: PopupDefinition) {
        let now = self.env.clock.now();

        self.emit(SignalKind::Impression, &definition.id, None);

        if let Err(e) = self.display_state.record_shown(&definition.id, now) {
            warn!(popup_id = %definition.id, error = %e, "failed to persist last-shown time");
        }

        let request = DisplayRequest::for_definition(&definition);
        if let Err(e) = self.env.renderer.show(&request) {
            warn!(popup_id = %definition.id, error = %e, "renderer failed to show popup");
        }

        let interaction = self.env.listeners.subscribe(ListenerKind::PopupInteraction {
            popup_id: definition.id.clone(),
        });

        info!(popup_id = %definition.id, "popup displayed");
        self.state = EngineState::Displayed(ActiveDisplay {
            definition,
            interaction,
            pending_email: None,
            dismiss_timer: None,
        });
    }

    pub fn handle_event(&mut self, event: HostEvent) -> EventOutcome {
        match event {
            HostEvent::Scroll(metrics) => match &self.state {
                EngineState::Armed(armed) if armed.fires_on_scroll(&metrics) => self.fire_armed(),
                _ => EventOutcome::Ignored,
            },
            HostEvent::MouseLeave { client_y } => match &self.state {
                EngineState::Armed(armed) if armed.fires_on_mouse_leave(client_y) => self.fire_armed(),
                _ => EventOutcome::Ignored,
            },
            HostEvent::TimerFired(id) => match &self.state {
                EngineState::Armed(armed) if armed.fires_on_timer(id) => self.fire_armed(),
                EngineState::Displayed(active) if active.dismiss_timer == Some(id) => {
                    let popup_id = active.definition.id.clone();
                    info!(popup_id = %popup_id, "newsletter popup dismissed after subscribing");
                    self.teardown();
                    EventOutcome::Dismissed { popup_id }
                }
                _ => {
                    debug!(timer = id.0, "stale timer ignored");
                    EventOutcome::Ignored
                }
            },
            HostEvent::VisibilityChanged { visible: true } => {
                EventOutcome::Reevaluated(self.evaluate())
            }
            HostEvent::VisibilityChanged { visible: false } => EventOutcome::Ignored,
        }
    }

    fn fire_armed(&mut self) -> EventOutcome {
        let EngineState::Armed(armed) = std::mem::replace(&mut self.state, EngineState::Idle) else {
            return EventOutcome::Ignored;
        };
        armed.disarm(self.env.timers.as_ref(), self.env.listeners.as_ref());
        let popup_id = armed.definition.id.clone();
        debug!(popup_id = %popup_id, mode = ?armed.mode, "trigger fired");
        self.on_display(armed.definition);
        EventOutcome::Displayed { popup_id }
    }

    /// Records a visitor interaction with the displayed popup. Returns
    /// whether a signal was emitted. Closing an armed popup disarms it
    /// without a signal; actions on any other popup are ignored.
    pub fn on_user_action(&mut self, popup_id: &str, action: UserAction) -> bool {
        let (displayed, armed) = match &self.state {
            EngineState::Displayed(active) => (active.definition.id == popup_id, false),
            EngineState::Armed(armed) => (false, armed.definition.id == popup_id),
            EngineState::Idle => (false, false),
        };
        if armed && matches!(action, UserAction::Close) {
            info!(popup_id, "armed popup closed before display");
            self.teardown();
            return false;
        }
        if !displayed {
            debug!(popup_id, "action ignored: popup not displayed");
            return false;
        }

        match action {
            UserAction::Click(target) => {
                if target.within_button || target.within_form {
                    debug!(popup_id, "click on control not tracked");
                    return false;
                }
                let metadata = json!({
                    "elementType": target.element_type.to_ascii_lowercase(),
                    "text": target.text,
                });
                self.emit(SignalKind::Click, popup_id, Some(metadata));
            }
            UserAction::Close => {
                self.emit(SignalKind::Close, popup_id, None);
                info!(popup_id, "popup closed");
                self.teardown();
            }
            UserAction::Conversion(metadata) => {
                self.emit(SignalKind::Conversion, popup_id, metadata);
            }
        }
        true
    }

    /// Validates the address typed into the displayed newsletter popup and
    /// returns the request for the subscribe endpoint.
    pub fn submit_email(&mut self, email: &str) -> PopupResult<SubscribeRequest> {
        let context = self
            .context
            .clone()
            .ok_or_else(|| PopupError::Validation("no visitor context".into()))?;
        let shop = self.settings.shop.clone();
        let EngineState::Displayed(active) = &mut self.state else {
            return Err(PopupError::Validation("no popup is displayed".into()));
        };
        if !active.definition.presentation.popup_type.collects_email() {
            return Err(PopupError::Validation(format!(
                "popup {} does not collect email",
                active.definition.id
            )));
        }
        let request = newsletter::build_request(email, &active.definition.id, &shop, &context)?;
        active.pending_email = Some(request.email.clone());
        Ok(request)
    }

    /// Applies the subscribe endpoint's answer. Success emits a conversion
    /// and schedules the popup to close itself.
    pub fn on_subscribe_result(&mut self, result: PopupResult<SubscribeResponse>) -> NewsletterOutcome {
        let EngineState::Displayed(active) = &mut self.state else {
            warn!("subscribe result arrived with no popup displayed");
            return newsletter::outcome(&Default::default(), &result);
        };
        let outcome = newsletter::outcome(&active.definition.presentation.newsletter, &result);
        let popup_id = active.definition.id.clone();

        match &outcome {
            NewsletterOutcome::Subscribed { .. } => {
                let email = active.pending_email.take();
                if active.dismiss_timer.is_none() {
                    active.dismiss_timer = Some(self.env.timers.set_timeout(self.settings.dismiss_after));
                }
                self.emit(SignalKind::Conversion, &popup_id, Some(json!({ "email": email })));
            }
            NewsletterOutcome::Failed { .. } => match &result {
                Err(e) => warn!(popup_id = %popup_id, error = %e, "subscription request failed"),
                Ok(resp) => warn!(
                    popup_id = %popup_id,
                    error = resp.error.as_deref().unwrap_or("unknown"),
                    "subscription rejected"
                ),
            },
        }
        outcome
    }

    /// Drops all page-scoped state: pending triggers, the displayed popup and
    /// the candidate list. Used when the page is navigated away from.
    pub fn reset(&mut self) {
        self.teardown();
        self.definitions.clear();
        self.context = None;
    }

    fn teardown(&mut self) {
        match std::mem::replace(&mut self.state, EngineState::Idle) {
            EngineState::Idle => {}
            EngineState::Armed(armed) => {
                armed.disarm(self.env.timers.as_ref(), self.env.listeners.as_ref());
            }
            EngineState::Displayed(active) => {
                self.env.renderer.remove(&active.definition.id);
                self.env.listeners.unsubscribe(active.interaction);
                if let Some(timer) = active.dismiss_timer {
                    self.env.timers.clear_timeout(timer);
                }
            }
        }
    }

    fn emit(&self, kind: SignalKind, popup_id: &str, metadata: Option<serde_json::Value>) {
        let Some(context) = self.context.as_ref() else {
            warn!(popup_id, kind = kind.as_str(), "signal dropped: no visitor context");
            return;
        };
        let signal = make_signal_at(
            kind,
            popup_id,
            context,
            self.settings.shop.clone(),
            metadata,
            self.env.clock.now().with_timezone(&Utc),
        );
        if let Err(e) = self.sink.emit(signal) {
            warn!(popup_id, kind = kind.as_str(), error = %e, "failed to emit popup signal");
        }
    }
}

fn log_rejection(popup_id: &str, guard: Guard) {
    debug!(popup_id, ?guard, "popup rejected by guard");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Clock, KeyValueStore, ManualClock, RecordingHost};
    use chrono::TimeZone;
    use popup_core::event_bus::capture_sink;
    use popup_core::types::{DeviceClass, PopupType};

    struct Harness {
        engine: PopupEngine,
        host: Arc<RecordingHost>,
        clock: Arc<ManualClock>,
        sink: Arc<popup_core::event_bus::CaptureSink>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 4, 2, 10, 0, 0)
                .unwrap(),
        ));
        let host = Arc::new(RecordingHost::new());
        let sink = capture_sink();
        let env = Environment::in_memory(clock.clone(), host.clone());
        let engine = PopupEngine::new(env, EngineSettings::default())
            .with_signal_sink(sink.clone() as Arc<dyn SignalSink>);
        Harness {
            engine,
            host,
            clock,
            sink,
        }
    }

    fn desktop() -> VisitorContext {
        VisitorContext {
            device: DeviceClass::Desktop,
            page: "/".into(),
            country: Some("US".into()),
            session_id: "sess_test".into(),
        }
    }

    #[test]
    fn test_immediate_display_records_everything() {
        let mut h = harness();
        let decision = h
            .engine
            .select_and_schedule(&[PopupDefinition::new("welcome")], &desktop());
        assert_eq!(
            decision,
            Decision::Displayed {
                popup_id: "welcome".into()
            }
        );
        assert_eq!(h.engine.phase(), EnginePhase::Displayed);
        assert_eq!(h.sink.count_kind(SignalKind::Impression), 1);
        assert_eq!(h.host.shown().len(), 1);
        assert!(h.host.has_listener(&ListenerKind::PopupInteraction {
            popup_id: "welcome".into()
        }));
        let last = h.engine.display_state().last_shown("welcome").unwrap();
        assert_eq!(last, Some(h.clock.now()));
    }

    #[test]
    fn test_no_reentrancy_while_displayed() {
        let mut h = harness();
        let defs = [PopupDefinition::new("a"), PopupDefinition::new("b")];
        h.engine.select_and_schedule(&defs, &desktop());
        assert_eq!(
            h.engine.select_and_schedule(&defs, &desktop()),
            Decision::AlreadyActive
        );
        assert_eq!(h.host.shown().len(), 1);
    }

    #[test]
    fn test_disabled_definitions_are_skipped() {
        let mut h = harness();
        let mut off = PopupDefinition::new("off");
        off.enabled = false;
        let decision = h
            .engine
            .select_and_schedule(&[off, PopupDefinition::new("on")], &desktop());
        assert_eq!(decision, Decision::Displayed { popup_id: "on".into() });
    }

    #[test]
    fn test_click_on_controls_is_not_tracked() {
        let mut h = harness();
        h.engine
            .select_and_schedule(&[PopupDefinition::new("p")], &desktop());

        let on_button = ClickTarget {
            element_type: "BUTTON".into(),
            within_button: true,
            ..Default::default()
        };
        assert!(!h.engine.on_user_action("p", UserAction::Click(on_button)));

        let on_image = ClickTarget {
            element_type: "IMG".into(),
            text: Some("".into()),
            ..Default::default()
        };
        assert!(h.engine.on_user_action("p", UserAction::Click(on_image)));
        let clicks: Vec<_> = h
            .sink
            .signals()
            .into_iter()
            .filter(|s| s.kind == SignalKind::Click)
            .collect();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].metadata.as_ref().unwrap()["elementType"], "img");
    }

    #[test]
    fn test_close_before_trigger_fires_disarms() {
        let mut h = harness();
        let mut exit = PopupDefinition::new("exit");
        exit.trigger.exit_intent = true;
        h.engine.select_and_schedule(&[exit], &desktop());
        assert!(h.host.has_listener(&ListenerKind::MouseLeave));

        h.engine.on_user_action("exit", UserAction::Close);
        assert_eq!(h.engine.phase(), EnginePhase::Idle);
        assert!(h.host.active_listeners().is_empty());
        assert_eq!(
            h.engine.handle_event(HostEvent::MouseLeave { client_y: -1.0 }),
            EventOutcome::Ignored
        );
    }

    #[test]
    fn test_actions_outside_displayed_popup_emit_nothing() {
        let mut h = harness();
        let mut mobile_only = PopupDefinition::new("mobile");
        mobile_only.targeting.devices = Some(vec![DeviceClass::Mobile]);
        assert_eq!(
            h.engine.select_and_schedule(&[mobile_only], &desktop()),
            Decision::NoMatch
        );
        let click = ClickTarget {
            element_type: "DIV".into(),
            ..Default::default()
        };
        assert!(!h.engine.on_user_action("ghost", UserAction::Click(click.clone())));
        assert!(!h.engine.on_user_action("ghost", UserAction::Conversion(None)));
        assert!(!h.engine.on_user_action("ghost", UserAction::Close));
        assert!(h.sink.signals().is_empty());

        h.engine
            .select_and_schedule(&[PopupDefinition::new("shown")], &desktop());
        assert!(!h.engine.on_user_action("other", UserAction::Click(click)));
        assert!(!h.engine.on_user_action("other", UserAction::Close));
        assert_eq!(h.engine.phase(), EnginePhase::Displayed);
        assert_eq!(h.sink.count_kind(SignalKind::Click), 0);
        assert_eq!(h.sink.count_kind(SignalKind::Close), 0);
    }

    #[test]
    fn test_signals_are_stamped_with_engine_clock() {
        let mut h = harness();
        h.engine
            .select_and_schedule(&[PopupDefinition::new("p")], &desktop());
        let impression = h.sink.signals().remove(0);
        assert_eq!(impression.emitted_at, h.clock.now().with_timezone(&chrono::Utc));
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> PopupResult<Option<String>> {
            Err(PopupError::Storage("quota exceeded".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> PopupResult<()> {
            Err(PopupError::Storage("quota exceeded".into()))
        }
    }

    struct BrokenSink;

    impl SignalSink for BrokenSink {
        fn emit(&self, _signal: popup_core::types::Signal) -> PopupResult<()> {
            Err(PopupError::Transport("offline".into()))
        }
    }

    #[test]
    fn test_display_survives_sink_and_storage_failures() {
        let clock = Arc::new(ManualClock::new(
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 4, 2, 10, 0, 0)
                .unwrap(),
        ));
        let host = Arc::new(RecordingHost::new());
        let mut env = Environment::in_memory(clock, host.clone());
        env.durable = Arc::new(BrokenStore);
        let mut engine =
            PopupEngine::new(env, EngineSettings::default()).with_signal_sink(Arc::new(BrokenSink));

        engine.select_and_schedule(&[PopupDefinition::new("p")], &desktop());
        assert_eq!(engine.phase(), EnginePhase::Displayed);
        assert_eq!(host.shown().len(), 1);
    }

    #[test]
    fn test_storage_error_skips_only_that_definition() {
        let clock = Arc::new(ManualClock::new(
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 4, 2, 10, 0, 0)
                .unwrap(),
        ));
        let host = Arc::new(RecordingHost::new());
        let mut env = Environment::in_memory(clock, host.clone());
        env.durable = Arc::new(BrokenStore);
        let mut engine = PopupEngine::new(env, EngineSettings::default());

        let mut capped = PopupDefinition::new("capped");
        capped.frequency = popup_core::types::Frequency::Once;
        let decision = engine.select_and_schedule(&[capped, PopupDefinition::new("open")], &desktop());
        assert_eq!(decision, Decision::Displayed { popup_id: "open".into() });
    }

    #[test]
    fn test_newsletter_success_converts_and_dismisses() {
        let mut h = harness();
        let mut news = PopupDefinition::new("news");
        news.presentation.popup_type = PopupType::Newsletter;
        h.engine.select_and_schedule(&[news], &desktop());

        assert!(h.engine.submit_email("not-an-email").is_err());
        let request = h.engine.submit_email("ada@example.com").unwrap();
        assert_eq!(request.popup_id, "news");

        let outcome = h.engine.on_subscribe_result(Ok(SubscribeResponse {
            success: true,
            error: None,
        }));
        assert_eq!(
            outcome,
            NewsletterOutcome::Subscribed {
                message: newsletter::DEFAULT_SUCCESS_MESSAGE.into()
            }
        );
        let conversion = h
            .sink
            .signals()
            .into_iter()
            .find(|s| s.kind == SignalKind::Conversion)
            .unwrap();
        assert_eq!(conversion.metadata.unwrap()["email"], "ada@example.com");

        let (timer, after) = h.host.pending_timers()[0];
        assert_eq!(after, Duration::from_millis(3000));
        assert_eq!(
            h.engine.handle_event(HostEvent::TimerFired(timer)),
            EventOutcome::Dismissed {
                popup_id: "news".into()
            }
        );
        assert_eq!(h.engine.phase(), EnginePhase::Idle);
        assert_eq!(h.host.removed(), vec!["news".to_string()]);
        // auto-dismiss is not a visitor close
        assert_eq!(h.sink.count_kind(SignalKind::Close), 0);
    }

    #[test]
    fn test_newsletter_failure_keeps_popup_open() {
        let mut h = harness();
        let mut news = PopupDefinition::new("news");
        news.presentation.popup_type = PopupType::Newsletter;
        news.presentation.newsletter.error_message = Some("Try later".into());
        h.engine.select_and_schedule(&[news], &desktop());
        h.engine.submit_email("ada@example.com").unwrap();

        let outcome = h
            .engine
            .on_subscribe_result(Err(PopupError::Transport("502".into())));
        assert_eq!(
            outcome,
            NewsletterOutcome::Failed {
                message: "Try later".into()
            }
        );
        assert_eq!(h.engine.phase(), EnginePhase::Displayed);
        assert_eq!(h.sink.count_kind(SignalKind::Conversion), 0);
    }

    #[test]
    fn test_submit_email_requires_newsletter_popup() {
        let mut h = harness();
        h.engine
            .select_and_schedule(&[PopupDefinition::new("promo")], &desktop());
        assert!(matches!(
            h.engine.submit_email("ada@example.com"),
            Err(PopupError::Validation(_))
        ));
    }

    #[test]
    fn test_reset_cancels_pending_timer() {
        let mut h = harness();
        let mut delayed = PopupDefinition::new("later");
        delayed.trigger.delay_secs = 10;
        h.engine.select_and_schedule(&[delayed], &desktop());
        let (timer, _) = h.host.pending_timers()[0];

        h.engine.reset();
        assert!(h.host.pending_timers().is_empty());
        assert_eq!(
            h.engine.handle_event(HostEvent::TimerFired(timer)),
            EventOutcome::Ignored
        );
        assert!(h.host.shown().is_empty());
    }
}
