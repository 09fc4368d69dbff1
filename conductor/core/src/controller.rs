//! Avatar Controller - The Session Orchestrator
//!
//! The controller owns the current [`ConversationTurn`] and is the only thing
//! that mutates it. It:
//! - gates prompt submission (one turn at a time, no empty prompts)
//! - routes backend events into the turn in arrival order
//! - keeps the avatar window sized to the chat bubble
//! - remembers the backend session across prompts
//!
//! # Design Philosophy
//!
//! Event handlers registered with the host never touch the turn. They only
//! push decoded [`BackendEvent`]s into an unbounded channel, and the
//! controller drains that channel from its own task via
//! [`AvatarController::process_next`] or [`AvatarController::drain_pending`].
//! That keeps ordering trivial: events apply exactly in the order the host
//! delivered them, and no lock guards the turn.
//!
//! `stop` only asks the backend to stop. The turn becomes `Cancelled` when
//! the backend confirms with `call-cancelled`.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::bridge::{BackendEvent, BridgeError, CommandBridge, EventSource, SessionId};
use crate::config::AvatarConfig;
use crate::parser::MessagePart;
use crate::sizing::{SizingReactor, WindowDimensions};
use crate::subscriptions::{MountReport, SubscriptionManager};
use crate::turn::{ConversationTurn, Transition, TurnFlags, TurnPhase, NEW_TURN_SENTINEL};

/// Errors returned by controller operations
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A turn is already running
    #[error("a turn is already in progress ({0})")]
    TurnInProgress(TurnPhase),

    /// The prompt was empty after trimming
    #[error("prompt is empty")]
    EmptyPrompt,

    /// There is nothing to stop
    #[error("no active turn to stop")]
    NoActiveTurn,

    /// The backend rejected a command
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// What handling one event did
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// The turn changed
    Applied,
    /// The event did not apply in the current phase
    Ignored,
    /// Backend configuration changed; the caller should reload its config
    ConfigReloadRequested,
    /// A backend-initiated turn's session became the current session
    SessionAdopted(SessionId),
}

/// Serializable view of the whole controller state
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnSnapshot {
    /// Current phase
    pub phase: TurnPhase,
    /// Accumulated raw response text
    pub raw_content: String,
    /// Parsed response
    pub parts: Vec<MessagePart>,
    /// Tool currently executing
    pub current_tool: Option<String>,
    /// Error shown with the content
    pub error_message: Option<String>,
    /// Rendering flags
    pub flags: TurnFlags,
    /// Animation the avatar should play
    pub animation: &'static str,
    /// Session the next prompt continues
    pub session_id: Option<SessionId>,
    /// Last size the host accepted
    pub window: Option<WindowDimensions>,
}

/// Drives a conversation turn from backend events
pub struct AvatarController<B: CommandBridge + ?Sized> {
    /// Command channel to the backend
    bridge: Arc<B>,
    /// Active configuration
    config: AvatarConfig,
    /// The turn being displayed
    turn: ConversationTurn,
    /// Session the next prompt continues
    session: Option<SessionId>,
    /// Window sizing state
    sizing: SizingReactor,
    /// Host subscriptions
    subscriptions: SubscriptionManager,
    /// Sender cloned into every subscription handler
    events_tx: mpsc::UnboundedSender<BackendEvent>,
    /// Events waiting to be applied
    events_rx: mpsc::UnboundedReceiver<BackendEvent>,
}

impl<B: CommandBridge + ?Sized> AvatarController<B> {
    /// Create a controller with an idle turn
    pub fn new(bridge: Arc<B>, config: AvatarConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            bridge,
            config,
            turn: ConversationTurn::new(),
            session: None,
            sizing: SizingReactor::new(),
            subscriptions: SubscriptionManager::new(),
            events_tx,
            events_rx,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The current turn
    #[must_use]
    pub fn turn(&self) -> &ConversationTurn {
        &self.turn
    }

    /// Rendering flags for the current turn
    #[must_use]
    pub fn flags(&self) -> TurnFlags {
        self.turn.flags()
    }

    /// Session the next prompt continues
    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &AvatarConfig {
        &self.config
    }

    /// Host subscriptions
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Snapshot of the whole state
    #[must_use]
    pub fn snapshot(&self) -> TurnSnapshot {
        TurnSnapshot {
            phase: self.turn.phase(),
            raw_content: self.turn.raw_content().to_string(),
            parts: self.turn.parts().to_vec(),
            current_tool: self.turn.current_tool().map(str::to_string),
            error_message: self.turn.error_message().map(str::to_string),
            flags: self.turn.flags(),
            animation: self.turn.phase().avatar_mood().suggested_animation(),
            session_id: self.session,
            window: self.sizing.last_pushed(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Subscribe to every backend topic on `source`
    ///
    /// Mounting twice is a no-op. Topics that fail to subscribe are logged
    /// and reported; the controller keeps working without them.
    pub fn mount(&mut self, source: Arc<dyn EventSource>) -> MountReport {
        let report = self.subscriptions.mount(source, self.events_tx.clone());
        if !report.is_complete() {
            tracing::warn!(failed = ?report.failed, "Mounted with missing subscriptions");
        }
        report
    }

    /// Release all subscriptions; also happens on drop
    ///
    /// Events delivered but not yet applied are discarded, so a later mount
    /// starts from a clean queue.
    pub fn unmount(&mut self) -> usize {
        let released = self.subscriptions.unmount();
        let mut discarded = 0;
        while self.events_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(discarded, "Dropped events queued before unmount");
        }
        released
    }

    // ========================================================================
    // User Actions
    // ========================================================================

    /// Send a prompt and start a new turn
    ///
    /// # Errors
    ///
    /// - [`ControllerError::EmptyPrompt`] / [`ControllerError::TurnInProgress`]
    ///   without touching state
    /// - [`ControllerError::Bridge`] if `call_model` fails; the turn is then
    ///   `Errored` with the rejection message
    pub async fn submit_prompt(&mut self, prompt: &str) -> Result<SessionId, ControllerError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ControllerError::EmptyPrompt);
        }
        let phase = self.turn.phase();
        if phase.is_active() {
            return Err(ControllerError::TurnInProgress(phase));
        }

        self.turn.begin();
        self.sizing.clear_measurement();
        self.push_resize().await;

        tracing::info!(
            session = ?self.session,
            stream = self.config.stream,
            prompt_len = prompt.len(),
            "Starting turn"
        );

        match self
            .bridge
            .call_model(prompt, self.config.stream, self.session)
            .await
        {
            Ok(session) => {
                self.session = Some(session);
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(error = %e, "call_model failed");
                self.turn.fail(&e.display_message());
                self.push_resize().await;
                Err(e.into())
            }
        }
    }

    /// Ask the backend to stop the running turn
    ///
    /// # Errors
    ///
    /// - [`ControllerError::NoActiveTurn`] if nothing is running
    /// - [`ControllerError::Bridge`] if `stop_model` fails; the turn is then
    ///   `Errored` with the rejection message
    pub async fn stop(&mut self) -> Result<(), ControllerError> {
        if !self.turn.phase().is_active() {
            return Err(ControllerError::NoActiveTurn);
        }

        tracing::info!(phase = %self.turn.phase(), "Stopping model");
        if let Err(e) = self.bridge.stop_model().await {
            tracing::warn!(error = %e, "stop_model failed");
            self.turn.fail(&e.display_message());
            self.push_resize().await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Forget the backend session so the next prompt starts a new one
    ///
    /// A finished turn is cleared from the bubble; a running one is left alone.
    pub async fn new_session(&mut self) {
        tracing::info!(previous = ?self.session, "Starting new session");
        self.session = None;

        if !self.turn.phase().is_active() {
            self.turn = ConversationTurn::new();
            self.sizing.clear_measurement();
            self.push_resize().await;
        }
    }

    /// Open the main configuration window
    pub async fn open_settings(&self) {
        if let Err(e) = self.bridge.create_main_window().await {
            tracing::warn!(error = %e, "Failed to open settings window");
        }
    }

    /// Replace the configuration and resize for it
    pub async fn apply_config(&mut self, config: AvatarConfig) -> Option<WindowDimensions> {
        tracing::info!(source = %config.source(), "Applying configuration");
        self.config = config;
        self.push_resize().await
    }

    // ========================================================================
    // Backend Events
    // ========================================================================

    /// Apply one backend event
    pub async fn handle_event(&mut self, event: BackendEvent) -> EventOutcome {
        tracing::debug!(topic = %event.topic(), phase = %self.turn.phase(), "Backend event");

        match event {
            BackendEvent::ConfigChanged => {
                tracing::info!("Backend configuration changed");
                EventOutcome::ConfigReloadRequested
            }
            BackendEvent::Suggestion(id) if id != NEW_TURN_SENTINEL => {
                let session = SessionId(id);
                tracing::info!(%session, "Adopting backend-initiated session");
                self.session = Some(session);
                EventOutcome::SessionAdopted(session)
            }
            event => {
                let was_active = self.turn.phase().is_active();
                match self.turn.apply(&event) {
                    Transition::Applied => {
                        if matches!(event, BackendEvent::Suggestion(_)) {
                            self.sizing.clear_measurement();
                        }
                        self.log_turn_end(was_active);
                        self.push_resize().await;
                        EventOutcome::Applied
                    }
                    Transition::Ignored => {
                        tracing::debug!(
                            topic = %event.topic(),
                            phase = %self.turn.phase(),
                            "Event ignored in current phase"
                        );
                        EventOutcome::Ignored
                    }
                }
            }
        }
    }

    /// Wait for the next event and apply it
    ///
    /// The controller holds a sender itself, so this waits until an event
    /// arrives rather than returning `None` when the host goes quiet.
    pub async fn process_next(&mut self) -> Option<EventOutcome> {
        let event = self.events_rx.recv().await?;
        Some(self.handle_event(event).await)
    }

    /// Apply every event already queued, without waiting
    pub async fn drain_pending(&mut self) -> Vec<EventOutcome> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }

        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.handle_event(event).await);
        }
        outcomes
    }

    // ========================================================================
    // Sizing
    // ========================================================================

    /// Record the bubble's laid-out content height without resizing
    pub fn record_measurement(&mut self, height: f64) {
        self.sizing.set_measurement(height);
    }

    /// The bubble finished layout at `height`; resize to fit
    ///
    /// Returns the dimensions pushed, or `None` if they were unchanged.
    pub async fn content_measured(&mut self, height: f64) -> Option<WindowDimensions> {
        self.sizing.set_measurement(height);
        self.push_resize().await
    }

    /// Resize after the settle delay, using the latest recorded measurement
    ///
    /// Fallback for hosts without a layout-settled signal.
    pub async fn settle_and_resize(&mut self) -> Option<WindowDimensions> {
        tokio::time::sleep(self.config.settle_delay).await;
        self.push_resize().await
    }

    /// Push the target size to the host
    ///
    /// Returns `None` if the host already has it or rejected it; a rejected
    /// size is retried on the next push.
    async fn push_resize(&mut self) -> Option<WindowDimensions> {
        let visible = self.turn.flags().bubble_visible;
        let dims = self.sizing.target(visible, &self.config.sizing)?;

        tracing::debug!(width = dims.width, height = dims.height, "Resizing avatar window");
        match self
            .bridge
            .resize_avatar_window(dims.width, dims.height)
            .await
        {
            Ok(()) => {
                self.sizing.commit(dims);
                Some(dims)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to resize avatar window");
                None
            }
        }
    }

    fn log_turn_end(&self, was_active: bool) {
        if !was_active || self.turn.phase().is_active() {
            return;
        }
        match self.turn.phase() {
            TurnPhase::Errored => tracing::warn!(
                error = self.turn.error_message().unwrap_or_default(),
                content_len = self.turn.raw_content().len(),
                "Turn failed"
            ),
            phase => tracing::info!(
                %phase,
                content_len = self.turn.raw_content().len(),
                "Turn finished"
            ),
        }
    }
}

impl<B: CommandBridge + ?Sized> std::fmt::Debug for AvatarController<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarController")
            .field("phase", &self.turn.phase())
            .field("session", &self.session)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bridge::{BridgeCommand, CommandKind, InProcessBridge, Topic};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn setup() -> (Arc<InProcessBridge>, AvatarController<InProcessBridge>) {
        let bridge = Arc::new(InProcessBridge::new());
        let mut controller = AvatarController::new(bridge.clone(), AvatarConfig::default());
        controller.mount(bridge.clone());
        (bridge, controller)
    }

    fn resizes(bridge: &InProcessBridge) -> Vec<(f64, f64)> {
        bridge
            .commands_of(CommandKind::ResizeAvatarWindow)
            .into_iter()
            .filter_map(|command| match command {
                BridgeCommand::ResizeAvatarWindow { width, height } => Some((width, height)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_submit_starts_turn_and_records_session() {
        let (bridge, mut controller) = setup();

        let session = controller.submit_prompt("  hello  ").await.unwrap();

        assert_eq!(controller.turn().phase(), TurnPhase::AwaitingFirstToken);
        assert_eq!(controller.session(), Some(session));
        assert_eq!(
            bridge.commands_of(CommandKind::CallModel),
            vec![BridgeCommand::CallModel {
                prompt: "hello".to_string(),
                stream: true,
                session_id: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_follow_up_reuses_session() {
        let (bridge, mut controller) = setup();

        let first = controller.submit_prompt("one").await.unwrap();
        bridge.emit_event(&BackendEvent::Complete);
        controller.drain_pending().await;
        controller.submit_prompt("two").await.unwrap();

        let calls = bridge.commands_of(CommandKind::CallModel);
        assert_eq!(
            calls[1],
            BridgeCommand::CallModel {
                prompt: "two".to_string(),
                stream: true,
                session_id: Some(first),
            }
        );
    }

    #[tokio::test]
    async fn test_gate_rejects_without_touching_state() {
        let (bridge, mut controller) = setup();

        assert!(matches!(
            controller.submit_prompt("   ").await,
            Err(ControllerError::EmptyPrompt)
        ));
        assert_eq!(controller.turn().phase(), TurnPhase::Idle);

        controller.submit_prompt("first").await.unwrap();
        bridge.emit_event(&BackendEvent::Chunk("partial".into()));
        controller.drain_pending().await;

        let before = controller.snapshot();
        assert!(matches!(
            controller.submit_prompt("second").await,
            Err(ControllerError::TurnInProgress(TurnPhase::Streaming))
        ));
        assert_eq!(controller.snapshot(), before);
        assert_eq!(bridge.commands_of(CommandKind::CallModel).len(), 1);
    }

    #[tokio::test]
    async fn test_call_model_rejection_errors_turn() {
        let (bridge, mut controller) = setup();
        bridge.reject_next(CommandKind::CallModel, "model not loaded");

        let err = controller.submit_prompt("hi").await.unwrap_err();

        assert!(matches!(err, ControllerError::Bridge(BridgeError::Rejected { .. })));
        assert_eq!(controller.turn().phase(), TurnPhase::Errored);
        assert_eq!(controller.turn().error_message(), Some("model not loaded"));
        assert!(controller.flags().can_submit);
    }

    #[tokio::test]
    async fn test_stop_waits_for_cancel_event() {
        let (bridge, mut controller) = setup();
        controller.submit_prompt("hi").await.unwrap();

        controller.stop().await.unwrap();
        assert_eq!(controller.turn().phase(), TurnPhase::AwaitingFirstToken);

        bridge.emit_event(&BackendEvent::Cancelled);
        controller.drain_pending().await;

        assert_eq!(controller.turn().phase(), TurnPhase::Cancelled);
        assert_eq!(controller.turn().raw_content(), "*Model stopped by user*");
    }

    #[tokio::test]
    async fn test_stop_without_turn() {
        let (_bridge, mut controller) = setup();
        assert!(matches!(
            controller.stop().await,
            Err(ControllerError::NoActiveTurn)
        ));
    }

    #[tokio::test]
    async fn test_stop_rejection_keeps_content() {
        let (bridge, mut controller) = setup();
        controller.submit_prompt("hi").await.unwrap();
        bridge.emit_event(&BackendEvent::Chunk("so far".into()));
        controller.drain_pending().await;

        bridge.reject_next(CommandKind::StopModel, "No active model call to stop");
        assert!(controller.stop().await.is_err());

        assert_eq!(controller.turn().phase(), TurnPhase::Errored);
        assert_eq!(controller.turn().raw_content(), "so far");
        assert_eq!(
            controller.turn().error_message(),
            Some("No active model call to stop")
        );
    }

    #[tokio::test]
    async fn test_suggestion_session_adopted() {
        let (bridge, mut controller) = setup();

        bridge.emit(Topic::Suggestion, &json!(-1));
        bridge.emit(Topic::Suggestion, &json!(17));
        let outcomes = controller.drain_pending().await;

        assert_eq!(
            outcomes,
            vec![
                EventOutcome::Applied,
                EventOutcome::SessionAdopted(SessionId(17))
            ]
        );
        assert_eq!(controller.turn().phase(), TurnPhase::AwaitingFirstToken);
        assert_eq!(controller.session(), Some(SessionId(17)));
    }

    #[tokio::test]
    async fn test_config_change_requests_reload() {
        let (bridge, mut controller) = setup();
        bridge.emit(Topic::SetConfigValue, &Value::Null);

        assert_eq!(
            controller.drain_pending().await,
            vec![EventOutcome::ConfigReloadRequested]
        );
    }

    #[tokio::test]
    async fn test_resize_follows_bubble() {
        let (bridge, mut controller) = setup();

        controller.submit_prompt("hi").await.unwrap();
        bridge.emit_event(&BackendEvent::Chunk("answer".into()));
        controller.drain_pending().await;

        assert_eq!(
            controller.content_measured(100.0).await,
            Some(WindowDimensions::new(360.0, 332.0))
        );
        assert_eq!(controller.content_measured(100.0).await, None);

        controller.new_session().await;
        let sizes = resizes(&bridge);
        assert_eq!(sizes, vec![(200.0, 200.0), (360.0, 332.0), (200.0, 200.0)]);
        assert!(!controller.flags().bubble_visible);
    }

    #[tokio::test]
    async fn test_resize_failure_only_logged() {
        let (bridge, mut controller) = setup();
        bridge.reject_next(CommandKind::ResizeAvatarWindow, "no window");

        controller.submit_prompt("hi").await.unwrap();
        assert_eq!(controller.turn().phase(), TurnPhase::AwaitingFirstToken);
        assert_eq!(controller.snapshot().window, None);
    }

    #[tokio::test]
    async fn test_rejected_resize_is_retried() {
        let (bridge, mut controller) = setup();
        controller.submit_prompt("hi").await.unwrap();
        bridge.take_commands();

        bridge.reject_next(CommandKind::ResizeAvatarWindow, "window busy");
        assert_eq!(controller.content_measured(100.0).await, None);
        assert_eq!(
            controller.snapshot().window,
            Some(WindowDimensions::new(200.0, 200.0))
        );

        assert_eq!(
            controller.content_measured(100.0).await,
            Some(WindowDimensions::new(360.0, 332.0))
        );
        assert_eq!(resizes(&bridge), vec![(360.0, 332.0), (360.0, 332.0)]);
        assert_eq!(
            controller.snapshot().window,
            Some(WindowDimensions::new(360.0, 332.0))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_and_resize_waits_for_delay() {
        let (bridge, mut controller) = setup();
        controller.submit_prompt("hi").await.unwrap();
        controller.record_measurement(50.0);

        let start = tokio::time::Instant::now();
        let dims = controller.settle_and_resize().await;

        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(dims, Some(WindowDimensions::new(360.0, 282.0)));
        assert_eq!(resizes(&bridge).last(), Some(&(360.0, 282.0)));
    }

    #[tokio::test]
    async fn test_open_settings_failure_logged() {
        let (bridge, controller) = setup();
        bridge.reject_next(CommandKind::CreateMainWindow, "denied");

        controller.open_settings().await;
        assert_eq!(bridge.commands_of(CommandKind::CreateMainWindow).len(), 1);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let (bridge, controller) = setup();
        assert_eq!(bridge.total_subscribers(), Topic::ALL.len());
        drop(controller);
        assert_eq!(bridge.total_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_remount_starts_from_clean_queue() {
        let (bridge, mut controller) = setup();
        controller.submit_prompt("hi").await.unwrap();
        bridge.emit_event(&BackendEvent::Chunk("stale".into()));

        assert_eq!(controller.unmount(), Topic::ALL.len());
        let report = controller.mount(bridge.clone());

        assert!(report.is_complete());
        assert_eq!(bridge.total_subscribers(), Topic::ALL.len());
        assert!(controller.drain_pending().await.is_empty());
        assert_eq!(controller.turn().raw_content(), "");

        bridge.emit_event(&BackendEvent::Chunk("fresh".into()));
        assert_eq!(controller.drain_pending().await, vec![EventOutcome::Applied]);
        assert_eq!(controller.turn().raw_content(), "fresh");
    }

    #[tokio::test]
    async fn test_snapshot_names_animation() {
        let (bridge, mut controller) = setup();
        assert_eq!(controller.snapshot().animation, "idle");

        controller.submit_prompt("hi").await.unwrap();
        assert_eq!(controller.snapshot().animation, "waiting");

        bridge.emit_event(&BackendEvent::Chunk("<think>hm".into()));
        controller.drain_pending().await;
        assert_eq!(controller.snapshot().animation, "thinking");

        bridge.emit_event(&BackendEvent::Error("boom".into()));
        controller.drain_pending().await;
        assert_eq!(controller.snapshot().animation, "error");
    }
}
