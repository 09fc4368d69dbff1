//! In-Process Bridge
//!
//! Channel-free stand-in for the native backend, used by tests and the replay
//! tool. It implements both [`EventSource`] and [`CommandBridge`]:
//! - events are pushed with [`InProcessBridge::emit`] and dispatched to every
//!   handler subscribed to the topic, synchronously and in call order
//! - commands are recorded and answered with scripted results
//! - a placed window follows accepted resizes the way the overlay host moves
//!   it, anchored at the bottom-right corner
//!
//! # Usage
//!
//! ```ignore
//! let bridge = Arc::new(InProcessBridge::new());
//! let mut controller = AvatarController::new(bridge.clone(), AvatarConfig::default());
//! controller.mount(bridge.clone());
//!
//! controller.submit_prompt("hello").await?;
//! bridge.emit_event(&BackendEvent::Chunk("hi".into()));
//! controller.drain_pending().await;
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::events::{BackendEvent, Topic};
use crate::sizing::{WindowDimensions, WindowGeometry};
use super::traits::{
    BridgeError, CommandBridge, EventHandler, EventSource, SessionId, SubscriptionToken,
};

/// Which backend command a [`BridgeCommand`] is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// `call_model`
    CallModel,
    /// `stop_model`
    StopModel,
    /// `resize_avatar_window`
    ResizeAvatarWindow,
    /// `create_main_window`
    CreateMainWindow,
}

impl CommandKind {
    /// Backend command name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::CallModel => "call_model",
            Self::StopModel => "stop_model",
            Self::ResizeAvatarWindow => "resize_avatar_window",
            Self::CreateMainWindow => "create_main_window",
        }
    }
}

/// A command issued to the bridge, as recorded
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BridgeCommand {
    /// `call_model(prompt, stream, session_id)`
    CallModel {
        /// Prompt text
        prompt: String,
        /// Whether streaming was requested
        stream: bool,
        /// Session the prompt continues, if any
        session_id: Option<SessionId>,
    },
    /// `stop_model()`
    StopModel,
    /// `resize_avatar_window(width, height)`
    ResizeAvatarWindow {
        /// Requested width
        width: f64,
        /// Requested height
        height: f64,
    },
    /// `create_main_window()`
    CreateMainWindow,
}

impl BridgeCommand {
    /// Kind of this command
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::CallModel { .. } => CommandKind::CallModel,
            Self::StopModel => CommandKind::StopModel,
            Self::ResizeAvatarWindow { .. } => CommandKind::ResizeAvatarWindow,
            Self::CreateMainWindow => CommandKind::CreateMainWindow,
        }
    }
}

/// In-process backend double
pub struct InProcessBridge {
    /// Handlers per topic, in subscription order
    handlers: RwLock<HashMap<Topic, Vec<(SubscriptionToken, EventHandler)>>>,
    /// Topics that refuse new subscriptions
    refused_topics: RwLock<HashSet<Topic>>,
    /// Every command issued, in order
    commands: Mutex<Vec<BridgeCommand>>,
    /// Queued one-shot rejections per command
    rejections: Mutex<HashMap<CommandKind, VecDeque<String>>>,
    /// Next session id handed out for prompts without a session
    next_session: AtomicI64,
    /// Simulated avatar window, once placed
    window: Mutex<Option<WindowGeometry>>,
}

impl InProcessBridge {
    /// Create an empty bridge
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            refused_topics: RwLock::new(HashSet::new()),
            commands: Mutex::new(Vec::new()),
            rejections: Mutex::new(HashMap::new()),
            next_session: AtomicI64::new(1),
            window: Mutex::new(None),
        }
    }

    /// Push a raw payload on `topic`
    ///
    /// Returns the number of handlers that received it.
    pub fn emit(&self, topic: Topic, payload: &Value) -> usize {
        // Clone handlers out so a handler may subscribe/unsubscribe re-entrantly
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .get(&topic)
            .map(|subs| subs.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(payload.clone());
        }
        handlers.len()
    }

    /// Push a typed event
    pub fn emit_event(&self, event: &BackendEvent) -> usize {
        self.emit(event.topic(), &event.payload())
    }

    /// Number of live subscriptions on `topic`
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.handlers.read().get(&topic).map_or(0, Vec::len)
    }

    /// Total live subscriptions across all topics
    #[must_use]
    pub fn total_subscribers(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    /// Make future subscriptions to `topic` fail
    pub fn refuse_topic(&self, topic: Topic) {
        self.refused_topics.write().insert(topic);
    }

    /// Reject the next `command` with `message`
    pub fn reject_next(&self, command: CommandKind, message: impl Into<String>) {
        self.rejections
            .lock()
            .entry(command)
            .or_default()
            .push_back(message.into());
    }

    /// Put the simulated window on screen
    pub fn place_window(&self, geometry: WindowGeometry) {
        *self.window.lock() = Some(geometry);
    }

    /// Current simulated window, if placed
    #[must_use]
    pub fn window(&self) -> Option<WindowGeometry> {
        *self.window.lock()
    }

    /// Commands issued so far
    #[must_use]
    pub fn commands(&self) -> Vec<BridgeCommand> {
        self.commands.lock().clone()
    }

    /// Commands of one kind issued so far
    #[must_use]
    pub fn commands_of(&self, kind: CommandKind) -> Vec<BridgeCommand> {
        self.commands
            .lock()
            .iter()
            .filter(|command| command.kind() == kind)
            .cloned()
            .collect()
    }

    /// Drain the command log
    pub fn take_commands(&self) -> Vec<BridgeCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    /// Record `command` and apply any queued rejection
    fn record(&self, command: BridgeCommand) -> Result<(), BridgeError> {
        let kind = command.kind();
        self.commands.lock().push(command);

        match self
            .rejections
            .lock()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
        {
            Some(message) => Err(BridgeError::Rejected {
                command: kind.name(),
                message,
            }),
            None => Ok(()),
        }
    }
}

impl Default for InProcessBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for InProcessBridge {
    fn subscribe(
        &self,
        topic: Topic,
        handler: EventHandler,
    ) -> Result<SubscriptionToken, BridgeError> {
        if self.refused_topics.read().contains(&topic) {
            return Err(BridgeError::Subscribe {
                topic,
                message: "listener refused by host".to_string(),
            });
        }

        let token = SubscriptionToken::allocate();
        self.handlers
            .write()
            .entry(topic)
            .or_default()
            .push((token, handler));
        Ok(token)
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        for subs in self.handlers.write().values_mut() {
            subs.retain(|(existing, _)| *existing != token);
        }
    }
}

#[async_trait]
impl CommandBridge for InProcessBridge {
    async fn call_model(
        &self,
        prompt: &str,
        stream: bool,
        session_id: Option<SessionId>,
    ) -> Result<SessionId, BridgeError> {
        self.record(BridgeCommand::CallModel {
            prompt: prompt.to_string(),
            stream,
            session_id,
        })?;

        // Existing sessions continue; otherwise the backend opens a new one
        Ok(session_id
            .unwrap_or_else(|| SessionId(self.next_session.fetch_add(1, Ordering::SeqCst))))
    }

    async fn stop_model(&self) -> Result<(), BridgeError> {
        self.record(BridgeCommand::StopModel)
    }

    async fn resize_avatar_window(&self, width: f64, height: f64) -> Result<(), BridgeError> {
        self.record(BridgeCommand::ResizeAvatarWindow { width, height })?;

        if let Some(window) = self.window.lock().as_mut() {
            *window = window.resize_anchored(WindowDimensions::new(width, height));
        }
        Ok(())
    }

    async fn create_main_window(&self) -> Result<(), BridgeError> {
        self.record(BridgeCommand::CreateMainWindow)
    }
}
