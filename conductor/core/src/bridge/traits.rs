//! Bridge Traits
//!
//! Trait definitions for the two backend channels. The controller is generic
//! over [`CommandBridge`] and holds an [`EventSource`] only for the lifetime of
//! its subscriptions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::events::Topic;

/// Errors crossing the backend bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The backend rejected a command
    #[error("{command} rejected: {message}")]
    Rejected {
        /// Command that was rejected
        command: &'static str,
        /// Rejection message from the backend
        message: String,
    },

    /// Subscribing to a topic failed
    #[error("failed to subscribe to {topic}: {message}")]
    Subscribe {
        /// Topic that could not be subscribed
        topic: Topic,
        /// Failure description
        message: String,
    },

    /// An event payload did not match its topic
    #[error("invalid {topic} payload: {message}")]
    Payload {
        /// Topic the payload arrived on
        topic: Topic,
        /// What was wrong with it
        message: String,
    },

    /// Topic name is not one the controller knows
    #[error("unknown event topic: {0}")]
    UnknownTopic(String),
}

impl BridgeError {
    /// Message suitable for showing inline in the chat bubble
    ///
    /// Rejections show the backend's own message; everything else shows the
    /// full error.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Conversation session id assigned by the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Handle returned by [`EventSource::subscribe`], used to unsubscribe
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    /// Allocate a new unique token
    #[must_use]
    pub fn allocate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Callback invoked with the raw payload of each event on a topic
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Push-event channel from the backend
pub trait EventSource: Send + Sync {
    /// Register `handler` for every event on `topic`
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Subscribe`] if the host cannot attach a listener.
    fn subscribe(&self, topic: Topic, handler: EventHandler)
        -> Result<SubscriptionToken, BridgeError>;

    /// Detach the listener registered under `token`
    ///
    /// Unknown tokens are ignored.
    fn unsubscribe(&self, token: SubscriptionToken);
}

/// Request/response command channel to the backend
#[async_trait]
pub trait CommandBridge: Send + Sync {
    /// Begin a model call; returns the session the turn belongs to
    async fn call_model(
        &self,
        prompt: &str,
        stream: bool,
        session_id: Option<SessionId>,
    ) -> Result<SessionId, BridgeError>;

    /// Ask the backend to cancel the running model call
    ///
    /// Completion is signalled later by a `call-cancelled` event.
    async fn stop_model(&self) -> Result<(), BridgeError>;

    /// Resize the avatar window (logical pixels)
    async fn resize_avatar_window(&self, width: f64, height: f64) -> Result<(), BridgeError>;

    /// Open the main configuration window
    async fn create_main_window(&self) -> Result<(), BridgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_tokens_unique() {
        let a = SubscriptionToken::allocate();
        let b = SubscriptionToken::allocate();
        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_display_message_for_rejection() {
        let err = BridgeError::Rejected {
            command: "call_model",
            message: "network down".to_string(),
        };
        assert_eq!(err.display_message(), "network down");
        assert_eq!(err.to_string(), "call_model rejected: network down");
        let unknown = BridgeError::UnknownTopic("bogus".to_string());
        assert_eq!(unknown.display_message(), "unknown event topic: bogus");
    }

    #[test]
    fn test_session_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&SessionId(12)).unwrap(), "12");
        assert_eq!(SessionId(12).to_string(), "session-12");
    }
}
