//! Backend Events
//!
//! Push events the backend emits while a model call is running. Each event
//! arrives on its own [`Topic`] with a JSON payload; [`BackendEvent`] is the
//! decoded, typed form the turn state machine consumes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::traits::BridgeError;

/// Backend event topics the controller listens to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Incremental response text (`string`)
    CallChunk,
    /// Name of the tool currently executing (`string`, empty clears)
    ToolCall,
    /// Model call finished
    CallComplete,
    /// Backend-reported failure (`string`)
    Error,
    /// Backend-initiated turn (`number`, `-1` starts a fresh empty turn)
    Suggestion,
    /// Model call stopped after a stop request
    CallCancelled,
    /// Configuration changed on the backend side
    SetConfigValue,
}

impl Topic {
    /// Every topic, in subscription order
    pub const ALL: [Topic; 7] = [
        Topic::CallChunk,
        Topic::ToolCall,
        Topic::CallComplete,
        Topic::Error,
        Topic::Suggestion,
        Topic::CallCancelled,
        Topic::SetConfigValue,
    ];

    /// Wire name of the topic
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallChunk => "call-chunk",
            Self::ToolCall => "tool-call",
            Self::CallComplete => "call-complete",
            Self::Error => "error",
            Self::Suggestion => "suggestion",
            Self::CallCancelled => "call-cancelled",
            Self::SetConfigValue => "set-config-value",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| BridgeError::UnknownTopic(s.to_string()))
    }
}

/// A decoded backend event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendEvent {
    /// Incremental response text
    Chunk(String),
    /// Tool invocation started (empty name: tool finished)
    ToolCall(String),
    /// Model call finished
    Complete,
    /// Backend-reported failure
    Error(String),
    /// Backend-initiated turn marker or session id
    Suggestion(i64),
    /// Model call stopped
    Cancelled,
    /// Backend configuration changed
    ConfigChanged,
}

impl BackendEvent {
    /// Topic this event travels on
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::Chunk(_) => Topic::CallChunk,
            Self::ToolCall(_) => Topic::ToolCall,
            Self::Complete => Topic::CallComplete,
            Self::Error(_) => Topic::Error,
            Self::Suggestion(_) => Topic::Suggestion,
            Self::Cancelled => Topic::CallCancelled,
            Self::ConfigChanged => Topic::SetConfigValue,
        }
    }

    /// Decode a raw payload received on `topic`
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Payload`] when a chunk is not a string or a
    /// suggestion is not an integer.
    pub fn from_payload(topic: Topic, payload: &Value) -> Result<Self, BridgeError> {
        let invalid = |expected: &str| BridgeError::Payload {
            topic,
            message: format!("expected {expected}, got {payload}"),
        };

        match topic {
            Topic::CallChunk => payload
                .as_str()
                .map(|text| Self::Chunk(text.to_string()))
                .ok_or_else(|| invalid("string")),
            Topic::ToolCall => match payload {
                Value::Null => Ok(Self::ToolCall(String::new())),
                Value::String(name) => Ok(Self::ToolCall(name.clone())),
                _ => Err(invalid("string")),
            },
            Topic::Error => Ok(Self::Error(match payload {
                Value::String(message) => message.clone(),
                other => other.to_string(),
            })),
            Topic::Suggestion => payload
                .as_i64()
                .map(Self::Suggestion)
                .ok_or_else(|| invalid("integer")),
            Topic::CallComplete => Ok(Self::Complete),
            Topic::CallCancelled => Ok(Self::Cancelled),
            Topic::SetConfigValue => Ok(Self::ConfigChanged),
        }
    }

    /// Encode this event as the payload the backend would send
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Chunk(text) | Self::ToolCall(text) | Self::Error(text) => {
                Value::String(text.clone())
            }
            Self::Suggestion(value) => Value::from(*value),
            Self::Complete | Self::Cancelled | Self::ConfigChanged => Value::Null,
        }
    }
}
