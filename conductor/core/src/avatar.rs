//! Avatar Mood
//!
//! The overlay renders the avatar however it likes; the controller only says
//! what mood the avatar should be in. Mood is derived from the turn phase so
//! the animation always matches what the model is doing.

use serde::{Deserialize, Serialize};

use crate::turn::TurnPhase;

/// Avatar emotional moods
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AvatarMood {
    /// Resting, nothing in flight
    #[default]
    Idle,
    /// Prompt sent, waiting for the first token
    Listening,
    /// Model is reasoning
    Thinking,
    /// Answer is streaming
    Talking,
    /// Turn failed
    Confused,
}

impl AvatarMood {
    /// Mood for a turn phase
    #[must_use]
    pub fn for_phase(phase: TurnPhase) -> Self {
        match phase {
            TurnPhase::Idle | TurnPhase::Complete | TurnPhase::Cancelled => Self::Idle,
            TurnPhase::AwaitingFirstToken => Self::Listening,
            TurnPhase::Thinking => Self::Thinking,
            TurnPhase::Streaming => Self::Talking,
            TurnPhase::Errored => Self::Confused,
        }
    }

    /// Suggested animation name for this mood
    #[must_use]
    pub fn suggested_animation(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "waiting",
            Self::Thinking => "thinking",
            Self::Talking => "talking",
            Self::Confused => "error",
        }
    }
}
