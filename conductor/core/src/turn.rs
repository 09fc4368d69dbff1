//! Conversation Turn
//!
//! State machine for a single prompt/response exchange. Backend events are
//! applied in arrival order; each one either changes the turn
//! ([`Transition::Applied`]) or fails its precondition and is dropped
//! ([`Transition::Ignored`]).
//!
//! # Phases
//!
//! ```text
//!            begin / suggestion(-1)
//!   Idle ───────────────────────────▶ AwaitingFirstToken
//!                                        │ chunk
//!                                        ▼
//!                         ┌──────▶ Streaming ◀──────┐
//!                         │  chunk     │ chunk      │ chunk
//!                         └────────  Thinking ──────┘
//!                                        │
//!              call-complete / call-cancelled / error
//!                                        ▼
//!                       Complete | Cancelled | Errored
//! ```
//!
//! `raw_content` only grows while a turn is active. It is cleared when a new
//! turn begins, never in between.

use serde::{Deserialize, Serialize};

use crate::avatar::AvatarMood;
use crate::bridge::BackendEvent;
use crate::parser::{self, MessagePart, THINK_CLOSE};

/// Notice appended when the user stops the model
pub const STOPPED_BY_USER_NOTICE: &str = "*Model stopped by user*";

/// `suggestion` payload that starts a fresh, empty turn
pub const NEW_TURN_SENTINEL: i64 = -1;

/// Where a turn is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// No turn yet
    #[default]
    Idle,
    /// Prompt sent, nothing received
    AwaitingFirstToken,
    /// Answer text arriving
    Streaming,
    /// Inside an open thinking block
    Thinking,
    /// Model finished
    Complete,
    /// Stopped by the user
    Cancelled,
    /// Failed; partial content kept
    Errored,
}

impl TurnPhase {
    /// True while the backend is still producing this turn
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::AwaitingFirstToken | Self::Streaming | Self::Thinking
        )
    }

    /// True once the turn has ended
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Errored)
    }

    /// Avatar mood for this phase
    #[must_use]
    pub fn avatar_mood(self) -> AvatarMood {
        AvatarMood::for_phase(self)
    }
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingFirstToken => "awaiting first token",
            Self::Streaming => "streaming",
            Self::Thinking => "thinking",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Result of applying an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The turn changed
    Applied,
    /// The event did not apply in the current phase
    Ignored,
}

/// Flags a view needs to render the turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFlags {
    /// Waiting for the first token
    pub loading: bool,
    /// Inside an open thinking block
    pub thinking: bool,
    /// Answer text arriving
    pub streaming: bool,
    /// A tool is running
    pub tool_active: bool,
    /// The chat bubble has something to show
    pub bubble_visible: bool,
    /// A new prompt may be submitted
    pub can_submit: bool,
    /// The stop control is enabled
    pub can_stop: bool,
    /// Avatar mood
    pub mood: AvatarMood,
}

/// A single prompt/response exchange
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationTurn {
    raw_content: String,
    parts: Vec<MessagePart>,
    phase: TurnPhase,
    current_tool: Option<String>,
    error_message: Option<String>,
}

impl ConversationTurn {
    /// Create an idle turn
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Accumulated response text, delimiters included
    #[must_use]
    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    /// Parsed view of [`Self::raw_content`]
    #[must_use]
    pub fn parts(&self) -> &[MessagePart] {
        &self.parts
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Tool currently executing
    #[must_use]
    pub fn current_tool(&self) -> Option<&str> {
        self.current_tool.as_deref()
    }

    /// Error shown alongside the content
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Derived rendering flags
    #[must_use]
    pub fn flags(&self) -> TurnFlags {
        let active = self.phase.is_active();
        TurnFlags {
            loading: self.phase == TurnPhase::AwaitingFirstToken,
            thinking: self.phase == TurnPhase::Thinking,
            streaming: self.phase == TurnPhase::Streaming,
            tool_active: self.current_tool.is_some(),
            bubble_visible: active
                || !self.raw_content.is_empty()
                || self.current_tool.is_some()
                || self.error_message.is_some(),
            can_submit: !active,
            can_stop: active,
            mood: self.phase.avatar_mood(),
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Start a new turn, discarding the previous one
    pub fn begin(&mut self) {
        self.raw_content.clear();
        self.parts.clear();
        self.current_tool = None;
        self.error_message = None;
        self.phase = TurnPhase::AwaitingFirstToken;
    }

    /// Apply a backend event
    pub fn apply(&mut self, event: &BackendEvent) -> Transition {
        match event {
            BackendEvent::Chunk(text) => self.push_chunk(text),
            BackendEvent::ToolCall(name) => self.set_tool(name),
            BackendEvent::Complete => self.complete(),
            BackendEvent::Error(message) => self.fail(message),
            BackendEvent::Cancelled => self.cancel(),
            BackendEvent::Suggestion(NEW_TURN_SENTINEL) => {
                self.begin();
                Transition::Applied
            }
            // Session ids and config reloads are the controller's business
            BackendEvent::Suggestion(_) | BackendEvent::ConfigChanged => Transition::Ignored,
        }
    }

    /// Append streamed text
    pub fn push_chunk(&mut self, text: &str) -> Transition {
        if !self.phase.is_active() || text.is_empty() {
            return Transition::Ignored;
        }

        self.raw_content.push_str(text);
        self.reparse();
        Transition::Applied
    }

    /// Set the running tool; an empty name clears it
    pub fn set_tool(&mut self, name: &str) -> Transition {
        if !self.phase.is_active() {
            return Transition::Ignored;
        }

        self.current_tool = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
        Transition::Applied
    }

    /// Finish the turn normally
    pub fn complete(&mut self) -> Transition {
        if !self.phase.is_active() {
            return Transition::Ignored;
        }

        self.current_tool = None;
        self.phase = TurnPhase::Complete;
        Transition::Applied
    }

    /// Fail the turn, keeping whatever arrived
    ///
    /// Applies in every phase.
    pub fn fail(&mut self, message: &str) -> Transition {
        self.error_message = Some(message.to_string());
        self.current_tool = None;
        self.phase = TurnPhase::Errored;
        Transition::Applied
    }

    /// Mark the turn stopped by the user
    ///
    /// An open reasoning block is closed first so the notice renders as
    /// answer text.
    pub fn cancel(&mut self) -> Transition {
        if !self.phase.is_active() {
            return Transition::Ignored;
        }

        if self.parts.last().is_some_and(MessagePart::is_open_thinking) {
            self.raw_content.push_str(THINK_CLOSE);
        }
        if self.raw_content.is_empty() {
            self.raw_content.push_str(STOPPED_BY_USER_NOTICE);
        } else {
            self.raw_content.push_str("\n\n");
            self.raw_content.push_str(STOPPED_BY_USER_NOTICE);
        }
        self.parts = parser::parse(&self.raw_content);
        self.current_tool = None;
        self.phase = TurnPhase::Cancelled;
        Transition::Applied
    }

    fn reparse(&mut self) {
        self.parts = parser::parse(&self.raw_content);
        self.phase = if self.parts.last().is_some_and(MessagePart::is_open_thinking) {
            TurnPhase::Thinking
        } else {
            TurnPhase::Streaming
        };
    }
}
