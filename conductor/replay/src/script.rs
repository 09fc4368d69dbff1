//! Replay Scripts
//!
//! A script is JSON lines, one step per line. Blank lines and lines starting
//! with `#` are skipped.
//!
//! ```text
//! # backend thinks, answers, finishes
//! {"op": "place", "x": 1200, "y": 700, "width": 200, "height": 200}
//! {"op": "submit", "prompt": "why is the sky blue?"}
//! {"op": "emit", "topic": "call-chunk", "payload": "<think>scattering</think>"}
//! {"op": "emit", "topic": "call-chunk", "payload": "Short wavelengths scatter more."}
//! {"op": "measure", "height": 96}
//! {"op": "emit", "topic": "call-complete"}
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use avatar_conductor::{CommandKind, Topic};

/// One scripted action
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Step {
    /// User submits a prompt
    Submit {
        /// Prompt text
        prompt: String,
    },
    /// Backend pushes an event
    Emit {
        /// Event topic
        topic: Topic,
        /// Raw payload; `null` when omitted
        #[serde(default)]
        payload: Value,
    },
    /// User presses stop
    Stop,
    /// View reports the bubble's laid-out height
    Measure {
        /// Content height in logical pixels
        height: f64,
    },
    /// Record a height without a layout-settled signal, then wait and resize
    Settle {
        /// Content height recorded before waiting, if any
        #[serde(default)]
        height: Option<f64>,
    },
    /// User starts a new conversation
    NewSession,
    /// User opens the settings window
    OpenSettings,
    /// Host puts the avatar window on screen
    Place {
        /// Left edge
        x: f64,
        /// Top edge
        y: f64,
        /// Width
        width: f64,
        /// Height
        height: f64,
    },
    /// Backend will reject the next command of this kind
    RejectNext {
        /// Command to reject
        command: CommandKind,
        /// Rejection message
        message: String,
    },
}

impl Step {
    /// Short name of the step, as written in scripts
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::Submit { .. } => "submit",
            Self::Emit { .. } => "emit",
            Self::Stop => "stop",
            Self::Measure { .. } => "measure",
            Self::Settle { .. } => "settle",
            Self::NewSession => "new-session",
            Self::OpenSettings => "open-settings",
            Self::Place { .. } => "place",
            Self::RejectNext { .. } => "reject-next",
        }
    }
}

/// Parse a JSON-lines script
pub fn parse_script(input: &str) -> Result<Vec<Step>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line.trim())
                .with_context(|| format!("invalid step on line {}", index + 1))
        })
        .collect()
}
