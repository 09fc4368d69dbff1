//! Avatar Conductor - Session Controller for the Avatar Overlay
//!
//! This crate turns the events a native model backend pushes while answering
//! a prompt into one coherent conversation-turn state for the avatar overlay,
//! and keeps the overlay window sized to its chat bubble. It knows nothing
//! about rendering; any view can drive it and read back [`TurnSnapshot`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Native Backend                            │
//! │   CommandBridge (request/response)     EventSource (push topics) │
//! └──────────────┬────────────────────────────────┬──────────────────┘
//!                │ call_model / stop_model        │ call-chunk, tool-call,
//!                │ resize_avatar_window           │ call-complete, error, ...
//!                │                                ▼
//! ┌──────────────┼──────────────────┐   ┌──────────────────────────────┐
//! │              │                  │   │     SubscriptionManager      │
//! │      AvatarController ◀─────────┼───│  one handler per topic ──▶   │
//! │   ┌──────────────────────────┐  │   │  mpsc::UnboundedSender       │
//! │   │ ConversationTurn         │  │   └──────────────────────────────┘
//! │   │   parser::parse          │  │
//! │   │ SizingReactor            │  │
//! │   └──────────────────────────┘  │
//! └─────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`AvatarController`]: owns the turn, gates prompts, routes events
//! - [`ConversationTurn`]: the turn state machine
//! - [`parser::parse`]: raw model output to [`MessagePart`]s
//! - [`SizingReactor`]: window sizing with duplicate suppression
//! - [`InProcessBridge`]: in-process backend for tests and replays
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use avatar_conductor::{AvatarController, BackendEvent, InProcessBridge, load_config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bridge = Arc::new(InProcessBridge::new());
//!     let mut controller = AvatarController::new(bridge.clone(), load_config()?);
//!     controller.mount(bridge.clone());
//!
//!     controller.submit_prompt("What's the weather?").await?;
//!     bridge.emit_event(&BackendEvent::Chunk("Sunny.".into()));
//!     bridge.emit_event(&BackendEvent::Complete);
//!     controller.drain_pending().await;
//!
//!     println!("{}", serde_json::to_string_pretty(&controller.snapshot())?);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod avatar;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod parser;
pub mod sizing;
pub mod subscriptions;
pub mod turn;

pub use avatar::AvatarMood;
pub use bridge::{
    BackendEvent, BridgeCommand, BridgeError, CommandBridge, CommandKind, EventHandler,
    EventSource, InProcessBridge, SessionId, SubscriptionToken, Topic,
};
pub use config::{
    default_config_path, load_config, load_config_from_path, AvatarConfig, ConfigError,
    ConfigOverrides, ConfigSource,
};
pub use controller::{AvatarController, ControllerError, EventOutcome, TurnSnapshot};
pub use parser::{is_currently_thinking, parse, BlockKind, MessagePart};
pub use sizing::{compute_size, SizingConfig, SizingReactor, WindowDimensions, WindowGeometry};
pub use subscriptions::{MountReport, SubscriptionManager};
pub use turn::{ConversationTurn, Transition, TurnFlags, TurnPhase, STOPPED_BY_USER_NOTICE};
