//! Backend Bridge
//!
//! The native backend is reached through two channels:
//! - [`CommandBridge`]: asynchronous request/response commands (`call_model`,
//!   `stop_model`, `resize_avatar_window`, `create_main_window`)
//! - [`EventSource`]: fire-and-forget push events grouped by [`Topic`]
//!
//! # Design Philosophy
//!
//! Both channels are traits so the controller never touches a real backend
//! directly. The desktop host implements them over its IPC layer; tests and
//! the replay tool use [`InProcessBridge`], which records every command and
//! lets callers emit synthetic events.

pub mod events;
pub mod in_process;
pub mod traits;

// Re-exports for convenience
pub use events::{BackendEvent, Topic};
pub use in_process::{BridgeCommand, CommandKind, InProcessBridge};
pub use traits::{
    BridgeError, CommandBridge, EventHandler, EventSource, SessionId, SubscriptionToken,
};
