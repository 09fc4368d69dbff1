//! Script Runner
//!
//! Feeds a parsed script through an [`AvatarController`] wired to an
//! [`InProcessBridge`], and collects what happened at each step.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use avatar_conductor::{
    AvatarConfig, AvatarController, BridgeCommand, EventOutcome, InProcessBridge, TurnSnapshot,
    WindowDimensions, WindowGeometry,
};

use crate::script::Step;

/// What one step did
#[derive(Debug, Serialize)]
pub struct StepRecord {
    /// Position in the script, from zero
    pub index: usize,
    /// Step name
    pub op: &'static str,
    /// Error the controller returned, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Outcomes of events applied during the step
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventOutcome>,
    /// Window size pushed during the step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resized: Option<WindowDimensions>,
}

impl StepRecord {
    fn new(index: usize, op: &'static str) -> Self {
        Self {
            index,
            op,
            error: None,
            events: Vec::new(),
            resized: None,
        }
    }
}

/// Result of a whole replay
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    /// Per-step records
    pub steps: Vec<StepRecord>,
    /// Final controller state
    pub snapshot: TurnSnapshot,
    /// Every command the controller sent to the backend
    pub commands: Vec<BridgeCommand>,
    /// Number of configuration reloads triggered by the backend
    pub config_reloads: usize,
    /// Final on-screen window, if the script placed one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowGeometry>,
}

/// Run `steps` against a fresh controller
///
/// `reload` is called whenever the backend signals a configuration change.
/// A failed reload is logged and the previous configuration kept.
pub async fn run_script<F>(steps: &[Step], config: AvatarConfig, reload: F) -> Result<ReplayReport>
where
    F: Fn() -> Result<AvatarConfig>,
{
    let bridge = Arc::new(InProcessBridge::new());
    let mut controller = AvatarController::new(bridge.clone(), config);
    let report = controller.mount(bridge.clone());
    if !report.is_complete() {
        warn!(failed = ?report.failed, "Some topics are not subscribed");
    }

    let mut records = Vec::with_capacity(steps.len());
    let mut config_reloads = 0;

    for (index, step) in steps.iter().enumerate() {
        debug!(index, op = step.op(), "Replaying step");
        let mut record = StepRecord::new(index, step.op());

        match step {
            Step::Submit { prompt } => {
                if let Err(e) = controller.submit_prompt(prompt).await {
                    record.error = Some(e.to_string());
                }
            }
            Step::Emit { topic, payload } => {
                bridge.emit(*topic, payload);
            }
            Step::Stop => {
                if let Err(e) = controller.stop().await {
                    record.error = Some(e.to_string());
                }
            }
            Step::Measure { height } => {
                record.resized = controller.content_measured(*height).await;
            }
            Step::Settle { height } => {
                if let Some(height) = height {
                    controller.record_measurement(*height);
                }
                record.resized = controller.settle_and_resize().await;
            }
            Step::NewSession => controller.new_session().await,
            Step::OpenSettings => controller.open_settings().await,
            Step::Place {
                x,
                y,
                width,
                height,
            } => bridge.place_window(WindowGeometry {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            }),
            Step::RejectNext { command, message } => {
                bridge.reject_next(*command, message.clone());
            }
        }

        record.events = controller.drain_pending().await;

        if record.events.contains(&EventOutcome::ConfigReloadRequested) {
            match reload() {
                Ok(config) => {
                    config_reloads += 1;
                    if let Some(dims) = controller.apply_config(config).await {
                        record.resized = Some(dims);
                    }
                }
                Err(e) => warn!(error = %e, "Config reload failed, keeping previous"),
            }
        }

        records.push(record);
    }

    info!(
        steps = records.len(),
        phase = %controller.turn().phase(),
        "Replay finished"
    );

    Ok(ReplayReport {
        steps: records,
        snapshot: controller.snapshot(),
        commands: bridge.commands(),
        config_reloads,
        window: bridge.window(),
    })
}
