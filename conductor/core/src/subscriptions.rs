//! Event Subscriptions
//!
//! Attaches one listener per [`Topic`] to an [`EventSource`] and forwards
//! decoded events, in arrival order, into the controller's channel.
//!
//! # Lifecycle
//!
//! - `mount` subscribes every topic once; mounting again is a no-op
//! - a topic that fails to subscribe is logged and skipped, the rest continue
//! - `unmount` releases every held token exactly once, and runs on drop

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::bridge::{BackendEvent, EventHandler, EventSource, SubscriptionToken, Topic};

/// Outcome of a mount
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MountReport {
    /// Topics now subscribed
    pub subscribed: Vec<Topic>,
    /// Topics that could not be subscribed
    pub failed: Vec<Topic>,
}

impl MountReport {
    /// True if every topic subscribed
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Mounted {
    source: Arc<dyn EventSource>,
    tokens: Vec<(Topic, SubscriptionToken)>,
    failed: Vec<Topic>,
}

/// Owns the subscriptions of one controller
#[derive(Default)]
pub struct SubscriptionManager {
    mounted: Option<Mounted>,
}

impl SubscriptionManager {
    /// Create an unmounted manager
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every topic on `source`, forwarding into `sink`
    ///
    /// If already mounted, nothing is subscribed and the report is empty.
    pub fn mount(
        &mut self,
        source: Arc<dyn EventSource>,
        sink: mpsc::UnboundedSender<BackendEvent>,
    ) -> MountReport {
        if self.mounted.is_some() {
            tracing::debug!("Subscriptions already mounted");
            return MountReport::default();
        }

        let mut tokens = Vec::with_capacity(Topic::ALL.len());
        let mut report = MountReport::default();

        for topic in Topic::ALL {
            match source.subscribe(topic, forwarder(topic, sink.clone())) {
                Ok(token) => {
                    tracing::debug!(%topic, %token, "Subscribed");
                    tokens.push((topic, token));
                    report.subscribed.push(topic);
                }
                Err(e) => {
                    tracing::warn!(%topic, error = %e, "Subscription failed, feature degraded");
                    report.failed.push(topic);
                }
            }
        }

        self.mounted = Some(Mounted {
            source,
            tokens,
            failed: report.failed.clone(),
        });
        report
    }

    /// Release every held subscription
    ///
    /// Returns the number of tokens released; zero if not mounted.
    pub fn unmount(&mut self) -> usize {
        let Some(mounted) = self.mounted.take() else {
            return 0;
        };

        for (topic, token) in &mounted.tokens {
            tracing::debug!(%topic, %token, "Unsubscribing");
            mounted.source.unsubscribe(*token);
        }
        mounted.tokens.len()
    }

    /// Whether `mount` has run and `unmount` has not
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    /// Topics currently subscribed
    #[must_use]
    pub fn active_topics(&self) -> Vec<Topic> {
        self.mounted
            .as_ref()
            .map(|m| m.tokens.iter().map(|(topic, _)| *topic).collect())
            .unwrap_or_default()
    }

    /// Topics that failed on the last mount
    #[must_use]
    pub fn failed_topics(&self) -> &[Topic] {
        match &self.mounted {
            Some(mounted) => &mounted.failed,
            None => &[],
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("active_topics", &self.active_topics())
            .field("failed_topics", &self.failed_topics())
            .finish()
    }
}

/// Handler that decodes payloads on `topic` and sends them to `sink`
fn forwarder(topic: Topic, sink: mpsc::UnboundedSender<BackendEvent>) -> EventHandler {
    Arc::new(move |payload: Value| match BackendEvent::from_payload(topic, &payload) {
        Ok(event) => {
            if sink.send(event).is_err() {
                tracing::debug!(%topic, "Controller gone, dropping event");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Dropping undecodable event"),
    })
}
