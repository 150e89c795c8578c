//! Event types for reporting workflow execution progress
//!
//! Events are sent from the scene to the host (or any consumer) as the
//! execution cursor moves through the resolved order.

use serde::{Deserialize, Serialize};

use crate::types::StepId;

/// Trait for sending workflow events
///
/// This abstracts over the transport mechanism (channel, log, UI bridge)
/// so the engine can be embedded in different hosts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted while a workflow runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// The cursor left idle and a run began
    #[serde(rename_all = "camelCase")]
    ExecutionStarted { step_count: usize },

    /// A step was handed its input and told to execute
    #[serde(rename_all = "camelCase")]
    StepStarted {
        step: StepId,
        index: usize,
        name: String,
        identifier: String,
    },

    /// A step reported completion
    #[serde(rename_all = "camelCase")]
    StepCompleted { step: StepId },

    /// The cursor passed the last step and returned to idle
    ExecutionCompleted,

    /// The run was abandoned by the host
    #[serde(rename_all = "camelCase")]
    ExecutionAborted { index: usize },
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Event sink that writes every event to the log
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        match &event {
            WorkflowEvent::StepStarted {
                index,
                name,
                identifier,
                ..
            } => log::info!("Executing step {} '{}' ({})", index, name, identifier),
            other => log::info!("{:?}", other),
        }
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}
