//! Error types for the step engine

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ConnectionId, StepId};

/// Result type alias using WorkflowError
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors that can occur while building, persisting or running a workflow
///
/// Structural problems with the connection set (cycles) are deliberately
/// not represented here: they surface as an empty execution order.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Another step already uses this identifier
    #[error("Identifier '{0}' is already used by another step")]
    IdentifierConflict(String),

    /// Identifier is empty or otherwise unusable
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// The step does not accept a user-assigned identifier
    #[error("Step '{0}' does not support identifier configuration")]
    IdentifierNotSupported(String),

    /// No step registered under this name
    #[error("Unknown step type: {0}")]
    UnknownStep(String),

    /// Step id not present in the scene
    #[error("Step not found: {0}")]
    StepNotFound(StepId),

    /// Connection id not present in the scene
    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// A connection may not start and end on the same step
    #[error("Cannot connect step {0} to itself")]
    SelfConnection(StepId),

    /// Port index does not exist on the step
    #[error("Port index {index} out of range for step {step} ({count} ports)")]
    PortIndexOutOfRange {
        step: StepId,
        index: usize,
        count: usize,
    },

    /// Source port does not provide anything the destination port uses
    #[error("Port {source_index} of step {source_step} cannot feed port {destination_index} of step {destination_step}")]
    IncompatiblePorts {
        source_step: StepId,
        source_index: usize,
        destination_step: StepId,
        destination_index: usize,
    },

    /// Invalid step configuration
    #[error("Invalid configuration for step '{step}': {message}")]
    InvalidConfiguration { step: String, message: String },

    /// Persisted workflow was written by an incompatible version
    #[error("Version mismatch in workflow: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    /// Workflow location does not exist
    #[error("Location does not exist: {0}")]
    LocationNotFound(PathBuf),

    /// Operation needs an open workflow
    #[error("No workflow is open")]
    NoWorkflowOpen,

    /// The connection set cannot change while a run is in progress
    #[error("Workflow is executing (cursor at {0})")]
    ExecutionInProgress(usize),

    /// A step dropped its completion handle without finishing
    #[error("Step {0} stopped without reporting completion")]
    StepAbandoned(StepId),

    /// The workflow has no valid order or a step is unconfigured
    #[error("Workflow cannot be executed: {0}")]
    NotExecutable(String),

    /// Persisted state is structurally invalid
    #[error("Malformed workflow state: {0}")]
    MalformedState(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    /// Create a malformed state error with a message
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedState(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            step: step.into(),
            message: message.into(),
        }
    }
}
