//! Step Engine - Dependency-ordered workflow execution for Stepflow
//!
//! A workflow is a set of pluggable steps joined by connections between
//! their ports. This crate provides:
//!
//! - Semantic ports described by RDF-style triples, matched on what one
//!   port provides and another uses
//! - A scene owning steps and connections, with workflow-unique step
//!   identifiers
//! - Kahn ordering of the connection graph and a cursor that runs one step
//!   at a time, handing each step the previous step's output
//! - Save/load of the scene as JSON, with steps persisting their own
//!   configuration beside it
//! - A manager for the workflow directory lifecycle
//!
//! # Architecture
//!
//! - `Step`: trait implemented by step plugins, registered by name in a
//!   `StepRegistry` (plugins submit themselves through `inventory`)
//! - `WorkflowScene`: owns steps and connections, drives execution
//! - `DependencyGraph`: recomputed from the connections on demand, holds the
//!   execution cursor
//! - `EventSink`: execution progress reporting, independent of any host
//!
//! # Example
//!
//! ```ignore
//! use step_engine::{StepRegistry, WorkflowManager};
//!
//! let mut manager = WorkflowManager::new(Arc::new(StepRegistry::with_builtins()));
//! manager.load(Path::new("my-workflow"))?;
//! let executed = manager.execute().await?;
//! ```

pub mod builder;
pub mod error;
pub mod events;
pub mod graph;
pub mod manager;
pub mod persistence;
pub mod port;
pub mod registry;
pub mod scene;
pub mod settings;
pub mod step;
pub mod types;
pub mod validation;

#[cfg(test)]
mod test_support;

// Re-export key types
pub use builder::SceneBuilder;
pub use error::{Result, WorkflowError};
pub use events::{EventSink, LogEventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use graph::{DependencyGraph, GraphStatus};
pub use manager::{ExecutionBlocker, WorkflowManager, WORKFLOW_FILE};
pub use persistence::{SceneState, WORKFLOW_VERSION};
pub use port::{Polarity, Port, Triple};
pub use registry::{StepFactory, StepRegistration, StepRegistry};
pub use scene::{Execution, WorkflowScene};
pub use settings::{Settings, SettingsError};
pub use step::{DoneExecution, IdentifierCheck, PortData, Step, StepContext, StepCore};
pub use types::{Connection, ConnectionId, MetaStep, Position, StepId};
pub use validation::{validate_scene, ValidationError};
