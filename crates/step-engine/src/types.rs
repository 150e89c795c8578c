//! Core types for workflow graphs
//!
//! These types define the entities a scene holds: steps wrapped with
//! their graph-only state, and directed connections between step ports.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::step::Step;

/// Stable identifier of a step within a scene
///
/// Ids are handed out in increasing order and never reused, so ordering
/// by id is insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepId(pub u64);

/// Stable identifier of a connection within a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step-{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection-{}", self.0)
    }
}

/// Position on the canvas (x, y)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position(pub f64, pub f64);

impl Position {
    pub fn x(&self) -> f64 {
        self.0
    }

    pub fn y(&self) -> f64 {
        self.1
    }
}

impl From<(f64, f64)> for Position {
    fn from((x, y): (f64, f64)) -> Self {
        Self(x, y)
    }
}

/// A step plus its graph presentation state
pub struct MetaStep {
    pub(crate) id: StepId,
    pub(crate) step: Box<dyn Step>,
    pub position: Position,
    pub selected: bool,
}

impl MetaStep {
    pub(crate) fn new(id: StepId, step: Box<dyn Step>) -> Self {
        Self {
            id,
            step,
            position: Position::default(),
            selected: true,
        }
    }

    pub fn id(&self) -> StepId {
        self.id
    }

    pub fn step(&self) -> &dyn Step {
        self.step.as_ref()
    }

    /// Mutable access to the step
    ///
    /// Identifier changes should go through the scene so its identifier
    /// index stays in sync.
    pub fn step_mut(&mut self) -> &mut dyn Step {
        self.step.as_mut()
    }

    pub fn name(&self) -> &str {
        self.step.name()
    }

    pub fn identifier(&self) -> &str {
        self.step.identifier()
    }
}

impl fmt::Debug for MetaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaStep")
            .field("id", &self.id)
            .field("name", &self.step.name())
            .field("identifier", &self.step.identifier())
            .field("configured", &self.step.is_configured())
            .field("position", &self.position)
            .field("selected", &self.selected)
            .finish()
    }
}

/// A directed edge between a port on one step and a port on another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub(crate) id: ConnectionId,
    /// Step whose port provides the data
    pub source: StepId,
    /// Index of the port on the source step
    pub source_index: usize,
    /// Step whose port uses the data
    pub destination: StepId,
    /// Index of the port on the destination step
    pub destination_index: usize,
    pub selected: bool,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether this connection touches the given step
    pub fn is_incident_to(&self, step: StepId) -> bool {
        self.source == step || self.destination == step
    }
}
