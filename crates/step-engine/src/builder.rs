//! Fluent builder for scene states
//!
//! Builds the persisted layout directly so the result can be written to
//! disk or loaded into a [`WorkflowScene`](crate::WorkflowScene).

use crate::error::{Result, WorkflowError};
use crate::persistence::{ConnectionRecord, NodeRecord, SceneState};

struct PendingConnection {
    source: String,
    source_index: usize,
    destination: String,
    destination_index: usize,
}

/// Fluent builder for [`SceneState`]
///
/// Steps are referred to by their identifier.
///
/// # Example
///
/// ```ignore
/// let state = SceneBuilder::new()
///     .add_step("Text Source", "greeting", (0.0, 0.0))
///     .add_step("Text Store", "saved", (200.0, 0.0))
///     .connect("greeting", 0, "saved", 0)
///     .build()?;
/// ```
#[derive(Default)]
pub struct SceneBuilder {
    nodes: Vec<NodeRecord>,
    connections: Vec<PendingConnection>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step of type `name` with `identifier`
    pub fn add_step(
        mut self,
        name: impl Into<String>,
        identifier: impl Into<String>,
        position: (f64, f64),
    ) -> Self {
        self.nodes.push(NodeRecord {
            name: name.into(),
            position: position.into(),
            selected: false,
            identifier: identifier.into(),
            connections: Vec::new(),
        });
        self
    }

    /// Mark the most recently added step as selected
    pub fn selected(mut self) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.selected = true;
        }
        self
    }

    /// Connect two steps by identifier and port index
    pub fn connect(
        mut self,
        source: impl Into<String>,
        source_index: usize,
        destination: impl Into<String>,
        destination_index: usize,
    ) -> Self {
        self.connections.push(PendingConnection {
            source: source.into(),
            source_index,
            destination: destination.into(),
            destination_index,
        });
        self
    }

    /// Resolve identifiers and produce the state
    pub fn build(mut self) -> Result<SceneState> {
        let position_of = |nodes: &[NodeRecord], identifier: &str| {
            nodes
                .iter()
                .position(|n| n.identifier == identifier)
                .ok_or_else(|| WorkflowError::malformed(format!("no step with identifier '{}'", identifier)))
        };

        for pending in &self.connections {
            let from = position_of(&self.nodes, &pending.source)?;
            let to = position_of(&self.nodes, &pending.destination)?;
            self.nodes[from].connections.push(ConnectionRecord {
                connected_from_index: pending.source_index,
                connected_to: to,
                connected_to_index: pending.destination_index,
                selected: false,
            });
        }

        let state = SceneState::new(self.nodes);
        state.check_references()?;
        Ok(state)
    }
}
