//! Dependency graph and execution cursor
//!
//! The graph is derived from the scene's connections every time it is
//! needed and is never persisted. It resolves a linear execution order
//! with Kahn's algorithm and keeps a single cursor into that order.
//!
//! A connection set containing a cycle has no valid order; it resolves to
//! an empty order rather than an error. A simple chain is just the
//! degenerate case of the same algorithm.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::types::{Connection, StepId};

/// Outcome of resolving the connection set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphStatus {
    /// There are no connections
    Empty,
    /// Every connected step has a place in the order
    Ordered,
    /// Connections exist but contain a cycle
    Ungraphable,
}

/// Result of moving the cursor forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The step at `index` should execute, fed by `previous` if any
    Dispatch {
        index: usize,
        step: StepId,
        previous: Option<StepId>,
    },
    /// The cursor ran off the end of the order and is idle again
    Finished,
}

/// Adjacency, resolved order and execution cursor
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    adjacency: BTreeMap<StepId, Vec<StepId>>,
    order: Vec<StepId>,
    connection_count: usize,
    cursor: Option<usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild adjacency and order from the current connections
    ///
    /// The cursor is left untouched.
    pub fn recompute<'a, I>(&mut self, connections: I)
    where
        I: IntoIterator<Item = &'a Connection>,
    {
        let mut adjacency: BTreeMap<StepId, Vec<StepId>> = BTreeMap::new();
        let mut nodes = Vec::new();
        let mut connection_count = 0;

        for connection in connections {
            adjacency
                .entry(connection.source)
                .or_default()
                .push(connection.destination);
            for node in [connection.source, connection.destination] {
                if !nodes.contains(&node) {
                    nodes.push(node);
                }
            }
            connection_count += 1;
        }

        self.order = resolve_order(&adjacency, &nodes);
        self.adjacency = adjacency;
        self.connection_count = connection_count;
    }

    /// Downstream steps keyed by source
    pub fn adjacency(&self) -> &BTreeMap<StepId, Vec<StepId>> {
        &self.adjacency
    }

    /// Resolved execution order (empty if the graph is cyclic)
    pub fn order(&self) -> &[StepId] {
        &self.order
    }

    pub fn status(&self) -> GraphStatus {
        if self.connection_count == 0 {
            GraphStatus::Empty
        } else if self.order.is_empty() {
            GraphStatus::Ungraphable
        } else {
            GraphStatus::Ordered
        }
    }

    /// Cursor position, `-1` when idle
    pub fn cursor(&self) -> isize {
        self.cursor.map_or(-1, |c| c as isize)
    }

    pub fn is_idle(&self) -> bool {
        self.cursor.is_none()
    }

    /// Step under the cursor
    pub fn current(&self) -> Option<StepId> {
        self.cursor.and_then(|c| self.order.get(c).copied())
    }

    /// Return the cursor to idle
    pub fn reset(&mut self) {
        self.cursor = None;
    }

    /// Whether a fresh run may start
    ///
    /// The order must be resolvable (or there must be nothing to order),
    /// every step in it configured, and no run in progress.
    pub fn can_execute(&self, is_configured: impl Fn(StepId) -> bool) -> bool {
        if !self.is_idle() {
            return false;
        }
        match self.status() {
            GraphStatus::Empty => true,
            GraphStatus::Ungraphable => false,
            GraphStatus::Ordered => self.order.iter().all(|&step| is_configured(step)),
        }
    }

    /// Move the cursor one step forward
    pub fn advance(&mut self) -> Advance {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next >= self.order.len() {
            self.cursor = None;
            return Advance::Finished;
        }

        self.cursor = Some(next);
        Advance::Dispatch {
            index: next,
            step: self.order[next],
            previous: next.checked_sub(1).map(|p| self.order[p]),
        }
    }
}

/// Kahn's algorithm over an adjacency map
///
/// `nodes` lists every connected step in first-appearance order, which
/// fixes the order the starting set is seeded in. Returns an empty order
/// when edges remain after the worklist drains.
fn resolve_order(adjacency: &BTreeMap<StepId, Vec<StepId>>, nodes: &[StepId]) -> Vec<StepId> {
    let mut remaining = adjacency.clone();
    let mut in_degree: HashMap<StepId, usize> = nodes.iter().map(|&n| (n, 0)).collect();
    for destinations in adjacency.values() {
        for destination in destinations {
            *in_degree.entry(*destination).or_insert(0) += 1;
        }
    }

    let mut starting_set: VecDeque<StepId> = nodes
        .iter()
        .copied()
        .filter(|n| in_degree.get(n).copied().unwrap_or(0) == 0)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = starting_set.pop_front() {
        order.push(node);
        if let Some(destinations) = remaining.remove(&node) {
            for destination in destinations {
                if let Some(deg) = in_degree.get_mut(&destination) {
                    *deg -= 1;
                    if *deg == 0 {
                        starting_set.push_back(destination);
                    }
                }
            }
        }
    }

    if !remaining.is_empty() {
        log::debug!(
            "Connection graph is not orderable: {} sources left with edges",
            remaining.len()
        );
        return Vec::new();
    }

    order
}

/// Resolve an execution order directly from a connection set
pub fn topological_order<'a, I>(connections: I) -> Vec<StepId>
where
    I: IntoIterator<Item = &'a Connection>,
{
    let mut graph = DependencyGraph::new();
    graph.recompute(connections);
    graph.order
}
