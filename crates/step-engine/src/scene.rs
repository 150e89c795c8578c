//! Workflow scene
//!
//! The scene owns every step and connection of a workflow, keeps the
//! identifier index the steps consult, and drives execution one step at a
//! time through the [`DependencyGraph`] cursor.
//!
//! Execution is cooperative. [`WorkflowScene::execute`] dispatches the step
//! under the cursor and returns; the step signals completion through its
//! [`DoneExecution`] handle, and the host calls `execute` again once
//! [`WorkflowScene::wait_for_completion`] (or
//! [`WorkflowScene::try_completion`]) reports it. [`WorkflowScene::run`]
//! wraps the whole loop.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::{Result, WorkflowError};
use crate::events::{EventSink, NullEventSink, WorkflowEvent};
use crate::graph::{Advance, DependencyGraph, GraphStatus};
use crate::persistence::{ConnectionRecord, NodeRecord, SceneState};
use crate::registry::StepRegistry;
use crate::step::{identifier_occurs_count, Completion, DoneExecution, IdentifierCheck, Step, StepContext};
use crate::types::{Connection, ConnectionId, MetaStep, Position, StepId};

type IdentifierIndex = Arc<RwLock<BTreeMap<StepId, String>>>;

/// What a call to [`WorkflowScene::execute`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// The step at `index` of the order was started
    Dispatched { step: StepId, index: usize },
    /// Nothing left to run; the cursor is idle
    Finished,
}

/// Container of steps and connections for one workflow
pub struct WorkflowScene {
    steps: BTreeMap<StepId, MetaStep>,
    connections: BTreeMap<ConnectionId, Connection>,
    next_step: u64,
    next_connection: u64,
    identifiers: IdentifierIndex,
    graph: DependencyGraph,
    /// Bumped at the start of every run and on abort
    run: u64,
    /// Step whose handle was dropped unfinished, ending the last run
    abandoned: Option<StepId>,
    /// Changed since the last load or [`Self::mark_saved`]
    edited: bool,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    events: Arc<dyn EventSink>,
}

impl WorkflowScene {
    pub fn new() -> Self {
        Self::with_event_sink(Arc::new(NullEventSink))
    }

    /// Create a scene reporting execution progress to `events`
    pub fn with_event_sink(events: Arc<dyn EventSink>) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            steps: BTreeMap::new(),
            connections: BTreeMap::new(),
            next_step: 0,
            next_connection: 0,
            identifiers: Arc::new(RwLock::new(BTreeMap::new())),
            graph: DependencyGraph::new(),
            run: 0,
            abandoned: None,
            edited: false,
            completion_tx,
            completion_rx,
            events,
        }
    }

    pub fn set_event_sink(&mut self, events: Arc<dyn EventSink>) {
        self.events = events;
    }

    // ---- identifiers ----------------------------------------------------

    /// Uniqueness check backed by this scene's identifier index
    pub fn identifier_check(&self) -> IdentifierCheck {
        let index = Arc::clone(&self.identifiers);
        IdentifierCheck::new(move |identifier| {
            identifier_occurs_count(index.read().values().map(String::as_str), identifier)
        })
    }

    /// Context for constructing steps that will live in this scene
    pub fn step_context(&self, location: &Path) -> StepContext {
        StepContext::new(location, self.identifier_check())
    }

    /// How many steps use `identifier`, capped at 2 (empty counts as 2)
    pub fn identifier_occurs_count(&self, identifier: &str) -> usize {
        identifier_occurs_count(
            self.identifiers.read().values().map(String::as_str),
            identifier,
        )
    }

    fn sync_identifier(&self, id: StepId) {
        let mut index = self.identifiers.write();
        match self.steps.get(&id).map(|m| m.identifier()) {
            Some(identifier) if !identifier.is_empty() => {
                index.insert(id, identifier.to_string());
            }
            _ => {
                index.remove(&id);
            }
        }
    }

    /// Assign a new identifier to a step
    pub fn set_identifier(&mut self, id: StepId, identifier: &str) -> Result<()> {
        let current = self.step(id)?.identifier().to_string();
        if identifier != current && self.identifier_occurs_count(identifier) > 0 {
            return Err(if identifier.is_empty() {
                WorkflowError::InvalidIdentifier(identifier.to_string())
            } else {
                WorkflowError::IdentifierConflict(identifier.to_string())
            });
        }
        let result = self.meta_mut(id)?.step.set_identifier(identifier);
        self.sync_identifier(id);
        self.edited = true;
        result
    }

    /// Pass configuration to a step
    ///
    /// The identifier index is refreshed afterwards since configuration may
    /// rename the step.
    pub fn configure_step(&mut self, id: StepId, config: &serde_json::Value) -> Result<()> {
        let result = self.meta_mut(id)?.step.configure(config);
        self.sync_identifier(id);
        self.edited = true;
        match &result {
            Ok(()) => log::debug!("Configured {}", id),
            Err(e) => log::warn!("Configuring {} failed: {}", id, e),
        }
        result
    }

    // ---- steps ----------------------------------------------------------

    /// Add a step at the origin
    pub fn add_step(&mut self, step: Box<dyn Step>) -> Result<StepId> {
        self.add_step_at(step, Position::default())
    }

    /// Add a step at `position`
    ///
    /// Fails if the step already carries an identifier some other step uses.
    pub fn add_step_at(&mut self, step: Box<dyn Step>, position: Position) -> Result<StepId> {
        let identifier = step.identifier();
        if !identifier.is_empty() && self.identifier_occurs_count(identifier) > 0 {
            return Err(WorkflowError::IdentifierConflict(identifier.to_string()));
        }

        let id = StepId(self.next_step);
        self.next_step += 1;
        let mut meta = MetaStep::new(id, step);
        meta.position = position;
        log::debug!("Added {} '{}' as {}", meta.name(), meta.identifier(), id);
        self.steps.insert(id, meta);
        self.sync_identifier(id);
        self.edited = true;
        Ok(id)
    }

    /// Create a step from `registry` and add it
    pub fn create_step(
        &mut self,
        registry: &StepRegistry,
        name: &str,
        location: &Path,
        position: Position,
    ) -> Result<StepId> {
        let step = registry.create(name, self.step_context(location))?;
        self.add_step_at(step, position)
    }

    /// Remove a step and every connection touching it
    pub fn remove_step(&mut self, id: StepId) -> Result<Box<dyn Step>> {
        self.ensure_idle()?;
        let meta = self.steps.remove(&id).ok_or(WorkflowError::StepNotFound(id))?;
        self.connections.retain(|_, c| !c.is_incident_to(id));
        self.identifiers.write().remove(&id);
        self.edited = true;
        log::debug!("Removed {} '{}'", id, meta.name());
        Ok(meta.step)
    }

    pub fn step(&self, id: StepId) -> Result<&MetaStep> {
        self.steps.get(&id).ok_or(WorkflowError::StepNotFound(id))
    }

    /// Mutable access to a step; counts as an edit
    pub fn step_mut(&mut self, id: StepId) -> Result<&mut MetaStep> {
        let meta = self.steps.get_mut(&id).ok_or(WorkflowError::StepNotFound(id))?;
        self.edited = true;
        Ok(meta)
    }

    fn meta_mut(&mut self, id: StepId) -> Result<&mut MetaStep> {
        self.steps.get_mut(&id).ok_or(WorkflowError::StepNotFound(id))
    }

    /// Steps in insertion order
    pub fn steps(&self) -> impl Iterator<Item = &MetaStep> {
        self.steps.values()
    }

    /// Find a step by identifier
    pub fn find_step(&self, identifier: &str) -> Option<StepId> {
        self.identifiers
            .read()
            .iter()
            .find(|(_, candidate)| candidate.as_str() == identifier)
            .map(|(id, _)| *id)
    }

    pub fn set_position(&mut self, id: StepId, position: Position) -> Result<()> {
        self.meta_mut(id)?.position = position;
        self.edited = true;
        Ok(())
    }

    pub fn set_selected(&mut self, id: StepId, selected: bool) -> Result<()> {
        self.meta_mut(id)?.selected = selected;
        self.edited = true;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    // ---- connections ----------------------------------------------------

    /// Connect port `source_index` of `source` to port `destination_index`
    /// of `destination`
    pub fn connect(
        &mut self,
        source: StepId,
        source_index: usize,
        destination: StepId,
        destination_index: usize,
    ) -> Result<ConnectionId> {
        self.ensure_idle()?;
        if source == destination {
            return Err(WorkflowError::SelfConnection(source));
        }

        let source_ports = self.step(source)?.step().ports();
        let destination_ports = self.step(destination)?.step().ports();
        let source_port = source_ports.get(source_index).ok_or(WorkflowError::PortIndexOutOfRange {
            step: source,
            index: source_index,
            count: source_ports.len(),
        })?;
        let destination_port =
            destination_ports
                .get(destination_index)
                .ok_or(WorkflowError::PortIndexOutOfRange {
                    step: destination,
                    index: destination_index,
                    count: destination_ports.len(),
                })?;

        if !source_port.can_connect(destination_port) {
            return Err(WorkflowError::IncompatiblePorts {
                source_step: source,
                source_index,
                destination_step: destination,
                destination_index,
            });
        }

        Ok(self.insert_connection(source, source_index, destination, destination_index, false))
    }

    fn insert_connection(
        &mut self,
        source: StepId,
        source_index: usize,
        destination: StepId,
        destination_index: usize,
        selected: bool,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        self.connections.insert(
            id,
            Connection {
                id,
                source,
                source_index,
                destination,
                destination_index,
                selected,
            },
        );
        self.edited = true;
        log::debug!("Connected {}:{} -> {}:{}", source, source_index, destination, destination_index);
        id
    }

    pub fn remove_connection(&mut self, id: ConnectionId) -> Result<Connection> {
        self.ensure_idle()?;
        let connection = self
            .connections
            .remove(&id)
            .ok_or(WorkflowError::ConnectionNotFound(id))?;
        self.edited = true;
        Ok(connection)
    }

    pub fn connection(&self, id: ConnectionId) -> Result<&Connection> {
        self.connections
            .get(&id)
            .ok_or(WorkflowError::ConnectionNotFound(id))
    }

    pub fn set_connection_selected(&mut self, id: ConnectionId, selected: bool) -> Result<()> {
        self.connections
            .get_mut(&id)
            .ok_or(WorkflowError::ConnectionNotFound(id))?
            .selected = selected;
        self.edited = true;
        Ok(())
    }

    /// Connections in insertion order
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Remove every step and connection
    ///
    /// Any run in progress is abandoned.
    pub fn clear(&mut self) {
        if !self.graph.is_idle() {
            self.abort();
        }
        self.steps.clear();
        self.connections.clear();
        self.identifiers.write().clear();
        self.graph = DependencyGraph::new();
        self.edited = true;
    }

    /// Whether steps, connections or step configuration changed since the
    /// last load or [`Self::mark_saved`]
    ///
    /// Unlike [`Self::snapshot`] this also covers step configuration.
    pub fn is_edited(&self) -> bool {
        self.edited
    }

    /// Record that the current contents have been written out
    pub fn mark_saved(&mut self) {
        self.edited = false;
    }

    // ---- execution ------------------------------------------------------

    /// Dependency graph as last resolved
    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Re-resolve the graph from the current connections
    pub fn resolve(&mut self) -> &DependencyGraph {
        self.graph.recompute(self.connections.values());
        &self.graph
    }

    /// Current execution order
    pub fn execution_order(&mut self) -> Vec<StepId> {
        self.resolve().order().to_vec()
    }

    pub fn is_executing(&self) -> bool {
        !self.graph.is_idle()
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.graph.cursor() {
            cursor if cursor >= 0 => Err(WorkflowError::ExecutionInProgress(cursor as usize)),
            _ => Ok(()),
        }
    }

    /// Whether a run can start now
    pub fn can_execute(&mut self) -> bool {
        self.graph.recompute(self.connections.values());
        let steps = &self.steps;
        self.graph
            .can_execute(|id| steps.get(&id).is_some_and(|m| m.step.is_configured()))
    }

    /// Explain why [`Self::can_execute`] is false
    pub fn execution_problem(&mut self) -> Option<String> {
        if self.can_execute() {
            return None;
        }
        if self.is_executing() {
            return Some(format!("execution in progress at step {}", self.graph.cursor()));
        }
        if self.graph.status() == GraphStatus::Ungraphable {
            return Some("the connections contain a cycle".to_string());
        }
        let unconfigured: Vec<String> = self
            .graph
            .order()
            .iter()
            .filter_map(|id| self.steps.get(id))
            .filter(|m| !m.step.is_configured())
            .map(|m| format!("'{}' ({})", m.identifier(), m.name()))
            .collect();
        Some(format!("unconfigured steps: {}", unconfigured.join(", ")))
    }

    /// Advance the cursor and start the step under it
    ///
    /// The first call of a run starts the first step with no input; each
    /// later call feeds the next step with the previous step's output. The
    /// call after the last step returns [`Execution::Finished`] and leaves
    /// the cursor idle.
    pub fn execute(&mut self) -> Execution {
        let was_idle = self.graph.is_idle();
        self.graph.recompute(self.connections.values());

        match self.graph.advance() {
            Advance::Finished => {
                if !was_idle {
                    log::info!("Workflow execution complete");
                    self.emit(WorkflowEvent::ExecutionCompleted);
                }
                Execution::Finished
            }
            Advance::Dispatch {
                index,
                step,
                previous,
            } => {
                if index == 0 {
                    self.run += 1;
                    self.abandoned = None;
                    log::info!("Starting workflow run {} over {} steps", self.run, self.graph.order().len());
                    self.emit(WorkflowEvent::ExecutionStarted {
                        step_count: self.graph.order().len(),
                    });
                }

                let inputs = previous
                    .and_then(|p| self.steps.get(&p))
                    .and_then(|m| m.step.port_output());
                let done = DoneExecution::new(self.run, step, self.completion_tx.clone());

                let Some(meta) = self.steps.get_mut(&step) else {
                    log::error!("Order refers to missing {}; abandoning run", step);
                    self.graph.reset();
                    return Execution::Finished;
                };
                let event = WorkflowEvent::StepStarted {
                    step,
                    index,
                    name: meta.name().to_string(),
                    identifier: meta.identifier().to_string(),
                };
                meta.step.execute(inputs, done);
                self.emit(event);

                Execution::Dispatched { step, index }
            }
        }
    }

    /// Wait until the step under the cursor reports completion
    ///
    /// Completions from abandoned runs are discarded. Returns `None` when
    /// the scene is idle, or once the step under the cursor drops its
    /// handle unfinished (the run is aborted; see [`Self::abandoned_step`]).
    pub async fn wait_for_completion(&mut self) -> Option<StepId> {
        loop {
            let current = self.graph.current()?;
            let completion = self.completion_rx.recv().await?;
            if self.accept(completion, current) {
                return Some(completion.step);
            }
        }
    }

    /// Non-blocking variant of [`Self::wait_for_completion`]
    pub fn try_completion(&mut self) -> Option<StepId> {
        let current = self.graph.current()?;
        while let Ok(completion) = self.completion_rx.try_recv() {
            if self.accept(completion, current) {
                return Some(completion.step);
            }
        }
        None
    }

    fn accept(&mut self, completion: Completion, current: StepId) -> bool {
        if completion.run != self.run || completion.step != current {
            log::debug!(
                "Ignoring stale completion of {} from run {}",
                completion.step,
                completion.run
            );
            return false;
        }
        if !completion.finished {
            log::error!("{} stopped without finishing; abandoning run", completion.step);
            self.abandoned = Some(completion.step);
            self.abort();
            return false;
        }
        self.emit(WorkflowEvent::StepCompleted {
            step: completion.step,
        });
        true
    }

    /// Step that ended the last run by dropping its handle unfinished
    pub fn abandoned_step(&self) -> Option<StepId> {
        self.abandoned
    }

    /// Run the whole workflow, waiting on each step in turn
    ///
    /// Returns the number of steps executed.
    pub async fn run(&mut self) -> Result<usize> {
        if let Some(problem) = self.execution_problem() {
            return Err(WorkflowError::NotExecutable(problem));
        }
        self.abandoned = None;

        let mut executed = 0;
        loop {
            match self.execute() {
                Execution::Finished => return Ok(executed),
                Execution::Dispatched { .. } => {
                    executed += 1;
                    if self.wait_for_completion().await.is_none() {
                        return match self.abandoned {
                            Some(step) => Err(WorkflowError::StepAbandoned(step)),
                            None => Ok(executed),
                        };
                    }
                }
            }
        }
    }

    /// Abandon the run in progress
    ///
    /// Completions still in flight are discarded when they arrive.
    pub fn abort(&mut self) {
        if self.graph.is_idle() {
            return;
        }
        let index = self.graph.cursor() as usize;
        log::warn!("Aborting workflow run {} at step {}", self.run, index);
        self.graph.reset();
        self.run += 1;
        self.emit(WorkflowEvent::ExecutionAborted { index });
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Failed to deliver workflow event: {}", e);
        }
    }

    // ---- persistence ----------------------------------------------------

    /// Capture steps and connections in their persisted layout
    pub fn snapshot(&self) -> SceneState {
        let positions: BTreeMap<StepId, usize> = self
            .steps
            .keys()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();

        let nodelist = self
            .steps
            .values()
            .map(|meta| NodeRecord {
                name: meta.name().to_string(),
                position: meta.position,
                selected: meta.selected,
                identifier: meta.identifier().to_string(),
                connections: self
                    .connections
                    .values()
                    .filter(|c| c.source == meta.id)
                    .filter_map(|c| {
                        positions.get(&c.destination).map(|&to| ConnectionRecord {
                            connected_from_index: c.source_index,
                            connected_to: to,
                            connected_to_index: c.destination_index,
                            selected: c.selected,
                        })
                    })
                    .collect(),
            })
            .collect();

        SceneState::new(nodelist)
    }

    /// Snapshot the scene and let configured steps write their own files
    pub fn save_state(&self, location: &Path) -> Result<SceneState> {
        for meta in self.steps.values() {
            if meta.step.is_configured() {
                meta.step.serialize(location)?;
            }
        }
        Ok(self.snapshot())
    }

    /// Replace the scene's contents with `state`
    ///
    /// Steps are created from `registry`, then connections are restored.
    /// On any failure the scene is left empty.
    pub fn load_state(
        &mut self,
        state: &SceneState,
        location: &Path,
        registry: &StepRegistry,
    ) -> Result<()> {
        self.ensure_idle()?;
        self.clear();

        let result = self.restore(state, location, registry);
        match &result {
            Ok(()) => self.edited = false,
            Err(e) => {
                log::error!("Failed to load workflow state: {}", e);
                self.clear();
            }
        }
        result
    }

    fn restore(&mut self, state: &SceneState, location: &Path, registry: &StepRegistry) -> Result<()> {
        state.check_references()?;

        let mut ids = Vec::with_capacity(state.node_count());
        for record in &state.nodes.nodelist {
            let mut step = registry.create(&record.name, self.step_context(location))?;
            if step.has_identifier_config() && !record.identifier.is_empty() {
                step.set_identifier(&record.identifier)?;
            }

            let id = self.add_step_at(step, record.position)?;
            let meta = self.meta_mut(id)?;
            meta.selected = record.selected;
            meta.step.deserialize(location)?;
            self.sync_identifier(id);
            ids.push(id);
        }

        for (from, record) in state.nodes.nodelist.iter().enumerate() {
            for connection in &record.connections {
                self.insert_connection(
                    ids[from],
                    connection.connected_from_index,
                    ids[connection.connected_to],
                    connection.connected_to_index,
                    connection.selected,
                );
            }
        }

        log::info!(
            "Loaded {} steps and {} connections",
            self.steps.len(),
            self.connections.len()
        );
        Ok(())
    }
}

impl Default for WorkflowScene {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorkflowScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowScene")
            .field("steps", &self.steps.values().collect::<Vec<_>>())
            .field("connections", &self.connections.values().collect::<Vec<_>>())
            .field("cursor", &self.graph.cursor())
            .finish()
    }
}
