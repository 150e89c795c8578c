//! Step abstraction
//!
//! A step is a pluggable unit of work with typed ports, a configuration
//! status and an execute/produce-output contract. Concrete steps embed a
//! [`StepCore`] and implement [`Step`]; most trait methods have default
//! bodies that read the core.
//!
//! Execution is asynchronous by contract: [`Step::execute`] starts the work
//! and the step reports back through the [`DoneExecution`] handle whenever
//! it has finished, which may be immediately or much later.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{Result, WorkflowError};
use crate::port::{Polarity, Port, Triple};
use crate::types::StepId;

/// Data exchanged between steps
///
/// Steps with several provides ports hand over a JSON array ordered like
/// those ports.
pub type PortData = serde_json::Value;

/// Default category for steps that do not declare one
pub const DEFAULT_CATEGORY: &str = "General";

/// Count how many of `identifiers` equal `identifier`
///
/// The count stops at two: callers only need to know whether an identifier
/// is unique. An empty identifier is always reported as 2 (invalid).
pub fn identifier_occurs_count<'a, I>(identifiers: I, identifier: &str) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    if identifier.is_empty() {
        return 2;
    }

    let mut count = 0;
    for candidate in identifiers {
        if candidate == identifier {
            count += 1;
            if count > 1 {
                return count;
            }
        }
    }
    count
}

/// Workflow-wide identifier uniqueness check, injected into every step
#[derive(Clone)]
pub struct IdentifierCheck(Arc<dyn Fn(&str) -> usize + Send + Sync>);

impl IdentifierCheck {
    pub fn new(check: impl Fn(&str) -> usize + Send + Sync + 'static) -> Self {
        Self(Arc::new(check))
    }

    /// A check that knows no other steps (every non-empty identifier is free)
    pub fn unrestricted() -> Self {
        Self::new(|identifier| identifier_occurs_count(std::iter::empty(), identifier))
    }

    /// Number of steps already using `identifier`, capped at 2
    pub fn occurs_count(&self, identifier: &str) -> usize {
        (self.0)(identifier)
    }
}

impl Default for IdentifierCheck {
    fn default() -> Self {
        Self::unrestricted()
    }
}

impl fmt::Debug for IdentifierCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentifierCheck")
    }
}

/// Message sent when a step finishes executing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Run generation the step was dispatched in
    pub run: u64,
    pub step: StepId,
    /// False when the handle was dropped without [`DoneExecution::done`]
    pub finished: bool,
}

/// Handle a step uses to report that its execution has finished
///
/// The handle is `Send`, so a step may move it into a spawned task and
/// signal from there. Dropping it without calling [`Self::done`] (a task
/// that panicked, an early return) still reports back, as an unfinished
/// completion, so nobody waits on it forever.
#[derive(Debug)]
pub struct DoneExecution {
    completion: Completion,
    tx: mpsc::UnboundedSender<Completion>,
}

impl DoneExecution {
    pub(crate) fn new(run: u64, step: StepId, tx: mpsc::UnboundedSender<Completion>) -> Self {
        Self {
            completion: Completion {
                run,
                step,
                finished: false,
            },
            tx,
        }
    }

    /// Create a handle with its own receiver, for driving a step outside a scene
    pub fn channel(step: StepId) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(0, step, tx), rx)
    }

    /// The step this handle belongs to
    pub fn step(&self) -> StepId {
        self.completion.step
    }

    /// Signal that execution is complete
    pub fn done(mut self) {
        self.completion.finished = true;
    }
}

impl Drop for DoneExecution {
    fn drop(&mut self) {
        if !self.completion.finished {
            log::warn!(
                "Step {} dropped its completion handle without finishing",
                self.completion.step
            );
        }
        if self.tx.send(self.completion).is_err() {
            log::debug!(
                "Completion for {} dropped: nobody is waiting",
                self.completion.step
            );
        }
    }
}

/// Construction-time context handed to step factories
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    /// Workflow directory the step persists its configuration under
    pub location: PathBuf,
    pub identifier_check: IdentifierCheck,
}

impl StepContext {
    pub fn new(location: impl Into<PathBuf>, identifier_check: IdentifierCheck) -> Self {
        Self {
            location: location.into(),
            identifier_check,
        }
    }
}

/// State shared by every step implementation
#[derive(Debug, Clone)]
pub struct StepCore {
    pub name: String,
    pub category: String,
    pub icon: Option<String>,
    pub configured: bool,
    identifier: String,
    ports: Vec<Port>,
    identifier_check: IdentifierCheck,
}

impl StepCore {
    /// Create the core for a step named `name` in the default category
    pub fn new(name: impl Into<String>, identifier_check: IdentifierCheck) -> Self {
        Self {
            name: name.into(),
            category: DEFAULT_CATEGORY.to_string(),
            icon: None,
            configured: false,
            identifier: String::new(),
            ports: Vec::new(),
            identifier_check,
        }
    }

    /// Set the category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the icon resource
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Append a port seeded with one triple
    pub fn with_port(mut self, triple: Triple) -> Self {
        self.add_port(triple);
        self
    }

    pub fn add_port(&mut self, triple: Triple) {
        self.ports.push(Port::with_triple(triple));
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn identifier_check(&self) -> &IdentifierCheck {
        &self.identifier_check
    }

    /// Assign a new identifier after checking it is free in the workflow
    pub fn assign_identifier(&mut self, identifier: &str) -> Result<()> {
        if identifier.is_empty() {
            return Err(WorkflowError::InvalidIdentifier(identifier.to_string()));
        }
        if identifier == self.identifier {
            return Ok(());
        }
        if self.identifier_check.occurs_count(identifier) > 0 {
            return Err(WorkflowError::IdentifierConflict(identifier.to_string()));
        }
        self.identifier = identifier.to_string();
        Ok(())
    }

    /// File this step keeps its configuration in, under `location`
    pub fn config_path(&self, location: &Path) -> PathBuf {
        location.join(format!("{}.conf", self.identifier))
    }
}

/// A pluggable unit of work
pub trait Step: Send {
    fn core(&self) -> &StepCore;

    fn core_mut(&mut self) -> &mut StepCore;

    /// Begin executing with the previous step's output
    ///
    /// Must eventually call [`DoneExecution::done`]. Dropping the handle
    /// instead fails the run.
    fn execute(&mut self, inputs: Option<PortData>, done: DoneExecution);

    fn name(&self) -> &str {
        &self.core().name
    }

    fn category(&self) -> &str {
        &self.core().category
    }

    fn icon(&self) -> Option<&str> {
        self.core().icon.as_deref()
    }

    fn ports(&self) -> &[Port] {
        self.core().ports()
    }

    fn is_configured(&self) -> bool {
        self.core().configured
    }

    /// Whether this step carries a user-assigned, workflow-unique identifier
    fn has_identifier_config(&self) -> bool {
        false
    }

    fn identifier(&self) -> &str {
        self.core().identifier()
    }

    fn set_identifier(&mut self, identifier: &str) -> Result<()> {
        if !self.has_identifier_config() {
            return Err(WorkflowError::IdentifierNotSupported(self.name().to_string()));
        }
        self.core_mut().assign_identifier(identifier)
    }

    /// Apply step-specific configuration
    ///
    /// Steps without configuration ignore the call.
    fn configure(&mut self, _config: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    /// Output of the last execution
    fn port_output(&self) -> Option<PortData> {
        None
    }

    /// Output for the port at `index`
    ///
    /// Picks the matching element out of [`Step::port_output`] when the
    /// step has several provides ports.
    fn port_data(&self, index: usize) -> Option<PortData> {
        let ports = self.ports();
        if !ports.get(index)?.has_polarity(Polarity::Provides) {
            return None;
        }
        let rank = ports[..index]
            .iter()
            .filter(|p| p.has_polarity(Polarity::Provides))
            .count();
        let provides_total = ports
            .iter()
            .filter(|p| p.has_polarity(Polarity::Provides))
            .count();

        let output = self.port_output()?;
        if provides_total == 1 {
            return Some(output);
        }
        match output {
            serde_json::Value::Array(mut values) if rank < values.len() => {
                Some(values.swap_remove(rank))
            }
            _ => None,
        }
    }

    /// Persist configuration under the workflow location
    fn serialize(&self, _location: &Path) -> Result<()> {
        Ok(())
    }

    /// Restore configuration from the workflow location
    fn deserialize(&mut self, _location: &Path) -> Result<()> {
        Ok(())
    }

    fn add_port(&mut self, triple: Triple) {
        self.core_mut().add_port(triple);
    }

    /// Whether any port of this step can feed any port of `other`
    fn can_connect(&self, other: &dyn Step) -> bool {
        self.ports()
            .iter()
            .any(|mine| other.ports().iter().any(|theirs| mine.can_connect(theirs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Splitter {
        core: StepCore,
        output: Option<PortData>,
    }

    impl Splitter {
        fn new(check: IdentifierCheck) -> Self {
            Self {
                core: StepCore::new("Splitter", check)
                    .with_port(Triple::uses("text"))
                    .with_port(Triple::provides("text"))
                    .with_port(Triple::provides("count")),
                output: None,
            }
        }
    }

    impl Step for Splitter {
        fn core(&self) -> &StepCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut StepCore {
            &mut self.core
        }

        fn has_identifier_config(&self) -> bool {
            true
        }

        fn execute(&mut self, inputs: Option<PortData>, done: DoneExecution) {
            let text = inputs.and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
            self.output = Some(serde_json::json!([text.clone(), text.len()]));
            done.done();
        }

        fn port_output(&self) -> Option<PortData> {
            self.output.clone()
        }
    }

    #[test]
    fn test_identifier_occurs_count_caps_at_two() {
        let ids = ["a", "b", "a", "a"];
        assert_eq!(identifier_occurs_count(ids, "a"), 2);
        assert_eq!(identifier_occurs_count(ids, "b"), 1);
        assert_eq!(identifier_occurs_count(ids, "c"), 0);
        assert_eq!(identifier_occurs_count(ids, ""), 2);
    }

    #[test]
    fn test_defaults() {
        let splitter = Splitter::new(IdentifierCheck::unrestricted());
        assert_eq!(splitter.category(), DEFAULT_CATEGORY);
        assert!(!splitter.is_configured());
        assert_eq!(splitter.ports().len(), 3);
        assert!(splitter.icon().is_none());
    }

    #[test]
    fn test_set_identifier_consults_check() {
        let taken = IdentifierCheck::new(|id| if id == "taken" { 1 } else { 0 });
        let mut splitter = Splitter::new(taken);

        assert!(matches!(
            splitter.set_identifier("taken"),
            Err(WorkflowError::IdentifierConflict(_))
        ));
        assert!(matches!(
            splitter.set_identifier(""),
            Err(WorkflowError::InvalidIdentifier(_))
        ));
        splitter.set_identifier("free").unwrap();
        assert_eq!(splitter.identifier(), "free");
    }

    #[test]
    fn test_reassigning_same_identifier_is_accepted() {
        // The check sees the step's own identifier once it is registered
        let check = IdentifierCheck::new(|id| if id == "mine" { 1 } else { 0 });
        let mut splitter = Splitter::new(IdentifierCheck::unrestricted());
        splitter.set_identifier("mine").unwrap();
        splitter.core.identifier_check = check;

        splitter.set_identifier("mine").unwrap();
    }

    #[test]
    fn test_execute_signals_completion() {
        let mut splitter = Splitter::new(IdentifierCheck::unrestricted());
        let (done, mut rx) = DoneExecution::channel(StepId(4));

        splitter.execute(Some(serde_json::json!("hello")), done);

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.step, StepId(4));
        assert!(completion.finished);
        assert!(rx.try_recv().is_err());
        assert_eq!(splitter.port_data(1), Some(serde_json::json!("hello")));
        assert_eq!(splitter.port_data(2), Some(serde_json::json!(5)));
        assert_eq!(splitter.port_data(0), None);
    }

    #[test]
    fn test_dropped_handle_reports_unfinished() {
        let (done, mut rx) = DoneExecution::channel(StepId(7));
        drop(done);

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.step, StepId(7));
        assert!(!completion.finished);
    }

    #[test]
    fn test_can_connect_steps() {
        let a = Splitter::new(IdentifierCheck::unrestricted());
        let b = Splitter::new(IdentifierCheck::unrestricted());
        assert!(a.can_connect(&b));
    }

    #[test]
    fn test_config_path_uses_identifier() {
        let mut core = StepCore::new("Splitter", IdentifierCheck::unrestricted());
        core.assign_identifier("split1").unwrap();
        assert_eq!(
            core.config_path(Path::new("/tmp/wf")),
            PathBuf::from("/tmp/wf/split1.conf")
        );
    }
}
