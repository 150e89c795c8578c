//! Steps used by the engine's own tests

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use crate::error::Result;
use crate::port::Triple;
use crate::registry::StepRegistry;
use crate::step::{DoneExecution, PortData, Step, StepContext, StepCore};

/// Shared log of what relays received, in execution order
pub(crate) type Received = Arc<Mutex<Vec<(String, Option<PortData>)>>>;

/// Passes its input through, or emits its identifier when it has none
///
/// Port 0 uses "text", port 1 provides "text".
pub(crate) struct Relay {
    core: StepCore,
    output: Option<PortData>,
    received: Option<Received>,
    deferred: bool,
    pending: Arc<Mutex<Option<DoneExecution>>>,
}

impl Relay {
    pub(crate) fn new(context: StepContext) -> Self {
        Self {
            core: StepCore::new("Relay", context.identifier_check)
                .with_category("Test")
                .with_port(Triple::uses("text"))
                .with_port(Triple::provides("text")),
            output: None,
            received: None,
            deferred: false,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// A configured relay with `identifier`
    pub(crate) fn ready(identifier: &str) -> Self {
        let mut relay = Self::new(StepContext::default());
        relay.core.assign_identifier(identifier).unwrap();
        relay.core.configured = true;
        relay
    }

    pub(crate) fn recording(mut self, received: &Received) -> Self {
        self.received = Some(Arc::clone(received));
        self
    }

    /// Hold completion until the returned handle is released
    pub(crate) fn deferred(mut self) -> (Self, Arc<Mutex<Option<DoneExecution>>>) {
        self.deferred = true;
        let pending = Arc::clone(&self.pending);
        (self, pending)
    }
}

impl Step for Relay {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    fn has_identifier_config(&self) -> bool {
        true
    }

    fn configure(&mut self, config: &serde_json::Value) -> Result<()> {
        self.core.configured = config.get("ready").and_then(|v| v.as_bool()).unwrap_or(true);
        Ok(())
    }

    fn execute(&mut self, inputs: Option<PortData>, done: DoneExecution) {
        if let Some(received) = &self.received {
            received
                .lock()
                .push((self.core.identifier().to_string(), inputs.clone()));
        }
        self.output = Some(inputs.unwrap_or_else(|| json!(self.core.identifier())));
        if self.deferred {
            *self.pending.lock() = Some(done);
        } else {
            done.done();
        }
    }

    fn port_output(&self) -> Option<PortData> {
        self.output.clone()
    }

    fn serialize(&self, location: &Path) -> Result<()> {
        let contents = json!({ "ready": self.core.configured });
        std::fs::write(self.core.config_path(location), contents.to_string())?;
        Ok(())
    }

    fn deserialize(&mut self, location: &Path) -> Result<()> {
        let path = self.core.config_path(location);
        if path.exists() {
            let config: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            self.configure(&config)?;
        }
        Ok(())
    }
}

/// Consumes text and provides nothing; always configured
pub(crate) struct Sink {
    core: StepCore,
}

impl Sink {
    pub(crate) fn new(context: StepContext) -> Self {
        let mut core = StepCore::new("Sink", context.identifier_check)
            .with_category("Test")
            .with_port(Triple::uses("text"));
        core.configured = true;
        Self { core }
    }
}

impl Step for Sink {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    fn execute(&mut self, _inputs: Option<PortData>, done: DoneExecution) {
        done.done();
    }
}

/// Registry holding "Relay" and "Sink"
pub(crate) fn registry() -> StepRegistry {
    let mut registry = StepRegistry::new();
    registry.register("Relay", "Test", |ctx: StepContext| {
        Box::new(Relay::new(ctx)) as Box<dyn Step>
    });
    registry.register("Sink", "Test", |ctx: StepContext| {
        Box::new(Sink::new(ctx)) as Box<dyn Step>
    });
    registry
}
