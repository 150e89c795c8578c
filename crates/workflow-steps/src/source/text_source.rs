//! Text Source Step
//!
//! Starts a chain with a fixed piece of text.

use std::path::Path;

use serde::{Deserialize, Serialize};
use step_engine::{
    DoneExecution, PortData, Result, Step, StepContext, StepCore, StepRegistration, Triple,
};

use crate::conf;

/// Configuration for the text source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextSourceConfig {
    /// Text handed to the next step
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct ConfigureRequest {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(flatten)]
    config: TextSourceConfig,
}

/// Text Source Step
///
/// # Ports
/// - 0: provides `text`
pub struct TextSourceStep {
    core: StepCore,
    config: TextSourceConfig,
    output: Option<PortData>,
}

impl TextSourceStep {
    pub const NAME: &'static str = "Text Source";
    pub const CATEGORY: &'static str = "Source";

    pub fn new(context: StepContext) -> Self {
        Self {
            core: StepCore::new(Self::NAME, context.identifier_check)
                .with_category(Self::CATEGORY)
                .with_port(Triple::provides("text")),
            config: TextSourceConfig::default(),
            output: None,
        }
    }

    pub fn config(&self) -> &TextSourceConfig {
        &self.config
    }
}

fn create(context: StepContext) -> Box<dyn Step> {
    Box::new(TextSourceStep::new(context))
}

inventory::submit!(StepRegistration {
    name: TextSourceStep::NAME,
    category: TextSourceStep::CATEGORY,
    create,
});

impl Step for TextSourceStep {
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
        let request: ConfigureRequest = conf::parse(&self.core, config)?;
        self.core.configured = conf::apply_identifier(&mut self.core, request.identifier.as_deref())?;
        self.config = request.config;
        Ok(())
    }

    fn execute(&mut self, _inputs: Option<PortData>, done: DoneExecution) {
        log::debug!(
            "TextSourceStep {}: emitting {} chars",
            self.core.identifier(),
            self.config.text.len()
        );
        self.output = Some(PortData::String(self.config.text.clone()));
        done.done();
    }

    fn port_output(&self) -> Option<PortData> {
        self.output.clone()
    }

    fn serialize(&self, location: &Path) -> Result<()> {
        conf::write_config(&self.core, location, &self.config)
    }

    fn deserialize(&mut self, location: &Path) -> Result<()> {
        if let Some(saved) = conf::read_config(&self.core, location)? {
            self.config = saved;
            self.core.configured = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use step_engine::{IdentifierCheck, StepId, WorkflowError};

    #[test]
    fn test_configure_sets_identifier_and_text() {
        let mut step = TextSourceStep::new(StepContext::default());
        assert!(!step.is_configured());

        step.configure(&json!({ "identifier": "greeting", "text": "hello" }))
            .unwrap();
        assert!(step.is_configured());
        assert_eq!(step.identifier(), "greeting");
        assert_eq!(step.config().text, "hello");
    }

    #[test]
    fn test_configure_without_identifier_stays_unconfigured() {
        let mut step = TextSourceStep::new(StepContext::default());
        step.configure(&json!({ "text": "hello" })).unwrap();
        assert!(!step.is_configured());
    }

    #[test]
    fn test_configure_rejects_taken_identifier() {
        let check = IdentifierCheck::new(|id| usize::from(id == "taken"));
        let mut step = TextSourceStep::new(StepContext::new(".", check));
        assert!(matches!(
            step.configure(&json!({ "identifier": "taken" })),
            Err(WorkflowError::IdentifierConflict(_))
        ));
    }

    #[test]
    fn test_execute_emits_text() {
        let mut step = TextSourceStep::new(StepContext::default());
        step.configure(&json!({ "identifier": "s", "text": "abc" }))
            .unwrap();

        let (done, mut rx) = DoneExecution::channel(StepId(0));
        step.execute(None, done);

        assert_eq!(rx.try_recv().unwrap().step, StepId(0));
        assert_eq!(step.port_output(), Some(json!("abc")));
        assert_eq!(step.port_data(0), Some(json!("abc")));
    }

    #[test]
    fn test_serialize_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut step = TextSourceStep::new(StepContext::default());
        step.configure(&json!({ "identifier": "src", "text": "saved text" }))
            .unwrap();
        step.serialize(dir.path()).unwrap();
        assert!(dir.path().join("src.conf").is_file());

        let mut restored = TextSourceStep::new(StepContext::default());
        restored.set_identifier("src").unwrap();
        restored.deserialize(dir.path()).unwrap();
        assert!(restored.is_configured());
        assert_eq!(restored.config().text, "saved text");
    }
}
