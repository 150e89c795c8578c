//! Concatenate Step
//!
//! Joins the incoming text with a configured piece of text.

use std::path::Path;

use serde::{Deserialize, Serialize};
use step_engine::{
    DoneExecution, PortData, Result, Step, StepContext, StepCore, StepRegistration, Triple,
};

use crate::conf;

/// Configuration for the concatenate step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcatenateConfig {
    /// Text joined to the input
    #[serde(default)]
    pub text: String,
    /// Separator placed between input and text
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Put the configured text before the input instead of after it
    #[serde(default)]
    pub prepend: bool,
    /// Drop the separator when either side is empty
    #[serde(default = "default_filter_empty")]
    pub filter_empty: bool,
}

fn default_separator() -> String {
    " ".to_string()
}

fn default_filter_empty() -> bool {
    true
}

impl Default for ConcatenateConfig {
    fn default() -> Self {
        Self {
            text: String::new(),
            separator: default_separator(),
            prepend: false,
            filter_empty: default_filter_empty(),
        }
    }
}

impl ConcatenateConfig {
    pub fn join(&self, input: &str) -> String {
        let (first, second) = if self.prepend {
            (self.text.as_str(), input)
        } else {
            (input, self.text.as_str())
        };
        let parts: Vec<&str> = [first, second]
            .into_iter()
            .filter(|p| !self.filter_empty || !p.is_empty())
            .collect();
        parts.join(&self.separator)
    }
}

#[derive(Debug, Deserialize)]
struct ConfigureRequest {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(flatten)]
    config: ConcatenateConfig,
}

/// Concatenate Step
///
/// # Ports
/// - 0: uses `text`
/// - 1: provides `text`
pub struct ConcatenateStep {
    core: StepCore,
    config: ConcatenateConfig,
    output: Option<PortData>,
}

impl ConcatenateStep {
    pub const NAME: &'static str = "Concatenate";
    pub const CATEGORY: &'static str = "Transform";

    pub fn new(context: StepContext) -> Self {
        Self {
            core: StepCore::new(Self::NAME, context.identifier_check)
                .with_category(Self::CATEGORY)
                .with_port(Triple::uses("text"))
                .with_port(Triple::provides("text")),
            config: ConcatenateConfig::default(),
            output: None,
        }
    }
}

fn create(context: StepContext) -> Box<dyn Step> {
    Box::new(ConcatenateStep::new(context))
}

inventory::submit!(StepRegistration {
    name: ConcatenateStep::NAME,
    category: ConcatenateStep::CATEGORY,
    create,
});

impl Step for ConcatenateStep {
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

    fn execute(&mut self, inputs: Option<PortData>, done: DoneExecution) {
        let joined = self.config.join(&conf::input_text(inputs));
        self.output = Some(PortData::String(joined));
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
    use step_engine::StepId;

    #[test]
    fn test_join() {
        let mut config = ConcatenateConfig {
            text: "world".into(),
            ..Default::default()
        };
        assert_eq!(config.join("hello"), "hello world");
        assert_eq!(config.join(""), "world");

        config.prepend = true;
        config.separator = ", ".into();
        assert_eq!(config.join("hello"), "world, hello");

        config.filter_empty = false;
        assert_eq!(config.join(""), "world, ");
    }

    #[test]
    fn test_execute() {
        let mut step = ConcatenateStep::new(StepContext::default());
        step.configure(&json!({ "identifier": "c", "text": "!", "separator": "" }))
            .unwrap();

        let (done, _rx) = DoneExecution::channel(StepId(0));
        step.execute(Some(json!("hey")), done);
        assert_eq!(step.port_output(), Some(json!("hey!")));
    }
}
