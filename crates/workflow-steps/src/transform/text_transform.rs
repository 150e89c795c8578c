//! Text Transform Step
//!
//! Rewrites the text it receives with one of a few fixed operations.

use std::path::Path;

use serde::{Deserialize, Serialize};
use step_engine::{
    DoneExecution, PortData, Result, Step, StepContext, StepCore, StepRegistration, Triple,
};

use crate::conf;

/// Operation applied to the incoming text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOperation {
    #[default]
    Uppercase,
    Lowercase,
    Trim,
    Reverse,
}

impl TextOperation {
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Uppercase => text.to_uppercase(),
            Self::Lowercase => text.to_lowercase(),
            Self::Trim => text.trim().to_string(),
            Self::Reverse => text.chars().rev().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextTransformConfig {
    #[serde(default)]
    pub operation: TextOperation,
}

#[derive(Debug, Deserialize)]
struct ConfigureRequest {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(flatten)]
    config: TextTransformConfig,
}

/// Text Transform Step
///
/// # Ports
/// - 0: uses `text`
/// - 1: provides `text`
pub struct TextTransformStep {
    core: StepCore,
    config: TextTransformConfig,
    output: Option<PortData>,
}

impl TextTransformStep {
    pub const NAME: &'static str = "Text Transform";
    pub const CATEGORY: &'static str = "Transform";

    pub fn new(context: StepContext) -> Self {
        Self {
            core: StepCore::new(Self::NAME, context.identifier_check)
                .with_category(Self::CATEGORY)
                .with_port(Triple::uses("text"))
                .with_port(Triple::provides("text")),
            config: TextTransformConfig::default(),
            output: None,
        }
    }

    pub fn operation(&self) -> TextOperation {
        self.config.operation
    }
}

fn create(context: StepContext) -> Box<dyn Step> {
    Box::new(TextTransformStep::new(context))
}

inventory::submit!(StepRegistration {
    name: TextTransformStep::NAME,
    category: TextTransformStep::CATEGORY,
    create,
});

impl Step for TextTransformStep {
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
        let text = conf::input_text(inputs);
        let transformed = self.config.operation.apply(&text);
        log::debug!(
            "TextTransformStep {}: {:?} over {} chars",
            self.core.identifier(),
            self.config.operation,
            text.len()
        );
        self.output = Some(PortData::String(transformed));
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
