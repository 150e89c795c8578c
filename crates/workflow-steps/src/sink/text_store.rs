//! Text Store Step
//!
//! Writes the text it receives to a file inside the workflow directory.
//! Inside a tokio runtime the write runs on a spawned task and completion
//! is signalled from there.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use step_engine::{
    DoneExecution, PortData, Result, Step, StepContext, StepCore, StepRegistration, Triple,
    WorkflowError,
};

use crate::conf;

/// Configuration for the text store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStoreConfig {
    /// File name, relative to the workflow directory
    #[serde(default = "default_file")]
    pub file: String,
    /// Append instead of overwriting
    #[serde(default)]
    pub append: bool,
}

fn default_file() -> String {
    "output.txt".to_string()
}

/// Whether `file` names a path inside the workflow directory
fn stays_inside(file: &str) -> bool {
    Path::new(file)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl Default for TextStoreConfig {
    fn default() -> Self {
        Self {
            file: default_file(),
            append: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigureRequest {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(flatten)]
    config: TextStoreConfig,
}

/// Text Store Step
///
/// # Ports
/// - 0: uses `text`
pub struct TextStoreStep {
    core: StepCore,
    location: PathBuf,
    config: TextStoreConfig,
}

impl TextStoreStep {
    pub const NAME: &'static str = "Text Store";
    pub const CATEGORY: &'static str = "Sink";

    pub fn new(context: StepContext) -> Self {
        Self {
            core: StepCore::new(Self::NAME, context.identifier_check)
                .with_category(Self::CATEGORY)
                .with_port(Triple::uses("text")),
            location: context.location,
            config: TextStoreConfig::default(),
        }
    }

    /// File the step writes to
    pub fn target(&self) -> PathBuf {
        self.location.join(&self.config.file)
    }
}

fn create(context: StepContext) -> Box<dyn Step> {
    Box::new(TextStoreStep::new(context))
}

inventory::submit!(StepRegistration {
    name: TextStoreStep::NAME,
    category: TextStoreStep::CATEGORY,
    create,
});

async fn store(path: PathBuf, text: String, append: bool) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(&path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}

fn store_blocking(path: &Path, text: &str, append: bool) -> std::io::Result<()> {
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    file.write_all(text.as_bytes())
}

impl Step for TextStoreStep {
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
        if !stays_inside(&request.config.file) {
            return Err(WorkflowError::invalid_config(
                self.core.name.as_str(),
                format!("'{}' is outside the workflow directory", request.config.file),
            ));
        }
        let has_identifier =
            conf::apply_identifier(&mut self.core, request.identifier.as_deref())?;
        self.core.configured = has_identifier && !request.config.file.is_empty();
        self.config = request.config;
        Ok(())
    }

    fn execute(&mut self, inputs: Option<PortData>, done: DoneExecution) {
        let text = conf::input_text(inputs);
        let path = self.target();
        let append = self.config.append;
        log::info!("TextStoreStep {}: writing {} chars to {:?}", self.core.identifier(), text.len(), path);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store(path.clone(), text, append).await {
                        log::error!("Failed to write {:?}: {}", path, e);
                    }
                    done.done();
                });
            }
            Err(_) => {
                if let Err(e) = store_blocking(&path, &text, append) {
                    log::error!("Failed to write {:?}: {}", path, e);
                }
                done.done();
            }
        }
    }

    fn serialize(&self, location: &Path) -> Result<()> {
        conf::write_config(&self.core, location, &self.config)
    }

    fn deserialize(&mut self, location: &Path) -> Result<()> {
        if let Some(saved) = conf::read_config::<TextStoreConfig>(&self.core, location)? {
            if !stays_inside(&saved.file) {
                log::warn!(
                    "TextStoreStep {}: ignoring saved file {:?} outside the workflow directory",
                    self.core.identifier(),
                    saved.file
                );
                return Ok(());
            }
            self.core.configured = !saved.file.is_empty();
            self.config = saved;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use step_engine::{IdentifierCheck, StepId};

    fn store_in(dir: &Path) -> TextStoreStep {
        let mut step = TextStoreStep::new(StepContext::new(dir, IdentifierCheck::unrestricted()));
        step.configure(&json!({ "identifier": "out", "file": "result.txt" }))
            .unwrap();
        step
    }

    #[test]
    fn test_blocking_write_outside_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut step = store_in(dir.path());

        let (done, mut rx) = DoneExecution::channel(StepId(2));
        step.execute(Some(json!("stored")), done);

        assert!(rx.try_recv().is_ok());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("result.txt")).unwrap(),
            "stored"
        );
    }

    #[tokio::test]
    async fn test_async_write_signals_later() {
        let dir = tempfile::tempdir().unwrap();
        let mut step = store_in(dir.path());

        let (done, mut rx) = DoneExecution::channel(StepId(2));
        step.execute(Some(json!("first")), done);
        assert_eq!(rx.recv().await.unwrap().step, StepId(2));

        step.configure(&json!({ "file": "result.txt", "append": true }))
            .unwrap();
        let (done, mut rx) = DoneExecution::channel(StepId(2));
        step.execute(Some(json!(" second")), done);
        rx.recv().await.unwrap();

        assert_eq!(
            tokio::fs::read_to_string(dir.path().join("result.txt"))
                .await
                .unwrap(),
            "first second"
        );
    }

    #[test]
    fn test_empty_file_name_is_unconfigured() {
        let mut step = TextStoreStep::new(StepContext::default());
        step.configure(&json!({ "identifier": "out", "file": "" }))
            .unwrap();
        assert!(!step.is_configured());
    }

    #[test]
    fn test_file_must_stay_in_workflow_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut step = store_in(dir.path());

        for file in ["../../x", "/tmp/x", "out/../../x"] {
            assert!(matches!(
                step.configure(&json!({ "file": file })),
                Err(WorkflowError::InvalidConfiguration { .. })
            ));
            assert_eq!(step.target(), dir.path().join("result.txt"));
        }
        assert!(step.is_configured());

        step.configure(&json!({ "file": "out/./nested.txt" })).unwrap();
        assert_eq!(step.target(), dir.path().join("out/./nested.txt"));
    }

    #[test]
    fn test_saved_file_outside_directory_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("out.conf"),
            r#"{ "file": "../escape.txt", "append": false }"#,
        )
        .unwrap();

        let mut restored = TextStoreStep::new(StepContext::new(dir.path(), IdentifierCheck::unrestricted()));
        restored.set_identifier("out").unwrap();
        restored.deserialize(dir.path()).unwrap();
        assert!(!restored.is_configured());
        assert_eq!(restored.target(), dir.path().join("output.txt"));
    }

    #[test]
    fn test_serialize_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let step = store_in(dir.path());
        step.serialize(dir.path()).unwrap();

        let mut restored = TextStoreStep::new(StepContext::new(dir.path(), IdentifierCheck::unrestricted()));
        restored.set_identifier("out").unwrap();
        restored.deserialize(dir.path()).unwrap();
        assert!(restored.is_configured());
        assert_eq!(restored.target(), dir.path().join("result.txt"));
    }
}
