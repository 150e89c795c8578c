//! Workflow lifecycle
//!
//! A workflow is a directory holding `.workflow.json` plus whatever files
//! its steps write. The manager owns the scene, knows where it lives and
//! whether it has unsaved changes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, WorkflowError};
use crate::persistence::{is_compatible_version, SceneState, WORKFLOW_VERSION};
use crate::registry::StepRegistry;
use crate::scene::WorkflowScene;

/// File the scene is saved to inside a workflow directory
pub const WORKFLOW_FILE: &str = ".workflow.json";

const APP_TITLE: &str = "Stepflow";

/// Reason a workflow may not be run right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionBlocker {
    /// Nothing is open
    NoWorkflow,
    /// The workflow has changes not written to disk
    Unsaved,
    /// The scene has no valid order or a step is unconfigured
    NotExecutable(String),
}

impl fmt::Display for ExecutionBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWorkflow => write!(f, "No workflow is open."),
            Self::Unsaved => write!(f, "The workflow has not been saved."),
            Self::NotExecutable(reason) => write!(
                f,
                "Not all steps in the workflow have been successfully configured ({}).",
                reason
            ),
        }
    }
}

/// Owns the open workflow and its location
pub struct WorkflowManager {
    scene: WorkflowScene,
    registry: Arc<StepRegistry>,
    location: Option<PathBuf>,
    previous_location: Option<PathBuf>,
    /// Snapshot as of the last new/load/save
    saved: Option<SceneState>,
    require_saved: bool,
}

impl WorkflowManager {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self::with_scene(registry, WorkflowScene::new())
    }

    /// Create a manager around an existing (usually empty) scene
    pub fn with_scene(registry: Arc<StepRegistry>, scene: WorkflowScene) -> Self {
        Self {
            scene,
            registry,
            location: None,
            previous_location: None,
            saved: None,
            require_saved: true,
        }
    }

    /// Whether `location` holds a saved workflow
    pub fn exists(location: &Path) -> bool {
        location.join(WORKFLOW_FILE).is_file()
    }

    /// Start an empty workflow in `location`, creating the directory
    pub fn create(&mut self, location: &Path) -> Result<()> {
        std::fs::create_dir_all(location)?;
        self.scene.clear();
        self.open_at(location);
        self.save()?;
        log::info!("Created workflow at {:?}", location);
        Ok(())
    }

    /// Open the workflow saved in `location`
    pub fn load(&mut self, location: &Path) -> Result<()> {
        if !location.is_dir() {
            return Err(WorkflowError::LocationNotFound(location.to_path_buf()));
        }

        let state = SceneState::read_from(&location.join(WORKFLOW_FILE))?;
        if !is_compatible_version(&state.version) {
            return Err(WorkflowError::VersionMismatch {
                expected: WORKFLOW_VERSION.to_string(),
                found: state.version,
            });
        }

        if let Err(e) = self.scene.load_state(&state, location, &self.registry) {
            // the scene is empty now, so whatever was open is gone
            self.location = None;
            self.saved = None;
            return Err(e);
        }
        self.open_at(location);
        log::info!("Loaded workflow from {:?}", location);
        Ok(())
    }

    /// Write the open workflow to its location
    pub fn save(&mut self) -> Result<()> {
        let location = self.location.clone().ok_or(WorkflowError::NoWorkflowOpen)?;
        let state = self.scene.save_state(&location)?;
        state.write_to(&location.join(WORKFLOW_FILE))?;
        self.saved = Some(state);
        self.scene.mark_saved();
        log::debug!("Saved workflow to {:?}", location);
        Ok(())
    }

    /// Close the open workflow, discarding unsaved changes
    pub fn close(&mut self) {
        if let Some(location) = self.location.take() {
            log::info!("Closed workflow at {:?}", location);
        }
        self.scene.clear();
        self.saved = None;
    }

    fn open_at(&mut self, location: &Path) {
        self.location = Some(location.to_path_buf());
        self.previous_location = Some(location.to_path_buf());
        self.saved = Some(self.scene.snapshot());
        self.scene.mark_saved();
    }

    pub fn is_workflow_open(&self) -> bool {
        self.location.is_some()
    }

    /// Whether the scene or any step's configuration changed since the
    /// last new/load/save
    pub fn is_modified(&self) -> bool {
        match &self.saved {
            Some(saved) => self.scene.is_edited() || *saved != self.scene.snapshot(),
            None => false,
        }
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Window title for the open workflow, starred when modified
    pub fn title(&self) -> String {
        match &self.location {
            None => APP_TITLE.to_string(),
            Some(location) => {
                let name = location
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| location.display().to_string());
                let marker = if self.is_modified() { "*" } else { "" };
                format!("{} - {}{}", APP_TITLE, name, marker)
            }
        }
    }

    pub fn previous_location(&self) -> Option<&Path> {
        self.previous_location.as_deref()
    }

    pub fn set_previous_location(&mut self, location: impl Into<PathBuf>) {
        self.previous_location = Some(location.into());
    }

    /// Whether unsaved workflows are refused by [`Self::execution_blockers`]
    pub fn set_require_saved(&mut self, require_saved: bool) {
        self.require_saved = require_saved;
    }

    /// Everything that stops the open workflow from running
    pub fn execution_blockers(&mut self) -> Vec<ExecutionBlocker> {
        if !self.is_workflow_open() {
            return vec![ExecutionBlocker::NoWorkflow];
        }

        let mut blockers = Vec::new();
        if self.require_saved && self.is_modified() {
            blockers.push(ExecutionBlocker::Unsaved);
        }
        if let Some(problem) = self.scene.execution_problem() {
            blockers.push(ExecutionBlocker::NotExecutable(problem));
        }
        blockers
    }

    /// Run the open workflow to completion
    pub async fn execute(&mut self) -> Result<usize> {
        if let Some(blocker) = self.execution_blockers().into_iter().next() {
            return Err(match blocker {
                ExecutionBlocker::NoWorkflow => WorkflowError::NoWorkflowOpen,
                other => WorkflowError::NotExecutable(other.to_string()),
            });
        }
        self.scene.run().await
    }

    pub fn scene(&self) -> &WorkflowScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut WorkflowScene {
        &mut self.scene
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::registry;
    use crate::types::Position;
    use serde_json::json;

    fn manager() -> WorkflowManager {
        WorkflowManager::new(Arc::new(registry()))
    }

    fn add_chain(manager: &mut WorkflowManager, location: &Path) {
        let registry = Arc::clone(&manager.registry);
        let scene = manager.scene_mut();
        let a = scene
            .create_step(&registry, "Relay", location, Position(0.0, 0.0))
            .unwrap();
        let b = scene
            .create_step(&registry, "Relay", location, Position(100.0, 0.0))
            .unwrap();
        scene.set_identifier(a, "a").unwrap();
        scene.set_identifier(b, "b").unwrap();
        scene.configure_step(a, &json!({})).unwrap();
        scene.configure_step(b, &json!({})).unwrap();
        scene.connect(a, 1, b, 0).unwrap();
    }

    #[test]
    fn test_create_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("wf");

        let mut manager = manager();
        assert!(!manager.is_workflow_open());
        manager.create(&location).unwrap();
        assert!(WorkflowManager::exists(&location));
        assert!(!manager.is_modified());
        assert_eq!(manager.title(), "Stepflow - wf");

        add_chain(&mut manager, &location);
        assert!(manager.is_modified());
        assert_eq!(manager.title(), "Stepflow - wf*");

        manager.save().unwrap();
        assert!(!manager.is_modified());
        manager.close();
        assert!(!manager.is_workflow_open());
        assert!(manager.scene().is_empty());
        assert_eq!(manager.title(), "Stepflow");
        assert_eq!(manager.previous_location(), Some(location.as_path()));

        manager.load(&location).unwrap();
        assert_eq!(manager.scene().len(), 2);
        assert_eq!(manager.scene().connection_count(), 1);
        assert!(!manager.is_modified());
        assert!(manager.execution_blockers().is_empty());
    }

    #[test]
    fn test_load_missing_location() {
        let mut manager = manager();
        assert!(matches!(
            manager.load(Path::new("/definitely/not/here")),
            Err(WorkflowError::LocationNotFound(_))
        ));
    }

    #[test]
    fn test_load_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = SceneState::empty();
        state.version = "0.2.0".into();
        state.write_to(&dir.path().join(WORKFLOW_FILE)).unwrap();

        let mut manager = manager();
        assert!(matches!(
            manager.load(dir.path()),
            Err(WorkflowError::VersionMismatch { .. })
        ));
        assert!(!manager.is_workflow_open());
    }

    #[test]
    fn test_save_without_workflow() {
        let mut manager = manager();
        assert!(matches!(manager.save(), Err(WorkflowError::NoWorkflowOpen)));
        assert_eq!(
            manager.execution_blockers(),
            vec![ExecutionBlocker::NoWorkflow]
        );
    }

    #[test]
    fn test_execution_blockers() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager();
        manager.create(dir.path()).unwrap();
        add_chain(&mut manager, dir.path());

        let blockers = manager.execution_blockers();
        assert_eq!(blockers, vec![ExecutionBlocker::Unsaved]);
        assert_eq!(blockers[0].to_string(), "The workflow has not been saved.");

        manager.set_require_saved(false);
        assert!(manager.execution_blockers().is_empty());

        let first = manager.scene().find_step("a").unwrap();
        manager
            .scene_mut()
            .configure_step(first, &json!({ "ready": false }))
            .unwrap();
        assert!(matches!(
            manager.execution_blockers().as_slice(),
            [ExecutionBlocker::NotExecutable(_)]
        ));
    }

    #[test]
    fn test_configure_after_save_is_modified() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager();
        manager.create(dir.path()).unwrap();
        add_chain(&mut manager, dir.path());
        manager.save().unwrap();
        assert!(!manager.is_modified());

        let first = manager.scene().find_step("a").unwrap();
        manager
            .scene_mut()
            .configure_step(first, &json!({ "ready": false }))
            .unwrap();
        assert!(manager.is_modified());
        assert!(manager.title().ends_with('*'));
        assert!(manager
            .execution_blockers()
            .contains(&ExecutionBlocker::Unsaved));

        manager.save().unwrap();
        assert!(!manager.is_modified());
        assert!(matches!(
            manager.execution_blockers().as_slice(),
            [ExecutionBlocker::NotExecutable(_)]
        ));

        manager.load(dir.path()).unwrap();
        assert!(!manager.is_modified());
    }

    #[tokio::test]
    async fn test_execute_saved_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager();
        manager.create(dir.path()).unwrap();
        add_chain(&mut manager, dir.path());

        assert!(matches!(
            manager.execute().await,
            Err(WorkflowError::NotExecutable(_))
        ));
        manager.save().unwrap();
        assert_eq!(manager.execute().await.unwrap(), 2);
    }
}
