//! Command implementations
//!
//! Every command that touches a workflow opens it from disk, acts, and
//! saves it again if it changed anything.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use step_engine::{
    validate_scene, GraphStatus, LogEventSink, Settings, StepId, StepRegistry, WorkflowManager,
    WorkflowScene,
};

/// State shared by all commands of one invocation
pub struct Host {
    registry: Arc<StepRegistry>,
    settings: Settings,
}

impl Host {
    pub fn new(registry: Arc<StepRegistry>, settings: Settings) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn resolve_dir(&self, dir: Option<PathBuf>) -> Result<PathBuf> {
        dir.or_else(|| self.settings.previous_location.clone())
            .context("no workflow directory given and none used before")
    }

    /// Load the workflow at `dir` (or the last one used)
    fn open(&mut self, dir: Option<PathBuf>) -> Result<(WorkflowManager, PathBuf)> {
        let location = self.resolve_dir(dir)?;

        let mut manager = WorkflowManager::new(Arc::clone(&self.registry));
        manager.set_require_saved(self.settings.require_saved_before_run);
        manager.scene_mut().set_event_sink(Arc::new(LogEventSink));
        manager
            .load(&location)
            .with_context(|| format!("failed to open workflow at {}", location.display()))?;

        self.settings.remember(&location);
        Ok((manager, location))
    }

    pub fn create(&mut self, dir: &Path, out: &mut dyn Write) -> Result<()> {
        if WorkflowManager::exists(dir) {
            bail!("a workflow already exists at {}", dir.display());
        }

        let mut manager = WorkflowManager::new(Arc::clone(&self.registry));
        manager
            .create(dir)
            .with_context(|| format!("failed to create workflow at {}", dir.display()))?;
        self.settings.remember(dir);

        writeln!(out, "Created workflow at {}", dir.display())?;
        Ok(())
    }

    pub fn show(&mut self, dir: Option<PathBuf>, out: &mut dyn Write) -> Result<()> {
        let (mut manager, _) = self.open(dir)?;
        writeln!(out, "{}", manager.title())?;

        let scene = manager.scene();
        writeln!(out, "Steps:")?;
        for meta in scene.steps() {
            let status = if meta.step().is_configured() {
                "configured"
            } else {
                "unconfigured"
            };
            writeln!(
                out,
                "  {:<12} {:<16} {:<10} ({}, {})  {}",
                label(scene, meta.id()),
                meta.name(),
                meta.step().category(),
                meta.position.x(),
                meta.position.y(),
                status
            )?;
        }

        writeln!(out, "Connections:")?;
        for connection in scene.connections() {
            writeln!(
                out,
                "  {}:{} -> {}:{}",
                label(scene, connection.source),
                connection.source_index,
                label(scene, connection.destination),
                connection.destination_index
            )?;
        }

        let scene = manager.scene_mut();
        let order = scene.execution_order();
        match scene.dependency_graph().status() {
            GraphStatus::Empty => writeln!(out, "Execution order: (no connections)")?,
            GraphStatus::Ungraphable => {
                writeln!(out, "Execution order: none, the connections contain a cycle")?
            }
            GraphStatus::Ordered => {
                let labels: Vec<String> = order.iter().map(|id| label(scene, *id)).collect();
                writeln!(out, "Execution order: {}", labels.join(" -> "))?;
            }
        }
        Ok(())
    }

    pub fn validate(&mut self, dir: Option<PathBuf>, out: &mut dyn Write) -> Result<()> {
        let (manager, _) = self.open(dir)?;
        let errors = validate_scene(manager.scene());
        if errors.is_empty() {
            writeln!(out, "No problems found")?;
            return Ok(());
        }

        for error in &errors {
            writeln!(out, "  - {}", error)?;
        }
        bail!("{} problem(s) found", errors.len())
    }

    pub async fn run(&mut self, dir: Option<PathBuf>, out: &mut dyn Write) -> Result<()> {
        let (mut manager, _) = self.open(dir)?;

        let blockers = manager.execution_blockers();
        if !blockers.is_empty() {
            for blocker in &blockers {
                writeln!(out, "  - {}", blocker)?;
            }
            bail!("workflow cannot be executed");
        }

        let executed = manager
            .execute()
            .await
            .context("workflow execution failed")?;
        writeln!(out, "Executed {} steps", executed)?;
        Ok(())
    }

    pub fn add(
        &mut self,
        dir: Option<PathBuf>,
        name: &str,
        identifier: Option<&str>,
        position: (f64, f64),
        out: &mut dyn Write,
    ) -> Result<()> {
        let (mut manager, location) = self.open(dir)?;
        let scene = manager.scene_mut();

        let id = scene.create_step(&self.registry, name, &location, position.into())?;
        if let Some(identifier) = identifier {
            scene.set_identifier(id, identifier)?;
        }
        let added = label(scene, id);
        manager.save()?;

        writeln!(out, "Added {} as {}", name, added)?;
        Ok(())
    }

    pub fn connect(
        &mut self,
        dir: Option<PathBuf>,
        (source, source_port): (&str, usize),
        (destination, destination_port): (&str, usize),
        out: &mut dyn Write,
    ) -> Result<()> {
        let (mut manager, _) = self.open(dir)?;
        let scene = manager.scene_mut();

        let source_id = find(scene, source)?;
        let destination_id = find(scene, destination)?;
        scene.connect(source_id, source_port, destination_id, destination_port)?;
        manager.save()?;

        writeln!(
            out,
            "Connected {}:{} -> {}:{}",
            source, source_port, destination, destination_port
        )?;
        Ok(())
    }

    pub fn configure(
        &mut self,
        dir: Option<PathBuf>,
        identifier: &str,
        config: &str,
        out: &mut dyn Write,
    ) -> Result<()> {
        let config: serde_json::Value =
            serde_json::from_str(config).context("configuration is not valid JSON")?;

        let (mut manager, _) = self.open(dir)?;
        let id = find(manager.scene(), identifier)?;
        manager.scene_mut().configure_step(id, &config)?;

        let meta = manager.scene().step(id)?;
        let status = if meta.step().is_configured() {
            "configured"
        } else {
            "still not configured"
        };
        let configured = label(manager.scene(), id);
        manager.save()?;

        writeln!(out, "{} is {}", configured, status)?;
        Ok(())
    }

    pub fn list_steps(&self, out: &mut dyn Write) -> Result<()> {
        for (category, names) in self.registry.by_category() {
            writeln!(out, "{}:", category)?;
            for name in names {
                writeln!(out, "  {}", name)?;
            }
        }
        Ok(())
    }
}

fn find(scene: &WorkflowScene, identifier: &str) -> Result<StepId> {
    scene
        .find_step(identifier)
        .with_context(|| format!("no step with identifier '{}'", identifier))
}

/// Identifier of a step, or its name and id when it has none
fn label(scene: &WorkflowScene, id: StepId) -> String {
    match scene.step(id) {
        Ok(meta) if !meta.identifier().is_empty() => meta.identifier().to_string(),
        Ok(meta) => format!("{}#{}", meta.name(), id.0),
        Err(_) => id.to_string(),
    }
}
