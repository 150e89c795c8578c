//! Configuration helpers shared by the built-in steps
//!
//! Every built-in step takes a JSON object on `configure`, may rename itself
//! through an `identifier` key in that object, and keeps its settings in
//! `<location>/<identifier>.conf`.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use step_engine::{Result, StepCore, WorkflowError};

/// Parse a step's configuration object
pub(crate) fn parse<T: DeserializeOwned>(core: &StepCore, config: &serde_json::Value) -> Result<T> {
    serde_json::from_value(config.clone())
        .map_err(|e| WorkflowError::invalid_config(core.name.as_str(), e.to_string()))
}

/// Apply an identifier requested by configuration
///
/// Returns whether the step now has a usable identifier.
pub(crate) fn apply_identifier(core: &mut StepCore, identifier: Option<&str>) -> Result<bool> {
    if let Some(identifier) = identifier {
        core.assign_identifier(identifier)?;
    }
    Ok(!core.identifier().is_empty())
}

/// Write `config` to the step's configuration file
pub(crate) fn write_config<T: Serialize>(core: &StepCore, location: &Path, config: &T) -> Result<()> {
    let path = core.config_path(location);
    std::fs::write(&path, serde_json::to_string_pretty(config)?)?;
    log::debug!("Wrote {} configuration to {:?}", core.name, path);
    Ok(())
}

/// Read the step's configuration file, if it has been written
pub(crate) fn read_config<T: DeserializeOwned>(core: &StepCore, location: &Path) -> Result<Option<T>> {
    if core.identifier().is_empty() {
        return Ok(None);
    }
    let path = core.config_path(location);
    if !path.is_file() {
        log::debug!("No configuration for {} at {:?}", core.name, path);
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Text carried by step input, `""` when there is none
pub(crate) fn input_text(inputs: Option<step_engine::PortData>) -> String {
    match inputs {
        Some(serde_json::Value::String(text)) => text,
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
