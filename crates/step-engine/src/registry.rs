//! Step type registry
//!
//! Maps step names to factories. Plugin crates register their steps at
//! link time:
//!
//! ```ignore
//! inventory::submit!(step_engine::StepRegistration {
//!     name: "Text Source",
//!     category: "Source",
//!     create: |ctx| Box::new(TextSourceStep::new(ctx)),
//! });
//! ```
//!
//! and hosts collect them with [`StepRegistry::with_builtins`].

use std::collections::BTreeMap;

use crate::error::{Result, WorkflowError};
use crate::step::{Step, StepContext};

/// Link-time registration of a step type
pub struct StepRegistration {
    /// Name the step is created and persisted under
    pub name: &'static str,
    /// Grouping shown in step palettes
    pub category: &'static str,
    /// Factory producing a fresh, unconfigured step
    pub create: fn(StepContext) -> Box<dyn Step>,
}

inventory::collect!(StepRegistration);

/// Factory for creating steps by name
pub trait StepFactory: Send + Sync {
    fn create(&self, context: StepContext) -> Box<dyn Step>;
}

impl<F> StepFactory for F
where
    F: Fn(StepContext) -> Box<dyn Step> + Send + Sync,
{
    fn create(&self, context: StepContext) -> Box<dyn Step> {
        self(context)
    }
}

struct RegistryEntry {
    category: String,
    factory: Box<dyn StepFactory>,
}

/// Registry of step types keyed by name
pub struct StepRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl StepRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Create a registry holding every step submitted through `inventory`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<StepRegistration> {
            registry.register(registration.name, registration.category, registration.create);
        }
        log::debug!("Registered {} built-in steps", registry.entries.len());
        registry
    }

    /// Register a factory under `name`, replacing any previous entry
    pub fn register(
        &mut self,
        name: impl Into<String>,
        category: impl Into<String>,
        factory: impl StepFactory + 'static,
    ) {
        self.entries.insert(
            name.into(),
            RegistryEntry {
                category: category.into(),
                factory: Box::new(factory),
            },
        );
    }

    /// Create a fresh step instance by name
    pub fn create(&self, name: &str, context: StepContext) -> Result<Box<dyn Step>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| WorkflowError::UnknownStep(name.to_string()))?;
        Ok(entry.factory.create(context))
    }

    /// Check if a step name is registered
    pub fn has_step(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All registered step names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Step names grouped by category
    pub fn by_category(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, entry) in &self.entries {
            grouped
                .entry(entry.category.as_str())
                .or_default()
                .push(name.as_str());
        }
        grouped
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` with the same name.
    pub fn merge(&mut self, other: StepRegistry) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
