//! Scene diagnostics
//!
//! Execution itself only needs the boolean from
//! [`WorkflowScene::can_execute`]; these checks explain what is wrong so
//! hosts can tell the user.

use std::collections::BTreeMap;

use crate::graph::{DependencyGraph, GraphStatus};
use crate::scene::WorkflowScene;
use crate::types::{ConnectionId, StepId};

/// A problem found in a scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The connections contain a cycle, so there is no execution order
    CycleDetected,
    /// A step in the execution order is not configured
    UnconfiguredStep { step: StepId, name: String },
    /// A step that takes an identifier has none
    MissingIdentifier { step: StepId, name: String },
    /// More than one step carries the same identifier
    DuplicateIdentifier { identifier: String },
    /// A connection names a port the step does not have
    PortIndexOutOfRange { connection: ConnectionId, step: StepId, index: usize },
    /// A connection joins ports with nothing in common
    IncompatiblePorts { connection: ConnectionId },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected => write!(f, "Cycle detected in workflow connections"),
            Self::UnconfiguredStep { step, name } => {
                write!(f, "Step '{}' ({}) is not configured", name, step)
            }
            Self::MissingIdentifier { step, name } => {
                write!(f, "Step '{}' ({}) has no identifier", name, step)
            }
            Self::DuplicateIdentifier { identifier } => {
                write!(f, "Identifier '{}' is used by more than one step", identifier)
            }
            Self::PortIndexOutOfRange {
                connection,
                step,
                index,
            } => write!(
                f,
                "Connection '{}' refers to missing port {} on {}",
                connection, index, step
            ),
            Self::IncompatiblePorts { connection } => {
                write!(f, "Connection '{}' joins incompatible ports", connection)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check a scene for problems
///
/// Returns all problems found (not just the first).
pub fn validate_scene(scene: &WorkflowScene) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut graph = DependencyGraph::new();
    graph.recompute(scene.connections());
    if graph.status() == GraphStatus::Ungraphable {
        errors.push(ValidationError::CycleDetected);
    }

    validate_configuration(scene, &graph, &mut errors);
    validate_identifiers(scene, &mut errors);
    validate_ports(scene, &mut errors);

    errors
}

fn validate_configuration(
    scene: &WorkflowScene,
    graph: &DependencyGraph,
    errors: &mut Vec<ValidationError>,
) {
    for id in graph.order() {
        if let Ok(meta) = scene.step(*id) {
            if !meta.step().is_configured() {
                errors.push(ValidationError::UnconfiguredStep {
                    step: *id,
                    name: meta.name().to_string(),
                });
            }
        }
    }
}

fn validate_identifiers(scene: &WorkflowScene, errors: &mut Vec<ValidationError>) {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    for meta in scene.steps() {
        if !meta.step().has_identifier_config() {
            continue;
        }
        let identifier = meta.identifier();
        if identifier.is_empty() {
            errors.push(ValidationError::MissingIdentifier {
                step: meta.id(),
                name: meta.name().to_string(),
            });
        } else {
            *seen.entry(identifier).or_insert(0) += 1;
        }
    }

    for (identifier, count) in seen {
        if count > 1 {
            errors.push(ValidationError::DuplicateIdentifier {
                identifier: identifier.to_string(),
            });
        }
    }
}

fn validate_ports(scene: &WorkflowScene, errors: &mut Vec<ValidationError>) {
    for connection in scene.connections() {
        let (Ok(source), Ok(destination)) = (
            scene.step(connection.source),
            scene.step(connection.destination),
        ) else {
            continue;
        };

        let source_port = source.step().ports().get(connection.source_index);
        let destination_port = destination.step().ports().get(connection.destination_index);
        match (source_port, destination_port) {
            (None, _) => errors.push(ValidationError::PortIndexOutOfRange {
                connection: connection.id(),
                step: connection.source,
                index: connection.source_index,
            }),
            (_, None) => errors.push(ValidationError::PortIndexOutOfRange {
                connection: connection.id(),
                step: connection.destination,
                index: connection.destination_index,
            }),
            (Some(s), Some(d)) if !s.can_connect(d) => {
                errors.push(ValidationError::IncompatiblePorts {
                    connection: connection.id(),
                })
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{ConnectionRecord, NodeRecord, SceneState};
    use crate::step::StepContext;
    use crate::test_support::{registry, Relay};
    use crate::types::Position;
    use std::path::Path;

    #[test]
    fn test_valid_scene() {
        let mut scene = WorkflowScene::new();
        let a = scene.add_step(Box::new(Relay::ready("a"))).unwrap();
        let b = scene.add_step(Box::new(Relay::ready("b"))).unwrap();
        scene.connect(a, 1, b, 0).unwrap();

        assert!(validate_scene(&scene).is_empty());
    }

    #[test]
    fn test_cycle_and_unconfigured() {
        let mut scene = WorkflowScene::new();
        let a = scene.add_step(Box::new(Relay::ready("a"))).unwrap();
        let b = scene.add_step(Box::new(Relay::ready("b"))).unwrap();
        scene.connect(a, 1, b, 0).unwrap();
        scene.connect(b, 1, a, 0).unwrap();

        let errors = validate_scene(&scene);
        assert!(errors.contains(&ValidationError::CycleDetected));

        let mut scene = WorkflowScene::new();
        let a = scene.add_step(Box::new(Relay::ready("a"))).unwrap();
        let b = scene
            .add_step(Box::new(Relay::new(StepContext::default())))
            .unwrap();
        scene.connect(a, 1, b, 0).unwrap();

        let errors = validate_scene(&scene);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnconfiguredStep { step, .. } if *step == b)));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::MissingIdentifier { step, .. } if *step == b)));
    }

    #[test]
    fn test_loaded_port_problems_reported() {
        // loading skips compatibility checks, so bad indexes survive to here
        let node = |identifier: &str, connections| NodeRecord {
            name: "Relay".into(),
            position: Position::default(),
            selected: false,
            identifier: identifier.into(),
            connections,
        };
        let state = SceneState::new(vec![
            node(
                "a",
                vec![
                    ConnectionRecord {
                        connected_from_index: 0,
                        connected_to: 1,
                        connected_to_index: 0,
                        selected: false,
                    },
                    ConnectionRecord {
                        connected_from_index: 1,
                        connected_to: 1,
                        connected_to_index: 7,
                        selected: false,
                    },
                ],
            ),
            node("b", vec![]),
        ]);

        let mut scene = WorkflowScene::new();
        scene
            .load_state(&state, Path::new("does-not-exist"), &registry())
            .unwrap();

        let errors = validate_scene(&scene);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::IncompatiblePorts { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::PortIndexOutOfRange { index: 7, .. })));
    }

    #[test]
    fn test_display() {
        let error = ValidationError::DuplicateIdentifier {
            identifier: "x".into(),
        };
        assert_eq!(error.to_string(), "Identifier 'x' is used by more than one step");
    }
}
