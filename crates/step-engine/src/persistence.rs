//! Persisted scene layout
//!
//! A saved scene is a list of node records in step insertion order. Each
//! record carries the connections that leave it, pointing at other records
//! by position in the list:
//!
//! ```json
//! {
//!   "version": "1.1",
//!   "nodes": {
//!     "nodelist": [
//!       {
//!         "name": "Text Source",
//!         "position": [0.0, 0.0],
//!         "selected": false,
//!         "identifier": "source1",
//!         "connections": [
//!           { "connectedFromIndex": 0, "connectedTo": 1, "connectedToIndex": 0, "selected": false }
//!         ]
//!       }
//!     ]
//!   }
//! }
//! ```
//!
//! Port indexes were added in 1.1; records without them load as port 0.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};
use crate::types::Position;

/// Version written into every saved scene
pub const WORKFLOW_VERSION: &str = "1.1";

/// Whether a stored version can be read by this build
///
/// Any version sharing the major component is accepted.
pub fn is_compatible_version(found: &str) -> bool {
    fn major(version: &str) -> &str {
        version.split('.').next().unwrap_or(version)
    }
    !found.is_empty() && major(found) == major(WORKFLOW_VERSION)
}

/// Root of a saved scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneState {
    pub version: String,
    pub nodes: NodesGroup,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodesGroup {
    #[serde(default)]
    pub nodelist: Vec<NodeRecord>,
}

/// One step in a saved scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

/// An outgoing connection of a saved step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    #[serde(default)]
    pub connected_from_index: usize,
    /// Position of the destination in the node list
    pub connected_to: usize,
    #[serde(default)]
    pub connected_to_index: usize,
    #[serde(default)]
    pub selected: bool,
}

impl SceneState {
    pub fn new(nodelist: Vec<NodeRecord>) -> Self {
        Self {
            version: WORKFLOW_VERSION.to_string(),
            nodes: NodesGroup { nodelist },
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.nodelist.len()
    }

    /// Check every connection points at a record other than its own
    pub fn check_references(&self) -> Result<()> {
        let count = self.node_count();
        for (from, node) in self.nodes.nodelist.iter().enumerate() {
            for record in &node.connections {
                if record.connected_to >= count {
                    return Err(WorkflowError::malformed(format!(
                        "node {} connects to node {} but only {} nodes exist",
                        from, record.connected_to, count
                    )));
                }
                if record.connected_to == from {
                    return Err(WorkflowError::malformed(format!(
                        "node {} connects to itself",
                        from
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a saved scene from `path`
    pub fn read_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Write this scene to `path`
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl Default for SceneState {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_layout() {
        let state = SceneState::new(vec![
            NodeRecord {
                name: "Text Source".into(),
                position: Position(1.0, 2.0),
                selected: true,
                identifier: "src".into(),
                connections: vec![ConnectionRecord {
                    connected_from_index: 0,
                    connected_to: 1,
                    connected_to_index: 2,
                    selected: false,
                }],
            },
            NodeRecord {
                name: "Text Store".into(),
                position: Position(3.0, 4.0),
                selected: false,
                identifier: "out".into(),
                connections: vec![],
            },
        ]);

        let json: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        assert_eq!(json["version"], WORKFLOW_VERSION);
        let first = &json["nodes"]["nodelist"][0];
        assert_eq!(first["name"], "Text Source");
        assert_eq!(first["position"], serde_json::json!([1.0, 2.0]));
        assert_eq!(first["connections"][0]["connectedTo"], 1);
        assert_eq!(first["connections"][0]["connectedToIndex"], 2);
        assert_eq!(first["connections"][0]["connectedFromIndex"], 0);
    }

    #[test]
    fn test_legacy_connection_without_indexes() {
        let json = r#"{
            "version": "1.0",
            "nodes": { "nodelist": [
                { "name": "A", "position": [0, 0], "identifier": "a",
                  "connections": [ { "connectedTo": 1 } ] },
                { "name": "B", "position": [10, 0] }
            ]}
        }"#;
        let state = SceneState::from_json(json).unwrap();
        let record = state.nodes.nodelist[0].connections[0];
        assert_eq!(record.connected_to, 1);
        assert_eq!(record.connected_from_index, 0);
        assert_eq!(record.connected_to_index, 0);
        assert!(!state.nodes.nodelist[1].selected);
        assert!(state.check_references().is_ok());
    }

    #[test]
    fn test_check_references_rejects_dangling() {
        let mut state = SceneState::new(vec![NodeRecord {
            name: "A".into(),
            position: Position::default(),
            selected: false,
            identifier: String::new(),
            connections: vec![ConnectionRecord {
                connected_from_index: 0,
                connected_to: 3,
                connected_to_index: 0,
                selected: false,
            }],
        }]);
        assert!(matches!(
            state.check_references(),
            Err(WorkflowError::MalformedState(_))
        ));

        state.nodes.nodelist[0].connections[0].connected_to = 0;
        assert!(state.check_references().is_err());
    }

    #[test]
    fn test_version_compatibility() {
        assert!(is_compatible_version(WORKFLOW_VERSION));
        assert!(is_compatible_version("1.0"));
        assert!(!is_compatible_version("0.2.0"));
        assert!(!is_compatible_version("2.0"));
        assert!(!is_compatible_version(""));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        let state = SceneState::empty();
        state.write_to(&path).unwrap();
        assert_eq!(SceneState::read_from(&path).unwrap(), state);
    }
}
