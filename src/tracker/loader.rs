// SPDX-License-Identifier: MIT

//! Flow loader - YAML/JSON file loading and parsing

use std::fs;
use std::path::Path;

use crate::flow::error::FlowError;
use crate::flow::graph::FlowDefinition;

/// Loads flow definitions from YAML or JSON files
pub struct FlowLoader;

impl FlowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a flow definition; `.json` files are parsed as JSON, anything
    /// else as YAML
    pub fn load_flow<P: AsRef<Path>>(&self, path: P) -> Result<FlowDefinition, FlowError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::parse_json(&content)
        } else {
            Self::parse_yaml(&content)
        }
    }

    /// Parse a flow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<FlowDefinition, FlowError> {
        let def: FlowDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }

    /// Parse a flow definition from a JSON string
    pub fn parse_json(content: &str) -> Result<FlowDefinition, FlowError> {
        let def: FlowDefinition = serde_json::from_str(content)?;
        Ok(def)
    }
}

impl Default for FlowLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::graph::RunOnceKind;

    #[test]
    fn test_parse_yaml_flow() {
        let yaml = r#"
id: welcome
name: Welcome flow
nodes:
  - id: start
    module: builtin
    class_name: start
    start: true
  - id: check
    module: builtin
    class_name: if
    init:
      condition: "profile@visits > 1"
    outputs: ["true", "false"]
    run_once:
      type: condition
      expression: "profile@visits > 1"
      ttl: 120
edges:
  - id: e1
    source: { node_id: start }
    target: { node_id: check }
"#;
        let def = FlowLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.id, "welcome");
        assert_eq!(def.nodes.len(), 2);
        assert!(def.nodes[0].start);

        let check = &def.nodes[1];
        assert_eq!(check.outputs, vec!["true".to_string(), "false".to_string()]);
        let once = check.run_once.as_ref().unwrap();
        assert_eq!(once.kind, RunOnceKind::Condition);
        assert_eq!(once.ttl, 120);

        assert_eq!(def.edges[0].source.port, "payload");
        assert!(def.edges[0].enabled);
    }

    #[test]
    fn test_parse_json_flow() {
        let json = r#"{
            "id": "f",
            "name": "f",
            "nodes": [{"id": "a", "module": "builtin", "class_name": "start", "start": true}],
            "edges": []
        }"#;
        let def = FlowLoader::parse_json(json).unwrap();
        assert_eq!(def.nodes[0].inputs, vec!["payload".to_string()]);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        assert!(matches!(
            FlowLoader::parse_yaml("nodes: [unclosed"),
            Err(FlowError::Yaml(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            FlowLoader::new().load_flow("/nonexistent/flow.yaml"),
            Err(FlowError::Io(_))
        ));
    }
}
