//! Graph loader - YAML/JSON file loading and parsing
//!
//! This module handles loading graph specs from disk. Files ending in
//! `.json` are parsed as JSON; everything else as YAML.

use super::graph::GraphSpec;
use crate::engine::error::EngineError;
use std::fs;
use std::path::Path;

/// Loads graph specs from YAML or JSON files
pub struct GraphLoader;

impl GraphLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a graph spec from a file
    pub fn load_graph<P: AsRef<Path>>(&self, path: P) -> Result<GraphSpec, EngineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        log::debug!("Loading graph spec from {}", path.display());

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

    /// Parse a graph spec from a YAML string
    pub fn parse_yaml(content: &str) -> Result<GraphSpec, EngineError> {
        let spec: GraphSpec = serde_yaml::from_str(content)?;
        Ok(spec)
    }

    /// Parse a graph spec from a JSON string
    pub fn parse_json(content: &str) -> Result<GraphSpec, EngineError> {
        let spec: GraphSpec = serde_json::from_str(content)?;
        Ok(spec)
    }
}

impl Default for GraphLoader {
    fn default() -> Self {
        Self::new()
    }
}
