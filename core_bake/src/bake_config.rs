use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

use crate::fields::GrowthBarriers;
use crate::geodesic::Connectivity;
use crate::neighbors::NeighborParams;

pub const BUILTIN_BAKE_CONFIG: &str = include_str!("data/bake_config.json");

/// Environment variable naming a JSON file that replaces the builtin config.
pub const BAKE_CONFIG_ENV: &str = "GRAPH_BAKE_CONFIG";

#[derive(Resource, Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    fields: FieldGrowthConfig,
    rivers: RiverFlowConfig,
    neighbors: NeighborSearchConfig,
}

impl BakeConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_BAKE_CONFIG).expect("builtin bake config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, BakeConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| BakeConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = BakeConfig::from_json_str(&contents)?;
        Ok(config)
    }

    /// Config named by [`BAKE_CONFIG_ENV`], falling back to the builtin one.
    pub fn load() -> (Arc<Self>, BakeConfigMetadata) {
        load_bake_config_from_env()
    }

    pub fn fields(&self) -> &FieldGrowthConfig {
        &self.fields
    }

    pub fn rivers(&self) -> &RiverFlowConfig {
        &self.rivers
    }

    pub fn neighbors(&self) -> &NeighborSearchConfig {
        &self.neighbors
    }
}

#[derive(Debug, Error)]
pub enum BakeConfigError {
    #[error("failed to parse bake config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read bake config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldGrowthConfig {
    connectivity: Connectivity,
    block_regions: bool,
    block_rivers: bool,
    river_flow: bool,
}

impl FieldGrowthConfig {
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn barriers(&self) -> GrowthBarriers {
        let mut barriers = GrowthBarriers::empty();
        barriers.set(GrowthBarriers::REGION, self.block_regions);
        barriers.set(GrowthBarriers::RIVER, self.block_rivers);
        barriers.set(GrowthBarriers::RIVER_FLOW, self.river_flow);
        barriers
    }
}

impl Default for FieldGrowthConfig {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Eight,
            block_regions: true,
            block_rivers: false,
            river_flow: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RiverFlowConfig {
    connectivity: Connectivity,
}

impl RiverFlowConfig {
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NeighborSearchConfig {
    connectivity: Connectivity,
    max_expanded_cells: usize,
    river_fallback: bool,
}

impl NeighborSearchConfig {
    pub fn params(&self) -> NeighborParams {
        NeighborParams {
            connectivity: self.connectivity,
            max_expanded_cells: self.max_expanded_cells,
            river_fallback: self.river_fallback,
        }
    }
}

impl Default for NeighborSearchConfig {
    fn default() -> Self {
        let params = NeighborParams::default();
        Self {
            connectivity: params.connectivity,
            max_expanded_cells: params.max_expanded_cells,
            river_fallback: params.river_fallback,
        }
    }
}

#[derive(Resource, Debug, Clone)]
pub struct BakeConfigMetadata {
    path: Option<PathBuf>,
}

impl BakeConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

pub fn load_bake_config_from_env() -> (Arc<BakeConfig>, BakeConfigMetadata) {
    if let Some(path) = env::var(BAKE_CONFIG_ENV).ok().map(PathBuf::from) {
        match BakeConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "graph_bake::config",
                    path = %path.display(),
                    "bake_config.loaded=file"
                );
                return (Arc::new(config), BakeConfigMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "graph_bake::config",
                    path = %path.display(),
                    error = %err,
                    "bake_config.load_failed"
                );
            }
        }
    }

    let config = BakeConfig::builtin();
    tracing::info!(target: "graph_bake::config", "bake_config.loaded=builtin");
    (config, BakeConfigMetadata::new(None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_parses() {
        let config = BakeConfig::builtin();
        assert_eq!(config.fields().connectivity(), Connectivity::Eight);
        assert_eq!(
            config.fields().barriers(),
            GrowthBarriers::REGION | GrowthBarriers::RIVER_FLOW
        );
        assert_eq!(config.neighbors().params(), NeighborParams::default());
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config = BakeConfig::from_json_str("{}").expect("empty object parses");
        assert_eq!(config.rivers().connectivity(), Connectivity::Eight);
        assert!(config.neighbors().params().river_fallback);
    }

    #[test]
    fn partial_sections_override_only_named_keys() {
        let config = BakeConfig::from_json_str(
            r#"{ "fields": { "connectivity": "four", "block_rivers": true },
                 "neighbors": { "max_expanded_cells": 10 } }"#,
        )
        .expect("partial config parses");
        assert_eq!(config.fields().connectivity(), Connectivity::Four);
        assert!(config.fields().barriers().contains(GrowthBarriers::RIVER));
        assert!(config.fields().barriers().contains(GrowthBarriers::REGION));
        assert_eq!(config.neighbors().params().max_expanded_cells, 10);
        assert_eq!(config.neighbors().params().connectivity, Connectivity::Eight);
    }

    #[test]
    fn unknown_connectivity_is_rejected() {
        let err = BakeConfig::from_json_str(r#"{ "rivers": { "connectivity": "six" } }"#);
        assert!(err.is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let path = Path::new("/nonexistent/graph_bake/config.json");
        match BakeConfig::from_file(path) {
            Err(BakeConfigError::ReadFailed { path: reported, .. }) => {
                assert_eq!(reported, path);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
