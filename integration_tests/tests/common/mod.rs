#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;

use bevy::math::UVec2;
use core_bake::{BakeConfig, RasterGrid};
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Point `GRAPH_BAKE_CONFIG` at the fixture config and install a test subscriber.
pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_bake_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test bake config at {}",
            config_path.display()
        );

        std::env::set_var("GRAPH_BAKE_CONFIG", &config_path);

        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn test_config() -> BakeConfig {
    ensure_test_config();
    let (config, _) = BakeConfig::load();
    (*config).clone()
}

pub fn seed_mask(grid: RasterGrid, seeds: &[(u32, u32)]) -> Vec<bool> {
    let mut mask = vec![false; grid.len()];
    for &(x, y) in seeds {
        mask[grid.index(UVec2::new(x, y))] = true;
    }
    mask
}

pub fn column_mask(grid: RasterGrid, column: u32) -> Vec<bool> {
    (0..grid.len()).map(|i| grid.coord(i).x == column).collect()
}
