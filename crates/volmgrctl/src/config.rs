//! TOML configuration for the CLI: where the store lives, how far the
//! brick ceiling can be pushed, and whether to talk to real storage nodes
//! or exercise the in-memory executor double.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the store's JSON sidecar file.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Overrides [`common::BRICK_MAX_NUM`] when present.
    pub brick_max_num: Option<usize>,

    /// Use the in-memory [`executor::mock::MockExecutor`] instead of
    /// dialing real storage-node agents.
    #[serde(default)]
    pub mock_executor: bool,

    /// `node id -> host:port` map for [`executor::tcp::TcpExecutor`].
    /// Ignored when `mock_executor` is set.
    #[serde(default)]
    pub agent_addresses: HashMap<String, String>,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("volmgr.store.json")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store_path: default_store_path(),
            brick_max_num: None,
            mock_executor: true,
            agent_addresses: HashMap::new(),
        }
    }
}

impl Config {
    /// Loads `path` if it exists; falls back to defaults otherwise, so the
    /// CLI runs out of the box without a config file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn brick_max_num(&self) -> usize {
        self.brick_max_num.unwrap_or(common::BRICK_MAX_NUM)
    }
}
