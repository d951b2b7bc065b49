// crates/fourd-cli/src/config.rs
//
// JSON configuration for the fourd-* binaries: which cameras each Slave is
// expected to own (the topology map), how long a camera can go quiet
// before the Master's registry declares it offline, how often the farm
// poller ticks, and where submissions get written. Resolved the way the
// teacher resolves its own user config — a platform config directory via
// `dirs`, JSON via `serde_json`, with an explicit `--config PATH` override
// taking priority over the discovered default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Slave name -> the camera serials it's expected to own.
    pub topology: HashMap<String, Vec<String>>,
    #[serde(default = "default_offline_deadline_secs")]
    pub offline_deadline_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    pub submit_root: PathBuf,
    #[serde(default)]
    pub shot_root: PathBuf,
}

fn default_offline_deadline_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topology: HashMap::new(),
            offline_deadline_secs: default_offline_deadline_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            submit_root: PathBuf::from("./submit"),
            shot_root: PathBuf::from("./shots"),
        }
    }
}

impl Config {
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };
        let text = std::fs::read_to_string(&path).map_err(|e| CliError::Config(format!("reading {}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| CliError::Config(format!("parsing {}: {e}", path.display())))
    }

    fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| CliError::Config("no platform config directory available".into()))?;
        Ok(dir.join("fourdrec").join("config.json"))
    }

    pub fn expected_cameras(&self, slave_name: &str) -> &[String] {
        self.topology.get(slave_name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_expected_cameras(&self) -> Vec<String> {
        self.topology.values().flatten().cloned().collect()
    }
}
