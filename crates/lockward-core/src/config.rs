use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use lockward_util::errors::{LockwardError, LockwardResult};

use crate::manifest::MANIFEST_FILE;

/// Name of the per-project configuration file.
pub const CONFIG_FILE: &str = "lockward.toml";

/// Engine configuration loaded from `lockward.toml` in the project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub overrides: OverridesConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// Settings from `[overrides]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverridesConfig {
    /// When false the manifest's `overrides` are ignored entirely.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for OverridesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Settings from `[report]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Edge states that make a graph report count as failed.
    #[serde(default = "default_fail_on", rename = "fail-on")]
    pub fail_on: Vec<FailOn>,

    /// Report problems on optional edges as well.
    #[serde(default, rename = "include-optional")]
    pub include_optional: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            fail_on: default_fail_on(),
            include_optional: false,
        }
    }
}

fn default_fail_on() -> Vec<FailOn> {
    vec![FailOn::Missing, FailOn::Invalid]
}

/// An edge state that can be configured as fatal in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailOn {
    Missing,
    PeerLocal,
    Invalid,
}

impl EngineConfig {
    /// Load `lockward.toml` from `project_root`, or return defaults if the file doesn't exist.
    pub fn load(project_root: &Path) -> LockwardResult<Self> {
        let path = Self::path_in(project_root);
        if path.is_file() {
            let content = lockward_util::fs::read_to_string(&path, "config")?;
            Self::parse_toml(&content)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load the config of the project enclosing `start`, i.e. the nearest
    /// ancestor holding a `package.json`. Defaults when there is none.
    pub fn discover(start: &Path) -> LockwardResult<Self> {
        match lockward_util::fs::find_ancestor_with(start, MANIFEST_FILE) {
            Some(root) => Self::load(&root),
            None => Ok(Self::default()),
        }
    }

    pub fn parse_toml(content: &str) -> LockwardResult<Self> {
        toml::from_str(content).map_err(|e| LockwardError::Config {
            message: e.to_string(),
        })
    }

    /// Path of the config file inside a project.
    pub fn path_in(project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_FILE)
    }
}
