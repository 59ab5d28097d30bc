use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use lockward_util::errors::{LockwardError, LockwardResult};

use crate::manifest::PackageManifest;

const NODE_MODULES: &str = "node_modules/";

/// Snapshot of an installed tree in `package-lock.json` (v2/v3) shape.
///
/// Keys of `packages` are install locations: `""` is the root project,
/// `node_modules/a/node_modules/b` is `b` nested under `a`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lockfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub lockfile_version: u32,
    #[serde(default)]
    pub packages: BTreeMap<String, LockedPackage>,
}

/// One installed package with its declared dependency tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedPackage {
    #[serde(flatten)]
    pub package: PackageManifest,
    #[serde(default)]
    pub resolved: Option<String>,
    #[serde(default)]
    pub integrity: Option<String>,
    #[serde(default)]
    pub in_bundle: bool,
    #[serde(default)]
    pub has_shrinkwrap: bool,
    #[serde(default)]
    pub dev: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub peer: bool,
    #[serde(default)]
    pub link: bool,
}

impl Lockfile {
    /// Load and parse a `package-lock.json` file from the given path.
    pub fn from_path(path: &Path) -> LockwardResult<Self> {
        let content = lockward_util::fs::read_to_string(path, "lockfile")?;
        Self::parse_json(&content)
    }

    /// Parse a lockfile from JSON text.
    pub fn parse_json(content: &str) -> LockwardResult<Self> {
        let lockfile: Lockfile =
            serde_json::from_str(content).map_err(|e| LockwardError::Lockfile {
                message: e.to_string(),
            })?;
        if lockfile.lockfile_version == 1 {
            return Err(LockwardError::Lockfile {
                message: "lockfileVersion 1 has no \"packages\" section".to_string(),
            });
        }
        Ok(lockfile)
    }

    /// Non-root locations ordered so every parent comes before its children.
    pub fn locations(&self) -> Vec<&str> {
        let mut locations: Vec<&str> = self
            .packages
            .keys()
            .map(String::as_str)
            .filter(|l| !l.is_empty())
            .collect();
        locations.sort_by_key(|l| (depth(l), *l));
        locations
    }
}

/// Package name implied by a location: the path after the last
/// `node_modules/`, or the last path segment for workspace folders.
pub fn package_name(location: &str) -> Option<&str> {
    if location.is_empty() {
        return None;
    }
    match location.rfind(NODE_MODULES) {
        Some(i) => Some(&location[i + NODE_MODULES.len()..]),
        None => location.rsplit('/').next(),
    }
}

/// Location of the folder that contains `location`. The root has none.
pub fn parent_location(location: &str) -> Option<&str> {
    if location.is_empty() {
        return None;
    }
    match location.rfind("/node_modules/") {
        Some(i) => Some(&location[..i]),
        None => Some(""),
    }
}

fn depth(location: &str) -> usize {
    location.matches(NODE_MODULES).count()
}
