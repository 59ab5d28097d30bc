use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use lockward_util::errors::{LockwardError, LockwardResult};

/// Name of the package manifest file.
pub const MANIFEST_FILE: &str = "package.json";

/// The parts of a `package.json` the engine reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub peer_dependencies_meta: BTreeMap<String, PeerDependencyMeta>,

    #[serde(default, alias = "bundledDependencies")]
    pub bundle_dependencies: BundleDependencies,

    /// Raw `overrides` object; parsed by the graph crate into a rule tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<serde_json::Value>,
}

/// Entry of `peerDependenciesMeta`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerDependencyMeta {
    #[serde(default)]
    pub optional: bool,
}

/// `bundleDependencies` is either a list of names or `true` for "all of
/// `dependencies`".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleDependencies {
    All(bool),
    Names(Vec<String>),
}

impl Default for BundleDependencies {
    fn default() -> Self {
        Self::Names(Vec::new())
    }
}

impl PackageManifest {
    /// Load and parse a `package.json` file from the given path.
    pub fn from_path(path: &Path) -> LockwardResult<Self> {
        let content = lockward_util::fs::read_to_string(path, "manifest")?;
        Self::parse_json(&content)
    }

    /// Parse a manifest from JSON text.
    pub fn parse_json(content: &str) -> LockwardResult<Self> {
        serde_json::from_str(content).map_err(|e| LockwardError::Manifest {
            message: e.to_string(),
        })
    }

    /// Whether `name` is shipped inside this package's tarball.
    pub fn is_bundled(&self, name: &str) -> bool {
        match &self.bundle_dependencies {
            BundleDependencies::All(all) => {
                *all && (self.dependencies.contains_key(name)
                    || self.optional_dependencies.contains_key(name))
            }
            BundleDependencies::Names(names) => names.iter().any(|n| n == name),
        }
    }

    /// Whether the peer dependency `name` is marked optional.
    pub fn is_optional_peer(&self, name: &str) -> bool {
        self.peer_dependencies_meta
            .get(name)
            .is_some_and(|meta| meta.optional)
    }

    /// Look up the spec a `$name` override reference points at.
    ///
    /// Tables are consulted in the order `dependencies`, `devDependencies`,
    /// `optionalDependencies`, `peerDependencies`.
    pub fn lookup_reference(&self, name: &str) -> Option<&str> {
        [
            &self.dependencies,
            &self.dev_dependencies,
            &self.optional_dependencies,
            &self.peer_dependencies,
        ]
        .into_iter()
        .find_map(|table| table.get(name))
        .map(String::as_str)
    }
}
