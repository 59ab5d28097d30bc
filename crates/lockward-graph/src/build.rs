//! Graph construction from a root manifest and a lockfile snapshot.
//!
//! Nodes are placed first, parents before children, so that every edge can
//! be resolved the moment it is declared. The override tree is installed
//! before any edge exists; edges then pick up their rules as they are added
//! and push them into their targets.

use std::collections::HashMap;

use lockward_core::config::EngineConfig;
use lockward_core::lockfile::{package_name, parent_location, Lockfile};
use lockward_core::manifest::PackageManifest;
use lockward_util::errors::{LockwardError, LockwardResult};

use crate::edge::EdgeType;
use crate::graph::{Graph, NewNode, NodeId};

/// Builds a [`Graph`] for one install session.
pub struct GraphBuilder<'a> {
    manifest: &'a PackageManifest,
    lockfile: Option<&'a Lockfile>,
    config: Option<&'a EngineConfig>,
    reference_root: Option<&'a PackageManifest>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(manifest: &'a PackageManifest) -> Self {
        Self {
            manifest,
            lockfile: None,
            config: None,
            reference_root: None,
        }
    }

    /// Installed packages to place under the root.
    pub fn lockfile(mut self, lockfile: &'a Lockfile) -> Self {
        self.lockfile = Some(lockfile);
        self
    }

    pub fn config(mut self, config: &'a EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Resolve `$name` override references against `manifest` instead of the
    /// root manifest.
    pub fn reference_root(mut self, manifest: &'a PackageManifest) -> Self {
        self.reference_root = Some(manifest);
        self
    }

    pub fn build(self) -> LockwardResult<Graph> {
        let mut graph = Graph::new(self.manifest.clone());
        if let Some(reference) = self.reference_root {
            graph.set_reference_root(reference.clone());
        }

        let mut placed = vec![graph.root()];
        if let Some(lockfile) = self.lockfile {
            place_packages(&mut graph, lockfile, &mut placed)?;
        }

        let overrides_enabled = self.config.map_or(true, |c| c.overrides.enabled);
        match &self.manifest.overrides {
            Some(value) if overrides_enabled => graph.set_overrides(Some(value))?,
            Some(_) => tracing::debug!("overrides disabled by configuration"),
            None => {}
        }

        for node in placed {
            declare_edges(&mut graph, node)?;
        }
        tracing::debug!(
            nodes = graph.len(),
            edges = graph.edge_ids().count(),
            "built dependency graph"
        );
        Ok(graph)
    }
}

fn place_packages(
    graph: &mut Graph,
    lockfile: &Lockfile,
    placed: &mut Vec<NodeId>,
) -> LockwardResult<()> {
    let mut by_location: HashMap<&str, NodeId> = HashMap::new();
    by_location.insert("", graph.root());

    for location in lockfile.locations() {
        let Some(locked) = lockfile.packages.get(location) else {
            continue;
        };
        if locked.link {
            tracing::trace!(location, "skipping link entry");
            continue;
        }
        let workspace_folder = !location.starts_with("node_modules/");
        let name = if workspace_folder {
            locked.package.name.as_deref().or(package_name(location))
        } else {
            package_name(location)
        };
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return Err(LockwardError::Lockfile {
                message: format!("cannot determine the package name at \"{location}\""),
            });
        };
        let parent_at = parent_location(location).unwrap_or("");
        let Some(&parent) = by_location.get(parent_at) else {
            return Err(LockwardError::Lockfile {
                message: format!("package at \"{location}\" has no entry for \"{parent_at}\""),
            });
        };

        let id = graph.insert_node(
            parent,
            NewNode {
                name: name.to_string(),
                version: locked.package.version.clone(),
                package: locked.package.clone(),
                resolved: locked.resolved.clone(),
                in_bundle: locked.in_bundle,
                has_shrinkwrap: locked.has_shrinkwrap,
            },
        )?;
        if workspace_folder {
            graph.nodes[id.0].location = location.to_string();
        }
        by_location.insert(location, id);
        placed.push(id);
    }
    Ok(())
}

/// Declare one edge per dependency-table entry of `node`.
fn declare_edges(graph: &mut Graph, node: NodeId) -> LockwardResult<()> {
    let package = graph.node(node)?.package.clone();
    let is_root = node == graph.root();

    for (name, spec) in &package.dependencies {
        // listed again under optionalDependencies, which wins
        if package.optional_dependencies.contains_key(name) {
            continue;
        }
        graph.add_edge(node, EdgeType::Prod, name, spec)?;
    }
    for (name, spec) in &package.optional_dependencies {
        graph.add_edge(node, EdgeType::Optional, name, spec)?;
    }
    for (name, spec) in &package.peer_dependencies {
        let edge_type = if package.is_optional_peer(name) {
            EdgeType::PeerOptional
        } else {
            EdgeType::Peer
        };
        graph.add_edge(node, edge_type, name, spec)?;
    }
    if is_root {
        for (name, spec) in &package.dev_dependencies {
            graph.add_edge(node, EdgeType::Dev, name, spec)?;
        }
    }
    Ok(())
}
