//! The install graph: an arena of nodes and edges addressed by id.
//!
//! Nodes and edges refer to each other only through [`NodeId`] and
//! [`EdgeId`], so the node ↔ edge back-references never own anything. The
//! structural tree (which folder a package is installed in) is kept apart
//! from the dependency edges: `parent`/`children` describe `node_modules`
//! nesting, `edges_in`/`edges_out` describe requirements.

use std::collections::{BTreeMap, BTreeSet};

use deno_semver::Version;
use lockward_core::manifest::PackageManifest;
use lockward_core::spec::parse_version;
use lockward_util::errors::{LockwardError, LockwardResult};
use serde_json::Value;

use crate::edge::{Edge, EdgeState};
use crate::overrides::{OverrideTree, RuleId};

/// Identifier of a node in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct NodeId(pub usize);

/// Identifier of an edge in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct EdgeId(pub usize);

/// A resolved package instance.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub version: Option<Version>,
    /// Install location, `""` for the root, `node_modules/a` for a top-level package.
    pub location: String,
    pub package: PackageManifest,
    pub resolved: Option<String>,
    pub in_bundle: bool,
    pub in_shrinkwrap: bool,
    pub has_shrinkwrap: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: BTreeMap<String, NodeId>,
    pub(crate) edges_in: BTreeSet<EdgeId>,
    pub(crate) edges_out: BTreeMap<String, EdgeId>,
    pub(crate) overrides: Option<RuleId>,
    pub(crate) removed: bool,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &BTreeMap<String, NodeId> {
        &self.children
    }

    pub fn edges_in(&self) -> &BTreeSet<EdgeId> {
        &self.edges_in
    }

    pub fn edges_out(&self) -> &BTreeMap<String, EdgeId> {
        &self.edges_out
    }

    pub fn overrides(&self) -> Option<RuleId> {
        self.overrides
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Bundled and shrinkwrapped packages keep the versions their publisher
    /// locked; overrides never apply to them.
    pub fn is_pinned(&self) -> bool {
        self.has_shrinkwrap || self.in_shrinkwrap || self.in_bundle
    }

    /// `name@version`, or just the name for unversioned nodes.
    pub fn label(&self) -> String {
        match &self.version {
            Some(v) => format!("{}@{v}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Everything needed to place a new package in the tree.
#[derive(Debug, Clone, Default)]
pub struct NewNode {
    pub name: String,
    pub version: Option<String>,
    pub package: PackageManifest,
    pub resolved: Option<String>,
    pub in_bundle: bool,
    pub has_shrinkwrap: bool,
}

/// An install graph for one session.
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) rules: OverrideTree,
    pub(crate) root: NodeId,
    pub(crate) reference_root: Option<PackageManifest>,
}

impl Graph {
    /// Create a graph holding only the root package.
    pub fn new(root: PackageManifest) -> Self {
        let name = root.name.clone().unwrap_or_else(|| "root".to_string());
        let version = parse_node_version(&name, root.version.as_deref());
        let node = Node {
            name,
            version,
            location: String::new(),
            package: root,
            resolved: None,
            in_bundle: false,
            in_shrinkwrap: false,
            has_shrinkwrap: false,
            parent: None,
            children: BTreeMap::new(),
            edges_in: BTreeSet::new(),
            edges_out: BTreeMap::new(),
            overrides: None,
            removed: false,
        };
        Self {
            nodes: vec![node],
            edges: Vec::new(),
            rules: OverrideTree::new(),
            root: NodeId(0),
            reference_root: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> LockwardResult<&Node> {
        self.nodes
            .get(id.0)
            .ok_or(LockwardError::UnknownNode { id: id.0 })
    }

    pub fn edge(&self, id: EdgeId) -> LockwardResult<&Edge> {
        self.edges
            .get(id.0)
            .ok_or(LockwardError::UnknownEdge { id: id.0 })
    }

    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> LockwardResult<&mut Edge> {
        self.edges
            .get_mut(id.0)
            .ok_or(LockwardError::UnknownEdge { id: id.0 })
    }

    pub fn rules(&self) -> &OverrideTree {
        &self.rules
    }

    /// Ids of nodes currently in the tree, root first.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len())
            .map(NodeId)
            .filter(|&id| !self.nodes[id.0].removed)
    }

    /// Ids of edges that have not been detached.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.edges.len())
            .map(EdgeId)
            .filter(|&id| !self.edges[id.0].is_detached())
    }

    pub fn find_location(&self, location: &str) -> Option<NodeId> {
        self.node_ids()
            .find(|&id| self.nodes[id.0].location == location)
    }

    /// The edge `from` declares for `name`, if any.
    pub fn edge_out(&self, from: NodeId, name: &str) -> Option<EdgeId> {
        self.nodes.get(from.0)?.edges_out.get(name).copied()
    }

    /// Number of nodes (excluding root).
    pub fn len(&self) -> usize {
        self.node_ids().count().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Only the root has no parent.
    pub(crate) fn is_top(&self, id: NodeId) -> bool {
        self.nodes[id.0].parent.is_none()
    }

    /// Use `manifest` instead of the root node's package when resolving `$name`
    /// override references. Needed when the graph root is a virtual root, such
    /// as a single workspace member, rather than the project itself.
    pub fn set_reference_root(&mut self, manifest: PackageManifest) {
        self.reference_root = Some(manifest);
        for edge in self.edges.iter_mut().filter(|e| !e.is_detached()) {
            edge.explanation = None;
            edge.error = None;
        }
    }

    /// The manifest `$name` references resolve against.
    pub fn reference_manifest(&self) -> &PackageManifest {
        self.reference_root
            .as_ref()
            .unwrap_or(&self.nodes[self.root.0].package)
    }

    /// node_modules lookup: the node's own children, then each ancestor's.
    pub(crate) fn resolve(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            let node = &self.nodes[id.0];
            if let Some(&child) = node.children.get(name) {
                return Some(child);
            }
            current = node.parent;
        }
        None
    }

    /// Replace the root override configuration and re-derive every node's
    /// override scope from the root outwards.
    pub fn set_overrides(&mut self, value: Option<&Value>) -> LockwardResult<()> {
        let tree = match value {
            Some(v) => Some(self.rules.add_tree(v)?),
            None => None,
        };
        for node in &mut self.nodes {
            node.overrides = None;
        }
        self.nodes[self.root.0].overrides = tree;

        self.recalculate_out_edges_overrides(self.root);
        let attached: Vec<EdgeId> = self.edge_ids().collect();
        for edge in attached {
            self.reload_edge(edge, true);
        }
        tracing::debug!(edges = self.edges.len(), "applied override configuration");
        Ok(())
    }

    /// Place a new package under `parent`. A sibling with the same name is
    /// removed first. Edges that may now resolve to the new node are reloaded.
    pub fn add_node(&mut self, parent: NodeId, new: NewNode) -> LockwardResult<NodeId> {
        let id = self.insert_node(parent, new)?;
        let name = self.nodes[id.0].name.clone();
        self.reload_edges_named(&name, false);
        Ok(id)
    }

    /// [`add_node`](Self::add_node) without reloading any edge; used while
    /// the graph is built and no edge exists yet.
    pub(crate) fn insert_node(&mut self, parent: NodeId, new: NewNode) -> LockwardResult<NodeId> {
        let parent_node = self.live_node(parent)?;
        if let Some(&existing) = parent_node.children.get(&new.name) {
            self.remove_node(existing)?;
        }
        let parent_node = &self.nodes[parent.0];
        let location = child_location(&parent_node.location, &new.name);
        let in_shrinkwrap = parent_node.has_shrinkwrap || parent_node.in_shrinkwrap;
        let version = parse_node_version(&new.name, new.version.as_deref());

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: new.name.clone(),
            version,
            location,
            package: new.package,
            resolved: new.resolved,
            in_bundle: new.in_bundle,
            in_shrinkwrap,
            has_shrinkwrap: new.has_shrinkwrap,
            parent: Some(parent),
            children: BTreeMap::new(),
            edges_in: BTreeSet::new(),
            edges_out: BTreeMap::new(),
            overrides: None,
            removed: false,
        });
        self.nodes[parent.0].children.insert(new.name, id);
        tracing::trace!(location = %self.nodes[id.0].location, "added node");
        Ok(id)
    }

    /// Move `node` (and its subtree) under `new_parent`.
    pub fn set_parent(&mut self, node: NodeId, new_parent: NodeId) -> LockwardResult<()> {
        self.live_node(node)?;
        self.live_node(new_parent)?;
        if node == self.root {
            return Err(LockwardError::InvalidMutation {
                message: "the root node cannot be moved".to_string(),
            });
        }
        let subtree = self.subtree(node);
        if subtree.contains(&new_parent) {
            return Err(LockwardError::InvalidMutation {
                message: format!(
                    "cannot move {} into its own subtree",
                    self.nodes[node.0].location
                ),
            });
        }

        let name = self.nodes[node.0].name.clone();
        if let Some(old_parent) = self.nodes[node.0].parent {
            self.nodes[old_parent.0].children.remove(&name);
        }
        if let Some(&sibling) = self.nodes[new_parent.0].children.get(&name) {
            if sibling != node {
                self.remove_node(sibling)?;
            }
        }
        self.nodes[node.0].parent = Some(new_parent);
        self.nodes[new_parent.0].children.insert(name.clone(), node);
        self.relocate(node);

        // resolution changes for anything looking for `name`, and for every
        // edge declared inside the moved subtree
        self.reload_edges_named(&name, true);
        for id in subtree {
            let out: Vec<EdgeId> = self.nodes[id.0].edges_out.values().copied().collect();
            for edge in out {
                self.reload_edge(edge, false);
            }
        }
        Ok(())
    }

    /// Remove `node` and everything nested under it. Edges declared by the
    /// removed packages are detached; edges that pointed into the removed
    /// packages are reloaded and may resolve elsewhere or go missing.
    pub fn remove_node(&mut self, node: NodeId) -> LockwardResult<()> {
        self.live_node(node)?;
        if node == self.root {
            return Err(LockwardError::InvalidMutation {
                message: "the root node cannot be removed".to_string(),
            });
        }
        let subtree = self.subtree(node);
        tracing::debug!(
            location = %self.nodes[node.0].location,
            removed = subtree.len(),
            "removing node"
        );

        for &id in &subtree {
            let out: Vec<EdgeId> = self.nodes[id.0].edges_out.values().copied().collect();
            for edge in out {
                self.detach_edge(edge);
            }
        }

        let name = self.nodes[node.0].name.clone();
        if let Some(parent) = self.nodes[node.0].parent {
            if self.nodes[parent.0].children.get(&name) == Some(&node) {
                self.nodes[parent.0].children.remove(&name);
            }
        }

        let mut dangling = Vec::new();
        for &id in &subtree {
            let n = &mut self.nodes[id.0];
            n.removed = true;
            n.parent = None;
            n.children.clear();
            dangling.extend(n.edges_in.iter().copied());
        }
        for edge in dangling {
            self.reload_edge(edge, false);
        }
        Ok(())
    }

    /// Reload every attached edge requesting `name`.
    pub(crate) fn reload_edges_named(&mut self, name: &str, hard: bool) {
        let matching: Vec<EdgeId> = self
            .edge_ids()
            .filter(|&e| self.edges[e.0].name() == name)
            .collect();
        for edge in matching {
            self.reload_edge(edge, hard);
        }
    }

    /// Register `edge` in `node`'s incoming set and merge its override rule.
    pub(crate) fn add_edge_in(&mut self, node: NodeId, edge: EdgeId) {
        self.nodes[node.0].edges_in.insert(edge);
        if let Some(rule) = self.edges[edge.0].overrides {
            self.update_overrides_edge_in_added(node, rule);
        }
    }

    /// Drop `edge` from `node`'s incoming set. `rule` is the override the
    /// edge carried while it pointed at `node`.
    pub(crate) fn delete_edge_in(&mut self, node: NodeId, edge: EdgeId, rule: Option<RuleId>) {
        self.nodes[node.0].edges_in.remove(&edge);
        if let Some(rule) = rule {
            self.update_overrides_edge_in_removed(node, rule);
        }
    }

    /// A new incoming edge brought `rule`: adopt it, refine to it, or keep
    /// the current scope when the two conflict.
    pub(crate) fn update_overrides_edge_in_added(&mut self, node: NodeId, rule: RuleId) {
        if node == self.root {
            return;
        }
        let next = match self.nodes[node.0].overrides {
            None => rule,
            Some(current) if self.rules.is_equal(current, rule) => return,
            Some(current) => match self.rules.find_specific(current, rule) {
                Some(specific) if self.rules.is_equal(current, specific) => return,
                Some(specific) => specific,
                None => {
                    tracing::debug!(
                        node = %self.nodes[node.0].location,
                        "conflicting override sets, keeping current scope"
                    );
                    return;
                }
            },
        };
        self.set_node_overrides(node, Some(next));
    }

    /// An incoming edge carrying `rule` went away. If that rule was the
    /// node's scope, re-derive the scope from the remaining incoming edges.
    pub(crate) fn update_overrides_edge_in_removed(&mut self, node: NodeId, rule: RuleId) {
        if node == self.root {
            return;
        }
        let Some(current) = self.nodes[node.0].overrides else {
            return;
        };
        if !self.rules.is_equal(current, rule) {
            return;
        }
        let mut next: Option<RuleId> = None;
        for edge in &self.nodes[node.0].edges_in {
            let theirs = self.edges[edge.0].overrides;
            next = match (next, theirs) {
                (Some(mine), Some(theirs)) => self.rules.find_specific(theirs, mine),
                (_, theirs) => theirs,
            };
        }
        if self.rules.same(Some(current), next) {
            return;
        }
        self.set_node_overrides(node, next);
    }

    /// Switch `node` to a new scope. Incoming edges are re-evaluated since
    /// their conflict check reads the target's scope.
    fn set_node_overrides(&mut self, node: NodeId, rule: Option<RuleId>) {
        self.nodes[node.0].overrides = rule;
        let edges_in: Vec<EdgeId> = self.nodes[node.0].edges_in.iter().copied().collect();
        for edge in edges_in {
            let e = &mut self.edges[edge.0];
            e.error = None;
            e.explanation = None;
        }
        self.recalculate_out_edges_overrides(node);
    }

    /// Reload every outgoing edge of `node` against its new scope and push
    /// the resulting rules into their targets.
    pub(crate) fn recalculate_out_edges_overrides(&mut self, node: NodeId) {
        let out: Vec<EdgeId> = self.nodes[node.0].edges_out.values().copied().collect();
        for edge in out {
            self.reload_edge(edge, true);
            let e = &self.edges[edge.0];
            if let (Some(to), Some(rule)) = (e.to(), e.overrides) {
                self.update_overrides_edge_in_added(to, rule);
            }
        }
    }

    /// Tear an edge out of both adjacency sets and mark it terminal.
    pub(crate) fn detach_edge(&mut self, edge: EdgeId) {
        let e = &mut self.edges[edge.0];
        if e.is_detached() {
            return;
        }
        e.explanation = None;
        let (from, to, rule) = (e.from, e.to, e.overrides);
        let name = e.name().to_string();
        e.from = None;
        e.to = None;
        e.error = Some(EdgeState::Detached);

        if let Some(to) = to {
            self.delete_edge_in(to, edge, rule);
        }
        if let Some(from) = from {
            let out = &mut self.nodes[from.0].edges_out;
            if out.get(&name) == Some(&edge) {
                out.remove(&name);
            }
        }
        tracing::trace!(edge = %name, "detached edge");
    }

    fn live_node(&self, id: NodeId) -> LockwardResult<&Node> {
        match self.nodes.get(id.0) {
            Some(node) if !node.removed => Ok(node),
            _ => Err(LockwardError::UnknownNode { id: id.0 }),
        }
    }

    /// `node` and all nodes nested under it, parents before children.
    fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = vec![node];
        let mut i = 0;
        while i < out.len() {
            out.extend(self.nodes[out[i].0].children.values().copied());
            i += 1;
        }
        out
    }

    /// Recompute locations and inherited shrinkwrap flags below `node`.
    fn relocate(&mut self, node: NodeId) {
        for id in self.subtree(node) {
            let Some(parent) = self.nodes[id.0].parent else {
                continue;
            };
            let (parent_location, inherited) = {
                let p = &self.nodes[parent.0];
                (p.location.clone(), p.has_shrinkwrap || p.in_shrinkwrap)
            };
            let n = &mut self.nodes[id.0];
            n.location = child_location(&parent_location, &n.name);
            n.in_shrinkwrap = inherited;
        }
    }
}

fn child_location(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        format!("node_modules/{name}")
    } else {
        format!("{parent}/node_modules/{name}")
    }
}

fn parse_node_version(name: &str, version: Option<&str>) -> Option<Version> {
    let text = version?;
    match parse_version(text) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(package = %name, "ignoring unparseable version: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, version: &str) -> NewNode {
        NewNode {
            name: name.to_string(),
            version: Some(version.to_string()),
            ..NewNode::default()
        }
    }

    fn app() -> Graph {
        Graph::new(PackageManifest {
            name: Some("app".into()),
            version: Some("1.0.0".into()),
            ..PackageManifest::default()
        })
    }

    #[test]
    fn root_node() {
        let g = app();
        let root = g.node(g.root()).unwrap();
        assert_eq!(root.name, "app");
        assert_eq!(root.location, "");
        assert!(g.is_top(g.root()));
        assert!(g.is_empty());
    }

    #[test]
    fn locations_follow_nesting() {
        let mut g = app();
        let a = g.add_node(g.root(), pkg("a", "1.0.0")).unwrap();
        let b = g.add_node(a, pkg("@scope/b", "2.0.0")).unwrap();
        assert_eq!(g.node(a).unwrap().location, "node_modules/a");
        assert_eq!(
            g.node(b).unwrap().location,
            "node_modules/a/node_modules/@scope/b"
        );
        assert_eq!(g.find_location("node_modules/a"), Some(a));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn resolve_walks_up_the_tree() {
        let mut g = app();
        let a = g.add_node(g.root(), pkg("a", "1.0.0")).unwrap();
        let shared = g.add_node(g.root(), pkg("shared", "1.0.0")).unwrap();
        let nested = g.add_node(a, pkg("shared", "2.0.0")).unwrap();
        assert_eq!(g.resolve(a, "shared"), Some(nested));
        assert_eq!(g.resolve(g.root(), "shared"), Some(shared));
        assert_eq!(g.resolve(a, "missing"), None);
    }

    #[test]
    fn shrinkwrap_is_inherited() {
        let mut g = app();
        let wrapped = g
            .add_node(
                g.root(),
                NewNode {
                    has_shrinkwrap: true,
                    ..pkg("wrapped", "1.0.0")
                },
            )
            .unwrap();
        let inner = g.add_node(wrapped, pkg("inner", "1.0.0")).unwrap();
        assert!(g.node(wrapped).unwrap().is_pinned());
        assert!(g.node(inner).unwrap().in_shrinkwrap);
    }

    #[test]
    fn replacing_a_sibling_removes_it() {
        let mut g = app();
        let old = g.add_node(g.root(), pkg("a", "1.0.0")).unwrap();
        let new = g.add_node(g.root(), pkg("a", "2.0.0")).unwrap();
        assert!(g.node(old).unwrap().is_removed());
        assert_eq!(g.resolve(g.root(), "a"), Some(new));
    }

    #[test]
    fn root_cannot_be_removed_or_moved() {
        let mut g = app();
        let a = g.add_node(g.root(), pkg("a", "1.0.0")).unwrap();
        assert!(g.remove_node(g.root()).is_err());
        assert!(g.set_parent(g.root(), a).is_err());
    }

    #[test]
    fn cannot_move_into_own_subtree() {
        let mut g = app();
        let a = g.add_node(g.root(), pkg("a", "1.0.0")).unwrap();
        let b = g.add_node(a, pkg("b", "1.0.0")).unwrap();
        let err = g.set_parent(a, b).unwrap_err();
        assert!(matches!(err, LockwardError::InvalidMutation { .. }));
    }

    #[test]
    fn bad_versions_are_tolerated() {
        let mut g = app();
        let a = g.add_node(g.root(), pkg("a", "not-a-version")).unwrap();
        assert!(g.node(a).unwrap().version.is_none());
        assert_eq!(g.node(a).unwrap().label(), "a");
    }
}
