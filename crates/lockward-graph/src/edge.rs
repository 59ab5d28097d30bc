//! Dependency edges and the resolver protocol that evaluates them.
//!
//! An edge is one requirement declared by a node: "`from` needs `name` at
//! `raw_spec`". Its target, override rule, error state and explanation are
//! all derived data; the target and rule are recomputed by
//! [`EdgeResolver::reload`], the state and explanation are memoized until the
//! next reload or detach.

use std::fmt;

use lockward_core::config::FailOn;
use lockward_core::spec::{is_any, SpecKind};
use lockward_util::errors::{LockwardError, LockwardResult};
use serde::{Deserialize, Serialize};

use crate::explain::EdgeExplanation;
use crate::graph::{EdgeId, Graph, Node, NodeId};
use crate::overrides::RuleId;

/// Which dependency table an edge was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeType {
    Prod,
    Dev,
    Optional,
    Peer,
    PeerOptional,
    Workspace,
}

impl EdgeType {
    pub fn is_optional(self) -> bool {
        matches!(self, EdgeType::Optional | EdgeType::PeerOptional)
    }

    pub fn is_peer(self) -> bool {
        matches!(self, EdgeType::Peer | EdgeType::PeerOptional)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeType::Prod => "prod",
            EdgeType::Dev => "dev",
            EdgeType::Optional => "optional",
            EdgeType::Peer => "peer",
            EdgeType::PeerOptional => "peerOptional",
            EdgeType::Workspace => "workspace",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of an edge. These are values reported per edge, never
/// errors that stop a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeState {
    #[serde(rename = "OK")]
    Ok,
    /// No target and the edge is not optional.
    #[serde(rename = "MISSING")]
    Missing,
    /// A peer dependency installed inside its own requester.
    #[serde(rename = "PEER LOCAL")]
    PeerLocal,
    /// The target does not satisfy the edge, or its override scope conflicts.
    #[serde(rename = "INVALID")]
    Invalid,
    /// The edge was removed from the graph.
    #[serde(rename = "DETACHED")]
    Detached,
}

impl EdgeState {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeState::Ok => "OK",
            EdgeState::Missing => "MISSING",
            EdgeState::PeerLocal => "PEER LOCAL",
            EdgeState::Invalid => "INVALID",
            EdgeState::Detached => "DETACHED",
        }
    }

    pub fn is_ok(self) -> bool {
        self == EdgeState::Ok
    }

    /// The state as it appears in an explanation: `None` when OK.
    pub fn as_error(self) -> Option<EdgeState> {
        (!self.is_ok()).then_some(self)
    }

    /// Whether this state is one of the configured failure states.
    pub fn fails(self, fail_on: &[FailOn]) -> bool {
        let as_config = match self {
            EdgeState::Missing => FailOn::Missing,
            EdgeState::PeerLocal => FailOn::PeerLocal,
            EdgeState::Invalid => FailOn::Invalid,
            EdgeState::Ok | EdgeState::Detached => return false,
        };
        fail_on.contains(&as_config)
    }
}

impl fmt::Display for EdgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dependency requirement between two nodes.
#[derive(Debug, Clone)]
pub struct Edge {
    edge_type: EdgeType,
    name: String,
    raw_spec: String,
    pub(crate) from: Option<NodeId>,
    pub(crate) to: Option<NodeId>,
    pub(crate) overrides: Option<RuleId>,
    pub(crate) error: Option<EdgeState>,
    pub(crate) explanation: Option<EdgeExplanation>,
}

impl Edge {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn edge_type(&self) -> EdgeType {
        self.edge_type
    }

    pub fn optional(&self) -> bool {
        self.edge_type.is_optional()
    }

    pub fn peer(&self) -> bool {
        self.edge_type.is_peer()
    }

    /// The spec as declared, before overrides.
    pub fn raw_spec(&self) -> &str {
        &self.raw_spec
    }

    pub fn from(&self) -> Option<NodeId> {
        self.from
    }

    pub fn to(&self) -> Option<NodeId> {
        self.to
    }

    /// The override rule this edge is evaluated under.
    pub fn overrides(&self) -> Option<RuleId> {
        self.overrides
    }

    pub fn is_detached(&self) -> bool {
        self.error == Some(EdgeState::Detached)
    }
}

/// Operations that evaluate and maintain a single edge.
pub trait EdgeResolver {
    /// The spec enforced after overrides.
    fn effective_spec(&self, edge: EdgeId) -> LockwardResult<String>;

    /// Whether `node` fulfils `edge`.
    fn is_satisfied_by(&self, edge: EdgeId, node: NodeId) -> LockwardResult<bool>;

    /// The memoized classification of `edge`.
    fn error_state(&mut self, edge: EdgeId) -> LockwardResult<EdgeState>;

    /// Recompute the rule and target of `edge`. `hard` also drops the
    /// memoized state when the target did not change.
    fn reload(&mut self, edge: EdgeId, hard: bool) -> LockwardResult<()>;

    /// Remove `edge` from the graph for good.
    fn detach(&mut self, edge: EdgeId) -> LockwardResult<()>;

    /// The memoized diagnostic record of `edge`.
    fn explain(&mut self, edge: EdgeId) -> LockwardResult<EdgeExplanation>;
}

impl EdgeResolver for Graph {
    fn effective_spec(&self, edge: EdgeId) -> LockwardResult<String> {
        let e = self.edge(edge)?;
        let Some(rule) = e.overrides.map(|id| self.rules.rule(id)) else {
            return Ok(e.raw_spec.clone());
        };
        let applies = rule.name.as_deref() == Some(e.name.as_str());
        match rule.value.as_deref() {
            Some(value) if applies && value != "*" => match value.strip_prefix('$') {
                Some(reference) => self
                    .reference_manifest()
                    .lookup_reference(reference)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        tracing::warn!(edge = %e.name, reference, "unresolved override reference");
                        LockwardError::UnresolvedOverrideReference {
                            reference: reference.to_string(),
                        }
                    }),
                None => Ok(value.to_string()),
            },
            _ => Ok(e.raw_spec.clone()),
        }
    }

    fn is_satisfied_by(&self, edge: EdgeId, node: NodeId) -> LockwardResult<bool> {
        let e = self.edge(edge)?;
        let n = self.node(node)?;
        if n.name != e.name || e.from.is_none() {
            return Ok(false);
        }
        if n.is_pinned() {
            return Ok(dep_valid(n, &e.raw_spec));
        }

        let spec = self.effective_spec(edge)?;
        let key_spec = e
            .overrides
            .and_then(|id| self.rules.rule(id).key_spec.as_deref());
        let Some(key_spec) = key_spec else {
            return Ok(dep_valid(n, &spec));
        };
        if dep_valid(n, &spec) {
            return Ok(true);
        }
        if !dep_valid(n, &e.raw_spec) {
            return Ok(false);
        }
        // accepted by the declared range, but only if this is not exactly the
        // version the override replaced
        Ok(!dep_valid(n, key_spec))
    }

    fn error_state(&mut self, edge: EdgeId) -> LockwardResult<EdgeState> {
        if let Some(state) = self.edge(edge)?.error {
            return Ok(state);
        }
        let state = self.compute_state(edge)?;
        self.edge_mut(edge)?.error = Some(state);
        Ok(state)
    }

    fn reload(&mut self, edge: EdgeId, hard: bool) -> LockwardResult<()> {
        let e = self.edge(edge)?;
        if e.is_detached() {
            return Err(LockwardError::EdgeDetached {
                name: e.name.clone(),
            });
        }
        self.reload_edge(edge, hard);
        Ok(())
    }

    fn detach(&mut self, edge: EdgeId) -> LockwardResult<()> {
        self.edge(edge)?;
        self.detach_edge(edge);
        Ok(())
    }

    fn explain(&mut self, edge: EdgeId) -> LockwardResult<EdgeExplanation> {
        if let Some(cached) = &self.edge(edge)?.explanation {
            return Ok(cached.clone());
        }
        let explanation = self.explain_edge(edge, &mut Default::default())?;
        self.edge_mut(edge)?.explanation = Some(explanation.clone());
        Ok(explanation)
    }
}

impl Graph {
    /// Declare a dependency of `from`. An existing edge with the same name is
    /// detached and replaced.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        edge_type: EdgeType,
        name: &str,
        spec: &str,
    ) -> LockwardResult<EdgeId> {
        let origin = self.node(from)?;
        if origin.removed {
            return Err(LockwardError::UnknownNode { id: from.0 });
        }
        if let Some(existing) = origin.edges_out.get(name).copied() {
            self.detach_edge(existing);
        }

        let id = EdgeId(self.edges.len());
        let overrides = self.edge_rule(from, name, spec);
        self.edges.push(Edge {
            edge_type,
            name: name.to_string(),
            raw_spec: spec.to_string(),
            from: Some(from),
            to: None,
            overrides,
            error: None,
            explanation: None,
        });
        self.nodes[from.0].edges_out.insert(name.to_string(), id);
        self.reload_edge(id, false);
        Ok(id)
    }

    /// The rule an edge named `name` declared by `from` falls under. Edges
    /// declared inside bundles and shrinkwraps get none.
    fn edge_rule(&self, from: NodeId, name: &str, spec: &str) -> Option<RuleId> {
        let origin = &self.nodes[from.0];
        if origin.is_pinned() {
            return None;
        }
        let scope = origin.overrides?;
        Some(self.rules.get_edge_rule(scope, name, spec))
    }

    /// Re-resolve rule and target of an attached edge. The new rule is staged
    /// until the target is known so the old target is released under the rule
    /// it was registered with.
    pub(crate) fn reload_edge(&mut self, id: EdgeId, hard: bool) {
        let e = &self.edges[id.0];
        let Some(from) = e.from else {
            return;
        };
        if e.is_detached() {
            return;
        }
        let (old_rule, old_to) = (e.overrides, e.to);
        let name = e.name.clone();
        let raw_spec = e.raw_spec.clone();

        let new_rule = self.edge_rule(from, &name, &raw_spec);
        let rule_changed = !self.rules.same(old_rule, new_rule);
        let new_to = self.resolve(from, &name);

        let e = &mut self.edges[id.0];
        e.explanation = None;
        if rule_changed {
            e.overrides = new_rule;
            e.error = None;
        }

        if new_to != old_to {
            e.to = new_to;
            e.error = None;
            tracing::trace!(edge = %name, ?old_to, ?new_to, "edge target changed");
            if let Some(old) = old_to {
                self.delete_edge_in(old, id, old_rule);
            }
            if let Some(new) = new_to {
                self.add_edge_in(new, id);
            }
        } else if hard {
            e.error = None;
        } else if rule_changed {
            if let Some(to) = new_to {
                if let Some(old) = old_rule {
                    self.update_overrides_edge_in_removed(to, old);
                }
                if let Some(new) = new_rule {
                    self.update_overrides_edge_in_added(to, new);
                }
            }
        }
    }

    fn compute_state(&self, id: EdgeId) -> LockwardResult<EdgeState> {
        let e = &self.edges[id.0];
        if e.is_detached() {
            return Ok(EdgeState::Detached);
        }
        let Some(to) = e.to else {
            return Ok(if e.optional() {
                EdgeState::Ok
            } else {
                EdgeState::Missing
            });
        };
        let target = &self.nodes[to.0];
        if let Some(from) = e.from.filter(|_| e.peer()) {
            if target.parent == Some(from) && !self.is_top(from) {
                return Ok(EdgeState::PeerLocal);
            }
        }
        if !self.is_satisfied_by(id, to)? {
            return Ok(EdgeState::Invalid);
        }
        if let (Some(mine), Some(theirs)) = (e.overrides, target.overrides) {
            if !target.edges_out.is_empty() && self.rules.conflicts(mine, theirs) {
                return Ok(EdgeState::Invalid);
            }
        }
        Ok(EdgeState::Ok)
    }
}

/// Whether `node` fulfils `spec` on its own, without any override logic.
pub fn dep_valid(node: &Node, spec: &str) -> bool {
    kind_valid(node, &SpecKind::classify(spec), spec)
}

fn kind_valid(node: &Node, kind: &SpecKind, raw: &str) -> bool {
    match kind {
        SpecKind::Range(range) => {
            is_any(range.version_text())
                || node.version.as_ref().is_some_and(|v| range.matches(v))
        }
        SpecKind::Alias { sub, .. } => {
            let sub_raw = raw.rsplit_once('@').map_or(raw, |(_, s)| s);
            kind_valid(node, sub, sub_raw)
        }
        SpecKind::Tag(_) => true,
        SpecKind::Git { range: Some(range) } => {
            node.version.as_ref().is_some_and(|v| range.matches(v))
        }
        SpecKind::Invalid => false,
        SpecKind::Git { range: None }
        | SpecKind::File
        | SpecKind::Directory
        | SpecKind::Remote => node
            .resolved
            .as_deref()
            .map_or(true, |resolved| resolved == raw.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NewNode;
    use lockward_core::manifest::PackageManifest;
    use serde_json::json;

    fn graph() -> Graph {
        Graph::new(PackageManifest {
            name: Some("app".into()),
            version: Some("1.0.0".into()),
            ..PackageManifest::default()
        })
    }

    fn pkg(name: &str, version: &str) -> NewNode {
        NewNode {
            name: name.to_string(),
            version: Some(version.to_string()),
            ..NewNode::default()
        }
    }

    #[test]
    fn missing_until_target_appears() {
        let mut g = graph();
        let root = g.root();
        let e = g.add_edge(root, EdgeType::Prod, "lodash", "^4.0.0").unwrap();
        assert_eq!(g.error_state(e).unwrap(), EdgeState::Missing);

        let lodash = g.add_node(root, pkg("lodash", "4.17.21")).unwrap();
        assert_eq!(g.edge(e).unwrap().to(), Some(lodash));
        assert_eq!(g.error_state(e).unwrap(), EdgeState::Ok);
    }

    #[test]
    fn optional_edges_may_be_missing() {
        let mut g = graph();
        let root = g.root();
        let e = g
            .add_edge(root, EdgeType::Optional, "fsevents", "^2.0.0")
            .unwrap();
        assert_eq!(g.error_state(e).unwrap(), EdgeState::Ok);
    }

    #[test]
    fn wrong_name_never_satisfies() {
        let mut g = graph();
        let root = g.root();
        let e = g.add_edge(root, EdgeType::Prod, "a", "*").unwrap();
        let b = g.add_node(root, pkg("b", "1.0.0")).unwrap();
        assert!(!g.is_satisfied_by(e, b).unwrap());
    }

    #[test]
    fn state_is_memoized_until_reload() {
        let mut g = graph();
        let root = g.root();
        let a = g.add_node(root, pkg("a", "1.0.0")).unwrap();
        let e = g.add_edge(root, EdgeType::Prod, "a", "^1.0.0").unwrap();
        assert_eq!(g.error_state(e).unwrap(), EdgeState::Ok);

        // change the version behind the edge's back
        g.nodes[a.0].version = Some(lockward_core::spec::parse_version("2.0.0").unwrap());
        assert_eq!(g.error_state(e).unwrap(), EdgeState::Ok);
        g.reload(e, true).unwrap();
        assert_eq!(g.error_state(e).unwrap(), EdgeState::Invalid);
    }

    #[test]
    fn replacing_an_edge_detaches_the_old_one() {
        let mut g = graph();
        let root = g.root();
        let first = g.add_edge(root, EdgeType::Prod, "a", "^1.0.0").unwrap();
        let second = g.add_edge(root, EdgeType::Dev, "a", "^2.0.0").unwrap();
        assert!(g.edge(first).unwrap().is_detached());
        assert_eq!(g.edge_out(root, "a"), Some(second));
    }

    #[test]
    fn opaque_specs_compare_resolved() {
        let mut g = graph();
        let root = g.root();
        let dir = g
            .add_node(
                root,
                NewNode {
                    resolved: Some("file:../dir".into()),
                    ..pkg("dir", "1.0.0")
                },
            )
            .unwrap();
        let node = g.node(dir).unwrap();
        assert!(dep_valid(node, "file:../dir"));
        assert!(!dep_valid(node, "file:../other"));
        assert!(dep_valid(node, "latest"));
        assert!(dep_valid(node, "npm:other@^1.0.0"));
        assert!(!dep_valid(node, "npm:other@^2.0.0"));
    }

    #[test]
    fn git_semver_ranges_check_the_version() {
        let mut g = graph();
        let root = g.root();
        let a = g.add_node(root, pkg("a", "1.4.0")).unwrap();
        let node = g.node(a).unwrap();
        assert!(dep_valid(node, "github:user/a#semver:^1.0.0"));
        assert!(!dep_valid(node, "github:user/a#semver:^2.0.0"));
    }

    #[test]
    fn pinned_targets_ignore_overrides() {
        let mut g = graph();
        let root = g.root();
        g.set_overrides(Some(&json!({ "a": "2.0.0" }))).unwrap();
        let a = g
            .add_node(
                root,
                NewNode {
                    in_bundle: true,
                    ..pkg("a", "1.0.0")
                },
            )
            .unwrap();
        let e = g.add_edge(root, EdgeType::Prod, "a", "^1.0.0").unwrap();
        assert_eq!(g.effective_spec(e).unwrap(), "2.0.0");
        assert!(g.is_satisfied_by(e, a).unwrap());
    }

    #[test]
    fn state_names() {
        assert_eq!(EdgeState::PeerLocal.to_string(), "PEER LOCAL");
        assert_eq!(
            serde_json::to_value(EdgeState::Missing).unwrap(),
            json!("MISSING")
        );
        assert_eq!(
            serde_json::to_value(EdgeType::PeerOptional).unwrap(),
            json!("peerOptional")
        );
        assert!(EdgeState::Invalid.fails(&[FailOn::Invalid]));
        assert!(!EdgeState::PeerLocal.fails(&[FailOn::Missing, FailOn::Invalid]));
        assert!(!EdgeState::Detached.fails(&[FailOn::Missing]));
        assert_eq!(EdgeState::Ok.as_error(), None);
    }
}
