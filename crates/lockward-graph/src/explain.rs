//! JSON-serializable diagnostics for edges and the nodes that declare them.

use std::collections::BTreeSet;

use lockward_util::errors::LockwardResult;
use serde::{Deserialize, Serialize};

use crate::edge::{EdgeResolver, EdgeState, EdgeType};
use crate::graph::{EdgeId, Graph, NodeId};

/// Why an edge exists and how it currently evaluates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeExplanation {
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub name: String,
    /// The spec after overrides.
    pub spec: String,
    pub bundled: bool,
    pub overridden: bool,
    /// `null` when the edge is OK.
    pub error: Option<EdgeState>,
    /// Present only when overridden.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_spec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NodeExplanation>,
}

/// A node together with the chain of edges that pulled it into the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExplanation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub location: String,
    pub is_root: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<EdgeExplanation>,
}

impl Graph {
    pub(crate) fn explain_edge(
        &mut self,
        id: EdgeId,
        seen: &mut BTreeSet<NodeId>,
    ) -> LockwardResult<EdgeExplanation> {
        let spec = self.effective_spec(id)?;
        let error = self.error_state(id)?.as_error();
        let e = self.edge(id)?;
        let (edge_type, name, raw_spec, from) =
            (e.edge_type(), e.name().to_string(), e.raw_spec().to_string(), e.from());
        let overridden = spec != raw_spec;
        let bundled = from.is_some_and(|f| self.nodes[f.0].package.is_bundled(&name));

        let from = match from {
            Some(node) => Some(self.explain_node(node, seen)?),
            None => None,
        };
        Ok(EdgeExplanation {
            edge_type,
            name,
            spec,
            bundled,
            overridden,
            error,
            raw_spec: overridden.then_some(raw_spec),
            from,
        })
    }

    /// Describe `node` and, unless it was already visited on this path, the
    /// edges that depend on it.
    pub fn explain_node(
        &mut self,
        node: NodeId,
        seen: &mut BTreeSet<NodeId>,
    ) -> LockwardResult<NodeExplanation> {
        let n = self.node(node)?;
        let mut explanation = NodeExplanation {
            name: n.name.clone(),
            version: n.version.as_ref().map(ToString::to_string),
            location: n.location.clone(),
            is_root: node == self.root,
            dependents: Vec::new(),
        };
        if explanation.is_root || !seen.insert(node) {
            return Ok(explanation);
        }
        let edges_in: Vec<EdgeId> = n.edges_in.iter().copied().collect();
        for edge in edges_in {
            explanation.dependents.push(self.explain_edge(edge, seen)?);
        }
        seen.remove(&node);
        Ok(explanation)
    }
}
