//! Graph-level aggregation of edge problems.

use std::fmt;

use lockward_core::config::{FailOn, ReportConfig};
use lockward_util::errors::LockwardResult;

use crate::edge::{EdgeResolver, EdgeState};
use crate::graph::{EdgeId, Graph};

/// Every edge in a graph that does not evaluate to OK.
#[derive(Debug, Default)]
pub struct GraphReport {
    pub problems: Vec<EdgeProblem>,
    fail_on: Vec<FailOn>,
}

/// One edge that is missing, invalid, or a local peer.
#[derive(Debug, Clone)]
pub struct EdgeProblem {
    pub edge: EdgeId,
    /// Location of the declaring package, `""` for the root.
    pub from: String,
    pub name: String,
    pub spec: String,
    /// `name@version` of the target, if one was found.
    pub found: Option<String>,
    pub state: EdgeState,
}

impl GraphReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate every attached edge of `graph`.
    ///
    /// Fails only on an unresolvable `$` override reference, which makes the
    /// whole override configuration unusable.
    pub fn collect(graph: &mut Graph, config: &ReportConfig) -> LockwardResult<Self> {
        let mut report = Self {
            problems: Vec::new(),
            fail_on: config.fail_on.clone(),
        };
        let edges: Vec<EdgeId> = graph.edge_ids().collect();
        for id in edges {
            let state = graph.error_state(id)?;
            if state.is_ok() {
                continue;
            }
            let edge = graph.edge(id)?;
            if edge.optional() && !config.include_optional {
                continue;
            }
            let (from, to) = (edge.from(), edge.to());
            let name = edge.name().to_string();
            let spec = graph.effective_spec(id)?;
            report.add(EdgeProblem {
                edge: id,
                from: match from {
                    Some(node) => graph.node(node)?.location.clone(),
                    None => String::new(),
                },
                name,
                spec,
                found: match to {
                    Some(node) => Some(graph.node(node)?.label()),
                    None => None,
                },
                state,
            });
        }
        tracing::debug!(problems = report.len(), "collected graph report");
        Ok(report)
    }

    pub fn add(&mut self, problem: EdgeProblem) {
        self.problems.push(problem);
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    /// Problems whose state is configured as fatal.
    pub fn failures(&self) -> impl Iterator<Item = &EdgeProblem> + '_ {
        self.problems
            .iter()
            .filter(|p| p.state.fails(&self.fail_on))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

impl fmt::Display for GraphReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.problems.is_empty() {
            return write!(f, "No dependency problems.");
        }
        writeln!(f, "Dependency problems ({}):", self.problems.len())?;
        for p in &self.problems {
            writeln!(f, "  {p}")?;
        }
        Ok(())
    }
}

impl fmt::Display for EdgeProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = if self.from.is_empty() {
            "<root>"
        } else {
            self.from.as_str()
        };
        match &self.found {
            Some(found) => write!(
                f,
                "{}: {} {}@{} (found {})",
                from, self.state, self.name, self.spec, found
            ),
            None => write!(f, "{}: {} {}@{}", from, self.state, self.name, self.spec),
        }
    }
}
