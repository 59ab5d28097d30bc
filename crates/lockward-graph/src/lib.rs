//! Override-consistency engine for npm-style install graphs: override rule
//! trees, edge evaluation, and the mutation protocol that keeps node and edge
//! state consistent while a graph is edited.

pub mod build;
pub mod edge;
pub mod explain;
pub mod graph;
pub mod overrides;
pub mod report;
