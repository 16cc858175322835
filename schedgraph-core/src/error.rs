//! Error types for graph mutation and ordering queries.

use thiserror::Error;

use crate::graph::NodeId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DagError>;

/// Errors produced by [`ScheduleGraph`](crate::graph::ScheduleGraph) and
/// [`TopoOrder`](crate::topo::TopoOrder).
///
/// `WouldCreateCycle`, `EdgeNotFound` and `NoPath` are expected outcomes the
/// caller is supposed to handle. `InvariantBroken` means the structure is
/// corrupt and must not be used further.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    #[error("edge {from} -> {to} would create a cycle")]
    WouldCreateCycle { from: NodeId, to: NodeId },

    #[error("no edge {from} -> {to}")]
    EdgeNotFound { from: NodeId, to: NodeId },

    #[error("no path from {start} to {target}")]
    NoPath { start: NodeId, target: NodeId },

    #[error("{0} cannot depend on itself")]
    SelfDependence(NodeId),

    #[error("boundary node {0} cannot take this edge")]
    BoundaryEdge(NodeId),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("{node} failed schedule verification: {reason}")]
    Unscheduled { node: NodeId, reason: &'static str },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("graph invariant broken: {0}")]
    InvariantBroken(String),
}
