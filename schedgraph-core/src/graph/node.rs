//! Graph Nodes
//!
//! This module defines the scheduling units that live in the dependency graph.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::dep::Dep;

/// Dense identifier of a node in a [`ScheduleGraph`](super::ScheduleGraph).
///
/// Ids are assigned once at construction and index every per-node array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SU({})", self.0)
    }
}

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// A schedulable instruction.
    Instr,

    /// Sentinel at the top of the region. Never has predecessors.
    Entry,

    /// Sentinel at the bottom of the region. Never has successors.
    Exit,
}

/// Cached longest-path length.
///
/// A stale metric has no value: anything read from it before recomputation
/// would be a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    #[default]
    Stale,
    Valid(u32),
}

impl Metric {
    pub fn is_current(&self) -> bool {
        matches!(self, Metric::Valid(_))
    }

    pub fn value(&self) -> Option<u32> {
        match *self {
            Metric::Valid(value) => Some(value),
            Metric::Stale => None,
        }
    }
}

/// Edge list type. Most instructions have a handful of neighbours.
pub type DepList = SmallVec<[Dep; 4]>;

/// A node in the dependency graph.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,

    /// Edges to the nodes this one depends on.
    pub(crate) preds: DepList,

    /// Edges to the nodes depending on this one.
    pub(crate) succs: DepList,

    /// Data predecessors / successors.
    pub(crate) num_preds: u32,
    pub(crate) num_succs: u32,

    /// Required edges whose other end is not scheduled yet.
    pub(crate) num_preds_left: u32,
    pub(crate) num_succs_left: u32,

    pub(crate) weak_preds_left: u32,
    pub(crate) weak_succs_left: u32,

    pub(crate) depth: Metric,
    pub(crate) height: Metric,

    pub(crate) is_scheduled: bool,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            preds: DepList::new(),
            succs: DepList::new(),
            num_preds: 0,
            num_succs: 0,
            num_preds_left: 0,
            num_succs_left: 0,
            weak_preds_left: 0,
            weak_succs_left: 0,
            depth: Metric::Stale,
            height: Metric::Stale,
            is_scheduled: false,
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_boundary(&self) -> bool {
        self.kind != NodeKind::Instr
    }

    pub fn preds(&self) -> &[Dep] {
        &self.preds
    }

    pub fn succs(&self) -> &[Dep] {
        &self.succs
    }

    /// Non-weak predecessor edges.
    pub fn required_preds(&self) -> impl Iterator<Item = &Dep> + '_ {
        self.preds.iter().filter(|dep| !dep.is_weak())
    }

    /// Non-weak successor edges.
    pub fn required_succs(&self) -> impl Iterator<Item = &Dep> + '_ {
        self.succs.iter().filter(|dep| !dep.is_weak())
    }

    pub fn num_preds(&self) -> u32 {
        self.num_preds
    }

    pub fn num_succs(&self) -> u32 {
        self.num_succs
    }

    pub fn num_preds_left(&self) -> u32 {
        self.num_preds_left
    }

    pub fn num_succs_left(&self) -> u32 {
        self.num_succs_left
    }

    pub fn weak_preds_left(&self) -> u32 {
        self.weak_preds_left
    }

    pub fn weak_succs_left(&self) -> u32 {
        self.weak_succs_left
    }

    /// Cached depth. Use [`ScheduleGraph::depth`](super::ScheduleGraph::depth)
    /// to get a value that is recomputed when stale.
    pub fn cached_depth(&self) -> Metric {
        self.depth
    }

    pub fn cached_height(&self) -> Metric {
        self.height
    }

    pub fn is_scheduled(&self) -> bool {
        self.is_scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::dep::{DepKind, OrderKind};

    #[test]
    fn node_starts_unscheduled_and_stale() {
        let node = Node::new(NodeId::from(3), NodeKind::Instr);
        assert_eq!(node.id().index(), 3);
        assert!(!node.is_boundary());
        assert!(!node.is_scheduled());
        assert_eq!(node.cached_depth(), Metric::Stale);
        assert_eq!(node.cached_height(), Metric::Stale);
    }

    #[test]
    fn metric_exposes_value_only_when_valid() {
        assert_eq!(Metric::Stale.value(), None);
        assert!(!Metric::Stale.is_current());
        assert_eq!(Metric::Valid(4).value(), Some(4));
        assert!(Metric::Valid(0).is_current());
    }

    #[test]
    fn required_edges_skip_weak_ones() {
        let mut node = Node::new(NodeId::from(0), NodeKind::Instr);
        node.succs.push(Dep::new(NodeId::from(1), DepKind::Data(None), 1));
        node.succs
            .push(Dep::new(NodeId::from(2), DepKind::Order(OrderKind::Weak), 0));

        let required: Vec<_> = node.required_succs().map(|dep| dep.node()).collect();
        assert_eq!(required, vec![NodeId::from(1)]);
        assert_eq!(node.succs().len(), 2);
    }

    #[test]
    fn boundary_kinds() {
        assert!(Node::new(NodeId::from(0), NodeKind::Entry).is_boundary());
        assert!(Node::new(NodeId::from(1), NodeKind::Exit).is_boundary());
    }
}
