//! Dependency Graph
//!
//! This module implements the instruction-level dependency graph of one
//! scheduling region.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph where:
//!
//! - Nodes are scheduling units (instructions), plus an entry and an exit
//!   boundary node
//! - Edges are dependencies: if B depends on A, there is an edge from A to B
//!   carrying a kind and a latency in cycles
//!
//! # Design Decisions
//!
//! 1. Nodes live in a flat arena addressed by dense [`NodeId`]s. Edges store
//!    the id of the node on their other end, never a reference.
//!
//! 2. Every edge is stored on both endpoints so walks go either way without
//!    searching.
//!
//! 3. Depth and height are cached per node as a [`Metric`] that is either
//!    stale or holds a value, and are recomputed on demand.

mod dag;
mod dep;
mod node;

pub use dag::{Direction, EdgeChange, GraphSnapshot, NodeSnapshot, ScheduleGraph};
pub(crate) use dag::Worklist;
pub use dep::{Dep, DepKind, OrderKind, Reg};
pub use node::{DepList, Metric, Node, NodeId, NodeKind};
