//! Incremental Topological Order
//!
//! [`TopoOrder`] assigns every node of a [`ScheduleGraph`] a dense position
//! such that each required edge points from a lower to a higher position,
//! and keeps that true while edges are inserted one at a time.
//!
//! # Algorithm
//!
//! This is the MNR algorithm (Marchetti-Spaccamela, Nanni and Rohnert,
//! "Maintaining a topological order under edge insertions"; see also Pearce
//! and Kelly, "Online algorithms for managing the topological order of a
//! directed acyclic graph").
//!
//! 1. `build` runs Kahn's algorithm backwards from the sinks, handing out
//!    positions from the top down.
//! 2. Inserting `from -> to` with `pos(to) < pos(from)` marks every node
//!    reachable from `to` inside the window `pos(to)..pos(from)`. Reaching
//!    `from` itself means the edge would close a cycle.
//! 3. Otherwise the window is renumbered: unmarked nodes slide down to close
//!    the gaps and marked nodes move, in their old relative order, to just
//!    after `from`.
//!
//! Work per insertion is proportional to the window, not to the graph.
//! Removing an edge never breaks an order, but no incremental repair exists
//! for it; [`TopoOrder::remove_edge`] simply rebuilds.

use smallvec::smallvec;
use tracing::debug;

use super::visited::VisitedSet;
use crate::config::{TopoConfig, VerifyPolicy};
use crate::error::{DagError, Result};
use crate::graph::{Dep, DepKind, EdgeChange, NodeId, ScheduleGraph, Worklist};

/// A topological order over the nodes of one [`ScheduleGraph`].
///
/// The order is tied to the node set of the graph it was built from; it
/// must be rebuilt if that graph is replaced.
#[derive(Debug, Clone)]
pub struct TopoOrder {
    /// Position of each node, indexed by node id.
    pub(super) position: Vec<usize>,

    /// Node at each position.
    pub(super) node_at: Vec<NodeId>,

    pub(super) visited: VisitedSet,

    /// Second mark set for the backward pass of `subgraph`.
    pub(super) visited_back: VisitedSet,

    config: TopoConfig,
}

impl TopoOrder {
    /// Build an order for `graph` with the default config.
    pub fn build(graph: &ScheduleGraph) -> Result<Self> {
        Self::build_with(graph, TopoConfig::default())
    }

    /// Build an order for `graph`.
    ///
    /// Fails with [`DagError::InvariantBroken`] if the required edges of the
    /// graph contain a cycle.
    pub fn build_with(graph: &ScheduleGraph, config: TopoConfig) -> Result<Self> {
        let len = graph.node_count();
        let mut order = Self {
            position: vec![0; len],
            node_at: vec![graph.exit(); len],
            visited: VisitedSet::new(len),
            visited_back: VisitedSet::new(len),
            config,
        };
        order.rebuild(graph)?;
        Ok(order)
    }

    /// Recompute every position from scratch.
    fn rebuild(&mut self, graph: &ScheduleGraph) -> Result<()> {
        let len = graph.node_count();

        // Required successors not yet placed, per node.
        let mut out_degree: Vec<usize> = graph
            .nodes()
            .iter()
            .map(|node| node.required_succs().count())
            .collect();

        // The exit node is popped first and takes the last position.
        let mut work: Vec<NodeId> = Vec::with_capacity(len);
        work.extend(
            graph
                .nodes()
                .iter()
                .map(|node| node.id())
                .filter(|&id| id != graph.exit() && out_degree[id.index()] == 0),
        );
        work.push(graph.exit());

        let mut next = len;
        let mut edges = 0;
        while let Some(id) = work.pop() {
            next -= 1;
            self.allocate(id, next);
            for dep in graph.node(id).required_preds() {
                edges += 1;
                let pred = dep.node();
                out_degree[pred.index()] -= 1;
                if out_degree[pred.index()] == 0 {
                    work.push(pred);
                }
            }
        }

        if next != 0 {
            return Err(DagError::InvariantBroken(format!(
                "required edges form a cycle through {next} unplaced nodes"
            )));
        }

        debug!(nodes = len, edges, "topological order built");
        self.maybe_verify(graph)
    }

    fn allocate(&mut self, id: NodeId, index: usize) {
        self.position[id.index()] = index;
        self.node_at[index] = id;
    }

    /// Number of ordered nodes.
    pub fn len(&self) -> usize {
        self.node_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_at.is_empty()
    }

    /// Position of `id` in the order.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a node of the ordered graph.
    pub fn position(&self, id: NodeId) -> usize {
        self.position[id.index()]
    }

    /// Node at position `index`.
    pub fn node_at(&self, index: usize) -> NodeId {
        self.node_at[index]
    }

    /// All nodes, first to last.
    pub fn order(&self) -> &[NodeId] {
        &self.node_at
    }

    pub fn config(&self) -> TopoConfig {
        self.config
    }

    pub(super) fn check_graph(&self, graph: &ScheduleGraph) -> Result<()> {
        if graph.node_count() == self.len() {
            Ok(())
        } else {
            Err(DagError::InvariantBroken(format!(
                "order covers {} nodes but graph has {}",
                self.len(),
                graph.node_count()
            )))
        }
    }

    /// Record that `to` depends on `from`, repairing the order first.
    ///
    /// Weak edges are recorded without touching the order, and like any
    /// non-required edge they are dropped if the pair is already connected.
    /// They may point against the order since no metric or query follows
    /// them. For required edges this is the cycle check: if `from` is
    /// already reachable from `to`, nothing changes and
    /// [`DagError::WouldCreateCycle`] is returned.
    pub fn insert_edge(
        &mut self,
        graph: &mut ScheduleGraph,
        from: NodeId,
        to: NodeId,
        kind: DepKind,
        latency: u32,
    ) -> Result<EdgeChange> {
        self.check_graph(graph)?;
        graph.check_edge(from, to)?;

        let weak = Dep::new(from, kind, latency).is_weak();
        if !weak {
            let lower = self.position(to);
            let upper = self.position(from);
            if lower < upper {
                if self.mark_reachable(graph, to, upper) {
                    debug!(%from, %to, "edge rejected, would create a cycle");
                    return Err(DagError::WouldCreateCycle { from, to });
                }
                let moved = self.shift(lower, upper);
                debug!(%from, %to, lower, upper, moved, "topological order repaired");
            }
        }

        let change = graph.add_edge(from, to, kind, latency, !weak)?;
        self.maybe_verify(graph)?;
        Ok(change)
    }

    /// Remove the first edge through which `to` depends on `from` and
    /// rebuild the order.
    pub fn remove_edge(
        &mut self,
        graph: &mut ScheduleGraph,
        from: NodeId,
        to: NodeId,
    ) -> Result<Dep> {
        self.check_graph(graph)?;
        let removed = graph.remove_edge(from, to)?;
        self.rebuild(graph)?;
        Ok(removed)
    }

    /// Mark every node reachable from `start` through required edges whose
    /// position is below `upper`.
    ///
    /// Returns `true`, with the marks cleared, as soon as a node at `upper`
    /// is reached. Otherwise the marks are left for [`Self::shift`].
    pub(super) fn mark_reachable(
        &mut self,
        graph: &ScheduleGraph,
        start: NodeId,
        upper: usize,
    ) -> bool {
        debug_assert!(self.visited.is_clear(), "visited set not cleared");

        self.visited.mark(start);
        let mut work: Worklist = smallvec![start];
        while let Some(cur) = work.pop() {
            for dep in graph.node(cur).required_succs() {
                let succ = dep.node();
                let position = self.position[succ.index()];
                if position == upper {
                    self.visited.clear();
                    return true;
                }
                if position < upper && self.visited.mark(succ) {
                    work.push(succ);
                }
            }
        }
        false
    }

    /// Renumber the window `lower..=upper`, moving every marked node after
    /// every unmarked one while keeping the relative order of both groups.
    ///
    /// Consumes the marks. Returns the number of moved nodes.
    fn shift(&mut self, lower: usize, upper: usize) -> usize {
        let mut moved: Worklist = Worklist::new();
        let mut shift = 0;

        for index in lower..=upper {
            let node = self.node_at[index];
            if self.visited.contains(node) {
                self.visited.unmark(node);
                moved.push(node);
                shift += 1;
            } else {
                self.allocate(node, index - shift);
            }
        }

        let mut index = upper + 1 - shift;
        for &node in &moved {
            self.allocate(node, index);
            index += 1;
        }

        self.visited.clear();
        moved.len()
    }

    /// Re-derive the order invariant from scratch.
    ///
    /// Meant for tests and assertion builds.
    pub fn verify(&self, graph: &ScheduleGraph) -> bool {
        self.check(graph).is_ok()
    }

    /// Like [`Self::verify`], but says what is wrong.
    pub fn check(&self, graph: &ScheduleGraph) -> Result<()> {
        self.check_graph(graph)?;

        for (index, &id) in self.node_at.iter().enumerate() {
            if self.position[id.index()] != index {
                return Err(DagError::InvariantBroken(format!(
                    "{id} sits at {index} but is recorded at {}",
                    self.position[id.index()]
                )));
            }
        }

        for node in graph.nodes() {
            for dep in node.required_succs() {
                let (from, to) = (node.id(), dep.node());
                if self.position(from) >= self.position(to) {
                    return Err(DagError::InvariantBroken(format!(
                        "{from} at {} is not before {to} at {}",
                        self.position(from),
                        self.position(to)
                    )));
                }
            }
        }

        if !self.visited.is_clear() || !self.visited_back.is_clear() {
            return Err(DagError::InvariantBroken(
                "visited set left dirty".to_string(),
            ));
        }
        Ok(())
    }

    fn maybe_verify(&self, graph: &ScheduleGraph) -> Result<()> {
        if !self.config.should_verify() {
            return Ok(());
        }
        match self.check(graph) {
            Err(err) if self.config.verify == VerifyPolicy::Debug => {
                panic!("topological order corrupted: {err}")
            }
            result => result,
        }
    }
}
