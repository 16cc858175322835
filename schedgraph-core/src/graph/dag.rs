//! Scheduling Graph
//!
//! [`ScheduleGraph`] owns every node of one scheduling region, including the
//! entry and exit boundary nodes, and keeps the mirrored edge lists and
//! per-node counters consistent as dependencies are added and removed.
//!
//! # Longest paths
//!
//! Depth and height are computed lazily:
//!
//! 1. Changing an edge floods "stale" downstream from the dependent node
//!    (depth) and upstream from the producer (height). A zero-latency edge
//!    hanging off a root (or leaf) with a known zero metric skips the flood.
//!    The flood only invalidates, it never computes.
//! 2. Reading a stale metric evaluates it with an explicit post-order
//!    worklist, so long dependency chains never grow the call stack.
//!
//! Both walks follow required edges only. Weak edges are scheduling hints:
//! they neither contribute latency nor need to be acyclic, so a
//! [`TopoOrder`](crate::topo::TopoOrder) over the required edges is enough
//! to guarantee termination.

use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::Serialize;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

use super::dep::{Dep, DepKind};
use super::node::{DepList, Metric, Node, NodeId, NodeKind};
use crate::error::{DagError, Result};

/// Worklist used by the graph walks.
pub(crate) type Worklist = SmallVec<[NodeId; 8]>;

/// Outcome of [`ScheduleGraph::add_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeChange {
    /// A new edge was appended to both endpoints.
    Inserted,

    /// An overlapping edge existed and its latency was raised.
    Widened,

    /// An equivalent edge already existed. Nothing changed.
    Unchanged,
}

/// Direction in which the consuming scheduler commits nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    TopDown,
    BottomUp,
}

/// Which longest-path metric a walk maintains.
#[derive(Debug, Clone, Copy)]
enum Side {
    Depth,
    Height,
}

impl Side {
    fn metric(self, node: &Node) -> Metric {
        match self {
            Side::Depth => node.depth,
            Side::Height => node.height,
        }
    }

    fn metric_mut(self, node: &mut Node) -> &mut Metric {
        match self {
            Side::Depth => &mut node.depth,
            Side::Height => &mut node.height,
        }
    }

    /// Required edges the metric is computed from.
    fn upstream(self, node: &Node) -> impl Iterator<Item = &Dep> + '_ {
        let list = match self {
            Side::Depth => &node.preds,
            Side::Height => &node.succs,
        };
        list.iter().filter(|dep| !dep.is_weak())
    }

    /// Required edges whose metric depends on this node.
    fn downstream(self, node: &Node) -> impl Iterator<Item = &Dep> + '_ {
        let list = match self {
            Side::Depth => &node.succs,
            Side::Height => &node.preds,
        };
        list.iter().filter(|dep| !dep.is_weak())
    }
}

/// The dependency graph of one scheduling region.
#[derive(Debug, Clone)]
pub struct ScheduleGraph {
    /// Instructions first, then the entry and exit nodes.
    nodes: Vec<Node>,
    entry: NodeId,
    exit: NodeId,
}

impl ScheduleGraph {
    /// Create a graph with `instr_count` instruction nodes plus the two
    /// boundary nodes.
    pub fn new(instr_count: usize) -> Self {
        let mut nodes = Vec::with_capacity(instr_count + 2);
        for index in 0..instr_count {
            nodes.push(Node::new(NodeId::from(index as u32), NodeKind::Instr));
        }
        let entry = NodeId::from(instr_count as u32);
        let exit = NodeId::from(instr_count as u32 + 1);
        nodes.push(Node::new(entry, NodeKind::Entry));
        nodes.push(Node::new(exit, NodeKind::Exit));

        Self { nodes, entry, exit }
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn exit(&self) -> NodeId {
        self.exit
    }

    /// Total number of nodes, boundaries included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of instruction nodes.
    pub fn instr_count(&self) -> usize {
        self.nodes.len() - 2
    }

    /// Ids of the instruction nodes.
    pub fn instrs(&self) -> impl Iterator<Item = NodeId> {
        (0..self.instr_count() as u32).map(NodeId::from)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Get a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn check(&self, id: NodeId) -> Result<()> {
        if id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(DagError::UnknownNode(id))
        }
    }

    /// Reject edges no graph may contain: self loops, edges out of the exit
    /// node and edges into the entry node.
    pub(crate) fn check_edge(&self, from: NodeId, to: NodeId) -> Result<()> {
        self.check(from)?;
        self.check(to)?;
        if from == to {
            return Err(DagError::SelfDependence(from));
        }
        if from == self.exit {
            return Err(DagError::BoundaryEdge(from));
        }
        if to == self.entry {
            return Err(DagError::BoundaryEdge(to));
        }
        Ok(())
    }

    /// Record that `to` depends on `from`.
    ///
    /// An edge overlapping an existing one only raises its latency. A
    /// non-required insertion is dropped whenever any edge between the two
    /// nodes already exists. No cycle check is done here; callers that need
    /// one go through [`TopoOrder::insert_edge`](crate::topo::TopoOrder::insert_edge).
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        kind: DepKind,
        latency: u32,
        required: bool,
    ) -> Result<EdgeChange> {
        self.check_edge(from, to)?;

        let pred = Dep::new(from, kind, latency);
        let mut overlap = None;
        for (index, existing) in self.nodes[to.index()].preds.iter().enumerate() {
            if !required && existing.node() == from {
                return Ok(EdgeChange::Unchanged);
            }
            if existing.overlaps(&pred) {
                overlap = Some(index);
                break;
            }
        }
        if let Some(index) = overlap {
            return Ok(self.widen(from, to, index, latency));
        }

        let weak = pred.is_weak();
        let from_scheduled = self.nodes[from.index()].is_scheduled;
        let to_scheduled = self.nodes[to.index()].is_scheduled;

        let dependent = &mut self.nodes[to.index()];
        if kind.is_data() {
            dependent.num_preds += 1;
        }
        if !from_scheduled {
            if weak {
                dependent.weak_preds_left += 1;
            } else {
                dependent.num_preds_left += 1;
            }
        }
        dependent.preds.push(pred);

        let producer = &mut self.nodes[from.index()];
        if kind.is_data() {
            producer.num_succs += 1;
        }
        if !to_scheduled {
            if weak {
                producer.weak_succs_left += 1;
            } else {
                producer.num_succs_left += 1;
            }
        }
        producer.succs.push(pred.mirrored(to));

        if !weak {
            self.dirty_endpoints(from, to, latency);
        }

        debug!(%from, %to, edge = %pred, weak, "edge inserted");
        Ok(EdgeChange::Inserted)
    }

    /// Raise the latency of the overlapping edge at `to.preds[index]`.
    fn widen(&mut self, from: NodeId, to: NodeId, index: usize, latency: u32) -> EdgeChange {
        let existing = self.nodes[to.index()].preds[index];
        if existing.latency() >= latency {
            return EdgeChange::Unchanged;
        }

        let forward = existing.mirrored(to);
        if let Some(succ) = self.nodes[from.index()]
            .succs
            .iter_mut()
            .find(|dep| **dep == forward)
        {
            succ.set_latency(latency);
        }
        self.nodes[to.index()].preds[index].set_latency(latency);

        if !existing.is_weak() {
            self.mark_depth_dirty(to);
            self.mark_height_dirty(from);
        }

        debug!(%from, %to, old = existing.latency(), new = latency, "edge latency widened");
        EdgeChange::Widened
    }

    /// Remove the first edge through which `to` depends on `from`.
    ///
    /// Returns the removed edge as seen from `to`.
    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) -> Result<Dep> {
        self.check(from)?;
        self.check(to)?;

        let pred_index = self.nodes[to.index()]
            .preds
            .iter()
            .position(|dep| dep.node() == from)
            .ok_or(DagError::EdgeNotFound { from, to })?;
        let pred = self.nodes[to.index()].preds[pred_index];
        let forward = pred.mirrored(to);
        let succ_index = self.nodes[from.index()]
            .succs
            .iter()
            .position(|dep| *dep == forward)
            .ok_or_else(|| {
                DagError::InvariantBroken(format!("{from} -> {to} missing from successor list"))
            })?;

        let weak = pred.is_weak();
        let from_scheduled = self.nodes[from.index()].is_scheduled;
        let to_scheduled = self.nodes[to.index()].is_scheduled;

        let dependent = &mut self.nodes[to.index()];
        dependent.preds.remove(pred_index);
        if pred.kind().is_data() {
            decrement(&mut dependent.num_preds, to, "data predecessors")?;
        }
        if !from_scheduled {
            if weak {
                decrement(&mut dependent.weak_preds_left, to, "weak predecessors left")?;
            } else {
                decrement(&mut dependent.num_preds_left, to, "predecessors left")?;
            }
        }

        let producer = &mut self.nodes[from.index()];
        producer.succs.remove(succ_index);
        if pred.kind().is_data() {
            decrement(&mut producer.num_succs, from, "data successors")?;
        }
        if !to_scheduled {
            if weak {
                decrement(&mut producer.weak_succs_left, from, "weak successors left")?;
            } else {
                decrement(&mut producer.num_succs_left, from, "successors left")?;
            }
        }

        if !weak {
            self.dirty_endpoints(from, to, pred.latency());
        }

        debug!(%from, %to, edge = %pred, "edge removed");
        Ok(pred)
    }

    /// Invalidate the metrics an edge `from -> to` contributes to.
    ///
    /// A zero-latency edge leaving a node of depth 0 cannot change the depth
    /// of `to`, and one entering a node of height 0 cannot change the height
    /// of `from`.
    fn dirty_endpoints(&mut self, from: NodeId, to: NodeId, latency: u32) {
        if latency != 0 || self.nodes[from.index()].depth != Metric::Valid(0) {
            self.mark_depth_dirty(to);
        }
        if latency != 0 || self.nodes[to.index()].height != Metric::Valid(0) {
            self.mark_height_dirty(from);
        }
    }

    /// Invalidate the depth of `id` and of everything below it.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    pub fn mark_depth_dirty(&mut self, id: NodeId) {
        self.mark_dirty(Side::Depth, id);
    }

    /// Invalidate the height of `id` and of everything above it.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    pub fn mark_height_dirty(&mut self, id: NodeId) {
        self.mark_dirty(Side::Height, id);
    }

    fn mark_dirty(&mut self, side: Side, id: NodeId) {
        if !side.metric(&self.nodes[id.index()]).is_current() {
            return;
        }
        let mut work: Worklist = smallvec![id];
        while let Some(cur) = work.pop() {
            *side.metric_mut(&mut self.nodes[cur.index()]) = Metric::Stale;
            for dep in side.downstream(&self.nodes[cur.index()]) {
                if side.metric(&self.nodes[dep.node().index()]).is_current() {
                    work.push(dep.node());
                }
            }
        }
    }

    /// Longest latency path from any root down to `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    pub fn depth(&mut self, id: NodeId) -> u32 {
        self.compute(Side::Depth, id)
    }

    /// Longest latency path from `id` down to any leaf.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    pub fn height(&mut self, id: NodeId) -> u32 {
        self.compute(Side::Height, id)
    }

    fn compute(&mut self, side: Side, id: NodeId) -> u32 {
        if let Metric::Valid(value) = side.metric(&self.nodes[id.index()]) {
            return value;
        }

        let mut work: Worklist = smallvec![id];
        while let Some(&cur) = work.last() {
            if side.metric(&self.nodes[cur.index()]).is_current() {
                work.pop();
                continue;
            }

            let mut done = true;
            let mut longest = 0u32;
            for dep in side.upstream(&self.nodes[cur.index()]) {
                match side.metric(&self.nodes[dep.node().index()]) {
                    Metric::Valid(value) => {
                        longest = longest.max(value.saturating_add(dep.latency()));
                    }
                    Metric::Stale => {
                        done = false;
                        work.push(dep.node());
                    }
                }
            }

            if done {
                work.pop();
                // Consumers of the previous value must not stay valid.
                self.invalidate_downstream(side, cur);
                *side.metric_mut(&mut self.nodes[cur.index()]) = Metric::Valid(longest);
            }
        }

        side.metric(&self.nodes[id.index()]).value().unwrap_or_default()
    }

    fn invalidate_downstream(&mut self, side: Side, id: NodeId) {
        let current: Worklist = side
            .downstream(&self.nodes[id.index()])
            .map(Dep::node)
            .filter(|node| side.metric(&self.nodes[node.index()]).is_current())
            .collect();
        for node in current {
            self.mark_dirty(side, node);
        }
    }

    /// Raise the depth of `id` to at least `depth`, invalidating everything
    /// below it if that changes the value.
    pub fn set_depth_to_at_least(&mut self, id: NodeId, depth: u32) {
        self.raise(Side::Depth, id, depth);
    }

    /// Raise the height of `id` to at least `height`, invalidating everything
    /// above it if that changes the value.
    pub fn set_height_to_at_least(&mut self, id: NodeId, height: u32) {
        self.raise(Side::Height, id, height);
    }

    fn raise(&mut self, side: Side, id: NodeId, value: u32) {
        if value <= self.compute(side, id) {
            return;
        }
        self.mark_dirty(side, id);
        *side.metric_mut(&mut self.nodes[id.index()]) = Metric::Valid(value);
    }

    /// Move the deepest data predecessor of `id` to the front of its
    /// predecessor list, so heuristics that look at the first predecessor
    /// follow the critical path.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    pub fn bias_critical_path(&mut self, id: NodeId) {
        if self.nodes[id.index()].required_preds().count() < 2 {
            return;
        }

        let candidates: SmallVec<[(usize, NodeId); 8]> = self.nodes[id.index()]
            .preds
            .iter()
            .enumerate()
            .filter(|(_, dep)| dep.kind().is_data())
            .map(|(index, dep)| (index, dep.node()))
            .collect();

        let mut best: Option<(usize, u32)> = None;
        for (index, pred) in candidates {
            let depth = self.depth(pred);
            if best.map_or(true, |(_, max)| depth > max) {
                best = Some((index, depth));
            }
        }

        if let Some((index, _)) = best {
            if index != 0 {
                self.nodes[id.index()].preds.swap(0, index);
            }
        }
    }

    /// Commit `id` as scheduled and release its neighbours.
    ///
    /// Top-down scheduling releases successors, bottom-up releases
    /// predecessors. Returns the neighbours that have no required
    /// dependencies left.
    pub fn mark_scheduled(&mut self, id: NodeId, direction: Direction) -> Result<Worklist> {
        self.check(id)?;
        let node = &self.nodes[id.index()];
        if node.is_scheduled {
            return Err(DagError::InvariantBroken(format!("{id} scheduled twice")));
        }
        let released: DepList = match direction {
            Direction::TopDown => node.succs.clone(),
            Direction::BottomUp => node.preds.clone(),
        };

        // Nothing is committed until every counter is known to cover its
        // releases.
        let mut releases: IndexMap<(NodeId, bool), u32> = IndexMap::new();
        for dep in &released {
            *releases.entry((dep.node(), dep.is_weak())).or_default() += 1;
        }
        for (&(other, weak), &count) in &releases {
            let (counter, what) = pending(&mut self.nodes[other.index()], direction, weak);
            if *counter < count {
                return Err(DagError::InvariantBroken(format!("{what} of {other} underflowed")));
            }
        }

        self.nodes[id.index()].is_scheduled = true;
        let mut ready = Worklist::new();
        for dep in &released {
            let other = dep.node();
            let weak = dep.is_weak();
            let (counter, what) = pending(&mut self.nodes[other.index()], direction, weak);
            decrement(counter, other, what)?;
            if !weak && *counter == 0 {
                ready.push(other);
            }
        }

        trace!(%id, ?direction, ready = ready.len(), "node scheduled");
        Ok(ready)
    }

    /// Check that scheduling finished: every live instruction is scheduled
    /// and has no dependencies left in the scheduling direction.
    ///
    /// Instructions without any data edge count as dead and may stay
    /// unscheduled. Returns the number of live instructions.
    pub fn verify_scheduled(&self, direction: Direction) -> Result<usize> {
        let mut dead = 0;
        for node in &self.nodes[..self.instr_count()] {
            if !node.is_scheduled {
                if node.num_preds == 0 && node.num_succs == 0 {
                    dead += 1;
                    continue;
                }
                return Err(DagError::Unscheduled {
                    node: node.id(),
                    reason: "has not been scheduled",
                });
            }
            match direction {
                Direction::TopDown if node.num_preds_left != 0 => {
                    return Err(DagError::Unscheduled {
                        node: node.id(),
                        reason: "has predecessors left",
                    });
                }
                Direction::BottomUp if node.num_succs_left != 0 => {
                    return Err(DagError::Unscheduled {
                        node: node.id(),
                        reason: "has successors left",
                    });
                }
                _ => {}
            }
        }
        Ok(self.instr_count() - dead)
    }

    /// Display name of a node: `SU(n)`, `EntrySU` or `ExitSU`.
    pub fn label(&self, id: NodeId) -> String {
        if id == self.entry {
            "EntrySU".to_string()
        } else if id == self.exit {
            "ExitSU".to_string()
        } else {
            id.to_string()
        }
    }

    /// Multi-line description of a node and its edges. Computes stale
    /// metrics.
    pub fn dump_node(&mut self, id: NodeId) -> String {
        let depth = self.depth(id);
        let height = self.height(id);
        let node = &self.nodes[id.index()];

        let mut out = String::new();
        let _ = writeln!(out, "{}", self.label(id));
        let _ = writeln!(out, "  # preds left       : {}", node.num_preds_left);
        let _ = writeln!(out, "  # succs left       : {}", node.num_succs_left);
        if node.weak_preds_left != 0 {
            let _ = writeln!(out, "  # weak preds left  : {}", node.weak_preds_left);
        }
        if node.weak_succs_left != 0 {
            let _ = writeln!(out, "  # weak succs left  : {}", node.weak_succs_left);
        }
        let _ = writeln!(out, "  Depth              : {depth}");
        let _ = writeln!(out, "  Height             : {height}");
        if !node.preds.is_empty() {
            let _ = writeln!(out, "  Predecessors:");
            for dep in &node.preds {
                let _ = writeln!(out, "    {}: {dep}", self.label(dep.node()));
            }
        }
        if !node.succs.is_empty() {
            let _ = writeln!(out, "  Successors:");
            for dep in &node.succs {
                let _ = writeln!(out, "    {}: {dep}", self.label(dep.node()));
            }
        }

        trace!(node = %id, "{out}");
        out
    }

    /// Serializable view of the graph with whatever metrics are cached.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            entry: self.entry,
            exit: self.exit,
            nodes: self
                .nodes
                .iter()
                .map(|node| NodeSnapshot {
                    id: node.id(),
                    kind: node.kind(),
                    preds: node.preds.to_vec(),
                    depth: node.depth.value(),
                    height: node.height.value(),
                    scheduled: node.is_scheduled,
                })
                .collect(),
        }
    }
}

/// Counter of `node` that scheduling a neighbour in `direction` releases.
fn pending(node: &mut Node, direction: Direction, weak: bool) -> (&mut u32, &'static str) {
    match (direction, weak) {
        (Direction::TopDown, false) => (&mut node.num_preds_left, "predecessors left"),
        (Direction::TopDown, true) => (&mut node.weak_preds_left, "weak predecessors left"),
        (Direction::BottomUp, false) => (&mut node.num_succs_left, "successors left"),
        (Direction::BottomUp, true) => (&mut node.weak_succs_left, "weak successors left"),
    }
}

fn decrement(counter: &mut u32, node: NodeId, what: &str) -> Result<()> {
    *counter = counter
        .checked_sub(1)
        .ok_or_else(|| DagError::InvariantBroken(format!("{what} of {node} underflowed")))?;
    Ok(())
}

/// Point-in-time copy of a [`ScheduleGraph`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub entry: NodeId,
    pub exit: NodeId,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub preds: Vec<Dep>,
    pub depth: Option<u32>,
    pub height: Option<u32>,
    pub scheduled: bool,
}
