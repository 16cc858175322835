//! Reachability and subgraph queries.
//!
//! All walks follow required edges only and never look outside the window
//! of positions between their two endpoints: a path from `a` to `b` can only
//! pass through nodes ordered between them.

use indexmap::IndexSet;
use smallvec::smallvec;
use tracing::trace;

use super::order::TopoOrder;
use crate::error::{DagError, Result};
use crate::graph::{NodeId, ScheduleGraph, Worklist};

impl TopoOrder {
    /// Whether `target` can be reached from `source` through required edges.
    ///
    /// A node reaches itself. Does not change the order.
    ///
    /// # Panics
    ///
    /// Panics if `source` or `target` is not a node of the ordered graph.
    pub fn is_reachable(&mut self, graph: &ScheduleGraph, source: NodeId, target: NodeId) -> bool {
        debug_assert_eq!(graph.node_count(), self.len(), "order built for another graph");
        if source == target {
            return true;
        }

        let lower = self.position(source);
        let upper = self.position(target);
        if lower >= upper {
            return false;
        }
        let found = self.mark_reachable(graph, source, upper);
        self.visited.clear();
        found
    }

    /// Whether adding the required edge `from -> to` would close a cycle.
    ///
    /// # Panics
    ///
    /// Panics if `from` or `to` is not a node of the ordered graph.
    pub fn would_create_cycle(&mut self, graph: &ScheduleGraph, from: NodeId, to: NodeId) -> bool {
        self.is_reachable(graph, to, from)
    }

    /// Whether making `target` depend on `candidate` would close a cycle.
    ///
    /// Besides the direct path from `target` to `candidate`, a path from any
    /// predecessor feeding `target` through an assigned register also counts,
    /// since reusing that register ties the predecessor to `target`.
    ///
    /// # Panics
    ///
    /// Panics if `target` or `candidate` is not a node of the ordered graph.
    pub fn will_create_cycle(
        &mut self,
        graph: &ScheduleGraph,
        target: NodeId,
        candidate: NodeId,
    ) -> bool {
        if self.is_reachable(graph, target, candidate) {
            return true;
        }
        let reg_preds: Worklist = graph
            .node(target)
            .preds()
            .iter()
            .filter(|dep| dep.is_assigned_reg_dep())
            .map(|dep| dep.node())
            .collect();
        reg_preds
            .into_iter()
            .any(|pred| self.is_reachable(graph, pred, candidate))
    }

    /// Nodes lying on some path from `start` to `target`, endpoints excluded.
    ///
    /// Fails with [`DagError::NoPath`] if `target` is not reachable from
    /// `start`. Does not change the order.
    pub fn subgraph(
        &mut self,
        graph: &ScheduleGraph,
        start: NodeId,
        target: NodeId,
    ) -> Result<IndexSet<NodeId>> {
        self.check_graph(graph)?;
        graph.check(start)?;
        graph.check(target)?;

        let lower = self.position(start);
        let upper = self.position(target);
        if lower >= upper {
            return Err(DagError::NoPath { start, target });
        }
        debug_assert!(self.visited.is_clear() && self.visited_back.is_clear());

        // Forward: everything reachable from `start` below `upper`.
        let mut found = false;
        let mut work: Worklist = smallvec![start];
        while let Some(cur) = work.pop() {
            for dep in graph.node(cur).required_succs() {
                let succ = dep.node();
                let position = self.position[succ.index()];
                if position == upper {
                    found = true;
                } else if position < upper && self.visited.mark(succ) {
                    work.push(succ);
                }
            }
        }
        if !found {
            self.visited.clear();
            return Err(DagError::NoPath { start, target });
        }

        // Backward: of those, everything `target` can be reached from.
        let mut nodes = IndexSet::new();
        found = false;
        work.push(target);
        while let Some(cur) = work.pop() {
            for dep in graph.node(cur).required_preds() {
                let pred = dep.node();
                if self.position[pred.index()] == lower {
                    found = true;
                } else if self.visited.contains(pred) && self.visited_back.mark(pred) {
                    work.push(pred);
                    nodes.insert(pred);
                }
            }
        }
        self.visited.clear();
        self.visited_back.clear();

        if !found {
            debug_assert!(found, "backward walk from {target} missed {start}");
            return Err(DagError::InvariantBroken(format!(
                "{start} reaches {target} but not the other way round"
            )));
        }

        trace!(%start, %target, nodes = nodes.len(), "subgraph extracted");
        Ok(nodes)
    }
}
