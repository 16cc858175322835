//! Property-based tests for the scheduling graph and its topological order.
//!
//! Random edge scripts mixing data, order and weak edges are replayed
//! against both the real structures and a small brute-force model of the
//! graph, and the two are compared after every step.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use schedgraph_core::graph::{DepKind, NodeId, OrderKind, ScheduleGraph};
use schedgraph_core::topo::TopoOrder;
use schedgraph_core::{DagError, TopoConfig};

/// Edge kinds the scripts draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Kind {
    Data,
    Barrier,
    Artificial,
    Weak,
}

impl Kind {
    fn dep(self) -> DepKind {
        match self {
            Kind::Data => DepKind::Data(None),
            Kind::Barrier => DepKind::Order(OrderKind::Barrier),
            Kind::Artificial => DepKind::Order(OrderKind::Artificial),
            Kind::Weak => DepKind::Order(OrderKind::Weak),
        }
    }

    fn is_weak(self) -> bool {
        matches!(self, Kind::Artificial | Kind::Weak)
    }
}

/// Brute-force view of the accepted edges: `(from, to, kind) -> latency`.
///
/// Paths, depths and heights only follow required edges.
#[derive(Debug, Default)]
struct Model {
    len: u32,
    edges: BTreeMap<(u32, u32, Kind), u32>,
}

impl Model {
    fn new(len: usize) -> Self {
        Self {
            len: len as u32,
            edges: BTreeMap::new(),
        }
    }

    /// A weak edge is dropped when the pair is already connected. A required
    /// one merges with an edge of the same kind, keeping the larger latency.
    fn add(&mut self, from: u32, to: u32, kind: Kind, latency: u32) {
        if kind.is_weak() {
            if self.edges.keys().any(|&(f, t, _)| f == from && t == to) {
                return;
            }
            self.edges.insert((from, to, kind), latency);
            return;
        }
        let entry = self.edges.entry((from, to, kind)).or_insert(latency);
        *entry = (*entry).max(latency);
    }

    fn incoming(&self, id: u32, weak: bool) -> usize {
        self.edges
            .keys()
            .filter(|&&(_, to, kind)| to == id && kind.is_weak() == weak)
            .count()
    }

    fn outgoing(&self, id: u32, weak: bool) -> usize {
        self.edges
            .keys()
            .filter(|&&(from, _, kind)| from == id && kind.is_weak() == weak)
            .count()
    }

    fn succs(&self, id: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edges
            .iter()
            .filter(move |((from, _, kind), _)| *from == id && !kind.is_weak())
            .map(|(&(_, to, _), &latency)| (to, latency))
    }

    fn preds(&self, id: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edges
            .iter()
            .filter(move |((_, to, kind), _)| *to == id && !kind.is_weak())
            .map(|(&(from, _, _), &latency)| (from, latency))
    }

    /// Paths of length zero count.
    fn reaches(&self, from: u32, to: u32) -> bool {
        let mut seen = BTreeSet::from([from]);
        let mut stack = vec![from];
        while let Some(cur) = stack.pop() {
            if cur == to {
                return true;
            }
            for (succ, _) in self.succs(cur) {
                if seen.insert(succ) {
                    stack.push(succ);
                }
            }
        }
        false
    }

    /// Longest latency sum over every path ending at `id`.
    fn depth(&self, id: u32) -> u32 {
        self.preds(id)
            .map(|(pred, latency)| self.depth(pred) + latency)
            .max()
            .unwrap_or(0)
    }

    /// Longest latency sum over every path starting at `id`.
    fn height(&self, id: u32) -> u32 {
        self.succs(id)
            .map(|(succ, latency)| self.height(succ) + latency)
            .max()
            .unwrap_or(0)
    }

    fn between(&self, start: u32, target: u32) -> BTreeSet<NodeId> {
        (0..self.len)
            .filter(|&id| id != start && id != target)
            .filter(|&id| self.reaches(start, id) && self.reaches(id, target))
            .map(NodeId::from)
            .collect()
    }
}

type Script = Vec<(u32, u32, Kind, u32)>;

fn kind() -> impl Strategy<Value = Kind> {
    prop_oneof![
        4 => Just(Kind::Data),
        1 => Just(Kind::Barrier),
        1 => Just(Kind::Artificial),
        2 => Just(Kind::Weak),
    ]
}

/// Node count plus a script of `(from, to, kind, latency)` insertions,
/// which may contain self loops and cycles.
fn edge_script() -> impl Strategy<Value = (usize, Script)> {
    (2usize..=10).prop_flat_map(|len| {
        let edge = (0..len as u32, 0..len as u32, kind(), 0u32..5);
        (Just(len), prop::collection::vec(edge, 0..40))
    })
}

fn insert(
    order: &mut TopoOrder,
    graph: &mut ScheduleGraph,
    (from, to, kind, latency): (u32, u32, Kind, u32),
) -> Result<(), DagError> {
    let (from, to) = (NodeId::from(from), NodeId::from(to));
    order.insert_edge(graph, from, to, kind.dep(), latency).map(drop)
}

/// Replay `script` through `TopoOrder::insert_edge`, keeping the model in
/// sync with the accepted edges.
fn replay(len: usize, script: &[(u32, u32, Kind, u32)]) -> (ScheduleGraph, TopoOrder, Model) {
    let mut graph = ScheduleGraph::new(len);
    let mut order = TopoOrder::build_with(&graph, TopoConfig::stress()).unwrap();
    let mut model = Model::new(len);
    for &(from, to, kind, latency) in script {
        if from == to {
            continue;
        }
        if insert(&mut order, &mut graph, (from, to, kind, latency)).is_ok() {
            model.add(from, to, kind, latency);
        }
    }
    (graph, order, model)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// A required insertion is rejected exactly when its target already
    /// reaches its source, and a rejection leaves the order untouched. Weak
    /// insertions are never rejected and never move a node.
    #[test]
    fn cycle_rejection_matches_reachability((len, script) in edge_script()) {
        let mut graph = ScheduleGraph::new(len);
        let mut order = TopoOrder::build_with(&graph, TopoConfig::stress()).unwrap();
        let mut model = Model::new(len);

        for (from, to, kind, latency) in script {
            if from == to {
                continue;
            }
            let closes_cycle = !kind.is_weak() && model.reaches(to, from);
            let before = order.order().to_vec();
            match insert(&mut order, &mut graph, (from, to, kind, latency)) {
                Ok(()) => {
                    prop_assert!(!closes_cycle, "{} -> {} accepted despite a cycle", from, to);
                    model.add(from, to, kind, latency);
                }
                Err(DagError::WouldCreateCycle { .. }) => {
                    prop_assert!(closes_cycle, "{} -> {} rejected without a cycle", from, to);
                    prop_assert_eq!(order.order(), &before[..]);
                }
                Err(err) => prop_assert!(false, "unexpected error: {}", err),
            }
            if kind.is_weak() {
                prop_assert_eq!(order.order(), &before[..]);
            }
            prop_assert!(order.verify(&graph));
        }
    }

    /// Cached depth and height always match the longest required paths of
    /// the model, with queries interleaved between insertions, and the
    /// readiness counters match the accepted edges.
    #[test]
    fn metrics_match_brute_force((len, script) in edge_script()) {
        let mut graph = ScheduleGraph::new(len);
        let mut order = TopoOrder::build(&graph).unwrap();
        let mut model = Model::new(len);

        for (step, &(from, to, kind, latency)) in script.iter().enumerate() {
            if from == to {
                continue;
            }
            if insert(&mut order, &mut graph, (from, to, kind, latency)).is_ok() {
                model.add(from, to, kind, latency);
            }
            prop_assert!(order.verify(&graph));

            // Query only part of the graph on odd steps so some caches stay
            // stale across insertions.
            let probe = if step % 2 == 0 { 0..len as u32 } else { to..to + 1 };
            for id in probe {
                prop_assert_eq!(graph.depth(NodeId::from(id)), model.depth(id));
                prop_assert_eq!(graph.height(NodeId::from(id)), model.height(id));
            }
        }

        for id in 0..len as u32 {
            let node = NodeId::from(id);
            prop_assert_eq!(graph.depth(node), model.depth(id));
            prop_assert_eq!(graph.height(node), model.height(id));

            let node = graph.node(node);
            prop_assert_eq!(node.num_preds_left() as usize, model.incoming(id, false));
            prop_assert_eq!(node.weak_preds_left() as usize, model.incoming(id, true));
            prop_assert_eq!(node.num_succs_left() as usize, model.outgoing(id, false));
            prop_assert_eq!(node.weak_succs_left() as usize, model.outgoing(id, true));
        }
    }

    /// A repair moves the nodes reachable from the new edge's target behind
    /// its source without reordering either group internally.
    #[test]
    fn repair_preserves_relative_order(
        (len, script) in edge_script(),
        from in 0u32..10,
        to in 0u32..10,
    ) {
        let (mut graph, mut order, model) = replay(len, &script);
        let (from, to) = (from % len as u32, to % len as u32);
        prop_assume!(from != to);

        let upper = order.position(NodeId::from(from));
        let before = order.order().to_vec();
        let moved: BTreeSet<NodeId> = (0..len as u32)
            .filter(|&id| model.reaches(to, id))
            .map(NodeId::from)
            .filter(|&id| order.position(id) < upper)
            .collect();

        let result = order.insert_edge(
            &mut graph,
            NodeId::from(from),
            NodeId::from(to),
            DepKind::Data(None),
            1,
        );
        prop_assume!(result.is_ok());

        let stayed = |id: &NodeId| !moved.contains(id);
        let was_moved = |id: &NodeId| moved.contains(id);
        let old_moved: Vec<_> = before.iter().copied().filter(was_moved).collect();
        let new_moved: Vec<_> = order.order().iter().copied().filter(was_moved).collect();
        let old_stayed: Vec<_> = before.iter().copied().filter(stayed).collect();
        let new_stayed: Vec<_> = order.order().iter().copied().filter(stayed).collect();

        prop_assert_eq!(old_moved, new_moved);
        prop_assert_eq!(old_stayed, new_stayed);
        prop_assert!(order.position(NodeId::from(from)) < order.position(NodeId::from(to)));
        prop_assert!(order.verify(&graph));
    }

    /// `subgraph` returns exactly the nodes on some path between its
    /// endpoints, or `NoPath` when there is none.
    #[test]
    fn subgraph_matches_brute_force(
        (len, script) in edge_script(),
        start in 0u32..10,
        target in 0u32..10,
    ) {
        let (graph, mut order, model) = replay(len, &script);
        let (start, target) = (start % len as u32, target % len as u32);
        let before = order.order().to_vec();

        let result = order.subgraph(&graph, NodeId::from(start), NodeId::from(target));
        if start != target && model.reaches(start, target) {
            let nodes: BTreeSet<NodeId> = result.unwrap().into_iter().collect();
            prop_assert_eq!(nodes, model.between(start, target));
        } else {
            prop_assert_eq!(
                result,
                Err(DagError::NoPath {
                    start: NodeId::from(start),
                    target: NodeId::from(target),
                })
            );
        }
        prop_assert_eq!(order.order(), &before[..]);
    }

    /// Reachability queries agree with the model and leave no marks behind.
    #[test]
    fn reachability_matches_brute_force((len, script) in edge_script()) {
        let (graph, mut order, model) = replay(len, &script);
        for source in 0..len as u32 {
            for target in 0..len as u32 {
                prop_assert_eq!(
                    order.is_reachable(&graph, NodeId::from(source), NodeId::from(target)),
                    model.reaches(source, target)
                );
            }
        }
        prop_assert!(order.verify(&graph));
    }
}
