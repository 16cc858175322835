//! Dependence Edges
//!
//! A [`Dep`] is one half of a dependence edge. Every edge is stored twice:
//! once in the predecessor list of the dependent node (pointing back at the
//! producer) and once in the successor list of the producer (pointing at the
//! dependent). Both halves carry the same kind and latency.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// A physical or virtual register carried by a dependence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reg(u32);

impl Reg {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%r{}", self.0)
    }
}

/// Sub-kind of an [`DepKind::Order`] dependence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Any other ordering dependency.
    Barrier,

    /// Nonvolatile load/store instructions that may alias.
    MayAliasMem,

    /// Nonvolatile load/store instructions that must alias.
    MustAliasMem,

    /// Arbitrary strong edge added for scheduling heuristics.
    Artificial,

    /// Arbitrary weak edge added for scheduling heuristics.
    Weak,

    /// Weak edge keeping two memory operations next to each other.
    Cluster,
}

/// The kind of a dependence edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepKind {
    /// Regular data dependence (true dependence). May carry the register
    /// holding the value.
    Data(Option<Reg>),

    /// Write-after-read on a register.
    Anti(Reg),

    /// Write-after-write on a register.
    Output(Reg),

    /// Any other ordering constraint.
    Order(OrderKind),
}

impl DepKind {
    /// Latency an edge of this kind gets when the caller has no better number.
    pub fn default_latency(&self) -> u32 {
        match self {
            DepKind::Data(_) => 1,
            DepKind::Anti(_) | DepKind::Output(_) | DepKind::Order(_) => 0,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, DepKind::Data(_))
    }

    /// Register associated with this dependence, if any.
    pub fn reg(&self) -> Option<Reg> {
        match *self {
            DepKind::Data(reg) => reg,
            DepKind::Anti(reg) | DepKind::Output(reg) => Some(reg),
            DepKind::Order(_) => None,
        }
    }

    pub fn order_kind(&self) -> Option<OrderKind> {
        match *self {
            DepKind::Order(kind) => Some(kind),
            _ => None,
        }
    }
}

/// One half of a dependence edge.
///
/// Two `Dep`s compare equal when they point at the same node with the same
/// kind and latency. [`Dep::overlaps`] ignores latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dep {
    node: NodeId,
    kind: DepKind,
    latency: u32,
}

impl Dep {
    pub fn new(node: NodeId, kind: DepKind, latency: u32) -> Self {
        Self { node, kind, latency }
    }

    /// The node on the other end of the edge.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn kind(&self) -> DepKind {
        self.kind
    }

    pub fn latency(&self) -> u32 {
        self.latency
    }

    pub(crate) fn set_latency(&mut self, latency: u32) {
        self.latency = latency;
    }

    /// The same edge seen from the other endpoint.
    pub(crate) fn mirrored(&self, node: NodeId) -> Self {
        Self { node, ..*self }
    }

    pub fn reg(&self) -> Option<Reg> {
        self.kind.reg()
    }

    /// Same endpoint and same kind, including register and order sub-kind.
    pub fn overlaps(&self, other: &Dep) -> bool {
        self.node == other.node && self.kind == other.kind
    }

    /// Hint-only edge that never blocks readiness or ordering.
    pub fn is_weak(&self) -> bool {
        matches!(
            self.kind,
            DepKind::Order(OrderKind::Artificial | OrderKind::Weak)
        )
    }

    /// Anything but a data dependence.
    pub fn is_ctrl(&self) -> bool {
        !self.kind.is_data()
    }

    pub fn is_barrier(&self) -> bool {
        self.kind == DepKind::Order(OrderKind::Barrier)
    }

    /// Ordering between ordinary loads and stores.
    pub fn is_normal_memory(&self) -> bool {
        matches!(
            self.kind,
            DepKind::Order(OrderKind::MayAliasMem | OrderKind::MustAliasMem)
        )
    }

    pub fn is_must_alias(&self) -> bool {
        self.kind == DepKind::Order(OrderKind::MustAliasMem)
    }

    pub fn is_artificial(&self) -> bool {
        self.kind == DepKind::Order(OrderKind::Artificial)
    }

    pub fn is_cluster(&self) -> bool {
        self.kind == DepKind::Order(OrderKind::Cluster)
    }

    /// A data edge whose value lives in a known register.
    pub fn is_assigned_reg_dep(&self) -> bool {
        matches!(self.kind, DepKind::Data(Some(_)))
    }
}

impl fmt::Display for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DepKind::Data(reg) => {
                write!(f, "Data Latency={}", self.latency)?;
                if let Some(reg) = reg {
                    write!(f, " Reg={reg}")?;
                }
                Ok(())
            }
            DepKind::Anti(_) => write!(f, "Anti Latency={}", self.latency),
            DepKind::Output(_) => write!(f, "Out  Latency={}", self.latency),
            DepKind::Order(kind) => {
                let label = match kind {
                    OrderKind::Barrier => "Barrier",
                    OrderKind::MayAliasMem | OrderKind::MustAliasMem => "Memory",
                    OrderKind::Artificial => "Artificial",
                    OrderKind::Weak => "Weak",
                    OrderKind::Cluster => "Cluster",
                };
                write!(f, "Ord  Latency={} {label}", self.latency)
            }
        }
    }
}
