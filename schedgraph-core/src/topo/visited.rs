//! Scratch visited set shared by the ordering walks.

use crate::graph::NodeId;

/// A dense bit set over node ids that remembers which bits it set, so
/// clearing costs only as much as the last walk touched.
///
/// Every public [`TopoOrder`](super::TopoOrder) operation leaves it clear.
#[derive(Debug, Clone, Default)]
pub(crate) struct VisitedSet {
    bits: Vec<bool>,
    touched: Vec<NodeId>,
    count: usize,
}

impl VisitedSet {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            bits: vec![false; len],
            touched: Vec::new(),
            count: 0,
        }
    }

    /// Set the bit for `id`. Returns `false` if it was already set.
    pub(crate) fn mark(&mut self, id: NodeId) -> bool {
        let bit = &mut self.bits[id.index()];
        if *bit {
            return false;
        }
        *bit = true;
        self.touched.push(id);
        self.count += 1;
        true
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.bits[id.index()]
    }

    pub(crate) fn unmark(&mut self, id: NodeId) {
        let bit = &mut self.bits[id.index()];
        if *bit {
            *bit = false;
            self.count -= 1;
        }
    }

    pub(crate) fn clear(&mut self) {
        for id in self.touched.drain(..) {
            self.bits[id.index()] = false;
        }
        self.count = 0;
    }

    pub(crate) fn is_clear(&self) -> bool {
        self.count == 0
    }
}
