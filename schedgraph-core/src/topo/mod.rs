//! Online Topological Ordering
//!
//! A [`TopoOrder`] indexes the nodes of a [`ScheduleGraph`](crate::graph::ScheduleGraph)
//! so that every required edge points forward, and answers cycle and path
//! queries against that index. It reads the graph's edge lists directly and
//! keeps no copy of its own.
//!
//! Weak edges are scheduling hints and take no part in the order.

mod order;
mod query;
mod visited;

pub use order::TopoOrder;
