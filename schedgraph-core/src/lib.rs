//! Schedgraph Core
//!
//! This crate provides the dependency graph used by list-based instruction
//! scheduling in a compiler backend. It implements:
//!
//! - A per-region dependency graph with mirrored edge lists and readiness
//!   counters
//! - Lazily maintained longest-path metrics (depth and height)
//! - An incremental topological order with cycle rejection
//! - Reachability and path-subgraph queries
//!
//! Everything is single-threaded and in-memory. Each scheduling region owns
//! its own [`ScheduleGraph`](graph::ScheduleGraph) and
//! [`TopoOrder`](topo::TopoOrder); independent regions can be processed on
//! different threads.
//!
//! # Architecture
//!
//! - `graph`: nodes, dependence edges and the region graph
//! - `topo`: the online topological order and its queries
//! - `config`: verification policy for the order
//! - `error`: the crate error type
//!
//! # Example
//!
//! ```rust
//! use schedgraph_core::graph::{DepKind, NodeId, ScheduleGraph};
//! use schedgraph_core::topo::TopoOrder;
//! use schedgraph_core::DagError;
//!
//! let (load, add, store) = (NodeId::from(0), NodeId::from(1), NodeId::from(2));
//! let mut graph = ScheduleGraph::new(3);
//! graph.add_edge(load, add, DepKind::Data(None), 3, true)?;
//! graph.add_edge(add, store, DepKind::Data(None), 1, true)?;
//!
//! let mut order = TopoOrder::build(&graph)?;
//! assert_eq!(graph.depth(store), 4);
//!
//! // The store cannot also feed the load.
//! let err = order
//!     .insert_edge(&mut graph, store, load, DepKind::Data(None), 1)
//!     .unwrap_err();
//! assert_eq!(err, DagError::WouldCreateCycle { from: store, to: load });
//! # Ok::<(), DagError>(())
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod topo;

pub use config::{TopoConfig, VerifyPolicy};
pub use error::{DagError, Result};
