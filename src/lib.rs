//! An in-process graph engine for scientific network analysis: a mutable
//! directed/undirected graph with typed node, edge, and graph-wide
//! attributes, persistent on-disk containers ([`codec`]), a declarative
//! selector query language ([`query`]), and two analysis algorithms —
//! Leiden community detection and fractal dimension measurement
//! ([`algo`]).
//!
//! The central type is [`Graph`](graph::Graph). Attributes are typed,
//! dimensioned, scope-bound value buffers ([`attr`]); recyclable node/edge
//! indices are managed by [`index`]; per-node incidence lists live in
//! [`neighbors`]; cached dense/packed views over attribute data live in
//! [`derived`].

pub mod algo;
pub mod attr;
pub mod codec;
pub mod derived;
pub mod error;
pub mod graph;
pub mod index;
pub mod neighbors;
pub mod query;

pub use attr::{Attribute, BaseType, Scope};
pub use error::{GraphError, GraphResult};
pub use graph::Graph;
