//! Leiden community detection & fractal dimension estimation (spec §4.8,
//! component C9). Contract-level per spec: the hard algorithmic parts live
//! entirely in these two submodules, decoupled from [`crate::graph::Graph`]
//! by [`metrics::LevelGraph`]'s flat aggregation-ladder representation.

pub mod dimension;
pub mod leiden;
pub mod metrics;

pub use dimension::{node_dimension, global_dimension, DimensionConfig, DimensionMethod, DimensionResult};
pub use leiden::{LeidenConfig, LeidenPhase, LeidenSession};
pub use metrics::{modularity, LevelGraph};
