//! Selector & Query Evaluator (spec §4.6, component C6).
//!
//! A small declarative predicate language over node/edge attributes. The
//! grammar is parsed by [`parser::parse`] into the [`ast::Expr`] tree and
//! run by [`eval::select`]. Grounded on the teacher's `dot.rs`: that module
//! is the one place in the teacher that parses a small textual grammar
//! (graphviz `dot` output generation, not parsing, but the same
//! "tokens -> small recursive structure" shape carries over once we need an
//! actual parser, which we import from the DSL literature the pack
//! otherwise shows for small embedded languages).

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use eval::{select, Target};

use crate::error::GraphResult;
use crate::graph::Graph;

/// A selector is an append-only vector of matching indices (spec §4.6).
pub type Selector = Vec<u32>;

pub fn select_nodes(graph: &Graph, query: &str) -> GraphResult<Selector> {
    select(graph, Target::Node, query)
}

pub fn select_edges(graph: &Graph, query: &str) -> GraphResult<Selector> {
    select(graph, Target::Edge, query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{BaseType, Scope};

    #[test]
    fn edge_scope_query_matches_spec_scenario_4() {
        let mut g = Graph::new(true, 0, 0);
        g.add_nodes(3).unwrap();
        g.define_attribute(Scope::Node, "label", BaseType::String, 1).unwrap();
        g.set_value_string(Scope::Node, "label", 0, Some("A")).unwrap();
        g.set_value_string(Scope::Node, "label", 1, Some("B")).unwrap();
        g.set_value_string(Scope::Node, "label", 2, Some("A")).unwrap();
        g.define_attribute(Scope::Edge, "w", BaseType::F32, 1).unwrap();
        let edges = g.add_edges(&[(0, 1), (2, 1), (1, 0)]).unwrap();
        g.set_value_f64(Scope::Edge, "w", edges[0], 0, 0.9).unwrap();
        g.set_value_f64(Scope::Edge, "w", edges[1], 0, 0.1).unwrap();
        g.set_value_f64(Scope::Edge, "w", edges[2], 0, 0.9).unwrap();

        let selected = select_edges(&g, "$src.label == \"A\" AND w > 0.5").unwrap();
        assert_eq!(selected, vec![edges[0]]);
    }

    #[test]
    fn both_neighbor_false_on_isolated_node() {
        let mut g = Graph::new(true, 0, 0);
        g.add_nodes(1).unwrap();
        g.define_attribute(Scope::Node, "flag", BaseType::Bool, 1).unwrap();
        let selected = select_nodes(&g, "$both.neighbor.flag == 1").unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn query_parse_error_reports_offset() {
        let g = Graph::new(true, 0, 0);
        let err = select_nodes(&g, "@@@").unwrap_err();
        match err {
            crate::error::GraphError::Query { offset, .. } => assert_eq!(offset, 0),
            other => panic!("expected Query error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_attribute_bind_error_reports_offset_zero() {
        let mut g = Graph::new(true, 0, 0);
        g.add_nodes(1).unwrap();
        let err = select_nodes(&g, "missing_attr == 1").unwrap_err();
        match err {
            crate::error::GraphError::Query { offset, .. } => assert_eq!(offset, 0),
            other => panic!("expected Query error, got {other:?}"),
        }
    }
}
