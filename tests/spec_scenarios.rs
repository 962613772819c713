//! Concrete end-to-end scenarios exercising the graph engine across module
//! boundaries: topology mutation, binary round-trip, categorization, and
//! the reserved-name/codec contracts that unit tests inside each module
//! don't reach on their own.

use xnetgraph::algo::{LeidenConfig, LeidenSession};
use xnetgraph::attr::category::{categorize, decategorize};
use xnetgraph::attr::SortPolicy;
use xnetgraph::codec::{read_bxnet, read_xnet, write_bxnet, write_xnet, BxnetWriteOptions, XnetWriteOptions};
use xnetgraph::{BaseType, Graph, Scope};

#[test]
fn basic_directed_graph_mutation_sequence() {
    let mut g = Graph::new(true, 0, 0);
    let nodes = g.add_nodes(3).unwrap();
    assert_eq!(nodes, vec![0, 1, 2]);

    let edges = g.add_edges(&[(0, 1), (1, 2)]).unwrap();
    assert_eq!(edges, vec![0, 1]);
    assert_eq!(g.out_degree(0).unwrap(), 1);

    g.remove_edges(&[edges[0]]).unwrap();
    assert_eq!(g.edge_count(), 1);

    g.remove_nodes(&[1]).unwrap();
    assert!(!g.node_active(1));
    assert_eq!(g.edge_count(), 0);
}

#[test]
fn freed_index_is_reissued_lifo() {
    let mut g = Graph::new(true, 0, 0);
    let i = g.add_nodes(1).unwrap()[0];
    g.remove_nodes(&[i]).unwrap();
    let j = g.add_nodes(1).unwrap()[0];
    assert_eq!(i, j);
}

#[test]
fn attribute_round_trips_through_bxnet_bit_exactly() {
    let mut g = Graph::new(false, 0, 0);
    g.add_nodes(2).unwrap();
    g.define_attribute(Scope::Node, "weight", BaseType::F32, 1).unwrap();
    g.set_value_f64(Scope::Node, "weight", 0, 0, 3.14).unwrap();
    g.set_value_f64(Scope::Node, "weight", 1, 0, 2.71).unwrap();

    let mut buf = Vec::new();
    write_bxnet(&g, &mut buf, BxnetWriteOptions::default()).unwrap();
    let back = read_bxnet(&mut buf.as_slice()).unwrap();

    let w0 = back.get_value_f64(Scope::Node, "weight", 0, 0).unwrap() as f32;
    let w1 = back.get_value_f64(Scope::Node, "weight", 1, 0).unwrap() as f32;
    assert_eq!(w0, 3.14f32);
    assert_eq!(w1, 2.71f32);
}

#[test]
fn bxnet_round_trip_preserves_holes_and_capacities() {
    let mut g = Graph::new(true, 0, 0);
    let n = g.add_nodes(4).unwrap();
    g.add_edges(&[(n[0], n[1]), (n[1], n[2]), (n[2], n[3])]).unwrap();
    g.remove_nodes(&[n[1]]).unwrap(); // leaves a hole at index 1

    let mut buf = Vec::new();
    write_bxnet(&g, &mut buf, BxnetWriteOptions::default()).unwrap();
    let back = read_bxnet(&mut buf.as_slice()).unwrap();

    assert_eq!(back.node_capacity(), g.node_capacity());
    assert!(!back.node_active(1));
    assert!(back.node_active(0) && back.node_active(2) && back.node_active(3));
    assert_eq!(back.edge_count(), g.edge_count());
}

#[test]
fn categorize_then_decategorize_restores_labels_verbatim() {
    let values = [Some("a"), Some("b"), Some("a"), Some("c"), None];
    let (codes, dict) = categorize(&values, SortPolicy::Frequency);
    assert_eq!(codes, vec![0, 1, 0, 2, -1]);
    assert_eq!(dict.label_of(0), Some("a"));
    assert_eq!(dict.label_of(1), Some("b"));
    assert_eq!(dict.label_of(2), Some("c"));

    let restored = decategorize(&codes, &dict, None);
    assert_eq!(restored, vec!["a", "b", "a", "c", "__NA__"]);
}

#[test]
fn xnet_writer_compacts_and_records_original_ids() {
    let mut g = Graph::new(false, 0, 0);
    let n = g.add_nodes(3).unwrap();
    g.add_edges(&[(n[0], n[1])]).unwrap();
    g.remove_nodes(&[n[1]]).unwrap(); // n[2] will be renumbered to 1 on compaction

    let mut out = Vec::new();
    write_xnet(&g, &mut out, &XnetWriteOptions::default()).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("#XNET"));
    assert!(text.contains("_original_ids_"));

    let back = read_xnet(&mut text.as_bytes()).unwrap();
    assert_eq!(back.node_count(), 2);
}

#[test]
fn xnet_string_attribute_round_trips() {
    let mut g = Graph::new(false, 0, 0);
    g.add_nodes(3).unwrap();
    g.define_attribute(Scope::Node, "kind", BaseType::String, 1).unwrap();
    g.set_value_string(Scope::Node, "kind", 0, Some("alpha")).unwrap();
    g.set_value_string(Scope::Node, "kind", 1, Some("beta")).unwrap();
    g.set_value_string(Scope::Node, "kind", 2, Some("alpha")).unwrap();

    let mut out = Vec::new();
    write_xnet(&g, &mut out, &XnetWriteOptions::default()).unwrap();
    let text = String::from_utf8(out).unwrap();

    let back = read_xnet(&mut text.as_bytes()).unwrap();
    let v0 = back.get_value_string(Scope::Node, "kind", 0).unwrap();
    let v1 = back.get_value_string(Scope::Node, "kind", 1).unwrap();
    assert_eq!(v0.as_deref(), Some("alpha"));
    assert_eq!(v1.as_deref(), Some("beta"));
}

#[test]
fn two_ten_cliques_joined_by_a_bridge_form_two_communities() {
    let mut g = Graph::new(false, 0, 0);
    g.add_nodes(20).unwrap();

    let mut edges = Vec::new();
    for a in 0..10u32 {
        for b in (a + 1)..10u32 {
            edges.push((a, b));
        }
    }
    for a in 10..20u32 {
        for b in (a + 1)..20u32 {
            edges.push((a, b));
        }
    }
    edges.push((0, 10)); // single bridge edge between the two cliques
    g.add_edges(&edges).unwrap();

    let q = LeidenSession::run_to_completion(&mut g, LeidenConfig::default(), 256).unwrap();
    assert!(q > 0.45, "expected modularity > 0.45 for two 10-cliques joined by a bridge, got Q={q}");

    let communities: Vec<f64> =
        (0..20).map(|i| g.get_value_f64(Scope::Node, "community", i, 0).unwrap()).collect();
    let distinct: std::collections::HashSet<_> =
        communities.iter().map(|c| c.to_bits()).collect();
    assert_eq!(distinct.len(), 2, "expected exactly two communities, got {distinct:?}");
    assert!(communities[0..10].iter().all(|&c| c == communities[0]));
    assert!(communities[10..20].iter().all(|&c| c == communities[10]));
    assert_ne!(communities[0], communities[10]);
}
