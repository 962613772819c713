//! Neighbour Container (spec §4.2, component C2).
//!
//! Each node owns two of these: one for outbound incidence, one for
//! inbound. Most nodes stay in list form (two parallel `Vec`s, append-only,
//! stream-compacted on bulk removal) the way the teacher's `Csr` and
//! `Graph` adjacency rows are flat vectors; nodes whose degree passes
//! [`NeighborContainer::MAP_THRESHOLD`] upgrade to a `hashbrown`-backed map
//! form, mirroring the `hashbrown::HashMap` the teacher already depends on
//! for its Louvain community maps (`algo/community/louvain.rs`).

use hashbrown::HashMap;

/// Degree at which a node's container is promoted from list to map form
/// (spec §9 "heavy hitter"; threshold resolved in SPEC_FULL §12).
const MAP_THRESHOLD: usize = 64;

#[derive(Debug, Clone)]
pub enum NeighborContainer {
    List {
        nodes: Vec<u32>,
        edges: Vec<u32>,
    },
    Map {
        /// edge_id -> neighbour node
        by_edge: HashMap<u32, u32>,
        /// neighbour node -> multiplicity (parallel-edge count)
        multiplicity: HashMap<u32, u32>,
    },
}

impl Default for NeighborContainer {
    fn default() -> Self {
        NeighborContainer::List {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl NeighborContainer {
    pub const MAP_THRESHOLD: usize = MAP_THRESHOLD;

    pub fn count(&self) -> usize {
        match self {
            NeighborContainer::List { nodes, .. } => nodes.len(),
            NeighborContainer::Map { by_edge, .. } => by_edge.len(),
        }
    }

    pub fn add(&mut self, node: u32, edge: u32) {
        match self {
            NeighborContainer::List { nodes, edges } => {
                nodes.push(node);
                edges.push(edge);
                if nodes.len() > Self::MAP_THRESHOLD {
                    self.upgrade_to_map();
                }
            }
            NeighborContainer::Map { by_edge, multiplicity } => {
                by_edge.insert(edge, node);
                *multiplicity.entry(node).or_insert(0) += 1;
            }
        }
    }

    fn upgrade_to_map(&mut self) {
        let NeighborContainer::List { nodes, edges } = self else {
            return;
        };
        let mut by_edge = HashMap::with_capacity(nodes.len());
        let mut multiplicity = HashMap::new();
        for (&n, &e) in nodes.iter().zip(edges.iter()) {
            by_edge.insert(e, n);
            *multiplicity.entry(n).or_insert(0) += 1;
        }
        *self = NeighborContainer::Map { by_edge, multiplicity };
    }

    /// Removes every edge id present in `doomed`.
    pub fn remove_edges(&mut self, doomed: &hashbrown::HashSet<u32>) {
        match self {
            NeighborContainer::List { nodes, edges } => {
                let mut write = 0;
                for read in 0..edges.len() {
                    if !doomed.contains(&edges[read]) {
                        nodes[write] = nodes[read];
                        edges[write] = edges[read];
                        write += 1;
                    }
                }
                nodes.truncate(write);
                edges.truncate(write);
            }
            NeighborContainer::Map { by_edge, multiplicity } => {
                for &e in doomed {
                    if let Some(n) = by_edge.remove(&e) {
                        if let Some(m) = multiplicity.get_mut(&n) {
                            *m -= 1;
                            if *m == 0 {
                                multiplicity.remove(&n);
                            }
                        }
                    }
                }
            }
        }
    }

    /// A stable snapshot of `(neighbour_node, edge_id)` pairs. List form
    /// preserves insertion order; map form is unordered but stable across
    /// repeated calls until the next mutation.
    pub fn iterate(&self) -> Vec<(u32, u32)> {
        match self {
            NeighborContainer::List { nodes, edges } => {
                nodes.iter().copied().zip(edges.iter().copied()).collect()
            }
            NeighborContainer::Map { by_edge, .. } => {
                by_edge.iter().map(|(&e, &n)| (n, e)).collect()
            }
        }
    }

    pub fn clear(&mut self) {
        *self = NeighborContainer::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_form_preserves_insertion_order() {
        let mut c = NeighborContainer::default();
        c.add(5, 0);
        c.add(6, 1);
        c.add(7, 2);
        assert_eq!(c.iterate(), vec![(5, 0), (6, 1), (7, 2)]);
    }

    #[test]
    fn remove_edges_compacts_list_form() {
        let mut c = NeighborContainer::default();
        for i in 0..5 {
            c.add(i, i);
        }
        let doomed: hashbrown::HashSet<u32> = [1u32, 3].into_iter().collect();
        c.remove_edges(&doomed);
        assert_eq!(c.count(), 3);
        assert_eq!(c.iterate(), vec![(0, 0), (2, 2), (4, 4)]);
    }

    #[test]
    fn upgrades_to_map_past_threshold() {
        let mut c = NeighborContainer::default();
        for i in 0..(NeighborContainer::MAP_THRESHOLD as u32 + 2) {
            c.add(i, i);
        }
        assert!(matches!(c, NeighborContainer::Map { .. }));
        assert_eq!(c.count(), NeighborContainer::MAP_THRESHOLD + 2);
    }

    #[test]
    fn map_form_tracks_multiplicity_and_erases_at_zero() {
        let mut c = NeighborContainer::Map {
            by_edge: HashMap::new(),
            multiplicity: HashMap::new(),
        };
        c.add(9, 100);
        c.add(9, 101);
        assert_eq!(c.count(), 2);
        let doomed: hashbrown::HashSet<u32> = [100u32].into_iter().collect();
        c.remove_edges(&doomed);
        if let NeighborContainer::Map { multiplicity, .. } = &c {
            assert_eq!(multiplicity.get(&9), Some(&1));
        }
        let doomed2: hashbrown::HashSet<u32> = [101u32].into_iter().collect();
        c.remove_edges(&doomed2);
        if let NeighborContainer::Map { multiplicity, .. } = &c {
            assert!(!multiplicity.contains_key(&9));
        }
    }
}
