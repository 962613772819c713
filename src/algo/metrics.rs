//! Weighted modularity (spec §4.8), shared by [`super::leiden`]'s
//! coarse/refine phases and its public return value.
//!
//! Grounded on the teacher's `algo/community/metrics.rs`: both compute
//! Newman-Girvan modularity over a weighted adjacency and a partition, we
//! just operate on a flat adjacency-list level graph instead of a generic
//! `petgraph` visitor-trait graph, since Leiden here runs on a purpose-built
//! aggregation ladder rather than the caller's `Graph` directly.

/// One level of the Leiden aggregation ladder: a symmetric weighted
/// adjacency list plus precomputed self-loop and degree arrays.
#[derive(Debug, Clone, Default)]
pub struct LevelGraph {
    pub adjacency: Vec<Vec<(u32, f64)>>,
    pub self_loop: Vec<f64>,
    pub degree: Vec<f64>,
    pub total_weight: f64,
}

impl LevelGraph {
    pub fn new(n: usize) -> Self {
        LevelGraph {
            adjacency: vec![Vec::new(); n],
            self_loop: vec![0.0; n],
            degree: vec![0.0; n],
            total_weight: 0.0,
        }
    }

    pub fn recompute_degrees(&mut self) {
        for i in 0..self.adjacency.len() {
            let neigh: f64 = self.adjacency[i].iter().map(|&(_, w)| w).sum();
            self.degree[i] = neigh + 2.0 * self.self_loop[i];
        }
        self.total_weight = self.degree.iter().sum::<f64>() / 2.0;
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }
}

/// Weighted modularity of `community_of` on `level` at `resolution` (spec
/// §4.8 "modularity formula"). Returns `0.0` for an empty or zero-weight
/// graph rather than dividing by zero.
pub fn modularity(level: &LevelGraph, community_of: &[u32], resolution: f64) -> f64 {
    let m = level.total_weight;
    if m <= 0.0 {
        return 0.0;
    }
    let num_communities = community_of.iter().copied().max().map(|x| x as usize + 1).unwrap_or(0);
    let mut sum_k = vec![0.0f64; num_communities];
    let mut sum_a = vec![0.0f64; num_communities];

    for i in 0..level.len() {
        let ci = community_of[i] as usize;
        sum_k[ci] += level.degree[i];
        sum_a[ci] += 2.0 * level.self_loop[i];
        for &(j, w) in &level.adjacency[i] {
            if community_of[j as usize] as usize == ci {
                sum_a[ci] += w;
            }
        }
    }

    let two_m = 2.0 * m;
    let mut q = 0.0;
    for c in 0..num_communities {
        q += sum_a[c] / two_m - resolution * (sum_k[c] / two_m).powi(2);
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_disjoint_triangles_is_perfectly_modular() {
        // 0-1-2 triangle and 3-4-5 triangle, unit weights, no inter-edges.
        let mut level = LevelGraph::new(6);
        let edges = [(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5)];
        for &(a, b) in &edges {
            level.adjacency[a].push((b as u32, 1.0));
            level.adjacency[b].push((a as u32, 1.0));
        }
        level.recompute_degrees();
        let community_of = vec![0, 0, 0, 1, 1, 1];
        let q_good = modularity(&level, &community_of, 1.0);
        let all_one = vec![0, 0, 0, 0, 0, 0];
        let q_bad = modularity(&level, &all_one, 1.0);
        assert!(q_good > q_bad);
        assert!(q_good > 0.3);
    }

    #[test]
    fn empty_graph_has_zero_modularity() {
        let level = LevelGraph::new(0);
        assert_eq!(modularity(&level, &[], 1.0), 0.0);
    }
}
