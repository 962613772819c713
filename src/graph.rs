//! Graph Core (spec §4.5, component C5).
//!
//! Owns nodes, edges, and the three attribute tables; enforces spec §3's
//! invariants. Structurally this plays the role the teacher's `Graph<N, E,
//! Ty, Ix>` plays (`examples/petgraph-petgraph/src/graph.rs`): one struct
//! owning parallel node/edge storage plus adjacency, with `add_node`/
//! `add_edge`/`remove_node` as the load-bearing mutators. We generalize two
//! things the teacher's `Graph` doesn't need: recyclable indices (the
//! teacher's plain `Graph` never frees slots; its `StableGraph` does via an
//! intrusive free list, which is where [`crate::index::IndexManager`] is
//! grounded) and a typed, named attribute table in place of a single `N`/`E`
//! weight type parameter.

use fixedbitset::FixedBitSet;
use hashbrown::HashSet as HashbrownHashSet;
use indexmap::IndexMap;
use std::collections::HashSet;

use crate::attr::{Attribute, AttrBuffer, BaseType, Scope};
use crate::derived::{pack_rows, encode_color, ColorMode, DerivedBuffer};
use crate::error::{GraphError, GraphResult};
use crate::index::{IndexManager, INVALID_INDEX};
use crate::neighbors::NeighborContainer;

#[derive(Debug, Clone, Default)]
struct NodeRecord {
    out: NeighborContainer,
    inn: NeighborContainer,
}

#[derive(Debug, Clone, Copy, Default)]
struct EdgeRecord {
    from: u32,
    to: u32,
}

/// Geometric growth helper shared by every array the graph owns, so
/// attribute and topology arrays stay size-aligned (spec §4.5 "Growth").
pub fn grow(required: u32, current: u32) -> u32 {
    let geometric = if current == 0 { 4 } else { current.saturating_mul(2) };
    required.max(geometric)
}

#[derive(Debug, Default)]
struct AttributeTable {
    order: IndexMap<String, Attribute>,
}

impl AttributeTable {
    fn define(&mut self, attr: Attribute) -> GraphResult<()> {
        if self.order.contains_key(&attr.name) {
            return Err(GraphError::invalid_argument(format!(
                "attribute '{}' already defined in this scope",
                attr.name
            )));
        }
        self.order.insert(attr.name.clone(), attr);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> GraphResult<Attribute> {
        self.order
            .shift_remove(name)
            .ok_or_else(|| GraphError::not_found(format!("attribute '{name}'")))
    }

    fn get(&self, name: &str) -> GraphResult<&Attribute> {
        self.order.get(name).ok_or_else(|| GraphError::not_found(format!("attribute '{name}'")))
    }

    fn get_mut(&mut self, name: &str) -> GraphResult<&mut Attribute> {
        self.order
            .get_mut(name)
            .ok_or_else(|| GraphError::not_found(format!("attribute '{name}'")))
    }

    fn ensure_capacity_all(&mut self, n: u32) {
        for attr in self.order.values_mut() {
            attr.ensure_capacity(n);
        }
    }

    fn bump_all_versions(&mut self) {
        for attr in self.order.values_mut() {
            attr.bump_version();
        }
    }

    fn clear_slot_all(&mut self, i: u32) {
        for attr in self.order.values_mut() {
            attr.clear_slot(i);
        }
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.order.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DerivedKind {
    Packed,
    ColorU8,
    ColorU32,
}

#[derive(Debug, Default)]
struct DerivedCache {
    buffers: hashbrown::HashMap<(String, DerivedKind), DerivedBuffer>,
    dense_order: Option<Vec<u32>>,
}

impl DerivedCache {
    fn mark_all_dirty(&mut self) {
        for b in self.buffers.values_mut() {
            b.mark_dirty();
        }
    }

    fn set_dense_order(&mut self, order: Option<Vec<u32>>) {
        self.dense_order = order;
        self.mark_all_dirty();
    }

    fn remove_attr(&mut self, name: &str) {
        self.buffers.retain(|(n, _), _| n != name);
    }
}

/// The graph container (spec §3).
pub struct Graph {
    pub directed: bool,
    node_index: IndexManager,
    edge_index: IndexManager,
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
    node_active: FixedBitSet,
    edge_active: FixedBitSet,
    node_attrs: AttributeTable,
    edge_attrs: AttributeTable,
    graph_attrs: AttributeTable,
    node_cache: DerivedCache,
    edge_cache: DerivedCache,
    node_topology_version: u64,
    edge_topology_version: u64,
}

impl Graph {
    pub fn new(directed: bool, node_capacity: u32, edge_capacity: u32) -> Self {
        Graph {
            directed,
            node_index: IndexManager::new(node_capacity),
            edge_index: IndexManager::new(edge_capacity),
            nodes: vec![NodeRecord::default(); node_capacity as usize],
            edges: vec![EdgeRecord::default(); edge_capacity as usize],
            node_active: FixedBitSet::with_capacity(node_capacity as usize),
            edge_active: FixedBitSet::with_capacity(edge_capacity as usize),
            node_attrs: AttributeTable::default(),
            edge_attrs: AttributeTable::default(),
            graph_attrs: AttributeTable::default(),
            node_cache: DerivedCache::default(),
            edge_cache: DerivedCache::default(),
            node_topology_version: 1,
            edge_topology_version: 1,
        }
    }

    pub fn node_count(&self) -> u32 {
        self.node_active.count_ones(..) as u32
    }

    pub fn edge_count(&self) -> u32 {
        self.edge_active.count_ones(..) as u32
    }

    pub fn node_capacity(&self) -> u32 {
        self.node_index.capacity()
    }

    pub fn edge_capacity(&self) -> u32 {
        self.edge_index.capacity()
    }

    pub fn node_active(&self, i: u32) -> bool {
        (i as usize) < self.node_active.len() && self.node_active.contains(i as usize)
    }

    pub fn edge_active(&self, i: u32) -> bool {
        (i as usize) < self.edge_active.len() && self.edge_active.contains(i as usize)
    }

    pub fn edge_endpoints(&self, e: u32) -> GraphResult<(u32, u32)> {
        self.check_edge(e)?;
        let r = self.edges[e as usize];
        Ok((r.from, r.to))
    }

    pub fn node_topology_version(&self) -> u64 {
        self.node_topology_version
    }

    pub fn edge_topology_version(&self) -> u64 {
        self.edge_topology_version
    }

    fn check_node(&self, i: u32) -> GraphResult<()> {
        if !self.node_active(i) {
            return Err(GraphError::out_of_range("node", i as u64, self.node_capacity() as u64));
        }
        Ok(())
    }

    fn check_edge(&self, i: u32) -> GraphResult<()> {
        if !self.edge_active(i) {
            return Err(GraphError::out_of_range("edge", i as u64, self.edge_capacity() as u64));
        }
        Ok(())
    }

    fn grow_node_capacity(&mut self, needed: u32) {
        if needed <= self.node_index.capacity() {
            return;
        }
        let new_cap = grow(needed, self.node_index.capacity());
        self.node_index.resize(new_cap);
        self.nodes.resize(new_cap as usize, NodeRecord::default());
        self.node_active.grow(new_cap as usize);
        self.node_attrs.ensure_capacity_all(new_cap);
        self.node_cache.mark_all_dirty();
    }

    fn grow_edge_capacity(&mut self, needed: u32) {
        if needed <= self.edge_index.capacity() {
            return;
        }
        let new_cap = grow(needed, self.edge_index.capacity());
        self.edge_index.resize(new_cap);
        self.edges.resize(new_cap as usize, EdgeRecord::default());
        self.edge_active.grow(new_cap as usize);
        self.edge_attrs.ensure_capacity_all(new_cap);
        self.edge_cache.mark_all_dirty();
    }

    /// Allocates `k` fresh/recycled node indices in allocation order (spec
    /// §5 ordering guarantee), zero-fills every node attribute row for
    /// them, and bumps the node topology version and every node attribute's
    /// version. Fails atomically: any indices allocated so far in this call
    /// are rolled back before the error surfaces (spec §7 policy).
    pub fn add_nodes(&mut self, k: u32) -> GraphResult<Vec<u32>> {
        if k == 0 {
            return Err(GraphError::invalid_argument("add_nodes(0) is not allowed"));
        }
        self.grow_node_capacity(self.node_index.next_index().saturating_add(k).max(
            self.node_index.live_count() + k,
        ));
        let mut out = Vec::with_capacity(k as usize);
        for _ in 0..k {
            match self.node_index.acquire() {
                Some(i) => {
                    self.node_active.insert(i as usize);
                    self.node_attrs.clear_slot_all(i);
                    self.nodes[i as usize] = NodeRecord::default();
                    out.push(i);
                }
                None => {
                    for i in out {
                        self.node_active.set(i as usize, false);
                        self.node_index.release(i);
                    }
                    return Err(GraphError::OutOfMemory);
                }
            }
        }
        self.node_topology_version += 1;
        self.node_attrs.bump_all_versions();
        self.node_cache.mark_all_dirty();
        Ok(out)
    }

    /// Detaches every incident edge, deactivates, and frees the slot for
    /// each live index given (spec §4.5).
    pub fn remove_nodes(&mut self, indices: &[u32]) -> GraphResult<()> {
        let mut doomed_edges: HashSet<u32> = HashSet::new();
        for &n in indices {
            if !self.node_active(n) {
                continue;
            }
            for &(_, e) in self.nodes[n as usize].out.iterate().iter() {
                doomed_edges.insert(e);
            }
            for &(_, e) in self.nodes[n as usize].inn.iterate().iter() {
                doomed_edges.insert(e);
            }
        }
        if !doomed_edges.is_empty() {
            let edge_list: Vec<u32> = doomed_edges.into_iter().collect();
            self.remove_edges(&edge_list)?;
        }
        for &n in indices {
            if !self.node_active(n) {
                continue;
            }
            self.node_active.set(n as usize, false);
            self.nodes[n as usize] = NodeRecord::default();
            self.node_attrs.clear_slot_all(n);
            self.node_index.release(n);
        }
        self.node_topology_version += 1;
        self.node_cache.mark_all_dirty();
        Ok(())
    }

    /// Inserts edges symmetrically per the directedness rule (spec §3
    /// invariant 2, §4.5). Fails atomically if any endpoint is invalid.
    pub fn add_edges(&mut self, pairs: &[(u32, u32)]) -> GraphResult<Vec<u32>> {
        if pairs.is_empty() {
            return Err(GraphError::invalid_argument("add_edges([]) is not allowed"));
        }
        for &(u, v) in pairs {
            if !self.node_active(u) || !self.node_active(v) {
                return Err(GraphError::invalid_argument(
                    "add_edges: endpoint is not an active node",
                ));
            }
        }
        self.grow_edge_capacity(self.edge_index.live_count() + pairs.len() as u32);
        let mut out = Vec::with_capacity(pairs.len());
        for &(u, v) in pairs {
            let e = match self.edge_index.acquire() {
                Some(e) => e,
                None => {
                    for e in out {
                        self.retract_edge_allocation(e);
                    }
                    return Err(GraphError::OutOfMemory);
                }
            };
            self.edge_active.insert(e as usize);
            self.edges[e as usize] = EdgeRecord { from: u, to: v };
            self.edge_attrs.clear_slot_all(e);
            self.attach_edge(e, u, v);
            out.push(e);
        }
        self.edge_topology_version += 1;
        self.edge_attrs.bump_all_versions();
        self.edge_cache.mark_all_dirty();
        self.node_cache.mark_all_dirty();
        Ok(out)
    }

    fn attach_edge(&mut self, e: u32, u: u32, v: u32) {
        self.nodes[u as usize].out.add(v, e);
        self.nodes[v as usize].inn.add(u, e);
        if !self.directed {
            self.nodes[v as usize].out.add(u, e);
            self.nodes[u as usize].inn.add(v, e);
        }
    }

    fn retract_edge_allocation(&mut self, e: u32) {
        let EdgeRecord { from, to } = self.edges[e as usize];
        self.detach_edge(e, from, to);
        self.edge_active.set(e as usize, false);
        self.edge_index.release(e);
    }

    fn detach_edge(&mut self, e: u32, u: u32, v: u32) {
        let doomed: HashbrownHashSet<u32> = [e].into_iter().collect();
        self.nodes[u as usize].out.remove_edges(&doomed);
        self.nodes[v as usize].inn.remove_edges(&doomed);
        if !self.directed {
            self.nodes[v as usize].out.remove_edges(&doomed);
            self.nodes[u as usize].inn.remove_edges(&doomed);
        }
    }

    /// Detaches each edge from both endpoints' containers, deactivates,
    /// and releases the index (spec §4.5 "Detaching an edge").
    pub fn remove_edges(&mut self, indices: &[u32]) -> GraphResult<()> {
        for &e in indices {
            if !self.edge_active(e) {
                continue;
            }
            let EdgeRecord { from, to } = self.edges[e as usize];
            self.detach_edge(e, from, to);
            self.edge_active.set(e as usize, false);
            self.edges[e as usize] = EdgeRecord::default();
            self.edge_attrs.clear_slot_all(e);
            self.edge_index.release(e);
        }
        self.edge_topology_version += 1;
        self.edge_cache.mark_all_dirty();
        self.node_cache.mark_all_dirty();
        Ok(())
    }

    pub fn out_neighbors(&self, n: u32) -> GraphResult<Vec<(u32, u32)>> {
        self.check_node(n)?;
        Ok(self.nodes[n as usize].out.iterate())
    }

    pub fn in_neighbors(&self, n: u32) -> GraphResult<Vec<(u32, u32)>> {
        self.check_node(n)?;
        Ok(self.nodes[n as usize].inn.iterate())
    }

    pub fn out_degree(&self, n: u32) -> GraphResult<usize> {
        self.check_node(n)?;
        Ok(self.nodes[n as usize].out.count())
    }

    pub fn in_degree(&self, n: u32) -> GraphResult<usize> {
        self.check_node(n)?;
        Ok(self.nodes[n as usize].inn.count())
    }

    // ---- attribute CRUD --------------------------------------------------

    fn scope_capacity(&self, scope: Scope) -> u32 {
        match scope {
            Scope::Node => self.node_capacity(),
            Scope::Edge => self.edge_capacity(),
            Scope::Graph => 1,
        }
    }

    fn attrs_mut(&mut self, scope: Scope) -> &mut AttributeTable {
        match scope {
            Scope::Node => &mut self.node_attrs,
            Scope::Edge => &mut self.edge_attrs,
            Scope::Graph => &mut self.graph_attrs,
        }
    }

    fn attrs(&self, scope: Scope) -> &AttributeTable {
        match scope {
            Scope::Node => &self.node_attrs,
            Scope::Edge => &self.edge_attrs,
            Scope::Graph => &self.graph_attrs,
        }
    }

    pub fn define_attribute(
        &mut self,
        scope: Scope,
        name: &str,
        base_type: BaseType,
        dimension: u32,
    ) -> GraphResult<()> {
        let cap = self.scope_capacity(scope);
        let attr = Attribute::new(name, scope, base_type, dimension, cap)?;
        self.attrs_mut(scope).define(attr)
    }

    pub fn remove_attribute(&mut self, scope: Scope, name: &str) -> GraphResult<()> {
        self.attrs_mut(scope).remove(name)?;
        match scope {
            Scope::Node => self.node_cache.remove_attr(name),
            Scope::Edge => self.edge_cache.remove_attr(name),
            Scope::Graph => {}
        }
        Ok(())
    }

    pub fn attribute_names(&self, scope: Scope) -> Vec<String> {
        self.attrs(scope).names().map(str::to_string).collect()
    }

    pub fn get_attribute(&self, scope: Scope, name: &str) -> GraphResult<&Attribute> {
        self.attrs(scope).get(name)
    }

    pub fn get_attribute_mut(&mut self, scope: Scope, name: &str) -> GraphResult<&mut Attribute> {
        self.attrs_mut(scope).get_mut(name)
    }

    /// `get_buffer`: a live view into graph memory (spec §6). Mutating the
    /// returned buffer does not bump the attribute's version; callers must
    /// call `bump_attribute_version` explicitly.
    pub fn get_buffer(&self, scope: Scope, name: &str) -> GraphResult<&AttrBuffer> {
        Ok(&self.attrs(scope).get(name)?.buffer)
    }

    pub fn get_buffer_mut(&mut self, scope: Scope, name: &str) -> GraphResult<&mut AttrBuffer> {
        Ok(&mut self.attrs_mut(scope).get_mut(name)?.buffer)
    }

    pub fn bump_attribute_version(&mut self, scope: Scope, name: &str) -> GraphResult<()> {
        self.attrs_mut(scope).get_mut(name)?.bump_version();
        match scope {
            Scope::Node => self.node_cache.mark_all_dirty(),
            Scope::Edge => self.edge_cache.mark_all_dirty(),
            Scope::Graph => {}
        }
        Ok(())
    }

    pub fn get_value_f64(&self, scope: Scope, name: &str, slot: u32, component: u32) -> GraphResult<f64> {
        let attr = self.attrs(scope).get(name)?;
        if component >= attr.dimension {
            return Err(GraphError::out_of_range("component", component as u64, attr.dimension as u64));
        }
        attr.buffer.as_f64_scalar(slot, attr.dimension, component)
    }

    pub fn set_value_f64(
        &mut self,
        scope: Scope,
        name: &str,
        slot: u32,
        component: u32,
        value: f64,
    ) -> GraphResult<()> {
        let attr = self.attrs_mut(scope).get_mut(name)?;
        if component >= attr.dimension {
            return Err(GraphError::out_of_range("component", component as u64, attr.dimension as u64));
        }
        let idx = slot as usize * attr.dimension as usize + component as usize;
        match &mut attr.buffer {
            AttrBuffer::F32(v) => v[idx] = value as f32,
            AttrBuffer::F64(v) => v[idx] = value,
            AttrBuffer::I32(v) => v[idx] = value as i32,
            AttrBuffer::U32(v) => v[idx] = value as u32,
            AttrBuffer::I64(v) => v[idx] = value as i64,
            AttrBuffer::U64(v) => v[idx] = value as u64,
            AttrBuffer::Bool(v) => v[idx] = (value != 0.0) as u8,
            _ => return Err(GraphError::wrong_type(format!("attribute '{name}' is not numeric"))),
        }
        attr.bump_version();
        match scope {
            Scope::Node => self.node_cache.mark_all_dirty(),
            Scope::Edge => self.edge_cache.mark_all_dirty(),
            Scope::Graph => {}
        }
        Ok(())
    }

    pub fn get_value_string(&self, scope: Scope, name: &str, slot: u32) -> GraphResult<Option<String>> {
        let attr = self.attrs(scope).get(name)?;
        match &attr.buffer {
            AttrBuffer::String(v) => Ok(v[slot as usize].as_ref().map(|s| s.to_string())),
            _ => Err(GraphError::wrong_type(format!("attribute '{name}' is not a string"))),
        }
    }

    pub fn set_value_string(
        &mut self,
        scope: Scope,
        name: &str,
        slot: u32,
        value: Option<&str>,
    ) -> GraphResult<()> {
        let attr = self.attrs_mut(scope).get_mut(name)?;
        match &mut attr.buffer {
            AttrBuffer::String(v) => {
                v[slot as usize] = value.map(|s| s.into());
            }
            _ => return Err(GraphError::wrong_type(format!("attribute '{name}' is not a string"))),
        }
        attr.bump_version();
        Ok(())
    }

    // ---- derived buffers ---------------------------------------------

    pub fn set_dense_order(&mut self, scope: Scope, order: Option<Vec<u32>>) {
        match scope {
            Scope::Node => self.node_cache.set_dense_order(order),
            Scope::Edge => self.edge_cache.set_dense_order(order),
            Scope::Graph => {}
        }
    }

    /// Repacks (lazily) and returns the packed active-slot values of `name`
    /// as raw little-endian bytes, row-major.
    pub fn packed_buffer(&mut self, scope: Scope, name: &str) -> GraphResult<&DerivedBuffer> {
        let attr = self.attrs(scope).get(name)?;
        let source_version = attr.version;
        let dimension = attr.dimension;
        let elem_size = attr.base_type.element_size().ok_or_else(|| {
            GraphError::not_supported(format!("attribute '{name}' does not support packed byte views"))
        })?;
        let raw = raw_bytes_of(&attr.buffer, dimension)?;
        let row_bytes = elem_size * dimension as usize;

        let active = match scope {
            Scope::Node => &self.node_active,
            Scope::Edge => &self.edge_active,
            Scope::Graph => &self.node_active, // unused: graph scope is always capacity 1
        };
        let cache = match scope {
            Scope::Node => &mut self.node_cache,
            Scope::Edge => &mut self.edge_cache,
            Scope::Graph => &mut self.node_cache,
        };
        let order = cache.dense_order.clone();
        let key = (name.to_string(), DerivedKind::Packed);
        let buf = cache.buffers.entry(key).or_default();
        buf.repack_with(source_version, || {
            let (data, count, vs, ve) = pack_rows(&raw, row_bytes, active, order.as_deref());
            (data, row_bytes as u32, count, vs, ve)
        });
        Ok(buf)
    }

    /// Repacks (lazily) and returns a color-encoded buffer for an i32/u32
    /// scalar attribute, or the slot index itself when `name == "$index"`.
    pub fn color_buffer(&mut self, scope: Scope, name: &str, mode: ColorMode) -> GraphResult<&DerivedBuffer> {
        let (source_version, values): (u64, Vec<i64>) = if name == "$index" {
            let topo_version = match scope {
                Scope::Node => self.node_topology_version,
                Scope::Edge => self.edge_topology_version,
                Scope::Graph => 1,
            };
            let active = match scope {
                Scope::Node => &self.node_active,
                Scope::Edge => &self.edge_active,
                Scope::Graph => &self.node_active,
            };
            let order = match scope {
                Scope::Node => self.node_cache.dense_order.clone(),
                Scope::Edge => self.edge_cache.dense_order.clone(),
                Scope::Graph => None,
            };
            let vals = ordered_active_indices(active, order.as_deref())
                .into_iter()
                .map(i64::from)
                .collect();
            (topo_version, vals)
        } else {
            let attr = self.attrs(scope).get(name)?;
            if !matches!(attr.base_type, BaseType::I32 | BaseType::U32) {
                return Err(GraphError::wrong_type(format!(
                    "attribute '{name}' must be i32 or u32 for color encoding"
                )));
            }
            let source_version = attr.version;
            let active = match scope {
                Scope::Node => &self.node_active,
                Scope::Edge => &self.edge_active,
                Scope::Graph => &self.node_active,
            };
            let order = match scope {
                Scope::Node => self.node_cache.dense_order.clone(),
                Scope::Edge => self.edge_cache.dense_order.clone(),
                Scope::Graph => None,
            };
            let indices = ordered_active_indices(active, order.as_deref());
            let vals = indices
                .into_iter()
                .map(|idx| match &attr.buffer {
                    AttrBuffer::I32(v) => v[idx as usize] as i64,
                    AttrBuffer::U32(v) => v[idx as usize] as i64,
                    _ => unreachable!(),
                })
                .collect();
            (source_version, vals)
        };

        let kind = match mode {
            ColorMode::U8x4 => DerivedKind::ColorU8,
            ColorMode::U32x4 => DerivedKind::ColorU32,
        };
        let cache = match scope {
            Scope::Node => &mut self.node_cache,
            Scope::Edge => &mut self.edge_cache,
            Scope::Graph => &mut self.node_cache,
        };
        let key = (name.to_string(), kind);
        let buf = cache.buffers.entry(key).or_default();
        let count = values.len() as u32;
        buf.repack_with(source_version, || {
            let data = encode_color(&values, mode);
            let stride = if mode == ColorMode::U8x4 { 4 } else { 16 };
            (data, stride, count, 0, count)
        });
        Ok(buf)
    }

    /// Rebuilds a graph from flat snapshot state captured by a binary codec
    /// reader, preserving exact node/edge indices including holes left by
    /// prior removals (spec §4.7.2 binary round-trip contract). Attribute
    /// tables and derived caches start empty; callers populate attributes
    /// afterwards via [`Graph::define_attribute`]/[`Graph::set_value_f64`].
    pub fn from_snapshot(
        directed: bool,
        node_capacity: u32,
        node_active_bits: &[bool],
        edge_capacity: u32,
        edge_pairs: &[Option<(u32, u32)>],
    ) -> GraphResult<Graph> {
        let mut g = Graph::new(directed, node_capacity, edge_capacity);

        for (i, &active) in node_active_bits.iter().enumerate() {
            if active {
                g.node_active.insert(i);
            }
        }
        let next_node = node_active_bits.len() as u32;
        let node_free: Vec<u32> =
            (0..next_node).rev().filter(|&i| !node_active_bits[i as usize]).collect();
        g.node_index = IndexManager::from_parts(next_node, node_capacity, node_free);

        for (e, pair) in edge_pairs.iter().enumerate() {
            if let Some((u, v)) = pair {
                g.edge_active.insert(e);
                g.edges[e] = EdgeRecord { from: *u, to: *v };
                g.attach_edge(e as u32, *u, *v);
            }
        }
        let next_edge = edge_pairs.len() as u32;
        let edge_free: Vec<u32> =
            (0..next_edge).rev().filter(|&i| edge_pairs[i as usize].is_none()).collect();
        g.edge_index = IndexManager::from_parts(next_edge, edge_capacity, edge_free);

        Ok(g)
    }

    // ---- compaction ------------------------------------------------------

    /// Returns an equivalent graph with indices renumbered `0..count-1` in
    /// ascending order of original index (spec §4.5 `compact`).
    pub fn compact(
        &self,
        node_original_id_attr: Option<&str>,
        edge_original_id_attr: Option<&str>,
    ) -> GraphResult<Graph> {
        let live_nodes: Vec<u32> = self.node_active.ones().map(|x| x as u32).collect();
        let live_edges: Vec<u32> = self.edge_active.ones().map(|x| x as u32).collect();

        let mut remap = vec![INVALID_INDEX; self.node_capacity() as usize];
        for (new, &old) in live_nodes.iter().enumerate() {
            remap[old as usize] = new as u32;
        }

        let mut out = Graph::new(self.directed, live_nodes.len() as u32, live_edges.len() as u32);
        if !live_nodes.is_empty() {
            out.add_nodes(live_nodes.len() as u32)?;
        }

        for attr in self.node_attrs.order.values() {
            out.define_attribute(Scope::Node, &attr.name, attr.base_type, attr.dimension)?;
            copy_attribute_rows(attr, out.node_attrs.get_mut(&attr.name)?, &live_nodes, &|i| i);
        }
        if let Some(name) = node_original_id_attr {
            out.define_attribute(Scope::Node, name, BaseType::U32, 1)?;
            for (new, &old) in live_nodes.iter().enumerate() {
                out.set_value_f64(Scope::Node, name, new as u32, 0, old as f64)?;
            }
        }

        if !live_edges.is_empty() {
            let pairs: Vec<(u32, u32)> = live_edges
                .iter()
                .map(|&e| {
                    let (u, v) = self.edge_endpoints(e).unwrap();
                    (remap[u as usize], remap[v as usize])
                })
                .collect();
            out.add_edges(&pairs)?;
        }

        for attr in self.edge_attrs.order.values() {
            out.define_attribute(Scope::Edge, &attr.name, attr.base_type, attr.dimension)?;
            copy_attribute_rows(attr, out.edge_attrs.get_mut(&attr.name)?, &live_edges, &|i| i);
        }
        if let Some(name) = edge_original_id_attr {
            out.define_attribute(Scope::Edge, name, BaseType::U32, 1)?;
            for (new, &old) in live_edges.iter().enumerate() {
                out.set_value_f64(Scope::Edge, name, new as u32, 0, old as f64)?;
            }
        }

        for attr in self.graph_attrs.order.values() {
            out.define_attribute(Scope::Graph, &attr.name, attr.base_type, attr.dimension)?;
            copy_attribute_rows(attr, out.graph_attrs.get_mut(&attr.name)?, &[0], &|_| 0);
        }

        Ok(out)
    }
}

fn ordered_active_indices(active: &FixedBitSet, order: Option<&[u32]>) -> Vec<u32> {
    match order {
        Some(order) => order.iter().copied().filter(|&i| active.contains(i as usize)).collect(),
        None => active.ones().map(|x| x as u32).collect(),
    }
}

fn raw_bytes_of(buffer: &AttrBuffer, _dimension: u32) -> GraphResult<Vec<u8>> {
    Ok(match buffer {
        AttrBuffer::Bool(v) => v.clone(),
        AttrBuffer::F32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::F64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::I32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::U32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::I64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::U64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::Category { codes, .. } => codes.iter().flat_map(|x| x.to_le_bytes()).collect(),
        _ => return Err(GraphError::not_supported("attribute type has no flat byte view")),
    })
}

fn copy_attribute_rows(
    src: &Attribute,
    dst: &mut Attribute,
    live: &[u32],
    _identity: &dyn Fn(u32) -> u32,
) {
    macro_rules! copy_scalar {
        ($variant:ident) => {
            if let (AttrBuffer::$variant(s), AttrBuffer::$variant(d)) = (&src.buffer, &mut dst.buffer) {
                let dim = src.dimension as usize;
                for (new, &old) in live.iter().enumerate() {
                    let os = old as usize * dim;
                    let ds = new * dim;
                    d[ds..ds + dim].clone_from_slice(&s[os..os + dim]);
                }
            }
        };
    }
    copy_scalar!(Bool);
    copy_scalar!(F32);
    copy_scalar!(F64);
    copy_scalar!(I32);
    copy_scalar!(U32);
    copy_scalar!(I64);
    copy_scalar!(U64);
    copy_scalar!(String);
    if let (AttrBuffer::Category { codes: sc, dict: sd }, AttrBuffer::Category { codes: dc, dict: dd }) =
        (&src.buffer, &mut dst.buffer)
    {
        *dd = sd.clone();
        for (new, &old) in live.iter().enumerate() {
            dc[new] = sc[old as usize];
        }
    }
    if let (AttrBuffer::MultiCategory(s), AttrBuffer::MultiCategory(d)) = (&src.buffer, &mut dst.buffer) {
        for (new, &old) in live.iter().enumerate() {
            let (ids, weights) = s.row(old);
            let _ = d.set_entry(new as u32, ids, weights);
        }
    }
    dst.version = src.version;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_directed_graph_scenario() {
        // spec §8 concrete scenario 1
        let mut g = Graph::new(true, 0, 0);
        let nodes = g.add_nodes(3).unwrap();
        assert_eq!(nodes, vec![0, 1, 2]);
        let edges = g.add_edges(&[(0, 1), (1, 2)]).unwrap();
        assert_eq!(edges, vec![0, 1]);
        assert_eq!(g.out_degree(0).unwrap(), 1);
        g.remove_edges(&[0]).unwrap();
        assert_eq!(g.edge_count(), 1);
        g.remove_nodes(&[1]).unwrap();
        assert!(!g.node_active(1));
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn lifo_index_reuse_boundary_behaviour() {
        let mut g = Graph::new(true, 0, 0);
        let first = g.add_nodes(1).unwrap()[0];
        g.remove_nodes(&[first]).unwrap();
        let second = g.add_nodes(1).unwrap()[0];
        assert_eq!(first, second);
    }

    #[test]
    fn undirected_edge_appears_in_both_directions() {
        let mut g = Graph::new(false, 0, 0);
        g.add_nodes(2).unwrap();
        g.add_edges(&[(0, 1)]).unwrap();
        assert_eq!(g.out_degree(0).unwrap(), 1);
        assert_eq!(g.in_degree(0).unwrap(), 1);
        assert_eq!(g.out_degree(1).unwrap(), 1);
        assert_eq!(g.in_degree(1).unwrap(), 1);
    }

    #[test]
    fn add_edges_fails_atomically_on_bad_endpoint() {
        let mut g = Graph::new(true, 0, 0);
        g.add_nodes(1).unwrap();
        let before = g.edge_count();
        let err = g.add_edges(&[(0, 0), (0, 99)]);
        assert!(err.is_err());
        assert_eq!(g.edge_count(), before);
    }

    #[test]
    fn attribute_round_trip_value() {
        let mut g = Graph::new(true, 0, 0);
        g.add_nodes(2).unwrap();
        g.define_attribute(Scope::Node, "weight", BaseType::F64, 1).unwrap();
        g.set_value_f64(Scope::Node, "weight", 0, 0, 3.14).unwrap();
        g.set_value_f64(Scope::Node, "weight", 1, 0, 2.71).unwrap();
        assert_eq!(g.get_value_f64(Scope::Node, "weight", 0, 0).unwrap(), 3.14);
        assert_eq!(g.get_value_f64(Scope::Node, "weight", 1, 0).unwrap(), 2.71);
    }

    #[test]
    fn compact_removes_holes_and_renumbers_ascending() {
        let mut g = Graph::new(true, 0, 0);
        g.add_nodes(4).unwrap();
        g.remove_nodes(&[1]).unwrap();
        g.add_edges(&[(0, 2), (2, 3)]).unwrap();
        let compacted = g.compact(Some("_original_ids_"), None).unwrap();
        assert_eq!(compacted.node_count(), 3);
        assert_eq!(compacted.get_value_f64(Scope::Node, "_original_ids_", 0, 0).unwrap(), 0.0);
        assert_eq!(compacted.get_value_f64(Scope::Node, "_original_ids_", 1, 0).unwrap(), 2.0);
        assert_eq!(compacted.get_value_f64(Scope::Node, "_original_ids_", 2, 0).unwrap(), 3.0);
    }
}
