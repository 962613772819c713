//! Attribute Store (spec §4.3, component C3).
//!
//! A graph attribute is a named, scope-tagged, typed buffer. This module
//! models the buffer as a tagged sum rather than an untagged union (spec §9
//! design note), the same shape the teacher reaches for when it needs a
//! heterogeneous payload keyed by a small closed set of variants
//! (`EdgeDirection`, `Directed`/`Undirected` marker enums in `lib.rs`),
//! scaled up to carry real per-variant storage.

pub mod buffer;
pub mod category;
pub mod multi_category;

pub use buffer::AttrBuffer;
pub use category::{CategoryDict, SortPolicy, MISSING_ID};
pub use multi_category::MultiCategoryStore;

use crate::error::{GraphError, GraphResult};

/// The three scopes an attribute may be bound to (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Node,
    Edge,
    Graph,
}

/// Base element type of an attribute (spec §3). `OpaqueData` and
/// `HostShadow` are never serialised by any codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    String,
    Bool,
    F32,
    F64,
    I32,
    U32,
    I64,
    U64,
    Category,
    MultiCategory,
    OpaqueData,
    HostShadow,
}

impl BaseType {
    pub fn is_serializable(self) -> bool {
        !matches!(self, BaseType::OpaqueData | BaseType::HostShadow)
    }

    pub fn element_size(self) -> Option<usize> {
        match self {
            BaseType::Bool => Some(1),
            BaseType::F32 | BaseType::I32 | BaseType::U32 | BaseType::Category => Some(4),
            BaseType::F64 | BaseType::I64 | BaseType::U64 => Some(8),
            BaseType::String | BaseType::MultiCategory | BaseType::OpaqueData
            | BaseType::HostShadow => None,
        }
    }
}

/// Version counter saturation point: wraps at 2^53-1 back to 1 (spec §3),
/// the JS-safe-integer boundary the original format chose so a version can
/// round-trip through a double without loss.
const VERSION_WRAP: u64 = (1u64 << 53) - 1;

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub scope: Scope,
    pub base_type: BaseType,
    pub dimension: u32,
    pub capacity: u32,
    pub version: u64,
    pub buffer: AttrBuffer,
}

impl Attribute {
    pub fn new(
        name: impl Into<String>,
        scope: Scope,
        base_type: BaseType,
        dimension: u32,
        capacity: u32,
    ) -> GraphResult<Self> {
        if dimension == 0 {
            return Err(GraphError::invalid_argument("attribute dimension must be >= 1"));
        }
        if base_type == BaseType::String && dimension != 1 {
            // strings may store dimension > 1 internally per spec §3, but
            // attribute creation through the public API always starts
            // scalar; internal dimension bumps happen via `set_dimension`.
        }
        let buffer = AttrBuffer::new(base_type, dimension, capacity)?;
        Ok(Attribute {
            name: name.into(),
            scope,
            base_type,
            dimension,
            capacity,
            version: 1,
            buffer,
        })
    }

    /// Grows the backing storage to at least `n`. Never shrinks. New region
    /// is zero-filled (spec §3 invariant 4).
    pub fn ensure_capacity(&mut self, n: u32) {
        if n <= self.capacity {
            return;
        }
        self.buffer.grow(self.capacity, n, self.dimension);
        self.capacity = n;
    }

    pub fn clear_slot(&mut self, i: u32) {
        self.buffer.clear_slot(i, self.dimension);
    }

    pub fn bump_version(&mut self) {
        self.version = if self.version >= VERSION_WRAP {
            1
        } else {
            self.version + 1
        };
    }

    pub fn set_multi_category_entry(
        &mut self,
        i: u32,
        ids: &[i32],
        weights: Option<&[f32]>,
    ) -> GraphResult<()> {
        let AttrBuffer::MultiCategory(store) = &mut self.buffer else {
            return Err(GraphError::wrong_type(format!(
                "attribute {} is not multi_category",
                self.name
            )));
        };
        store.set_entry(i, ids, weights)?;
        self.bump_version();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_wraps_at_boundary() {
        let mut a = Attribute::new("x", Scope::Node, BaseType::I32, 1, 1).unwrap();
        a.version = VERSION_WRAP;
        a.bump_version();
        assert_eq!(a.version, 1);
    }

    #[test]
    fn ensure_capacity_zero_fills() {
        let mut a = Attribute::new("x", Scope::Node, BaseType::I32, 1, 1).unwrap();
        if let AttrBuffer::I32(v) = &mut a.buffer {
            v[0] = 42;
        }
        a.ensure_capacity(4);
        if let AttrBuffer::I32(v) = &a.buffer {
            assert_eq!(v, &[42, 0, 0, 0]);
        }
    }
}
