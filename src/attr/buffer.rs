//! The tagged-sum attribute buffer (spec §9 design note).

use super::category::CategoryDict;
use super::multi_category::MultiCategoryStore;
use super::BaseType;
use crate::error::{GraphError, GraphResult};

#[derive(Debug, Clone)]
pub enum AttrBuffer {
    Bool(Vec<u8>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    /// `capacity * dimension` owned, optional strings. Strings never
    /// vectorise in the external formats but may store dimension > 1
    /// internally (spec §3).
    String(Vec<Option<Box<str>>>),
    Category { codes: Vec<i32>, dict: CategoryDict },
    MultiCategory(MultiCategoryStore),
    /// Opaque host pointers/blobs. Never serialised.
    OpaqueData(Vec<Option<Box<[u8]>>>),
    /// Shadow storage mirroring host-runtime objects. Never serialised.
    HostShadow(Vec<Option<Box<[u8]>>>),
}

impl AttrBuffer {
    pub fn new(base_type: BaseType, dimension: u32, capacity: u32) -> GraphResult<Self> {
        let n = (capacity as usize) * (dimension as usize);
        Ok(match base_type {
            BaseType::Bool => AttrBuffer::Bool(vec![0; n]),
            BaseType::F32 => AttrBuffer::F32(vec![0.0; n]),
            BaseType::F64 => AttrBuffer::F64(vec![0.0; n]),
            BaseType::I32 => AttrBuffer::I32(vec![0; n]),
            BaseType::U32 => AttrBuffer::U32(vec![0; n]),
            BaseType::I64 => AttrBuffer::I64(vec![0; n]),
            BaseType::U64 => AttrBuffer::U64(vec![0; n]),
            BaseType::String => AttrBuffer::String(vec![None; n]),
            BaseType::Category => AttrBuffer::Category {
                codes: vec![-1; capacity as usize],
                dict: CategoryDict::new(),
            },
            BaseType::MultiCategory => AttrBuffer::MultiCategory(MultiCategoryStore::new(capacity)),
            BaseType::OpaqueData => AttrBuffer::OpaqueData(vec![None; capacity as usize]),
            BaseType::HostShadow => AttrBuffer::HostShadow(vec![None; capacity as usize]),
        })
    }

    pub fn base_type(&self) -> BaseType {
        match self {
            AttrBuffer::Bool(_) => BaseType::Bool,
            AttrBuffer::F32(_) => BaseType::F32,
            AttrBuffer::F64(_) => BaseType::F64,
            AttrBuffer::I32(_) => BaseType::I32,
            AttrBuffer::U32(_) => BaseType::U32,
            AttrBuffer::I64(_) => BaseType::I64,
            AttrBuffer::U64(_) => BaseType::U64,
            AttrBuffer::String(_) => BaseType::String,
            AttrBuffer::Category { .. } => BaseType::Category,
            AttrBuffer::MultiCategory(_) => BaseType::MultiCategory,
            AttrBuffer::OpaqueData(_) => BaseType::OpaqueData,
            AttrBuffer::HostShadow(_) => BaseType::HostShadow,
        }
    }

    /// Grows scalar/vector buffers from `old_cap` to `new_cap` slots of
    /// `dimension` elements each, zero-filling the new region.
    pub fn grow(&mut self, old_cap: u32, new_cap: u32, dimension: u32) {
        let old_n = old_cap as usize * dimension as usize;
        let new_n = new_cap as usize * dimension as usize;
        macro_rules! grow_scalar {
            ($v:expr, $fill:expr) => {{
                $v.resize(new_n, $fill);
                let _ = old_n;
            }};
        }
        match self {
            AttrBuffer::Bool(v) => grow_scalar!(v, 0u8),
            AttrBuffer::F32(v) => grow_scalar!(v, 0.0f32),
            AttrBuffer::F64(v) => grow_scalar!(v, 0.0f64),
            AttrBuffer::I32(v) => grow_scalar!(v, 0i32),
            AttrBuffer::U32(v) => grow_scalar!(v, 0u32),
            AttrBuffer::I64(v) => grow_scalar!(v, 0i64),
            AttrBuffer::U64(v) => grow_scalar!(v, 0u64),
            AttrBuffer::String(v) => grow_scalar!(v, None),
            AttrBuffer::Category { codes, .. } => codes.resize(new_cap as usize, -1),
            AttrBuffer::MultiCategory(store) => store.grow(new_cap),
            AttrBuffer::OpaqueData(v) | AttrBuffer::HostShadow(v) => {
                v.resize(new_cap as usize, None)
            }
        }
    }

    pub fn clear_slot(&mut self, i: u32, dimension: u32) {
        let i = i as usize;
        let d = dimension as usize;
        match self {
            AttrBuffer::Bool(v) => v[i * d..(i + 1) * d].fill(0),
            AttrBuffer::F32(v) => v[i * d..(i + 1) * d].fill(0.0),
            AttrBuffer::F64(v) => v[i * d..(i + 1) * d].fill(0.0),
            AttrBuffer::I32(v) => v[i * d..(i + 1) * d].fill(0),
            AttrBuffer::U32(v) => v[i * d..(i + 1) * d].fill(0),
            AttrBuffer::I64(v) => v[i * d..(i + 1) * d].fill(0),
            AttrBuffer::U64(v) => v[i * d..(i + 1) * d].fill(0),
            AttrBuffer::String(v) => {
                for s in &mut v[i * d..(i + 1) * d] {
                    *s = None;
                }
            }
            AttrBuffer::Category { codes, .. } => codes[i] = -1,
            AttrBuffer::MultiCategory(store) => store.clear_row(i as u32),
            AttrBuffer::OpaqueData(v) | AttrBuffer::HostShadow(v) => v[i] = None,
        }
    }

    pub fn as_f64_scalar(&self, slot: u32, dim: u32, component: u32) -> GraphResult<f64> {
        let idx = slot as usize * dim as usize + component as usize;
        Ok(match self {
            AttrBuffer::F32(v) => v[idx] as f64,
            AttrBuffer::F64(v) => v[idx],
            AttrBuffer::I32(v) => v[idx] as f64,
            AttrBuffer::U32(v) => v[idx] as f64,
            AttrBuffer::I64(v) => v[idx] as f64,
            AttrBuffer::U64(v) => v[idx] as f64,
            AttrBuffer::Bool(v) => v[idx] as f64,
            AttrBuffer::Category { codes, .. } => codes[slot as usize] as f64,
            _ => return Err(GraphError::wrong_type("attribute is not numeric")),
        })
    }

    pub fn dimension_len(&self, capacity: u32) -> usize {
        match self {
            AttrBuffer::Bool(v) => v.len() / capacity.max(1) as usize,
            AttrBuffer::F32(v) => v.len() / capacity.max(1) as usize,
            AttrBuffer::F64(v) => v.len() / capacity.max(1) as usize,
            AttrBuffer::I32(v) => v.len() / capacity.max(1) as usize,
            AttrBuffer::U32(v) => v.len() / capacity.max(1) as usize,
            AttrBuffer::I64(v) => v.len() / capacity.max(1) as usize,
            AttrBuffer::U64(v) => v.len() / capacity.max(1) as usize,
            AttrBuffer::String(v) => v.len() / capacity.max(1) as usize,
            _ => 1,
        }
    }
}
