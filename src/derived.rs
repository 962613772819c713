//! Derived Buffer Cache (spec §4.4, component C4).
//!
//! Two kinds of derived views over a primary attribute: a packed dense
//! value buffer (active slots only, natural or caller-supplied order) and a
//! color-encoded buffer (an i32/u32 scalar, or the slot index itself,
//! packed little-endian as u8x4 or u32x4). Both share the same
//! `(version, source_version, dirty)` bookkeeping (spec §9 design note
//! "versioned derived caches"); we model that bookkeeping once here and let
//! the two producers differ only in how they fill `data`.

use fixedbitset::FixedBitSet;

const VERSION_WRAP: u64 = (1u64 << 53) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    U8x4,
    U32x4,
}

#[derive(Debug, Clone)]
pub struct DerivedBuffer {
    pub data: Vec<u8>,
    pub count: u32,
    pub stride: u32,
    pub valid_start: u32,
    pub valid_end: u32,
    pub version: u64,
    pub source_version: u64,
    pub dirty: bool,
}

impl Default for DerivedBuffer {
    fn default() -> Self {
        DerivedBuffer {
            data: Vec::new(),
            count: 0,
            stride: 0,
            valid_start: 0,
            valid_end: 0,
            version: 0,
            source_version: 0,
            dirty: true,
        }
    }
}

impl DerivedBuffer {
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn bump_version(&mut self) {
        self.version = if self.version >= VERSION_WRAP { 1 } else { self.version + 1 };
    }

    /// Repacks lazily per spec §4.4's rebuild contract: only when
    /// `dirty || source_version != current_source_version`. `producer`
    /// returns `(data, stride, count, valid_start, valid_end)`.
    pub fn repack_with(
        &mut self,
        current_source_version: u64,
        producer: impl FnOnce() -> (Vec<u8>, u32, u32, u32, u32),
    ) {
        if !self.dirty && self.source_version == current_source_version {
            return;
        }
        let (data, stride, count, valid_start, valid_end) = producer();
        self.data = data;
        self.stride = stride;
        self.count = count;
        self.valid_start = valid_start;
        self.valid_end = valid_end;
        self.source_version = current_source_version;
        self.dirty = false;
        self.bump_version();
    }
}

/// Packs `element_size * dimension`-byte rows for every active slot, in
/// natural index order or the supplied dense order (inactive indices in a
/// dense order are filtered out, per spec §5 ordering guarantees).
pub fn pack_rows(
    raw: &[u8],
    row_bytes: usize,
    active: &FixedBitSet,
    order: Option<&[u32]>,
) -> (Vec<u8>, u32, u32, u32) {
    let mut data = Vec::new();
    let mut count = 0u32;
    let mut valid_start = u32::MAX;
    let mut valid_end = 0u32;

    let mut push = |idx: u32| {
        let start = idx as usize * row_bytes;
        data.extend_from_slice(&raw[start..start + row_bytes]);
        count += 1;
        valid_start = valid_start.min(idx);
        valid_end = valid_end.max(idx + 1);
    };

    match order {
        Some(order) => {
            for &idx in order {
                if active.contains(idx as usize) {
                    push(idx);
                }
            }
        }
        None => {
            for idx in active.ones() {
                push(idx as u32);
            }
        }
    }

    if count == 0 {
        valid_start = 0;
    }
    (data, count, valid_start, valid_end)
}

/// Encodes a sequence of i64 source values (already selected for active
/// slots/order by the caller) into little-endian packed color bytes.
pub fn encode_color(values: &[i64], mode: ColorMode) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for &v in values {
        match mode {
            ColorMode::U8x4 => {
                let b = (v as u32).to_le_bytes();
                out.extend_from_slice(&b);
            }
            ColorMode::U32x4 => {
                let u = v as u32;
                out.extend_from_slice(&u.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repack_skips_when_not_dirty_and_version_matches() {
        let mut d = DerivedBuffer::default();
        let mut calls = 0;
        d.repack_with(5, || {
            calls += 1;
            (vec![1, 2, 3], 1, 3, 0, 3)
        });
        d.repack_with(5, || {
            calls += 1;
            (vec![9, 9, 9], 1, 3, 0, 3)
        });
        assert_eq!(calls, 1);
        assert_eq!(d.data, vec![1, 2, 3]);
    }

    #[test]
    fn repack_runs_again_after_source_version_bump() {
        let mut d = DerivedBuffer::default();
        d.repack_with(1, || (vec![1], 1, 1, 0, 1));
        let v1 = d.version;
        d.repack_with(2, || (vec![2], 1, 1, 0, 1));
        assert!(d.version > v1);
        assert_eq!(d.data, vec![2]);
    }

    #[test]
    fn pack_rows_respects_dense_order_and_filters_inactive() {
        let raw = [10u8, 20, 30, 40, 50];
        let mut active = FixedBitSet::with_capacity(5);
        active.insert(0);
        active.insert(2);
        active.insert(4);
        let order = [4u32, 3, 2, 1, 0];
        let (data, count, vs, ve) = pack_rows(&raw, 1, &active, Some(&order));
        assert_eq!(data, vec![50, 30, 10]);
        assert_eq!(count, 3);
        assert_eq!((vs, ve), (0, 5));
    }
}
