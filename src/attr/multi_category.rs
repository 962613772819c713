//! Multi-category attribute storage: a CSR-like triple (spec §3, §4.3).

use crate::error::{GraphError, GraphResult};

#[derive(Debug, Clone)]
pub struct MultiCategoryStore {
    /// length `capacity + 1`, `offsets[0] = 0`, monotonic non-decreasing.
    pub offsets: Vec<u64>,
    pub ids: Vec<i32>,
    pub weights: Option<Vec<f32>>,
}

impl MultiCategoryStore {
    pub fn new(capacity: u32) -> Self {
        MultiCategoryStore {
            offsets: vec![0; capacity as usize + 1],
            ids: Vec::new(),
            weights: None,
        }
    }

    pub fn row(&self, i: u32) -> (&[i32], Option<&[f32]>) {
        let start = self.offsets[i as usize] as usize;
        let end = self.offsets[i as usize + 1] as usize;
        let ids = &self.ids[start..end];
        let weights = self.weights.as_ref().map(|w| &w[start..end]);
        (ids, weights)
    }

    /// Grows the offsets array; the tail beyond the old capacity is filled
    /// with the current total count (spec §4.3 `ensure_capacity`), keeping
    /// `offsets[new_capacity] == len(ids)`.
    pub fn grow(&mut self, new_capacity: u32) {
        let total = self.ids.len() as u64;
        self.offsets.resize(new_capacity as usize + 1, total);
    }

    pub fn clear_row(&mut self, i: u32) {
        let _ = self.set_entry(i, &[], None);
    }

    /// Rewrites row `i`, shifting subsequent rows in place to preserve CSR
    /// contiguity (spec §4.3 `set_multi_category_entry`).
    pub fn set_entry(&mut self, i: u32, ids: &[i32], weights: Option<&[f32]>) -> GraphResult<()> {
        if weights.is_some_and(|w| w.len() != ids.len()) {
            return Err(GraphError::invalid_argument(
                "multi_category weights length must match ids length",
            ));
        }
        let i = i as usize;
        let old_start = self.offsets[i] as usize;
        let old_end = self.offsets[i + 1] as usize;
        let old_len = old_end - old_start;
        let new_len = ids.len();

        self.ids.splice(old_start..old_end, ids.iter().copied());

        match (&mut self.weights, weights) {
            (Some(w), Some(new_w)) => {
                w.splice(old_start..old_end, new_w.iter().copied());
            }
            (Some(w), None) => {
                w.splice(old_start..old_end, std::iter::repeat(0.0).take(new_len));
            }
            (None, Some(new_w)) => {
                let mut w = vec![0.0f32; self.ids.len() - new_len + old_len];
                w.splice(old_start..old_end, new_w.iter().copied());
                self.weights = Some(w);
            }
            (None, None) => {}
        }

        let delta = new_len as i64 - old_len as i64;
        for off in &mut self.offsets[(i + 1)..] {
            *off = (*off as i64 + delta) as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_entry_shifts_subsequent_rows() {
        let mut s = MultiCategoryStore::new(3);
        s.set_entry(0, &[1, 2], None).unwrap();
        s.set_entry(1, &[3], None).unwrap();
        s.set_entry(2, &[4, 5, 6], None).unwrap();
        assert_eq!(s.row(0).0, &[1, 2]);
        assert_eq!(s.row(1).0, &[3]);
        assert_eq!(s.row(2).0, &[4, 5, 6]);

        // grow row 0, rows 1 and 2 must shift right.
        s.set_entry(0, &[9, 9, 9, 9], None).unwrap();
        assert_eq!(s.row(0).0, &[9, 9, 9, 9]);
        assert_eq!(s.row(1).0, &[3]);
        assert_eq!(s.row(2).0, &[4, 5, 6]);
    }

    #[test]
    fn offsets_stay_monotonic_after_grow() {
        let mut s = MultiCategoryStore::new(2);
        s.set_entry(0, &[1], None).unwrap();
        s.set_entry(1, &[2, 3], None).unwrap();
        s.grow(4);
        assert_eq!(s.offsets, vec![0, 1, 3, 3, 3]);
    }
}
