//! Categorical dictionaries (spec §4.3 "Categorical assignment").

use indexmap::IndexMap;
use std::cmp::Ordering;

/// Sentinel id denoting "missing" for categorical codes (spec §3).
pub const MISSING_ID: i32 = -1;

/// Owns the label <-> id mapping for one categorical attribute. Codes
/// stored alongside it must satisfy spec §3 invariant 5: every non-missing
/// code is a valid id in this dictionary.
#[derive(Debug, Clone, Default)]
pub struct CategoryDict {
    label_to_id: IndexMap<String, i32>,
    id_to_label: Vec<String>,
}

impl CategoryDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.id_to_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_label.is_empty()
    }

    pub fn id_of(&self, label: &str) -> Option<i32> {
        self.label_to_id.get(label).copied()
    }

    pub fn label_of(&self, id: i32) -> Option<&str> {
        if id < 0 {
            return None;
        }
        self.id_to_label.get(id as usize).map(String::as_str)
    }

    /// Inserts a new id for `label` if absent; returns its id either way.
    /// Ids are assigned densely in insertion order by this method; callers
    /// that need a specific sort order build the dictionary via
    /// [`build_from_labels`] instead.
    pub fn intern(&mut self, label: &str) -> i32 {
        if let Some(&id) = self.label_to_id.get(label) {
            return id;
        }
        let id = self.id_to_label.len() as i32;
        self.id_to_label.push(label.to_string());
        self.label_to_id.insert(label.to_string(), id);
        id
    }

    pub fn labels_by_id(&self) -> &[String] {
        &self.id_to_label
    }

    /// Replaces this dictionary with `labels` assigned densely id `0..k-1`
    /// in the given order.
    pub fn set_labels(&mut self, labels: Vec<String>) {
        self.label_to_id = labels
            .iter()
            .enumerate()
            .map(|(id, l)| (l.clone(), id as i32))
            .collect();
        self.id_to_label = labels;
    }

    /// Rewrites `codes` in place per spec §4.3 "remap_existing": old id ->
    /// old label -> new id; labels absent from `new_dict` become -1.
    pub fn remap_codes(old_dict: &CategoryDict, new_dict: &CategoryDict, codes: &mut [i32]) {
        for c in codes.iter_mut() {
            if *c < 0 {
                continue;
            }
            *c = match old_dict.label_of(*c) {
                Some(label) => new_dict.id_of(label).unwrap_or(MISSING_ID),
                None => MISSING_ID,
            };
        }
    }
}

/// Ordering policy for [`categorize`] (spec §4.3 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortPolicy {
    /// First-seen order among active slots.
    None,
    /// Descending occurrence count, ties broken alphabetically.
    Frequency,
    Alphabetical,
    /// Digit runs compared as integers, byte-wise otherwise (spec §9 (c),
    /// no locale tables).
    Natural,
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut ai, mut bi) = (a.as_bytes().iter().peekable(), b.as_bytes().iter().peekable());
    loop {
        match (ai.peek(), bi.peek()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&&ca), Some(&&cb)) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let mut na: u64 = 0;
                    while let Some(&&d) = ai.peek() {
                        if !d.is_ascii_digit() {
                            break;
                        }
                        na = na.saturating_mul(10).saturating_add((d - b'0') as u64);
                        ai.next();
                    }
                    let mut nb: u64 = 0;
                    while let Some(&&d) = bi.peek() {
                        if !d.is_ascii_digit() {
                            break;
                        }
                        nb = nb.saturating_mul(10).saturating_add((d - b'0') as u64);
                        bi.next();
                    }
                    match na.cmp(&nb) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                } else {
                    match ca.cmp(&cb) {
                        Ordering::Equal => {
                            ai.next();
                            bi.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

/// Converts a sequence of optional labels (one per active slot, in slot
/// order) into dense ids per the requested [`SortPolicy`] (spec §4.3).
/// Returns the assigned codes (same length/order as `values`) and the
/// resulting dictionary.
pub fn categorize(values: &[Option<&str>], policy: SortPolicy) -> (Vec<i32>, CategoryDict) {
    let mut first_seen: IndexMap<&str, u64> = IndexMap::new();
    let mut has_missing = false;
    for v in values {
        match v {
            Some(label) => *first_seen.entry(label).or_insert(0) += 1,
            None => has_missing = true,
        }
    }

    let mut labels: Vec<&str> = first_seen.keys().copied().collect();
    match policy {
        SortPolicy::None => {}
        SortPolicy::Frequency => {
            labels.sort_by(|a, b| {
                let ca = first_seen[a];
                let cb = first_seen[b];
                cb.cmp(&ca).then_with(|| a.cmp(b))
            });
        }
        SortPolicy::Alphabetical => labels.sort(),
        SortPolicy::Natural => labels.sort_by(|a, b| natural_cmp(a, b)),
    }

    let mut dict = CategoryDict::new();
    dict.set_labels(labels.iter().map(|s| s.to_string()).collect());
    let _ = has_missing; // missing always maps to MISSING_ID, no slot needed

    let codes = values
        .iter()
        .map(|v| match v {
            Some(label) => dict.id_of(label).unwrap_or(MISSING_ID),
            None => MISSING_ID,
        })
        .collect();
    (codes, dict)
}

/// Inverse of [`categorize`]: rebuilds owned strings from codes + dict. The
/// missing sentinel maps to `missing_label` or `"__NA__"` if `None`.
pub fn decategorize(codes: &[i32], dict: &CategoryDict, missing_label: Option<&str>) -> Vec<String> {
    let missing = missing_label.unwrap_or("__NA__");
    codes
        .iter()
        .map(|&c| dict.label_of(c).map(str::to_string).unwrap_or_else(|| missing.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorize_by_frequency_matches_spec_scenario() {
        let values = vec![Some("a"), Some("b"), Some("a"), Some("c"), None];
        let (codes, dict) = categorize(&values, SortPolicy::Frequency);
        assert_eq!(codes, vec![0, 1, 0, 2, -1]);
        assert_eq!(dict.id_of("a"), Some(0));
        assert_eq!(dict.id_of("b"), Some(1));
        assert_eq!(dict.id_of("c"), Some(2));
    }

    #[test]
    fn categorize_then_decategorize_round_trips() {
        let values = vec![Some("x"), None, Some("y"), Some("x")];
        let (codes, dict) = categorize(&values, SortPolicy::Alphabetical);
        let back = decategorize(&codes, &dict, None);
        assert_eq!(back, vec!["x", "__NA__", "y", "x"]);
    }

    #[test]
    fn natural_sort_orders_digit_runs_numerically() {
        let values = vec![Some("item2"), Some("item10"), Some("item1")];
        let (_codes, dict) = categorize(&values, SortPolicy::Natural);
        assert_eq!(dict.labels_by_id(), &["item1", "item2", "item10"]);
    }

    #[test]
    fn remap_existing_maps_unmapped_labels_to_missing() {
        let mut old = CategoryDict::new();
        old.set_labels(vec!["a".into(), "b".into()]);
        let mut new = CategoryDict::new();
        new.set_labels(vec!["b".into(), "c".into()]);
        let mut codes = vec![0, 1, -1];
        CategoryDict::remap_codes(&old, &new, &mut codes);
        assert_eq!(codes, vec![-1, 0, -1]);
    }
}
