// Copyright 2025 Oxide Computer Company

use indexmap::IndexMap;

use crate::DiffResult;

/// Partition of two key→value mappings into added, removed, and shared keys.
///
/// A key present only in the right input is `added`, present only in the left
/// is `removed`, and present in both is `shared`. The three sets partition
/// the union of both key sets with no overlap. `shared` preserves the left
/// input's iteration order.
#[derive(Debug)]
pub struct MapDiff<K, V> {
    pub added: IndexMap<K, V>,
    pub removed: IndexMap<K, V>,
    pub shared: Vec<K>,
}

impl<K, V> Default for MapDiff<K, V> {
    fn default() -> Self {
        Self {
            added: IndexMap::new(),
            removed: IndexMap::new(),
            shared: Vec::new(),
        }
    }
}

impl<K, V> MapDiff<K, V>
where
    K: std::hash::Hash + Eq + Clone,
{
    /// Diff two mappings by key. An absent input is treated as empty, so
    /// everything in the other input becomes wholly added or wholly removed.
    pub fn diff<'a, I, I2>(left: Option<I>, right: Option<I2>) -> Self
    where
        I: IntoIterator<Item = (&'a K, &'a V)>,
        I2: IntoIterator<Item = (&'a K, &'a V)>,
        K: 'a,
        V: 'a + Clone,
    {
        let mut out = Self::default();

        let mut remaining: IndexMap<K, V> = right
            .into_iter()
            .flatten()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (key, value) in left.into_iter().flatten() {
            // shift_remove preserves the insertion order of what's left, so
            // `added` ends up in right-input order.
            if remaining.shift_remove(key).is_some() {
                out.shared.push(key.clone());
            } else {
                out.removed.insert(key.clone(), value.clone());
            }
        }

        out.added = remaining;
        out
    }

    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Classify only the add/remove portion of this diff: removal of a key
    /// breaks consumers of the left input, addition alone does not.
    pub fn keys_result(&self) -> DiffResult {
        if !self.removed.is_empty() {
            DiffResult::Incompatible
        } else if !self.added.is_empty() {
            DiffResult::Compatible
        } else {
            DiffResult::NoChange
        }
    }
}
