//! Lazily-computed per-(file, source, group) first/count index.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::file::RunFile;

use super::DataCollection;

/// First-offset and record-count arrays for one (file, source, group),
/// positionally aligned with the file's train-ID array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexEntry {
    pub(crate) firsts: Vec<u64>,
    pub(crate) counts: Vec<u64>,
}

/// Memoized index reads, keyed by (file id, source, group) so the same
/// group in different files, or different groups in one file, never collide.
#[derive(Debug, Clone, Default)]
pub(crate) struct IndexCache {
    entries: HashMap<(usize, String, String), Arc<IndexEntry>>,
}

impl IndexCache {
    fn get(&self, key: &(usize, String, String)) -> Option<Arc<IndexEntry>> {
        self.entries.get(key).map(Arc::clone)
    }

    fn insert(&mut self, key: (usize, String, String), entry: Arc<IndexEntry>) {
        self.entries.insert(key, entry);
    }

    /// Copy of this cache restricted to the given sources
    pub(crate) fn filtered<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&str) -> bool,
    {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|((_, source, _), _)| keep(source))
                .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
                .collect(),
        }
    }
}

impl DataCollection {
    /// First/count index for one (file, source, group); read once, then
    /// served from the cache.
    pub(crate) fn index(
        &self,
        file: &Arc<RunFile>,
        source: &str,
        group: &str,
    ) -> Result<Arc<IndexEntry>> {
        let key = (file.id(), source.to_string(), group.to_string());
        if let Some(hit) = self.index_cache.borrow().get(&key) {
            return Ok(hit);
        }
        log::trace!(
            "reading index {}/{} from {}",
            source,
            group,
            file.path().display()
        );
        let (firsts, counts) = file.read_index(source, group)?;
        let entry = Arc::new(IndexEntry { firsts, counts });
        self.index_cache.borrow_mut().insert(key, Arc::clone(&entry));
        Ok(entry)
    }
}

/// Repeat each train ID by its record count, one label per physical record.
/// The two arrays are truncated to the shorter length.
pub(crate) fn expand_train_ids(counts: &[u64], train_ids: &[u64]) -> Vec<u64> {
    let n = counts.len().min(train_ids.len());
    let total: u64 = counts[..n].iter().sum();
    let mut expanded = Vec::with_capacity(total as usize);
    for (&tid, &count) in train_ids[..n].iter().zip(&counts[..n]) {
        for _ in 0..count {
            expanded.push(tid);
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn expand_repeats_each_train_by_its_count() {
        let expanded = expand_train_ids(&[0, 2, 1], &[10, 11, 12]);
        assert_eq!(expanded, vec![11, 11, 12]);
    }

    #[test]
    fn expand_truncates_to_shorter_input() {
        assert_eq!(expand_train_ids(&[1, 1, 1], &[7, 8]), vec![7, 8]);
        assert_eq!(expand_train_ids(&[2], &[7, 8]), vec![7, 7]);
        assert!(expand_train_ids(&[], &[7, 8]).is_empty());
    }

    proptest! {
        // Re-deriving counts from the expanded label sequence recovers the
        // originals exactly.
        #[test]
        fn expansion_round_trips_counts(counts in proptest::collection::vec(0u64..5, 0..32)) {
            let train_ids: Vec<u64> = (1..=counts.len() as u64).collect();
            let expanded = expand_train_ids(&counts, &train_ids);
            let rederived: Vec<u64> = train_ids
                .iter()
                .map(|tid| expanded.iter().filter(|&&t| t == *tid).count() as u64)
                .collect();
            prop_assert_eq!(rederived, counts);
        }
    }
}
