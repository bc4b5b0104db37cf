use std::collections::{BTreeMap, HashSet};

/// Documents accepted for indexing but not yet flushed, keyed by document id
#[derive(Debug, Default)]
pub struct PendingSet {
    entries: BTreeMap<String, String>,
}

/// Ids and contents drained from the pending set for one upsert call.
/// `ids[i]` always belongs to `contents[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushBatch {
    pub ids: Vec<String>,
    pub contents: Vec<String>,
}

impl FlushBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the pending content for `id` (last write wins)
    pub fn put(&mut self, id: String, content: String) {
        self.entries.insert(id, content);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    /// Ids currently pending, in the order a flush would submit them
    pub fn snapshot_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Remove exactly the entries named in `ids` and return them as a batch.
    ///
    /// Entries whose ids are not in `ids` stay pending, so documents accepted
    /// after the snapshot was taken survive for the next cycle. Ids that are
    /// no longer pending are skipped.
    pub fn drain_snapshot(&mut self, ids: &[String]) -> FlushBatch {
        let mut batch = FlushBatch::default();
        let mut seen = HashSet::with_capacity(ids.len());

        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            if let Some(content) = self.entries.remove(id) {
                batch.ids.push(id.clone());
                batch.contents.push(content);
            }
        }

        batch
    }

    /// Drop pending entries for `ids`, returning how many were removed
    pub fn remove_all(&mut self, ids: &[String]) -> usize {
        ids.iter()
            .filter(|id| self.entries.remove(id.as_str()).is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_last_write_wins_per_id() {
        let mut pending = PendingSet::new();
        pending.put("a".into(), "first".into());
        pending.put("b".into(), "other".into());
        pending.put("a".into(), "second".into());
        pending.put("a".into(), "third".into());

        assert_eq!(pending.len(), 2);
        assert_eq!(pending.get("a"), Some("third"));
        assert_eq!(pending.get("b"), Some("other"));
    }

    #[test]
    fn test_drain_keeps_entries_added_after_snapshot() {
        let mut pending = PendingSet::new();
        pending.put("a".into(), "x".into());
        pending.put("b".into(), "y".into());

        let snapshot = pending.snapshot_ids();
        pending.put("c".into(), "late".into());

        let batch = pending.drain_snapshot(&snapshot);

        assert_eq!(batch.ids, ids(&["a", "b"]));
        assert_eq!(batch.contents, ids(&["x", "y"]));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.get("c"), Some("late"));
    }

    #[test]
    fn test_drain_takes_content_overwritten_after_snapshot() {
        let mut pending = PendingSet::new();
        pending.put("a".into(), "old".into());

        let snapshot = pending.snapshot_ids();
        pending.put("a".into(), "new".into());

        let batch = pending.drain_snapshot(&snapshot);
        assert_eq!(batch.contents, ids(&["new"]));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_drain_skips_missing_and_duplicate_ids() {
        let mut pending = PendingSet::new();
        pending.put("a".into(), "x".into());

        let batch = pending.drain_snapshot(&ids(&["a", "a", "gone"]));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.ids, ids(&["a"]));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_remove_all_counts_removed_entries() {
        let mut pending = PendingSet::new();
        pending.put("a".into(), "x".into());
        pending.put("b".into(), "y".into());

        assert_eq!(pending.remove_all(&ids(&["a", "missing"])), 1);
        assert_eq!(pending.snapshot_ids(), ids(&["b"]));
    }
}
