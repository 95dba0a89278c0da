use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::anchor::{HighlightId, monotonic_millis};
use crate::storage::KeyValueStore;

/// Storage key holding every comment of an origin as one JSON array.
pub const DEFAULT_STORAGE_KEY: &str = "gpt-comments";

/// A single comment as it is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    pub id: i64,
    pub text: String,
    pub highlight_id: HighlightId,
    #[serde(with = "millis_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub url: String,
}

/// Timestamps are stored as RFC 3339 UTC with exactly three fractional
/// digits, e.g. `2024-05-01T10:00:00.000Z`.
mod millis_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    NotFound,
    Removed { remaining: usize },
    /// The last comment went away and the thread with it.
    ThreadEmptied,
}

#[derive(Debug, Clone)]
struct Thread {
    highlight_id: HighlightId,
    comments: Vec<CommentRecord>,
}

/// Comment threads keyed by highlight id, mirrored to a key-value store.
///
/// Every mutation rewrites the full record list under one key and only takes
/// effect in memory once that write succeeds. Threads keep first-seen order;
/// comments within a thread keep insertion order.
pub struct CommentStore<S> {
    storage: S,
    key: String,
    threads: Vec<Thread>,
    last_comment_id: i64,
}

impl<S: KeyValueStore> CommentStore<S> {
    /// Reads all persisted records. Missing data gives an empty store; so
    /// does malformed data, which is logged and otherwise ignored.
    pub fn load(storage: S, key: impl Into<String>) -> Self {
        let key = key.into();
        let records = match Self::read_records(&storage, &key) {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to load comments from {key:?}, starting empty: {e:#}");
                Vec::new()
            }
        };

        let mut store = Self {
            storage,
            key,
            threads: Vec::new(),
            last_comment_id: 0,
        };
        let count = records.len();
        for record in records {
            store.last_comment_id = store.last_comment_id.max(record.id);
            thread_entry(&mut store.threads, &record.highlight_id)
                .comments
                .push(record);
        }
        info!(
            "Loaded {count} comments in {} threads",
            store.threads.len()
        );
        store
    }

    fn read_records(storage: &S, key: &str) -> Result<Vec<CommentRecord>> {
        let Some(raw) = storage.get_item(key)? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).context("Failed to parse stored comments JSON")
    }

    /// Appends a comment to a thread and persists.
    ///
    /// The text is trimmed; blank text is rejected with `Ok(None)` and nothing
    /// changes. The timestamp is kept to millisecond precision. A failed write
    /// leaves the store as it was.
    pub fn add_comment(
        &mut self,
        highlight_id: &HighlightId,
        text: &str,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CommentRecord>> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Rejected blank comment for {highlight_id}");
            return Ok(None);
        }

        let record = CommentRecord {
            id: monotonic_millis(&mut self.last_comment_id, now),
            text: text.to_string(),
            highlight_id: highlight_id.clone(),
            timestamp: now.trunc_subsecs(3),
            url: url.to_string(),
        };
        let mut threads = self.threads.clone();
        thread_entry(&mut threads, highlight_id)
            .comments
            .push(record.clone());
        self.commit(threads)?;
        debug!("Added comment {} to {highlight_id}", record.id);
        Ok(Some(record))
    }

    /// Removes one comment, and the thread with it when it was the last. A
    /// failed write leaves the store as it was.
    pub fn delete_comment(
        &mut self,
        highlight_id: &HighlightId,
        comment_id: i64,
    ) -> Result<DeleteOutcome> {
        let Some(index) = self.thread_index(highlight_id) else {
            return Ok(DeleteOutcome::NotFound);
        };

        let mut threads = self.threads.clone();
        let comments = &mut threads[index].comments;
        let before = comments.len();
        comments.retain(|comment| comment.id != comment_id);
        if comments.len() == before {
            return Ok(DeleteOutcome::NotFound);
        }

        let remaining = comments.len();
        let outcome = if remaining == 0 {
            threads.remove(index);
            DeleteOutcome::ThreadEmptied
        } else {
            DeleteOutcome::Removed { remaining }
        };

        self.commit(threads)?;
        debug!("Deleted comment {comment_id} from {highlight_id}");
        Ok(outcome)
    }

    pub fn list(&self, highlight_id: &HighlightId) -> &[CommentRecord] {
        self.thread(highlight_id)
            .map(|thread| thread.comments.as_slice())
            .unwrap_or(&[])
    }

    pub fn comment_count(&self, highlight_id: &HighlightId) -> usize {
        self.list(highlight_id).len()
    }

    /// Ids of all non-empty threads, in first-seen order.
    pub fn highlight_ids(&self) -> impl Iterator<Item = &HighlightId> {
        self.threads.iter().map(|thread| &thread.highlight_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &CommentRecord> {
        self.threads.iter().flat_map(|thread| thread.comments.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Writes the full flattened record list under the store's key.
    pub fn synchronize(&mut self) -> Result<()> {
        write_records(&mut self.storage, &self.key, &self.threads)
    }

    fn commit(&mut self, threads: Vec<Thread>) -> Result<()> {
        write_records(&mut self.storage, &self.key, &threads)?;
        self.threads = threads;
        Ok(())
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    fn thread(&self, highlight_id: &HighlightId) -> Option<&Thread> {
        self.threads
            .iter()
            .find(|thread| &thread.highlight_id == highlight_id)
    }

    fn thread_index(&self, highlight_id: &HighlightId) -> Option<usize> {
        self.threads
            .iter()
            .position(|thread| &thread.highlight_id == highlight_id)
    }

}

fn write_records<S: KeyValueStore>(storage: &mut S, key: &str, threads: &[Thread]) -> Result<()> {
    let records: Vec<&CommentRecord> = threads
        .iter()
        .flat_map(|thread| thread.comments.iter())
        .collect();
    let json = serde_json::to_string(&records).context("Failed to serialize comments")?;
    storage
        .set_item(key, &json)
        .with_context(|| format!("Failed to persist comments under {key:?}"))
}

fn thread_entry<'a>(threads: &'a mut Vec<Thread>, highlight_id: &HighlightId) -> &'a mut Thread {
    let index = match threads
        .iter()
        .position(|thread| &thread.highlight_id == highlight_id)
    {
        Some(index) => index,
        None => {
            threads.push(Thread {
                highlight_id: highlight_id.clone(),
                comments: Vec::new(),
            });
            threads.len() - 1
        }
    };
    &mut threads[index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    /// Memory-backed store that refuses every write.
    struct ReadOnlyStore {
        inner: MemoryStore,
    }

    impl KeyValueStore for ReadOnlyStore {
        fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key)
        }

        fn set_item(&mut self, _key: &str, _value: &str) -> Result<()> {
            anyhow::bail!("storage is read-only")
        }

        fn remove_item(&mut self, _key: &str) -> Result<()> {
            anyhow::bail!("storage is read-only")
        }
    }

    fn at(seconds: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, seconds).unwrap()
    }

    fn id(value: &str) -> HighlightId {
        HighlightId::from(value)
    }

    fn new_store() -> CommentStore<MemoryStore> {
        CommentStore::load(MemoryStore::new(), DEFAULT_STORAGE_KEY)
    }

    #[test]
    fn test_add_trims_and_persists() {
        let mut store = new_store();
        let record = store
            .add_comment(&id("highlight-1"), "  looks wrong  ", "https://e.com/a", at(0))
            .unwrap()
            .unwrap();

        assert_eq!(record.text, "looks wrong");
        assert_eq!(record.id, at(0).timestamp_millis());
        assert_eq!(store.list(&id("highlight-1")), &[record.clone()]);

        let raw = store.storage().get_item(DEFAULT_STORAGE_KEY).unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0]["highlightId"], "highlight-1");
        assert_eq!(parsed[0]["text"], "looks wrong");
        assert_eq!(parsed[0]["url"], "https://e.com/a");
    }

    #[test]
    fn test_blank_comment_is_rejected() {
        let mut store = new_store();
        let result = store
            .add_comment(&id("highlight-1"), " \n\t ", "https://e.com", at(0))
            .unwrap();
        assert!(result.is_none());
        assert!(store.is_empty());
        assert_eq!(store.storage().get_item(DEFAULT_STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn test_comment_ids_unique_at_same_instant() {
        let mut store = new_store();
        let first = store
            .add_comment(&id("h"), "one", "u", at(0))
            .unwrap()
            .unwrap();
        let second = store
            .add_comment(&id("h"), "two", "u", at(0))
            .unwrap()
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(store.comment_count(&id("h")), 2);
    }

    #[test]
    fn test_delete_reports_remaining_and_empties_thread() {
        let mut store = new_store();
        let first = store.add_comment(&id("h"), "one", "u", at(0)).unwrap().unwrap();
        let second = store.add_comment(&id("h"), "two", "u", at(1)).unwrap().unwrap();

        assert_eq!(
            store.delete_comment(&id("h"), first.id).unwrap(),
            DeleteOutcome::Removed { remaining: 1 }
        );
        assert_eq!(
            store.delete_comment(&id("h"), first.id).unwrap(),
            DeleteOutcome::NotFound
        );
        assert_eq!(
            store.delete_comment(&id("h"), second.id).unwrap(),
            DeleteOutcome::ThreadEmptied
        );
        assert!(store.is_empty());
        assert_eq!(
            store.storage().get_item(DEFAULT_STORAGE_KEY).unwrap().as_deref(),
            Some("[]")
        );
    }

    #[test]
    fn test_delete_from_unknown_thread() {
        let mut store = new_store();
        assert_eq!(
            store.delete_comment(&id("missing"), 1).unwrap(),
            DeleteOutcome::NotFound
        );
    }

    #[test]
    fn test_reload_restores_threads_in_order() {
        let mut store = new_store();
        store.add_comment(&id("b"), "first", "u", at(0)).unwrap();
        store.add_comment(&id("a"), "second", "u", at(1)).unwrap();
        store.add_comment(&id("b"), "third", "u", at(2)).unwrap();

        let reloaded = CommentStore::load(store.into_storage(), DEFAULT_STORAGE_KEY);
        let ids: Vec<&str> = reloaded.highlight_ids().map(HighlightId::as_str).collect();
        assert_eq!(ids, vec!["b", "a"]);
        let texts: Vec<&str> = reloaded
            .list(&id("b"))
            .iter()
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first", "third"]);
        assert_eq!(reloaded.list(&id("a"))[0].timestamp, at(1));
    }

    #[test]
    fn test_reload_continues_id_sequence() {
        let mut store = new_store();
        let old = store.add_comment(&id("h"), "old", "u", at(5)).unwrap().unwrap();

        let mut reloaded = CommentStore::load(store.into_storage(), DEFAULT_STORAGE_KEY);
        let newer = reloaded
            .add_comment(&id("h"), "clock went back", "u", at(1))
            .unwrap()
            .unwrap();
        assert!(newer.id > old.id);
    }

    #[test]
    fn test_failed_add_leaves_store_unchanged() {
        let mut store = CommentStore::load(
            ReadOnlyStore {
                inner: MemoryStore::new(),
            },
            DEFAULT_STORAGE_KEY,
        );
        assert!(store.add_comment(&id("h"), "hi", "u", at(0)).is_err());
        assert_eq!(store.comment_count(&id("h")), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_delete_keeps_comment() {
        let raw = r#"[{"id":7,"text":"keep","highlightId":"h","timestamp":"2024-05-01T10:00:00.000Z","url":"u"}]"#;
        let mut store = CommentStore::load(
            ReadOnlyStore {
                inner: MemoryStore::new().with_item(DEFAULT_STORAGE_KEY, raw),
            },
            DEFAULT_STORAGE_KEY,
        );
        assert!(store.delete_comment(&id("h"), 7).is_err());
        assert_eq!(store.comment_count(&id("h")), 1);
        assert_eq!(store.highlight_ids().count(), 1);
    }

    #[test]
    fn test_timestamps_stored_with_milliseconds() {
        let mut store = new_store();
        let whole = at(0);
        let fractional = whole + chrono::Duration::nanoseconds(123_456_789);
        store.add_comment(&id("h"), "one", "u", whole).unwrap();
        let record = store
            .add_comment(&id("h"), "two", "u", fractional)
            .unwrap()
            .unwrap();
        assert_eq!(record.timestamp, whole + chrono::Duration::milliseconds(123));

        let raw = store.storage().get_item(DEFAULT_STORAGE_KEY).unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0]["timestamp"], "2024-03-01T10:00:00.000Z");
        assert_eq!(parsed[1]["timestamp"], "2024-03-01T10:00:00.123Z");

        let reloaded = CommentStore::load(store.into_storage(), DEFAULT_STORAGE_KEY);
        assert_eq!(reloaded.list(&id("h"))[1], record);
    }

    #[test]
    fn test_malformed_data_starts_empty() {
        let storage = MemoryStore::new().with_item(DEFAULT_STORAGE_KEY, "{\"oops\": true");
        let store = CommentStore::load(storage, DEFAULT_STORAGE_KEY);
        assert!(store.is_empty());
    }

    #[test]
    fn test_reads_browser_written_records() {
        let raw = r#"[{"id":1714557600000,"text":"hi","highlightId":"highlight-1714557599000","timestamp":"2024-05-01T10:00:00.000Z","url":"https://chat.example.com/c/1"}]"#;
        let store = CommentStore::load(
            MemoryStore::new().with_item(DEFAULT_STORAGE_KEY, raw),
            DEFAULT_STORAGE_KEY,
        );
        let comments = store.list(&id("highlight-1714557599000"));
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text, "hi");
        assert_eq!(comments[0].timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
    }
}
