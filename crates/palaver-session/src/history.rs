//! Conversation history: snapshots of finished sessions.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::message::Message;
use palaver_gateway::Variables;

/// Maximum number of entries kept by default
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

const PREVIEW_CHARS: usize = 80;

/// A snapshot of a past session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    /// Unix timestamp in milliseconds of when the snapshot was written
    pub timestamp: i64,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub variables: Variables,
    pub preview: String,
}

impl HistoryEntry {
    /// Snapshot a session, stamped with the current time
    pub fn new(id: impl Into<String>, messages: &[Message], variables: &Variables) -> Self {
        Self {
            id: id.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            messages: messages.to_vec(),
            variables: variables.clone(),
            preview: preview(messages),
        }
    }

    /// Format the timestamp for display
    pub fn timestamp_display(&self) -> String {
        use chrono::{Local, TimeZone};
        Local
            .timestamp_millis_opt(self.timestamp)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Short description of a conversation: its first user message, or its first message.
pub fn preview(messages: &[Message]) -> String {
    let source = messages
        .iter()
        .find(|m| m.is_user())
        .or_else(|| messages.first())
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, PREVIEW_CHARS)
}

/// Truncate a string to `max` characters, appending "..." if truncated.
fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// Insert or replace an entry, keeping the list newest-first and capped.
fn upsert(entries: &mut Vec<HistoryEntry>, entry: HistoryEntry, limit: usize) {
    entries.retain(|e| e.id != entry.id);
    // Front insertion plus a stable sort keeps the newest write ahead of
    // older entries that share its timestamp.
    entries.insert(0, entry);
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    if entries.len() > limit {
        let evicted = entries.len() - limit;
        entries.truncate(limit);
        tracing::debug!("Evicted {} history entr(y/ies) over the limit of {}", evicted, limit);
    }
}

/// Storage for past sessions
pub trait HistoryStore: Send + Sync {
    /// Save a snapshot, replacing any existing entry with the same id
    fn save_session(&self, id: &str, messages: &[Message], variables: &Variables) -> Result<()>;

    /// All entries, newest first
    fn list_sessions(&self) -> Result<Vec<HistoryEntry>>;

    fn get_session(&self, id: &str) -> Result<Option<HistoryEntry>>;

    /// Delete one entry. Returns false if it did not exist.
    fn delete_session(&self, id: &str) -> Result<bool>;

    fn clear_all(&self) -> Result<()>;
}

/// In-process history store
pub struct MemoryHistoryStore {
    entries: Mutex<Vec<HistoryEntry>>,
    limit: usize,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            limit,
        }
    }

    fn insert(&self, entry: HistoryEntry) {
        upsert(&mut self.entries.lock(), entry, self.limit);
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn save_session(&self, id: &str, messages: &[Message], variables: &Variables) -> Result<()> {
        self.insert(HistoryEntry::new(id, messages, variables));
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.entries.lock().clone())
    }

    fn get_session(&self, id: &str) -> Result<Option<HistoryEntry>> {
        Ok(self.entries.lock().iter().find(|e| e.id == id).cloned())
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() != before)
    }

    fn clear_all(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

/// History stored as one JSON document in a single well-known file
pub struct FileHistoryStore {
    path: PathBuf,
    limit: usize,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileHistoryStore {
    /// Default history file location
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("palaver")
            .join("history.json")
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_limit(path, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unreadable history file is moved before it can be overwritten
    pub fn corrupt_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".corrupt");
        PathBuf::from(name)
    }

    /// Read all entries. A missing file is empty history; a corrupt one is
    /// renamed to [`Self::corrupt_path`] and then read as empty.
    fn read(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                let backup = self.corrupt_path();
                fs::rename(&self.path, &backup)?;
                tracing::warn!(
                    "Unreadable history file {} moved to {}: {}",
                    self.path.display(),
                    backup.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    /// Write all entries via a temp file and rename
    fn write(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl HistoryStore for FileHistoryStore {
    fn save_session(&self, id: &str, messages: &[Message], variables: &Variables) -> Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read()?;
        upsert(&mut entries, HistoryEntry::new(id, messages, variables), self.limit);
        self.write(&entries)?;
        tracing::debug!("Saved session {} to {}", id, self.path.display());
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<HistoryEntry>> {
        let _guard = self.lock.lock();
        self.read()
    }

    fn get_session(&self, id: &str) -> Result<Option<HistoryEntry>> {
        let _guard = self.lock.lock();
        Ok(self.read()?.into_iter().find(|e| e.id == id))
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        let mut entries = self.read()?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.write(&entries)?;
        Ok(true)
    }

    fn clear_all(&self) -> Result<()> {
        let _guard = self.lock.lock();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conversation() -> Vec<Message> {
        vec![
            Message::agent("Welcome! How can I help?"),
            Message::user("I'd like to   book\na demo"),
            Message::agent("Sure, here is a link."),
        ]
    }

    fn entry_at(id: &str, timestamp: i64) -> HistoryEntry {
        HistoryEntry {
            timestamp,
            ..HistoryEntry::new(id, &[Message::user(id)], &Variables::new())
        }
    }

    #[test]
    fn test_preview_prefers_first_user_message() {
        assert_eq!(preview(&conversation()), "I'd like to book a demo");
        assert_eq!(preview(&[Message::agent("only agent")]), "only agent");
        assert_eq!(preview(&[]), "");
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(200);
        let p = preview(&[Message::user(long)]);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn test_round_trip_memory() {
        let store = MemoryHistoryStore::new();
        let messages = conversation();
        let mut vars = Variables::new();
        vars.insert("email".into(), json!("ada@example.com"));

        store.save_session("chat-1", &messages, &vars).unwrap();
        let entry = store.get_session("chat-1").unwrap().unwrap();
        assert_eq!(entry.messages, messages);
        assert_eq!(entry.variables, vars);
        assert!(store.get_session("missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let store = MemoryHistoryStore::new();
        store.save_session("chat-1", &[Message::user("v1")], &Variables::new()).unwrap();
        store.save_session("chat-2", &[Message::user("other")], &Variables::new()).unwrap();
        store.save_session("chat-1", &[Message::user("v2")], &Variables::new()).unwrap();

        let list = store.list_sessions().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "chat-1");
        assert_eq!(list[0].messages[0].content, "v2");
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let store = MemoryHistoryStore::new();
        for i in 0..=DEFAULT_HISTORY_LIMIT {
            store.insert(entry_at(&format!("chat-{}", i), 1_000 + i as i64));
        }

        let list = store.list_sessions().unwrap();
        assert_eq!(list.len(), DEFAULT_HISTORY_LIMIT);
        assert!(list.iter().all(|e| e.id != "chat-0"));
        assert_eq!(list[0].id, format!("chat-{}", DEFAULT_HISTORY_LIMIT));
        assert!(list.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn test_eviction_with_equal_timestamps_keeps_newest_write() {
        let store = MemoryHistoryStore::with_limit(2);
        store.insert(entry_at("a", 5));
        store.insert(entry_at("b", 5));
        store.insert(entry_at("c", 5));

        let ids: Vec<String> = store.list_sessions().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn test_delete_and_clear() {
        let store = MemoryHistoryStore::new();
        store.save_session("chat-1", &conversation(), &Variables::new()).unwrap();
        assert!(store.delete_session("chat-1").unwrap());
        assert!(!store.delete_session("chat-1").unwrap());

        store.save_session("chat-2", &conversation(), &Variables::new()).unwrap();
        store.clear_all().unwrap();
        assert!(store.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");
        let store = FileHistoryStore::new(&path);
        assert!(store.list_sessions().unwrap().is_empty());

        let messages = conversation();
        store.save_session("chat-1", &messages, &Variables::new()).unwrap();

        // a second store over the same file sees the same data
        let reopened = FileHistoryStore::new(&path);
        let entry = reopened.get_session("chat-1").unwrap().unwrap();
        assert_eq!(entry.messages, messages);
        assert_eq!(entry.preview, "I'd like to book a demo");

        assert!(reopened.delete_session("chat-1").unwrap());
        assert!(store.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::with_limit(dir.path().join("history.json"), 3);
        for i in 0..5 {
            store
                .save_session(&format!("chat-{}", i), &[Message::user("x")], &Variables::new())
                .unwrap();
        }
        let ids: Vec<String> = store.list_sessions().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["chat-4", "chat-3", "chat-2"]);
    }

    #[test]
    fn test_file_store_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "not json").unwrap();

        let store = FileHistoryStore::new(&path);
        assert!(store.list_sessions().unwrap().is_empty());
        store.save_session("chat-1", &conversation(), &Variables::new()).unwrap();
        assert_eq!(store.list_sessions().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_kept_aside_before_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let original = r#"[{"id": "chat-0", "timestamp": "#;
        fs::write(&path, original).unwrap();

        let store = FileHistoryStore::new(&path);
        store.save_session("chat-1", &conversation(), &Variables::new()).unwrap();

        let backup = dir.path().join("history.json.corrupt");
        assert_eq!(store.corrupt_path(), backup);
        assert_eq!(fs::read_to_string(&backup).unwrap(), original);

        let ids: Vec<String> = store.list_sessions().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["chat-1"]);
        // the backup is left alone once the main file is valid again
        assert_eq!(fs::read_to_string(&backup).unwrap(), original);
    }

    #[test]
    fn test_file_store_clear_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path().join("history.json"));
        store.save_session("chat-1", &conversation(), &Variables::new()).unwrap();
        store.clear_all().unwrap();
        assert!(!store.path().exists());
        store.clear_all().unwrap();
    }
}
