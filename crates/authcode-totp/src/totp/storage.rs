//! Persistence for the history ledger.
//!
//! The ledger is stored as a JSON array of plain records, most recent first,
//! with whole-collection get/set semantics. Records written by older
//! versions use different field names and an inverted reveal flag; they are
//! migrated once, while loading.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::totp::codec;
use crate::totp::types::*;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Backing store for history entries.
pub trait HistoryStore: Send + Sync {
    /// Load all entries. An absent store is an empty history.
    fn load(&self) -> Result<Vec<HistoryEntry>, TotpError>;

    /// Replace the stored collection.
    fn save(&self, entries: &[HistoryEntry]) -> Result<(), TotpError>;

    /// Drop everything the store holds.
    fn purge(&self) -> Result<(), TotpError> {
        self.save(&[])
    }
}

fn persistence_error(msg: &str, cause: impl std::fmt::Display) -> TotpError {
    TotpError::new(TotpErrorKind::PersistenceError, msg).with_detail(cause.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Record migration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Any record shape we have ever written.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    id: Option<String>,
    #[serde(alias = "name")]
    display_name: Option<String>,
    #[serde(alias = "fullSecret")]
    secret: String,
    reveal_secret: Option<bool>,
    show_seed: Option<bool>,
    hide_secret: Option<bool>,
    created_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    fn reveal(&self) -> bool {
        self.reveal_secret
            .or(self.show_seed)
            .or(self.hide_secret.map(|hide| !hide))
            .unwrap_or(false)
    }

    fn into_entry(self, position: usize) -> Result<HistoryEntry, TotpError> {
        let secret = codec::normalize(&self.secret)?;
        let reveal = self.reveal();
        let mut entry = HistoryEntry::new(
            format!("{} {}", DEFAULT_NAME_PREFIX, position + 1),
            &secret,
            reveal,
        );
        if let Some(id) = self.id.filter(|id| !id.trim().is_empty()) {
            entry.id = id;
        }
        if let Some(name) = self.display_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            entry.display_name = name.to_string();
        }
        if let Some(created_at) = self.created_at {
            entry.created_at = created_at;
        }
        Ok(entry)
    }
}

/// Parse a stored history document. The top level must be an array;
/// records that cannot be migrated are skipped with a warning.
pub fn parse_history_json(text: &str) -> Result<Vec<HistoryEntry>, TotpError> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(text)
        .map_err(|e| persistence_error("History is not a JSON array", e))?;

    let mut entries = Vec::with_capacity(raw.len());
    for (position, value) in raw.into_iter().enumerate() {
        let migrated = serde_json::from_value::<StoredRecord>(value)
            .map_err(|e| persistence_error("Malformed history record", e))
            .and_then(|record| record.into_entry(position));
        match migrated {
            Ok(entry) => entries.push(entry),
            Err(e) => log::warn!("Skipping history record #{}: {}", position, e.message),
        }
    }
    Ok(entries)
}

fn render_history_json(entries: &[HistoryEntry]) -> Result<String, TotpError> {
    serde_json::to_string_pretty(entries).map_err(|e| persistence_error("Failed to encode history", e))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  JSON file store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// History kept in a single pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&self) -> Result<Vec<HistoryEntry>, TotpError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)
            .map_err(|e| persistence_error("Failed to read history file", e))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        parse_history_json(&text)
    }

    fn save(&self, entries: &[HistoryEntry]) -> Result<(), TotpError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| persistence_error("Failed to create history directory", e))?;
        }
        let json = render_history_json(entries)?;
        let tmp = self.temp_path();
        fs::write(&tmp, json).map_err(|e| persistence_error("Failed to write history file", e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| persistence_error("Failed to replace history file", e))?;
        log::debug!("Saved {} history entries to {}", entries.len(), self.path.display());
        Ok(())
    }

    fn purge(&self) -> Result<(), TotpError> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| persistence_error("Failed to remove history file", e))?;
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Keeps the serialised document in memory. Goes through the same JSON
/// encoding and migration as the file store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document, e.g. one written by an older version.
    pub fn with_raw_json(json: impl Into<String>) -> Self {
        Self {
            document: Mutex::new(Some(json.into())),
        }
    }

    /// The current document, if anything has been stored.
    pub fn raw_json(&self) -> Option<String> {
        self.document.lock().ok().and_then(|doc| doc.clone())
    }
}

impl HistoryStore for MemoryStore {
    fn load(&self) -> Result<Vec<HistoryEntry>, TotpError> {
        let doc = self
            .document
            .lock()
            .map_err(|e| persistence_error("History store poisoned", e))?;
        match doc.as_deref() {
            Some(text) => parse_history_json(text),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, entries: &[HistoryEntry]) -> Result<(), TotpError> {
        let json = render_history_json(entries)?;
        let mut doc = self
            .document
            .lock()
            .map_err(|e| persistence_error("History store poisoned", e))?;
        *doc = Some(json);
        Ok(())
    }

    fn purge(&self) -> Result<(), TotpError> {
        let mut doc = self
            .document
            .lock()
            .map_err(|e| persistence_error("History store poisoned", e))?;
        *doc = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, secret: &str, reveal: bool) -> HistoryEntry {
        HistoryEntry::new(name, &codec::normalize(secret).unwrap(), reveal)
    }

    // ── Migration ────────────────────────────────────────────────

    #[test]
    fn parses_current_shape() {
        let original = vec![entry("Work", "JBSWY3DP", true), entry("Home", "MZXW6", false)];
        let json = render_history_json(&original).unwrap();
        let loaded = parse_history_json(&json).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn migrates_legacy_show_seed() {
        let json = r#"[
            {"id": "a1", "name": "Old", "fullSecret": "jbsw y3dp", "showSeed": true,
             "createdAt": "2023-04-01T12:00:00.000Z"}
        ]"#;
        let loaded = parse_history_json(json).unwrap();
        assert_eq!(loaded.len(), 1);
        let e = &loaded[0];
        assert_eq!(e.id, "a1");
        assert_eq!(e.display_name, "Old");
        assert_eq!(e.secret, "JBSWY3DP");
        assert!(e.reveal_secret);
        assert_eq!(e.created_at.to_rfc3339(), "2023-04-01T12:00:00+00:00");
    }

    #[test]
    fn migrates_legacy_hide_secret() {
        let json = r#"[
            {"id": "a", "name": "A", "fullSecret": "JBSWY3DP", "hideSecret": false},
            {"id": "b", "name": "B", "fullSecret": "MZXW6", "hideSecret": true},
            {"id": "c", "name": "C", "fullSecret": "MY"}
        ]"#;
        let loaded = parse_history_json(json).unwrap();
        let reveals: Vec<bool> = loaded.iter().map(|e| e.reveal_secret).collect();
        assert_eq!(reveals, vec![true, false, false]);
    }

    #[test]
    fn reveal_flag_precedence() {
        let json = r#"[
            {"id": "a", "secret": "JBSWY3DP", "revealSecret": false, "showSeed": true, "hideSecret": false},
            {"id": "b", "secret": "MZXW6", "showSeed": false, "hideSecret": false}
        ]"#;
        let loaded = parse_history_json(json).unwrap();
        assert!(!loaded[0].reveal_secret);
        assert!(!loaded[1].reveal_secret);
    }

    #[test]
    fn fills_missing_fields() {
        let json = r#"[{"fullSecret": "JBSWY3DP"}, {"secret": "MZXW6", "name": "  "}]"#;
        let loaded = parse_history_json(json).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(!loaded[0].id.is_empty());
        assert_eq!(loaded[0].display_name, "Query 1");
        assert_eq!(loaded[1].display_name, "Query 2");
    }

    #[test]
    fn skips_bad_records() {
        let json = r#"[
            {"id": "ok", "secret": "JBSWY3DP"},
            {"id": "bad", "secret": "not base32!"},
            {"id": "nosecret"},
            42
        ]"#;
        let loaded = parse_history_json(json).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "ok");
    }

    #[test]
    fn rejects_non_array_document() {
        let err = parse_history_json(r#"{"entries": []}"#).unwrap_err();
        assert_eq!(err.kind, TotpErrorKind::PersistenceError);
        assert!(parse_history_json("not json").is_err());
    }

    // ── JsonFileStore ────────────────────────────────────────────

    #[test]
    fn file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("history.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn file_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");
        let store = JsonFileStore::new(&path);
        let entries = vec![entry("One", "JBSWY3DP", false)];
        store.save(&entries).unwrap();
        assert!(path.exists());
        assert!(!store.temp_path().exists());
        assert_eq!(store.load().unwrap(), entries);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"displayName\": \"One\""));
    }

    #[test]
    fn file_store_purge_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("history.json"));
        store.save(&[entry("One", "JBSWY3DP", false)]).unwrap();
        store.purge().unwrap();
        assert!(!store.path().exists());
        store.purge().unwrap();
    }

    #[test]
    fn file_store_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{{{").unwrap();
        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert_eq!(err.kind, TotpErrorKind::PersistenceError);
    }

    #[test]
    fn file_store_empty_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "  \n").unwrap();
        assert!(JsonFileStore::new(&path).load().unwrap().is_empty());
    }

    // ── MemoryStore ──────────────────────────────────────────────

    #[test]
    fn memory_store_round_trip_and_purge() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_empty());
        assert!(store.raw_json().is_none());

        let entries = vec![entry("One", "JBSWY3DP", true)];
        store.save(&entries).unwrap();
        assert_eq!(store.load().unwrap(), entries);

        store.purge().unwrap();
        assert!(store.raw_json().is_none());
    }

    #[test]
    fn memory_store_migrates_raw_legacy_json() {
        let store = MemoryStore::with_raw_json(r#"[{"id":"x","name":"L","fullSecret":"MZXW6","showSeed":true}]"#);
        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].display_name, "L");
        assert!(loaded[0].reveal_secret);
    }
}
