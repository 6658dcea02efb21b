//! Whole-document JSON store.
//!
//! The web application keeps its data in a single JSON object on disk, one
//! array per collection (`users`, `enrollments`, `notifications`, ...) plus a
//! shared `lastId` counter. This module reads and writes that document as a
//! whole; callers mutate the collections they own and leave the rest alone.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::io::Write;
use tracing::{debug, trace};

use crate::utils::fs::{ensure_parent_dir, io_error};
use crate::{Error, Result};

/// Key of the shared id counter.
pub const LAST_ID_KEY: &str = "lastId";

/// In-memory representation of the whole data document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document. The root must be a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(Error::validation(format!(
                "data document root must be an object, found {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Records of a collection; empty when the collection is missing or not an array.
    pub fn collection(&self, name: &str) -> &[Value] {
        match self.0.get(name) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Mutable records of a collection, creating an empty array when the key
    /// is missing or `null`. Any other non-array value is left in place and
    /// reported as an error.
    pub fn collection_mut(&mut self, name: &str) -> Result<&mut Vec<Value>> {
        let entry = self.0.entry(name.to_string()).or_insert(Value::Null);
        if entry.is_null() {
            *entry = Value::Array(Vec::new());
        }
        match entry {
            Value::Array(items) => Ok(items),
            other => Err(Error::validation(format!(
                "collection `{name}` must be an array, found {}",
                json_type_name(other)
            ))),
        }
    }

    /// Bump the shared `lastId` counter and return the new value.
    pub fn next_id(&mut self) -> i64 {
        let next = self.last_id() + 1;
        self.0.insert(LAST_ID_KEY.to_string(), Value::from(next));
        next
    }

    pub fn last_id(&self) -> i64 {
        self.0.get(LAST_ID_KEY).and_then(Value::as_i64).unwrap_or(0)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Load/save access to the data document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the whole document.
    async fn load(&self) -> Result<Document>;

    /// Replace the whole document.
    async fn save(&self, document: &Document) -> Result<()>;
}

/// Document persisted as a pretty-printed JSON file.
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
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn load(&self) -> Result<Document> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Data file missing; starting with an empty document");
                return Ok(Document::new());
            }
            Err(e) => return Err(io_error("reading data file", &self.path, e)),
        };

        if raw.trim().is_empty() {
            return Ok(Document::new());
        }

        let value: Value = serde_json::from_str(&raw)?;
        Document::from_value(value)
    }

    async fn save(&self, document: &Document) -> Result<()> {
        ensure_parent_dir(&self.path).await?;

        let mut bytes = serde_json::to_vec_pretty(&document.0)?;
        bytes.push(b'\n');

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| Error::Other(format!("data file writer task failed: {e}")))??;

        trace!(path = %self.path.display(), "Data document saved");
        Ok(())
    }
}

/// Write to a temporary file next to `path`, then rename it into place so a
/// crash never leaves a truncated document behind.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| io_error("creating temporary data file", dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| io_error("writing temporary data file", tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| io_error("syncing temporary data file", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| io_error("replacing data file", path, e.error))?;
    Ok(())
}

/// Document kept in process memory. Used by tests and embedded setups.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    document: Mutex<Document>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: Document) -> Self {
        Self {
            document: Mutex::new(document),
        }
    }

    /// Current document contents.
    pub fn snapshot(&self) -> Document {
        self.document.lock().clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load(&self) -> Result<Document> {
        Ok(self.document.lock().clone())
    }

    async fn save(&self, document: &Document) -> Result<()> {
        *self.document.lock() = document.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_mut_creates_missing_or_null() {
        let mut doc = Document::from_value(json!({ "users": [] })).unwrap();
        doc.collection_mut("notifications").unwrap().push(json!({ "id": 1 }));
        assert_eq!(doc.collection("notifications").len(), 1);

        let mut doc = Document::from_value(json!({ "notifications": null })).unwrap();
        doc.collection_mut("notifications").unwrap().push(json!({ "id": 1 }));
        assert_eq!(doc.collection("notifications").len(), 1);
    }

    #[test]
    fn test_collection_mut_rejects_non_array() {
        let mut doc = Document::from_value(json!({ "notifications": "oops" })).unwrap();
        assert!(doc.collection("notifications").is_empty());

        let err = doc.collection_mut("notifications").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(doc.get("notifications"), Some(&json!("oops")));
    }

    #[test]
    fn test_next_id_shares_counter() {
        let mut doc = Document::from_value(json!({ "lastId": 41, "users": [] })).unwrap();
        assert_eq!(doc.next_id(), 42);
        assert_eq!(doc.next_id(), 43);
        assert_eq!(doc.get(LAST_ID_KEY), Some(&json!(43)));
    }

    #[test]
    fn test_non_object_root_rejected() {
        assert!(Document::from_value(json!([1, 2])).is_err());
        assert_eq!(Document::from_value(Value::Null).unwrap(), Document::new());
    }

    #[tokio::test]
    async fn test_json_file_missing_or_blank_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("server-data.json"));
        assert_eq!(store.load().await.unwrap(), Document::new());

        std::fs::write(store.path(), "  \n").unwrap();
        assert_eq!(store.load().await.unwrap(), Document::new());
    }

    #[tokio::test]
    async fn test_json_file_save_preserves_other_collections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("server-data.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{ "users": [{ "id": 1, "email": "admin@school.test" }], "notifications": [], "lastId": 1 }"#,
        )
        .unwrap();

        let store = JsonFileStore::new(&path);
        let mut doc = store.load().await.unwrap();
        let id = doc.next_id();
        doc.collection_mut("notifications").unwrap().push(json!({ "id": id }));
        store.save(&doc).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  \"users\""));
        let saved: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(saved["users"][0]["email"], "admin@school.test");
        assert_eq!(saved["notifications"][0]["id"], 2);
        assert_eq!(saved["lastId"], 2);

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_json_file_invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server-data.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryDocumentStore::new();
        let mut doc = store.load().await.unwrap();
        doc.collection_mut("notifications").unwrap().push(json!({ "id": 1 }));
        store.save(&doc).await.unwrap();

        assert_eq!(store.snapshot().collection("notifications").len(), 1);
    }
}
