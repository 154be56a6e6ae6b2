use std::fmt;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChatlistError;

/// Anything kept in a [`RecordStore`]. Ids are unique per store.
pub trait Record: Serialize + DeserializeOwned + Clone {
    fn id(&self) -> Uuid;
}

/// A selected result written to durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedResult {
    pub id: Uuid,
    /// Saved prompt this result answers, when one was recorded.
    #[serde(default)]
    pub prompt_id: Option<Uuid>,
    /// `None` when the display name no longer matches any provider.
    pub provider_id: Option<u64>,
    pub provider_name: String,
    pub prompt_text: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

impl PersistedResult {
    pub fn new(
        prompt_id: Option<Uuid>,
        provider_id: Option<u64>,
        provider_name: &str,
        prompt_text: &str,
        response: &str,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            prompt_id,
            provider_id,
            provider_name: provider_name.to_owned(),
            prompt_text: prompt_text.to_owned(),
            response: response.to_owned(),
            created_at: Utc::now(),
        }
    }
}

impl Record for PersistedResult {
    fn id(&self) -> Uuid {
        self.id
    }
}

pub trait RecordStore<T: Record> {
    fn save(&mut self, record: &T) -> Result<(), ChatlistError>;

    fn load_all(&self) -> Result<Vec<T>, ChatlistError>;

    /// Remove the record with `id`. Returns whether it existed.
    fn delete(&mut self, id: Uuid) -> Result<bool, ChatlistError>;
}

/// JSON-lines file, one record per line. Saves append; deletes rewrite the
/// file.
pub struct JsonlStore<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonlStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> fmt::Debug for JsonlStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonlStore").field("path", &self.path).finish()
    }
}

impl<T: Record> JsonlStore<T> {
    fn rewrite(&self, records: &[T]) -> Result<(), ChatlistError> {
        let mut content = String::new();
        for record in records {
            content.push_str(&encode(record)?);
        }
        let staging = self.path.with_extension("jsonl.tmp");
        std::fs::write(&staging, content).map_err(|e| {
            ChatlistError::Store(format!("cannot write {}: {e}", staging.display()))
        })?;
        std::fs::rename(&staging, &self.path).map_err(|e| {
            ChatlistError::Store(format!("cannot replace {}: {e}", self.path.display()))
        })
    }
}

fn encode<T: Serialize>(record: &T) -> Result<String, ChatlistError> {
    let mut line =
        serde_json::to_string(record).map_err(|e| ChatlistError::Store(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

impl<T: Record> RecordStore<T> for JsonlStore<T> {
    fn save(&mut self, record: &T) -> Result<(), ChatlistError> {
        let line = encode(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                ChatlistError::Store(format!("cannot open {}: {e}", self.path.display()))
            })?;
        file.write_all(line.as_bytes()).map_err(|e| {
            ChatlistError::Store(format!("cannot write {}: {e}", self.path.display()))
        })?;
        tracing::debug!(id = %record.id(), path = %self.path.display(), "record saved");
        Ok(())
    }

    /// Missing file reads as empty. Blank lines are skipped.
    fn load_all(&self) -> Result<Vec<T>, ChatlistError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ChatlistError::Store(format!(
                    "cannot open {}: {e}",
                    self.path.display()
                )));
            }
        };

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ChatlistError::Store(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                ChatlistError::Store(format!(
                    "{} line {}: {e}",
                    self.path.display(),
                    number + 1
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn delete(&mut self, id: Uuid) -> Result<bool, ChatlistError> {
        let mut records = self.load_all()?;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            return Ok(false);
        }
        self.rewrite(&records)?;
        tracing::debug!(%id, path = %self.path.display(), "record deleted");
        Ok(true)
    }
}

#[derive(Debug)]
pub struct MemoryStore<T> {
    records: Vec<T>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> RecordStore<T> for MemoryStore<T> {
    fn save(&mut self, record: &T) -> Result<(), ChatlistError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<T>, ChatlistError> {
        Ok(self.records.clone())
    }

    fn delete(&mut self, id: Uuid) -> Result<bool, ChatlistError> {
        let before = self.records.len();
        self.records.retain(|r| r.id() != id);
        Ok(self.records.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(provider: &str, response: &str) -> PersistedResult {
        PersistedResult::new(None, Some(1), provider, "why?", response)
    }

    #[test]
    fn jsonl_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::<PersistedResult>::new(dir.path().join("results.jsonl"));
        assert!(store.load_all().unwrap().is_empty());

        let first = result("GPT", "because");
        let second =
            PersistedResult::new(Some(Uuid::now_v7()), None, "Gone", "why?", "multi\nline");
        store.save(&first).unwrap();
        store.save(&second).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[test]
    fn ids_are_time_ordered() {
        let a = result("A", "r");
        let b = result("B", "r");
        assert!(a.id < b.id);
    }

    #[test]
    fn records_without_prompt_id_still_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let line = r#"{"id":"01890a5d-ac96-774b-bcce-b302099a8057","provider_id":3,"provider_name":"A","prompt_text":"p","response":"r","created_at":"2026-03-01T09:30:00Z"}"#;
        std::fs::write(&path, format!("{line}\n")).unwrap();

        let loaded: Vec<PersistedResult> = JsonlStore::new(&path).load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].prompt_id, None);
        assert_eq!(loaded[0].provider_id, Some(3));
    }

    #[test]
    fn corrupt_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        std::fs::write(&path, "\n{not json}\n").unwrap();
        let err = JsonlStore::<PersistedResult>::new(&path).load_all().unwrap_err();
        match err {
            ChatlistError::Store(msg) => assert!(msg.contains("line 2"), "{msg}"),
            other => panic!("expected Store error, got {other:?}"),
        }
    }

    #[test]
    fn jsonl_delete_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let mut store = JsonlStore::new(&path);
        let keep = result("Keep", "a");
        let gone = result("Gone", "b");
        store.save(&keep).unwrap();
        store.save(&gone).unwrap();

        assert!(store.delete(gone.id).unwrap());
        assert!(!store.delete(gone.id).unwrap());
        assert_eq!(store.load_all().unwrap(), vec![keep.clone()]);
        assert!(!path.with_extension("jsonl.tmp").exists());

        // Appends after a rewrite land on their own line.
        let later = result("Later", "c");
        store.save(&later).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![keep, later]);
    }

    #[test]
    fn delete_from_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.jsonl");
        let mut store = JsonlStore::<PersistedResult>::new(&path);
        assert!(!store.delete(Uuid::now_v7()).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn memory_store_delete() {
        let mut store = MemoryStore::new();
        let a = result("A", "1");
        store.save(&a).unwrap();
        assert!(store.delete(a.id).unwrap());
        assert!(store.load_all().unwrap().is_empty());
    }
}
