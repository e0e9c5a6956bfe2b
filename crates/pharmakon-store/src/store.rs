use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use uuid::Uuid;

use pharmakon_core::{AnyState, StateRecord, StateShape};

use crate::error::{Result, StoreError};
use crate::schema;

pub const DB_FILE: &str = "pharmakon.db";

/// Default base directory for the record log and config.
pub fn default_base_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".pharmakon")
}

/// Listing row for a saved record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecordMeta {
    pub id: String,
    pub label: String,
    pub shape: StateShape,
    pub created_at: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredRecord {
    pub meta: RecordMeta,
    pub state: AnyState,
}

/// Append-mostly log of labelled state records.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Open `<base>/pharmakon.db`, creating the directory if needed.
    pub fn open_in_dir(base: &Path) -> Result<Self> {
        fs::create_dir_all(base).map_err(|e| {
            StoreError::InvalidData(format!("failed to create {}: {e}", base.display()))
        })?;
        let path = base.join(DB_FILE);
        tracing::debug!(path = %path.display(), "opening record store");
        Self::open(&path)
    }

    // --- Save ---

    /// Store a record under a fresh id and return the id.
    pub fn save_record(&self, label: &str, state: &AnyState) -> Result<String> {
        self.insert(label, state.shape(), &state.to_map())
    }

    pub fn save<S: StateRecord>(&self, label: &str, state: &S) -> Result<String> {
        self.insert(label, S::SHAPE, &state.to_map())
    }

    fn insert(&self, label: &str, shape: StateShape, values: &BTreeMap<String, f64>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO records (id, label, shape) VALUES (?1, ?2, ?3)",
            params![id, label, shape.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO record_values (record_id, name, value) VALUES (?1, ?2, ?3)",
            )?;
            for (name, value) in values {
                stmt.execute(params![id, name, value])?;
            }
        }
        tx.commit()?;

        tracing::info!(%id, label, shape = shape.as_str(), "saved record");
        Ok(id)
    }

    // --- Load ---

    pub fn load_record(&self, id: &str) -> Result<StoredRecord> {
        let meta = self
            .conn
            .query_row(
                "SELECT id, label, shape, created_at FROM records WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let meta = to_meta(meta)?;

        let mut stmt = self
            .conn
            .prepare("SELECT name, value FROM record_values WHERE record_id = ?1")?;
        let values: BTreeMap<String, f64> = stmt
            .query_map([id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        let state = AnyState::from_map(meta.shape, &values)?;
        Ok(StoredRecord { meta, state })
    }

    /// Load a record that must have shape `S`.
    pub fn load<S: StateRecord>(&self, id: &str) -> Result<S> {
        let record = self.load_record(id)?;
        if record.meta.shape != S::SHAPE {
            return Err(StoreError::InvalidData(format!(
                "record {id} is {}, not {}",
                record.meta.shape.as_str(),
                S::SHAPE.as_str()
            )));
        }
        Ok(S::from_map(&record.state.to_map())?)
    }

    /// All records, oldest first.
    pub fn list_records(&self) -> Result<Vec<RecordMeta>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, label, shape, created_at FROM records ORDER BY rowid")?;
        let rows: Vec<(String, String, String, String)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<std::result::Result<_, _>>()?;
        rows.into_iter().map(to_meta).collect()
    }

    pub fn delete_record(&self, id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM record_values WHERE record_id = ?1", [id])?;
        let removed = tx.execute("DELETE FROM records WHERE id = ?1", [id])?;
        if removed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        tx.commit()?;
        tracing::info!(%id, "deleted record");
        Ok(())
    }
}

fn to_meta((id, label, shape, created_at): (String, String, String, String)) -> Result<RecordMeta> {
    let shape = StateShape::parse(&shape)
        .ok_or_else(|| StoreError::InvalidData(format!("record {id} has unknown shape {shape}")))?;
    Ok(RecordMeta {
        id,
        label,
        shape,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharmakon_core::{MinimalState, MultiDomainState, RefinedState};

    #[test]
    fn test_save_and_load_minimal() {
        let store = Store::open_in_memory().unwrap();
        let st = MinimalState::new(0.85, 0.75, 0.85).unwrap();
        let id = store.save("worked example", &st).unwrap();

        let record = store.load_record(&id).unwrap();
        assert_eq!(record.meta.label, "worked example");
        assert_eq!(record.meta.shape, StateShape::Minimal);
        assert_eq!(record.state, AnyState::Minimal(st));
        assert_eq!(store.load::<MinimalState>(&id).unwrap(), st);
    }

    #[test]
    fn test_values_are_exact() {
        let store = Store::open_in_memory().unwrap();
        let st = RefinedState::new(0.1 + 0.2, 1.0 / 3.0, 0.3, 2.0f64.sqrt() / 2.0).unwrap();
        let id = store.save("", &st).unwrap();
        assert_eq!(store.load::<RefinedState>(&id).unwrap(), st);
    }

    #[test]
    fn test_load_wrong_shape() {
        let store = Store::open_in_memory().unwrap();
        let id = store.save("md", &MultiDomainState::default()).unwrap();
        assert!(matches!(
            store.load::<MinimalState>(&id),
            Err(StoreError::InvalidData(_))
        ));
    }

    #[test]
    fn test_list_in_insertion_order() {
        let store = Store::open_in_memory().unwrap();
        let a = store.save("a", &MinimalState::default()).unwrap();
        let b = store
            .save_record("b", &AnyState::MultiDomain(MultiDomainState::default()))
            .unwrap();

        let listed = store.list_records().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, a);
        assert_eq!(listed[1].id, b);
        assert_eq!(listed[1].shape, StateShape::MultiDomain);
        assert!(!listed[0].created_at.is_empty());
    }

    #[test]
    fn test_delete_record() {
        let store = Store::open_in_memory().unwrap();
        let id = store.save("gone", &MinimalState::default()).unwrap();
        store.delete_record(&id).unwrap();
        assert!(store.list_records().unwrap().is_empty());
        assert!(matches!(store.load_record(&id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete_record(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_open_in_dir_persists() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested");
        let id = {
            let store = Store::open_in_dir(&base).unwrap();
            store.save("kept", &MinimalState::default()).unwrap()
        };
        assert!(base.join(DB_FILE).exists());
        let store = Store::open_in_dir(&base).unwrap();
        assert_eq!(store.load_record(&id).unwrap().meta.label, "kept");
    }

    #[test]
    fn test_open_rejects_newer_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DB_FILE);
        drop(Store::open(&path).unwrap());
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute(
                "UPDATE metadata SET value = '2' WHERE key = 'schema_version'",
                [],
            )
            .unwrap();
        }
        let err = Store::open(&path).err().unwrap();
        assert!(matches!(err, StoreError::InvalidData(ref msg) if msg.contains("newer")));
    }
}
