//! JSON state files on disk, in the persisted record layout.

use std::fs;
use std::path::Path;

use pharmakon_core::{AnyState, StateRecord, export_json, import_any, import_json};

use crate::error::{Result, StoreError};
use crate::store::Store;

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| StoreError::InvalidData(format!("failed to read {}: {e}", path.display())))
}

fn write(path: &Path, json: &str) -> Result<()> {
    fs::write(path, json)
        .map_err(|e| StoreError::InvalidData(format!("failed to write {}: {e}", path.display())))
}

pub fn save_state_file<S: StateRecord>(state: &S, path: &Path) -> Result<()> {
    write(path, &export_json(state)?)
}

pub fn load_state_file<S: StateRecord>(path: &Path) -> Result<S> {
    Ok(import_json(&read(path)?)?)
}

/// Load a state file whose shape is inferred from its contents.
pub fn load_any_file(path: &Path) -> Result<AnyState> {
    Ok(import_any(&read(path)?)?)
}

pub fn any_to_json(state: &AnyState) -> Result<String> {
    serde_json::to_string_pretty(&state.to_json_value())
        .map_err(|e| StoreError::InvalidData(format!("JSON export failed: {e}")))
}

impl Store {
    /// Import a state file as a new record; returns its id.
    pub fn import_state_file(&self, label: &str, path: &Path) -> Result<String> {
        let state = load_any_file(path)?;
        self.save_record(label, &state)
    }

    pub fn export_record_json(&self, id: &str) -> Result<String> {
        any_to_json(&self.load_record(id)?.state)
    }

    pub fn export_record_file(&self, id: &str, path: &Path) -> Result<()> {
        write(path, &self.export_record_json(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharmakon_core::{MinimalState, MultiDomainState, RefinedState};

    #[test]
    fn test_state_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let st = RefinedState::new(0.8, 0.9, 0.3, 0.4).unwrap();
        save_state_file(&st, &path).unwrap();

        assert_eq!(load_state_file::<RefinedState>(&path).unwrap(), st);
        assert_eq!(load_any_file(&path).unwrap(), AnyState::Refined(st));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_any_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(msg) if msg.contains("nope.json")));
    }

    #[test]
    fn test_bad_contents_are_model_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"S": 0.5, "Bogus": 1.0}"#).unwrap();
        assert!(matches!(
            load_state_file::<MinimalState>(&path),
            Err(StoreError::Model(_))
        ));
    }

    #[test]
    fn test_import_then_export_record() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.json");
        let dst = dir.path().join("out.json");
        let st = MultiDomainState::builder()
            .set("Fear", 0.8)
            .delusionality(0.5)
            .build()
            .unwrap();
        save_state_file(&st, &src).unwrap();

        let store = Store::open_in_memory().unwrap();
        let id = store.import_state_file("imported", &src).unwrap();
        store.export_record_file(&id, &dst).unwrap();

        assert_eq!(load_state_file::<MultiDomainState>(&dst).unwrap(), st);
        assert!(store.export_record_json(&id).unwrap().contains("\"10.0\""));
    }
}
