//! Persistence and configuration around `pharmakon-core`: JSON state files,
//! a SQLite log of labelled records, and TOML model configuration.

pub mod config;
pub mod error;
pub mod json_bridge;
pub mod schema;
pub mod store;

pub use config::Config;
pub use error::{Result, StoreError};
pub use json_bridge::{any_to_json, load_any_file, load_state_file, save_state_file};
pub use store::{RecordMeta, Store, StoredRecord, default_base_dir};
