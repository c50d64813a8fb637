//! Persistence adapter for the chat session: a byte-oriented key-value store
//! plus the transcript and settings records kept under fixed keys.

mod error;
mod kv;
mod paths;
mod schema;
mod store;

pub use error::SessionStoreError;
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use paths::{default_data_dir, key_file_name, DATA_DIR_NAME};
pub use schema::{SettingsRecord, StoredMessage, StoredRole};
pub use store::{SessionStore, SETTINGS_KEY, TRANSCRIPT_KEY};
