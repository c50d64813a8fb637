use std::path::{Path, PathBuf};

use crate::error::SessionStoreError;

pub const DATA_DIR_NAME: &str = ".chat_session";

const RECORD_EXTENSION: &str = "json";

/// Persistence root under `home`, or under the working directory when unknown.
#[must_use]
pub fn default_data_dir(home: Option<&Path>) -> PathBuf {
    match home {
        Some(home) => home.join(DATA_DIR_NAME),
        None => PathBuf::from(DATA_DIR_NAME),
    }
}

/// File name that backs `key` in a file store.
pub fn key_file_name(key: &str) -> Result<String, SessionStoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(SessionStoreError::InvalidKey {
            key: key.to_string(),
        });
    }

    Ok(format!("{key}.{RECORD_EXTENSION}"))
}
