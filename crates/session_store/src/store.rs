use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::SessionStoreError;
use crate::kv::KeyValueStore;
use crate::schema::{SettingsRecord, StoredMessage};

/// Key holding the JSON array of transcript messages.
pub const TRANSCRIPT_KEY: &str = "chat_messages";
/// Key holding the JSON settings object.
pub const SETTINGS_KEY: &str = "settings";

/// Typed access to the transcript and settings records.
pub struct SessionStore {
    backend: Box<dyn KeyValueStore>,
}

impl SessionStore {
    #[must_use]
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Absent record loads as an empty transcript.
    pub fn load_transcript(&self) -> Result<Vec<StoredMessage>, SessionStoreError> {
        Ok(self.read_json(TRANSCRIPT_KEY)?.unwrap_or_default())
    }

    pub fn save_transcript(&self, messages: &[StoredMessage]) -> Result<(), SessionStoreError> {
        self.write_json(TRANSCRIPT_KEY, messages)
    }

    pub fn clear_transcript(&self) -> Result<(), SessionStoreError> {
        self.backend.remove(TRANSCRIPT_KEY)
    }

    /// `None` when no settings were ever saved.
    pub fn load_settings(&self) -> Result<Option<SettingsRecord>, SessionStoreError> {
        self.read_json(SETTINGS_KEY)
    }

    pub fn save_settings(&self, settings: &SettingsRecord) -> Result<(), SessionStoreError> {
        self.write_json(SETTINGS_KEY, settings)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionStoreError> {
        let Some(bytes) = self.backend.get(key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| SessionStoreError::malformed(key, source))
    }

    fn write_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), SessionStoreError> {
        let bytes =
            serde_json::to_vec(value).map_err(|source| SessionStoreError::serialize(key, source))?;
        self.backend.put(key, &bytes)?;
        tracing::debug!(key, bytes = bytes.len(), "persisted record");
        Ok(())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}
