//! Turning archive entries into model objects.

use super::archive::ModelArchive;
use crate::coordinates::ArchiveEntry;
use crate::error::{ModelsError, Result};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Builds the model for `key` from an open archive.
///
/// `Ok(None)` means the archive has no model for the key.
pub trait ModelLoader<K, M>: Send + Sync {
    fn load_model(&self, archive: &mut ModelArchive, key: &K) -> Result<Option<M>>;
}

impl<K, M, F> ModelLoader<K, M> for F
where
    F: Fn(&mut ModelArchive, &K) -> Result<Option<M>> + Send + Sync,
{
    fn load_model(&self, archive: &mut ModelArchive, key: &K) -> Result<Option<M>> {
        self(archive, key)
    }
}

/// Loads `<archive entry of key>.json` and deserializes it.
pub struct JsonModelLoader<M> {
    suffix: String,
    _model: PhantomData<fn() -> M>,
}

impl<M> Default for JsonModelLoader<M> {
    fn default() -> Self {
        Self {
            suffix: ".json".to_string(),
            _model: PhantomData,
        }
    }
}

impl<M> JsonModelLoader<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn entry_name<K: ArchiveEntry>(&self, key: &K) -> String {
        format!("{}{}", key.archive_entry(), self.suffix)
    }
}

impl<K, M> ModelLoader<K, M> for JsonModelLoader<M>
where
    K: ArchiveEntry,
    M: DeserializeOwned,
{
    fn load_model(&self, archive: &mut ModelArchive, key: &K) -> Result<Option<M>> {
        let entry = self.entry_name(key);
        let Some(bytes) = archive.read_entry(&entry)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ModelsError::ModelLoad {
                key: entry,
                message: e.to_string(),
            })
    }
}
