//! Provider without pooling: every acquire loads a fresh model.

use super::archive::ModelArchive;
use super::loader::ModelLoader;
use super::{ArchiveInstallListener, ModelProvider, PoolKey};
use crate::coordinates::ModelCoordinate;
use crate::error::{ModelsError, Result};
use crate::repository::ModelArchiveRepository;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

type SharedArchive = Arc<Mutex<ModelArchive>>;

/// Keeps one open archive per coordinate and builds a new model on every
/// acquire. Released models are simply dropped.
pub struct SimpleModelProvider<K, M> {
    repository: Arc<dyn ModelArchiveRepository>,
    model_type: String,
    loader: Arc<dyn ModelLoader<K, M>>,
    archives: Mutex<HashMap<ModelCoordinate, SharedArchive>>,
    archive_opens: AtomicU64,
}

impl<K: PoolKey, M: Send + Sync + 'static> SimpleModelProvider<K, M> {
    pub fn new(
        repository: Arc<dyn ModelArchiveRepository>,
        model_type: impl Into<String>,
        loader: Arc<dyn ModelLoader<K, M>>,
    ) -> Self {
        Self {
            repository,
            model_type: model_type.into(),
            loader,
            archives: Mutex::new(HashMap::new()),
            archive_opens: AtomicU64::new(0),
        }
    }

    pub fn archive_opens(&self) -> u64 {
        self.archive_opens.load(Ordering::Relaxed)
    }

    fn archive_for(&self, mc: &ModelCoordinate, path: &Path) -> Result<SharedArchive> {
        let lock_error = || ModelsError::Other("Archive map lock poisoned".to_string());
        if let Some(open) = self.archives.lock().map_err(|_| lock_error())?.get(mc) {
            return Ok(open.clone());
        }

        let opened = Arc::new(Mutex::new(ModelArchive::open(path, mc.clone())?));
        self.archive_opens.fetch_add(1, Ordering::Relaxed);
        let mut archives = self.archives.lock().map_err(|_| lock_error())?;
        Ok(archives.entry(mc.clone()).or_insert(opened).clone())
    }

    fn load(&self, key: &K) -> Result<Option<Arc<M>>> {
        let Some(mc) = self
            .repository
            .find_best_model_archive(key.base(), &self.model_type)
        else {
            return Ok(None);
        };
        let Some(path) = self.repository.get_location(&mc, true) else {
            debug!("{} is not available locally yet", mc);
            return Ok(None);
        };

        let archive = self.archive_for(&mc, &path)?;
        let mut archive = archive
            .lock()
            .map_err(|_| ModelsError::archive(&path, "archive lock poisoned"))?;
        Ok(self.loader.load_model(&mut archive, key)?.map(Arc::new))
    }
}

impl<K: PoolKey, M: Send + Sync + 'static> ModelProvider<K, M> for SimpleModelProvider<K, M> {
    fn acquire_model(&self, key: &K) -> Option<Arc<M>> {
        match self.load(key) {
            Ok(model) => model,
            Err(e) => {
                warn!("Could not load {} model for {}: {}", self.model_type, key, e);
                None
            }
        }
    }

    fn release_model(&self, model: Arc<M>) {
        drop(model);
    }

    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let drained: Vec<(ModelCoordinate, SharedArchive)> = match self.archives.lock() {
            Ok(mut archives) => archives.drain().collect(),
            Err(_) => {
                return Err(ModelsError::Other("Archive map lock poisoned".to_string()));
            }
        };

        let mut first_error = None;
        for (mc, archive) in drained {
            if Arc::try_unwrap(archive).is_err() {
                let e = ModelsError::Other(format!("{} still in use while closing", mc));
                error!("{}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<K: PoolKey, M: Send + Sync + 'static> ArchiveInstallListener for SimpleModelProvider<K, M> {
    fn on_model_archive_installed(&self, mc: &ModelCoordinate) {
        if let Ok(mut archives) = self.archives.lock() {
            if archives.remove(mc).is_some() {
                debug!("Dropped replaced archive {}", mc);
            }
        }
    }
}
