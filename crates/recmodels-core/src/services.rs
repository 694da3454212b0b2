//! Explicit context object wiring the index, repository, mapping and
//! providers together for one base directory.

use crate::config::{IndexConfig, ModelsSettings, RepositoryConfig};
use crate::error::{ModelsError, Result};
use crate::index::{CoordinateIndex, ModelIndex};
use crate::mapping::{
    FingerprintStrategy, JreExecutionEnvironmentStrategy, MappingProvider,
    MavenPomPropertiesStrategy, OsgiManifestStrategy, ProjectCoordinateResolver,
};
use crate::provider::{
    spawn_event_listener, ModelLoader, PoolKey, PoolSettings, PoolingModelProvider,
    SimpleModelProvider,
};
use crate::repository::{layout, ModelArchiveRepository, ModelRepository, Transport};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Builder for [`ModelServices`].
///
/// # Example
///
/// ```rust,ignore
/// use recmodels_core::ModelServices;
///
/// let services = ModelServices::builder("/var/lib/recmodels")
///     .remote_url("https://download.example.org/models/")
///     .auto_create_dirs(true)
///     .build()?;
/// services.open().await?;
/// ```
pub struct ModelServicesBuilder {
    basedir: PathBuf,
    settings: ModelsSettings,
    remote_url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    auto_create_dirs: bool,
    handle: Option<Handle>,
}

impl ModelServicesBuilder {
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
            settings: ModelsSettings::default(),
            remote_url: None,
            transport: None,
            auto_create_dirs: false,
            handle: None,
        }
    }

    pub fn settings(mut self, settings: ModelsSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Overrides the remote from the settings.
    pub fn remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    /// Use this transport instead of one chosen from the remote URL.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Create `basedir`, `repository/` and `index/` if missing.
    ///
    /// Default: `false` (the base directory must exist)
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Runtime for downloads and event listeners. Defaults to the current one.
    pub fn handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn build(self) -> Result<ModelServices> {
        let repository_dir = self.basedir.join(RepositoryConfig::REPOSITORY_DIR_NAME);
        let index_dir = self.basedir.join(RepositoryConfig::INDEX_DIR_NAME);

        if self.auto_create_dirs {
            for dir in [&self.basedir, &repository_dir] {
                std::fs::create_dir_all(dir).map_err(|e| ModelsError::Io {
                    message: format!("Failed to create directory: {}", dir.display()),
                    path: Some(dir.clone()),
                    source: Some(e),
                })?;
            }
        } else if !self.basedir.is_dir() {
            return Err(ModelsError::Config {
                message: format!("Base directory does not exist: {}", self.basedir.display()),
            });
        }

        let handle = match self.handle {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| ModelsError::Config {
                message: format!("No tokio runtime available: {}", e),
            })?,
        };

        let mut settings = self.settings;
        if let Some(url) = self.remote_url {
            settings.remote_url = url;
        }

        let repository = match self.transport {
            Some(transport) => {
                ModelRepository::with_transport(&repository_dir, settings.clone(), transport, handle.clone())?
            }
            None => ModelRepository::new(&repository_dir, settings.clone(), handle.clone())?,
        };

        let index = Arc::new(ModelIndex::new(&index_dir));
        repository.set_advisor(index.clone());

        let strategies: Vec<Arc<dyn ProjectCoordinateResolver>> = vec![
            Arc::new(MavenPomPropertiesStrategy),
            Arc::new(OsgiManifestStrategy),
            Arc::new(FingerprintStrategy::new(index.clone())),
            Arc::new(JreExecutionEnvironmentStrategy),
        ];
        let mapping = Arc::new(MappingProvider::new());
        mapping.set_strategies(strategies);

        debug!("Model services configured for {}", self.basedir.display());
        Ok(ModelServices {
            basedir: self.basedir,
            settings,
            index,
            repository,
            mapping,
            handle,
        })
    }
}

/// Index, repository and mapping for one base directory.
pub struct ModelServices {
    basedir: PathBuf,
    settings: ModelsSettings,
    index: Arc<ModelIndex>,
    repository: ModelRepository,
    mapping: Arc<MappingProvider>,
    handle: Handle,
}

impl ModelServices {
    /// Start configuring services rooted at `basedir`.
    pub fn builder(basedir: impl Into<PathBuf>) -> ModelServicesBuilder {
        ModelServicesBuilder::new(basedir)
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    pub fn settings(&self) -> &ModelsSettings {
        &self.settings
    }

    /// `<basedir>/index`, where the open catalog lives.
    pub fn index_dir(&self) -> PathBuf {
        self.basedir.join(RepositoryConfig::INDEX_DIR_NAME)
    }

    pub fn index(&self) -> &Arc<ModelIndex> {
        &self.index
    }

    pub fn repository(&self) -> &ModelRepository {
        &self.repository
    }

    /// Jar to project mapping, with every built-in strategy registered.
    pub fn mapping(&self) -> &Arc<MappingProvider> {
        &self.mapping
    }

    /// Open the index, downloading it first if no catalog is present.
    ///
    /// The downloaded index is unpacked next to `index/` and moved into place
    /// only once extraction succeeded, so a failed bootstrap leaves no
    /// catalog behind.
    pub async fn open(&self) -> Result<()> {
        let index_dir = self.index_dir();
        if !index_dir.join(IndexConfig::CATALOG_FILE_NAME).is_file() {
            info!("No model index in {}, downloading it", index_dir.display());
            let archive = self
                .repository
                .resolve(&layout::index_coordinate(), false)
                .await?;
            let staging = self.unpack_staged(archive).await?;
            self.move_into_index_dir(&staging)?;
        }
        self.index.open()?;
        // Strategies backed by the index may now answer what they missed.
        self.mapping.invalidate_cache();
        info!("Model index open at {}", index_dir.display());
        Ok(())
    }

    /// Fetch the latest index archive and swap it in without interrupting
    /// queries.
    pub async fn update_index(&self) -> Result<()> {
        let archive = self
            .repository
            .resolve(&layout::index_coordinate(), true)
            .await?;

        let staging = self.unpack_staged(archive).await?;
        if let Err(e) = self.index.update_index(&staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        let index_dir = self.move_into_index_dir(&staging)?;
        self.index.update_index(&index_dir)?;
        self.mapping.invalidate_cache();
        info!("Model index updated");
        Ok(())
    }

    /// Unpack `archive` into a fresh staging directory under the base dir.
    /// Nothing is left behind on failure.
    async fn unpack_staged(&self, archive: PathBuf) -> Result<PathBuf> {
        let staging = self.basedir.join(format!(
            "{}{}",
            IndexConfig::STAGING_DIR_PREFIX,
            chrono::Utc::now().timestamp_millis()
        ));
        if let Err(e) = unpack(archive, staging.clone()).await {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }
        Ok(staging)
    }

    /// Replace `<basedir>/index` with `staging`.
    fn move_into_index_dir(&self, staging: &Path) -> Result<PathBuf> {
        let index_dir = self.index_dir();
        if index_dir.exists() {
            std::fs::remove_dir_all(&index_dir)
                .map_err(|e| ModelsError::io_with_path(e, &index_dir))?;
        }
        std::fs::rename(staging, &index_dir).map_err(|e| ModelsError::io_with_path(e, staging))?;
        Ok(index_dir)
    }

    /// Close the index and cancel pending downloads. Both steps always run.
    pub fn close(&self) -> Result<()> {
        self.repository.cancel_downloads();
        self.index.close()
    }

    /// A pooling provider for `model_type` that drops archives replaced in
    /// the repository.
    pub fn pooling_provider<K, M>(
        &self,
        model_type: &str,
        loader: Arc<dyn ModelLoader<K, M>>,
        settings: PoolSettings,
    ) -> Arc<PoolingModelProvider<K, M>>
    where
        K: PoolKey,
        M: Send + Sync + 'static,
    {
        let repository: Arc<dyn ModelArchiveRepository> = Arc::new(self.repository.clone());
        let provider = Arc::new(PoolingModelProvider::new(
            repository,
            model_type,
            loader,
            settings,
        ));
        spawn_event_listener(&self.handle, &provider, self.repository.subscribe());
        provider
    }

    /// A provider that opens the archive and loads a fresh model on every
    /// request.
    pub fn simple_provider<K, M>(
        &self,
        model_type: &str,
        loader: Arc<dyn ModelLoader<K, M>>,
    ) -> Arc<SimpleModelProvider<K, M>>
    where
        K: PoolKey,
        M: Send + Sync + 'static,
    {
        let repository: Arc<dyn ModelArchiveRepository> = Arc::new(self.repository.clone());
        let provider = Arc::new(SimpleModelProvider::new(repository, model_type, loader));
        spawn_event_listener(&self.handle, &provider, self.repository.subscribe());
        provider
    }
}

async fn unpack(archive: PathBuf, dest: PathBuf) -> Result<usize> {
    tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
        .await
        .map_err(|e| ModelsError::Other(format!("Unpack task failed: {}", e)))?
}

/// Extract `archive` into `dest`, skipping entries that would escape it.
fn extract_zip(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path).map_err(|e| ModelsError::io_with_path(e, archive_path))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| ModelsError::archive(archive_path, format!("Invalid zip archive: {}", e)))?;
    std::fs::create_dir_all(dest).map_err(|e| ModelsError::io_with_path(e, dest))?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| {
            ModelsError::archive(archive_path, format!("Failed to read entry {}: {}", i, e))
        })?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe entry {} in {}", entry.name(), archive_path.display());
            continue;
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| ModelsError::io_with_path(e, &outpath))?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ModelsError::io_with_path(e, parent))?;
        }
        let mut outfile =
            File::create(&outpath).map_err(|e| ModelsError::io_with_path(e, &outpath))?;
        std::io::copy(&mut entry, &mut outfile).map_err(|e| ModelsError::io_with_path(e, &outpath))?;
        extracted += 1;
    }
    debug!("Extracted {} files from {}", extracted, archive_path.display());
    Ok(extracted)
}
