//! Read-mostly model index over a swappable coordinate catalog.

use super::catalog::CoordinateCatalog;
use super::{CoordinateIndex, ModelArchiveCoordinateAdvisor};
use crate::config::IndexConfig;
use crate::coordinates::{find_closest, ModelCoordinate, ProjectCoordinate, Version};
use crate::error::{ModelsError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Default [`CoordinateIndex`] backed by a [`CoordinateCatalog`] in `index_dir`.
///
/// Queries clone the current catalog pointer under a read lock and run
/// without holding it. `update_index` and `close` replace the pointer under
/// the write lock, so a query sees either the old or the new catalog.
/// Queries on a closed index return empty results.
pub struct ModelIndex {
    index_dir: RwLock<PathBuf>,
    catalog: RwLock<Option<Arc<CoordinateCatalog>>>,
}

impl ModelIndex {
    /// A closed index over `index_dir`. Call `open` before querying.
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: RwLock::new(index_dir.into()),
            catalog: RwLock::new(None),
        }
    }

    pub fn index_dir(&self) -> PathBuf {
        self.index_dir
            .read()
            .map(|dir| dir.clone())
            .unwrap_or_default()
    }

    pub fn is_accessible(&self) -> bool {
        self.current().is_some()
    }

    /// Open the catalog found in `dir` and make it the active one.
    ///
    /// The new catalog is opened before the write lock is taken; on failure
    /// the current catalog stays active.
    pub fn update_index(&self, dir: &Path) -> Result<()> {
        let catalog = Arc::new(CoordinateCatalog::open(
            dir.join(IndexConfig::CATALOG_FILE_NAME),
        )?);
        self.swap(Some(catalog))?;
        if let Ok(mut index_dir) = self.index_dir.write() {
            *index_dir = dir.to_path_buf();
        }
        info!("Model index now serving {}", dir.display());
        Ok(())
    }

    fn swap(
        &self,
        catalog: Option<Arc<CoordinateCatalog>>,
    ) -> Result<Option<Arc<CoordinateCatalog>>> {
        let mut guard = self.catalog.write().map_err(|_| ModelsError::Database {
            message: "Index lock poisoned".to_string(),
            source: None,
        })?;
        Ok(std::mem::replace(&mut *guard, catalog))
    }

    fn current(&self) -> Option<Arc<CoordinateCatalog>> {
        self.catalog.read().ok().and_then(|guard| guard.clone())
    }

    fn to_model_coordinates(raw: Vec<String>) -> BTreeSet<ModelCoordinate> {
        raw.iter()
            .filter_map(|s| match ModelCoordinate::value_of(s) {
                Ok(mc) => Some(mc),
                Err(e) => {
                    warn!("Skipping malformed catalog entry: {}", e);
                    None
                }
            })
            .collect()
    }

    fn project_coordinate_from(raw: Option<String>) -> Option<ProjectCoordinate> {
        let raw = raw?;
        match ProjectCoordinate::value_of(&raw) {
            Ok(pc) => Some(pc),
            Err(e) => {
                warn!("Skipping malformed catalog entry: {}", e);
                None
            }
        }
    }
}

impl ModelArchiveCoordinateAdvisor for ModelIndex {
    fn suggest(&self, pc: &ProjectCoordinate, model_type: &str) -> Option<ModelCoordinate> {
        let candidates = self.suggest_candidates(pc, model_type);
        if candidates.is_empty() {
            return None;
        }

        let reference = Version::value_of(pc.version()).unwrap_or_else(|_| {
            debug!("Unparseable version in {}, matching against 0.0.0", pc);
            Version::default()
        });
        let versioned: Vec<(Version, &ModelCoordinate)> = candidates
            .iter()
            .filter_map(|mc| Version::value_of(mc.version()).ok().map(|v| (v, mc)))
            .collect();

        let closest = find_closest(&reference, versioned.iter().map(|(v, _)| v))?;
        versioned
            .into_iter()
            .find(|(v, _)| *v == closest)
            .map(|(_, mc)| mc.clone())
    }

    fn suggest_candidates(
        &self,
        pc: &ProjectCoordinate,
        model_type: &str,
    ) -> BTreeSet<ModelCoordinate> {
        let Some(catalog) = self.current() else {
            debug!("Index not open, no candidates for {}", pc);
            return BTreeSet::new();
        };
        match catalog.find_model_candidates(pc.group_id(), pc.artifact_id(), model_type) {
            Ok(raw) => Self::to_model_coordinates(raw),
            Err(e) => {
                warn!("Candidate query for {} failed: {}", pc, e);
                BTreeSet::new()
            }
        }
    }
}

impl CoordinateIndex for ModelIndex {
    fn open(&self) -> Result<()> {
        let dir = self.index_dir();
        let catalog = Arc::new(CoordinateCatalog::open(
            dir.join(IndexConfig::CATALOG_FILE_NAME),
        )?);
        self.swap(Some(catalog))?;
        debug!("Opened model index at {}", dir.display());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.swap(None)?.is_some() {
            debug!("Closed model index");
        }
        Ok(())
    }

    fn get_known_models(&self, model_type: &str) -> BTreeSet<ModelCoordinate> {
        let Some(catalog) = self.current() else {
            return BTreeSet::new();
        };
        match catalog.find_by_classifier(model_type) {
            Ok(raw) => Self::to_model_coordinates(raw),
            Err(e) => {
                warn!("Searching index failed: {}", e);
                BTreeSet::new()
            }
        }
    }

    fn suggest_project_coordinate_by_artifact_id(
        &self,
        artifact_id: &str,
    ) -> Option<ProjectCoordinate> {
        let catalog = self.current()?;
        match catalog.find_project_by_symbolic_name(artifact_id) {
            Ok(raw) => Self::project_coordinate_from(raw),
            Err(e) => {
                warn!("Symbolic name lookup failed: {}", e);
                None
            }
        }
    }

    fn suggest_project_coordinate_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Option<ProjectCoordinate> {
        let catalog = self.current()?;
        match catalog.find_project_by_fingerprint(fingerprint) {
            Ok(raw) => Self::project_coordinate_from(raw),
            Err(e) => {
                warn!("Fingerprint lookup failed: {}", e);
                None
            }
        }
    }
}
