//! Model index: project coordinate + model type to model archive coordinates.
//!
//! The index is a SQLite catalog built from [`CatalogDocument`]s. It is
//! read-heavy; a rebuilt catalog is swapped in atomically.

mod catalog;
mod model_index;
mod query;

pub use catalog::{CatalogDocument, CoordinateCatalog};
pub use model_index::ModelIndex;

use crate::coordinates::{ModelCoordinate, ProjectCoordinate};
use crate::error::Result;
use std::collections::BTreeSet;

/// Suggests model archives for a project.
pub trait ModelArchiveCoordinateAdvisor: Send + Sync {
    /// The candidate whose version is closest to `pc`'s version.
    fn suggest(&self, pc: &ProjectCoordinate, model_type: &str) -> Option<ModelCoordinate>;

    /// All model archives of `model_type` for any version of `pc`'s group and artifact.
    fn suggest_candidates(&self, pc: &ProjectCoordinate, model_type: &str)
        -> BTreeSet<ModelCoordinate>;
}

/// A searchable index of model archives with reverse lookups.
pub trait CoordinateIndex: ModelArchiveCoordinateAdvisor {
    fn open(&self) -> Result<()>;
    fn close(&self) -> Result<()>;

    fn get_known_models(&self, model_type: &str) -> BTreeSet<ModelCoordinate>;

    /// Project identified by an OSGi symbolic name.
    fn suggest_project_coordinate_by_artifact_id(&self, artifact_id: &str)
        -> Option<ProjectCoordinate>;

    /// Project identified by the SHA-256 digest of one of its jars.
    fn suggest_project_coordinate_by_fingerprint(&self, fingerprint: &str)
        -> Option<ProjectCoordinate>;
}
