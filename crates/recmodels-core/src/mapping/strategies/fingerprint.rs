use crate::coordinates::ProjectCoordinate;
use crate::hashing::sha256_file;
use crate::index::CoordinateIndex;
use crate::mapping::{DependencyInfo, DependencyType, ProjectCoordinateResolver};
use std::sync::Arc;
use tracing::{debug, warn};

/// Identifies a jar by the SHA-256 digest of its contents.
pub struct FingerprintStrategy {
    index: Arc<dyn CoordinateIndex>,
}

impl FingerprintStrategy {
    pub fn new(index: Arc<dyn CoordinateIndex>) -> Self {
        Self { index }
    }
}

impl ProjectCoordinateResolver for FingerprintStrategy {
    fn is_applicable(&self, kind: DependencyType) -> bool {
        kind == DependencyType::Jar
    }

    fn do_search(&self, dependency: &DependencyInfo) -> Option<ProjectCoordinate> {
        let fingerprint = match sha256_file(dependency.file()) {
            Ok(digest) => digest,
            Err(e) => {
                warn!("Failed to fingerprint {}: {}", dependency, e);
                return None;
            }
        };
        let result = self
            .index
            .suggest_project_coordinate_by_fingerprint(&fingerprint);
        if result.is_none() {
            debug!("Fingerprint {} of {} is not indexed", fingerprint, dependency);
        }
        result
    }

    fn name(&self) -> &str {
        "fingerprint"
    }
}
