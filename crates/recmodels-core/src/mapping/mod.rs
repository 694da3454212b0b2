//! Mapping of raw dependencies (jars, JREs, projects) to project coordinates.
//!
//! [`MappingProvider`] tries manual mappings first, then each registered
//! strategy in order.

mod dependency;
mod provider;
pub mod strategies;

pub use dependency::{DependencyInfo, DependencyType};
pub use provider::MappingProvider;
pub use strategies::{
    FingerprintStrategy, JreExecutionEnvironmentStrategy, MavenPomPropertiesStrategy,
    OsgiManifestStrategy,
};

use crate::coordinates::ProjectCoordinate;

/// Resolves a dependency to the coordinate of the project it belongs to.
pub trait ProjectCoordinateResolver: Send + Sync {
    /// Whether this resolver understands dependencies of the given kind.
    fn is_applicable(&self, kind: DependencyType) -> bool;

    /// Strategy body; only called for applicable dependency kinds.
    fn do_search(&self, dependency: &DependencyInfo) -> Option<ProjectCoordinate>;

    /// Resolve `dependency`, yielding `None` for inapplicable kinds.
    fn search_for_project_coordinate(
        &self,
        dependency: &DependencyInfo,
    ) -> Option<ProjectCoordinate> {
        if !self.is_applicable(dependency.kind()) {
            return None;
        }
        self.do_search(dependency)
    }

    /// Short name used in log output.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
