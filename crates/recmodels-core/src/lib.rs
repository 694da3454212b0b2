//! Recmodels Core - model coordinate resolution and model-archive caching for
//! code recommenders.
//!
//! Recommenders need per-library models (call statistics, overrides and the
//! like) that ship as zip archives in a Maven-style repository. This crate
//! maps a dependency (a jar, a folder, the JRE) to the project it belongs to,
//! picks the best model archive for that project from a local index, keeps
//! archives downloaded in the background and lends the loaded models out of
//! a bounded pool.
//!
//! # Example
//!
//! ```rust,ignore
//! use recmodels_core::{
//!     DependencyInfo, DependencyType, JsonModelLoader, ModelProvider, ModelServices,
//!     ModelTypes, PoolSettings, ProjectCoordinateResolver, TypeName, UniqueTypeName,
//! };
//!
//! #[tokio::main]
//! async fn main() -> recmodels_core::Result<()> {
//!     let services = ModelServices::builder("/var/lib/recmodels")
//!         .auto_create_dirs(true)
//!         .build()?;
//!     services.open().await?;
//!
//!     // Which project does this jar belong to?
//!     let dependency = DependencyInfo::new("/home/me/.m2/guava-33.0.0.jar", DependencyType::Jar)?;
//!     let Some(project) = services.mapping().search_for_project_coordinate(&dependency) else {
//!         return Ok(());
//!     };
//!
//!     // Borrow the call model for one of its types.
//!     let provider = services.pooling_provider::<UniqueTypeName, serde_json::Value>(
//!         ModelTypes::CALL,
//!         std::sync::Arc::new(JsonModelLoader::new()),
//!         PoolSettings::default(),
//!     );
//!     let key = UniqueTypeName::new(project, TypeName::new("Lcom/google/common/collect/Lists")?);
//!     if let Some(model) = provider.acquire_model(&key) {
//!         println!("{}", model);
//!         provider.release_model(model);
//!     }
//!
//!     services.close()
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod coordinates;
pub mod error;
pub mod hashing;
pub mod index;
pub mod mapping;
pub mod provider;
pub mod repository;
pub mod services;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use config::{AuthSettings, ModelTypes, ModelsSettings, ProxySettings};
pub use coordinates::{
    find_closest, ArchiveEntry, BasedName, MethodName, ModelCoordinate, ProjectCoordinate,
    TypeName, UniqueMethodName, UniqueName, UniqueTypeName, Version,
};
pub use error::{ModelsError, Result};
pub use index::{
    CatalogDocument, CoordinateCatalog, CoordinateIndex, ModelArchiveCoordinateAdvisor,
    ModelIndex,
};
pub use mapping::{DependencyInfo, DependencyType, MappingProvider, ProjectCoordinateResolver};
pub use provider::{
    ArchiveInstallListener, ExhaustedAction, JsonModelLoader, ModelArchive, ModelLoader,
    ModelProvider, PoolSettings, PoolStats, PoolingModelProvider, SimpleModelProvider,
};
pub use repository::{ModelArchiveRepository, ModelRepository, RepositoryEvent};
pub use services::{ModelServices, ModelServicesBuilder};
