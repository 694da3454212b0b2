//! Coordinate value types.
//!
//! Project coordinates identify a library, model coordinates a downloadable
//! model archive built for one.

mod model;
mod names;
mod project;
mod version;

pub use model::ModelCoordinate;
pub use names::{
    ArchiveEntry, BasedName, MethodName, TypeName, UniqueMethodName, UniqueName, UniqueTypeName,
};
pub use project::ProjectCoordinate;
pub use version::{find_closest, Version};

use serde::{Deserialize, Deserializer};

/// Deserialize a string field, mapping `null` to `""`.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
