//! Model coordinates: one downloadable model archive.

use super::null_as_empty;
use super::ProjectCoordinate;
use crate::error::{ModelsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a single model artifact (group, artifact, classifier, extension, version).
///
/// The string form follows the artifact-resolver convention
/// `groupId:artifactId[:extension[:classifier]]:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCoordinate {
    #[serde(default, deserialize_with = "null_as_empty")]
    group_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    artifact_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    classifier: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    extension: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    version: String,
}

impl ModelCoordinate {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        classifier: impl Into<String>,
        extension: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            classifier: classifier.into(),
            extension: extension.into(),
            version: version.into(),
        }
    }

    /// Sentinel for "no model".
    pub fn unknown() -> Self {
        Self::new("unknown", "unknown", "unknown", "unknown", "0.0.0")
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn classifier(&self) -> &str {
        &self.classifier
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The project this model was built for.
    pub fn project_coordinate(&self) -> ProjectCoordinate {
        ProjectCoordinate::new(
            self.group_id.clone(),
            self.artifact_id.clone(),
            self.version.clone(),
        )
    }

    pub fn value_of(s: &str) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for ModelCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.classifier.is_empty() {
            write!(
                f,
                "{}:{}:{}:{}",
                self.group_id, self.artifact_id, self.extension, self.version
            )
        } else {
            write!(
                f,
                "{}:{}:{}:{}:{}",
                self.group_id, self.artifact_id, self.extension, self.classifier, self.version
            )
        }
    }
}

impl FromStr for ModelCoordinate {
    type Err = ModelsError;

    fn from_str(s: &str) -> Result<Self> {
        let segments: Vec<&str> = s.split(':').collect();
        match segments.as_slice() {
            [g, a, v] => Ok(Self::new(*g, *a, "", "jar", *v)),
            [g, a, e, v] => Ok(Self::new(*g, *a, "", *e, *v)),
            [g, a, e, c, v] => Ok(Self::new(*g, *a, *c, *e, *v)),
            _ => Err(ModelsError::InvalidCoordinate {
                input: s.to_string(),
                message: format!(
                    "expected groupId:artifactId[:extension[:classifier]]:version, found {} segments",
                    segments.len()
                ),
            }),
        }
    }
}
