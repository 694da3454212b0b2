//! Project coordinates: the `groupId:artifactId:version` triple of a library.

use super::null_as_empty;
use crate::error::{ModelsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a library (project) by group, artifact and version.
///
/// Immutable once constructed; used as a map key throughout the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCoordinate {
    #[serde(default, deserialize_with = "null_as_empty")]
    group_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    artifact_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    version: String,
}

impl ProjectCoordinate {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }

    /// Sentinel for dependencies that could not be identified.
    pub fn unknown() -> Self {
        Self::new("unknown", "unknown", "0.0.0")
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

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Parse `groupId:artifactId:version`.
    pub fn value_of(s: &str) -> Result<Self> {
        s.parse()
    }

    /// A copy of this coordinate with another version.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self::new(self.group_id.clone(), self.artifact_id.clone(), version)
    }
}

impl fmt::Display for ProjectCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

impl FromStr for ProjectCoordinate {
    type Err = ModelsError;

    fn from_str(s: &str) -> Result<Self> {
        let segments: Vec<&str> = s.split(':').collect();
        if segments.len() != 3 {
            return Err(ModelsError::InvalidCoordinate {
                input: s.to_string(),
                message: format!(
                    "expected groupId:artifactId:version, found {} segments",
                    segments.len()
                ),
            });
        }
        Ok(Self::new(segments[0], segments[1], segments[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_display_and_parse() {
        let pc = ProjectCoordinate::new("org.eclipse.jdt", "org.eclipse.jdt.core", "3.6.0");
        assert_eq!(pc.to_string(), "org.eclipse.jdt:org.eclipse.jdt.core:3.6.0");
        assert_eq!(ProjectCoordinate::value_of(&pc.to_string()).unwrap(), pc);
    }

    #[test]
    fn test_empty_parts_round_trip() {
        let pc = ProjectCoordinate::new("", "", "");
        assert_eq!(pc.to_string(), "::");
        assert_eq!(ProjectCoordinate::value_of("::").unwrap(), pc);
    }

    #[test]
    fn test_invalid_segment_count() {
        for input in ["", "a:b", "a:b:c:d", "a"] {
            assert!(
                matches!(
                    ProjectCoordinate::value_of(input),
                    Err(ModelsError::InvalidCoordinate { .. })
                ),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_null_parts_become_empty() {
        let pc: ProjectCoordinate =
            serde_json::from_str(r#"{"groupId": null, "artifactId": "a"}"#).unwrap();
        assert_eq!(pc.group_id(), "");
        assert_eq!(pc.artifact_id(), "a");
        assert_eq!(pc.version(), "");
        assert_eq!(pc, ProjectCoordinate::new("", "a", ""));
    }

    #[test]
    fn test_value_equality_and_hash() {
        let mut set = HashSet::new();
        set.insert(ProjectCoordinate::new("g", "a", "1.0.0"));
        set.insert(ProjectCoordinate::new("g", "a", "1.0.0"));
        set.insert(ProjectCoordinate::new("g", "a", "1.0.1"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_unknown_sentinel() {
        assert!(ProjectCoordinate::unknown().is_unknown());
        assert!(!ProjectCoordinate::new("jre", "jre", "1.6.0").is_unknown());
    }
}
