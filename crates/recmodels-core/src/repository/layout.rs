//! Maven-style repository layout.
//!
//! `org.foo:bar:jar:sources:1.2.3` lives at
//! `org/foo/bar/1.2.3/bar-1.2.3-sources.jar`, both on disk and remotely.

use crate::config::{NetworkConfig, RepositoryConfig};
use crate::coordinates::ModelCoordinate;
use std::path::{Path, PathBuf};

/// File name of the artifact: `<artifactId>-<version>[-<classifier>].<extension>`.
pub fn file_name(mc: &ModelCoordinate) -> String {
    let mut name = format!("{}-{}", mc.artifact_id(), mc.version());
    if !mc.classifier().is_empty() {
        name.push('-');
        name.push_str(mc.classifier());
    }
    if !mc.extension().is_empty() {
        name.push('.');
        name.push_str(mc.extension());
    }
    name
}

/// Repository-relative path segments.
fn segments(mc: &ModelCoordinate) -> Vec<String> {
    let mut segments: Vec<String> = mc
        .group_id()
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    segments.push(mc.artifact_id().to_string());
    segments.push(mc.version().to_string());
    segments.push(file_name(mc));
    segments
}

/// Relative filesystem path of the artifact.
pub fn model_path(mc: &ModelCoordinate) -> PathBuf {
    segments(mc).iter().collect()
}

/// Relative URL path of the artifact (always `/`-separated).
pub fn relative_url(mc: &ModelCoordinate) -> String {
    segments(mc).join("/")
}

/// `<repository>/…` for the given repository root.
pub fn local_path(repository_dir: &Path, mc: &ModelCoordinate) -> PathBuf {
    repository_dir.join(model_path(mc))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Where a transfer writes before it is moved into place.
pub fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, NetworkConfig::DOWNLOAD_TEMP_SUFFIX)
}

pub fn checksum_path(path: &Path) -> PathBuf {
    with_suffix(path, NetworkConfig::CHECKSUM_SUFFIX)
}

pub fn lock_path(path: &Path) -> PathBuf {
    with_suffix(path, RepositoryConfig::LOCK_FILE_SUFFIX)
}

/// Transfer leftovers and sidecars that are not archives themselves.
pub fn is_auxiliary_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    [
        NetworkConfig::DOWNLOAD_TEMP_SUFFIX,
        NetworkConfig::CHECKSUM_SUFFIX,
        RepositoryConfig::LOCK_FILE_SUFFIX,
    ]
    .iter()
    .any(|suffix| name.ends_with(suffix))
}

/// The coordinate of the downloadable index archive.
pub fn index_coordinate() -> ModelCoordinate {
    ModelCoordinate::new(
        RepositoryConfig::INDEX_GROUP_ID,
        RepositoryConfig::INDEX_ARTIFACT_ID,
        "",
        RepositoryConfig::INDEX_EXTENSION,
        RepositoryConfig::INDEX_VERSION,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_with_classifier() {
        let mc = ModelCoordinate::new("org.foo", "bar", "sources", "jar", "1.2.3");
        assert_eq!(
            model_path(&mc),
            PathBuf::from("org/foo/bar/1.2.3/bar-1.2.3-sources.jar")
        );
        assert_eq!(relative_url(&mc), "org/foo/bar/1.2.3/bar-1.2.3-sources.jar");
    }

    #[test]
    fn test_path_without_classifier() {
        assert_eq!(
            relative_url(&index_coordinate()),
            "org/eclipse/recommenders/index/0.0.0/index-0.0.0.zip"
        );
    }

    #[test]
    fn test_sidecar_paths() {
        let path = Path::new("/repo/org/foo/bar-1.0.0-call.zip");
        assert_eq!(
            temp_path(path),
            PathBuf::from("/repo/org/foo/bar-1.0.0-call.zip.part")
        );
        assert_eq!(
            checksum_path(path),
            PathBuf::from("/repo/org/foo/bar-1.0.0-call.zip.sha256")
        );
        assert!(is_auxiliary_file(&lock_path(path)));
        assert!(!is_auxiliary_file(path));
    }
}
