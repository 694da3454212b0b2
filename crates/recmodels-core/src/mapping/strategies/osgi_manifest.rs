use super::open_jar;
use crate::coordinates::{ProjectCoordinate, Version};
use crate::mapping::{DependencyInfo, DependencyType, ProjectCoordinateResolver};
use std::collections::HashMap;
use std::io::Read;
use tracing::debug;

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
const BUNDLE_SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
const BUNDLE_VERSION: &str = "Bundle-Version";

/// Derives a coordinate from the OSGi headers of a bundle manifest.
///
/// The group id is the first three segments of the symbolic name, e.g.
/// `org.eclipse.jdt.core` maps to `org.eclipse.jdt:org.eclipse.jdt.core`.
#[derive(Debug, Default)]
pub struct OsgiManifestStrategy;

impl OsgiManifestStrategy {
    pub fn new() -> Self {
        Self
    }

    fn read_manifest(&self, dependency: &DependencyInfo) -> Option<String> {
        match dependency.kind() {
            DependencyType::Jar => {
                let mut jar = open_jar(dependency.file())?;
                let mut entry = jar.by_name(MANIFEST_PATH).ok()?;
                let mut contents = String::new();
                entry.read_to_string(&mut contents).ok()?;
                Some(contents)
            }
            DependencyType::Project => {
                let path = dependency.file().join(MANIFEST_PATH);
                std::fs::read_to_string(&path)
                    .map_err(|e| debug!("No manifest at {}: {}", path.display(), e))
                    .ok()
            }
            DependencyType::Jre => None,
        }
    }
}

/// Parse main-section manifest headers, joining continuation lines.
pub(crate) fn parse_manifest(contents: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let mut current: Option<(String, String)> = None;

    for line in contents.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some((_, value)) = current.as_mut() {
                value.push_str(continuation);
            }
            continue;
        }
        if let Some((key, value)) = current.take() {
            headers.insert(key, value);
        }
        if line.is_empty() {
            // End of the main section.
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            current = Some((key.trim().to_string(), value.trim_start().to_string()));
        }
    }
    if let Some((key, value)) = current {
        headers.insert(key, value);
    }
    headers
}

fn group_id_of(symbolic_name: &str) -> String {
    symbolic_name
        .split('.')
        .take(3)
        .collect::<Vec<_>>()
        .join(".")
}

impl ProjectCoordinateResolver for OsgiManifestStrategy {
    fn is_applicable(&self, kind: DependencyType) -> bool {
        matches!(kind, DependencyType::Jar | DependencyType::Project)
    }

    fn do_search(&self, dependency: &DependencyInfo) -> Option<ProjectCoordinate> {
        let headers = parse_manifest(&self.read_manifest(dependency)?);

        let symbolic_name = headers
            .get(BUNDLE_SYMBOLIC_NAME)?
            .split(';')
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())?
            .to_string();
        let raw_version = headers.get(BUNDLE_VERSION)?;
        let version = match Version::value_of(raw_version) {
            Ok(version) => version.canonical(),
            Err(_) => {
                debug!(
                    "Unparseable Bundle-Version '{}' in {}",
                    raw_version, dependency
                );
                return None;
            }
        };

        Some(ProjectCoordinate::new(
            group_id_of(&symbolic_name),
            symbolic_name,
            version.to_string(),
        ))
    }

    fn name(&self) -> &str {
        "osgi-manifest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::strategies::test_support::write_jar;
    use tempfile::TempDir;

    const MANIFEST: &str = "Manifest-Version: 1.0\r\n\
Bundle-SymbolicName: org.eclipse.jdt.core;singleton:=tr\r\n ue\r\n\
Bundle-Version: 3.6.0.v_A58\r\n\
\r\n\
Name: ignored\r\n\
Bundle-Version: 9.9.9\r\n";

    #[test]
    fn test_jar_manifest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("org.eclipse.jdt.core.jar");
        write_jar(&path, &[(MANIFEST_PATH, MANIFEST)]);
        let dep = DependencyInfo::new(path, DependencyType::Jar).unwrap();

        assert_eq!(
            OsgiManifestStrategy::new().search_for_project_coordinate(&dep),
            Some(ProjectCoordinate::new(
                "org.eclipse.jdt",
                "org.eclipse.jdt.core",
                "3.6.0"
            ))
        );
    }

    #[test]
    fn test_project_manifest() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("META-INF")).unwrap();
        std::fs::write(
            temp.path().join(MANIFEST_PATH),
            "Bundle-SymbolicName: com.example\nBundle-Version: 2.1\n",
        )
        .unwrap();
        let dep = DependencyInfo::new(temp.path(), DependencyType::Project).unwrap();

        assert_eq!(
            OsgiManifestStrategy::new().search_for_project_coordinate(&dep),
            Some(ProjectCoordinate::new("com.example", "com.example", "2.1.0"))
        );
    }

    #[test]
    fn test_unparseable_version() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.jar");
        write_jar(
            &path,
            &[(
                MANIFEST_PATH,
                "Bundle-SymbolicName: org.example.bad\nBundle-Version: latest\n",
            )],
        );
        let dep = DependencyInfo::new(path, DependencyType::Jar).unwrap();
        assert_eq!(
            OsgiManifestStrategy::new().search_for_project_coordinate(&dep),
            None
        );
    }

    #[test]
    fn test_parse_manifest_continuation() {
        let headers = parse_manifest(MANIFEST);
        assert_eq!(
            headers.get(BUNDLE_SYMBOLIC_NAME).map(String::as_str),
            Some("org.eclipse.jdt.core;singleton:=true")
        );
        assert_eq!(
            headers.get(BUNDLE_VERSION).map(String::as_str),
            Some("3.6.0.v_A58")
        );
    }
}
