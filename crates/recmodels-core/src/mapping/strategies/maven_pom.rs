use super::open_jar;
use crate::coordinates::ProjectCoordinate;
use crate::mapping::{DependencyInfo, DependencyType, ProjectCoordinateResolver};
use std::collections::HashMap;
use std::io::Read;
use tracing::debug;

/// Reads `META-INF/maven/<groupId>/<artifactId>/pom.properties` from a jar.
///
/// An entry is only trusted when its `groupId`/`artifactId` properties match
/// the directory names it was found under.
#[derive(Debug, Default)]
pub struct MavenPomPropertiesStrategy;

impl MavenPomPropertiesStrategy {
    pub fn new() -> Self {
        Self
    }
}

/// `(groupId, artifactId)` when `name` is a pom.properties entry at the expected depth.
fn pom_properties_entry(name: &str) -> Option<(&str, &str)> {
    let segments: Vec<&str> = name.split('/').collect();
    match segments.as_slice() {
        ["META-INF", "maven", group, artifact, "pom.properties"]
            if !group.is_empty() && !artifact.is_empty() =>
        {
            Some((*group, *artifact))
        }
        _ => None,
    }
}

/// Minimal `.properties` reader: `key=value` or `key: value`, `#`/`!` comments.
pub(crate) fn parse_properties(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            Some((
                line[..split].trim().to_string(),
                line[split + 1..].trim().to_string(),
            ))
        })
        .collect()
}

impl ProjectCoordinateResolver for MavenPomPropertiesStrategy {
    fn is_applicable(&self, kind: DependencyType) -> bool {
        kind == DependencyType::Jar
    }

    fn do_search(&self, dependency: &DependencyInfo) -> Option<ProjectCoordinate> {
        let mut jar = open_jar(dependency.file())?;

        for index in 0..jar.len() {
            let Ok(mut entry) = jar.by_index(index) else {
                continue;
            };
            let name = entry.name().to_string();
            let Some((group, artifact)) = pom_properties_entry(&name) else {
                continue;
            };

            let mut contents = String::new();
            if let Err(e) = entry.read_to_string(&mut contents) {
                debug!("Unreadable {} in {}: {}", name, dependency.file().display(), e);
                continue;
            }
            let properties = parse_properties(&contents);

            let (Some(group_id), Some(artifact_id), Some(version)) = (
                properties.get("groupId"),
                properties.get("artifactId"),
                properties.get("version"),
            ) else {
                continue;
            };
            if group_id != group || artifact_id != artifact || version.is_empty() {
                debug!("Ignoring inconsistent {}", name);
                continue;
            }
            return Some(ProjectCoordinate::new(
                group_id.as_str(),
                artifact_id.as_str(),
                version.as_str(),
            ));
        }
        None
    }

    fn name(&self) -> &str {
        "maven-pom-properties"
    }
}
