use crate::coordinates::{ProjectCoordinate, Version};
use crate::mapping::{DependencyInfo, DependencyType, ProjectCoordinateResolver};
use tracing::debug;

const JRE_GROUP_ID: &str = "jre";
const JRE_ARTIFACT_ID: &str = "jre";

/// Maps a JRE's execution environment (`JavaSE-1.6`, `J2SE-1.5`, `JavaSE-11`)
/// to `jre:jre:<version>`.
#[derive(Debug, Default)]
pub struct JreExecutionEnvironmentStrategy;

impl JreExecutionEnvironmentStrategy {
    pub fn new() -> Self {
        Self
    }
}

fn version_of(execution_environment: &str) -> Option<Version> {
    let (family, version) = execution_environment.split_once('-')?;
    if !matches!(family, "JavaSE" | "J2SE") {
        return None;
    }
    Version::value_of(version).ok().map(|v| v.canonical())
}

impl ProjectCoordinateResolver for JreExecutionEnvironmentStrategy {
    fn is_applicable(&self, kind: DependencyType) -> bool {
        kind == DependencyType::Jre
    }

    fn do_search(&self, dependency: &DependencyInfo) -> Option<ProjectCoordinate> {
        let environment = dependency.attribute(DependencyInfo::EXECUTION_ENVIRONMENT)?;
        match version_of(environment) {
            Some(version) => Some(ProjectCoordinate::new(
                JRE_GROUP_ID,
                JRE_ARTIFACT_ID,
                version.to_string(),
            )),
            None => {
                debug!("Unknown execution environment '{}'", environment);
                None
            }
        }
    }

    fn name(&self) -> &str {
        "jre-execution-environment"
    }
}
