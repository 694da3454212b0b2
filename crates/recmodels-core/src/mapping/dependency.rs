use crate::error::{ModelsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of a dependency fed into the resolution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DependencyType {
    Jar,
    Jre,
    Project,
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyType::Jar => "JAR",
            DependencyType::Jre => "JRE",
            DependencyType::Project => "PROJECT",
        };
        f.write_str(s)
    }
}

/// One resolvable dependency: a jar, a JRE installation or a project folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyInfo {
    file: PathBuf,
    kind: DependencyType,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

impl DependencyInfo {
    /// Attribute carrying the JRE execution environment, e.g. `JavaSE-1.6`.
    pub const EXECUTION_ENVIRONMENT: &'static str = "EXECUTION_ENVIRONMENT";

    pub fn new(file: impl Into<PathBuf>, kind: DependencyType) -> Result<Self> {
        let file = file.into();
        if !file.is_absolute() {
            return Err(ModelsError::invalid_argument(
                "file",
                format!("dependency path must be absolute: {}", file.display()),
            ));
        }
        Ok(Self {
            file,
            kind,
            attributes: BTreeMap::new(),
        })
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn kind(&self) -> DependencyType {
        self.kind
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

impl fmt::Display for DependencyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.file.display())
    }
}
