//! JVM element names and names qualified by the project they come from.

use super::ProjectCoordinate;
use crate::error::{ModelsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A name whose meaning depends on the project it was declared in.
pub trait BasedName {
    type Name;

    fn base(&self) -> &ProjectCoordinate;
    fn name(&self) -> &Self::Name;
}

/// Names that map to a model entry inside a model archive.
pub trait ArchiveEntry {
    /// Entry path without extension, e.g. `java/util/List`.
    fn archive_entry(&self) -> String;
}

/// A JVM type name in internal form, e.g. `Ljava/util/List`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeName(String);

impl TypeName {
    pub fn new(identifier: impl Into<String>) -> Result<Self> {
        let identifier = identifier.into();
        let valid = identifier.len() > 1
            && identifier.starts_with('L')
            && !identifier.contains(['.', ';', '(', ')'])
            && !identifier.chars().any(char::is_whitespace);
        if !valid {
            return Err(ModelsError::invalid_argument(
                "type_name",
                format!("'{identifier}' is not a JVM type name (expected Lpkg/Name)"),
            ));
        }
        Ok(Self(identifier))
    }

    pub fn identifier(&self) -> &str {
        &self.0
    }

    /// `java/util` for `Ljava/util/List`; empty for the default package.
    pub fn package(&self) -> &str {
        self.0[1..].rsplit_once('/').map(|(p, _)| p).unwrap_or("")
    }

    pub fn class_name(&self) -> &str {
        self.0[1..].rsplit_once('/').map(|(_, n)| n).unwrap_or(&self.0[1..])
    }
}

impl ArchiveEntry for TypeName {
    fn archive_entry(&self) -> String {
        self.0[1..].to_string()
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TypeName {
    type Error = ModelsError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TypeName> for String {
    fn from(value: TypeName) -> Self {
        value.0
    }
}

/// A JVM method name, e.g. `Ljava/util/List.add(Ljava/lang/Object;)Z`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MethodName {
    identifier: String,
    /// Byte offset of the '.' separating type and method name.
    split: usize,
}

impl MethodName {
    pub fn new(identifier: impl Into<String>) -> Result<Self> {
        let identifier = identifier.into();
        let invalid = |reason: &str| {
            ModelsError::invalid_argument(
                "method_name",
                format!("'{identifier}' is not a JVM method name: {reason}"),
            )
        };

        let open = identifier.find('(').ok_or_else(|| invalid("missing '('"))?;
        if !identifier[open..].contains(')') {
            return Err(invalid("missing ')'"));
        }
        let split = identifier[..open]
            .rfind('.')
            .ok_or_else(|| invalid("missing declaring type"))?;
        if split + 1 == open {
            return Err(invalid("empty method name"));
        }
        TypeName::new(&identifier[..split])?;

        Ok(Self { identifier, split })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn declaring_type(&self) -> TypeName {
        TypeName(self.identifier[..self.split].to_string())
    }

    /// Simple method name, `<init>` for constructors.
    pub fn name(&self) -> &str {
        let rest = &self.identifier[self.split + 1..];
        rest.split_once('(').map(|(n, _)| n).unwrap_or(rest)
    }

    pub fn descriptor(&self) -> &str {
        let rest = &self.identifier[self.split + 1..];
        rest.find('(').map(|i| &rest[i..]).unwrap_or("")
    }

    pub fn is_init(&self) -> bool {
        self.name() == "<init>"
    }
}

impl ArchiveEntry for MethodName {
    fn archive_entry(&self) -> String {
        self.declaring_type().archive_entry()
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier)
    }
}

impl TryFrom<String> for MethodName {
    type Error = ModelsError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<MethodName> for String {
    fn from(value: MethodName) -> Self {
        value.identifier
    }
}

/// A name `T` qualified by the project coordinate it was found in.
///
/// Equality and hashing cover both parts, so `List` from two library versions
/// are different pool keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueName<T> {
    base: ProjectCoordinate,
    name: T,
}

impl<T> UniqueName<T> {
    pub fn new(base: ProjectCoordinate, name: T) -> Self {
        Self { base, name }
    }
}

impl<T> BasedName for UniqueName<T> {
    type Name = T;

    fn base(&self) -> &ProjectCoordinate {
        &self.base
    }

    fn name(&self) -> &T {
        &self.name
    }
}

impl<T: ArchiveEntry> ArchiveEntry for UniqueName<T> {
    fn archive_entry(&self) -> String {
        self.name.archive_entry()
    }
}

impl<T: fmt::Display> fmt::Display for UniqueName<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.base)
    }
}

pub type UniqueTypeName = UniqueName<TypeName>;
pub type UniqueMethodName = UniqueName<MethodName>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_type_name_parts() {
        let t = TypeName::new("Ljava/util/List").unwrap();
        assert_eq!(t.package(), "java/util");
        assert_eq!(t.class_name(), "List");
        assert_eq!(t.archive_entry(), "java/util/List");

        let default_pkg = TypeName::new("LFoo").unwrap();
        assert_eq!(default_pkg.package(), "");
        assert_eq!(default_pkg.class_name(), "Foo");
    }

    #[test]
    fn test_type_name_rejects_source_form() {
        assert!(TypeName::new("java.util.List").is_err());
        assert!(TypeName::new("L").is_err());
        assert!(TypeName::new("Ljava/util/List;").is_err());
    }

    #[test]
    fn test_method_name_parts() {
        let m = MethodName::new("Ljava/util/List.add(Ljava/lang/Object;)Z").unwrap();
        assert_eq!(m.declaring_type(), TypeName::new("Ljava/util/List").unwrap());
        assert_eq!(m.name(), "add");
        assert_eq!(m.descriptor(), "(Ljava/lang/Object;)Z");
        assert_eq!(m.archive_entry(), "java/util/List");
        assert!(!m.is_init());

        let ctor = MethodName::new("Ljava/util/ArrayList.<init>()V").unwrap();
        assert!(ctor.is_init());
    }

    #[test]
    fn test_method_name_rejects_malformed() {
        assert!(MethodName::new("Ljava/util/List.add").is_err());
        assert!(MethodName::new("add()V").is_err());
        assert!(MethodName::new("Ljava/util/List.()V").is_err());
    }

    #[test]
    fn test_unique_name_equality_uses_both_parts() {
        let list = TypeName::new("Ljava/util/List").unwrap();
        let v1 = ProjectCoordinate::new("jre", "jre", "1.6.0");
        let v2 = ProjectCoordinate::new("jre", "jre", "1.7.0");

        let mut keys = HashSet::new();
        keys.insert(UniqueName::new(v1.clone(), list.clone()));
        keys.insert(UniqueName::new(v1.clone(), list.clone()));
        keys.insert(UniqueName::new(v2, list.clone()));
        keys.insert(UniqueName::new(
            v1,
            TypeName::new("Ljava/util/Map").unwrap(),
        ));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_serde_validates() {
        let ok: TypeName = serde_json::from_str(r#""Ljava/lang/String""#).unwrap();
        assert_eq!(ok.class_name(), "String");
        assert!(serde_json::from_str::<TypeName>(r#""java.lang.String""#).is_err());
    }
}
