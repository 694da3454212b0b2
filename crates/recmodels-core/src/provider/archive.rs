//! Open handle on a model archive (a zip of serialized models).

use crate::coordinates::ModelCoordinate;
use crate::error::{ModelsError, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::ZipArchive;

pub struct ModelArchive {
    coordinate: ModelCoordinate,
    path: PathBuf,
    zip: ZipArchive<File>,
}

impl ModelArchive {
    pub fn open(path: impl Into<PathBuf>, coordinate: ModelCoordinate) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path).map_err(|e| ModelsError::io_with_path(e, &path))?;
        let zip = ZipArchive::new(file)
            .map_err(|e| ModelsError::archive(&path, format!("not a model archive: {}", e)))?;
        Ok(Self {
            coordinate,
            path,
            zip,
        })
    }

    pub fn coordinate(&self) -> &ModelCoordinate {
        &self.coordinate
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the archive holds an entry called `name`.
    pub fn has_entry(&self, name: &str) -> bool {
        self.zip.index_for_name(name).is_some()
    }

    /// Entry names in sorted order.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = self.zip.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    /// Contents of `name`, or `None` if the archive has no such entry.
    pub fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut entry = match self.zip.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => {
                return Err(ModelsError::archive(
                    &self.path,
                    format!("cannot read {}: {}", name, e),
                ))
            }
        };
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut contents)
            .map_err(|e| ModelsError::archive(&self.path, format!("cannot read {}: {}", name, e)))?;
        Ok(Some(contents))
    }
}

impl std::fmt::Debug for ModelArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelArchive")
            .field("coordinate", &self.coordinate)
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    pub fn write_archive(path: &Path, entries: &[(&str, &str)]) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut writer = ZipWriter::new(std::fs::File::create(path).unwrap());
        for (name, contents) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::write_archive;
    use super::*;
    use tempfile::TempDir;

    fn mc() -> ModelCoordinate {
        ModelCoordinate::new("org.example", "lib", "call", "zip", "1.0.0")
    }

    #[test]
    fn test_read_entries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("models.zip");
        write_archive(&path, &[("b/Two.json", "2"), ("a/One.json", "1")]);

        let mut archive = ModelArchive::open(&path, mc()).unwrap();
        assert_eq!(archive.entries(), vec!["a/One.json", "b/Two.json"]);
        assert!(archive.has_entry("a/One.json"));
        assert_eq!(archive.read_entry("b/Two.json").unwrap(), Some(b"2".to_vec()));
        assert_eq!(archive.read_entry("c/Three.json").unwrap(), None);
        assert_eq!(archive.coordinate(), &mc());
    }

    #[test]
    fn test_open_rejects_non_zip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();
        assert!(matches!(
            ModelArchive::open(&path, mc()),
            Err(ModelsError::Archive { .. })
        ));
    }
}
