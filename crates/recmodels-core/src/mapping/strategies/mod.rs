//! Built-in resolution strategies.

mod fingerprint;
mod jre;
mod maven_pom;
mod osgi_manifest;

pub use fingerprint::FingerprintStrategy;
pub use jre::JreExecutionEnvironmentStrategy;
pub use maven_pom::MavenPomPropertiesStrategy;
pub use osgi_manifest::OsgiManifestStrategy;

use std::fs::File;
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// Open a jar for inspection. Unreadable jars yield `None`.
fn open_jar(path: &Path) -> Option<ZipArchive<File>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            debug!("Cannot open {}: {}", path.display(), e);
            return None;
        }
    };
    match ZipArchive::new(file) {
        Ok(archive) => Some(archive),
        Err(e) => {
            debug!("{} is not a readable jar: {}", path.display(), e);
            None
        }
    }
}
