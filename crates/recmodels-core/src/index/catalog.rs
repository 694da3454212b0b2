//! SQLite coordinate catalog.
//!
//! One row per project coordinate, with the model archives built for it and
//! the jar fingerprints and OSGi symbolic names that identify it.

use super::query::{coordinate_prefix, coordinate_prefix_pattern};
use crate::config::IndexConfig;
use crate::coordinates::{ModelCoordinate, ProjectCoordinate};
use crate::error::{ModelsError, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// One project entry of the catalog, as stored in JSON snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    /// Project coordinate `groupId:artifactId:version`.
    pub coordinate: String,
    /// Model type (classifier) to model coordinate.
    #[serde(default)]
    pub models: BTreeMap<String, String>,
    #[serde(default)]
    pub fingerprints: Vec<String>,
    #[serde(default)]
    pub symbolic_names: Vec<String>,
}

impl CatalogDocument {
    pub fn new(coordinate: &ProjectCoordinate) -> Self {
        Self {
            coordinate: coordinate.to_string(),
            models: BTreeMap::new(),
            fingerprints: Vec::new(),
            symbolic_names: Vec::new(),
        }
    }

    /// Attach a model archive. Its classifier becomes the model type.
    pub fn with_model(mut self, model: &ModelCoordinate) -> Self {
        self.models
            .insert(model.classifier().to_string(), model.to_string());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprints.push(fingerprint.into());
        self
    }

    pub fn with_symbolic_name(mut self, name: impl Into<String>) -> Self {
        self.symbolic_names.push(name.into());
        self
    }

    fn validate(&self) -> Result<()> {
        ProjectCoordinate::value_of(&self.coordinate)?;
        for (classifier, model) in &self.models {
            let mc = ModelCoordinate::value_of(model)?;
            if mc.classifier() != classifier {
                return Err(ModelsError::InvalidCoordinate {
                    input: model.clone(),
                    message: format!("classifier does not match model type '{classifier}'"),
                });
            }
        }
        Ok(())
    }
}

/// Read access to a built catalog file.
pub struct CoordinateCatalog {
    db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl CoordinateCatalog {
    /// Open an existing catalog read-only.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if !db_path.is_file() {
            return Err(ModelsError::Database {
                message: format!("No catalog at {}", db_path.display()),
                source: None,
            });
        }
        let conn = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA query_only=ON; PRAGMA temp_store=MEMORY;")?;

        debug!("Opened coordinate catalog {}", db_path.display());
        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
        })
    }

    /// Write a new catalog at `db_path`, replacing any previous one atomically.
    pub fn build(db_path: &Path, documents: &[CatalogDocument]) -> Result<()> {
        for document in documents {
            document.validate()?;
        }

        let parent = db_path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| ModelsError::io_with_path(e, parent))?;
        let temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| ModelsError::io_with_path(e, parent))?;

        {
            let mut conn = Connection::open(temp.path())?;
            Self::create_schema(&conn)?;

            let tx = conn.transaction()?;
            for document in documents {
                tx.execute(
                    "INSERT OR IGNORE INTO projects (coordinate) VALUES (?1)",
                    params![document.coordinate],
                )?;
                let project_id: i64 = tx.query_row(
                    "SELECT id FROM projects WHERE coordinate = ?1",
                    params![document.coordinate],
                    |row| row.get(0),
                )?;
                for (classifier, model) in &document.models {
                    tx.execute(
                        "INSERT OR REPLACE INTO model_archives (project_id, classifier, model_coordinate)
                         VALUES (?1, ?2, ?3)",
                        params![project_id, classifier, model],
                    )?;
                }
                for fingerprint in &document.fingerprints {
                    tx.execute(
                        "INSERT INTO fingerprints (fingerprint, project_id) VALUES (?1, ?2)",
                        params![fingerprint.to_ascii_lowercase(), project_id],
                    )?;
                }
                for name in &document.symbolic_names {
                    tx.execute(
                        "INSERT INTO symbolic_names (symbolic_name, project_id) VALUES (?1, ?2)",
                        params![name, project_id],
                    )?;
                }
            }
            tx.execute(
                "INSERT OR REPLACE INTO catalog_meta (key, value) VALUES ('built_at', ?1)",
                params![chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
        }

        temp.persist(db_path)
            .map_err(|e| ModelsError::io_with_path(e.error, db_path))?;
        info!(
            "Built coordinate catalog {} with {} projects",
            db_path.display(),
            documents.len()
        );
        Ok(())
    }

    /// Build a catalog from a JSON array of [`CatalogDocument`]s.
    pub fn import_json(json_path: &Path, db_path: &Path) -> Result<usize> {
        let contents = std::fs::read_to_string(json_path)
            .map_err(|e| ModelsError::io_with_path(e, json_path))?;
        let documents: Vec<CatalogDocument> =
            serde_json::from_str(&contents).map_err(|e| ModelsError::Json {
                message: format!("Failed to parse {}: {}", json_path.display(), e),
                source: Some(e),
            })?;
        Self::build(db_path, &documents)?;
        Ok(documents.len())
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE projects (
                id INTEGER PRIMARY KEY,
                coordinate TEXT NOT NULL UNIQUE
            );
            CREATE TABLE model_archives (
                project_id INTEGER NOT NULL REFERENCES projects(id),
                classifier TEXT NOT NULL,
                model_coordinate TEXT NOT NULL,
                PRIMARY KEY (project_id, classifier)
            );
            CREATE TABLE fingerprints (
                fingerprint TEXT NOT NULL,
                project_id INTEGER NOT NULL REFERENCES projects(id)
            );
            CREATE TABLE symbolic_names (
                symbolic_name TEXT NOT NULL,
                project_id INTEGER NOT NULL REFERENCES projects(id)
            );
            CREATE TABLE catalog_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE INDEX idx_model_archives_classifier ON model_archives(classifier);
            CREATE INDEX idx_fingerprints ON fingerprints(fingerprint);
            CREATE INDEX idx_symbolic_names ON symbolic_names(symbolic_name);
            ",
        )?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ModelsError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    /// Model coordinates of `classifier` for any version of `groupId:artifactId`,
    /// at most [`IndexConfig::CANDIDATE_QUERY_LIMIT`] of them.
    pub fn find_model_candidates(
        &self,
        group_id: &str,
        artifact_id: &str,
        classifier: &str,
    ) -> Result<Vec<String>> {
        let conn = self.lock()?;
        // LIKE ignores ASCII case and coordinates do not, so the exact prefix
        // check has to run before LIMIT.
        let mut stmt = conn.prepare_cached(
            "SELECT m.model_coordinate
             FROM model_archives m JOIN projects p ON p.id = m.project_id
             WHERE p.coordinate LIKE ?1 ESCAPE '\\'
               AND substr(p.coordinate, 1, length(?2)) = ?2
               AND m.classifier = ?3
             ORDER BY p.id
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![
                coordinate_prefix_pattern(group_id, artifact_id),
                coordinate_prefix(group_id, artifact_id),
                classifier,
                IndexConfig::CANDIDATE_QUERY_LIMIT as i64
            ],
            |row| row.get::<_, String>(0),
        )?;

        let mut models = Vec::new();
        for row in rows {
            match row {
                Ok(model) => models.push(model),
                Err(e) => warn!("Error reading catalog row: {}", e),
            }
        }
        Ok(models)
    }

    /// Every model coordinate of the given classifier.
    pub fn find_by_classifier(&self, classifier: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT model_coordinate FROM model_archives WHERE classifier = ?1 ORDER BY project_id",
        )?;
        let rows = stmt.query_map(params![classifier], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Project whose jar has the given SHA-256. Digests compare case-insensitively.
    pub fn find_project_by_fingerprint(&self, fingerprint: &str) -> Result<Option<String>> {
        self.find_project_by(
            "SELECT p.coordinate FROM fingerprints f JOIN projects p ON p.id = f.project_id
             WHERE f.fingerprint = ?1 LIMIT ?2",
            &fingerprint.to_ascii_lowercase(),
        )
    }

    /// Project exporting the given OSGi bundle symbolic name.
    pub fn find_project_by_symbolic_name(&self, symbolic_name: &str) -> Result<Option<String>> {
        self.find_project_by(
            "SELECT p.coordinate FROM symbolic_names s JOIN projects p ON p.id = s.project_id
             WHERE s.symbolic_name = ?1 LIMIT ?2",
            symbolic_name,
        )
    }

    /// First hit of a reverse lookup.
    fn find_project_by(&self, sql: &str, term: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let mut rows = stmt.query_map(
            params![term, IndexConfig::REVERSE_LOOKUP_LIMIT as i64],
            |row| row.get::<_, String>(0),
        )?;
        Ok(rows.next().transpose()?)
    }

    /// RFC 3339 timestamp of the build, if recorded.
    pub fn built_at(&self) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM catalog_meta WHERE key = 'built_at'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn project_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
