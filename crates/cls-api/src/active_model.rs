//! Startup lookup of the "active" model path in an external model registry.
//!
//! The lookup is best effort: any failure falls back to the configured paths.

use crate::config::ServiceConfig;
use cls_ml::ModelPaths;

/// Source of the model file path flagged active by an external system.
pub trait ActiveModelSource: Send + Sync {
    /// `None` when no model is flagged or the source is unavailable.
    fn active_model_path(&self) -> Option<String>;
}

/// Used when no registry database is configured.
pub struct NoActiveModel;

impl ActiveModelSource for NoActiveModel {
    fn active_model_path(&self) -> Option<String> {
        None
    }
}

/// Reads `tblModel` rows flagged `isActive = 1` from a SQLite database.
#[cfg(feature = "sqlite")]
pub struct SqliteActiveModelSource {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

#[cfg(feature = "sqlite")]
impl SqliteActiveModelSource {
    pub fn open(path: &std::path::Path) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| format!("failed to acquire lock: {}", e))?;
        f(&conn).map_err(|e| e.to_string())
    }

    fn query(&self) -> Result<Option<String>, String> {
        self.with_conn(|conn| {
            match conn.query_row(
                "SELECT path FROM tblModel WHERE isActive = 1 LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            ) {
                Ok(path) => Ok(Some(path)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }
}

#[cfg(feature = "sqlite")]
impl ActiveModelSource for SqliteActiveModelSource {
    fn active_model_path(&self) -> Option<String> {
        self.query().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "active model lookup failed");
            None
        })
    }
}

#[cfg(feature = "sqlite")]
fn database_source(config: &ServiceConfig) -> Option<Box<dyn ActiveModelSource>> {
    let db = config.active_model_db.as_ref()?;
    match SqliteActiveModelSource::open(db) {
        Ok(source) => Some(Box::new(source) as Box<dyn ActiveModelSource>),
        Err(e) => {
            tracing::warn!(db = %db.display(), error = %e, "cannot open active model database");
            None
        }
    }
}

#[cfg(not(feature = "sqlite"))]
fn database_source(config: &ServiceConfig) -> Option<Box<dyn ActiveModelSource>> {
    if config.active_model_db.is_some() {
        tracing::warn!("ACTIVE_MODEL_DB is set but the sqlite feature is disabled; ignoring");
    }
    None
}

/// Pick the active-model source for this configuration.
pub fn active_model_source(config: &ServiceConfig) -> Box<dyn ActiveModelSource> {
    database_source(config).unwrap_or_else(|| Box::new(NoActiveModel))
}

/// Configured artifact paths, with the model file replaced by the active one if any.
pub fn resolve_model_paths(config: &ServiceConfig, source: &dyn ActiveModelSource) -> ModelPaths {
    match source.active_model_path() {
        Some(path) => {
            tracing::info!(model = %path, "using active model from registry database");
            ModelPaths {
                model: path.into(),
                ..config.model_paths.clone()
            }
        }
        None => config.model_paths.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Fixed(Option<&'static str>);

    impl ActiveModelSource for Fixed {
        fn active_model_path(&self) -> Option<String> {
            self.0.map(String::from)
        }
    }

    fn config() -> ServiceConfig {
        ServiceConfig::from_lookup(|_| None)
    }

    #[test]
    fn falls_back_to_configured_paths() {
        let cfg = config();
        let paths = resolve_model_paths(&cfg, &Fixed(None));
        assert_eq!(paths.model, cfg.model_paths.model);
        assert!(active_model_source(&cfg).active_model_path().is_none());
    }

    #[test]
    fn active_path_replaces_only_the_model_file() {
        let cfg = config();
        let paths = resolve_model_paths(&cfg, &Fixed(Some("/models/v7.model.json")));
        assert_eq!(paths.model, PathBuf::from("/models/v7.model.json"));
        assert_eq!(paths.tokenizer, cfg.model_paths.tokenizer);
        assert_eq!(paths.metadata, cfg.model_paths.metadata);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_source_reads_the_flagged_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("models.db");
        {
            let conn = rusqlite::Connection::open(&db).unwrap();
            conn.execute_batch(
                "CREATE TABLE tblModel (id INTEGER PRIMARY KEY, path TEXT NOT NULL, isActive INTEGER NOT NULL);
                 INSERT INTO tblModel (path, isActive) VALUES ('/m/old.model.json', 0);
                 INSERT INTO tblModel (path, isActive) VALUES ('/m/new.model.json', 1);",
            )
            .unwrap();
        }
        let source = SqliteActiveModelSource::open(&db).unwrap();
        assert_eq!(source.active_model_path().as_deref(), Some("/m/new.model.json"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_source_without_table_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("empty.db");
        rusqlite::Connection::open(&db)
            .unwrap()
            .execute_batch("CREATE TABLE other (id INTEGER);")
            .unwrap();
        let source = SqliteActiveModelSource::open(&db).unwrap();
        assert!(source.active_model_path().is_none());
    }
}
