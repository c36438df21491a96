use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use log::{debug, info};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode};
use rust_decimal::Decimal;

use super::{ProjectStore, StoreError};
use crate::model::{Project, ProjectData};

/// Store handle backed by a single SQLite connection.
///
/// `rusqlite::Connection` is not `Sync`, so it lives behind a mutex and every
/// operation checks it out for the duration of one statement. Construct it
/// once at startup with `open` + `init` and pass it to the components that
/// need it.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<SqliteStore, StoreError> {
        let conn = Connection::open(path)
            .map_err(|err| StoreError::Unavailable(format!("cannot open {}: {}", path.display(), err)))?;
        debug!("opened sqlite database, path={}", path.display());

        SqliteStore::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<SqliteStore, StoreError> {
        let conn = Connection::open_in_memory().map_err(|err| StoreError::Unavailable(err.to_string()))?;

        SqliteStore::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<SqliteStore, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(classify)?;

        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    /// Runs the DDL script found at `ddl_path`.
    pub fn init(&self, ddl_path: &Path) -> Result<(), StoreError> {
        let ddl = fs::read_to_string(ddl_path)
            .map_err(|err| StoreError::Ddl(format!("cannot read {}: {}", ddl_path.display(), err)))?;

        self.init_with(&ddl)?;
        info!("database initialized, ddl={}", ddl_path.display());

        Ok(())
    }

    pub fn init_with(&self, ddl: &str) -> Result<(), StoreError> {
        self.conn()?
            .execute_batch(ddl)
            .map_err(|err| StoreError::Ddl(err.to_string()))
    }

    pub fn close(self) -> Result<(), StoreError> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))?;

        conn.close().map_err(|(_, err)| classify(err))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }
}

impl ProjectStore for SqliteStore {
    fn ping(&self) -> Result<(), StoreError> {
        self.conn()?
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(classify)
    }

    fn insert_project(&self, name: &str) -> Result<bool, StoreError> {
        // The NOT EXISTS guard keeps this insert-if-absent even when the DDL
        // lacks a UNIQUE(name) constraint.
        let changed = self
            .conn()?
            .execute(
                "INSERT INTO projects (name)
                 SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM projects WHERE name = ?1)
                 ON CONFLICT DO NOTHING",
                params![name],
            )
            .map_err(classify)?;

        Ok(changed == 1)
    }

    fn projects(&self) -> Result<Vec<Project>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name FROM projects ORDER BY id").map_err(classify)?;
        let projects = stmt
            .query_map([], |row| Ok(Project::new(row.get(0)?, row.get::<_, String>(1)?)))
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;

        Ok(projects)
    }

    fn append_project_data(&self, row: &ProjectData) -> Result<(), StoreError> {
        self.conn()?
            .execute(
                "INSERT INTO project_data (project_id, year, cost) VALUES (?1, ?2, ?3)",
                params![row.project_id(), row.year(), row.cost().to_string()],
            )
            .map_err(classify)?;

        Ok(())
    }

    fn project_data(&self) -> Result<Vec<ProjectData>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT project_id, year, cost FROM project_data ORDER BY rowid")
            .map_err(classify)?;
        let rows = stmt
            .query_map([], |row| {
                let cost = decimal_from_sql(row.get_ref(2)?).map_err(|err| {
                    rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, err.into())
                })?;
                Ok(ProjectData::new(row.get(0)?, row.get(1)?, cost))
            })
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;

        Ok(rows)
    }
}

/// Cost is written as text, but a foreign DDL may give the column numeric
/// affinity, in which case SQLite hands it back as a number.
fn decimal_from_sql(value: ValueRef<'_>) -> Result<Decimal, String> {
    match value {
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => Decimal::try_from(f).map_err(|err| err.to_string()),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|err| err.to_string())?;
            Decimal::from_str(text.trim()).map_err(|err| err.to_string())
        },
        ValueRef::Null => Err("cost is null".to_string()),
        ValueRef::Blob(_) => Err("cost is a blob".to_string()),
    }
}

/// Statement-level failures are the row's fault, anything else means the
/// database itself is in trouble.
fn classify(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if !matches!(failure.code, ErrorCode::ConstraintViolation | ErrorCode::TypeMismatch) =>
        {
            StoreError::Unavailable(err.to_string())
        },
        _ => StoreError::Rejected(err.to_string()),
    }
}
