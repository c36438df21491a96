use thiserror::Error;

use crate::model::{Project, ProjectData};

pub mod sqlite;

pub use sqlite::SqliteStore;

#[derive(Debug, PartialEq, Error)]
pub enum StoreError {
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Rejected(String),
    #[error("cannot apply DDL: {0}")]
    Ddl(String),
}

/// Persistence boundary of the pipeline: a reference table of projects and
/// an append-only fact table keyed by project id.
pub trait ProjectStore {
    fn ping(&self) -> Result<(), StoreError>;

    /// Inserts `name` unless it is already present. Returns whether a new
    /// reference row was created.
    fn insert_project(&self, name: &str) -> Result<bool, StoreError>;

    fn projects(&self) -> Result<Vec<Project>, StoreError>;

    fn append_project_data(&self, row: &ProjectData) -> Result<(), StoreError>;

    fn project_data(&self) -> Result<Vec<ProjectData>, StoreError>;
}
