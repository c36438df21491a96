use getset::{CopyGetters, Getters};
use rust_decimal::Decimal;
use serde::Deserialize;

pub type ProjectId = i64;

/// A row of the reference table.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Project {
    #[getset(get_copy = "pub")]
    id: ProjectId,
    #[getset(get = "pub")]
    name: String,
}

impl Project {
    pub fn new(id: ProjectId, name: impl Into<String>) -> Project {
        Project { id, name: name.into() }
    }
}

/// A row of the fact table.
#[derive(Debug, Clone, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct ProjectData {
    project_id: ProjectId,
    year: i32,
    cost: Decimal,
}

impl ProjectData {
    pub fn new(project_id: ProjectId, year: i32, cost: Decimal) -> ProjectData {
        ProjectData { project_id, year, cost }
    }
}

/// One spreadsheet row, before its name is reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CostRecord {
    /// 1-based row in the source file, header included.
    #[serde(skip)]
    pub row: usize,
    pub name: String,
    pub year: i32,
    pub cost: Decimal,
}

impl CostRecord {
    pub fn new(row: usize, name: impl Into<String>, year: i32, cost: Decimal) -> CostRecord {
        CostRecord {
            row,
            name: name.into(),
            year,
            cost,
        }
    }
}
