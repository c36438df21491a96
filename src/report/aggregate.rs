use std::collections::HashMap;

use log::{debug, info};

use super::table::{Table, Value};
use crate::error::PipelineError;
use crate::model::ProjectId;
use crate::store::{ProjectStore, StoreError};

pub const REPORT_COLUMNS: [&str; 4] = ["name", "project_id", "year", "cost"];

/// Joins the reference table onto the fact table for reporting.
pub struct Aggregator<'a, S: ProjectStore> {
    store: &'a S,
}

impl<'a, S: ProjectStore> Aggregator<'a, S> {
    pub fn new(store: &'a S) -> Aggregator<'a, S> {
        Aggregator { store }
    }

    /// `Ok(None)` means there is nothing to report yet: one of the tables is
    /// empty, or no fact row references a known project.
    pub fn aggregate(&self) -> Result<Option<Table>, PipelineError> {
        let projects = self.store.projects().map_err(query_error)?;
        let data = self.store.project_data().map_err(query_error)?;
        if projects.is_empty() || data.is_empty() {
            info!("nothing to aggregate, projects={}, rows={}", projects.len(), data.len());
            return Ok(None);
        }

        let names: HashMap<ProjectId, &str> = projects
            .iter()
            .map(|project| (project.id(), project.name().as_str()))
            .collect();

        let mut table = Table::new(&REPORT_COLUMNS);
        for row in &data {
            match names.get(&row.project_id()) {
                Some(name) => table.push_row(vec![
                    Value::Text(name.to_string()),
                    Value::Int(row.project_id()),
                    Value::Int(i64::from(row.year())),
                    Value::Decimal(row.cost()),
                ]),
                None => debug!("dropping orphan fact row, project_id={}", row.project_id()),
            }
        }

        if table.is_empty() {
            return Ok(None);
        }
        info!("aggregated report table, rows={}", table.len());

        Ok(Some(table))
    }
}

fn query_error(err: StoreError) -> PipelineError {
    PipelineError::Connectivity(err.to_string())
}
