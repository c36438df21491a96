use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::error::{BatchOutcome, PipelineError};
use crate::model::{CostRecord, ProjectData, ProjectId};
use crate::store::{ProjectStore, StoreError};

#[derive(Debug, Default, PartialEq)]
pub struct Reconciled {
    pub rows: Vec<ProjectData>,
    /// Reference rows created by this call.
    pub new_projects: usize,
}

/// Resolves project names to reference table ids, inserting the names it has
/// never seen.
pub struct Reconciler<'a, S: ProjectStore> {
    store: &'a S,
}

impl<'a, S: ProjectStore> Reconciler<'a, S> {
    pub fn new(store: &'a S) -> Reconciler<'a, S> {
        Reconciler { store }
    }

    /// Rows whose name cannot be resolved are left out of the result and
    /// reported, one error per row.
    pub fn reconcile(&self, records: &[CostRecord]) -> BatchOutcome<Reconciled> {
        let mut errors = Vec::new();

        let mut seen = HashSet::new();
        let names: Vec<&str> = records
            .iter()
            .map(|record| record.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect();

        let mut new_projects = 0;
        for name in names {
            match self.store.insert_project(name) {
                Ok(true) => new_projects += 1,
                Ok(false) => {},
                Err(err) => {
                    debug!("failed to insert project, name={}, err={}", name, err);
                    errors.push(insert_error(name, err));
                },
            }
        }

        let ids: HashMap<String, ProjectId> = match self.store.projects() {
            Ok(projects) => projects
                .into_iter()
                .map(|project| (project.name().clone(), project.id()))
                .collect(),
            Err(err) => {
                debug!("failed to read projects, err={}", err);
                errors.push(PipelineError::from_store(err));
                HashMap::new()
            },
        };

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            if let Some(id) = ids.get(&record.name) {
                rows.push(ProjectData::new(*id, record.year, record.cost));
            } else {
                errors.push(PipelineError::Reconciliation(format!(
                    "row {}: no project id for {:?}",
                    record.row, record.name
                )));
            }
        }

        info!(
            "reconciled rows, resolved={}, unresolved={}, new_projects={}",
            rows.len(),
            records.len() - rows.len(),
            new_projects
        );

        BatchOutcome::new(Reconciled { rows, new_projects }, errors)
    }
}

fn insert_error(name: &str, err: StoreError) -> PipelineError {
    match err {
        StoreError::Rejected(msg) => PipelineError::Reconciliation(format!("cannot insert project {:?}: {}", name, msg)),
        other => PipelineError::from_store(other),
    }
}
