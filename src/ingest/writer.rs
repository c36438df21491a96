use log::{debug, info};

use crate::error::{BatchOutcome, PipelineError};
use crate::model::ProjectData;
use crate::store::{ProjectStore, StoreError};

/// Appends reconciled rows to the fact table.
pub struct FactWriter<'a, S: ProjectStore> {
    store: &'a S,
}

impl<'a, S: ProjectStore> FactWriter<'a, S> {
    pub fn new(store: &'a S) -> FactWriter<'a, S> {
        FactWriter { store }
    }

    /// Best effort: a failing row is recorded and the next one is tried.
    /// The outcome value is the number of rows written.
    pub fn write(&self, rows: &[ProjectData]) -> BatchOutcome<usize> {
        let mut written = 0;
        let mut errors = Vec::new();

        for row in rows {
            match self.store.append_project_data(row) {
                Ok(()) => written += 1,
                Err(err) => {
                    debug!(
                        "failed to write row, project_id={}, year={}, err={}",
                        row.project_id(),
                        row.year(),
                        err
                    );
                    errors.push(write_error(row, err));
                },
            }
        }

        info!("wrote project data, written={}, failed={}", written, errors.len());

        BatchOutcome::new(written, errors)
    }
}

fn write_error(row: &ProjectData, err: StoreError) -> PipelineError {
    match err {
        StoreError::Unavailable(msg) => PipelineError::Connectivity(msg),
        other => PipelineError::Write(format!(
            "project {} year {} cost {}: {}",
            row.project_id(),
            row.year(),
            row.cost(),
            other
        )),
    }
}
