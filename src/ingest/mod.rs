use std::path::Path;

use log::info;

use crate::error::PipelineError;
use crate::sheet::{self, Sheet};
use crate::store::ProjectStore;

pub mod reconcile;
pub mod writer;

use reconcile::Reconciler;
use writer::FactWriter;

/// What one upload did to the store.
#[derive(Debug, Default, PartialEq)]
pub struct IngestSummary {
    pub parsed: usize,
    pub new_projects: usize,
    pub written: usize,
    /// Parse, reconciliation and write errors, in that order.
    pub errors: Vec<PipelineError>,
}

impl IngestSummary {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|err| err.to_string()).collect()
    }
}

/// Upload path: spreadsheet parser, then reconciler, then fact writer.
pub struct Ingestor<'a, S: ProjectStore> {
    reconciler: Reconciler<'a, S>,
    writer: FactWriter<'a, S>,
}

impl<'a, S: ProjectStore> Ingestor<'a, S> {
    pub fn new(store: &'a S) -> Ingestor<'a, S> {
        Ingestor {
            reconciler: Reconciler::new(store),
            writer: FactWriter::new(store),
        }
    }

    /// Fails only when the file as a whole is unusable; row-level problems end
    /// up in the summary.
    pub fn ingest(&self, path: &Path) -> Result<IngestSummary, PipelineError> {
        let sheet = sheet::parse(path)?;
        let summary = self.ingest_sheet(sheet);
        info!(
            "ingested spreadsheet, path={}, parsed={}, written={}, errors={}",
            path.display(),
            summary.parsed,
            summary.written,
            summary.errors.len()
        );

        Ok(summary)
    }

    pub fn ingest_sheet(&self, sheet: Sheet) -> IngestSummary {
        let Sheet { records, rejected } = sheet;
        let mut errors = rejected;

        let reconciled = self.reconciler.reconcile(&records);
        errors.extend(reconciled.errors);

        let written = self.writer.write(&reconciled.value.rows);
        errors.extend(written.errors);

        IngestSummary {
            parsed: records.len(),
            new_projects: reconciled.value.new_projects,
            written: written.value,
            errors,
        }
    }
}
