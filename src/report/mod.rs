use std::path::{Path, PathBuf};

use enum_dispatch::enum_dispatch;

use crate::error::PipelineError;
use crate::store::ProjectStore;

pub mod aggregate;
pub mod chart;
pub mod export;
pub mod table;

use aggregate::Aggregator;
use chart::ChartRenderer;
use export::CsvExport;
use table::Table;

#[enum_dispatch]
pub trait ReportRenderer {
    /// Writes the rendered table into `output_dir` and returns the file path.
    fn render(&self, table: &Table, output_dir: &Path) -> Result<PathBuf, PipelineError>;
}

#[enum_dispatch(ReportRenderer)]
pub enum Report {
    ChartRenderer,
    CsvExport,
}

/// Report path: aggregate the store, then render. `Ok(None)` when there is
/// no data to report on.
pub fn build_report<S: ProjectStore>(
    store: &S,
    report: &Report,
    output_dir: &Path,
) -> Result<Option<PathBuf>, PipelineError> {
    match Aggregator::new(store).aggregate()? {
        Some(table) => report.render(&table, output_dir).map(Some),
        None => Ok(None),
    }
}
