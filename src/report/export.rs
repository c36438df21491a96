use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;

use super::table::Table;
use super::ReportRenderer;
use crate::error::PipelineError;
use crate::files;

const EXPORT_COLUMNS: [&str; 3] = ["name", "year", "cost"];

/// Writes the report table as CSV, one line per fact row.
#[derive(Debug, Clone, Default)]
pub struct CsvExport;

impl ReportRenderer for CsvExport {
    fn render(&self, table: &Table, output_dir: &Path) -> Result<PathBuf, PipelineError> {
        table.require(&EXPORT_COLUMNS)?;

        std::fs::create_dir_all(output_dir).map_err(|err| {
            PipelineError::Render(format!("cannot create {}: {}", output_dir.display(), err))
        })?;
        let path = output_dir.join(files::unique_file_name("report", "csv"));
        let file = File::create(&path).map_err(|err| PipelineError::Render(err.to_string()))?;
        export_csv(table, file)?;
        info!("exported report, path={}", path.display());

        Ok(path)
    }
}

pub fn export_csv<W: Write>(table: &Table, writer: W) -> Result<(), PipelineError> {
    table.require(&EXPORT_COLUMNS)?;

    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    csv_writer.write_record(table.columns()).map_err(export_error)?;
    for row in table.rows() {
        let record: Vec<String> = (0..table.columns().len())
            .map(|at| row.get(at).map(|value| value.to_string()).unwrap_or_default())
            .collect();
        csv_writer.write_record(&record).map_err(export_error)?;
    }

    csv_writer.flush().map_err(|err| PipelineError::Render(err.to_string()))?;

    Ok(())
}

fn export_error(err: csv::Error) -> PipelineError {
    PipelineError::Render(err.to_string())
}
