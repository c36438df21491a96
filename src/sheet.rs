use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use calamine::{open_workbook_auto, Data, Reader};
use log::debug;
use rust_decimal::Decimal;

use crate::error::PipelineError;
use crate::model::CostRecord;

/// File extensions accepted for upload, lower case and without the dot.
pub const SPREADSHEET_EXTENSIONS: [&str; 4] = ["xls", "xlsx", "xlsm", "csv"];

const REQUIRED_COLUMNS: [&str; 3] = ["name", "year", "cost"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Excel,
    Csv,
}

impl SheetFormat {
    pub fn from_path(path: &Path) -> Result<SheetFormat, PipelineError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("xls") | Some("xlsx") | Some("xlsm") => Ok(SheetFormat::Excel),
            Some("csv") => Ok(SheetFormat::Csv),
            _ => Err(PipelineError::Format(format!(
                "{} is not a spreadsheet, expected one of: {}",
                path.display(),
                SPREADSHEET_EXTENSIONS.join(", ")
            ))),
        }
    }
}

pub fn is_spreadsheet(file_name: &str) -> bool {
    SheetFormat::from_path(Path::new(file_name)).is_ok()
}

/// Parsed rows of the first worksheet, in file order.
#[derive(Debug, Default, PartialEq)]
pub struct Sheet {
    pub records: Vec<CostRecord>,
    /// Rows that were skipped because a cell could not be converted.
    pub rejected: Vec<PipelineError>,
}

impl Sheet {
    fn accept(&mut self, record: CostRecord) {
        if record.name.is_empty() {
            self.reject(record.row, "name is empty".to_string());
        } else {
            self.records.push(record);
        }
    }

    fn reject(&mut self, row: usize, reason: String) {
        debug!("skipping spreadsheet row, row={}, err={}", row, reason);
        self.rejected.push(PipelineError::Parse(format!("row {}: {}", row, reason)));
    }
}

pub fn parse(path: &Path) -> Result<Sheet, PipelineError> {
    let sheet = match SheetFormat::from_path(path)? {
        SheetFormat::Excel => parse_excel(path)?,
        SheetFormat::Csv => parse_csv(path)?,
    };
    debug!(
        "parsed spreadsheet, path={}, rows={}, rejected={}",
        path.display(),
        sheet.records.len(),
        sheet.rejected.len()
    );

    Ok(sheet)
}

struct Columns {
    name: usize,
    year: usize,
    cost: usize,
}

impl Columns {
    fn locate<I, S>(headers: I) -> Result<Columns, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let headers: Vec<String> = headers
            .into_iter()
            .map(|header| header.as_ref().trim().to_lowercase())
            .collect();
        let position = |column: &str| headers.iter().position(|header| header == column);

        let mut found = [0; REQUIRED_COLUMNS.len()];
        let mut missing = Vec::new();
        for (slot, column) in found.iter_mut().zip(REQUIRED_COLUMNS) {
            match position(column) {
                Some(at) => *slot = at,
                None => missing.push(column),
            }
        }
        if !missing.is_empty() {
            return Err(PipelineError::Parse(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        let [name, year, cost] = found;
        Ok(Columns { name, year, cost })
    }
}

fn parse_excel(path: &Path) -> Result<Sheet, PipelineError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|err| PipelineError::Parse(format!("cannot open {}: {}", path.display(), err)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::Parse("workbook has no worksheet".to_string()))?
        .map_err(|err| PipelineError::Parse(err.to_string()))?;

    // Rows before the first non-empty cell are not part of the range.
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| PipelineError::Parse("worksheet is empty".to_string()))?;
    let columns = Columns::locate(header.iter().map(|cell| cell_text(cell).unwrap_or_default()))?;

    let mut sheet = Sheet::default();
    for (index, cells) in rows.enumerate() {
        let row = first_row + index + 2;
        if cells.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }

        let cell = |at: usize| cells.get(at).cloned().unwrap_or(Data::Empty);
        match (
            cell_text(&cell(columns.name)),
            cell_year(&cell(columns.year)),
            cell_cost(&cell(columns.cost)),
        ) {
            (Some(name), Ok(year), Ok(cost)) => sheet.accept(CostRecord::new(row, name, year, cost)),
            (None, _, _) => sheet.reject(row, "name is empty".to_string()),
            (_, Err(err), _) => sheet.reject(row, format!("invalid year: {}", err)),
            (_, _, Err(err)) => sheet.reject(row, format!("invalid cost: {}", err)),
        }
    }

    Ok(sheet)
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        _ => return None,
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn cell_year(cell: &Data) -> Result<i32, String> {
    match cell {
        Data::Int(i) => i32::try_from(*i).map_err(|err| err.to_string()),
        // Spreadsheets store every number as a float.
        Data::Float(f) if f.fract() == 0.0 && *f >= i32::MIN as f64 && *f <= i32::MAX as f64 => Ok(*f as i32),
        Data::String(s) => s.trim().parse::<i32>().map_err(|err| err.to_string()),
        Data::Empty => Err("empty cell".to_string()),
        other => Err(format!("unexpected cell {:?}", other)),
    }
}

fn cell_cost(cell: &Data) -> Result<Decimal, String> {
    match cell {
        Data::Int(i) => Ok(Decimal::from(*i)),
        Data::Float(f) => Decimal::try_from(*f).map_err(|err| err.to_string()),
        Data::String(s) => Decimal::from_str(s.trim()).map_err(|err| err.to_string()),
        Data::Empty => Err("empty cell".to_string()),
        other => Err(format!("unexpected cell {:?}", other)),
    }
}

fn parse_csv(path: &Path) -> Result<Sheet, PipelineError> {
    let file = File::open(path)
        .map_err(|err| PipelineError::Parse(format!("cannot open {}: {}", path.display(), err)))?;
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let headers: csv::StringRecord = csv_reader
        .headers()
        .map_err(|err| PipelineError::Parse(err.to_string()))?
        .iter()
        .map(|header| header.to_lowercase())
        .collect();
    Columns::locate(&headers)?;

    // Blank lines are skipped by the reader, so rows are numbered by the
    // line they start on.
    let line_of = |position: Option<&csv::Position>| position.map_or(0, |pos| pos.line() as usize);

    let mut sheet = Sheet::default();
    for record in csv_reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                sheet.reject(line_of(err.position()), err.to_string());
                continue;
            },
        };

        let row = line_of(record.position());
        match record.deserialize::<CostRecord>(Some(&headers)) {
            Ok(mut cost) => {
                cost.row = row;
                sheet.accept(cost);
            },
            Err(err) => sheet.reject(row, err.to_string()),
        }
    }

    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::{bail, Result};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    fn write_csv(dir: &tempfile::TempDir, name: &str, contents: &str) -> Result<std::path::PathBuf> {
        let path = dir.path().join(name);
        let mut file = File::create(&path)?;
        file.write_all(contents.as_bytes())?;
        Ok(path)
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SheetFormat::from_path(Path::new("costs.XLSX")), Ok(SheetFormat::Excel));
        assert_eq!(SheetFormat::from_path(Path::new("costs.xls")), Ok(SheetFormat::Excel));
        assert_eq!(SheetFormat::from_path(Path::new("costs.xlsm")), Ok(SheetFormat::Excel));
        assert_eq!(SheetFormat::from_path(Path::new("costs.csv")), Ok(SheetFormat::Csv));
        assert!(is_spreadsheet("report.Xlsx"));
        assert!(!is_spreadsheet("report.pdf"));
        assert!(!is_spreadsheet("xlsx"));
    }

    #[test]
    fn test_unknown_extension_is_format_error() -> Result<()> {
        match parse(Path::new("/nonexistent/costs.txt")) {
            Err(PipelineError::Format(_)) => Ok(()),
            other => bail!("expected a format error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_csv() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_csv(
            &dir,
            "costs.csv",
            "\
Name, Year, Cost, Owner
Alpha, 2023, 100, ann
Alpha, 2024, 150.25, ann

Beta,  2023, 7, bob
",
        )?;

        let sheet = parse(&path)?;
        assert_eq!(
            sheet.records,
            vec![
                CostRecord::new(2, "Alpha", 2023, dec!(100)),
                CostRecord::new(3, "Alpha", 2024, dec!(150.25)),
                CostRecord::new(5, "Beta", 2023, dec!(7)),
            ]
        );
        assert!(sheet.rejected.is_empty());

        Ok(())
    }

    #[test]
    fn test_parse_csv_rejects_bad_rows() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_csv(
            &dir,
            "costs.csv",
            "\
name,year,cost
Alpha,2023,100
Alpha,soon,150
,2024,3
Gamma,2024,lots
",
        )?;

        let sheet = parse(&path)?;
        assert_eq!(sheet.records, vec![CostRecord::new(2, "Alpha", 2023, dec!(100))]);
        assert_eq!(sheet.rejected.len(), 3);
        assert!(sheet.rejected.iter().all(|err| matches!(err, PipelineError::Parse(_))));
        assert!(sheet.rejected[1].to_string().contains("row 4"));

        Ok(())
    }

    #[test]
    fn test_csv_rows_keep_file_line_numbers() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_csv(&dir, "costs.csv", "name,year,cost\nAlpha,2023,1\n\n\nBeta,soon,2\nGamma,2024\n")?;

        let sheet = parse(&path)?;
        assert_eq!(sheet.records, vec![CostRecord::new(2, "Alpha", 2023, dec!(1))]);
        assert_eq!(sheet.rejected.len(), 2);
        assert!(sheet.rejected[0].to_string().contains("row 5:"));
        assert!(sheet.rejected[1].to_string().contains("row 6:"));

        Ok(())
    }

    #[test]
    fn test_excel_rows_offset_by_first_cell() -> Result<()> {
        let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/offset.xlsx"));

        // Header sits in B3, row 5 is blank.
        let sheet = parse(path)?;
        assert_eq!(
            sheet.records,
            vec![
                CostRecord::new(4, "Alpha", 2023, dec!(100)),
                CostRecord::new(7, "Beta", 2024, dec!(8)),
            ]
        );
        assert_eq!(sheet.rejected.len(), 1);
        assert!(sheet.rejected[0].to_string().contains("row 6: invalid year"));

        Ok(())
    }

    #[test]
    fn test_missing_column_is_parse_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_csv(&dir, "costs.csv", "name,year\nAlpha,2023\n")?;

        match parse(&path) {
            Err(PipelineError::Parse(msg)) => assert!(msg.contains("cost")),
            other => bail!("expected a parse error, got {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn test_locate_columns() -> Result<()> {
        let columns = Columns::locate(["Cost ", "owner", "YEAR", "name"])?;
        assert_eq!((columns.name, columns.year, columns.cost), (3, 2, 0));

        match Columns::locate(["year"]) {
            Err(PipelineError::Parse(msg)) => assert_eq!(msg, "missing required columns: name, cost"),
            Err(other) => bail!("expected a parse error, got {:?}", other),
            Ok(_) => bail!("expected missing columns"),
        }

        Ok(())
    }

    #[test]
    fn test_corrupt_workbook_is_parse_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_csv(&dir, "costs.xlsx", "this is not a zip archive")?;

        match parse(&path) {
            Err(PipelineError::Parse(_)) => Ok(()),
            other => bail!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_excel_cells() {
        assert_eq!(cell_year(&Data::Float(2023.0)), Ok(2023));
        assert_eq!(cell_year(&Data::Int(2024)), Ok(2024));
        assert_eq!(cell_year(&Data::String(" 2025 ".to_string())), Ok(2025));
        assert!(cell_year(&Data::Float(2023.5)).is_err());
        assert!(cell_year(&Data::Empty).is_err());

        assert_eq!(cell_cost(&Data::Float(150.5)), Ok(dec!(150.5)));
        assert_eq!(cell_cost(&Data::Int(100)), Ok(dec!(100)));
        assert_eq!(cell_cost(&Data::String("42.10".to_string())), Ok(dec!(42.10)));
        assert!(cell_cost(&Data::Bool(true)).is_err());

        assert_eq!(cell_text(&Data::String("  Alpha ".to_string())), Some("Alpha".to_string()));
        assert_eq!(cell_text(&Data::String("   ".to_string())), None);
        assert_eq!(cell_text(&Data::Empty), None);
    }
}
