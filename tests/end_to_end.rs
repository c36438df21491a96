use std::path::Path;

use anyhow::{bail, Result};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use costsheet::ingest::Ingestor;
use costsheet::report::aggregate::Aggregator;
use costsheet::report::chart::{ChartRenderer, Series};
use costsheet::report::ReportRenderer;
use costsheet::store::{ProjectStore, SqliteStore};

fn open_store(dir: &Path) -> Result<SqliteStore> {
    let store = SqliteStore::open(&dir.join("costs.db"))?;
    store.init(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql")))?;
    Ok(store)
}

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

#[test]
fn test_upload_then_report() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_store(dir.path())?;

    let summary = Ingestor::new(&store).ingest(&fixture("alpha.xlsx"))?;
    assert!(summary.is_clean(), "unexpected errors: {:?}", summary.messages());
    assert_eq!(summary.new_projects, 1);
    assert_eq!(summary.written, 2);

    let projects = store.projects()?;
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name(), "Alpha");
    let data = store.project_data()?;
    assert_eq!(data.len(), 2);
    assert!(data.iter().all(|row| row.project_id() == projects[0].id()));

    let Some(table) = Aggregator::new(&store).aggregate()? else {
        bail!("expected data to report on");
    };
    let chart = ChartRenderer::new();
    assert_eq!(
        chart.plan(&table)?,
        vec![Series {
            name: "Alpha".to_string(),
            points: vec![(2023, dec!(100)), (2024, dec!(150))],
        }]
    );

    let plots = dir.path().join("plots");
    let path = chart.render(&table, &plots)?;
    assert!(path.exists());
    assert_eq!(std::fs::read_dir(&plots)?.count(), 1);

    store.close()?;

    Ok(())
}

#[test]
fn test_reupload_reuses_project() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_store(dir.path())?;
    let ingestor = Ingestor::new(&store);

    ingestor.ingest(&fixture("alpha.xlsx"))?;
    let first_id = store.projects()?[0].id();

    let summary = ingestor.ingest(&fixture("alpha.xlsx"))?;
    assert_eq!(summary.new_projects, 0);
    assert_eq!(summary.written, 2);

    let projects = store.projects()?;
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].id(), first_id);
    assert_eq!(store.project_data()?.len(), 4);

    Ok(())
}

#[test]
fn test_store_survives_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let store = open_store(dir.path())?;
    Ingestor::new(&store).ingest(&fixture("alpha.xlsx"))?;
    store.close()?;

    let store = open_store(dir.path())?;
    assert_eq!(store.projects()?.len(), 1);
    assert_eq!(store.project_data()?.len(), 2);

    Ok(())
}
