use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use log::{error, info, warn};

use costsheet::config::Config;
use costsheet::ingest::Ingestor;
use costsheet::report::chart::ChartRenderer;
use costsheet::report::{aggregate::Aggregator, build_report, export, Report};
use costsheet::server::{self, AppState};
use costsheet::store::SqliteStore;

const USAGE: &str = "Usage: costsheet serve | costsheet ingest <file> | costsheet report [--csv]";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let command = match (args.get(1).map(String::as_str), args.len()) {
        (Some("serve"), 2) => Command::Serve,
        (Some("ingest"), 3) => Command::Ingest(args[2].clone()),
        (Some("report"), 2) => Command::Report { csv: false },
        (Some("report"), 3) if args[2] == "--csv" => Command::Report { csv: true },
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        },
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {}", err);
            std::process::exit(1);
        },
    };
    config.prepare_dirs()?;

    let store = SqliteStore::open(&config.database_path)?;
    store.init(&config.ddl_path)?;

    let chart = match &config.chart_font {
        Some(font) => ChartRenderer::with_font(font)?,
        None => ChartRenderer::new(),
    };

    match command {
        Command::Serve => serve(config, store, chart),
        Command::Ingest(file) => {
            ingest(&store, Path::new(&file))?;
            store.close()?;
            Ok(())
        },
        Command::Report { csv } => {
            report(&store, &config, chart, csv)?;
            store.close()?;
            Ok(())
        },
    }
}

enum Command {
    Serve,
    Ingest(String),
    Report { csv: bool },
}

fn serve(config: Config, store: SqliteStore, chart: ChartRenderer) -> Result<()> {
    let state = Arc::new(AppState { config, store, chart });

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(server::serve(state.clone()))?;

    match Arc::try_unwrap(state) {
        Ok(state) => state.store.close()?,
        Err(_) => warn!("store still in use at shutdown, leaving it to drop"),
    }

    Ok(())
}

fn ingest(store: &SqliteStore, path: &Path) -> Result<()> {
    let summary = Ingestor::new(store).ingest(path)?;

    for message in summary.messages() {
        eprintln!("{}", message);
    }
    info!(
        "rows={}, new_projects={}, written={}",
        summary.parsed, summary.new_projects, summary.written
    );

    Ok(())
}

fn report(store: &SqliteStore, config: &Config, chart: ChartRenderer, csv: bool) -> Result<()> {
    if csv {
        match Aggregator::new(store).aggregate()? {
            Some(table) => export::export_csv(&table, std::io::stdout())?,
            None => warn!("no data to export"),
        }
        return Ok(());
    }

    match build_report(store, &Report::from(chart), &config.plot_dir)? {
        Some(path) => println!("{}", path.display()),
        None => warn!("no data to plot"),
    }

    Ok(())
}
