use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{debug, info};
use plotters::backend::RGBPixel;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::FontStyle;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::table::{Table, Value};
use super::ReportRenderer;
use crate::error::PipelineError;
use crate::files;

const CHART_COLUMNS: [&str; 3] = ["name", "year", "cost"];
const SIZE: (u32, u32) = (1000, 600);

static BUNDLED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");
const BUNDLED_FAMILY: &str = "costsheet-sans";
const CUSTOM_FAMILY: &str = "costsheet-custom";
static BUNDLED_REGISTERED: OnceLock<bool> = OnceLock::new();

/// One line of the chart: a project's cost per year.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub points: Vec<(i32, Decimal)>,
}

/// Plots cost against year, one line per project, with a legend keyed by
/// project name.
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    family: &'static str,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        ChartRenderer::new()
    }
}

impl ChartRenderer {
    /// Uses the DejaVu Sans font shipped with the crate.
    pub fn new() -> ChartRenderer {
        ChartRenderer {
            family: BUNDLED_FAMILY,
        }
    }

    /// Uses the TTF at `path` for every text element instead of the bundled
    /// font. Fonts are registered process wide, so the last one loaded wins.
    pub fn with_font(path: &Path) -> Result<ChartRenderer, PipelineError> {
        let bytes = fs::read(path)
            .map_err(|err| PipelineError::Render(format!("cannot read font {}: {}", path.display(), err)))?;

        // plotters keeps registered fonts for the life of the process.
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        plotters::style::register_font(CUSTOM_FAMILY, FontStyle::Normal, bytes)
            .map_err(|_| PipelineError::Render(format!("{} is not a usable font", path.display())))?;
        info!("registered chart font, path={}", path.display());

        Ok(ChartRenderer {
            family: CUSTOM_FAMILY,
        })
    }

    /// Draws `series` into an RGB buffer of 1000x600 pixels instead of a file.
    pub fn render_rgb(&self, series: &[Series], buffer: &mut [u8]) -> Result<(), PipelineError> {
        let backend = BitMapBackend::<RGBPixel>::with_buffer_and_format(buffer, SIZE).map_err(render_error)?;
        self.draw(backend.into_drawing_area(), series)
    }

    /// The series `render` draws, grouped by project name and sorted by year.
    pub fn plan(&self, table: &Table) -> Result<Vec<Series>, PipelineError> {
        let columns = table.require(&CHART_COLUMNS)?;
        let (name_at, year_at, cost_at) = (columns[0], columns[1], columns[2]);

        let mut groups: BTreeMap<String, Vec<(i32, Decimal)>> = BTreeMap::new();
        for (index, row) in table.rows().iter().enumerate() {
            let name = match row.get(name_at) {
                Some(Value::Text(name)) => name.clone(),
                other => return Err(cell_error("name", index, other)),
            };
            let year = match row.get(year_at) {
                Some(Value::Int(year)) => i32::try_from(*year).map_err(|_| cell_error("year", index, row.get(year_at)))?,
                other => return Err(cell_error("year", index, other)),
            };
            let cost = match row.get(cost_at) {
                Some(Value::Decimal(cost)) => *cost,
                Some(Value::Int(cost)) => Decimal::from(*cost),
                other => return Err(cell_error("cost", index, other)),
            };

            groups.entry(name).or_default().push((year, cost));
        }

        Ok(groups
            .into_iter()
            .map(|(name, mut points)| {
                points.sort_by_key(|(year, _)| *year);
                Series { name, points }
            })
            .collect())
    }

    fn draw<DB: DrawingBackend>(&self, root: DrawingArea<DB, Shift>, series: &[Series]) -> Result<(), PipelineError> {
        ensure_bundled_font()?;
        let family = self.family;

        root.fill(&WHITE).map_err(render_error)?;

        let (years, costs) = bounds(series);
        let year_labels = ((years.end - years.start) as usize + 1).min(12);
        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .caption("Cost vs. Year", (family, 24))
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(years, costs)
            .map_err(render_error)?;

        chart
            .configure_mesh()
            .x_desc("Year")
            .y_desc("Cost")
            .x_labels(year_labels)
            .x_label_formatter(&|year| format!("{:.0}", year))
            .label_style((family, 14))
            .axis_desc_style((family, 16))
            .draw()
            .map_err(render_error)?;

        for (index, line) in series.iter().enumerate() {
            let color = Palette99::pick(index).mix(1.0);
            let points: Vec<(f64, f64)> = line
                .points
                .iter()
                .map(|(year, cost)| (f64::from(*year), cost.to_f64().unwrap_or_default()))
                .collect();

            chart
                .draw_series(LineSeries::new(points, color.stroke_width(2)).point_size(4))
                .map_err(render_error)?
                .label(line.name.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }

        chart
            .configure_series_labels()
            .label_font((family, 14))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_error)?;

        root.present().map_err(render_error)?;

        Ok(())
    }
}

impl ReportRenderer for ChartRenderer {
    /// Writes `<timestamp>_<random>_plot.png` into `output_dir`. The table is
    /// validated before anything is written.
    fn render(&self, table: &Table, output_dir: &Path) -> Result<PathBuf, PipelineError> {
        let series = self.plan(table)?;

        fs::create_dir_all(output_dir).map_err(|err| {
            PipelineError::Render(format!("cannot create {}: {}", output_dir.display(), err))
        })?;
        let path = output_dir.join(files::unique_file_name("plot", "png"));

        let drawn = self.draw(BitMapBackend::new(&path, SIZE).into_drawing_area(), &series);
        if let Err(err) = drawn {
            // Don't leave a half written image behind.
            let _ = fs::remove_file(&path);
            return Err(err);
        }
        debug!("chart series, series={}", series.len());
        info!("rendered chart, path={}", path.display());

        Ok(path)
    }
}

fn bounds(series: &[Series]) -> (Range<f64>, Range<f64>) {
    let points = series.iter().flat_map(|line| line.points.iter());

    let mut years = (f64::MAX, f64::MIN);
    let mut costs = (0.0_f64, 0.0_f64);
    for (year, cost) in points {
        let year = f64::from(*year);
        let cost = cost.to_f64().unwrap_or_default();
        years = (years.0.min(year), years.1.max(year));
        costs = (costs.0.min(cost), costs.1.max(cost));
    }

    if years.0 > years.1 {
        years = (0.0, 0.0);
    }
    let headroom = ((costs.1 - costs.0) * 0.1).max(1.0);

    // One year of padding keeps the end markers off the plot border.
    (years.0 - 1.0..years.1 + 1.0, costs.0..costs.1 + headroom)
}

fn ensure_bundled_font() -> Result<(), PipelineError> {
    let registered = *BUNDLED_REGISTERED
        .get_or_init(|| plotters::style::register_font(BUNDLED_FAMILY, FontStyle::Normal, BUNDLED_FONT).is_ok());
    if registered {
        Ok(())
    } else {
        Err(PipelineError::Render("bundled chart font is not usable".to_string()))
    }
}

fn cell_error(column: &str, row: usize, cell: Option<&Value>) -> PipelineError {
    match cell {
        Some(value) => PipelineError::Schema(format!("row {}: unexpected {} value {:?}", row, column, value)),
        None => PipelineError::Schema(format!("row {}: {} is empty", row, column)),
    }
}

fn render_error<E: std::fmt::Display>(err: E) -> PipelineError {
    PipelineError::Render(err.to_string())
}
