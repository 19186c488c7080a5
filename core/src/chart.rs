use std::io::Cursor;
use std::ops::Range;

use plotters::coord::Shift;
use plotters::element::Pie;
use plotters::prelude::*;
use serde::Serialize;

use crate::error::ExportError;
use crate::models::{FilteredResult, NutrientTotals};

pub const BAR_CHART_TITLE: &str = "Total de Nutrientes por Alimento";
pub const BAR_CHART_FILE_TITLE: &str = "grafico_barras";

const BAR_SIZE: (u32, u32) = (1000, 700);
const PIE_SIZE: (u32, u32) = (640, 480);

/// Pixels per inch assumed when placing rendered charts on PDF pages.
pub const RENDER_DPI: f32 = 100.0;

// matplotlib "tab10"
const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

fn palette(index: usize) -> RGBColor {
    PALETTE[index % PALETTE.len()]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarSeries {
    pub label: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartKind {
    /// One horizontal bar per category, stacked by series.
    StackedBar {
        x_label: String,
        y_label: String,
        categories: Vec<String>,
        series: Vec<BarSeries>,
    },
    Pie { slices: Vec<PieSlice> },
}

/// A renderable chart description, decoupled from any output format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    /// Caption drawn on the chart.
    pub title: String,
    /// Name used for the chart's file inside exports, without extension.
    pub file_title: String,
    pub width: u32,
    pub height: u32,
    pub kind: ChartKind,
}

/// Outcome of building the pie chart for one nutrient.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NutrientPie {
    Drawn { nutrient: String, chart: Chart },
    NoData { nutrient: String },
}

impl NutrientPie {
    #[must_use]
    pub fn nutrient(&self) -> &str {
        match self {
            Self::Drawn { nutrient, .. } | Self::NoData { nutrient } => nutrient,
        }
    }

    #[must_use]
    pub fn chart(&self) -> Option<&Chart> {
        match self {
            Self::Drawn { chart, .. } => Some(chart),
            Self::NoData { .. } => None,
        }
    }
}

#[must_use]
pub fn pie_title(nutrient: &str, total: f64) -> String {
    format!("{nutrient} (Total: {total:.2})")
}

/// Stacked horizontal bar chart: foods on the vertical axis in result order,
/// one segment per nutrient column.
#[must_use]
pub fn build_bar_chart(result: &FilteredResult, columns: &[String]) -> Chart {
    let categories = result.rows.iter().map(|r| r.name.clone()).collect();
    let series = columns
        .iter()
        .map(|column| {
            let index = result.columns.iter().position(|c| c == column);
            BarSeries {
                label: column.clone(),
                values: result
                    .rows
                    .iter()
                    .map(|r| index.map_or(0.0, |i| r.values[i]))
                    .collect(),
            }
        })
        .collect();

    Chart {
        title: BAR_CHART_TITLE.to_string(),
        file_title: BAR_CHART_FILE_TITLE.to_string(),
        width: BAR_SIZE.0,
        height: BAR_SIZE.1,
        kind: ChartKind::StackedBar {
            x_label: "Quantidade".to_string(),
            y_label: "Alimento".to_string(),
            categories,
            series,
        },
    }
}

/// One pie per nutrient column showing each food's share of the total.
///
/// Rows with the same name are summed first; only foods with a strictly
/// positive sum become slices, in first-appearance order. A nutrient with no
/// such food yields [`NutrientPie::NoData`].
#[must_use]
pub fn build_pie_charts(
    result: &FilteredResult,
    columns: &[String],
    totals: &NutrientTotals,
) -> Vec<NutrientPie> {
    columns
        .iter()
        .map(|column| {
            let Some(index) = result.columns.iter().position(|c| c == column) else {
                return NutrientPie::NoData {
                    nutrient: column.clone(),
                };
            };

            let mut grouped: Vec<PieSlice> = Vec::new();
            for row in &result.rows {
                let value = row.values[index];
                match grouped.iter_mut().find(|s| s.label == row.name) {
                    Some(slice) => slice.value += value,
                    None => grouped.push(PieSlice {
                        label: row.name.clone(),
                        value,
                    }),
                }
            }
            grouped.retain(|s| s.value > 0.0);

            if grouped.is_empty() {
                return NutrientPie::NoData {
                    nutrient: column.clone(),
                };
            }

            let total = totals.get(column).unwrap_or(0.0);
            NutrientPie::Drawn {
                nutrient: column.clone(),
                chart: Chart {
                    title: pie_title(column, total),
                    file_title: format!("grafico_pizza_{column}"),
                    width: PIE_SIZE.0,
                    height: PIE_SIZE.1,
                    kind: ChartKind::Pie { slices: grouped },
                },
            }
        })
        .collect()
}

fn render_error<E: std::fmt::Display>(e: E) -> ExportError {
    ExportError::Render(e.to_string())
}

impl Chart {
    /// Rasterize into a packed RGB8 buffer of `width * height * 3` bytes.
    pub fn render_rgb(&self) -> Result<Vec<u8>, ExportError> {
        let mut buffer = vec![0u8; self.width as usize * self.height as usize * 3];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (self.width, self.height))
                .into_drawing_area();
            root.fill(&WHITE).map_err(render_error)?;
            let drawn = match &self.kind {
                ChartKind::StackedBar {
                    x_label,
                    y_label,
                    categories,
                    series,
                } => draw_stacked_bar(&root, &self.title, x_label, y_label, categories, series),
                ChartKind::Pie { slices } => draw_pie(&root, &self.title, slices),
            };
            drawn.map_err(render_error)?;
            root.present().map_err(render_error)?;
        }
        Ok(buffer)
    }

    pub fn to_png(&self) -> Result<Vec<u8>, ExportError> {
        let rgb = self.render_rgb()?;
        let image = image::RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| ExportError::Render("render buffer size mismatch".to_string()))?;
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image).write_to(&mut out, image::ImageOutputFormat::Png)?;
        Ok(out.into_inner())
    }
}

fn to_i32(v: usize) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// Share of each row's unit band covered by its bar.
const BAR_HEIGHT: f64 = 0.8;

/// Vertical axis for `rows` bars: one unit per row, centred on the row index.
#[allow(clippy::cast_precision_loss)]
fn row_axis(rows: usize) -> Range<f64> {
    -0.5..(rows.max(1) as f64 - 0.5)
}

/// Lower and upper edge of the bar drawn for `row`.
#[allow(clippy::cast_precision_loss)]
fn row_band(row: usize) -> (f64, f64) {
    let center = row as f64;
    (center - BAR_HEIGHT / 2.0, center + BAR_HEIGHT / 2.0)
}

/// Category name for a tick on a row centre, empty for any other tick.
#[allow(clippy::cast_sign_loss)]
fn row_label(categories: &[String], tick: f64) -> String {
    let nearest = tick.round();
    if nearest < 0.0 || (tick - nearest).abs() > 1e-6 {
        return String::new();
    }
    categories
        .get(nearest as usize)
        .cloned()
        .unwrap_or_default()
}

fn draw_stacked_bar<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    title: &str,
    x_label: &str,
    y_label: &str,
    categories: &[String],
    series: &[BarSeries],
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let rows = categories.len();
    let x_max = (0..rows)
        .map(|i| series.iter().map(|s| s.values[i].max(0.0)).sum::<f64>())
        .fold(0.0, f64::max);
    let x_max = if x_max > 0.0 { x_max * 1.05 } else { 1.0 };

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 24).into_font())
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(180)
        .build_cartesian_2d(0f64..x_max, row_axis(rows))?;

    let label_for = |tick: &f64| row_label(categories, *tick);

    chart
        .configure_mesh()
        .disable_y_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .y_labels(rows.max(1))
        .y_label_formatter(&label_for)
        .draw()?;

    let mut offsets = vec![0.0_f64; rows];
    for (s_idx, s) in series.iter().enumerate() {
        let color = palette(s_idx);
        let bars: Vec<_> = s
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let start = offsets[i];
                offsets[i] += v.max(0.0);
                let (low, high) = row_band(i);
                Rectangle::new([(start, low), (offsets[i], high)], color.filled())
            })
            .collect();
        chart
            .draw_series(bars)?
            .label(s.label.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    Ok(())
}

fn draw_pie<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    title: &str,
    slices: &[PieSlice],
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let area = root.titled(title, ("sans-serif", 20).into_font())?;
    let (w, h) = area.dim_in_pixel();
    let center = (to_i32((w / 2) as usize), to_i32((h / 2) as usize));
    let radius = f64::from(w.min(h)) * 0.35;

    let sizes: Vec<f64> = slices.iter().map(|s| s.value).collect();
    let colors: Vec<RGBColor> = (0..slices.len()).map(palette).collect();
    let labels: Vec<&str> = slices.iter().map(|s| s.label.as_str()).collect();

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.start_angle(90.0);
    pie.label_style(("sans-serif", 14).into_font().color(&BLACK));
    pie.percentages(("sans-serif", 12).into_font().color(&WHITE));
    area.draw(&pie)?;
    Ok(())
}
