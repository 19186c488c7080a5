use std::fmt;
use std::io::{Cursor, Write};
use std::str::FromStr;

use image::ColorType;
use image::codecs::jpeg::JpegEncoder;
use printpdf::{
    ColorBits, ColorSpace, Image, ImageFilter, ImageTransform, ImageXObject, Mm, PdfDocument, Px,
};
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::aggregate::coerce_number;
use crate::chart::{Chart, RENDER_DPI};
use crate::error::ExportError;
use crate::models::{FilteredResult, FoodRow};

pub const SHEET_NAME: &str = "Resultados";

const PDF_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Pdf,
    Zip,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [Self::Csv, Self::Xlsx, Self::Pdf, Self::Zip];

    #[must_use]
    pub fn file_name(self, base_name: &str) -> String {
        match self {
            Self::Csv => format!("{base_name}.csv"),
            Self::Xlsx => format!("{base_name}.xlsx"),
            Self::Pdf => format!("{base_name}_graficos.pdf"),
            Self::Zip => format!("{base_name}_graficos_e_csv.zip"),
        }
    }

    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Pdf => "application/pdf",
            Self::Zip => "application/zip",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Pdf => "pdf",
            Self::Zip => "zip",
        };
        f.write_str(s)
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "excel" => Ok(Self::Xlsx),
            "pdf" => Ok(Self::Pdf),
            "zip" => Ok(Self::Zip),
            _ => Err(format!(
                "Unknown export format '{s}'. Supported: csv, xlsx, pdf, zip"
            )),
        }
    }
}

/// A finished export ready to hand to a download.
#[derive(Debug, Clone)]
pub struct Export {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Header plus one line per row, comma separated, no index column.
pub fn to_csv_bytes(result: &FilteredResult) -> Result<Vec<u8>, ExportError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(result.header())?;
    for row in &result.rows {
        let record = std::iter::once(row.name.clone()).chain(row.values.iter().map(f64::to_string));
        wtr.write_record(record)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    debug!(bytes = bytes.len(), rows = result.len(), "serialized CSV");
    Ok(bytes)
}

/// Read a CSV produced by [`to_csv_bytes`] back into a result.
pub fn parse_csv(bytes: &[u8]) -> Result<FilteredResult, ExportError> {
    let mut rdr = csv::Reader::from_reader(bytes);
    let headers = rdr.headers()?.clone();
    let mut names = headers.iter().map(ToString::to_string);
    let name_column = names.next().unwrap_or_default();
    let columns: Vec<String> = names.collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(FoodRow {
            name: record.get(0).unwrap_or("").to_string(),
            values: (1..=columns.len())
                .map(|i| coerce_number(record.get(i)))
                .collect(),
        });
    }

    Ok(FilteredResult {
        name_column,
        columns,
        rows,
    })
}

/// Single-sheet workbook named `Resultados` holding the same table as the CSV.
pub fn to_spreadsheet_bytes(result: &FilteredResult) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, header) in result.header().into_iter().enumerate() {
        sheet.write_string(0, col as u16, header)?;
    }
    for (r, row) in result.rows.iter().enumerate() {
        let line = (r + 1) as u32;
        sheet.write_string(line, 0, &row.name)?;
        for (c, value) in row.values.iter().enumerate() {
            sheet.write_number(line, (c + 1) as u16, *value)?;
        }
    }

    let bytes = workbook.save_to_buffer()?;
    debug!(bytes = bytes.len(), "serialized spreadsheet");
    Ok(bytes)
}

#[allow(clippy::cast_precision_loss)]
fn px_to_mm(px: u32) -> Mm {
    Mm(px as f32 * 25.4 / RENDER_DPI)
}

/// Chart raster as a DCT-encoded image, so pages stay small without relying
/// on the PDF writer's stream compression.
fn jpeg_image(chart: &Chart) -> Result<Image, ExportError> {
    let rgb = chart.render_rgb()?;
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, PDF_JPEG_QUALITY).encode(
        &rgb,
        chart.width,
        chart.height,
        ColorType::Rgb8,
    )?;

    Ok(Image::from(ImageXObject {
        width: Px(chart.width as usize),
        height: Px(chart.height as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: true,
        image_data: jpeg,
        image_filter: Some(ImageFilter::DCT),
        smask: None,
        clipping_bbox: None,
    }))
}

/// One page per chart, sized to the chart, in the order given.
pub fn to_pdf_bytes(charts: &[&Chart]) -> Result<Vec<u8>, ExportError> {
    let doc = PdfDocument::empty("prato");
    for chart in charts {
        let image = jpeg_image(chart)?;
        let (page, layer) = doc.add_page(
            px_to_mm(chart.width),
            px_to_mm(chart.height),
            chart.file_title.as_str(),
        );
        let layer = doc.get_page(page).get_layer(layer);
        image.add_to_layer(
            layer,
            ImageTransform {
                dpi: Some(RENDER_DPI),
                ..ImageTransform::default()
            },
        );
    }

    let bytes = doc
        .save_to_bytes()
        .map_err(|e| ExportError::Pdf(e.to_string()))?;
    debug!(bytes = bytes.len(), pages = charts.len(), "serialized PDF");
    Ok(bytes)
}

/// Deflated archive with `<file_title>.png` per chart and `<base_name>.csv`.
pub fn to_archive_bytes(
    charts: &[&Chart],
    csv_bytes: &[u8],
    base_name: &str,
) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for chart in charts {
        let png = chart.to_png()?;
        zip.start_file(format!("{}.png", chart.file_title), options)?;
        zip.write_all(&png)?;
    }
    zip.start_file(format!("{base_name}.csv"), options)?;
    zip.write_all(csv_bytes)?;

    let bytes = zip.finish()?.into_inner();
    debug!(bytes = bytes.len(), entries = charts.len() + 1, "serialized archive");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::aggregate::sum_columns;
    use crate::chart::{NutrientPie, build_bar_chart, build_pie_charts};
    use crate::models::{NAME_COLUMN, nutrient_columns};

    fn sample() -> FilteredResult {
        FilteredResult {
            name_column: NAME_COLUMN.to_string(),
            columns: nutrient_columns(),
            rows: vec![
                FoodRow {
                    name: "Rice".to_string(),
                    values: vec![130.0, 2.7, 0.3, 0.0, 28.0, 0.4],
                },
                FoodRow {
                    name: "Egg, boiled".to_string(),
                    values: vec![155.0, 13.0, 11.0, 373.0, 1.1, 0.0],
                },
            ],
        }
    }

    fn pies(result: &FilteredResult) -> Vec<Chart> {
        build_pie_charts(result, &nutrient_columns(), &sum_columns(result))
            .into_iter()
            .filter_map(|p| match p {
                NutrientPie::Drawn { chart, .. } => Some(chart),
                NutrientPie::NoData { .. } => None,
            })
            .collect()
    }

    #[test]
    fn csv_has_header_and_rows_without_index() {
        let csv = String::from_utf8(to_csv_bytes(&sample()).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Nome,Energia (kcal),Proteína (g),Lipídeos (g),Colesterol (mg),Carboidrato (g),Fibra Alimentar (g)"
        );
        assert_eq!(lines[1], "Rice,130,2.7,0.3,0,28,0.4");
        assert!(lines[2].starts_with("\"Egg, boiled\",155,"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn csv_round_trips() {
        let result = sample();
        let parsed = parse_csv(&to_csv_bytes(&result).unwrap()).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn empty_result_csv_is_header_only() {
        let result = FilteredResult::empty(&nutrient_columns());
        let csv = String::from_utf8(to_csv_bytes(&result).unwrap()).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    fn read_entry(archive: &mut zip::ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut text = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        text
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn spreadsheet_has_results_sheet() {
        let bytes = to_spreadsheet_bytes(&sample()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let workbook = read_entry(&mut archive, "xl/workbook.xml");
        assert!(workbook.contains("name=\"Resultados\""));
    }

    #[test]
    fn spreadsheet_holds_the_csv_table() {
        let bytes = to_spreadsheet_bytes(&sample()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

        let strings = read_entry(&mut archive, "xl/sharedStrings.xml");
        for text in ["Nome", "Energia (kcal)", "Fibra Alimentar (g)", "Rice", "Egg, boiled"] {
            assert!(strings.contains(&format!(">{text}<")), "missing {text}");
        }

        let sheet = read_entry(&mut archive, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains(r#"<c r="B2"><v>130</v></c>"#));
        assert!(sheet.contains(r#"<c r="E3"><v>373</v></c>"#));
        assert!(sheet.contains(r#"<c r="G2"><v>0.4</v></c>"#));
        assert!(!sheet.contains(r#"r="A4""#));
    }

    #[test]
    fn pdf_has_one_page_per_chart_in_order() {
        let result = sample();
        let bar = build_bar_chart(&result, &nutrient_columns());
        let charts = pies(&result);
        let refs: Vec<&Chart> = std::iter::once(&bar).chain(charts.iter()).collect();
        assert_eq!(refs.len(), 7);

        let bytes = to_pdf_bytes(&refs).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(find(&bytes, b"/Type/Pages/Count 7").is_some());

        let bar_page = find(&bytes, b"(grafico_barras)").unwrap();
        let energy_page = find(&bytes, b"(grafico_pizza_Energia").unwrap();
        let fiber_page = find(&bytes, b"(grafico_pizza_Fibra").unwrap();
        assert!(bar_page < energy_page);
        assert!(energy_page < fiber_page);
    }

    #[test]
    fn pdf_pages_embed_jpeg_images() {
        let result = sample();
        let charts = pies(&result);
        let refs: Vec<&Chart> = charts.iter().collect();

        let bytes = to_pdf_bytes(&refs).unwrap();
        assert!(find(&bytes, b"/Type/Pages/Count 6").is_some());
        assert!(find(&bytes, b"DCTDecode").is_some());
        // A raw 640x480 RGB raster alone is 921,600 bytes per page.
        assert!(bytes.len() < refs.len() * 300_000, "PDF is {} bytes", bytes.len());
    }

    #[test]
    fn pdf_without_charts_has_no_pages() {
        let bytes = to_pdf_bytes(&[]).unwrap();
        assert!(find(&bytes, b"/Type/Pages/Count 0").is_some());
    }

    #[test]
    fn archive_contains_charts_and_csv() {
        let result = sample();
        let bar = build_bar_chart(&result, &nutrient_columns());
        let charts = pies(&result);
        let refs: Vec<&Chart> = std::iter::once(&bar).chain(charts.iter()).collect();
        let csv = to_csv_bytes(&result).unwrap();

        let bytes = to_archive_bytes(&refs, &csv, "dados_refeicao_2024-01-15").unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), refs.len() + 1);

        let mut stored = Vec::new();
        archive
            .by_name("dados_refeicao_2024-01-15.csv")
            .unwrap()
            .read_to_end(&mut stored)
            .unwrap();
        assert_eq!(stored, csv);

        assert!(archive.by_name("grafico_barras.png").is_ok());
        let mut png = Vec::new();
        archive
            .by_name("grafico_pizza_Energia (kcal).png")
            .unwrap()
            .read_to_end(&mut png)
            .unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
    }

    #[test]
    fn archive_without_charts_holds_only_csv() {
        let csv = b"Nome\n".to_vec();
        let bytes = to_archive_bytes(&[], &csv, "base").unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn format_names_and_mime_types() {
        let base = "dados_refeicao_2024-01-15";
        assert_eq!(ExportFormat::Csv.file_name(base), "dados_refeicao_2024-01-15.csv");
        assert_eq!(
            ExportFormat::Pdf.file_name(base),
            "dados_refeicao_2024-01-15_graficos.pdf"
        );
        assert_eq!(
            ExportFormat::Zip.file_name(base),
            "dados_refeicao_2024-01-15_graficos_e_csv.zip"
        );
        assert_eq!(ExportFormat::Zip.mime(), "application/zip");
        assert_eq!("EXCEL".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert!("docx".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Xlsx.to_string(), "xlsx");
    }
}
