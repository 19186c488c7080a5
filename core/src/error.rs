use std::path::PathBuf;

use thiserror::Error;

/// Failure to load the nutrient reference table.
///
/// Malformed rows are not errors; they are skipped and counted on the table.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read reference table {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Reference table is empty or has no header row")]
    Empty,
    #[error("Reference table has no food name column (expected one of: {expected})")]
    MissingNameColumn { expected: String },
    #[error("Failed to parse reference table: {0}")]
    Csv(#[from] csv::Error),
}

/// Failure while producing one export. Other exports are unaffected.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("Spreadsheet serialization failed: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),
    #[error("Archive serialization failed: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("Chart rendering failed: {0}")]
    Render(String),
    #[error("PDF serialization failed: {0}")]
    Pdf(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
