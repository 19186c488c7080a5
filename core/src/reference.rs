use std::io::Read;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::models::{FoodRecord, NAME_COLUMN_ALIASES, ReferenceTable};

/// Load the nutrient reference table from a delimited file.
///
/// Malformed lines are skipped and counted in
/// [`ReferenceTable::skipped_rows`]; the load only fails when the file cannot
/// be read or has no usable header.
pub fn load(path: &Path) -> Result<ReferenceTable, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = parse_reference_csv(file)?;
    info!(
        path = %path.display(),
        rows = table.len(),
        skipped = table.skipped_rows(),
        "loaded reference table"
    );
    Ok(table)
}

/// Parse a reference table from any reader.
///
/// The header must contain a food name column (`Nome` or `Name`, any case).
/// A line is skipped when its field count differs from the header, when it
/// is not valid UTF-8, or when its name field is blank.
pub fn parse_reference_csv<R: Read>(reader: R) -> Result<ReferenceTable, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(LoadError::Empty);
    }

    let name_index = headers
        .iter()
        .position(|h| NAME_COLUMN_ALIASES.iter().any(|a| h.eq_ignore_ascii_case(a)))
        .ok_or_else(|| LoadError::MissingNameColumn {
            expected: NAME_COLUMN_ALIASES.join(", "),
        })?;

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (line_num, result) in rdr.records().enumerate() {
        let line = line_num + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(LoadError::Csv(e)),
            Err(e) => {
                debug!(line, error = %e, "skipping unparseable row");
                skipped += 1;
                continue;
            }
        };

        if record.len() != headers.len() {
            debug!(
                line,
                fields = record.len(),
                expected = headers.len(),
                "skipping row with wrong field count"
            );
            skipped += 1;
            continue;
        }

        let name = record.get(name_index).unwrap_or("").to_string();
        if name.is_empty() {
            debug!(line, "skipping row without a food name");
            skipped += 1;
            continue;
        }

        records.push(FoodRecord {
            name,
            fields: record.iter().map(ToString::to_string).collect(),
        });
    }

    if skipped > 0 {
        warn!(skipped, "skipped malformed rows in reference table");
    }

    let headers = headers.iter().map(ToString::to_string).collect();
    Ok(ReferenceTable::new(headers, name_index, records, skipped))
}
