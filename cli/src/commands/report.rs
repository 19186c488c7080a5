use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use prato_core::export::ExportFormat;
use prato_core::models::round2;
use prato_core::selection::SelectionState;
use prato_core::service::{MealReport, NutrientService};

use super::helpers::{json_error, parse_date, print_result_table};

#[derive(Serialize)]
struct WrittenExport {
    format: ExportFormat,
    path: PathBuf,
    bytes: usize,
}

#[derive(Serialize)]
struct FailedExport {
    format: ExportFormat,
    error: String,
}

pub(crate) fn cmd_report(
    service: &NutrientService,
    foods: Vec<String>,
    date: Option<String>,
    out: Option<&Path>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;

    let known: HashSet<&str> = service.food_names().into_iter().collect();
    for food in foods.iter().filter(|f| !known.contains(f.as_str())) {
        eprintln!("Note: no food named '{food}' in the reference table");
    }

    let mut state = SelectionState::new(date);
    state.select(foods);
    state.confirm();
    let report = service
        .report(&state)
        .context("Selection could not be confirmed")?;

    let (written, failed) = match out {
        Some(dir) => write_exports(&report, dir)?,
        None => (Vec::new(), Vec::new()),
    };

    if json {
        #[derive(Serialize)]
        struct ReportOutput<'a> {
            report: &'a MealReport,
            no_data: Vec<&'a str>,
            written: &'a [WrittenExport],
            failed: &'a [FailedExport],
        }
        let output = ReportOutput {
            report: &report,
            no_data: report.no_data_nutrients(),
            written: &written,
            failed: &failed,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&report);
        for w in &written {
            println!("  Wrote {} ({} bytes)", w.path.display(), w.bytes);
        }
    }

    if !failed.is_empty() {
        for f in &failed {
            if json {
                eprintln!("{}", json_error(&f.error));
            } else {
                eprintln!("Export {} failed: {}", f.format, f.error);
            }
        }
        bail!("{} of {} exports failed", failed.len(), ExportFormat::ALL.len());
    }

    Ok(())
}

fn print_report(report: &MealReport) {
    let date = report.date;
    println!("=== {date} ===\n");

    if report.result.is_empty() {
        println!("  No selected food has nutrient data.\n");
    } else {
        print_result_table(&report.result, &report.totals);
        println!();
    }

    for total in report.totals.iter() {
        let value = round2(total.total);
        println!("  Total geral para {}: {value:.2}", total.nutrient);
    }
    for nutrient in report.no_data_nutrients() {
        println!("  Gráfico de {nutrient}: Sem Dados");
    }
    println!();
}

/// Write every export into `dir`. A failed export is recorded and does not
/// stop the others.
fn write_exports(
    report: &MealReport,
    dir: &Path,
) -> Result<(Vec<WrittenExport>, Vec<FailedExport>)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let mut written = Vec::new();
    let mut failed = Vec::new();
    for format in ExportFormat::ALL {
        let export = match report.export(format) {
            Ok(export) => export,
            Err(e) => {
                failed.push(FailedExport {
                    format,
                    error: e.to_string(),
                });
                continue;
            }
        };
        let path = dir.join(&export.file_name);
        if let Err(e) = std::fs::write(&path, &export.bytes) {
            failed.push(FailedExport {
                format,
                error: format!("Failed to write {}: {e}", path.display()),
            });
            continue;
        }
        written.push(WrittenExport {
            format,
            path,
            bytes: export.bytes.len(),
        });
    }
    Ok((written, failed))
}
