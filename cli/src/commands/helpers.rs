use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Columns},
};

use prato_core::models::{FilteredResult, NutrientTotals, round2};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Render the filtered table plus a totals row, values rounded to 2 decimals.
pub(crate) fn print_result_table(result: &FilteredResult, totals: &NutrientTotals) {
    let mut builder = Builder::default();
    builder.push_record(result.header().into_iter().map(str::to_string));
    for row in &result.rows {
        builder.push_record(
            std::iter::once(truncate(&row.name, 40))
                .chain(row.values.iter().map(|v| format!("{:.2}", round2(*v)))),
        );
    }
    builder.push_record(
        std::iter::once("TOTAL".to_string())
            .chain(totals.iter().map(|t| format!("{:.2}", round2(t.total)))),
    );

    let table = builder
        .build()
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_none() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        let err = parse_date(Some("15/01/2024".to_string())).unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Feijão", 10), "Feijão");
        assert_eq!(truncate("Arroz, integral, cozido", 10), "Arroz, ...");
        assert_eq!(truncate("Pão de queijo assado", 8), "Pão d...");
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("boom"), "{\"error\":\"boom\"}");
    }
}
