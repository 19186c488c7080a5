use std::collections::BTreeSet;

use crate::models::{
    FilteredResult, FoodRow, NAME_COLUMN, NutrientTotal, NutrientTotals, ReferenceTable,
};

/// Coerce a raw table field to a number. Missing, unparseable, and
/// non-finite values become zero.
#[must_use]
pub fn coerce_number(raw: Option<&str>) -> f64 {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Filter the reference table down to the selected foods and sum each
/// nutrient column.
///
/// Rows keep table order. A row is dropped when none of its nutrient values
/// is strictly positive. A nutrient column absent from the table reads as
/// zero for every row. Names that match nothing are ignored.
#[must_use]
pub fn filter_and_aggregate(
    table: &ReferenceTable,
    selected: &BTreeSet<String>,
    columns: &[String],
) -> (FilteredResult, NutrientTotals) {
    let indices: Vec<Option<usize>> = columns.iter().map(|c| table.column_index(c)).collect();

    let rows: Vec<FoodRow> = table
        .records()
        .iter()
        .filter(|r| selected.contains(&r.name))
        .map(|r| FoodRow {
            name: r.name.clone(),
            values: indices
                .iter()
                .map(|idx| coerce_number(idx.and_then(|i| r.fields.get(i)).map(String::as_str)))
                .collect(),
        })
        .filter(|row| row.values.iter().any(|v| *v > 0.0))
        .collect();

    let result = FilteredResult {
        name_column: NAME_COLUMN.to_string(),
        columns: columns.to_vec(),
        rows,
    };
    let totals = sum_columns(&result);
    (result, totals)
}

/// Sum every nutrient column of a result without rounding.
#[must_use]
pub fn sum_columns(result: &FilteredResult) -> NutrientTotals {
    NutrientTotals {
        entries: result
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| NutrientTotal {
                nutrient: c.clone(),
                total: result.column_values(i).sum(),
            })
            .collect(),
    }
}
