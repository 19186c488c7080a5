use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Header of the food name column in tables produced by the pipeline.
pub const NAME_COLUMN: &str = "Nome";

/// Accepted spellings of the food name column when loading a table.
pub const NAME_COLUMN_ALIASES: &[&str] = &["Nome", "Name"];

/// Nutrient columns tracked per food, in display order.
pub const NUTRIENT_COLUMNS: [&str; 6] = [
    "Energia (kcal)",
    "Proteína (g)",
    "Lipídeos (g)",
    "Colesterol (mg)",
    "Carboidrato (g)",
    "Fibra Alimentar (g)",
];

#[must_use]
pub fn nutrient_columns() -> Vec<String> {
    NUTRIENT_COLUMNS.iter().map(ToString::to_string).collect()
}

/// Round a value to two decimals for display. Aggregation never rounds.
#[must_use]
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// One row of the reference table. Fields are kept as raw text, aligned
/// with the table headers, and only coerced to numbers during aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRecord {
    pub name: String,
    pub fields: Vec<String>,
}

/// The nutrient composition table, loaded once and read-only afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceTable {
    headers: Vec<String>,
    name_index: usize,
    records: Vec<FoodRecord>,
    skipped_rows: usize,
}

impl ReferenceTable {
    pub(crate) fn new(
        headers: Vec<String>,
        name_index: usize,
        records: Vec<FoodRecord>,
        skipped_rows: usize,
    ) -> Self {
        Self {
            headers,
            name_index,
            records,
            skipped_rows,
        }
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn name_column(&self) -> &str {
        &self.headers[self.name_index]
    }

    #[must_use]
    pub fn records(&self) -> &[FoodRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of source lines dropped during load because they were malformed.
    #[must_use]
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Unique food names in the order they first appear in the table.
    #[must_use]
    pub fn food_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .map(|r| r.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Case-insensitive substring search over the unique food names.
    #[must_use]
    pub fn search_names(&self, query: &str) -> Vec<&str> {
        let needle = query.trim().to_lowercase();
        self.food_names()
            .into_iter()
            .filter(|name| name.to_lowercase().contains(&needle))
            .collect()
    }
}

/// A food that survived filtering, with nutrient values already coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRow {
    pub name: String,
    pub values: Vec<f64>,
}

/// The selected subset of the reference table after zero-row pruning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredResult {
    pub name_column: String,
    pub columns: Vec<String>,
    pub rows: Vec<FoodRow>,
}

impl FilteredResult {
    #[must_use]
    pub fn empty(columns: &[String]) -> Self {
        Self {
            name_column: NAME_COLUMN.to_string(),
            columns: columns.to_vec(),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Full header row: name column followed by the nutrient columns.
    #[must_use]
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(self.name_column.as_str())
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    /// Values of one nutrient column, in row order.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |r| r.values[index])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientTotal {
    pub nutrient: String,
    pub total: f64,
}

/// Per-nutrient sums over a `FilteredResult`, in nutrient column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientTotals {
    pub entries: Vec<NutrientTotal>,
}

impl NutrientTotals {
    #[must_use]
    pub fn zeros(columns: &[String]) -> Self {
        Self {
            entries: columns
                .iter()
                .map(|c| NutrientTotal {
                    nutrient: c.clone(),
                    total: 0.0,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, nutrient: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.nutrient == nutrient)
            .map(|e| e.total)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NutrientTotal> {
        self.entries.iter()
    }
}

/// A saved meal: the date plus the foods selected at save time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealRecord {
    pub date: NaiveDate,
    pub foods: BTreeSet<String>,
}
