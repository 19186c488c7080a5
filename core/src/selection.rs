use std::collections::BTreeSet;

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::models::MealRecord;

/// Where a session sits in the select → confirm flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPhase {
    Empty,
    Selecting,
    Confirmed,
}

/// Mutable state owned by a single user session.
///
/// Saved meals survive [`SelectionState::clear`]; only the current selection
/// and confirmation are reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    selected_foods: BTreeSet<String>,
    confirmed: bool,
    selected_date: NaiveDate,
    saved_meals: Vec<MealRecord>,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new(Local::now().date_naive())
    }
}

impl SelectionState {
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            selected_foods: BTreeSet::new(),
            confirmed: false,
            selected_date: date,
            saved_meals: Vec::new(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> SelectionPhase {
        if self.confirmed {
            SelectionPhase::Confirmed
        } else if self.selected_foods.is_empty() {
            SelectionPhase::Empty
        } else {
            SelectionPhase::Selecting
        }
    }

    #[must_use]
    pub fn selected_foods(&self) -> &BTreeSet<String> {
        &self.selected_foods
    }

    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    #[must_use]
    pub fn selected_date(&self) -> NaiveDate {
        self.selected_date
    }

    #[must_use]
    pub fn saved_meals(&self) -> &[MealRecord] {
        &self.saved_meals
    }

    /// Replace the current selection. Any earlier confirmation is withdrawn
    /// until [`SelectionState::confirm`] is called again.
    pub fn select<I, S>(&mut self, foods: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_foods = foods.into_iter().map(Into::into).collect();
        self.confirmed = false;
    }

    pub fn set_date(&mut self, date: NaiveDate) {
        self.selected_date = date;
    }

    /// Confirm the current selection so results and exports can be produced.
    /// Confirming an empty selection is allowed and yields an empty report.
    pub fn confirm(&mut self) {
        self.confirmed = true;
    }

    /// Snapshot the current date and selection as a meal.
    pub fn save_meal(&mut self) -> &MealRecord {
        self.saved_meals.push(MealRecord {
            date: self.selected_date,
            foods: self.selected_foods.clone(),
        });
        &self.saved_meals[self.saved_meals.len() - 1]
    }

    pub fn clear(&mut self) {
        self.selected_foods.clear();
        self.confirmed = false;
    }

    /// Base file name for exports, e.g. `dados_refeicao_2024-01-15`.
    #[must_use]
    pub fn export_base_name(&self) -> String {
        export_base_name(self.selected_date)
    }
}

#[must_use]
pub fn export_base_name(date: NaiveDate) -> String {
    format!("dados_refeicao_{}", date.format("%Y-%m-%d"))
}
