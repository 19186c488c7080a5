use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::aggregate::filter_and_aggregate;
use crate::chart::{Chart, NutrientPie, build_bar_chart, build_pie_charts};
use crate::error::{ExportError, LoadError};
use crate::export::{
    Export, ExportFormat, to_archive_bytes, to_csv_bytes, to_pdf_bytes, to_spreadsheet_bytes,
};
use crate::models::{FilteredResult, NutrientTotals, ReferenceTable, nutrient_columns};
use crate::reference;
use crate::selection::{SelectionState, export_base_name};

#[derive(Debug, Clone, Copy, Default)]
pub struct ChartOptions {
    /// Put the stacked bar chart first in PDF and archive exports.
    pub include_bar_chart: bool,
}

/// Runs the selection → aggregation → charts → export pipeline against a
/// shared, read-only reference table.
#[derive(Debug, Clone)]
pub struct NutrientService {
    table: Arc<ReferenceTable>,
    columns: Vec<String>,
    options: ChartOptions,
}

impl NutrientService {
    #[must_use]
    pub fn new(table: Arc<ReferenceTable>) -> Self {
        Self {
            table,
            columns: nutrient_columns(),
            options: ChartOptions::default(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        Ok(Self::new(Arc::new(reference::load(path)?)))
    }

    #[must_use]
    pub fn with_options(mut self, options: ChartOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn table(&self) -> &ReferenceTable {
        &self.table
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn food_names(&self) -> Vec<&str> {
        self.table.food_names()
    }

    #[must_use]
    pub fn search_foods(&self, query: &str) -> Vec<&str> {
        self.table.search_names(query)
    }

    /// Build the full report for a set of foods on a given date.
    #[must_use]
    pub fn analyze(&self, foods: &BTreeSet<String>, date: NaiveDate) -> MealReport {
        let (result, totals) = filter_and_aggregate(&self.table, foods, &self.columns);
        let bar_chart = build_bar_chart(&result, &self.columns);
        let pies = build_pie_charts(&result, &self.columns, &totals);
        info!(
            selected = foods.len(),
            rows = result.len(),
            pies = pies.iter().filter(|p| p.chart().is_some()).count(),
            "built meal report"
        );
        MealReport {
            date,
            base_name: export_base_name(date),
            result,
            totals,
            bar_chart,
            pies,
            options: self.options,
        }
    }

    /// The report for a session, available only once its selection is confirmed.
    #[must_use]
    pub fn report(&self, state: &SelectionState) -> Option<MealReport> {
        state
            .is_confirmed()
            .then(|| self.analyze(state.selected_foods(), state.selected_date()))
    }
}

/// Everything produced by one confirmed pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct MealReport {
    pub date: NaiveDate,
    pub base_name: String,
    pub result: FilteredResult,
    pub totals: NutrientTotals,
    pub bar_chart: Chart,
    pub pies: Vec<NutrientPie>,
    #[serde(skip)]
    options: ChartOptions,
}

impl MealReport {
    /// Charts that go into PDF and archive exports: the bar chart first when
    /// enabled, then the drawn pies in nutrient column order.
    #[must_use]
    pub fn export_charts(&self) -> Vec<&Chart> {
        let bar = self
            .options
            .include_bar_chart
            .then_some(&self.bar_chart);
        bar.into_iter()
            .chain(self.pies.iter().filter_map(NutrientPie::chart))
            .collect()
    }

    /// Nutrients whose pie was skipped because no food contributes to them.
    #[must_use]
    pub fn no_data_nutrients(&self) -> Vec<&str> {
        self.pies
            .iter()
            .filter(|p| p.chart().is_none())
            .map(NutrientPie::nutrient)
            .collect()
    }

    pub fn export(&self, format: ExportFormat) -> Result<Export, ExportError> {
        let bytes = match format {
            ExportFormat::Csv => to_csv_bytes(&self.result)?,
            ExportFormat::Xlsx => to_spreadsheet_bytes(&self.result)?,
            ExportFormat::Pdf => to_pdf_bytes(&self.export_charts())?,
            ExportFormat::Zip => {
                let csv = to_csv_bytes(&self.result)?;
                to_archive_bytes(&self.export_charts(), &csv, &self.base_name)?
            }
        };
        Ok(Export {
            file_name: format.file_name(&self.base_name),
            mime: format.mime(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::BAR_CHART_FILE_TITLE;
    use crate::reference::parse_reference_csv;

    const TABLE_CSV: &str = "\
Nome,Energia (kcal),Proteína (g),Lipídeos (g),Colesterol (mg),Carboidrato (g),Fibra Alimentar (g)
Rice,130,2.7,0.3,0,28,0.4
Egg,155,13,11,373,1.1,0
Water,0,0,0,0,0,0
";

    fn service() -> NutrientService {
        NutrientService::new(Arc::new(parse_reference_csv(TABLE_CSV.as_bytes()).unwrap()))
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn unconfirmed_session_has_no_report() {
        let mut state = SelectionState::new(date());
        state.select(["Rice"]);
        assert!(service().report(&state).is_none());
        state.confirm();
        assert!(service().report(&state).is_some());
    }

    #[test]
    fn report_runs_full_pipeline() {
        let mut state = SelectionState::new(date());
        state.select(["Rice", "Egg"]);
        state.confirm();
        let report = service().report(&state).unwrap();

        assert_eq!(report.base_name, "dados_refeicao_2024-01-15");
        assert_eq!(report.result.len(), 2);
        assert!((report.totals.get("Energia (kcal)").unwrap() - 285.0).abs() < 1e-9);
        assert_eq!(report.pies.len(), 6);
        assert!(report.no_data_nutrients().is_empty());
        assert_eq!(report.export_charts().len(), 6);
    }

    #[test]
    fn cholesterol_free_meal_reports_no_data() {
        let mut state = SelectionState::new(date());
        state.select(["Rice"]);
        state.confirm();
        let report = service().report(&state).unwrap();
        assert_eq!(report.no_data_nutrients(), vec!["Colesterol (mg)"]);
        assert_eq!(report.export_charts().len(), 5);
    }

    #[test]
    fn bar_chart_leads_exports_when_enabled() {
        let service = service().with_options(ChartOptions {
            include_bar_chart: true,
        });
        let foods: BTreeSet<String> = ["Rice".to_string()].into();
        let report = service.analyze(&foods, date());
        let charts = report.export_charts();
        assert_eq!(charts[0].file_title, BAR_CHART_FILE_TITLE);
        assert_eq!(charts.len(), 6);
    }

    #[test]
    fn pdf_export_puts_bar_chart_page_first() {
        let service = service().with_options(ChartOptions {
            include_bar_chart: true,
        });
        let foods: BTreeSet<String> = ["Rice".to_string()].into();
        let pdf = service.analyze(&foods, date()).export(ExportFormat::Pdf).unwrap();

        let find = |needle: &[u8]| pdf.bytes.windows(needle.len()).position(|w| w == needle);
        assert!(find(b"/Type/Pages/Count 6").is_some());
        assert!(find(b"(grafico_barras)").unwrap() < find(b"(grafico_pizza_Energia").unwrap());
    }

    #[test]
    fn empty_confirmation_gives_empty_report() {
        let mut state = SelectionState::new(date());
        state.confirm();
        let report = service().report(&state).unwrap();
        assert!(report.result.is_empty());
        assert!(report.export_charts().is_empty());
        assert_eq!(report.no_data_nutrients().len(), 6);
    }

    #[test]
    fn exports_carry_names_and_mime() {
        let foods: BTreeSet<String> = ["Rice".to_string(), "Egg".to_string()].into();
        let report = service().analyze(&foods, date());

        let csv = report.export(ExportFormat::Csv).unwrap();
        assert_eq!(csv.file_name, "dados_refeicao_2024-01-15.csv");
        assert_eq!(csv.mime, "text/csv");

        let zip = report.export(ExportFormat::Zip).unwrap();
        assert_eq!(zip.file_name, "dados_refeicao_2024-01-15_graficos_e_csv.zip");
        assert!(zip.bytes.starts_with(b"PK"));

        let xlsx = report.export(ExportFormat::Xlsx).unwrap();
        assert!(xlsx.bytes.starts_with(b"PK"));
    }

    #[test]
    fn report_serializes_with_pie_status() {
        let foods: BTreeSet<String> = ["Rice".to_string()].into();
        let report = service().analyze(&foods, date());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["date"], "2024-01-15");
        assert_eq!(json["pies"][3]["status"], "no_data");
        assert_eq!(json["pies"][0]["status"], "drawn");
        assert!(json.get("options").is_none());
    }

    #[test]
    fn food_options_and_search() {
        let s = service();
        assert_eq!(s.food_names(), vec!["Rice", "Egg", "Water"]);
        assert_eq!(s.search_foods("eg"), vec!["Egg"]);
    }
}
