use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use prato_core::service::NutrientService;

use super::helpers::truncate;

pub(crate) fn cmd_foods(service: &NutrientService, search: Option<&str>, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct FoodRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Nome")]
        name: String,
    }

    let names = match search {
        Some(q) => service.search_foods(q),
        None => service.food_names(),
    };

    if names.is_empty() {
        if json {
            println!("[]");
        } else if let Some(q) = search {
            eprintln!("No foods matching '{q}'");
        } else {
            eprintln!("Reference table has no foods");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }

    let rows: Vec<FoodRow> = names
        .iter()
        .enumerate()
        .map(|(i, name)| FoodRow {
            idx: i + 1,
            name: truncate(name, 60),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(0)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let skipped = service.table().skipped_rows();
    if skipped > 0 {
        eprintln!("Note: {skipped} malformed row(s) in the reference table were skipped");
    }

    Ok(())
}
