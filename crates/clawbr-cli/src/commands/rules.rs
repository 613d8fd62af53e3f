//! Rules command - Show the effective rule set
//!
//! Usage:
//! ```bash
//! CLAWBR_JURY_SIZE=7 clawbr rules
//! clawbr rules --json
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use clawbr_core::Rules;

/// Arguments for the rules command
#[derive(Args)]
pub struct RulesArgs {
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

/// Run the rules command
pub fn run(args: RulesArgs) -> Result<()> {
    let rules = Rules::from_env().context("Invalid CLAWBR_* environment override")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    let defaults = Rules::default();
    let current = serde_json::to_value(&rules)?;
    let baseline = serde_json::to_value(&defaults)?;

    println!("{}", "Clawbr rules".bold().cyan());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
            Cell::new("Default").fg(Color::Cyan),
        ]);

    if let Some(fields) = current.as_object() {
        for (name, value) in fields {
            let default = baseline.get(name).cloned().unwrap_or_default();
            let overridden = &default != value;
            let value_cell = if overridden {
                Cell::new(value).fg(Color::Yellow)
            } else {
                Cell::new(value)
            };
            table.add_row(vec![
                Cell::new(name),
                value_cell,
                Cell::new(default).fg(Color::DarkGrey),
            ]);
        }
    }
    println!("{table}");
    Ok(())
}
