//! Bracket command - Show slot numbering and the feeder map
//!
//! Usage:
//! ```bash
//! clawbr bracket 8
//! clawbr bracket --field 5
//! ```

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use clawbr_core::bracket::{bracket_size, SUPPORTED_SIZES};
use clawbr_core::{BracketLayout, RoundKind};

/// Arguments for the bracket command
#[derive(Args)]
pub struct BracketArgs {
    /// Bracket size (2, 4, 8 or 16)
    size: Option<u32>,

    /// Derive the bracket from a field of this many entrants instead
    #[arg(long, conflicts_with = "size")]
    field: Option<usize>,
}

/// Run the bracket command
pub fn run(args: BracketArgs) -> Result<()> {
    let size = match (args.size, args.field) {
        (Some(size), _) => size,
        (None, Some(field)) => match bracket_size(field) {
            Some(size) => size,
            None => bail!("a field of {} cannot be bracketed (2 to 16 entrants)", field),
        },
        (None, None) => bail!("give a bracket size ({:?}) or --field", SUPPORTED_SIZES),
    };
    let layout = BracketLayout::for_size(size)?;
    let field = args.field.unwrap_or(size as usize) as u32;

    println!(
        "{} {}-slot bracket, {} rounds, final at slot {}",
        "🏆".cyan(),
        layout.size().to_string().green().bold(),
        layout.total_rounds(),
        layout.final_position()
    );
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Slot").fg(Color::Cyan),
            Cell::new("Stage").fg(Color::Cyan),
            Cell::new("PRO").fg(Color::Cyan),
            Cell::new("CON").fg(Color::Cyan),
            Cell::new("Winner to").fg(Color::Cyan),
        ]);

    for round in 1..=layout.total_rounds() {
        let stage = RoundKind::of(round, layout.total_rounds()).label();
        for position in layout.positions(round) {
            let (pro, con) = match layout.feeders_of(position) {
                Some((a, b)) => (
                    Cell::new(format!("winner of {}", a)),
                    Cell::new(format!("winner of {}", b)),
                ),
                None => {
                    let pairing = layout
                        .pairings()
                        .iter()
                        .find(|p| p.position == position)
                        .copied();
                    match pairing {
                        Some(p) => (seed_cell(p.pro_seed, field), seed_cell(p.con_seed, field)),
                        None => (Cell::new("-"), Cell::new("-")),
                    }
                }
            };
            let next = match layout.feeder(position) {
                Some(feed) => Cell::new(format!("{} ({})", feed.position, feed.side.stance())),
                None => Cell::new("champion").fg(Color::Yellow),
            };
            table.add_row(vec![Cell::new(position).fg(Color::Green), Cell::new(stage), pro, con, next]);
        }
    }

    println!("{table}");
    if field < layout.size() {
        println!();
        crate::print_info(&format!(
            "{} byes: seeds above {} are empty and their opponents advance",
            layout.size() - field,
            field
        ));
    }
    Ok(())
}

fn seed_cell(seed: u32, field: u32) -> Cell {
    if seed > field {
        Cell::new("bye").fg(Color::DarkGrey)
    } else {
        Cell::new(format!("seed {}", seed))
    }
}
