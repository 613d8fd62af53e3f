//! Study command - Voting patterns across completed debates
//!
//! Usage:
//! ```bash
//! clawbr simulate --database clawbr.db
//! clawbr study --database clawbr.db
//! clawbr study --database clawbr.db --json
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use std::path::PathBuf;
use std::sync::Arc;

use clawbr_core::study::{BALANCED_PCT, HIGH_BIAS_PCT, MIN_ACTIVE_VOTES, MIN_CATEGORY_DEBATES};
use clawbr_core::{CategoryStats, Rules, VoteStudy};
use clawbr_engine::Engine;
use clawbr_persist::SqliteBackend;

/// Arguments for the study command
#[derive(Args)]
pub struct StudyArgs {
    /// SQLite file written by `clawbr simulate --database`
    #[arg(long, env = "CLAWBR_DATABASE")]
    database: PathBuf,

    /// Output raw JSON
    #[arg(long)]
    json: bool,

    /// Voters to list
    #[arg(long, default_value_t = 10)]
    top: usize,
}

/// Run the study command
pub async fn run(args: StudyArgs) -> Result<()> {
    // No `c`: a missing file is an error, not an empty study
    let url = format!("sqlite:{}?mode=rw", args.database.display());
    let backend = SqliteBackend::new(&url)
        .await
        .with_context(|| format!("Cannot open database {}", args.database.display()))?;
    let rules = Rules::from_env().context("Invalid CLAWBR_* environment override")?;
    let engine = Engine::new(Arc::new(backend), rules);

    let study = engine.vote_study().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&study)?);
        return Ok(());
    }

    println!("{}", "Vote study".bold().cyan());
    println!(
        "  {} completed debates, {} with votes",
        study.total_debates, study.debates_with_votes
    );
    println!(
        "  Challenger won {} of {} decided ({}%)",
        study.challenger_wins.to_string().green(),
        study.challenger_wins + study.opponent_wins,
        study.challenger_pct
    );
    println!();

    print_categories(&study);
    print_voters(&study, args.top);
    Ok(())
}

fn print_categories(study: &VoteStudy) {
    if study.categories.is_empty() {
        crate::print_warning("No voted debates yet");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Category").fg(Color::Cyan),
            Cell::new("Challenger").fg(Color::Cyan),
            Cell::new("Opponent").fg(Color::Cyan),
            Cell::new("Debates").fg(Color::Cyan),
            Cell::new("Challenger %").fg(Color::Cyan),
        ]);
    for c in &study.categories {
        table.add_row(vec![
            Cell::new(&c.name),
            Cell::new(c.challenger_wins),
            Cell::new(c.opponent_wins),
            Cell::new(c.total),
            Cell::new(format!("{}%", c.challenger_pct)),
        ]);
    }
    println!("{table}");

    let extreme = |label: &str, c: &Option<CategoryStats>| match c {
        Some(c) => crate::print_info(&format!("{}: {} ({}% challenger)", label, c.name.bold(), c.challenger_pct)),
        None => crate::print_info(&format!(
            "{}: none with {}+ debates",
            label, MIN_CATEGORY_DEBATES
        )),
    };
    extreme("Most unbalanced", &study.most_unbalanced);
    extreme("Most balanced", &study.most_balanced);
    println!();
}

fn print_voters(study: &VoteStudy, top: usize) {
    if study.voters.is_empty() {
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Voter").fg(Color::Cyan),
            Cell::new("Challenger").fg(Color::Cyan),
            Cell::new("Opponent").fg(Color::Cyan),
            Cell::new("Votes").fg(Color::Cyan),
            Cell::new("Challenger %").fg(Color::Cyan),
        ]);
    for v in study.voters.iter().take(top) {
        let pct = Cell::new(format!("{}%", v.challenger_pct));
        let pct = if v.total >= MIN_ACTIVE_VOTES && v.challenger_pct >= HIGH_BIAS_PCT {
            pct.fg(Color::Yellow)
        } else {
            pct
        };
        let id = v.voter.to_string();
        table.add_row(vec![
            Cell::new(&id[..8]),
            Cell::new(v.challenger),
            Cell::new(v.opponent),
            Cell::new(v.total),
            pct,
        ]);
    }
    println!("{table}");

    let summary = &study.voter_summary;
    let range = match summary.high_bias_range {
        Some((low, high)) => format!("{}-{}%", low, high),
        None => "N/A".to_string(),
    };
    println!(
        "  {} active voters ({}+ votes): {} at {}%+ challenger (range {}), {} balanced ({}-{}%)",
        summary.active_voters,
        MIN_ACTIVE_VOTES,
        summary.high_bias,
        HIGH_BIAS_PCT,
        range,
        summary.balanced,
        BALANCED_PCT.0,
        BALANCED_PCT.1
    );
}
