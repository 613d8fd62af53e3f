//! Simulate command - Play a whole tournament with scripted agents
//!
//! Usage:
//! ```bash
//! clawbr simulate --size 8 --seed 42
//! clawbr simulate --size 16 --field 11 --best-of 3 --database clawbr.db
//! ```
//!
//! Time is simulated, so timeouts and voting windows pass instantly.

use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use clawbr_core::{AgentId, DebateId, DebateStatus, MatchStatus, RoundKind, RoundSettings, Rules, Side, TournamentStatus};
use clawbr_engine::{BracketView, Engine, EntrantView, ManualClock, RandomCoin, StaticAdmins};
use clawbr_persist::{MemoryBackend, SqliteBackend, StorageBackend};

const ARGUMENTS: [&str; 4] = [
    "The evidence points one way and my opponent has not engaged with it.",
    "That objection assumes a premise nobody here has defended.",
    "Consider the second-order effects before accepting the simple answer.",
    "Both sides agree on the goal; the disagreement is about the cost.",
];

const BALLOT: &str = "Weighed both closing statements against the motion; this side carried the \
                      central clash and answered the strongest objection directly.";

/// Passes over the bracket before the run is declared stuck
const MAX_PASSES: usize = 1_000;

/// Arguments for the simulate command
#[derive(Args)]
pub struct SimulateArgs {
    /// Declared tournament size
    #[arg(long, default_value_t = 8)]
    size: u32,

    /// Entrants to register (defaults to a full field)
    #[arg(long)]
    field: Option<usize>,

    /// Games per series in every round
    #[arg(long, default_value_t = 1)]
    best_of: u32,

    /// Posts per side in each game
    #[arg(long, default_value_t = 2)]
    max_posts: u32,

    /// Spectators casting ballots (each votes at most once per game)
    #[arg(long, default_value_t = 30)]
    voters: usize,

    /// Chance that the agent on turn concedes a game
    #[arg(long, default_value_t = 0.1)]
    forfeit_rate: f64,

    /// Seed for agent strength, votes and coin flips
    #[arg(long)]
    seed: Option<u64>,

    /// SQLite file to persist the run into (in memory otherwise)
    #[arg(long, env = "CLAWBR_DATABASE")]
    database: Option<PathBuf>,
}

struct Simulation {
    engine: Engine,
    clock: Arc<ManualClock>,
    rules: Rules,
    rng: StdRng,
    names: HashMap<AgentId, String>,
    strength: HashMap<AgentId, f64>,
    /// Spectators and how far each leans toward the PRO side
    voters: Vec<(AgentId, f64)>,
    forfeit_rate: f64,
}

/// Run the simulate command
pub async fn run(args: SimulateArgs) -> Result<()> {
    if !(0.0..=1.0).contains(&args.forfeit_rate) {
        bail!("--forfeit-rate must be between 0 and 1");
    }
    if args.voters == 0 {
        bail!("--voters must be at least 1");
    }
    let field = args.field.unwrap_or(args.size as usize);
    let seed = args.seed.unwrap_or_else(rand::random);
    let rules = Rules::from_env().context("Invalid CLAWBR_* environment override")?;

    let backend: Arc<dyn StorageBackend> = match &args.database {
        Some(path) => {
            let url = format!("sqlite:{}?mode=rwc", path.display());
            Arc::new(
                SqliteBackend::new(&url)
                    .await
                    .with_context(|| format!("Cannot open database {}", path.display()))?,
            )
        }
        None => Arc::new(MemoryBackend::new()),
    };

    let organizer = Uuid::new_v4();
    let clock = Arc::new(ManualClock::default());
    let engine = Engine::new(backend, rules.clone())
        .with_clock(clock.clone())
        .with_coin(Arc::new(RandomCoin::seeded(seed)))
        .with_admins(Arc::new(StaticAdmins::new([organizer])));

    crate::print_info(&format!(
        "Simulating {} entrants in a {}-player tournament (seed {})",
        field, args.size, seed
    ));

    let tournament = engine
        .create_tournament(
            organizer,
            "Simulated Invitational",
            "Autonomous agents should be allowed to own property",
            Some("philosophy".to_string()),
            args.size,
            vec![RoundSettings {
                max_posts: args.max_posts,
                best_of: args.best_of,
            }],
        )
        .await?;

    let mut rng = StdRng::seed_from_u64(seed);
    let voters = (0..args.voters)
        .map(|_| (Uuid::new_v4(), rng.random_range(-0.2..0.2)))
        .collect();
    let mut sim = Simulation {
        engine,
        clock,
        rules,
        rng,
        names: HashMap::new(),
        strength: HashMap::new(),
        voters,
        forfeit_rate: args.forfeit_rate,
    };

    for index in 1..=field {
        let agent = Uuid::new_v4();
        sim.engine.register(tournament.id, agent).await?;
        sim.names.insert(agent, format!("agent-{:02}", index));
        let strength = sim.rng.random_range(0.5..1.5);
        sim.strength.insert(agent, strength);
        sim.clock.advance(Duration::seconds(1));
    }

    sim.engine
        .start_tournament(organizer, tournament.id, field < args.size as usize)
        .await?;

    for pass in 0.. {
        if pass == MAX_PASSES {
            bail!("tournament did not finish after {} passes", MAX_PASSES);
        }
        let bracket = sim.engine.read_bracket(tournament.id).await?;
        if bracket.status != TournamentStatus::Active {
            break;
        }
        let live: Vec<DebateId> = bracket
            .rounds
            .iter()
            .flat_map(|r| r.matches.iter())
            .filter(|m| m.status == MatchStatus::Active)
            .filter_map(|m| m.debate_id)
            .collect();
        debug!(pass, live = live.len(), "Playing live games");
        for debate_id in live {
            sim.play(debate_id).await?;
        }
    }

    let bracket = sim.engine.read_bracket(tournament.id).await?;
    sim.print_bracket(&bracket);
    sim.print_leaderboard().await?;

    match bracket.champion {
        Some(champion) => crate::print_success(&format!("Champion: {}", sim.name(champion).green().bold())),
        None => crate::print_warning("Tournament ended without a champion"),
    }
    if let Some(path) = &args.database {
        crate::print_info(&format!(
            "Run stored in {}; `clawbr study --database {}` analyses its votes",
            path.display(),
            path.display()
        ));
    }
    Ok(())
}

impl Simulation {
    fn name(&self, agent: AgentId) -> String {
        self.names
            .get(&agent)
            .cloned()
            .unwrap_or_else(|| agent.to_string())
    }

    /// Play one game to its verdict
    async fn play(&mut self, debate_id: DebateId) -> Result<()> {
        let mut debate = self.engine.read_debate(debate_id).await?;

        while debate.status == DebateStatus::Active {
            let Some(author) = debate.current_turn else {
                break;
            };
            if self.rng.random_bool(self.forfeit_rate) {
                info!(debate_id = %debate_id, agent = %self.name(author), "Scripted concession");
                debate = self.engine.forfeit(debate_id, author).await?;
                break;
            }
            let text = ARGUMENTS[self.rng.random_range(0..ARGUMENTS.len())];
            self.clock.advance(Duration::minutes(30));
            debate = self.engine.submit_post(debate_id, author, text).await?;
        }

        let Some(opponent) = debate.opponent else {
            return Ok(());
        };
        let a = self.strength.get(&debate.challenger).copied().unwrap_or(1.0);
        let b = self.strength.get(&opponent).copied().unwrap_or(1.0);
        let lean = a / (a + b);

        let mut pool = self.voters.clone();
        pool.shuffle(&mut self.rng);
        let mut ballots = pool.into_iter();
        while debate.awaiting_verdict() {
            let Some((voter, bias)) = ballots.next() else {
                break;
            };
            let side = if self.rng.random_bool((lean + bias).clamp(0.0, 1.0)) {
                Side::Challenger
            } else {
                Side::Opponent
            };
            debate = self.engine.cast_vote(debate_id, voter, side, BALLOT).await?;
        }

        if debate.awaiting_verdict() {
            // Let the window lapse; a tie then goes to sudden death
            self.clock
                .advance(self.rules.voting_window() + Duration::hours(1));
            debate = self.engine.read_debate(debate_id).await?;
            if debate.awaiting_verdict() {
                let (voter, _) = ballots.next().unwrap_or((Uuid::new_v4(), 0.0));
                self.engine
                    .cast_vote(debate_id, voter, Side::Challenger, BALLOT)
                    .await?;
            }
        }
        Ok(())
    }

    fn entrant(&self, entrant: Option<EntrantView>) -> String {
        match entrant {
            Some(e) => match e.seed {
                Some(seed) => format!("({}) {}", seed, self.name(e.agent_id)),
                None => self.name(e.agent_id),
            },
            None => "-".to_string(),
        }
    }

    fn print_bracket(&self, bracket: &BracketView) {
        println!();
        println!("{}", "Bracket".bold().cyan());

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Stage").fg(Color::Cyan),
                Cell::new("Slot").fg(Color::Cyan),
                Cell::new("PRO").fg(Color::Cyan),
                Cell::new("CON").fg(Color::Cyan),
                Cell::new("Series").fg(Color::Cyan),
                Cell::new("Winner").fg(Color::Cyan),
            ]);

        for round in &bracket.rounds {
            let stage = RoundKind::of(round.round, bracket.total_rounds).label();
            for m in &round.matches {
                let series = match (m.status, m.series) {
                    (MatchStatus::Bye, _) => "bye".to_string(),
                    (_, Some(s)) => format!("{}-{}", s.original_pro_wins, s.original_con_wins),
                    _ => "-".to_string(),
                };
                let winner = match m.winner {
                    Some(w) => Cell::new(self.name(w)).fg(Color::Green),
                    None => Cell::new("-"),
                };
                table.add_row(vec![
                    Cell::new(stage),
                    Cell::new(m.position),
                    Cell::new(self.entrant(m.pro)),
                    Cell::new(self.entrant(m.con)),
                    Cell::new(series),
                    winner,
                ]);
            }
        }
        println!("{table}");
    }

    async fn print_leaderboard(&self) -> Result<()> {
        println!();
        println!("{}", "Leaderboard".bold().cyan());

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("#").fg(Color::Cyan),
                Cell::new("Agent").fg(Color::Cyan),
                Cell::new("Rating").fg(Color::Cyan),
                Cell::new("Bonus").fg(Color::Cyan),
                Cell::new("W-L").fg(Color::Cyan),
                Cell::new("Forfeits").fg(Color::Cyan),
                Cell::new("Titles").fg(Color::Cyan),
            ]);

        for (rank, record) in self.engine.leaderboard(self.names.len()).await?.iter().enumerate() {
            table.add_row(vec![
                Cell::new(rank + 1),
                Cell::new(self.name(record.agent_id)),
                Cell::new(format!("{:.1}", record.effective())).fg(Color::Green),
                Cell::new(format!("{:+.1}", record.tournament_bonus)),
                Cell::new(format!("{}-{}", record.wins, record.losses)),
                Cell::new(record.forfeits),
                Cell::new(record.tournaments_won).fg(Color::Yellow),
            ]);
        }
        println!("{table}");
        Ok(())
    }
}
