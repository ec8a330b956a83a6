//! `ladder` - command-line front end for the evaluation ladder
//!
//! `ladder run` drives the match/rate/churn loop against an external match
//! runner; `ladder standings` prints the rating table from a checkpoint.
//! Ctrl-C requests a cooperative shutdown: in-flight subprocesses are reaped,
//! their selections rolled back, and a final checkpoint written.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ladder_arena::{standings_of, Ladder, Standing};
use ladder_core::{persist, LadderConfig};

#[derive(Parser)]
#[command(name = "ladder", version, about = "Bandit-driven matchmaking and rating ladder")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the evaluation loop
    Run(RunArgs),
    /// Print the rating table from an existing checkpoint
    Standings(StandingsArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Directory holding the checkpoint files
    #[arg(long, default_value = "ladder-run")]
    working_dir: PathBuf,

    /// Directory of candidate network files scanned on fresh startup
    #[arg(long, default_value = "networks")]
    network_dir: PathBuf,

    /// Match runner executable
    #[arg(long, default_value = "./release/vs")]
    runner: PathBuf,

    /// Per-side search effort handed to the match runner
    #[arg(long, default_value_t = 4096)]
    search_iterations: u32,

    /// Worker threads running matches concurrently
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Population cap
    #[arg(long, default_value_t = 32)]
    max_agents: usize,

    /// Agents retired and replaced per churn cycle
    #[arg(long, default_value_t = 8)]
    n_delete: usize,

    /// Matches scheduled per round
    #[arg(long, default_value_t = 256)]
    games_per_round: usize,

    /// Rounds to run; 0 runs until interrupted
    #[arg(long, default_value_t = 0)]
    rounds: u64,

    /// Churn the population every this many rounds; 0 disables churn
    #[arg(long, default_value_t = 1)]
    churn_interval: u32,

    /// Reset all visit counts after each churn cycle
    #[arg(long)]
    reset_visits: bool,

    /// UCB exploration constant for pair selection
    #[arg(long, default_value_t = 1.0)]
    exploration: f32,

    /// Elo K-factor
    #[arg(long, default_value_t = 8.0)]
    k_factor: f32,

    /// Optional team/constraint file forwarded to the match runner
    #[arg(long)]
    teams: Option<PathBuf>,

    /// Per-match wall-clock limit in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// RNG seed for reproducible agent sampling
    #[arg(long)]
    seed: Option<u64>,
}

impl RunArgs {
    fn into_config(self) -> (LadderConfig, u64, Option<u64>) {
        let config = LadderConfig {
            working_dir: self.working_dir,
            network_dir: self.network_dir,
            runner_exe: self.runner,
            search_effort: self.search_iterations,
            teams_path: self.teams,
            max_agents: self.max_agents,
            n_replace: self.n_delete,
            games_per_round: self.games_per_round,
            churn_interval: self.churn_interval,
            reset_visits_on_churn: self.reset_visits,
            exploration_c: self.exploration,
            elo_k: self.k_factor,
            match_timeout: self.timeout_secs.map(Duration::from_secs),
            ..LadderConfig::default()
        }
        .with_threads(self.threads);
        (config, self.rounds, self.seed)
    }
}

#[derive(Args)]
struct StandingsArgs {
    /// Directory holding the checkpoint files
    #[arg(long, default_value = "ladder-run")]
    working_dir: PathBuf,

    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run(args) => run(args).await,
        Command::Standings(args) => standings(args),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let (config, rounds, seed) = args.into_config();
    let ladder = Ladder::new(config)?;

    let shutdown = ladder.shutdown_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing in-flight matches");
            shutdown.trigger();
        }
    });

    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    // The loop is synchronous (subprocess supervision and a thread pool);
    // park it on a blocking thread so the signal handler stays responsive.
    tokio::task::spawn_blocking(move || ladder.run(rounds, &mut rng))
        .await
        .context("evaluation loop panicked")??;
    Ok(())
}

fn standings(args: StandingsArgs) -> Result<()> {
    let registry = match persist::load(&args.working_dir)
        .with_context(|| format!("loading checkpoint from {}", args.working_dir.display()))?
    {
        Some(registry) => registry,
        None => bail!("no checkpoint in {}", args.working_dir.display()),
    };

    let rows = standings_of(&registry);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_table(&rows);
    }
    Ok(())
}

fn print_table(rows: &[Standing]) {
    println!(
        "{:<16} {:>4} {:>16} {:>7} {:>6} {:>6} {:>5} {:>5} {:>5}",
        "bandit", "mode", "net", "rating", "value", "visits", "w", "l", "d"
    );
    for row in rows {
        println!(
            "{:<16} {:>4} {:>16} {:>7.1} {:>6.3} {:>6} {:>5} {:>5} {:>5}",
            row.bandit_name,
            row.policy_mode,
            row.net_hash,
            row.rating,
            row.value,
            row.visits,
            row.wins,
            row.losses,
            row.draws
        );
    }
}
