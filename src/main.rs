use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Duration;

use ai_2048_bench::harness::{BenchPlan, HarnessConfig};
use ai_2048_bench::heuristic::Heuristic;
use ai_2048_bench::report::{write_report, Format};
use ai_2048_bench::strategy::{Depth, RolloutScore, StrategyConfig, StrategyKind};
use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

#[derive(Debug, Parser)]
#[command(name = "bench-2048", about = "Benchmark 2048 strategies over many simulated games")]
struct Args {
    /// Strategy to benchmark; repeat for several. Defaults to all of them.
    #[arg(long = "strategy", short = 's', value_enum)]
    strategies: Vec<StrategyKind>,

    /// Games per strategy
    #[arg(long, short = 'n', default_value_t = 100)]
    games: u64,

    /// Seed for the game streams (random if omitted; always printed)
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads (default: all cores; 1 runs on the main thread)
    #[arg(long)]
    threads: Option<usize>,

    /// Stop starting new games after this many seconds per strategy
    #[arg(long)]
    time_limit_secs: Option<f64>,

    /// Fixed search depth for minimax/expectimax/random-trials
    #[arg(long, conflicts_with = "adaptive_depth")]
    depth: Option<u32>,

    /// Pick the search depth per position, up to this many plies
    #[arg(long)]
    adaptive_depth: Option<u32>,

    /// Leaf evaluation for minimax/expectimax/random-trials
    #[arg(long, value_enum)]
    heuristic: Option<Heuristic>,

    /// Sampled spawns per candidate move for random-trials
    #[arg(long)]
    trials: Option<u32>,

    /// Rollouts per candidate move for monte-carlo
    #[arg(long)]
    rollouts: Option<u32>,

    /// Random moves per rollout before it is cut off
    #[arg(long)]
    move_cap: Option<u32>,

    /// What a finished rollout is worth
    #[arg(long, value_enum)]
    rollout_score: Option<RolloutScore>,

    /// Load the whole run from a JSON bench plan; other strategy flags are ignored
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write result rows here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Suppress the progress bar
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    ai_2048_bench::init_game();

    let mut plan = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<BenchPlan>(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => plan_from_args(&args),
    };
    if plan.strategies.is_empty() {
        bail!("bench plan names no strategies");
    }
    let seed = args.seed.unwrap_or_else(|| plan.resolve_seed());
    plan.harness.seed = Some(seed);
    eprintln!("seed: {seed}");
    info!("benchmarking {} strategies, {} games each", plan.strategies.len(), plan.harness.games);

    let total = plan.harness.games * plan.strategies.len() as u64;
    let pb = if args.quiet { ProgressBar::hidden() } else { ProgressBar::new(total) };
    pb.set_style(
        ProgressStyle::with_template("{spinner} {elapsed_precise} [{bar:40}] {pos}/{len} games | ETA {eta}")?
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    let tick: &(dyn Fn() + Sync) = &|| pb.inc(1);
    let rows = plan.run(seed, Some(tick));
    pb.finish_and_clear();
    let rows = rows?;

    for row in &rows {
        eprintln!(
            "{:<32} games: {:>6} | avg score: {:>10.1} | avg moves: {:>8.1} | 2048: {:>5.1}%",
            row.strategy,
            row.games_played,
            row.average_score(),
            row.average_moves(),
            row.percent_reached(11)
        );
    }

    match &args.out {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            write_report(BufWriter::new(file), &rows, args.format)?;
            info!("wrote {} rows to {}", rows.len(), path.display());
        }
        None => write_report(io::stdout().lock(), &rows, args.format)?,
    }
    Ok(())
}

fn plan_from_args(args: &Args) -> BenchPlan {
    let kinds = if args.strategies.is_empty() { StrategyKind::ALL.to_vec() } else { args.strategies.clone() };
    let strategies = kinds
        .into_iter()
        .map(|kind| {
            let mut cfg = StrategyConfig::new(kind);
            if let Some(depth) = args.depth {
                cfg.search.depth = Depth::Fixed(depth);
                cfg.random_trials.depth = depth;
            }
            if let Some(max) = args.adaptive_depth {
                cfg.search.depth = Depth::Adaptive { max };
            }
            if let Some(heuristic) = args.heuristic {
                cfg.search.heuristic = heuristic;
                cfg.random_trials.heuristic = heuristic;
                cfg.monte_carlo.heuristic = heuristic;
            }
            if let Some(trials) = args.trials {
                cfg.random_trials.trials = trials;
            }
            if let Some(rollouts) = args.rollouts {
                cfg.monte_carlo.rollouts = rollouts;
            }
            if args.move_cap.is_some() {
                cfg.monte_carlo.move_cap = args.move_cap;
            }
            if let Some(score) = args.rollout_score {
                cfg.monte_carlo.score = score;
            }
            cfg
        })
        .collect();
    BenchPlan {
        strategies,
        harness: HarnessConfig {
            games: args.games,
            seed: args.seed,
            threads: args.threads,
            time_limit_secs: args.time_limit_secs,
            ..HarnessConfig::default()
        },
    }
}
