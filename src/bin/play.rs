use ai_2048_bench::engine::SpawnPolicy;
use ai_2048_bench::harness::play_game_with;
use ai_2048_bench::strategy::{Player, StrategyConfig, StrategyKind};
use clap::Parser;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Parser)]
#[command(name = "play", about = "Play one 2048 game with a strategy and print every board")]
struct Args {
    #[arg(long, short = 's', value_enum, default_value_t = StrategyKind::Expectimax)]
    strategy: StrategyKind,

    /// Seed for spawns and randomized strategies (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Only spawn 2's
    #[arg(long)]
    twos_only: bool,

    /// Print only the final board
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let player = Player::new(&StrategyConfig::new(args.strategy))?;
    let seed = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let policy = if args.twos_only { SpawnPolicy::TWOS_ONLY } else { SpawnPolicy::STANDARD };
    let mut rng = StdRng::seed_from_u64(seed);

    let mut move_count = 0u64;
    let result = play_game_with(&player, &mut rng, policy, |turn| {
        move_count += 1;
        debug!("move {move_count}: {}, +{}", turn.direction, turn.score_gained);
        if args.quiet {
            return;
        }
        if move_count == 1 {
            println!("{}", turn.before);
        }
        println!("{}\n{}", turn.direction, turn.after);
    })?;

    if args.quiet {
        println!("{}", result.final_board);
    }
    println!(
        "{} | seed: {seed} | moves: {} | score: {} | highest tile: {}",
        player.name(),
        result.total_moves,
        result.total_score,
        result.final_board.highest_tile()
    );
    Ok(())
}
