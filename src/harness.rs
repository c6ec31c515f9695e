//! Benchmark harness: plays complete games with a [`Player`] and accumulates
//! the raw counters of the result-row schema.
//!
//! Games are independent. Each one gets its own `SmallRng` seeded from a
//! `u64` drawn up front from the caller's rng, so a batch gives the same
//! [`AggregateStats`] whether it runs on one thread or on the rayon pool.
//!
//! ```
//! use ai_2048_bench::harness::run_games;
//! use ai_2048_bench::strategy::{Player, StrategyKind};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let player = Player::from_kind(StrategyKind::Ordered);
//! let stats = run_games(&player, 5, &mut StdRng::seed_from_u64(1)).unwrap();
//! assert_eq!(stats.games_played, 5);
//! assert_eq!(stats.reached_count(4), stats.reached[0]);
//! ```

use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::rngs::{SmallRng, StdRng};
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::{new_game, spawn_tile_with, Board, Direction, EngineError, SpawnPolicy};
use crate::strategy::{validate_weight, ConfigError, Player, StrategyConfig};

/// Smallest tracked threshold, log 4 (face 16).
pub const FIRST_THRESHOLD_LOG: u8 = 4;
/// Largest tracked threshold, log 17 (face 131072).
pub const LAST_THRESHOLD_LOG: u8 = 17;
/// Number of "reached tile X" columns in a result row.
pub const THRESHOLDS: usize = (LAST_THRESHOLD_LOG - FIRST_THRESHOLD_LOG + 1) as usize;

#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// Summary of one finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub max_tile_log: u8,
    pub total_score: u64,
    pub total_moves: u64,
    pub final_board: Board,
}

/// Raw per-strategy counters. Percentages and averages are left to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregateStats {
    pub strategy: String,
    pub games_played: u64,
    /// `reached[i]` counts games whose max tile was at least `2^(i + 4)`.
    pub reached: [u64; THRESHOLDS],
    pub total_score: u64,
    pub total_moves: u64,
    /// Games dropped because of an internal spawn error; not in any other counter.
    pub discarded: u64,
}

impl AggregateStats {
    pub fn new(strategy: impl Into<String>) -> Self { Self { strategy: strategy.into(), ..Self::default() } }

    /// Fold one finished game into the counters.
    pub fn record(&mut self, game: &GameResult) {
        self.games_played += 1;
        self.total_score += game.total_score;
        self.total_moves += game.total_moves;
        let top = game.max_tile_log.min(LAST_THRESHOLD_LOG);
        for log in FIRST_THRESHOLD_LOG..=top {
            self.reached[(log - FIRST_THRESHOLD_LOG) as usize] += 1;
        }
    }

    pub fn record_discarded(&mut self) { self.discarded += 1; }

    /// Add another partial result for the same strategy.
    pub fn merge(&mut self, other: &AggregateStats) {
        if self.strategy.is_empty() {
            self.strategy.clone_from(&other.strategy);
        }
        self.games_played += other.games_played;
        for (mine, theirs) in self.reached.iter_mut().zip(other.reached.iter()) {
            *mine += theirs;
        }
        self.total_score += other.total_score;
        self.total_moves += other.total_moves;
        self.discarded += other.discarded;
    }

    /// Games that reached face value `2^tile_log`, 0 outside the tracked range.
    pub fn reached_count(&self, tile_log: u8) -> u64 {
        if (FIRST_THRESHOLD_LOG..=LAST_THRESHOLD_LOG).contains(&tile_log) {
            self.reached[(tile_log - FIRST_THRESHOLD_LOG) as usize]
        } else {
            0
        }
    }

    /// `(face value, count)` for every tracked threshold, smallest first.
    pub fn thresholds(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        (FIRST_THRESHOLD_LOG..=LAST_THRESHOLD_LOG).map(move |log| (1u64 << log, self.reached_count(log)))
    }

    pub fn percent_reached(&self, tile_log: u8) -> f64 {
        if self.games_played == 0 {
            return 0.0;
        }
        self.reached_count(tile_log) as f64 * 100.0 / self.games_played as f64
    }

    pub fn average_score(&self) -> f64 { per_game(self.total_score, self.games_played) }

    pub fn average_moves(&self) -> f64 { per_game(self.total_moves, self.games_played) }
}

fn per_game(total: u64, games: u64) -> f64 {
    if games == 0 { 0.0 } else { total as f64 / games as f64 }
}

impl AddAssign<&AggregateStats> for AggregateStats {
    fn add_assign(&mut self, rhs: &AggregateStats) { self.merge(rhs) }
}

impl Add for AggregateStats {
    type Output = AggregateStats;

    fn add(mut self, rhs: AggregateStats) -> AggregateStats {
        self.merge(&rhs);
        self
    }
}

impl Sum for AggregateStats {
    fn sum<I: Iterator<Item = AggregateStats>>(iter: I) -> Self { iter.fold(AggregateStats::default(), Add::add) }
}

/// Knobs for a batch of games.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub games: u64,
    /// Seed for the per-game streams; a fresh one is drawn when absent.
    pub seed: Option<u64>,
    /// Worker threads. `Some(1)` runs on the calling thread, `None` uses
    /// every core.
    pub threads: Option<usize>,
    /// Stop starting new games after this many seconds.
    pub time_limit_secs: Option<f64>,
    pub spawn: SpawnPolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self { Self { games: 100, seed: None, threads: None, time_limit_secs: None, spawn: SpawnPolicy::STANDARD } }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secs) = self.time_limit_secs {
            validate_weight("time_limit_secs", secs)?;
        }
        let p = self.spawn.four_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::InvalidProbability { name: "four_probability", value: p });
        }
        Ok(())
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// One applied move, handed to the observer of [`play_game_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn {
    pub before: Board,
    pub direction: Direction,
    pub score_gained: u64,
    /// Board after the move and the spawn that follows it.
    pub after: Board,
}

/// Play one game to completion.
///
/// Fails with [`EngineError::IllegalMove`] if the player returns a move that
/// does not change the board, and [`EngineError::IllegalSpawn`] if a tile is
/// requested on a full board.
pub fn play_game<R: Rng + ?Sized>(player: &Player, rng: &mut R, policy: SpawnPolicy) -> Result<GameResult, EngineError> {
    play_game_with(player, rng, policy, |_| {})
}

/// [`play_game`], calling `on_turn` after every move.
pub fn play_game_with<R, F>(player: &Player, rng: &mut R, policy: SpawnPolicy, mut on_turn: F) -> Result<GameResult, EngineError>
where
    R: Rng + ?Sized,
    F: FnMut(&Turn),
{
    let player = player.for_game();
    let mut board = new_game(rng, policy)?;
    let mut total_score = 0u64;
    let mut total_moves = 0u64;
    while let Some(direction) = player.choose_move(board, rng) {
        let out = board.apply_move(direction);
        if !out.changed {
            return Err(EngineError::IllegalMove { board, direction });
        }
        total_score += out.score_gained;
        total_moves += 1;
        let after = spawn_tile_with(out.board, rng, policy)?;
        on_turn(&Turn { before: board, direction, score_gained: out.score_gained, after });
        board = after;
    }
    Ok(GameResult { max_tile_log: board.max_log(), total_score, total_moves, final_board: board })
}

/// Play `count` standard games on the calling thread.
pub fn run_games<R: Rng + ?Sized>(player: &Player, count: u64, rng: &mut R) -> Result<AggregateStats, HarnessError> {
    let cfg = HarnessConfig { games: count, threads: Some(1), ..HarnessConfig::default() };
    run_games_with(player, &cfg, rng, None)
}

#[derive(Debug)]
enum Outcome {
    Played(GameResult),
    Discarded,
    Skipped,
}

/// Sort one game into played or discarded; any other error ends the run.
fn classify(name: &str, seed: u64, game: Result<GameResult, EngineError>) -> Result<Outcome, EngineError> {
    match game {
        Ok(result) => {
            debug!(
                "{name}: game {seed:#x} ended after {} moves, score {}, max tile {}",
                result.total_moves,
                result.total_score,
                result.final_board.highest_tile()
            );
            Ok(Outcome::Played(result))
        }
        Err(EngineError::IllegalSpawn { board }) => {
            warn!("{name}: discarding game {seed:#x}, spawn requested on full board {board:?}");
            Ok(Outcome::Discarded)
        }
        Err(e) => Err(e),
    }
}

fn absorb(mut acc: AggregateStats, outcome: Result<Outcome, EngineError>) -> Result<AggregateStats, EngineError> {
    match outcome? {
        Outcome::Played(result) => acc.record(&result),
        Outcome::Discarded => acc.record_discarded(),
        Outcome::Skipped => {}
    }
    Ok(acc)
}

/// Play `cfg.games` games, on a dedicated rayon pool unless `cfg.threads` is 1.
///
/// `progress` is called once per game finished or discarded. Games not
/// started before the time limit are simply absent from the result.
pub fn run_games_with<R: Rng + ?Sized>(
    player: &Player,
    cfg: &HarnessConfig,
    rng: &mut R,
    progress: Option<&(dyn Fn() + Sync)>,
) -> Result<AggregateStats, HarnessError> {
    cfg.validate()?;
    let name = player.name();
    let seeds: Vec<u64> = (0..cfg.games).map(|_| rng.gen()).collect();
    let start = Instant::now();
    let deadline = cfg.time_limit().map(|limit| start + limit);
    info!("{name}: starting {} games", cfg.games);

    let play_seeded = |seed: u64| -> Result<Outcome, EngineError> {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(Outcome::Skipped);
        }
        let mut game_rng = SmallRng::seed_from_u64(seed);
        let outcome = classify(&name, seed, play_game(player, &mut game_rng, cfg.spawn))?;
        if let Some(tick) = progress {
            tick();
        }
        Ok(outcome)
    };

    let stats = if cfg.threads == Some(1) {
        seeds.iter().map(|&seed| play_seeded(seed)).try_fold(AggregateStats::new(name.as_str()), absorb)?
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.threads.unwrap_or(0))
            .build()
            .map_err(|e| HarnessError::ThreadPool(e.to_string()))?;
        pool.install(|| {
            seeds
                .par_iter()
                .map(|&seed| play_seeded(seed))
                .try_fold(|| AggregateStats::new(name.as_str()), absorb)
                .try_reduce(|| AggregateStats::new(name.as_str()), |a, b| Ok(a + b))
        })?
    };

    let skipped = cfg.games - stats.games_played - stats.discarded;
    if skipped > 0 {
        info!("{name}: time limit reached, {skipped} games not started");
    }
    info!(
        "{name}: {} games ({} discarded) in {:.1}s, avg score {:.1}",
        stats.games_played,
        stats.discarded,
        start.elapsed().as_secs_f64(),
        stats.average_score()
    );
    Ok(stats)
}

/// Several strategies benchmarked under one harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchPlan {
    pub strategies: Vec<StrategyConfig>,
    pub harness: HarnessConfig,
}

impl BenchPlan {
    /// Build every player, failing before any game is played.
    pub fn players(&self) -> Result<Vec<Player>, ConfigError> {
        self.harness.validate()?;
        self.strategies.iter().map(Player::new).collect()
    }

    /// The configured seed, or a fresh one from the thread rng.
    pub fn resolve_seed(&self) -> u64 { self.harness.seed.unwrap_or_else(|| rand::thread_rng().gen()) }

    /// One row per strategy. Every strategy starts from the same game seeds.
    pub fn run(&self, seed: u64, progress: Option<&(dyn Fn() + Sync)>) -> Result<Vec<AggregateStats>, HarnessError> {
        let players = self.players()?;
        players
            .iter()
            .map(|player| run_games_with(player, &self.harness, &mut StdRng::seed_from_u64(seed), progress))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyKind;

    fn game(max_tile_log: u8, score: u64, moves: u64) -> GameResult {
        GameResult { max_tile_log, total_score: score, total_moves: moves, final_board: Board::EMPTY }
    }

    #[test]
    fn record_fills_every_threshold_up_to_max_tile() {
        let mut stats = AggregateStats::new("t");
        stats.record(&game(6, 500, 80));
        stats.record(&game(3, 20, 10));
        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.reached_count(4), 1);
        assert_eq!(stats.reached_count(6), 1);
        assert_eq!(stats.reached_count(7), 0);
        assert_eq!(stats.reached_count(3), 0);
        assert_eq!((stats.total_score, stats.total_moves), (520, 90));
        assert_eq!(stats.percent_reached(5), 50.0);
    }

    #[test]
    fn thresholds_cover_16_through_131072() {
        let stats = AggregateStats::new("t");
        let faces: Vec<u64> = stats.thresholds().map(|(face, _)| face).collect();
        assert_eq!(faces.len(), THRESHOLDS);
        assert_eq!(faces.first(), Some(&16));
        assert_eq!(faces.last(), Some(&131_072));
    }

    #[test]
    fn merge_sums_every_counter() {
        let mut a = AggregateStats::new("x");
        a.record(&game(11, 20_000, 900));
        let mut b = AggregateStats::new("x");
        b.record(&game(5, 300, 70));
        b.record_discarded();
        let merged = a.clone() + b.clone();
        assert_eq!(merged.games_played, 2);
        assert_eq!(merged.discarded, 1);
        assert_eq!(merged.reached_count(5), 2);
        assert_eq!(merged.reached_count(11), 1);
        assert_eq!(vec![a, b].into_iter().sum::<AggregateStats>(), merged);
    }

    #[test]
    fn invalid_harness_config_is_rejected() {
        let cfg = HarnessConfig { spawn: SpawnPolicy { four_probability: 1.5 }, ..HarnessConfig::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidProbability { .. })));
        let cfg = HarnessConfig { time_limit_secs: Some(-1.0), ..HarnessConfig::default() };
        assert!(cfg.validate().is_err());
        let player = Player::from_kind(StrategyKind::Random);
        let err = run_games_with(&player, &cfg, &mut StdRng::seed_from_u64(0), None).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn games_end_on_a_dead_board() {
        let player = Player::from_kind(StrategyKind::Merge);
        let result = play_game(&player, &mut StdRng::seed_from_u64(4), SpawnPolicy::STANDARD).unwrap();
        assert!(result.final_board.is_game_over());
        assert_eq!(result.max_tile_log, result.final_board.max_log());
        assert!(result.total_moves > 0);
    }

    #[test]
    fn zero_time_limit_starts_no_games() {
        let player = Player::from_kind(StrategyKind::Random);
        let cfg = HarnessConfig { games: 10, threads: Some(1), time_limit_secs: Some(0.0), ..HarnessConfig::default() };
        let stats = run_games_with(&player, &cfg, &mut StdRng::seed_from_u64(0), None).unwrap();
        assert_eq!(stats.games_played, 0);
        assert_eq!(stats.strategy, "random");
    }

    #[test]
    fn plan_rejects_bad_strategy_before_playing() {
        let mut bad = StrategyConfig::new(StrategyKind::MonteCarlo);
        bad.monte_carlo.rollouts = 0;
        let plan = BenchPlan { strategies: vec![StrategyConfig::new(StrategyKind::Random), bad], ..BenchPlan::default() };
        assert!(matches!(plan.run(1, None), Err(HarnessError::Config(ConfigError::ZeroRollouts))));
    }

    #[test]
    fn spawn_failure_discards_only_that_game() {
        let full = Board::from_grid([[1, 2, 1, 2], [2, 1, 2, 1], [1, 2, 1, 2], [2, 1, 2, 1]]);
        let games = [Ok(game(7, 1_000, 120)), Err(EngineError::IllegalSpawn { board: full }), Ok(game(5, 200, 40))];
        let stats = games
            .into_iter()
            .enumerate()
            .map(|(i, g)| classify("t", i as u64, g))
            .try_fold(AggregateStats::new("t"), absorb)
            .unwrap();
        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.discarded, 1);
        assert_eq!((stats.total_score, stats.total_moves), (1_200, 160));
        assert_eq!(stats.reached_count(5), 2);
        assert_eq!(stats.reached_count(7), 1);
        assert_eq!(stats.reached_count(8), 0);
    }

    #[test]
    fn illegal_move_aborts_the_batch() {
        let board = Board::from_grid([[1, 0, 0, 0], [0; 4], [0; 4], [0; 4]]);
        let bad = EngineError::IllegalMove { board, direction: Direction::Left };
        let games = [Ok(game(6, 300, 50)), Err(bad.clone()), Ok(game(6, 300, 50))];
        let err = games
            .into_iter()
            .map(|g| classify("t", 0, g))
            .try_fold(AggregateStats::new("t"), absorb)
            .map_err(HarnessError::from)
            .unwrap_err();
        assert!(matches!(err, HarnessError::Engine(e) if e == bad));
    }

    #[test]
    fn turns_are_reported_in_order() {
        let player = Player::from_kind(StrategyKind::Ordered);
        let mut turns = Vec::new();
        let result =
            play_game_with(&player, &mut StdRng::seed_from_u64(6), SpawnPolicy::STANDARD, |t| turns.push(*t)).unwrap();
        assert_eq!(turns.len() as u64, result.total_moves);
        assert_eq!(turns.iter().map(|t| t.score_gained).sum::<u64>(), result.total_score);
        assert!(turns.windows(2).all(|w| w[0].after == w[1].before));
        assert_eq!(turns.last().map(|t| t.after), Some(result.final_board));
    }
}
