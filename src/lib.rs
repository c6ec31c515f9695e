//! ai-2048-bench: a bitboard 2048 engine, a family of move strategies and a
//! benchmark harness
//!
//! This crate provides:
//! - A compact `Board` type (`engine` module) with exact 2048 move/merge
//!   semantics and an explicit-rng tile spawner
//! - Board evaluations shared by the search strategies (`heuristic` module)
//! - Random, Spam-Corner, Rotating, Corner-Weighted, Ordered, Merge, Score,
//!   Random-Trials, Minimax, Expectimax and Monte-Carlo players behind one
//!   `Player` enum (`strategy` module)
//! - A game loop and parallel batch runner producing raw result rows
//!   (`harness` and `report` modules)
//!
//! Quick start:
//! ```
//! use ai_2048_bench::engine::{new_game, Direction, SpawnPolicy};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! // One-time table init
//! ai_2048_bench::init_game();
//!
//! // Deterministic board initialization with a seeded RNG
//! let mut rng = StdRng::seed_from_u64(42);
//! let b0 = new_game(&mut rng, SpawnPolicy::STANDARD).unwrap();
//! let out = b0.apply_move(Direction::Left);
//! assert_eq!(out.board.tile_sum(), b0.tile_sum());
//! ```
//!
//! Full loop (simplest possible)
//! ```
//! use ai_2048_bench::engine::{new_game, SpawnPolicy};
//! use ai_2048_bench::strategy::{Player, StrategyKind};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let player = Player::from_kind(StrategyKind::Expectimax);
//! let mut rng = StdRng::seed_from_u64(123);
//! let mut b = new_game(&mut rng, SpawnPolicy::STANDARD).unwrap();
//! let mut moves = 0u32;
//!
//! // Keep doctests fast: just a few moves
//! while moves < 4 {
//!     let Some(dir) = player.choose_move(b, &mut rng) else { break };
//!     b = b.shift(dir).spawn_tile(&mut rng).unwrap();
//!     moves += 1;
//! }
//! assert_eq!(moves, 4);
//! ```
//!
//! Benchmark a strategy
//! ```
//! use ai_2048_bench::harness::{run_games_with, HarnessConfig};
//! use ai_2048_bench::report::write_csv;
//! use ai_2048_bench::strategy::{Player, StrategyKind};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let player = Player::from_kind(StrategyKind::Corner);
//! let cfg = HarnessConfig { games: 8, ..HarnessConfig::default() };
//! let stats = run_games_with(&player, &cfg, &mut StdRng::seed_from_u64(9), None).unwrap();
//! let mut csv = Vec::new();
//! write_csv(&mut csv, &[stats]).unwrap();
//! assert!(String::from_utf8(csv).unwrap().starts_with("strategy,games,reached_16"));
//! ```

pub mod engine;
pub mod harness;
pub mod heuristic;
pub mod report;
pub mod strategy;

/// Build the move, score and heuristic lookup tables.
///
/// Idempotent and cheap after the first call; every constructor in
/// [`strategy`] calls it, so calling it yourself only moves the one-time
/// cost to a point of your choosing. Holds no per-game state.
pub fn init_game() {
    engine::new();
    heuristic::warm();
}
