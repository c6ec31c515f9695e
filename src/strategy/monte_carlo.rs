//! Monte-Carlo rollout player.
//!
//! For each legal move, plays `rollouts` random games to the end (or to a
//! move cap) and keeps the move with the best average outcome. Every rollout
//! owns a `SmallRng` whose seed is derived from one value drawn from the
//! caller's rng plus the (direction, rollout) index, so the decision is the
//! same whether rollouts run sequentially or on the rayon pool.

use clap::ValueEnum;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::greedy::random_legal_move;
use super::ConfigError;
use crate::engine::{spawn_tile, Board, Direction};
use crate::heuristic::Heuristic;

/// What a finished rollout is worth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RolloutScore {
    /// Merge score gained from the candidate move to the end of the rollout.
    #[default]
    Score,
    /// Face value of the highest tile on the final board.
    MaxTile,
    /// [`MonteCarloConfig::heuristic`] applied to the final board.
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Random playouts per candidate move.
    pub rollouts: u32,
    /// Stop a playout after this many random moves. `None` plays to game over.
    pub move_cap: Option<u32>,
    pub score: RolloutScore,
    /// Evaluation used with [`RolloutScore::Heuristic`].
    pub heuristic: Heuristic,
    /// Run the rollouts of each candidate move on the rayon pool.
    pub parallel: bool,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            rollouts: 100,
            move_cap: None,
            score: RolloutScore::default(),
            heuristic: Heuristic::default(),
            parallel: true,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rollouts == 0 {
            return Err(ConfigError::ZeroRollouts);
        }
        if self.move_cap == Some(0) {
            return Err(ConfigError::ZeroMoveCap);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MonteCarlo {
    cfg: MonteCarloConfig,
}

impl MonteCarlo {
    pub fn new(cfg: MonteCarloConfig) -> Self {
        crate::init_game();
        Self { cfg }
    }

    pub fn config(&self) -> &MonteCarloConfig { &self.cfg }

    /// Best move by average rollout value, or `None` if the game is over.
    pub fn choose_move<R: Rng + ?Sized>(&self, board: Board, rng: &mut R) -> Option<Direction> {
        let base_seed: u64 = rng.gen();
        let mut legal = board.legal_moves();
        let first = legal.next()?;
        if legal.next().is_none() {
            return Some(first);
        }
        let averages = self.evaluate_seeded(board, base_seed);
        let mut best: Option<(Direction, f64)> = None;
        for (dir, avg) in Direction::ALL.into_iter().zip(averages) {
            match (avg, best) {
                (None, _) => {}
                (Some(v), Some((_, b))) if v <= b => {}
                (Some(v), _) => best = Some((dir, v)),
            }
        }
        best.map(|(dir, _)| dir)
    }

    /// Average rollout value per direction in [`Direction::ALL`] order;
    /// `None` for moves that do not change the board.
    pub fn evaluate<R: Rng + ?Sized>(&self, board: Board, rng: &mut R) -> [Option<f64>; 4] {
        self.evaluate_seeded(board, rng.gen())
    }

    fn evaluate_seeded(&self, board: Board, base_seed: u64) -> [Option<f64>; 4] {
        Direction::ALL.map(|dir| {
            let out = board.apply_move(dir);
            if !out.changed {
                return None;
            }
            let n = self.cfg.rollouts;
            let run = |i: u32| {
                let mut rng = SmallRng::seed_from_u64(rollout_seed(base_seed, dir, i));
                self.rollout(out.board, out.score_gained, &mut rng)
            };
            // Collect before summing so the float sum is order-stable.
            let values: Vec<f64> = if self.cfg.parallel {
                (0..n).into_par_iter().map(run).collect()
            } else {
                (0..n).map(run).collect()
            };
            Some(values.iter().sum::<f64>() / f64::from(n))
        })
    }

    /// Play randomly from `after_move` until game over or the move cap.
    fn rollout(&self, after_move: Board, first_gain: u64, rng: &mut SmallRng) -> f64 {
        let mut score = first_gain;
        let mut moves = 0u32;
        // A board that just changed always has an empty cell.
        let Ok(mut board) = spawn_tile(after_move, rng) else {
            return self.terminal_value(after_move, score);
        };
        while self.cfg.move_cap.map_or(true, |cap| moves < cap) {
            let Some(dir) = random_legal_move(board, rng) else { break };
            let out = board.apply_move(dir);
            score += out.score_gained;
            moves += 1;
            match spawn_tile(out.board, rng) {
                Ok(next) => board = next,
                Err(_) => {
                    board = out.board;
                    break;
                }
            }
        }
        self.terminal_value(board, score)
    }

    fn terminal_value(&self, board: Board, score: u64) -> f64 {
        match self.cfg.score {
            RolloutScore::Score => score as f64,
            RolloutScore::MaxTile => board.highest_tile() as f64,
            RolloutScore::Heuristic => self.cfg.heuristic.evaluate(board),
        }
    }
}

/// Independent stream per (decision, direction, rollout).
fn rollout_seed(base: u64, dir: Direction, rollout: u32) -> u64 {
    splitmix64(base ^ splitmix64(((dir.index() as u64) << 32) | u64::from(rollout)))
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    fn cfg(rollouts: u32, parallel: bool) -> MonteCarloConfig {
        MonteCarloConfig { rollouts, parallel, ..MonteCarloConfig::default() }
    }

    #[test]
    fn zero_rollouts_and_zero_cap_are_rejected() {
        assert_eq!(cfg(0, false).validate(), Err(ConfigError::ZeroRollouts));
        let capped = MonteCarloConfig { move_cap: Some(0), ..cfg(1, false) };
        assert_eq!(capped.validate(), Err(ConfigError::ZeroMoveCap));
        assert_eq!(MonteCarloConfig::default().validate(), Ok(()));
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let board = Board::from_grid([[1, 1, 2, 0], [0, 3, 0, 0], [0, 0, 1, 0], [0; 4]]);
        let seq = MonteCarlo::new(cfg(16, false)).evaluate(board, &mut StdRng::seed_from_u64(42));
        let par = MonteCarlo::new(cfg(16, true)).evaluate(board, &mut StdRng::seed_from_u64(42));
        assert_eq!(seq, par);
    }

    #[test]
    fn illegal_moves_have_no_value() {
        let board = Board::from_grid([[1, 2, 0, 0], [0; 4], [0; 4], [0; 4]]);
        let values = MonteCarlo::new(cfg(4, false)).evaluate(board, &mut StdRng::seed_from_u64(1));
        assert_eq!(values[Direction::Left.index()], None);
        assert_eq!(values[Direction::Up.index()], None);
        assert!(values[Direction::Right.index()].is_some());
    }

    #[test]
    fn move_cap_bounds_rollouts() {
        // One random move after the candidate can add at most one merge.
        let capped = MonteCarlo::new(MonteCarloConfig { move_cap: Some(1), ..cfg(8, false) });
        let board = Board::from_grid([[1, 0, 0, 0], [0; 4], [0; 4], [0; 4]]);
        let values = capped.evaluate(board, &mut StdRng::seed_from_u64(8));
        for v in values.into_iter().flatten() {
            assert!(v <= 8.0, "{v}");
        }
    }

    #[test]
    fn max_tile_score_reports_face_values() {
        let mc = MonteCarlo::new(MonteCarloConfig { score: RolloutScore::MaxTile, move_cap: Some(1), ..cfg(2, false) });
        let board = Board::from_grid([[5, 0, 0, 0], [0; 4], [0; 4], [0; 4]]);
        let values = mc.evaluate(board, &mut StdRng::seed_from_u64(2));
        for v in values.into_iter().flatten() {
            assert_eq!(v, 32.0);
        }
    }

    #[test]
    fn seeds_differ_per_direction_and_rollout() {
        let a = rollout_seed(7, Direction::Left, 0);
        assert_ne!(a, rollout_seed(7, Direction::Up, 0));
        assert_ne!(a, rollout_seed(7, Direction::Left, 1));
        assert_ne!(a, rollout_seed(8, Direction::Left, 0));
    }
}
