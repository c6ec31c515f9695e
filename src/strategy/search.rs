//! Depth-limited tree search: Minimax (worst-case spawn), Expectimax
//! (probability-weighted spawn) and Random-Trials (sampled spawns).
//!
//! All three share the same tree: a max node tries every legal move, a chance
//! node places every possible 2 or 4 into every empty cell. One ply is a move
//! plus the spawn that follows it, so `Depth::Fixed(2)` looks two moves ahead.
//! Only the chance rule differs between Minimax and Expectimax; Random-Trials
//! replaces the full enumeration with a few spawns drawn from the caller's rng.
//!
//! ```
//! use ai_2048_bench::engine::Board;
//! use ai_2048_bench::strategy::{Depth, Expectimax, SearchConfig};
//!
//! let search = Expectimax::new(SearchConfig { depth: Depth::Fixed(1), ..SearchConfig::default() });
//! let board = Board::from_grid([[1, 1, 2, 0], [0; 4], [0; 4], [0; 4]]);
//! let evals = search.branch_evals(board);
//! assert!(evals.iter().filter(|b| b.legal).all(|b| b.ev >= 0.0));
//! assert!(search.choose_move(board).is_some());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState as AHasher;
use dashmap::DashMap;
use log::debug;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::engine::{spawn_tile, Board, Direction};
use crate::heuristic::{count_distinct, Heuristic};

/// Deepest search accepted by [`SearchConfig::validate`].
pub const MAX_SEARCH_DEPTH: u32 = 8;

const FOUR_PROB: f64 = 0.1;
const TWO_PROB: f64 = 1.0 - FOUR_PROB;

/// How many plies to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Fixed(u32),
    /// Chosen per position from the tile count and number of distinct tiles.
    Adaptive { max: u32 },
}

impl Default for Depth {
    fn default() -> Self { Depth::Fixed(2) }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Fixed(d) => write!(f, "d={d}"),
            Depth::Adaptive { max } => write!(f, "d<={max}"),
        }
    }
}

impl Depth {
    fn limit(self) -> u32 {
        match self {
            Depth::Fixed(d) | Depth::Adaptive { max: d } => d,
        }
    }

    /// Plies to search from `board`.
    pub fn for_board(self, board: Board) -> u32 {
        match self {
            Depth::Fixed(d) => d,
            Depth::Adaptive { max } => adaptive_depth(board).clamp(1, max.max(1)),
        }
    }
}

/// Deeper searches for busier boards: more tiles and more distinct values
/// mean fewer safe moves and a larger penalty for mistakes.
pub fn adaptive_depth(board: Board) -> u32 {
    let tiles = 16 - board.count_empty();
    let score = count_distinct(board) + tiles.saturating_sub(6) / 2;
    match score {
        0..=7 => 2,
        8..=10 => 3,
        11..=13 => 4,
        14 => 5,
        _ => 6,
    }
}

/// Tuning knobs shared by Minimax and Expectimax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub depth: Depth,
    pub heuristic: Heuristic,
    /// Expectimax only: stop expanding chance nodes whose cumulative
    /// probability falls below this value.
    pub prob_cutoff: f64,
    /// Reuse chance-node values within a single decision.
    pub cache: bool,
    /// Evaluate the four root moves on the rayon pool.
    pub parallel_root: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            depth: Depth::default(),
            heuristic: Heuristic::default(),
            prob_cutoff: 1e-4,
            cache: true,
            parallel_root: false,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_depth(self.depth.limit())?;
        super::validate_weight("prob_cutoff", self.prob_cutoff)
    }
}

fn validate_depth(depth: u32) -> Result<(), ConfigError> {
    if depth == 0 {
        return Err(ConfigError::ZeroDepth);
    }
    if depth > MAX_SEARCH_DEPTH {
        return Err(ConfigError::DepthTooLarge { depth, max: MAX_SEARCH_DEPTH });
    }
    Ok(())
}

/// Per-branch value at the root.
///
/// - `ev` is the searched value of taking `dir` from the current board.
/// - `legal` is false when the move is a no-op for the current board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchEval {
    pub dir: Direction,
    pub ev: f64,
    pub legal: bool,
}

/// Basic search stats for a single decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub depth: u32,
    pub nodes: u64,
    pub cache_hits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChanceRule {
    WorstCase,
    Expected,
}

#[derive(Clone, Copy)]
struct TranspositionEntry {
    score: f64,
    depth: u32,
}

/// State for one decision. Dropped once the root branches are scored.
struct Search<'a> {
    cfg: &'a SearchConfig,
    rule: ChanceRule,
    map: DashMap<Board, TranspositionEntry, AHasher>,
    nodes: AtomicU64,
    hits: AtomicU64,
}

impl<'a> Search<'a> {
    fn new(cfg: &'a SearchConfig, rule: ChanceRule) -> Self {
        Self {
            cfg,
            rule,
            map: DashMap::with_hasher(AHasher::new()),
            nodes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    fn leaf(&self, board: Board) -> f64 { self.cfg.heuristic.evaluate(board) }

    fn evaluate_max(&self, board: Board, depth: u32, prob: f64) -> f64 {
        self.nodes.fetch_add(1, Ordering::Relaxed);
        let mut best: Option<f64> = None;
        for dir in Direction::ALL {
            let out = board.apply_move(dir);
            if !out.changed {
                continue;
            }
            if depth == 0 {
                // Any legal move means the leaf is not a dead end.
                return self.leaf(board);
            }
            let value = self.evaluate_chance(out.board, depth, prob);
            best = Some(best.map_or(value, |b: f64| b.max(value)));
        }
        match best {
            Some(value) => value,
            None => {
                let h = self.leaf(board);
                h - h / 16.0
            }
        }
    }

    fn evaluate_chance(&self, board: Board, depth: u32, prob: f64) -> f64 {
        if self.rule == ChanceRule::Expected && prob < self.cfg.prob_cutoff {
            return self.leaf(board);
        }
        if self.cfg.cache {
            if let Some(entry) = self.map.get(&board) {
                if entry.depth >= depth {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return entry.score;
                }
            }
        }
        let empties = board.count_empty();
        if empties == 0 {
            return self.leaf(board);
        }
        let slot_prob = prob / empties as f64;
        let score = match self.rule {
            ChanceRule::Expected => {
                let sum: f64 = board
                    .empty_cells()
                    .map(|(row, col)| {
                        let two = self.evaluate_max(board.set_cell(row, col, 1), depth - 1, slot_prob * TWO_PROB);
                        let four = self.evaluate_max(board.set_cell(row, col, 2), depth - 1, slot_prob * FOUR_PROB);
                        two * TWO_PROB + four * FOUR_PROB
                    })
                    .sum();
                sum / empties as f64
            }
            ChanceRule::WorstCase => board
                .empty_cells()
                .flat_map(|(row, col)| [board.set_cell(row, col, 1), board.set_cell(row, col, 2)])
                .map(|child| self.evaluate_max(child, depth - 1, slot_prob))
                .fold(f64::INFINITY, f64::min),
        };
        if self.cfg.cache {
            self.map.insert(board, TranspositionEntry { score, depth });
        }
        score
    }

    fn root(&self, board: Board, depth: u32) -> [BranchEval; 4] {
        let eval = |dir: Direction| {
            let out = board.apply_move(dir);
            if out.changed {
                BranchEval { dir, ev: self.evaluate_chance(out.board, depth, 1.0), legal: true }
            } else {
                BranchEval { dir, ev: 0.0, legal: false }
            }
        };
        if self.cfg.parallel_root {
            let evals: Vec<BranchEval> = Direction::ALL.par_iter().map(|&dir| eval(dir)).collect();
            let mut out = Direction::ALL.map(|dir| BranchEval { dir, ev: 0.0, legal: false });
            for be in evals {
                out[be.dir.index()] = be;
            }
            out
        } else {
            Direction::ALL.map(eval)
        }
    }
}

#[derive(Debug, Clone)]
struct TreeSearch {
    cfg: SearchConfig,
    rule: ChanceRule,
}

impl TreeSearch {
    fn branch_evals_with_stats(&self, board: Board) -> ([BranchEval; 4], SearchStats) {
        let depth = self.cfg.depth.for_board(board);
        let search = Search::new(&self.cfg, self.rule);
        let evals = search.root(board, depth);
        let stats = SearchStats {
            depth,
            nodes: search.nodes.load(Ordering::Relaxed),
            cache_hits: search.hits.load(Ordering::Relaxed),
        };
        (evals, stats)
    }

    fn choose_move(&self, board: Board) -> Option<Direction> {
        let (evals, stats) = self.branch_evals_with_stats(board);
        let best = best_branch(&evals);
        debug!(
            "{:?} search depth {} visited {} nodes ({} cache hits), chose {:?}",
            self.rule, stats.depth, stats.nodes, stats.cache_hits, best
        );
        best
    }
}

/// Highest-valued legal branch, first in [`Direction::ALL`] order on ties.
pub fn best_branch(evals: &[BranchEval; 4]) -> Option<Direction> {
    evals
        .iter()
        .filter(|b| b.legal)
        .fold(None, |best: Option<&BranchEval>, b| match best {
            Some(cur) if b.ev <= cur.ev => Some(cur),
            _ => Some(b),
        })
        .map(|b| b.dir)
}

macro_rules! search_strategy {
    ($(#[$doc:meta])* $name:ident, $rule:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(TreeSearch);

        impl $name {
            pub fn new(cfg: SearchConfig) -> Self {
                crate::init_game();
                Self(TreeSearch { cfg, rule: $rule })
            }

            pub fn config(&self) -> &SearchConfig { &self.0.cfg }

            /// Best move, or `None` if the game is over.
            pub fn choose_move(&self, board: Board) -> Option<Direction> { self.0.choose_move(board) }

            /// Searched value of every direction, in [`Direction::ALL`] order.
            pub fn branch_evals(&self, board: Board) -> [BranchEval; 4] { self.0.branch_evals_with_stats(board).0 }

            /// Like [`Self::branch_evals`], plus node counts for the decision.
            pub fn branch_evals_with_stats(&self, board: Board) -> ([BranchEval; 4], SearchStats) {
                self.0.branch_evals_with_stats(board)
            }
        }

        impl Default for $name {
            fn default() -> Self { Self::new(SearchConfig::default()) }
        }
    };
}

search_strategy!(
    /// Assumes the worst spawn after every move.
    Minimax,
    ChanceRule::WorstCase
);
search_strategy!(
    /// Averages over spawns weighted 0.9/0.1 for 2's and 4's.
    Expectimax,
    ChanceRule::Expected
);

/// Tuning knobs for [`RandomTrials`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomTrialsConfig {
    /// Plies to search.
    pub depth: u32,
    /// Spawns sampled after every candidate move.
    pub trials: u32,
    pub heuristic: Heuristic,
}

impl Default for RandomTrialsConfig {
    fn default() -> Self { Self { depth: 3, trials: 5, heuristic: Heuristic::default() } }
}

impl RandomTrialsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trials == 0 {
            return Err(ConfigError::ZeroTrials);
        }
        validate_depth(self.depth)
    }
}

/// Sampled search: each chance node averages `trials` random spawns instead
/// of enumerating every empty cell.
///
/// The spawns come from the rng passed to [`RandomTrials::choose_move`], so a
/// seeded rng replays the same decision.
#[derive(Debug, Clone)]
pub struct RandomTrials {
    cfg: RandomTrialsConfig,
}

impl RandomTrials {
    pub fn new(cfg: RandomTrialsConfig) -> Self {
        crate::init_game();
        Self { cfg }
    }

    pub fn config(&self) -> &RandomTrialsConfig { &self.cfg }

    /// Best move, or `None` if the game is over.
    pub fn choose_move<R: Rng + ?Sized>(&self, board: Board, rng: &mut R) -> Option<Direction> {
        best_branch(&self.branch_evals(board, rng))
    }

    /// Sampled value of every direction, in [`Direction::ALL`] order.
    pub fn branch_evals<R: Rng + ?Sized>(&self, board: Board, rng: &mut R) -> [BranchEval; 4] {
        Direction::ALL.map(|dir| {
            let out = board.apply_move(dir);
            if out.changed {
                BranchEval { dir, ev: self.sample(out.board, self.cfg.depth, rng), legal: true }
            } else {
                BranchEval { dir, ev: 0.0, legal: false }
            }
        })
    }

    fn sample<R: Rng + ?Sized>(&self, after_move: Board, depth: u32, rng: &mut R) -> f64 {
        let mut total = 0.0;
        for _ in 0..self.cfg.trials {
            total += match spawn_tile(after_move, rng) {
                Ok(child) => self.value(child, depth - 1, rng),
                Err(_) => self.cfg.heuristic.evaluate(after_move),
            };
        }
        total / self.cfg.trials as f64
    }

    fn value<R: Rng + ?Sized>(&self, board: Board, depth: u32, rng: &mut R) -> f64 {
        let h = self.cfg.heuristic.evaluate(board);
        if board.is_game_over() {
            return h - h / 16.0;
        }
        if depth == 0 {
            return h;
        }
        let mut best = f64::NEG_INFINITY;
        for dir in Direction::ALL {
            let out = board.apply_move(dir);
            if out.changed {
                best = best.max(self.sample(out.board, depth, rng));
            }
        }
        best
    }
}

impl Default for RandomTrials {
    fn default() -> Self { Self::new(RandomTrialsConfig::default()) }
}
