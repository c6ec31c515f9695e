//! Move-selection strategies ("players").
//!
//! Every strategy is a concrete struct with a `choose_move` method; [`Player`]
//! is the tagged union the harness and binaries drive. All strategies share
//! one contract: given a board with at least one legal move they return a
//! direction whose move changes the board, and `None` only once the game is
//! over. Ties between equally valued moves always resolve to the earliest
//! direction in [`Direction::ALL`] (`Left > Up > Right > Down`).
//!
//! ```
//! use ai_2048_bench::engine::{Board, Direction};
//! use ai_2048_bench::strategy::{Player, StrategyKind};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let board = Board::from_grid([[1, 1, 0, 0], [0; 4], [0; 4], [0; 4]]);
//! let merge = Player::from_kind(StrategyKind::Merge);
//! assert_eq!(merge.choose_move(board, &mut rng), Some(Direction::Left));
//! assert_eq!(merge.choose_move(Board::EMPTY, &mut rng), None);
//! ```

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::{Board, Direction, MoveOutcome};

pub mod greedy;
pub mod monte_carlo;
pub mod search;

pub use crate::heuristic::Corner;
pub use greedy::{CornerWeighted, MergeMax, Ordered, RandomPlayer, Rotating, ScoreMax, SpamCorner};
pub use monte_carlo::{MonteCarlo, MonteCarloConfig, RolloutScore};
pub use search::{
    BranchEval, Depth, Expectimax, Minimax, RandomTrials, RandomTrialsConfig, SearchConfig, SearchStats,
};

/// Identifier of a strategy variant, as used on the command line and in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    Random,
    SpamCorner,
    Rotating,
    Corner,
    Ordered,
    Merge,
    Score,
    RandomTrials,
    Minimax,
    Expectimax,
    MonteCarlo,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 11] = [
        StrategyKind::Random,
        StrategyKind::SpamCorner,
        StrategyKind::Rotating,
        StrategyKind::Corner,
        StrategyKind::Ordered,
        StrategyKind::Merge,
        StrategyKind::Score,
        StrategyKind::RandomTrials,
        StrategyKind::Minimax,
        StrategyKind::Expectimax,
        StrategyKind::MonteCarlo,
    ];

    /// Stable kebab-case identifier.
    pub fn id(self) -> &'static str {
        match self {
            StrategyKind::Random => "random",
            StrategyKind::SpamCorner => "spam-corner",
            StrategyKind::Rotating => "rotating",
            StrategyKind::Corner => "corner",
            StrategyKind::Ordered => "ordered",
            StrategyKind::Merge => "merge",
            StrategyKind::Score => "score",
            StrategyKind::RandomTrials => "random-trials",
            StrategyKind::Minimax => "minimax",
            StrategyKind::Expectimax => "expectimax",
            StrategyKind::MonteCarlo => "monte-carlo",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.id()) }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        StrategyKind::ALL
            .into_iter()
            .find(|k| k.id() == wanted)
            .ok_or_else(|| ConfigError::UnknownStrategy(s.to_string()))
    }
}

/// Invalid strategy parameters, rejected before any game is played.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("rollout count must be at least 1")]
    ZeroRollouts,
    #[error("rollout move cap must be at least 1 when set")]
    ZeroMoveCap,
    #[error("random-trials needs at least 1 trial per move")]
    ZeroTrials,
    #[error("search depth must be at least 1")]
    ZeroDepth,
    #[error("search depth {depth} exceeds the maximum of {max}")]
    DepthTooLarge { depth: u32, max: u32 },
    #[error("move priority {0:?} is not a permutation of the four directions")]
    InvalidPriority([Direction; 4]),
    #[error("{name} must be a non-negative number, got {value}")]
    NegativeWeight { name: &'static str, value: f64 },
    #[error("{name} must be a probability in [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),
}

/// Full description of one strategy: which variant plus every tunable.
///
/// Only the fields relevant to `kind` are read; the rest keep their defaults
/// so a JSON plan can name just what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    /// Priority order for [`StrategyKind::Ordered`].
    pub priority: [Direction; 4],
    /// Target corner for [`StrategyKind::Corner`].
    pub corner: Corner,
    /// Weight of each empty cell for [`StrategyKind::Score`].
    pub empty_weight: f64,
    pub search: SearchConfig,
    pub random_trials: RandomTrialsConfig,
    pub monte_carlo: MonteCarloConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::default(),
            priority: Direction::ALL,
            corner: Corner::default(),
            empty_weight: greedy::DEFAULT_EMPTY_WEIGHT,
            search: SearchConfig::default(),
            random_trials: RandomTrialsConfig::default(),
            monte_carlo: MonteCarloConfig::default(),
        }
    }
}

impl StrategyConfig {
    /// Defaults for `kind`.
    pub fn new(kind: StrategyKind) -> Self { Self { kind, ..Self::default() } }

    /// Check the parameters `kind` actually uses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.kind {
            StrategyKind::Ordered => validate_priority(self.priority),
            StrategyKind::Score => validate_weight("empty_weight", self.empty_weight),
            StrategyKind::Minimax | StrategyKind::Expectimax => self.search.validate(),
            StrategyKind::RandomTrials => self.random_trials.validate(),
            StrategyKind::MonteCarlo => self.monte_carlo.validate(),
            StrategyKind::Random
            | StrategyKind::SpamCorner
            | StrategyKind::Rotating
            | StrategyKind::Corner
            | StrategyKind::Merge => Ok(()),
        }
    }
}

fn validate_priority(priority: [Direction; 4]) -> Result<(), ConfigError> {
    let mut seen = [false; 4];
    for dir in priority {
        if std::mem::replace(&mut seen[dir.index()], true) {
            return Err(ConfigError::InvalidPriority(priority));
        }
    }
    Ok(())
}

pub(crate) fn validate_weight(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NegativeWeight { name, value })
    }
}

/// A ready-to-play strategy.
#[derive(Debug, Clone)]
pub enum Player {
    Random(RandomPlayer),
    SpamCorner(SpamCorner),
    Rotating(Rotating),
    Corner(CornerWeighted),
    Ordered(Ordered),
    Merge(MergeMax),
    Score(ScoreMax),
    RandomTrials(RandomTrials),
    Minimax(Minimax),
    Expectimax(Expectimax),
    MonteCarlo(MonteCarlo),
}

impl Player {
    /// Validate `cfg` and build the matching player.
    pub fn new(cfg: &StrategyConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self::build(cfg))
    }

    /// Player with the default parameters for `kind`.
    pub fn from_kind(kind: StrategyKind) -> Self { Self::build(&StrategyConfig::new(kind)) }

    fn build(cfg: &StrategyConfig) -> Self {
        crate::init_game();
        match cfg.kind {
            StrategyKind::Random => Player::Random(RandomPlayer),
            StrategyKind::SpamCorner => Player::SpamCorner(SpamCorner),
            StrategyKind::Rotating => Player::Rotating(Rotating::default()),
            StrategyKind::Corner => Player::Corner(CornerWeighted::new(cfg.corner)),
            StrategyKind::Ordered => Player::Ordered(Ordered::new(cfg.priority)),
            StrategyKind::Merge => Player::Merge(MergeMax),
            StrategyKind::Score => Player::Score(ScoreMax::new(cfg.empty_weight)),
            StrategyKind::RandomTrials => Player::RandomTrials(RandomTrials::new(cfg.random_trials.clone())),
            StrategyKind::Minimax => Player::Minimax(Minimax::new(cfg.search.clone())),
            StrategyKind::Expectimax => Player::Expectimax(Expectimax::new(cfg.search.clone())),
            StrategyKind::MonteCarlo => Player::MonteCarlo(MonteCarlo::new(cfg.monte_carlo.clone())),
        }
    }

    /// Copy of this player ready for a new game. Only [`Rotating`] carries
    /// anything from one move to the next; its cursor starts over.
    pub fn for_game(&self) -> Self {
        match self {
            Player::Rotating(_) => Player::Rotating(Rotating::default()),
            other => other.clone(),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Player::Random(_) => StrategyKind::Random,
            Player::SpamCorner(_) => StrategyKind::SpamCorner,
            Player::Rotating(_) => StrategyKind::Rotating,
            Player::Corner(_) => StrategyKind::Corner,
            Player::Ordered(_) => StrategyKind::Ordered,
            Player::Merge(_) => StrategyKind::Merge,
            Player::Score(_) => StrategyKind::Score,
            Player::RandomTrials(_) => StrategyKind::RandomTrials,
            Player::Minimax(_) => StrategyKind::Minimax,
            Player::Expectimax(_) => StrategyKind::Expectimax,
            Player::MonteCarlo(_) => StrategyKind::MonteCarlo,
        }
    }

    /// Report name, including the parameters that distinguish runs.
    pub fn name(&self) -> String {
        match self {
            Player::Random(_) | Player::SpamCorner(_) | Player::Rotating(_) | Player::Merge(_) => {
                self.kind().id().to_string()
            }
            Player::Corner(p) => format!("corner({})", p.corner().id()),
            Player::Ordered(p) => {
                let order: String = p.priority().iter().map(|d| d.letter()).collect();
                format!("ordered({order})")
            }
            Player::Score(p) => format!("score(w={})", p.empty_weight()),
            Player::RandomTrials(p) => format!("random-trials(d={},t={})", p.config().depth, p.config().trials),
            Player::Minimax(p) => format!("minimax({})", p.config().depth),
            Player::Expectimax(p) => format!("expectimax({})", p.config().depth),
            Player::MonteCarlo(p) => {
                let cfg = p.config();
                let cap = cfg.move_cap.map_or_else(|| "none".to_string(), |c| c.to_string());
                format!("monte-carlo(n={},cap={})", cfg.rollouts, cap)
            }
        }
    }

    /// Pick a legal move for `board`, or `None` if the game is over.
    pub fn choose_move<R: Rng + ?Sized>(&self, board: Board, rng: &mut R) -> Option<Direction> {
        match self {
            Player::Random(p) => p.choose_move(board, rng),
            Player::SpamCorner(p) => p.choose_move(board, rng),
            Player::Rotating(p) => p.choose_move(board),
            Player::Corner(p) => p.choose_move(board),
            Player::Ordered(p) => p.choose_move(board),
            Player::Merge(p) => p.choose_move(board),
            Player::Score(p) => p.choose_move(board),
            Player::RandomTrials(p) => p.choose_move(board, rng),
            Player::Minimax(p) => p.choose_move(board),
            Player::Expectimax(p) => p.choose_move(board),
            Player::MonteCarlo(p) => p.choose_move(board, rng),
        }
    }
}

/// One-shot move decision with default parameters for `kind`.
///
/// Intended for external drivers that only need an occasional decision;
/// anything in a loop should build a [`Player`] once instead.
pub fn choose_move<R: Rng + ?Sized>(board: Board, kind: StrategyKind, rng: &mut R) -> Option<Direction> {
    Player::from_kind(kind).choose_move(board, rng)
}

/// Legal direction with the highest `eval`, first in [`Direction::ALL`] on ties.
pub(crate) fn best_legal<F>(board: Board, mut eval: F) -> Option<Direction>
where
    F: FnMut(Direction, MoveOutcome) -> f64,
{
    let mut best: Option<(Direction, f64)> = None;
    for dir in Direction::ALL {
        let outcome = board.apply_move(dir);
        if !outcome.changed {
            continue;
        }
        let value = eval(dir, outcome);
        match best {
            Some((_, v)) if value <= v => {}
            _ => best = Some((dir, value)),
        }
    }
    best.map(|(dir, _)| dir)
}
