//! Static board evaluations used by the search and rollout strategies.
//!
//! Every evaluation is non-negative, so the dead-end penalty `h - h/16`
//! applied by the searches never raises a value.

use std::sync::OnceLock;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::engine::{self, Board};

/// Board evaluation function selectable per strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Heuristic {
    /// Empty cells, row/column monotonicity, merge potential and max tile.
    #[default]
    Composite,
    /// Weighted face values toward the best of the four corners.
    Corner,
    /// Approximate game score reconstructed from the tiles on the board.
    Score,
    /// Number of empty cells.
    Empty,
}

impl Heuristic {
    /// Evaluate `board`.
    #[inline]
    pub fn evaluate(self, board: Board) -> f64 {
        match self {
            Heuristic::Composite => composite(board),
            Heuristic::Corner => corner(board) as f64,
            Heuristic::Score => approximate_score(board) as f64,
            Heuristic::Empty => board.count_empty() as f64,
        }
    }
}

static LINE_SCORES: OnceLock<Box<[f64]>> = OnceLock::new();

/// Build the line table eagerly. Safe to call multiple times.
pub fn warm() {
    let _ = line_scores();
}

fn line_scores() -> &'static [f64] {
    LINE_SCORES
        .get_or_init(|| {
            let mut v = vec![0.0f64; 0x1_0000];
            for (i, slot) in v.iter_mut().enumerate() {
                *slot = calc_line_score(i as u16);
            }
            v.into_boxed_slice()
        })
        .as_ref()
}

const MAX_TILE_WEIGHT: f64 = 1_000.0;

/// Sum of the precomputed row and column scores plus a max-tile bonus.
pub fn composite(board: Board) -> f64 {
    let scores = line_scores();
    let transposed = engine::transpose(board.raw());
    let lines = (0..4).fold(0.0, |acc, idx| {
        let row = engine::extract_line(board.raw(), idx) as usize;
        let col = engine::extract_line(transposed, idx) as usize;
        acc + scores[row] + scores[col]
    });
    (lines + MAX_TILE_WEIGHT * board.max_log() as f64).max(0.0)
}

// Credit to Nneonneo for heuristic structure
fn calc_line_score(line: u16) -> f64 {
    const LOST_PENALTY: f64 = 200_000.0;
    let tiles = engine::line_to_tiles(line);
    LOST_PENALTY + calc_empty(&tiles) + calc_merges(&tiles) - calc_monotonicity(&tiles) - calc_sum(&tiles)
}

fn calc_sum(line: &[u8; 4]) -> f64 {
    const SUM_POWER: f64 = 3.5;
    const SUM_WEIGHT: f64 = 11.0;
    line.iter().map(|&t| (t as f64).powf(SUM_POWER)).sum::<f64>() * SUM_WEIGHT
}

fn calc_empty(line: &[u8; 4]) -> f64 {
    const EMPTY_WEIGHT: f64 = 270.0;
    line.iter().filter(|&&t| t == 0).count() as f64 * EMPTY_WEIGHT
}

fn calc_merges(line: &[u8; 4]) -> f64 {
    const MERGES_WEIGHT: f64 = 700.0;
    let mut prev = 0;
    let mut counter = 0.0;
    let mut merges = 0.0;
    for &tile in line {
        if tile == 0 {
            continue;
        }
        if prev == tile {
            counter += 1.0;
        } else if counter > 0.0 {
            merges += 1.0 + counter;
            counter = 0.0;
        }
        prev = tile;
    }
    if counter > 0.0 {
        merges += 1.0 + counter;
    }
    merges * MERGES_WEIGHT
}

fn calc_monotonicity(line: &[u8; 4]) -> f64 {
    const MONOTONICITY_POWER: f64 = 4.0;
    const MONOTONICITY_WEIGHT: f64 = 47.0;
    let mut toward_start = 0.0;
    let mut toward_end = 0.0;
    for pair in line.windows(2) {
        let a = (pair[0] as f64).powf(MONOTONICITY_POWER);
        let b = (pair[1] as f64).powf(MONOTONICITY_POWER);
        if a > b {
            toward_start += a - b;
        } else {
            toward_end += b - a;
        }
    }
    toward_start.min(toward_end) * MONOTONICITY_WEIGHT
}

/// Positional weights relative to a corner at `[0][0]`.
pub const CORNER_WEIGHTS: [[u64; 4]; 4] = [[10, 5, 2, 1], [5, 3, 1, 0], [2, 1, 0, 0], [1, 0, 0, 0]];

/// One of the four board corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [Corner::TopLeft, Corner::TopRight, Corner::BottomLeft, Corner::BottomRight];

    pub fn id(self) -> &'static str {
        match self {
            Corner::TopLeft => "top-left",
            Corner::TopRight => "top-right",
            Corner::BottomLeft => "bottom-left",
            Corner::BottomRight => "bottom-right",
        }
    }

    /// Map a corner-relative offset to absolute `(row, col)`.
    #[inline]
    fn cell(self, dr: usize, dc: usize) -> (usize, usize) {
        match self {
            Corner::TopLeft => (dr, dc),
            Corner::TopRight => (dr, 3 - dc),
            Corner::BottomLeft => (3 - dr, dc),
            Corner::BottomRight => (3 - dr, 3 - dc),
        }
    }
}

/// Weighted face-value sum with the heaviest weight at `corner`.
pub fn corner_weighted(board: Board, corner: Corner) -> u64 {
    let mut total = 0;
    for (dr, weights) in CORNER_WEIGHTS.iter().enumerate() {
        for (dc, &w) in weights.iter().enumerate() {
            if w == 0 {
                continue;
            }
            let (row, col) = corner.cell(dr, dc);
            let log = board.get_cell(row, col);
            if log != 0 {
                total += w << log;
            }
        }
    }
    total
}

/// Best corner-weighted sum over all four corners.
pub fn corner(board: Board) -> u64 {
    Corner::ALL.iter().map(|&c| corner_weighted(board, c)).max().unwrap_or(0)
}

/// Score implied by the tiles on the board, assuming every tile was built from 2's.
///
/// A tile of `2^k` took `k - 1` merges worth `2^k` in total to build.
pub fn approximate_score(board: Board) -> u64 {
    (0..16)
        .map(|idx| ((board.raw() >> (4 * idx)) & 0xf) as u32)
        .filter(|&k| k >= 2)
        .map(|k| (k as u64 - 1) << k)
        .sum()
}

// Credit to Nneonneo
/// Number of distinct non-empty tile values on the board.
pub(crate) fn count_distinct(board: Board) -> u32 {
    let mut bitset = 0u32;
    let mut board_copy = board.raw();
    while board_copy != 0 {
        bitset |= 1 << (board_copy & 0xf);
        board_copy >>= 4;
    }
    (bitset >> 1).count_ones() // don't count empty tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_heuristics_are_non_negative() {
        let boards = [
            Board::EMPTY,
            Board::from_grid([[15, 14, 13, 12], [8, 9, 10, 11], [7, 6, 5, 4], [1, 2, 3, 1]]),
            Board::from_grid([[1, 2, 1, 2], [2, 1, 2, 1], [1, 2, 1, 2], [2, 1, 2, 1]]),
        ];
        for b in boards {
            for h in [Heuristic::Composite, Heuristic::Corner, Heuristic::Score, Heuristic::Empty] {
                assert!(h.evaluate(b) >= 0.0, "{h:?} negative on {b:?}");
            }
        }
    }

    #[test]
    fn composite_prefers_more_empty_cells() {
        let crowded = Board::from_grid([[1, 2, 1, 2], [2, 1, 2, 1], [0; 4], [0; 4]]);
        let sparse = Board::from_grid([[2, 0, 0, 0], [0; 4], [0; 4], [0; 4]]);
        assert!(composite(sparse) > composite(crowded));
    }

    #[test]
    fn monotonic_row_beats_zigzag() {
        assert!(calc_monotonicity(&[4, 3, 2, 1]) < calc_monotonicity(&[4, 1, 3, 2]));
        assert_eq!(calc_monotonicity(&[1, 2, 3, 4]), 0.0);
    }

    #[test]
    fn merges_count_adjacent_equal_tiles() {
        assert_eq!(calc_merges(&[1, 1, 0, 0]), 2.0 * 700.0);
        assert_eq!(calc_merges(&[1, 2, 3, 4]), 0.0);
    }

    #[test]
    fn corner_weights_follow_the_corner() {
        let b = Board::EMPTY.set_cell(0, 0, 3);
        assert_eq!(corner_weighted(b, Corner::TopLeft), 80);
        assert_eq!(corner_weighted(b, Corner::BottomRight), 0);
        let b = Board::EMPTY.set_cell(3, 3, 3);
        assert_eq!(corner_weighted(b, Corner::BottomRight), 80);
        assert_eq!(corner(b), 80);
    }

    #[test]
    fn approximate_score_matches_merge_history() {
        // one 8: two merges of 2+2 (4 each) and one 4+4 (8)
        assert_eq!(approximate_score(Board::EMPTY.set_cell(0, 0, 3)), 16);
        assert_eq!(approximate_score(Board::EMPTY.set_cell(0, 0, 1)), 0);
    }

    #[test]
    fn it_count_distinct() {
        let b = Board::from_grid([[1, 1, 2, 0], [3, 0, 0, 0], [0; 4], [0, 0, 0, 3]]);
        assert_eq!(count_distinct(b), 3);
        assert_eq!(count_distinct(Board::EMPTY), 0);
    }
}
