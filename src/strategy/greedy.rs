//! One-ply strategies: each looks only at the boards reachable by a single move.

use std::sync::atomic::{AtomicU8, Ordering};

use rand::Rng;

use super::best_legal;
use crate::engine::{Board, Direction};
use crate::heuristic::{corner_weighted, Corner};

pub(crate) const DEFAULT_EMPTY_WEIGHT: f64 = 16.0;

/// Uniformly random legal move.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPlayer;

impl RandomPlayer {
    #[inline]
    pub fn choose_move<R: Rng + ?Sized>(&self, board: Board, rng: &mut R) -> Option<Direction> {
        random_legal_move(board, rng)
    }
}

/// Uniform draw among the directions that change `board`. Also drives rollouts.
#[inline]
pub fn random_legal_move<R: Rng + ?Sized>(board: Board, rng: &mut R) -> Option<Direction> {
    let mut legal = [Direction::Left; 4];
    let mut n = 0;
    for dir in board.legal_moves() {
        legal[n] = dir;
        n += 1;
    }
    match n {
        0 => None,
        1 => Some(legal[0]),
        _ => Some(legal[rng.gen_range(0..n)]),
    }
}

/// First legal move in a fixed priority order.
#[derive(Debug, Clone, Copy)]
pub struct Ordered {
    priority: [Direction; 4],
}

impl Ordered {
    /// `priority` must be a permutation of the four directions; see
    /// [`StrategyConfig::validate`](super::StrategyConfig::validate).
    pub fn new(priority: [Direction; 4]) -> Self { Self { priority } }

    pub fn priority(&self) -> [Direction; 4] { self.priority }

    pub fn choose_move(&self, board: Board) -> Option<Direction> {
        self.priority.into_iter().find(|&dir| board.apply_move(dir).changed)
    }
}

impl Default for Ordered {
    fn default() -> Self { Self::new(Direction::ALL) }
}

/// Keeps tiles in the top-left corner: Left or Up at random, then the other
/// of the two, then the opposite of the first pick, then the last direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpamCorner;

impl SpamCorner {
    pub fn choose_move<R: Rng + ?Sized>(&self, board: Board, rng: &mut R) -> Option<Direction> {
        let first = rng.gen_range(0..2usize);
        [first, first ^ 1, first + 2, (first ^ 1) + 2]
            .into_iter()
            .map(|i| Direction::ALL[i])
            .find(|&dir| board.apply_move(dir).changed)
    }
}

/// Cycles through [`Direction::ALL`], skipping directions that do nothing.
///
/// The only player with memory: `next` is where the next call starts looking.
/// It is atomic so a `Player` can still be shared across the harness's
/// worker threads, and the harness gives every game a fresh cursor through
/// [`Player::for_game`](super::Player::for_game).
#[derive(Debug, Default)]
pub struct Rotating {
    next: AtomicU8,
}

impl Rotating {
    pub fn choose_move(&self, board: Board) -> Option<Direction> {
        let start = self.next.load(Ordering::Relaxed) as usize;
        let found = (start..start + 4).map(|i| i % 4).find(|&i| board.apply_move(Direction::ALL[i]).changed)?;
        self.next.store(((found + 1) % 4) as u8, Ordering::Relaxed);
        Some(Direction::ALL[found])
    }
}

impl Clone for Rotating {
    fn clone(&self) -> Self { Self { next: AtomicU8::new(self.next.load(Ordering::Relaxed)) } }
}

/// Maximizes the positional weight of the resulting board toward one corner.
#[derive(Debug, Clone, Copy, Default)]
pub struct CornerWeighted {
    corner: Corner,
}

impl CornerWeighted {
    pub fn new(corner: Corner) -> Self { Self { corner } }

    pub fn corner(&self) -> Corner { self.corner }

    pub fn choose_move(&self, board: Board) -> Option<Direction> {
        best_legal(board, |_, out| corner_weighted(out.board, self.corner) as f64)
    }
}

/// Greedy merge score of the single move.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeMax;

impl MergeMax {
    pub fn choose_move(&self, board: Board) -> Option<Direction> {
        best_legal(board, |_, out| out.score_gained as f64)
    }
}

/// Merge score plus a bonus per empty cell left behind.
#[derive(Debug, Clone, Copy)]
pub struct ScoreMax {
    empty_weight: f64,
}

impl ScoreMax {
    pub fn new(empty_weight: f64) -> Self { Self { empty_weight } }

    pub fn empty_weight(&self) -> f64 { self.empty_weight }

    pub fn choose_move(&self, board: Board) -> Option<Direction> {
        best_legal(board, |_, out| out.score_gained as f64 + self.empty_weight * out.board.count_empty() as f64)
    }
}

impl Default for ScoreMax {
    fn default() -> Self { Self::new(DEFAULT_EMPTY_WEIGHT) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn random_covers_every_legal_move() {
        let mut rng = StdRng::seed_from_u64(9);
        let board = Board::from_grid([[0; 4], [0, 1, 0, 0], [0; 4], [0; 4]]);
        let mut seen = [false; 4];
        for _ in 0..200 {
            let dir = RandomPlayer.choose_move(board, &mut rng).unwrap();
            seen[dir.index()] = true;
        }
        assert_eq!(seen, [true; 4]);
    }

    #[test]
    fn ordered_skips_illegal_directions() {
        // Left and Up are blocked; Right is next in line.
        let board = Board::from_grid([[1, 2, 0, 0], [0; 4], [0; 4], [0; 4]]);
        assert_eq!(Ordered::default().choose_move(board), Some(Direction::Right));
        let down_first = Ordered::new([Direction::Down, Direction::Right, Direction::Up, Direction::Left]);
        assert_eq!(down_first.choose_move(board), Some(Direction::Down));
    }

    #[test]
    fn corner_pulls_toward_its_corner() {
        let board = Board::from_grid([[0; 4], [0, 3, 0, 0], [0; 4], [0; 4]]);
        assert_eq!(CornerWeighted::new(Corner::TopLeft).choose_move(board), Some(Direction::Left));
        assert_eq!(CornerWeighted::new(Corner::BottomRight).choose_move(board), Some(Direction::Right));
    }

    #[test]
    fn merge_takes_the_bigger_merge() {
        // Horizontal merge of two 2's (4) vs vertical merge of two 8's (16).
        let board = Board::from_grid([[1, 1, 0, 3], [0, 0, 0, 3], [0; 4], [0; 4]]);
        assert_eq!(MergeMax.choose_move(board), Some(Direction::Up));
    }

    #[test]
    fn score_counts_empty_cells() {
        let board = Board::from_grid([[1, 1, 0, 3], [0, 0, 0, 3], [0; 4], [0; 4]]);
        // Either merge leaves 12 empty cells, so the bigger merge wins.
        assert_eq!(ScoreMax::default().choose_move(board), Some(Direction::Up));
        assert_eq!(ScoreMax::new(0.0).choose_move(Board::EMPTY), None);
    }

    #[test]
    fn spam_corner_prefers_left_and_up() {
        let mut rng = StdRng::seed_from_u64(4);
        let open = Board::from_grid([[0; 4], [0, 1, 0, 0], [0; 4], [0; 4]]);
        let mut seen = [0u32; 4];
        for _ in 0..200 {
            seen[SpamCorner.choose_move(open, &mut rng).unwrap().index()] += 1;
        }
        assert!(seen[0] > 0 && seen[1] > 0);
        assert_eq!(seen[2] + seen[3], 0);

        // Left is blocked, so Up wins whichever of the two was drawn.
        let flush_left = Board::from_grid([[0; 4], [1, 0, 0, 0], [0; 4], [0; 4]]);
        for _ in 0..20 {
            assert_eq!(SpamCorner.choose_move(flush_left, &mut rng), Some(Direction::Up));
        }
        assert_eq!(SpamCorner.choose_move(Board::EMPTY, &mut rng), None);
    }

    #[test]
    fn spam_corner_falls_back_to_the_opposite_of_its_pick() {
        // Tucked into the top-left corner: only Right and Down move.
        let corner = Board::from_grid([[1, 0, 0, 0], [0; 4], [0; 4], [0; 4]]);
        let mut rng = StdRng::seed_from_u64(8);
        let mut seen = [false; 4];
        for _ in 0..100 {
            let dir = SpamCorner.choose_move(corner, &mut rng).unwrap();
            assert!(corner.apply_move(dir).changed);
            seen[dir.index()] = true;
        }
        assert_eq!(seen, [false, false, true, true]);
    }

    #[test]
    fn rotating_cycles_and_skips_blocked_directions() {
        let open = Board::from_grid([[0; 4], [0, 1, 0, 0], [0; 4], [0; 4]]);
        let player = Rotating::default();
        let turns: Vec<Direction> = (0..5).filter_map(|_| player.choose_move(open)).collect();
        assert_eq!(turns, [Direction::Left, Direction::Up, Direction::Right, Direction::Down, Direction::Left]);

        // Left and Up are blocked; the cursor sits on Up after the Left above.
        let blocked = Board::from_grid([[1, 2, 0, 0], [0; 4], [0; 4], [0; 4]]);
        assert_eq!(player.choose_move(blocked), Some(Direction::Right));
        assert_eq!(player.choose_move(blocked), Some(Direction::Down));
        assert_eq!(player.choose_move(blocked), Some(Direction::Right));
        assert_eq!(player.choose_move(Board::EMPTY), None);
    }

    #[test]
    fn rotating_clone_keeps_its_own_cursor() {
        let open = Board::from_grid([[0; 4], [0, 1, 0, 0], [0; 4], [0; 4]]);
        let player = Rotating::default();
        player.choose_move(open);
        let copy = player.clone();
        assert_eq!(copy.choose_move(open), Some(Direction::Up));
        assert_eq!(player.choose_move(open), Some(Direction::Up));
        assert_eq!(Rotating::default().choose_move(open), Some(Direction::Left));
    }
}
