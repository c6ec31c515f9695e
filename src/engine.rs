use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// A direction to slide/merge tiles.
///
/// The declaration order is the canonical tie-break order used by every
/// evaluating strategy: `Left > Up > Right > Down`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Up,
    Right,
    Down,
}

impl Direction {
    /// All four directions in tie-break order.
    pub const ALL: [Direction; 4] = [Direction::Left, Direction::Up, Direction::Right, Direction::Down];

    /// Position of this direction inside [`Direction::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Direction::Left => 0,
            Direction::Up => 1,
            Direction::Right => 2,
            Direction::Down => 3,
        }
    }

    /// Single upper-case letter, e.g. `L` for [`Direction::Left`].
    pub fn letter(self) -> char {
        match self {
            Direction::Left => 'L',
            Direction::Up => 'U',
            Direction::Right => 'R',
            Direction::Down => 'D',
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Left => "left",
            Direction::Up => "up",
            Direction::Right => "right",
            Direction::Down => "down",
        };
        f.write_str(s)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "left" => Ok(Direction::Left),
            "u" | "up" => Ok(Direction::Up),
            "r" | "right" => Ok(Direction::Right),
            "d" | "down" => Ok(Direction::Down),
            other => Err(format!("unknown direction '{other}' (expected left, up, right or down)")),
        }
    }
}

/// Largest log value a 4-bit cell can hold (face value 32768).
pub const MAX_LOG: u8 = 15;

const LINE_TABLE_SIZE: usize = 0x1_0000; // 65,536 possible 16-bit lines

type BoardRaw = u64;
type Line = u16;

/// Errors raised by the move engine and tile spawner.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("illegal move {direction} on {board:?}: no tile moved or merged")]
    IllegalMove { board: Board, direction: Direction },
    #[error("cannot spawn a tile on a full board {board:?}")]
    IllegalSpawn { board: Board },
}

/// Packed 4x4 2048 board as 16 4-bit nibbles in a `u64`.
///
/// The nibble for `(row, col)` lives at bit offset `(row * 4 + col) * 4` and
/// stores the base-2 log of the tile's face value (0 = empty). Boards are
/// values: every operation returns a new `Board`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board(BoardRaw);

/// Result of sliding a board in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub board: Board,
    pub score_gained: u64,
    /// False when nothing moved or merged; such a move must never be played.
    pub changed: bool,
}

/// Distribution of freshly spawned tiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnPolicy {
    /// Probability that a spawned tile is a 4 rather than a 2.
    pub four_probability: f64,
}

impl SpawnPolicy {
    /// Standard 2048 distribution: 90% twos, 10% fours.
    pub const STANDARD: SpawnPolicy = SpawnPolicy { four_probability: 0.1 };
    /// Only twos ever spawn.
    pub const TWOS_ONLY: SpawnPolicy = SpawnPolicy { four_probability: 0.0 };
}

impl Default for SpawnPolicy {
    fn default() -> Self { Self::STANDARD }
}

#[inline(always)]
fn cell_shift(row: usize, col: usize) -> u32 {
    debug_assert!(row < 4 && col < 4, "invariant violation: cell ({row}, {col}) is off the board");
    ((row * 4 + col) * 4) as u32
}

impl Board {
    /// A constant empty board (all zeros).
    pub const EMPTY: Board = Board(0);

    /// Construct a `Board` from its raw packed representation.
    #[inline]
    pub const fn from_raw(raw: BoardRaw) -> Self { Board(raw) }

    /// The raw packed `u64`.
    #[inline]
    pub const fn raw(self) -> BoardRaw { self.0 }

    /// Build a board from explicit log values, `grid[row][col]`.
    pub fn from_grid(grid: [[u8; 4]; 4]) -> Self {
        let mut board = Board::EMPTY;
        for (row, cells) in grid.iter().enumerate() {
            for (col, &log) in cells.iter().enumerate() {
                board = board.set_cell(row, col, log);
            }
        }
        board
    }

    /// Decode into explicit log values, `grid[row][col]`.
    pub fn to_grid(self) -> [[u8; 4]; 4] {
        let mut grid = [[0u8; 4]; 4];
        for (row, cells) in grid.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                *cell = self.get_cell(row, col);
            }
        }
        grid
    }

    /// Log value stored at `(row, col)`.
    #[inline]
    pub fn get_cell(self, row: usize, col: usize) -> u8 {
        ((self.0 >> cell_shift(row, col)) & 0xf) as u8
    }

    /// Return a copy with the cell at `(row, col)` replaced by `log`.
    ///
    /// ```
    /// use ai_2048_bench::engine::Board;
    /// let b = Board::EMPTY.set_cell(2, 1, 3);
    /// assert_eq!(b.get_cell(2, 1), 3);
    /// assert_eq!(b.count_empty(), 15);
    /// ```
    #[inline]
    pub fn set_cell(self, row: usize, col: usize, log: u8) -> Self {
        debug_assert!(log <= MAX_LOG, "invariant violation: log value {log} does not fit in a cell");
        let shift = cell_shift(row, col);
        Board((self.0 & !(0xf << shift)) | (((log & 0xf) as u64) << shift))
    }

    /// Iterate over the empty cells in row-major order.
    #[inline]
    pub fn empty_cells(self) -> EmptyCells { EmptyCells { board: self.0, idx: 0 } }

    /// Count the number of empty cells on the board.
    #[inline]
    pub fn count_empty(self) -> u32 { count_empty(self) }

    /// Largest log value present (0 on the empty board).
    #[inline]
    pub fn max_log(self) -> u8 {
        (0..16).map(|idx| ((self.0 >> (4 * idx)) & 0xf) as u8).max().unwrap_or(0)
    }

    /// Highest face value present (0 on the empty board).
    #[inline]
    pub fn highest_tile(self) -> u64 {
        match self.max_log() {
            0 => 0,
            log => 1 << log,
        }
    }

    /// Sum of all face values on the board. Moves never change it.
    pub fn tile_sum(self) -> u64 {
        (0..16)
            .map(|idx| (self.0 >> (4 * idx)) & 0xf)
            .filter(|&log| log != 0)
            .map(|log| 1u64 << log)
            .sum()
    }

    /// Board with rows and columns swapped.
    #[inline]
    pub fn transpose(self) -> Self { Board(transpose(self.0)) }

    /// Slide/merge in `dir`, returning the full outcome (no random insert).
    #[inline]
    pub fn apply_move(self, dir: Direction) -> MoveOutcome { apply_move(self, dir) }

    /// Board resulting from sliding/merging tiles in `dir`, score discarded.
    ///
    /// ```
    /// use ai_2048_bench::engine::{Board, Direction};
    /// let b = Board::from_grid([[1, 1, 1, 1], [0; 4], [0; 4], [0; 4]]);
    /// assert_eq!(b.shift(Direction::Left).to_grid()[0], [2, 2, 0, 0]);
    /// ```
    #[inline]
    pub fn shift(self, dir: Direction) -> Self { apply_move(self, dir).board }

    /// Iterate over directions that change the board, in tie-break order.
    #[inline]
    pub fn legal_moves(self) -> impl Iterator<Item = Direction> {
        Direction::ALL.into_iter().filter(move |&d| self.shift(d) != self)
    }

    /// Return true if no legal moves remain.
    ///
    /// ```
    /// use ai_2048_bench::engine::Board;
    /// // Nothing can move on an empty board.
    /// assert!(Board::EMPTY.is_game_over());
    /// ```
    #[inline]
    pub fn is_game_over(self) -> bool { is_game_over(self) }

    /// Insert a 2 (90%) or 4 (10%) into a uniformly chosen empty cell.
    ///
    /// ```
    /// use ai_2048_bench::engine::Board;
    /// use rand::{SeedableRng, rngs::StdRng};
    /// let mut rng = StdRng::seed_from_u64(123);
    /// let b = Board::EMPTY.spawn_tile(&mut rng).unwrap().spawn_tile(&mut rng).unwrap();
    /// assert_eq!(b.count_empty(), 14);
    /// ```
    #[inline]
    pub fn spawn_tile<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Self, EngineError> {
        spawn_tile_with(self, rng, SpawnPolicy::STANDARD)
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({:#018x})", self.0)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = "-------+-------+-------+-------";
        for row in 0..4 {
            if row > 0 {
                writeln!(f, "{sep}")?;
            }
            let cells: Vec<String> = (0..4).map(|col| format_val(self.get_cell(row, col))).collect();
            writeln!(f, "{}", cells.join("|"))?;
        }
        Ok(())
    }
}

impl From<BoardRaw> for Board { fn from(v: BoardRaw) -> Self { Board::from_raw(v) } }
impl From<Board> for BoardRaw { fn from(b: Board) -> Self { b.raw() } }

/// Lazy iterator over the empty `(row, col)` cells of a board.
#[derive(Debug, Clone)]
pub struct EmptyCells {
    board: BoardRaw,
    idx: u8,
}

impl Iterator for EmptyCells {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        while self.idx < 16 {
            let idx = self.idx as usize;
            self.idx += 1;
            if (self.board >> (4 * idx)) & 0xf == 0 {
                return Some((idx / 4, idx % 4));
            }
        }
        None
    }
}

struct Stores {
    shift_left: Box<[Line]>,
    shift_right: Box<[Line]>,
    score_left: Box<[u32]>,
    score_right: Box<[u32]>,
}

static STORES: OnceLock<Stores> = OnceLock::new();

/// Initialize the line tables. Safe to call multiple times.
pub fn new() {
    let _ = stores();
}

#[inline(always)]
fn stores() -> &'static Stores {
    STORES.get_or_init(create_stores)
}

fn create_stores() -> Stores {
    // Allocate on the heap to avoid large stack frames
    let mut shift_left = vec![0 as Line; LINE_TABLE_SIZE];
    let mut shift_right = vec![0 as Line; LINE_TABLE_SIZE];
    let mut score_left = vec![0u32; LINE_TABLE_SIZE];
    let mut score_right = vec![0u32; LINE_TABLE_SIZE];

    for val in 0..LINE_TABLE_SIZE {
        let line = val as Line;
        let (left, score) = compress_line(line);
        shift_left[val] = left;
        score_left[val] = score;
        let rev = reverse_line(line) as usize;
        shift_right[rev] = reverse_line(left);
        score_right[rev] = score;
    }

    Stores {
        shift_left: shift_left.into_boxed_slice(),
        shift_right: shift_right.into_boxed_slice(),
        score_left: score_left.into_boxed_slice(),
        score_right: score_right.into_boxed_slice(),
    }
}

/// Slide one row toward column 0 with standard 2048 merge rules.
///
/// Each tile merges at most once per move, so `[2,2,2,2]` becomes `[4,4,0,0]`.
/// Two `MAX_LOG` tiles never merge since the result would not fit in a cell.
pub(crate) fn compress_line(line: Line) -> (Line, u32) {
    let mut out = [0u8; 4];
    let mut len = 0;
    let mut last_merged = false;
    let mut score = 0u32;
    for tile in line_to_tiles(line) {
        if tile == 0 {
            continue;
        }
        if len > 0 && !last_merged && out[len - 1] == tile && tile < MAX_LOG {
            out[len - 1] += 1;
            score += 1 << out[len - 1];
            last_merged = true;
        } else {
            out[len] = tile;
            len += 1;
            last_merged = false;
        }
    }
    (tiles_to_line(out), score)
}

/// Cells of a line, index 0 = column 0 (low nibble).
#[inline]
pub(crate) fn line_to_tiles(line: Line) -> [u8; 4] {
    [
        (line & 0xf) as u8,
        ((line >> 4) & 0xf) as u8,
        ((line >> 8) & 0xf) as u8,
        ((line >> 12) & 0xf) as u8,
    ]
}

#[inline]
fn tiles_to_line(tiles: [u8; 4]) -> Line {
    (tiles[0] as Line) | (tiles[1] as Line) << 4 | (tiles[2] as Line) << 8 | (tiles[3] as Line) << 12
}

#[inline]
fn reverse_line(line: Line) -> Line {
    ((line & 0xf) << 12) | (((line >> 4) & 0xf) << 8) | (((line >> 8) & 0xf) << 4) | (line >> 12)
}

// Credit to Nneonneo
pub(crate) fn transpose(x: BoardRaw) -> BoardRaw {
    let a1 = x & 0xF0F00F0FF0F00F0F;
    let a2 = x & 0x0000F0F00000F0F0;
    let a3 = x & 0x0F0F00000F0F0000;
    let a = a1 | (a2 << 12) | (a3 >> 12);
    let b1 = a & 0xFF00FF0000FF00FF;
    let b2 = a & 0x00FF00FF00000000;
    let b3 = a & 0x00000000FF00FF00;
    b1 | (b2 >> 24) | (b3 << 24)
}

/// Row `idx` (0..4) of a packed board as a 16-bit line.
#[inline(always)]
pub(crate) fn extract_line(board: BoardRaw, idx: u32) -> Line {
    ((board >> (16 * idx)) & 0xffff) as Line
}

/// Slide/merge `board` in `dir`.
///
/// Left and Right use the row tables directly; Up and Down run the same
/// tables on the transposed board and transpose back.
pub fn apply_move(board: Board, dir: Direction) -> MoveOutcome {
    let s = stores();
    let transposed = matches!(dir, Direction::Up | Direction::Down);
    let rows = if transposed { transpose(board.0) } else { board.0 };
    let (shift_table, score_table) = match dir {
        Direction::Left | Direction::Up => (&s.shift_left, &s.score_left),
        Direction::Right | Direction::Down => (&s.shift_right, &s.score_right),
    };
    let mut moved: BoardRaw = 0;
    let mut score_gained = 0u64;
    for idx in 0..4 {
        let line = extract_line(rows, idx) as usize;
        moved |= (shift_table[line] as BoardRaw) << (16 * idx);
        score_gained += score_table[line] as u64;
    }
    let result = if transposed { transpose(moved) } else { moved };
    MoveOutcome { board: Board(result), score_gained, changed: result != board.0 }
}

/// Slide/merge tiles in the given direction, discarding the score.
#[inline]
pub fn shift(board: Board, dir: Direction) -> Board { apply_move(board, dir).board }

/// True if no move in any direction changes the board.
pub fn is_game_over(board: Board) -> bool {
    Direction::ALL.iter().all(|&dir| shift(board, dir) == board)
}

// https://stackoverflow.com/questions/38225571/count-number-of-zero-nibbles-in-an-unsigned-64-bit-integer
/// Count the number of zero cells.
pub fn count_empty(board: Board) -> u32 {
    16 - count_non_empty(board)
}

fn count_non_empty(board: Board) -> u32 {
    let mut board_copy = board.0;
    board_copy |= board_copy >> 1;
    board_copy |= board_copy >> 2;
    board_copy &= 0x1111111111111111;
    board_copy.count_ones()
}

/// Insert a tile drawn from `policy` into a uniformly chosen empty cell.
///
/// Fails with [`EngineError::IllegalSpawn`] on a full board; callers must
/// check for game over first since a full board may still have legal moves.
pub fn spawn_tile_with<R: Rng + ?Sized>(board: Board, rng: &mut R, policy: SpawnPolicy) -> Result<Board, EngineError> {
    let empty = count_empty(board);
    if empty == 0 {
        return Err(EngineError::IllegalSpawn { board });
    }
    let pick = rng.gen_range(0..empty) as usize;
    let log = if rng.gen::<f64>() < policy.four_probability { 2 } else { 1 };
    match board.empty_cells().nth(pick) {
        Some((row, col)) => Ok(board.set_cell(row, col, log)),
        None => Err(EngineError::IllegalSpawn { board }),
    }
}

/// Insert a standard 2/4 tile into a random empty cell.
#[inline]
pub fn spawn_tile<R: Rng + ?Sized>(board: Board, rng: &mut R) -> Result<Board, EngineError> {
    spawn_tile_with(board, rng, SpawnPolicy::STANDARD)
}

/// Fresh game: two tiles spawned into an otherwise empty board.
pub fn new_game<R: Rng + ?Sized>(rng: &mut R, policy: SpawnPolicy) -> Result<Board, EngineError> {
    let first = spawn_tile_with(Board::EMPTY, rng, policy)?;
    spawn_tile_with(first, rng, policy)
}

fn format_val(log: u8) -> String {
    match log {
        0 => " ".repeat(7),
        x => format!("{:^7}", 1u64 << x),
    }
}
