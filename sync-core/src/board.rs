//! Board engine: move legality and win/draw detection.
//!
//! Pure functions over a flat `n * n` board. Lines that count for a win
//! are every row, every column, and the two full diagonals:
//! - diagonal 1: indices `i * (n + 1)` for `i` in `0..n`
//! - diagonal 2: indices `i * n + (n - 1 - i)` for `i` in `0..n`

use thiserror::Error;
use tictactoe_sync_types::{Board, Cell, Mark};

/// A move the board itself rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IllegalMove {
    /// Index past the end of the board.
    #[error("cell {index} is out of range (board has {cells} cells)")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Number of cells on the board.
        cells: usize,
    },
    /// Cell already holds a mark.
    #[error("cell {index} is already occupied")]
    CellOccupied {
        /// Requested index.
        index: usize,
    },
}

/// How a game ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `mark` completed the given line.
    Win {
        /// Winning mark.
        mark: Mark,
        /// Cell indices of the completed line.
        line: Vec<usize>,
    },
    /// Board full, nobody won.
    Draw,
}

/// Place `mark` at `index`, returning the new board.
///
/// The input board is not modified.
pub fn apply_move(board: &Board, index: usize, mark: Mark) -> Result<Board, IllegalMove> {
    match board.get(index) {
        None => Err(IllegalMove::OutOfRange {
            index,
            cells: board.cells().len(),
        }),
        Some(Cell::Marked(_)) => Err(IllegalMove::CellOccupied { index }),
        Some(Cell::Empty) => {
            let mut next = board.clone();
            next.set(index, Cell::Marked(mark));
            Ok(next)
        }
    }
}

/// Every line that can win on an `n * n` board, in a fixed order:
/// rows, columns, diagonal 1, diagonal 2.
pub fn lines(n: usize) -> Vec<Vec<usize>> {
    let mut all = Vec::with_capacity(2 * n + 2);
    for r in 0..n {
        all.push((0..n).map(|c| r * n + c).collect());
    }
    for c in 0..n {
        all.push((0..n).map(|r| r * n + c).collect());
    }
    all.push((0..n).map(|i| i * (n + 1)).collect());
    all.push((0..n).map(|i| i * n + (n - 1 - i)).collect());
    all
}

/// The first completed line for `mark`, if any.
pub fn winning_line(board: &Board, mark: Mark) -> Option<Vec<usize>> {
    let target = Cell::Marked(mark);
    lines(board.side())
        .into_iter()
        .find(|line| line.iter().all(|&i| board.get(i) == Some(target)))
}

/// True iff some row, column, or main diagonal is entirely `mark`.
pub fn check_win(board: &Board, mark: Mark) -> bool {
    winning_line(board, mark).is_some()
}

/// True iff no empty cell remains and neither mark has won.
pub fn is_draw(board: &Board) -> bool {
    board.is_full() && !check_win(board, Mark::X) && !check_win(board, Mark::O)
}

/// Evaluate the board after `mover` played.
///
/// Returns `None` while the game continues.
pub fn outcome(board: &Board, mover: Mark) -> Option<Outcome> {
    if let Some(line) = winning_line(board, mover) {
        return Some(Outcome::Win { mark: mover, line });
    }
    if is_draw(board) {
        return Some(Outcome::Draw);
    }
    None
}
