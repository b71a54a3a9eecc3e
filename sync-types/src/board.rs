//! Board representation for tictactoe-sync.
//!
//! A board is a flat sequence of `n * n` cells. Row `r`, column `c`
//! maps to index `r * n + c`. Legality rules live in `sync-core`;
//! this module only stores cells.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::WireError;

/// The symbol a participant places on the board.
///
/// The host always plays `X`, the guest plays `O`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    /// Host mark.
    X,
    /// Guest mark.
    O,
}

impl Mark {
    /// The opposing mark.
    pub fn other(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => write!(f, "X"),
            Mark::O => write!(f, "O"),
        }
    }
}

/// A single board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    /// Nobody has played here.
    #[default]
    Empty,
    /// Occupied by a mark.
    Marked(Mark),
}

impl Cell {
    /// Check if the cell is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// The mark in this cell, if any.
    pub fn mark(&self) -> Option<Mark> {
        match self {
            Cell::Empty => None,
            Cell::Marked(mark) => Some(*mark),
        }
    }
}

/// Board dimension. Only 3x3 and 5x5 are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BoardSize(u8);

impl BoardSize {
    /// Classic 3x3 board.
    pub const THREE: BoardSize = BoardSize(3);
    /// 5x5 board.
    pub const FIVE: BoardSize = BoardSize(5);

    /// Create a board size, rejecting unsupported dimensions.
    pub fn new(n: u8) -> Result<Self, WireError> {
        match n {
            3 | 5 => Ok(Self(n)),
            other => Err(WireError::UnsupportedBoardSize(other)),
        }
    }

    /// Side length `n`.
    pub fn side(&self) -> usize {
        self.0 as usize
    }

    /// Number of cells (`n * n`).
    pub fn cell_count(&self) -> usize {
        self.side() * self.side()
    }
}

impl Default for BoardSize {
    fn default() -> Self {
        Self::THREE
    }
}

impl TryFrom<u8> for BoardSize {
    type Error = WireError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<BoardSize> for u8 {
    fn from(size: BoardSize) -> Self {
        size.0
    }
}

impl fmt::Display for BoardSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.0, self.0)
    }
}

/// Serialized form of a board, validated on the way in.
#[derive(Deserialize)]
struct RawBoard {
    size: BoardSize,
    cells: Vec<Cell>,
}

/// A flat `n * n` board.
///
/// Invariant: `cells.len() == size.cell_count()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBoard")]
pub struct Board {
    size: BoardSize,
    cells: Vec<Cell>,
}

impl Board {
    /// Create an all-empty board.
    pub fn empty(size: BoardSize) -> Self {
        Self {
            size,
            cells: vec![Cell::Empty; size.cell_count()],
        }
    }

    /// Create a board from existing cells.
    pub fn from_cells(size: BoardSize, cells: Vec<Cell>) -> Result<Self, WireError> {
        if cells.len() != size.cell_count() {
            return Err(WireError::InvalidData(format!(
                "board {} needs {} cells, got {}",
                size,
                size.cell_count(),
                cells.len()
            )));
        }
        Ok(Self { size, cells })
    }

    /// Board dimension.
    pub fn size(&self) -> BoardSize {
        self.size
    }

    /// Side length `n`.
    pub fn side(&self) -> usize {
        self.size.side()
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Get a cell, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    /// Overwrite a cell without any legality check.
    ///
    /// Returns `false` if the index is out of range.
    pub fn set(&mut self, index: usize, cell: Cell) -> bool {
        match self.cells.get_mut(index) {
            Some(slot) => {
                *slot = cell;
                true
            }
            None => false,
        }
    }

    /// Number of occupied cells. Monotonic under legal play.
    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_empty()).count()
    }

    /// True if no empty cell remains.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| !c.is_empty())
    }
}

impl TryFrom<RawBoard> for Board {
    type Error = WireError;

    fn try_from(raw: RawBoard) -> Result<Self, Self::Error> {
        Board::from_cells(raw.size, raw.cells)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, cells) in self.cells.chunks(self.side()).enumerate() {
            if row > 0 {
                writeln!(f)?;
            }
            for (col, cell) in cells.iter().enumerate() {
                if col > 0 {
                    write!(f, " ")?;
                }
                match cell.mark() {
                    Some(mark) => write!(f, "{}", mark)?,
                    None => write!(f, ".")?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_board_has_n_squared_cells() {
        assert_eq!(Board::empty(BoardSize::THREE).cells().len(), 9);
        assert_eq!(Board::empty(BoardSize::FIVE).cells().len(), 25);
    }

    #[test]
    fn unsupported_sizes_rejected() {
        assert!(BoardSize::new(4).is_err());
        assert!(BoardSize::new(0).is_err());
        assert!(BoardSize::new(3).is_ok());
    }

    #[test]
    fn from_cells_checks_length() {
        let result = Board::from_cells(BoardSize::THREE, vec![Cell::Empty; 8]);
        assert!(matches!(result, Err(WireError::InvalidData(_))));
    }

    #[test]
    fn set_out_of_range_is_rejected() {
        let mut board = Board::empty(BoardSize::THREE);
        assert!(!board.set(9, Cell::Marked(Mark::X)));
        assert!(board.set(8, Cell::Marked(Mark::X)));
        assert_eq!(board.occupied_count(), 1);
    }

    #[test]
    fn deserialize_rejects_wrong_cell_count() {
        let json = r#"{"size":3,"cells":["empty","empty"]}"#;
        let result: Result<Board, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn deserialize_rejects_unsupported_size() {
        let json = r#"{"size":4,"cells":[]}"#;
        let result: Result<Board, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn display_renders_rows() {
        let mut board = Board::empty(BoardSize::THREE);
        board.set(0, Cell::Marked(Mark::X));
        board.set(4, Cell::Marked(Mark::O));
        assert_eq!(board.to_string(), "X . .\n. O .\n. . .");
    }
}
