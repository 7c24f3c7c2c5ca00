use serde::{Deserialize, Serialize};

pub mod agent;
pub mod config;
pub mod environment;
pub mod ghost;
pub mod map;
pub mod pathfinding;
pub mod persistence;
pub mod q_table;
pub mod state;

/// Represents a cell coordinate. Row 0 is the top of the maze.
///
/// Coordinates are signed so that positions just outside the grid can be
/// expressed and queried (they resolve to `Tile::OutOfBounds`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: isize,
    pub col: isize,
}

impl Position {
    pub const fn new(row: isize, col: isize) -> Self {
        Position { row, col }
    }

    /// Returns this position shifted by `(d_row, d_col)` scaled by `factor`.
    #[inline]
    pub fn offset(self, (d_row, d_col): (isize, isize), factor: isize) -> Self {
        Position {
            row: self.row + d_row * factor,
            col: self.col + d_col * factor,
        }
    }

    /// Returns manhattan distance between two positions
    #[inline]
    pub fn manhattan(self, other: Position) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }
}

/// The four moves available to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
}

impl Action {
    /// Every action, in the order used for Q-table rows and BFS expansion.
    pub const ALL: [Action; 4] = [Action::Up, Action::Down, Action::Left, Action::Right];

    /// Unit vector as `(d_row, d_col)`.
    #[inline]
    pub fn delta(self) -> (isize, isize) {
        match self {
            Action::Up => (-1, 0),
            Action::Down => (1, 0),
            Action::Left => (0, -1),
            Action::Right => (0, 1),
        }
    }

    /// Slot of this action inside a Q-table row.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Action::Up => 0,
            Action::Down => 1,
            Action::Left => 2,
            Action::Right => 3,
        }
    }
}
