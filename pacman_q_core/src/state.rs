//! The RL state key and the feature extractors that build it.

use serde::{Deserialize, Serialize};

use crate::{
    Position,
    map::{Maze, Tile},
};

/// Per-direction distances in fixed order: up, right, down, left.
pub type Directional = [u32; 4];

/// Lossy abstraction of the world used as the Q-table key.
///
/// Two configurations producing the same window and distance tuples are the
/// same state for learning purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    /// Row-major tile window centred on the agent.
    pub vision: Vec<Tile>,
    pub pellet_distances: Option<Directional>,
    pub ghost_distances: Option<Directional>,
}

/// Square window of `size`×`size` tiles centred on `center`, in row-major order.
///
/// Cells outside the grid show up as `Tile::OutOfBounds`.
pub fn vision_window(maze: &Maze, center: Position, size: usize) -> Vec<Tile> {
    let radius = (size / 2) as isize;
    let mut window = Vec::with_capacity(size * size);
    for d_row in -radius..=radius {
        for d_col in -radius..=radius {
            window.push(maze.tile_at(center.offset((d_row, d_col), 1)));
        }
    }
    window
}

/// Smallest axis offset to any target, per direction.
///
/// A target above the origin counts toward "up" by its row difference, one to
/// the right toward "right" by its column difference, and so on; a diagonal
/// target contributes to both of its directions. Directions without any
/// target report 0.
pub fn directional_distances(
    origin: Position,
    targets: impl IntoIterator<Item = Position>,
) -> Directional {
    let mut nearest = [u32::MAX; 4];
    for target in targets {
        let d_row = target.row - origin.row;
        let d_col = target.col - origin.col;
        let vertical = d_row.unsigned_abs() as u32;
        let horizontal = d_col.unsigned_abs() as u32;
        if d_row < 0 {
            nearest[0] = nearest[0].min(vertical);
        } else if d_row > 0 {
            nearest[2] = nearest[2].min(vertical);
        }
        if d_col > 0 {
            nearest[1] = nearest[1].min(horizontal);
        } else if d_col < 0 {
            nearest[3] = nearest[3].min(horizontal);
        }
    }
    nearest.map(|d| if d == u32::MAX { 0 } else { d })
}
