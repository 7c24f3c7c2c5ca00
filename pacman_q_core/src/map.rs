use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Position;

/// Represents errors that can occur while building a maze from its literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MazeError {
    #[error("Maze literal is empty.")]
    Empty,
    #[error("Maze has zero width.")]
    ZeroWidth,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    InconsistentWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown maze glyph '{glyph}' at position ({row}, {col}).")]
    UnknownGlyph { glyph: char, row: usize, col: usize },
    #[error("Multiple start markers ('P') found.")]
    MultipleStarts,
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order and
/// resolves signed `Position`s, so callers never have to pre-check for
/// negative coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled by a generator function.
    ///
    /// The generator function `f` takes `(row, col)` coordinates and returns the value for that cell.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn from_generator<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        let mut cells = Vec::with_capacity(size);
        for row in 0..height {
            for col in 0..width {
                cells.push(f(row, col));
            }
        }
        Grid {
            width,
            height,
            cells,
        }
    }

    /// Returns the width of the grid.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the height of the grid.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Converts a position to a flat vector index.
    ///
    /// Returns `None` if the position is out of bounds.
    #[inline]
    pub fn position_to_index(&self, pos: Position) -> Option<usize> {
        if self.contains(pos) {
            Some(pos.row as usize * self.width + pos.col as usize)
        } else {
            None
        }
    }

    /// Converts a flat vector index back to a position.
    #[inline]
    fn index_to_position(width: usize, index: usize) -> Position {
        Position::new((index / width) as isize, (index % width) as isize)
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.row >= 0
            && pos.col >= 0
            && (pos.row as usize) < self.height
            && (pos.col as usize) < self.width
    }

    /// Gets an immutable reference to the cell at the given position.
    ///
    /// Returns `None` if the position is out of bounds.
    pub fn get(&self, pos: Position) -> Option<&T> {
        let index = self.position_to_index(pos)?;
        self.cells.get(index)
    }

    /// Gets a mutable reference to the cell at the given position.
    ///
    /// Returns `None` if the position is out of bounds.
    pub fn get_mut(&mut self, pos: Position) -> Option<&mut T> {
        let index = self.position_to_index(pos)?;
        self.cells.get_mut(index)
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (Self::index_to_position(width, index), cell))
    }
}

/// Represents the static kind of a maze cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tile {
    Wall,
    Empty,
    Pellet,
    PowerPellet,
    /// Sentinel for any position outside the grid.
    OutOfBounds,
}

impl Tile {
    #[inline]
    pub fn is_pellet(self) -> bool {
        matches!(self, Tile::Pellet | Tile::PowerPellet)
    }

    /// Whether ghosts and the agent may stand on this tile.
    #[inline]
    pub fn is_walkable(self) -> bool {
        !matches!(self, Tile::Wall | Tile::OutOfBounds)
    }
}

/// The playing field: a grid of tiles plus the set of remaining pellets.
///
/// The pristine layout parsed from the literal is kept alongside the live
/// one so that `reset` restores every cell verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Maze {
    pristine: Grid<Tile>,
    cells: Grid<Tile>,
    pellets: BTreeSet<Position>,
    start_marker: Option<Position>,
}

impl Maze {
    /// Parses a maze literal.
    ///
    /// Leading and trailing whitespace of the whole block is stripped; every
    /// remaining row must have the same length. Glyphs: `x` wall, `.` pellet,
    /// `o` power pellet, ` ` floor, `P` agent start (floor).
    pub fn parse(text: &str) -> Result<Self, MazeError> {
        let rows: Vec<Vec<char>> = text
            .trim()
            .lines()
            .map(|line| line.trim_end_matches('\r').chars().collect())
            .collect();
        if rows.is_empty() || rows.iter().all(Vec::is_empty) {
            return Err(MazeError::Empty);
        }

        let height = rows.len();
        let width = rows[0].len();
        if width == 0 {
            return Err(MazeError::ZeroWidth);
        }
        if let Some((row, found)) = rows
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|&(_, len)| len != width)
        {
            return Err(MazeError::InconsistentWidth {
                row,
                expected: width,
                found,
            });
        }

        let mut start_marker = None;
        let mut tiles = Vec::with_capacity(width * height);
        for (row, glyphs) in rows.iter().enumerate() {
            for (col, &glyph) in glyphs.iter().enumerate() {
                let tile = match glyph {
                    'x' => Tile::Wall,
                    '.' => Tile::Pellet,
                    'o' => Tile::PowerPellet,
                    ' ' => Tile::Empty,
                    'P' => {
                        if start_marker.is_some() {
                            return Err(MazeError::MultipleStarts);
                        }
                        start_marker = Some(Position::new(row as isize, col as isize));
                        Tile::Empty
                    }
                    unknown => {
                        return Err(MazeError::UnknownGlyph {
                            glyph: unknown,
                            row,
                            col,
                        });
                    }
                };
                tiles.push(tile);
            }
        }

        let mut tiles = tiles.into_iter();
        let pristine = Grid::from_generator(width, height, |_, _| {
            tiles.next().unwrap_or(Tile::Empty)
        });
        let pellets = Self::pellets_of(&pristine);
        Ok(Maze {
            cells: pristine.clone(),
            pristine,
            pellets,
            start_marker,
        })
    }

    fn pellets_of(grid: &Grid<Tile>) -> BTreeSet<Position> {
        grid.enumerate()
            .filter(|(_, tile)| tile.is_pellet())
            .map(|(pos, _)| pos)
            .collect()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.cells.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.cells.height()
    }

    /// Returns the tile at `pos`, or `Tile::OutOfBounds` outside the grid.
    #[inline]
    pub fn tile_at(&self, pos: Position) -> Tile {
        self.cells.get(pos).copied().unwrap_or(Tile::OutOfBounds)
    }

    #[inline]
    pub fn is_walkable(&self, pos: Position) -> bool {
        self.tile_at(pos).is_walkable()
    }

    /// Position of the `P` marker in the literal, if any.
    pub fn start_marker(&self) -> Option<Position> {
        self.start_marker
    }

    /// Positions still holding a pellet or power pellet.
    pub fn pellets(&self) -> &BTreeSet<Position> {
        &self.pellets
    }

    /// Removes the pellet at `pos`, clearing its tile.
    ///
    /// Returns the collected tile kind, or `None` when there was nothing to collect.
    pub fn collect(&mut self, pos: Position) -> Option<Tile> {
        if !self.pellets.remove(&pos) {
            return None;
        }
        let cell = self.cells.get_mut(pos)?;
        let collected = *cell;
        *cell = Tile::Empty;
        Some(collected)
    }

    pub fn all_collected(&self) -> bool {
        self.pellets.is_empty()
    }

    /// Restores every cell from the original literal and recomputes the pellet set.
    pub fn reset(&mut self) {
        self.cells = self.pristine.clone();
        self.pellets = Self::pellets_of(&self.cells);
    }

    /// Clamps a position onto the grid.
    pub fn clamp(&self, pos: Position) -> Position {
        Position::new(
            pos.row.clamp(0, self.height() as isize - 1),
            pos.col.clamp(0, self.width() as isize - 1),
        )
    }

    /// Iterates the live tiles in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = (Position, Tile)> + '_ {
        self.cells.enumerate().map(|(pos, tile)| (pos, *tile))
    }
}
