#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative placement grid for Bastion.
//!
//! [`Grid`] stores a dense category/owner pair per cell and exposes it through
//! the [`GridQuery`] and [`GridMutation`] capabilities. Cells live behind a
//! `RefCell` so that readers and the single writer can share one `Rc<Grid>`
//! on the simulation thread.

use std::cell::RefCell;

use bastion_core::{CellCategory, EntityId, GridMutation, GridPosition, GridQuery};
use glam::Vec3;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_COLUMNS: u32 = 16;
const DEFAULT_ROWS: u32 = 16;
const DEFAULT_CELL_SIZE: f32 = 1.0;

/// Dimensions and world placement of the grid.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Number of cell columns.
    pub columns: u32,
    /// Number of cell rows.
    pub rows: u32,
    /// Side length of a square cell in world units.
    pub cell_size: f32,
    /// World position of the outer corner of cell `(0, 0)`.
    pub origin: Vec3,
}

impl GridConfig {
    /// Creates a configuration anchored at the world origin.
    #[must_use]
    pub const fn new(columns: u32, rows: u32, cell_size: f32) -> Self {
        Self {
            columns,
            rows,
            cell_size,
            origin: Vec3::ZERO,
        }
    }

    /// Moves the corner of cell `(0, 0)` to `origin`.
    #[must_use]
    pub const fn with_origin(mut self, origin: Vec3) -> Self {
        self.origin = origin;
        self
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMNS, DEFAULT_ROWS, DEFAULT_CELL_SIZE)
    }
}

/// Errors raised while building a grid from configuration.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum GridError {
    /// The grid would contain no cells.
    #[error("grid must contain at least one cell (received {columns}x{rows})")]
    Empty {
        /// Requested column count.
        columns: u32,
        /// Requested row count.
        rows: u32,
    },
    /// The grid is too large to index.
    #[error("grid of {columns}x{rows} cells exceeds the addressable range")]
    TooLarge {
        /// Requested column count.
        columns: u32,
        /// Requested row count.
        rows: u32,
    },
    /// Cell size must be a positive finite length.
    #[error("cell size must be positive and finite (received {cell_size})")]
    InvalidCellSize {
        /// Requested cell size.
        cell_size: f32,
    },
    /// An obstacle seed lies outside the grid.
    #[error("obstacle at {position} lies outside the grid")]
    ObstacleOutOfBounds {
        /// Offending seed position.
        position: GridPosition,
    },
}

/// Category and owner stored for one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellState {
    /// Category assigned by the most recent mutation.
    pub category: CellCategory,
    /// Entity associated with the most recent mutation, if any.
    pub owner: Option<EntityId>,
}

impl CellState {
    const WALKABLE: Self = Self {
        category: CellCategory::Walkable,
        owner: None,
    };
}

/// Comparable copy of every cell, in row-major order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridSnapshot {
    columns: u32,
    rows: u32,
    cells: Vec<CellState>,
}

impl GridSnapshot {
    /// Dimensions of the captured grid as `(columns, rows)`.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    /// Captured cells in row-major order.
    #[must_use]
    pub fn cells(&self) -> &[CellState] {
        &self.cells
    }
}

/// Dense placement grid.
#[derive(Debug)]
pub struct Grid {
    columns: u32,
    rows: u32,
    cell_size: f32,
    origin: Vec3,
    cells: RefCell<Vec<CellState>>,
}

impl Grid {
    /// Creates a grid whose cells all start walkable.
    pub fn new(config: GridConfig) -> Result<Self, GridError> {
        let GridConfig {
            columns,
            rows,
            cell_size,
            origin,
        } = config;

        if columns == 0 || rows == 0 {
            return Err(GridError::Empty { columns, rows });
        }
        if !cell_size.is_finite() || cell_size <= f32::EPSILON {
            return Err(GridError::InvalidCellSize { cell_size });
        }
        if i32::try_from(columns).is_err() || i32::try_from(rows).is_err() {
            return Err(GridError::TooLarge { columns, rows });
        }
        let capacity = usize::try_from(u64::from(columns) * u64::from(rows))
            .map_err(|_| GridError::TooLarge { columns, rows })?;

        Ok(Self {
            columns,
            rows,
            cell_size,
            origin,
            cells: RefCell::new(vec![CellState::WALKABLE; capacity]),
        })
    }

    /// Creates a grid and marks the provided cells as obstacles.
    pub fn with_obstacles(
        config: GridConfig,
        obstacles: &[GridPosition],
    ) -> Result<Self, GridError> {
        let grid = Self::new(config)?;
        if let Some(position) = obstacles
            .iter()
            .copied()
            .find(|position| !grid.is_valid_position(*position))
        {
            return Err(GridError::ObstacleOutOfBounds { position });
        }
        grid.set_category(obstacles, CellCategory::Obstacle, None);
        Ok(grid)
    }

    /// Dimensions of the grid as `(columns, rows)`.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    /// Side length of a cell in world units.
    #[must_use]
    pub const fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Captures a comparable copy of the current cell state.
    #[must_use]
    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            columns: self.columns,
            rows: self.rows,
            cells: self.cells.borrow().clone(),
        }
    }

    /// Cell state at the provided position.
    #[must_use]
    pub fn cell(&self, position: GridPosition) -> Option<CellState> {
        let index = self.index(position)?;
        self.cells.borrow().get(index).copied()
    }

    /// Cells currently owned by `owner`, in row-major order.
    #[must_use]
    pub fn cells_owned_by(&self, owner: EntityId) -> Vec<GridPosition> {
        self.positions_where(|cell| cell.owner == Some(owner))
    }

    /// Cells currently carrying `category`, in row-major order.
    #[must_use]
    pub fn cells_with_category(&self, category: CellCategory) -> Vec<GridPosition> {
        self.positions_where(|cell| cell.category == category)
    }

    fn positions_where<F>(&self, mut predicate: F) -> Vec<GridPosition>
    where
        F: FnMut(&CellState) -> bool,
    {
        let cells = self.cells.borrow();
        let mut positions = Vec::new();
        for (index, cell) in cells.iter().enumerate() {
            if predicate(cell) {
                positions.push(self.position_of(index));
            }
        }
        positions
    }

    fn position_of(&self, index: usize) -> GridPosition {
        let width = self.columns as usize;
        GridPosition::new((index % width) as i32, (index / width) as i32)
    }

    fn index(&self, position: GridPosition) -> Option<usize> {
        let column = u32::try_from(position.x()).ok()?;
        let row = u32::try_from(position.y()).ok()?;
        if column >= self.columns || row >= self.rows {
            return None;
        }
        let width = usize::try_from(self.columns).ok()?;
        Some(row as usize * width + column as usize)
    }
}

impl GridQuery for Grid {
    fn is_valid_position(&self, position: GridPosition) -> bool {
        self.index(position).is_some()
    }

    fn category(&self, position: GridPosition) -> Option<CellCategory> {
        self.cell(position).map(|cell| cell.category)
    }

    fn owner(&self, position: GridPosition) -> Option<EntityId> {
        self.cell(position).and_then(|cell| cell.owner)
    }

    fn snap_world_to_grid(&self, world: Vec3) -> GridPosition {
        let local = (world - self.origin) / self.cell_size;
        GridPosition::new(local.x.floor() as i32, local.z.floor() as i32)
    }

    fn grid_to_world(&self, position: GridPosition) -> Vec3 {
        self.origin
            + Vec3::new(
                (position.x() as f32 + 0.5) * self.cell_size,
                0.0,
                (position.y() as f32 + 0.5) * self.cell_size,
            )
    }
}

impl GridMutation for Grid {
    fn set_category(
        &self,
        positions: &[GridPosition],
        category: CellCategory,
        owner: Option<EntityId>,
    ) {
        let mut cells = self.cells.borrow_mut();
        for position in positions {
            let Some(index) = self.index(*position) else {
                tracing::warn!(?position, ?category, "ignoring mutation outside the grid");
                continue;
            };
            cells[index] = CellState { category, owner };
        }
        tracing::trace!(count = positions.len(), ?category, ?owner, "cells updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_grid_is_fully_walkable() {
        let grid = Grid::new(GridConfig::new(4, 3, 1.0)).expect("valid grid");

        assert_eq!(grid.cells_with_category(CellCategory::Walkable).len(), 12);
        assert!(grid.cells_with_category(CellCategory::Reserved).is_empty());
    }

    #[test]
    fn rejects_empty_dimensions() {
        let error = Grid::new(GridConfig::new(0, 5, 1.0)).expect_err("empty grid");

        assert_eq!(error, GridError::Empty { columns: 0, rows: 5 });
    }

    #[test]
    fn rejects_non_positive_cell_size() {
        let error = Grid::new(GridConfig::new(3, 3, 0.0)).expect_err("zero cell size");

        assert!(matches!(error, GridError::InvalidCellSize { .. }));
    }

    #[test]
    fn rejects_obstacles_outside_the_grid() {
        let outside = GridPosition::new(3, 0);
        let error = Grid::with_obstacles(GridConfig::new(3, 3, 1.0), &[outside])
            .expect_err("seed outside grid");

        assert_eq!(error, GridError::ObstacleOutOfBounds { position: outside });
        assert_eq!(error.to_string(), "obstacle at (3, 0) lies outside the grid");
    }

    #[test]
    fn index_maps_row_major() {
        let grid = Grid::new(GridConfig::new(5, 4, 1.0)).expect("valid grid");

        assert_eq!(grid.index(GridPosition::new(0, 0)), Some(0));
        assert_eq!(grid.index(GridPosition::new(4, 0)), Some(4));
        assert_eq!(grid.index(GridPosition::new(0, 1)), Some(5));
        assert_eq!(grid.index(GridPosition::new(5, 0)), None);
        assert_eq!(grid.index(GridPosition::new(-1, 0)), None);
        assert_eq!(grid.position_of(13), GridPosition::new(3, 2));
    }
}
