/*
 * Copyright (C) 2023 Asim Ihsan
 * SPDX-License-Identifier: AGPL-3.0-only
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU Affero General Public License as published by the Free
 * Software Foundation, version 3.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A
 * PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License along
 * with this program. If not, see <https://www.gnu.org/licenses/>
 */

//! Occupancy grid.

use serde::{Deserialize, Serialize};

use crate::{Position, Rng};

/// Maze cell. Part of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    /// The agent may stand here.
    Free,

    /// Wall.
    Blocked,
}

impl Cell {
    /// The other state of the cell.
    pub fn flipped(self) -> Cell {
        match self {
            Cell::Free => Cell::Blocked,
            Cell::Blocked => Cell::Free,
        }
    }
}

/// Square occupancy grid. This only contains the cells, and not the agent or the goal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grid {
    cells: Vec<Cell>,
    size: usize,
}

// print out cells, and row and column numbers which start at 0.
impl std::fmt::Display for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::with_capacity((self.size * 2 + 4) * (self.size + 1));
        s.push_str("   ");
        for col in 0..self.size {
            s.push_str(&format!("{}", col % 10));
            if col < self.size - 1 {
                s.push(' ');
            }
        }
        s.push('\n');
        for row in 0..self.size {
            s.push_str(&format!("{:>2} ", row));
            for col in 0..self.size {
                s.push(match self.cells[row * self.size + col] {
                    Cell::Free => '.',
                    Cell::Blocked => '#',
                });
                if col < self.size - 1 {
                    s.push(' ');
                }
            }
            if row < self.size - 1 {
                s.push('\n');
            }
        }
        write!(f, "{}", s)
    }
}

impl Grid {
    /// Create a new grid where every cell is free.
    pub fn new(size: usize) -> Self {
        Self {
            cells: vec![Cell::Free; size * size],
            size,
        }
    }

    /// Create a grid with `floor(size * size * obstacle_ratio)` blocked cells placed uniformly at
    /// random without replacement.
    pub fn with_random_obstacles(size: usize, obstacle_ratio: f64, rng: &mut Rng) -> Self {
        let mut grid = Grid::new(size);
        let total = size * size;
        let obstacles = ((total as f64) * obstacle_ratio).floor() as usize;
        for index in rand::seq::index::sample(rng, total, obstacles.min(total)) {
            grid.cells[index] = Cell::Blocked;
        }
        grid
    }

    /// Side length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the position lies inside the grid.
    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.row >= 0
            && pos.col >= 0
            && (pos.row as usize) < self.size
            && (pos.col as usize) < self.size
    }

    fn index(&self, pos: Position) -> Option<usize> {
        if self.in_bounds(pos) {
            Some(pos.row as usize * self.size + pos.col as usize)
        } else {
            None
        }
    }

    /// Get a cell, or None if the position is out of bounds.
    pub fn get(&self, pos: Position) -> Option<Cell> {
        self.index(pos).map(|i| self.cells[i])
    }

    /// Set a cell. Out of bounds positions are ignored and return false.
    pub fn set(&mut self, pos: Position, cell: Cell) -> bool {
        match self.index(pos) {
            Some(i) => {
                self.cells[i] = cell;
                true
            }
            None => false,
        }
    }

    /// Flip a cell between free and blocked, returning the new state.
    pub fn toggle(&mut self, pos: Position) -> Option<Cell> {
        let i = self.index(pos)?;
        self.cells[i] = self.cells[i].flipped();
        Some(self.cells[i])
    }

    /// In bounds and free.
    pub fn is_free(&self, pos: Position) -> bool {
        self.get(pos) == Some(Cell::Free)
    }

    /// In bounds and blocked.
    pub fn is_blocked(&self, pos: Position) -> bool {
        self.get(pos) == Some(Cell::Blocked)
    }

    /// All positions, row by row.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        let size = self.size as i32;
        (0..size).flat_map(move |row| (0..size).map(move |col| Position::new(row, col)))
    }

    /// All blocked positions, row by row.
    pub fn blocked_positions(&self) -> Vec<Position> {
        self.positions().filter(|p| self.is_blocked(*p)).collect()
    }

    /// Number of blocked cells.
    pub fn blocked_count(&self) -> usize {
        self.cells.iter().filter(|c| **c == Cell::Blocked).count()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_grid_starts_free() {
        let grid = Grid::new(5);
        for pos in grid.positions() {
            assert_eq!(grid.get(pos), Some(Cell::Free), "pos: {}", pos);
        }
        assert_eq!(grid.positions().count(), 25);
        assert_eq!(grid.blocked_count(), 0);
    }

    #[test]
    fn test_out_of_bounds_is_neither_free_nor_blocked() {
        let grid = Grid::new(3);
        for pos in [
            Position::new(-1, 0),
            Position::new(0, -1),
            Position::new(3, 0),
            Position::new(0, 3),
        ] {
            assert_eq!(grid.get(pos), None);
            assert!(!grid.is_free(pos));
            assert!(!grid.is_blocked(pos));
        }
    }

    #[test]
    fn test_toggle_flips_and_flips_back() {
        let mut grid = Grid::new(3);
        let pos = Position::new(1, 2);
        assert_eq!(grid.toggle(pos), Some(Cell::Blocked));
        assert_eq!(grid.blocked_positions(), vec![pos]);
        assert_eq!(grid.toggle(pos), Some(Cell::Free));
        assert!(grid.blocked_positions().is_empty());
        assert_eq!(grid.toggle(Position::new(9, 9)), None);
    }

    #[test]
    fn test_display_marks_walls() {
        let mut grid = Grid::new(2);
        grid.set(Position::new(0, 1), Cell::Blocked);
        assert_eq!(format!("{}", grid), "   0 1\n 0 . #\n 1 . .");
    }

    proptest! {
        #[test]
        fn test_random_obstacle_count_matches_ratio(
            size in 2..16usize,
            ratio in 0.0..0.95f64,
            seed in any::<u64>(),
        ) {
            let mut rng = crate::Rng::seed_from_u64(seed);
            let grid = Grid::with_random_obstacles(size, ratio, &mut rng);
            let expected = ((size * size) as f64 * ratio).floor() as usize;
            prop_assert_eq!(grid.blocked_count(), expected);
        }
    }
}
