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

#![warn(missing_docs)]

//! Dynamic maze world.
//!
//! A square grid of free and blocked cells with an agent and a goal. Every few steps a handful of
//! cells flip between free and blocked, after which the world repairs itself so that the goal is
//! always reachable from wherever the agent stands.

use serde::{Deserialize, Serialize};

pub mod config;
pub mod connectivity;
pub mod environment;
pub mod grid;

pub use config::MazeConfig;
pub use environment::{DynamicMazeEnvironment, EpisodeStats, ResetInfo, StepInfo, StepOutcome};
pub use grid::{Cell, Grid};

/// Random number generator owned by every stochastic component in the maze.
pub type Rng = rand_pcg::Pcg64;

/// Number of actions available in every state.
pub const ACTION_COUNT: usize = 4;

/// Dynamic maze error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MazeError {
    /// Grid is too small to place a start and a goal far enough apart.
    #[error("grid size must be at least {min}, got {size}")]
    GridTooSmall {
        /// Configured size.
        size: usize,
        /// Smallest supported size.
        min: usize,
    },

    /// Obstacle ratio is not a fraction in [0, 1).
    #[error("obstacle ratio must be within [0, 1), got {0}")]
    InvalidObstacleRatio(f64),

    /// The grid would never mutate.
    #[error("mutation interval must be positive")]
    ZeroMutationInterval,

    /// Episodes would end before the first step.
    #[error("step budget must be positive")]
    ZeroStepBudget,

    /// Repair is not allowed to unblock any cell.
    #[error("repair iteration cap must be positive")]
    ZeroRepairCap,

    /// Connectivity repair did not restore a path within the iteration cap.
    #[error("connectivity repair gave up after {0} iterations")]
    RepairLimitExceeded(usize),

    /// Position is out of bounds or on a blocked cell.
    #[error("position is out of bounds or blocked: {0}")]
    InvalidPosition(Position),
}

/// A cell coordinate. Row grows downwards, column grows to the right.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    /// Row, starting at 0 at the top.
    pub row: i32,

    /// Column, starting at 0 on the left.
    pub col: i32,
}

impl Position {
    /// Create a new position.
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Manhattan distance to another position.
    pub fn manhattan_distance(&self, other: &Position) -> i32 {
        (self.row - other.row).abs() + (self.col - other.col).abs()
    }

    /// The position one unit move away in the direction of `action`. The result may be out of
    /// bounds; it is up to the grid to decide.
    pub fn offset(&self, action: Action) -> Position {
        let (d_row, d_col) = action.delta();
        Position {
            row: self.row + d_row,
            col: self.col + d_col,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// One of the four unit moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    /// Move one row up.
    Up,

    /// Move one row down.
    Down,

    /// Move one column left.
    Left,

    /// Move one column right.
    Right,
}

impl Action {
    /// All actions, in index order. Q-value vectors are laid out in this order.
    pub const ALL: [Action; ACTION_COUNT] = [Action::Up, Action::Down, Action::Left, Action::Right];

    /// Index of the action inside a Q-value vector.
    pub fn index(self) -> usize {
        match self {
            Action::Up => 0,
            Action::Down => 1,
            Action::Left => 2,
            Action::Right => 3,
        }
    }

    /// Action for a Q-value vector index, if the index is in range.
    pub fn from_index(index: usize) -> Option<Action> {
        Action::ALL.get(index).copied()
    }

    /// (row, col) displacement of the move.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Action::Up => (-1, 0),
            Action::Down => (1, 0),
            Action::Left => (0, -1),
            Action::Right => (0, 1),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Up => write!(f, "Up"),
            Action::Down => write!(f, "Down"),
            Action::Left => write!(f, "Left"),
            Action::Right => write!(f, "Right"),
        }
    }
}

/// One decision step as seen by a learner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Where the agent was before acting.
    pub state: Position,

    /// What it did.
    pub action: Action,

    /// What the environment paid for it.
    pub reward: f64,

    /// Where it ended up.
    pub next_state: Position,

    /// Whether the episode ended on this step.
    pub terminal: bool,
}
