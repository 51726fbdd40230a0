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

//! Construction parameters for the maze.

use serde::{Deserialize, Serialize};

use crate::MazeError;

/// Smallest grid for which every start in the top-left region has a goal cell in the bottom-right
/// region at least `size` Manhattan steps away.
pub const MIN_GRID_SIZE: usize = 4;

/// Construction parameters for [`crate::DynamicMazeEnvironment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MazeConfig {
    /// Side length of the square grid.
    pub size: usize,

    /// Fraction of cells blocked when a new grid is generated.
    pub obstacle_ratio: f64,

    /// The grid mutates every this many steps.
    pub mutation_interval: u32,

    /// Episodes end (unsuccessfully) after this many steps.
    pub max_steps: u32,

    /// Seed for the environment generator. None draws from entropy.
    pub seed: Option<u64>,

    /// Upper bound on cells unblocked by one connectivity repair. Defaults to `size * size`.
    pub max_repair_iterations: Option<usize>,
}

impl MazeConfig {
    /// Create a new config.
    pub fn new(size: usize, obstacle_ratio: f64, mutation_interval: u32, max_steps: u32) -> Self {
        Self {
            size,
            obstacle_ratio,
            mutation_interval,
            max_steps,
            seed: None,
            max_repair_iterations: None,
        }
    }

    /// Same config with a fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Effective repair cap.
    pub fn repair_cap(&self) -> usize {
        self.max_repair_iterations
            .unwrap_or(self.size * self.size)
    }

    /// Reject configurations that cannot produce a playable maze.
    pub fn validate(&self) -> Result<(), MazeError> {
        if self.size < MIN_GRID_SIZE {
            return Err(MazeError::GridTooSmall {
                size: self.size,
                min: MIN_GRID_SIZE,
            });
        }
        if !self.obstacle_ratio.is_finite() || !(0.0..1.0).contains(&self.obstacle_ratio) {
            return Err(MazeError::InvalidObstacleRatio(self.obstacle_ratio));
        }
        if self.mutation_interval == 0 {
            return Err(MazeError::ZeroMutationInterval);
        }
        if self.max_steps == 0 {
            return Err(MazeError::ZeroStepBudget);
        }
        if self.repair_cap() == 0 {
            return Err(MazeError::ZeroRepairCap);
        }
        Ok(())
    }
}

impl Default for MazeConfig {
    fn default() -> Self {
        Self::new(10, 0.3, 20, 200)
    }
}
