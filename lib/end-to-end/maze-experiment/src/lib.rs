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

//! Runs learners against the dynamic maze and collects per-episode metrics.

#![warn(missing_docs)]

use dynamic_maze::{MazeConfig, MazeError};
use serde::{Deserialize, Serialize};

pub mod metrics;
pub mod runner;

pub use metrics::{reward_stability, EpisodeMetrics, ExperimentReport};
pub use runner::{compare_agents, run_episode, run_episode_with, run_experiment};

/// Why an experiment could not run.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExperimentError {
    /// The maze rejected its configuration or could not be repaired.
    #[error("maze error: {0}")]
    Maze(#[from] MazeError),

    /// `episodes` was zero.
    #[error("an experiment needs at least one episode")]
    NoEpisodes,

    /// The agent list was empty.
    #[error("no agents to compare")]
    NoAgents,
}

/// How many episodes to play, on which maze, from which seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Maze shared by every agent. Its own seed is replaced per episode.
    pub maze: MazeConfig,

    /// Episodes per agent.
    pub episodes: usize,

    /// Episode `i` resets the maze with seed `seed + i`, so every agent sees the same mazes.
    pub seed: u64,

    /// Window for the rolling success rate in progress logs.
    pub rolling_window: usize,

    /// Log a progress line every this many episodes. Zero disables progress logs.
    pub report_every: usize,
}

impl ExperimentConfig {
    /// Progress logged every 10 episodes over a 10-episode window.
    pub fn new(maze: MazeConfig, episodes: usize, seed: u64) -> Self {
        Self {
            maze,
            episodes,
            seed,
            rolling_window: 10,
            report_every: 10,
        }
    }

    /// Reset seed for an episode.
    pub fn episode_seed(&self, episode: usize) -> u64 {
        self.seed.wrapping_add(episode as u64)
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self::new(MazeConfig::new(10, 0.25, 18, 200), 100, 42)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_reference_scenario() {
        let config = ExperimentConfig::default();
        assert_eq!(config.maze.size, 10);
        assert_eq!(config.maze.mutation_interval, 18);
        assert_eq!(config.maze.max_steps, 200);
        assert_eq!(config.episodes, 100);
        assert_eq!(config.episode_seed(3), 45);
        assert_eq!(config.maze.validate(), Ok(()));
    }

    #[test]
    fn test_episode_seed_wraps() {
        let config = ExperimentConfig::new(MazeConfig::default(), 2, u64::MAX);
        assert_eq!(config.episode_seed(1), 0);
    }
}
