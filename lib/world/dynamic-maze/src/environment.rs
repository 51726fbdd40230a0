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

//! The grid world itself.

use rand::seq::SliceRandom;
use rand::Rng as _;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::connectivity;
use crate::{Action, Cell, Grid, MazeConfig, MazeError, Position, Rng};

/// Paid for every move that lands on a free cell other than the goal, on top of the distance
/// shaping term.
pub const STEP_PENALTY: f64 = -0.1;

/// Paid for walking into a wall or off the grid.
pub const COLLISION_PENALTY: f64 = -1.0;

/// Paid for reaching the goal.
pub const GOAL_REWARD: f64 = 10.0;

/// Per-episode counters. Cleared on reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    /// Number of grid mutations.
    pub environment_updates: u32,

    /// Number of mutations after which the goal was somewhere else.
    pub goal_changes: u32,

    /// Number of cells flipped by mutations.
    pub obstacle_changes: u32,

    /// Number of cells unblocked by connectivity repair.
    pub cells_repaired: u32,

    /// Sum of rewards paid out.
    pub cumulative_reward: f64,
}

/// What reset tells the caller besides the start position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetInfo {
    /// Goal for this episode.
    pub goal: Position,

    /// BFS hop count from start to goal.
    pub optimal_path_length: Option<u32>,
}

/// Side information for a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
    /// The move hit a wall or the edge and the agent did not move.
    pub collided: bool,

    /// The agent is on the goal.
    pub reached_goal: bool,

    /// The step budget ran out before the goal was reached.
    pub truncated: bool,

    /// The grid mutated after this step.
    pub mutated: bool,
}

/// Result of [`DynamicMazeEnvironment::step`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Agent position after the step.
    pub next_state: Position,

    /// Reward for the step.
    pub reward: f64,

    /// Goal reached or step budget exhausted.
    pub terminal: bool,

    /// Details.
    pub info: StepInfo,
}

/// A maze whose walls shift every `mutation_interval` steps. After every reset and every
/// mutation the goal is reachable from the agent and the agent has at least one legal move.
///
/// The environment holds exactly one agent position. Running several agents against one instance
/// requires saving and restoring the position around each agent's steps with
/// [`DynamicMazeEnvironment::agent_position`] and [`DynamicMazeEnvironment::set_agent_position`].
#[derive(Debug, Clone)]
pub struct DynamicMazeEnvironment {
    config: MazeConfig,
    grid: Grid,
    agent: Position,
    previous: Position,
    goal: Position,
    steps: u32,
    stats: EpisodeStats,
    optimal_path_length: Option<u32>,
    rng: Rng,
}

impl std::fmt::Display for DynamicMazeEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let size = self.grid.size() as i32;
        let mut s = String::with_capacity((self.grid.size() + 1) * (self.grid.size() + 1));
        for row in 0..size {
            for col in 0..size {
                let pos = Position::new(row, col);
                s.push(if pos == self.agent {
                    'A'
                } else if pos == self.goal {
                    'G'
                } else if self.grid.is_blocked(pos) {
                    '#'
                } else {
                    '.'
                });
            }
            if row < size - 1 {
                s.push('\n');
            }
        }
        write!(f, "{}", s)
    }
}

impl DynamicMazeEnvironment {
    /// Create a new environment and generate its first episode.
    pub fn new(config: MazeConfig) -> Result<Self, MazeError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => Rng::seed_from_u64(seed),
            None => Rng::from_entropy(),
        };
        let mut env = Self {
            grid: Grid::new(config.size),
            agent: Position::new(0, 0),
            previous: Position::new(0, 0),
            goal: Position::new(0, 0),
            steps: 0,
            stats: EpisodeStats::default(),
            optimal_path_length: None,
            rng,
            config,
        };
        env.reset(None)?;
        Ok(env)
    }

    /// Generate a fresh grid, start and goal. A seed re-seeds the environment generator first so
    /// the episode is reproducible.
    pub fn reset(&mut self, seed: Option<u64>) -> Result<(Position, ResetInfo), MazeError> {
        if let Some(seed) = seed {
            self.rng = Rng::seed_from_u64(seed);
        }

        self.grid = Grid::with_random_obstacles(
            self.config.size,
            self.config.obstacle_ratio,
            &mut self.rng,
        );
        self.agent = self.place_start();
        self.ensure_not_trapped();
        self.goal = self.place_goal();
        self.repair_connectivity()?;
        self.ensure_not_trapped();

        self.steps = 0;
        self.previous = self.agent;
        self.stats = EpisodeStats::default();
        self.optimal_path_length = self.shortest_path_length();

        Ok((
            self.agent,
            ResetInfo {
                goal: self.goal,
                optimal_path_length: self.optimal_path_length,
            },
        ))
    }

    /// Apply one move.
    ///
    /// Walking into a wall or off the grid leaves the agent where it is and pays
    /// [`COLLISION_PENALTY`]. A legal move pays [`STEP_PENALTY`] plus the drop in Manhattan
    /// distance to the goal, or [`GOAL_REWARD`] on arrival. The episode ends on arrival or once
    /// `max_steps` steps have been taken. While the episode is running, every
    /// `mutation_interval`th step mutates the grid.
    pub fn step(&mut self, action: Action) -> Result<StepOutcome, MazeError> {
        self.steps += 1;
        let from = self.agent;
        self.previous = from;
        let target = from.offset(action);

        let mut info = StepInfo::default();
        let reward = if !self.grid.is_free(target) {
            info.collided = true;
            COLLISION_PENALTY
        } else {
            self.agent = target;
            if target == self.goal {
                info.reached_goal = true;
                GOAL_REWARD
            } else {
                let old_distance = from.manhattan_distance(&self.goal);
                let new_distance = target.manhattan_distance(&self.goal);
                STEP_PENALTY + f64::from(old_distance - new_distance)
            }
        };

        info.truncated = !info.reached_goal && self.steps >= self.config.max_steps;
        let terminal = info.reached_goal || info.truncated;
        if !terminal && self.steps % self.config.mutation_interval == 0 {
            self.mutate()?;
            info.mutated = true;
        }
        self.stats.cumulative_reward += reward;

        Ok(StepOutcome {
            next_state: self.agent,
            reward,
            terminal,
            info,
        })
    }

    /// Flip between one and three random cells, never the agent's or the goal's, then restore
    /// connectivity and make sure the agent is not boxed in. The goal never moves.
    pub fn mutate(&mut self) -> Result<(), MazeError> {
        let old_goal = self.goal;
        let size = self.grid.size() as i32;
        let flips = self.rng.gen_range(1..=3);
        let mut flipped = 0;
        for _ in 0..flips {
            let pos = Position::new(self.rng.gen_range(0..size), self.rng.gen_range(0..size));
            if pos == self.agent || pos == self.goal {
                continue;
            }
            self.grid.toggle(pos);
            flipped += 1;
        }

        let repaired = self.repair_connectivity()?;
        self.ensure_not_trapped();

        if old_goal != self.goal {
            self.stats.goal_changes += 1;
        }
        self.stats.environment_updates += 1;
        self.stats.obstacle_changes += flipped;
        debug!(step = self.steps, flipped, repaired, "grid mutated");
        Ok(())
    }

    /// BFS hop count from the agent to the goal.
    pub fn shortest_path_length(&self) -> Option<u32> {
        connectivity::shortest_path_length(&self.grid, self.agent, self.goal)
    }

    /// Whether the agent has at least one legal move.
    pub fn has_valid_move(&self) -> bool {
        connectivity::has_valid_move(&self.grid, self.agent)
    }

    /// Current agent position.
    pub fn agent_position(&self) -> Position {
        self.agent
    }

    /// Move the agent without taking a step. Used to restore a saved position when several
    /// agents take turns on one environment. Connectivity and the anti-trap guarantee are
    /// re-established for the new position.
    pub fn set_agent_position(&mut self, pos: Position) -> Result<(), MazeError> {
        if !self.grid.is_free(pos) {
            return Err(MazeError::InvalidPosition(pos));
        }
        self.agent = pos;
        self.repair_connectivity()?;
        self.ensure_not_trapped();
        Ok(())
    }

    /// Agent position before the last step.
    pub fn previous_position(&self) -> Position {
        self.previous
    }

    /// Goal position.
    pub fn goal_position(&self) -> Position {
        self.goal
    }

    /// The occupancy grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Steps taken this episode.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Counters for this episode.
    pub fn episode_stats(&self) -> EpisodeStats {
        self.stats
    }

    /// Shortest path length from the start of this episode.
    pub fn optimal_path_length(&self) -> Option<u32> {
        self.optimal_path_length
    }

    /// Construction parameters.
    pub fn config(&self) -> &MazeConfig {
        &self.config
    }

    fn place_start(&mut self) -> Position {
        let limit = (self.config.size / 3) as i32;
        self.place_in_region(|p| p.row <= limit && p.col <= limit)
            .unwrap_or(Position::new(0, 0))
    }

    fn place_goal(&mut self) -> Position {
        let size = self.config.size as i32;
        let limit = 2 * size / 3;
        let start = self.agent;
        self.place_in_region(|p| {
            p.row >= limit && p.col >= limit && p.manhattan_distance(&start) >= size
        })
        .unwrap_or(Position::new(size - 1, size - 1))
    }

    // Prefer a free cell in the region. If walls cover the whole region, clear one of its cells.
    fn place_in_region<F>(&mut self, in_region: F) -> Option<Position>
    where
        F: Fn(&Position) -> bool,
    {
        let region: Vec<Position> = self.grid.positions().filter(|p| in_region(p)).collect();
        let free: Vec<Position> = region
            .iter()
            .copied()
            .filter(|p| self.grid.is_free(*p))
            .collect();
        if let Some(pos) = free.choose(&mut self.rng) {
            return Some(*pos);
        }

        let pos = *region.choose(&mut self.rng)?;
        warn!(%pos, "no free cell in placement region, clearing one");
        self.grid.set(pos, Cell::Free);
        Some(pos)
    }

    /// Unblock random walls until the goal is reachable again. Returns how many were removed.
    fn repair_connectivity(&mut self) -> Result<u32, MazeError> {
        self.grid.set(self.agent, Cell::Free);
        self.grid.set(self.goal, Cell::Free);

        let cap = self.config.repair_cap();
        let mut repaired: usize = 0;
        while !connectivity::is_reachable(&self.grid, self.agent, self.goal) {
            if repaired >= cap {
                return Err(MazeError::RepairLimitExceeded(repaired));
            }
            let candidates: Vec<Position> = self
                .grid
                .blocked_positions()
                .into_iter()
                .filter(|p| *p != self.agent && *p != self.goal)
                .collect();
            let Some(pos) = candidates.choose(&mut self.rng).copied() else {
                return Err(MazeError::RepairLimitExceeded(repaired));
            };
            self.grid.set(pos, Cell::Free);
            repaired += 1;
        }

        let repaired = repaired as u32;
        self.stats.cells_repaired += repaired;
        Ok(repaired)
    }

    /// If the agent has no legal move, unblock one neighbour. Down and right go first so that an
    /// agent in the top-left corner is opened up towards the goal.
    fn ensure_not_trapped(&mut self) -> Option<Position> {
        if connectivity::has_valid_move(&self.grid, self.agent) {
            return None;
        }
        for action in [Action::Down, Action::Right, Action::Up, Action::Left] {
            let next = self.agent.offset(action);
            if self.grid.is_blocked(next) {
                self.grid.set(next, Cell::Free);
                return Some(next);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    use super::*;

    fn seeded(seed: u64) -> DynamicMazeEnvironment {
        DynamicMazeEnvironment::new(MazeConfig::default().with_seed(seed)).expect("valid config")
    }

    // Open 6x6 board with the agent and goal placed by hand.
    fn open_board(agent: Position, goal: Position) -> DynamicMazeEnvironment {
        let mut env = DynamicMazeEnvironment::new(MazeConfig::new(6, 0.0, 1000, 200).with_seed(1))
            .expect("valid config");
        env.grid = Grid::new(6);
        env.agent = agent;
        env.previous = agent;
        env.goal = goal;
        env
    }

    fn assert_navigable(env: &DynamicMazeEnvironment) {
        assert!(
            env.shortest_path_length().is_some(),
            "goal unreachable:\n{}",
            env
        );
        assert!(env.has_valid_move(), "agent trapped:\n{}", env);
        assert!(env.grid().is_free(env.agent_position()));
        assert!(env.grid().is_free(env.goal_position()));
    }

    #[test]
    fn test_reset_places_start_and_goal_in_opposite_corners() {
        for seed in 0..50 {
            let mut env = seeded(seed);
            let (start, info) = env.reset(Some(seed)).expect("reset");
            let size = env.config().size as i32;
            assert!(start.row <= size / 3 && start.col <= size / 3, "start: {}", start);
            assert!(
                info.goal.row >= 2 * size / 3 && info.goal.col >= 2 * size / 3,
                "goal: {}",
                info.goal
            );
            assert!(start.manhattan_distance(&info.goal) >= size);
            assert_eq!(info.optimal_path_length, env.shortest_path_length());
            assert_eq!(env.steps(), 0);
            assert_eq!(env.previous_position(), start);
            assert_navigable(&env);
        }
    }

    #[test]
    fn test_same_seed_same_episode() {
        let mut a = seeded(7);
        let mut b = seeded(99);
        let ra = a.reset(Some(1234)).expect("reset");
        let rb = b.reset(Some(1234)).expect("reset");
        assert_eq!(ra, rb);
        assert_eq!(a.grid(), b.grid());
    }

    #[test]
    fn test_collision_with_edge_keeps_position() {
        let mut env = open_board(Position::new(0, 0), Position::new(5, 5));
        let outcome = env.step(Action::Up).expect("step");
        assert_eq!(outcome.next_state, Position::new(0, 0));
        assert_abs_diff_eq!(outcome.reward, COLLISION_PENALTY);
        assert!(!outcome.terminal);
        assert!(outcome.info.collided);
    }

    #[test]
    fn test_collision_with_wall_keeps_position() {
        let mut env = open_board(Position::new(2, 2), Position::new(5, 5));
        env.grid.set(Position::new(2, 3), Cell::Blocked);
        let outcome = env.step(Action::Right).expect("step");
        assert_eq!(outcome.next_state, Position::new(2, 2));
        assert_abs_diff_eq!(outcome.reward, COLLISION_PENALTY);
        assert!(outcome.info.collided);
    }

    #[test]
    fn test_reward_shaping_follows_distance_change() {
        let mut env = open_board(Position::new(2, 2), Position::new(5, 5));
        let closer = env.step(Action::Right).expect("step");
        assert_abs_diff_eq!(closer.reward, STEP_PENALTY + 1.0, epsilon = 1e-12);
        assert_eq!(env.previous_position(), Position::new(2, 2));

        let further = env.step(Action::Up).expect("step");
        assert_abs_diff_eq!(further.reward, STEP_PENALTY - 1.0, epsilon = 1e-12);
        assert_eq!(further.next_state, Position::new(1, 3));
        assert_abs_diff_eq!(
            env.episode_stats().cumulative_reward,
            2.0 * STEP_PENALTY,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_reaching_goal_terminates_with_goal_reward() {
        let mut env = open_board(Position::new(5, 4), Position::new(5, 5));
        let outcome = env.step(Action::Right).expect("step");
        assert_eq!(outcome.next_state, Position::new(5, 5));
        assert_abs_diff_eq!(outcome.reward, GOAL_REWARD);
        assert!(outcome.terminal);
        assert!(outcome.info.reached_goal);
        assert!(!outcome.info.truncated);
    }

    #[test]
    fn test_step_budget_ends_episode_unsuccessfully() {
        let mut env = open_board(Position::new(0, 0), Position::new(5, 5));
        env.config.max_steps = 3;
        assert!(!env.step(Action::Up).expect("step").terminal);
        assert!(!env.step(Action::Left).expect("step").terminal);
        let last = env.step(Action::Up).expect("step");
        assert!(last.terminal);
        assert!(last.info.truncated);
        assert!(!last.info.reached_goal);
    }

    #[test]
    fn test_mutation_cadence_and_goal_is_fixed() {
        let mut env = seeded(3);
        env.config.mutation_interval = 2;
        let goal = env.goal_position();
        let mut mutations = 0;
        for i in 1..=10 {
            let action = Action::ALL[i % 4];
            let outcome = env.step(action).expect("step");
            if outcome.terminal {
                break;
            }
            assert_eq!(outcome.info.mutated, i % 2 == 0);
            if outcome.info.mutated {
                mutations += 1;
            }
            assert_navigable(&env);
        }
        assert_eq!(env.goal_position(), goal);
        assert_eq!(env.episode_stats().environment_updates, mutations);
        assert_eq!(env.episode_stats().goal_changes, 0);
    }

    #[test]
    fn test_mutation_never_touches_agent_or_goal() {
        let mut env = seeded(11);
        for _ in 0..200 {
            env.mutate().expect("mutate");
            assert_navigable(&env);
        }
        assert_eq!(env.episode_stats().environment_updates, 200);
    }

    #[test]
    fn test_trapped_agent_is_opened_downwards_first() {
        let mut env = open_board(Position::new(2, 2), Position::new(5, 5));
        for action in Action::ALL {
            env.grid.set(Position::new(2, 2).offset(action), Cell::Blocked);
        }
        assert!(!env.has_valid_move());
        assert_eq!(env.ensure_not_trapped(), Some(Position::new(3, 2)));
        assert!(env.has_valid_move());
        assert_eq!(env.ensure_not_trapped(), None);
    }

    #[test]
    fn test_trapped_agent_in_bottom_right_corner_opens_upwards() {
        let mut env = open_board(Position::new(5, 5), Position::new(0, 0));
        env.grid.set(Position::new(4, 5), Cell::Blocked);
        env.grid.set(Position::new(5, 4), Cell::Blocked);
        assert_eq!(env.ensure_not_trapped(), Some(Position::new(4, 5)));
    }

    #[test]
    fn test_repair_opens_a_path() {
        let mut env = open_board(Position::new(0, 0), Position::new(5, 5));
        for col in 0..6 {
            env.grid.set(Position::new(3, col), Cell::Blocked);
        }
        assert!(env.shortest_path_length().is_none());
        let repaired = env.repair_connectivity().expect("repair");
        assert!(repaired >= 1);
        assert!(env.shortest_path_length().is_some());
        assert_eq!(env.episode_stats().cells_repaired, repaired);
    }

    #[test]
    fn test_repair_gives_up_at_cap() {
        let mut env = open_board(Position::new(0, 0), Position::new(5, 5));
        env.config.max_repair_iterations = Some(1);
        for col in 0..6 {
            env.grid.set(Position::new(2, col), Cell::Blocked);
            env.grid.set(Position::new(3, col), Cell::Blocked);
        }
        assert_eq!(
            env.repair_connectivity(),
            Err(MazeError::RepairLimitExceeded(1))
        );
    }

    #[test]
    fn test_dense_obstacles_still_produce_a_maze() {
        let config = MazeConfig::new(8, 0.95, 5, 50).with_seed(5);
        let env = DynamicMazeEnvironment::new(config).expect("dense maze");
        assert_navigable(&env);
    }

    #[test]
    fn test_set_agent_position_rejects_walls_and_edges() {
        let mut env = open_board(Position::new(0, 0), Position::new(5, 5));
        env.grid.set(Position::new(1, 1), Cell::Blocked);
        assert_eq!(
            env.set_agent_position(Position::new(1, 1)),
            Err(MazeError::InvalidPosition(Position::new(1, 1)))
        );
        assert_eq!(
            env.set_agent_position(Position::new(6, 0)),
            Err(MazeError::InvalidPosition(Position::new(6, 0)))
        );
        env.set_agent_position(Position::new(4, 4)).expect("free cell");
        assert_eq!(env.agent_position(), Position::new(4, 4));
    }

    #[test]
    fn test_display_shows_agent_and_goal() {
        let env = open_board(Position::new(0, 0), Position::new(5, 5));
        let rendered = format!("{}", env);
        assert!(rendered.starts_with('A'));
        assert!(rendered.ends_with('G'));
        assert_eq!(rendered.lines().count(), 6);
    }

    proptest! {
        #[test]
        fn test_reset_and_mutation_keep_goal_reachable(
            seed in any::<u64>(),
            ratio in 0.0..0.6f64,
            actions in prop::collection::vec(0..4usize, 1..80),
        ) {
            let config = MazeConfig::new(8, ratio, 3, 500).with_seed(seed);
            let mut env = DynamicMazeEnvironment::new(config).expect("valid config");
            prop_assert!(env.shortest_path_length().is_some());
            prop_assert!(env.has_valid_move());
            for a in actions {
                let action = Action::from_index(a).expect("in range");
                let outcome = env.step(action).expect("step");
                if outcome.terminal {
                    break;
                }
                prop_assert!(env.shortest_path_length().is_some());
                prop_assert!(env.has_valid_move());
            }
        }
    }
}
