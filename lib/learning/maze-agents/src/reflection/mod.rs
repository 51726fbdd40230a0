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

//! Adaptive learner for a maze that changes under it.
//!
//! The agent keeps two Q-tables over the same states. The fast table learns with an amplified
//! rate and is what the agent trusts right after the maze changes; the slow table learns with a
//! damped rate and receives consolidated knowledge while the maze is stable. At decision time the
//! two are blended by a weight that follows the current stability estimate.
//!
//! Around the tables sit a prioritized replay buffer, a memory of moves that hit walls (which
//! ages, so that reopened cells get retried), and a periodic self-evaluation that adjusts
//! exploration and learning rates when progress stalls.

use std::collections::VecDeque;

use dynamic_maze::environment::COLLISION_PENALTY;
use dynamic_maze::{Action, Position, Rng, Transition, ACTION_COUNT};
use rand::seq::SliceRandom;
use rand::Rng as _;

use crate::q_table::{max_of, QTable, QValues};
use crate::{confidence, mean, new_rng, push_bounded, Agent, HashMap};

mod adapt;
mod config;
mod consolidate;
pub mod replay;
pub mod stability;
pub mod wall_memory;

pub use adapt::ReflectionSummary;
pub use config::{ReflectionConfig, Tunables};
use replay::PrioritizedReplay;
use stability::{Consistency, OutcomeHistory, StabilityEstimate};
use wall_memory::WallMemory;

/// Chance that an exploratory move follows the goal bias rather than being uniformly random.
const BIASED_EXPLORATION_PROBABILITY: f64 = 0.7;

/// The fast/slow blend is always kept inside this range.
const MIN_MEMORY_BALANCE: f64 = 0.3;
const MAX_MEMORY_BALANCE: f64 = 0.7;

/// Smoothing of the blend towards its stability-derived target.
const MEMORY_BALANCE_SMOOTHING: f64 = 0.9;

const FAST_RATE_MULTIPLIER: f64 = 1.5;
const FAST_RATE_CAP: f64 = 0.8;
const SLOW_RATE_MULTIPLIER: f64 = 0.7;
const SLOW_RATE_FLOOR: f64 = 0.1;

/// Guards the UCB bonus against division by zero for unvisited states.
const UCB_VISIT_EPSILON: f64 = 1e-6;

/// A move that hit a wall or the edge of the grid.
pub fn is_collision(transition: &Transition) -> bool {
    transition.next_state == transition.state && transition.reward <= COLLISION_PENALTY
}

#[derive(Debug, Clone, Copy)]
struct ReflectionRecord {
    state: Position,
    reward: f64,
    terminal: bool,
}

/// See the module documentation.
#[derive(Debug, Clone)]
pub struct ReflectionAgent {
    config: ReflectionConfig,
    tunables: Tunables,
    fast: QTable,
    slow: QTable,
    memory_balance: f64,
    visits: HashMap<Position, u32>,
    total_visits: u64,
    replay: PrioritizedReplay,
    walls: WallMemory,
    outcomes: OutcomeHistory,
    stability: StabilityEstimate,
    recent_confidences: VecDeque<f64>,
    recent_rewards: VecDeque<f64>,
    recent_episode_steps: VecDeque<u32>,
    reflection_buffer: Vec<ReflectionRecord>,
    reflection_interval: usize,
    last_reflection: Option<ReflectionSummary>,
    goal: Option<Position>,
    learning_steps: u64,
    last_change_step: u64,
    changes_detected: u32,
    rng: Rng,
}

impl ReflectionAgent {
    /// Create an agent with empty memories.
    pub fn new(config: ReflectionConfig) -> Self {
        Self {
            tunables: config.tunables.clone(),
            fast: QTable::new(),
            slow: QTable::new(),
            memory_balance: 0.5,
            visits: HashMap::default(),
            total_visits: 0,
            replay: PrioritizedReplay::new(config.replay_capacity),
            walls: WallMemory::new(),
            outcomes: OutcomeHistory::new(config.outcome_history_len, config.reward_tolerance),
            stability: StabilityEstimate::new(
                config.stability_decay,
                config.stability_growth,
                config.stability_floor,
            ),
            recent_confidences: VecDeque::with_capacity(config.history_len + 1),
            recent_rewards: VecDeque::with_capacity(config.history_len + 1),
            recent_episode_steps: VecDeque::with_capacity(config.history_len + 1),
            reflection_buffer: Vec::with_capacity(config.reflection_interval),
            reflection_interval: config.reflection_interval,
            last_reflection: None,
            goal: None,
            learning_steps: 0,
            last_change_step: 0,
            changes_detected: 0,
            rng: new_rng(config.seed),
            config,
        }
    }

    /// Moves that reduce the larger of the two axis gaps to the goal (both when the gaps are
    /// equal), minus any remembered walls. Without a known goal every unwalled move qualifies.
    pub fn biased_actions(&self, state: Position) -> Vec<Action> {
        let mut actions: Vec<Action> = match self.goal {
            None => Action::ALL.to_vec(),
            Some(goal) => {
                let vertical = goal.row - state.row;
                let horizontal = goal.col - state.col;
                let mut proposed = Vec::with_capacity(2);
                if vertical.abs() >= horizontal.abs() && vertical != 0 {
                    proposed.push(if vertical > 0 { Action::Down } else { Action::Up });
                }
                if horizontal.abs() >= vertical.abs() && horizontal != 0 {
                    proposed.push(if horizontal > 0 {
                        Action::Right
                    } else {
                        Action::Left
                    });
                }
                proposed
            }
        };
        actions.retain(|a| !self.walls.is_blocked(state, *a));
        actions
    }

    fn random_action(&mut self) -> Action {
        Action::ALL[self.rng.gen_range(0..ACTION_COUNT)]
    }

    /// Pull the fast/slow weight towards its stability-derived target.
    fn update_memory_balance(&mut self) -> f64 {
        let target = (1.0 - self.stability.value()).clamp(MIN_MEMORY_BALANCE, MAX_MEMORY_BALANCE);
        self.memory_balance = MEMORY_BALANCE_SMOOTHING * self.memory_balance
            + (1.0 - MEMORY_BALANCE_SMOOTHING) * target;
        self.memory_balance
    }

    /// Blend of the two tables for a state under the current weight.
    pub fn combined_values(&self, state: Position) -> QValues {
        let fast = self.fast.values(state);
        let slow = self.slow.values(state);
        std::array::from_fn(|i| {
            self.memory_balance * fast[i] + (1.0 - self.memory_balance) * slow[i]
        })
    }

    /// Exploitation: blended value plus a UCB bonus that is the same for every action of the
    /// state. Ties go to the first action.
    fn exploit(&mut self, state: Position) -> Action {
        self.fast.entry(state);
        self.slow.entry(state);
        self.update_memory_balance();

        let visits = f64::from(self.visits.get(&state).copied().unwrap_or(0));
        let total = (self.total_visits.max(1)) as f64;
        let bonus = (2.0 * total.ln() / (visits + UCB_VISIT_EPSILON)).sqrt();

        let combined = self.combined_values(state);
        let mut best = Action::ALL[0];
        let mut best_score = f64::NEG_INFINITY;
        for action in Action::ALL {
            let score = combined[action.index()] + bonus;
            if score > best_score {
                best = action;
                best_score = score;
            }
        }
        best
    }

    fn td_target(&mut self, transition: &Transition) -> f64 {
        let next_max = max_of(self.fast.entry(transition.next_state));
        let continuation = if transition.terminal { 0.0 } else { 1.0 };
        transition.reward + self.tunables.discount * next_max * continuation
    }

    fn fast_learning_rate(&self) -> f64 {
        (self.tunables.learning_rate * FAST_RATE_MULTIPLIER).min(FAST_RATE_CAP)
    }

    fn slow_learning_rate(&self) -> f64 {
        (self.tunables.learning_rate * SLOW_RATE_MULTIPLIER).max(SLOW_RATE_FLOOR)
    }

    fn replay_priority(&self, transition: &Transition, td_error: f64) -> f64 {
        if transition.terminal && transition.reward > self.config.success_reward_threshold {
            td_error.max(1.0) * 2.0
        } else {
            td_error.max(self.config.min_priority)
        }
    }

    /// Compare the outcome with what this move did before. Enough disagreement, outside the
    /// cooldown, is declared an environment change.
    fn detect_change(&mut self, transition: &Transition) -> bool {
        let consistency = self.outcomes.record(
            transition.state,
            transition.action,
            transition.next_state,
            transition.reward,
        );
        self.stability.observe(consistency);
        if consistency != Consistency::Inconsistent {
            return false;
        }
        let since_last = self.learning_steps.saturating_sub(self.last_change_step);
        if self.stability.value() < self.config.stability_threshold
            && since_last > self.config.change_cooldown
        {
            self.last_change_step = self.learning_steps;
            self.changes_detected += 1;
            self.adapt_to_environment_change();
            return true;
        }
        false
    }

    fn replay_batch(&mut self) {
        let indices = self
            .replay
            .sample(&mut self.rng, self.config.replay_batch_size);
        let alpha = self.tunables.learning_rate;
        for i in indices {
            let Some(transition) = self.replay.get(i).copied() else {
                continue;
            };
            let target = self.td_target(&transition);
            let (_, updated) = self
                .fast
                .update(transition.state, transition.action, target, alpha);
            let residual = (target - updated).abs();
            self.replay
                .set_priority(i, residual.max(self.config.min_priority));
        }
    }

    fn end_episode(&mut self, elapsed_steps: u32) {
        let t = &mut self.tunables;
        t.epsilon = (t.epsilon * t.epsilon_decay).max(t.epsilon_min);
        push_bounded(
            &mut self.recent_episode_steps,
            elapsed_steps,
            self.config.history_len,
        );
    }

    /// Current stability estimate, in `(0, 1]`.
    pub fn stability(&self) -> f64 {
        self.stability.value()
    }

    /// Weight of the fast table in the blend.
    pub fn memory_balance(&self) -> f64 {
        self.memory_balance
    }

    /// Environment changes declared so far.
    pub fn changes_detected(&self) -> u32 {
        self.changes_detected
    }

    /// The fast-adapting table.
    pub fn fast_table(&self) -> &QTable {
        &self.fast
    }

    /// The slow, consolidated table.
    pub fn slow_table(&self) -> &QTable {
        &self.slow
    }

    /// Remembered walls.
    pub fn wall_memory(&self) -> &WallMemory {
        &self.walls
    }

    /// Transitions held for replay.
    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    /// Mean of the recent confidence history, None before the first learning step.
    pub fn recent_mean_confidence(&self) -> Option<f64> {
        mean(&self.recent_confidences)
    }

    /// Mean reward over the recent history.
    pub fn recent_mean_reward(&self) -> Option<f64> {
        mean(&self.recent_rewards)
    }

    /// Step counts of the most recently finished episodes.
    pub fn recent_episode_steps(&self) -> impl Iterator<Item = u32> + '_ {
        self.recent_episode_steps.iter().copied()
    }

    /// Visits recorded for a state by action selection.
    pub fn visits(&self, state: Position) -> u32 {
        self.visits.get(&state).copied().unwrap_or(0)
    }

    /// Learning steps processed.
    pub fn learning_steps(&self) -> u64 {
        self.learning_steps
    }

    /// Transitions buffered before the next self-evaluation.
    pub fn reflection_interval(&self) -> usize {
        self.reflection_interval
    }

    /// Outcome of the most recent self-evaluation.
    pub fn last_reflection(&self) -> Option<&ReflectionSummary> {
        self.last_reflection.as_ref()
    }

    /// Goal of the current episode, if known.
    pub fn goal(&self) -> Option<Position> {
        self.goal
    }

    /// Externally adjustable parameters.
    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    /// Overwrite externally adjustable parameters.
    pub fn tunables_mut(&mut self) -> &mut Tunables {
        &mut self.tunables
    }

    /// Construction parameters.
    pub fn config(&self) -> &ReflectionConfig {
        &self.config
    }
}

impl Agent for ReflectionAgent {
    fn select_action(&mut self, state: Position) -> Action {
        *self.visits.entry(state).or_insert(0) += 1;
        self.total_visits += 1;

        let biased = self.biased_actions(state);
        if biased.is_empty() {
            return self.random_action();
        }
        if self.rng.gen::<f64>() < self.tunables.epsilon {
            if self.rng.gen::<f64>() < BIASED_EXPLORATION_PROBABILITY {
                if let Some(action) = biased.choose(&mut self.rng) {
                    return *action;
                }
            }
            return self.random_action();
        }
        self.exploit(state)
    }

    fn learn(&mut self, transition: &Transition, elapsed_steps: u32, shortest_path: Option<u32>) {
        let history_len = self.config.history_len;
        push_bounded(
            &mut self.recent_confidences,
            confidence(elapsed_steps, shortest_path),
            history_len,
        );
        push_bounded(&mut self.recent_rewards, transition.reward, history_len);

        let target = self.td_target(transition);
        let current = self.fast.entry(transition.state)[transition.action.index()];
        let td_error = (target - current).abs();
        let priority = self.replay_priority(transition, td_error);

        self.detect_change(transition);

        let fast_alpha = self.fast_learning_rate();
        let slow_alpha = self.slow_learning_rate();
        self.fast
            .update(transition.state, transition.action, target, fast_alpha);
        self.slow.entry(transition.next_state);
        self.slow
            .update(transition.state, transition.action, target, slow_alpha);

        self.replay.push(*transition, priority);
        if self.replay.len() >= self.config.replay_batch_size {
            self.replay_batch();
        }

        self.learning_steps += 1;
        if is_collision(transition) {
            self.walls.mark_blocked(transition.state, transition.action);
        }
        if self.config.wall_refresh_interval > 0
            && self.learning_steps % self.config.wall_refresh_interval == 0
        {
            self.walls.refresh(
                &mut self.rng,
                self.config.wall_age_threshold,
                self.config.wall_forget_probability,
            );
        }
        if transition.terminal {
            self.end_episode(elapsed_steps);
        }

        self.reflect(transition);
    }

    fn set_goal(&mut self, goal: Position) {
        self.goal = Some(goal);
    }
}
