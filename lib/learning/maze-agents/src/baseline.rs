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

//! Fixed-parameter tabular Q-learning with uniform experience replay. The yardstick the
//! reflection agent is compared against.

use std::collections::VecDeque;

use dynamic_maze::environment::GOAL_REWARD;
use dynamic_maze::{Action, Position, Rng, Transition, ACTION_COUNT};
use rand::seq::SliceRandom;
use rand::Rng as _;
use serde::{Deserialize, Serialize};

use crate::q_table::{max_of, QTable};
use crate::{new_rng, push_bounded, Agent};

/// Construction parameters for [`BaselineAgent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Initial exploration rate.
    pub epsilon: f64,

    /// Exploration never decays below this.
    pub epsilon_min: f64,

    /// Multiplier applied to `epsilon` at the end of every episode.
    pub epsilon_decay: f64,

    /// Learning rate.
    pub learning_rate: f64,

    /// Discount factor.
    pub discount: f64,

    /// Experiences kept for replay. The oldest is dropped first.
    pub replay_capacity: usize,

    /// Experiences replayed per learning step, once the buffer holds this many.
    pub batch_size: usize,

    /// Finished episodes remembered for the success rate.
    pub success_history_len: usize,

    /// Seed for the agent's generator. None draws from entropy.
    pub seed: Option<u64>,
}

impl BaselineConfig {
    /// Same config with a fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.3,
            epsilon_min: 0.1,
            epsilon_decay: 0.995,
            learning_rate: 0.1,
            discount: 0.9,
            replay_capacity: 1000,
            batch_size: 32,
            success_history_len: 150,
            seed: None,
        }
    }
}

/// See the module documentation.
#[derive(Debug, Clone)]
pub struct BaselineAgent {
    config: BaselineConfig,
    epsilon: f64,
    q: QTable,
    replay: VecDeque<Transition>,
    successes: VecDeque<bool>,
    rng: Rng,
}

impl BaselineAgent {
    /// Create an agent with an empty table.
    pub fn new(config: BaselineConfig) -> Self {
        Self {
            epsilon: config.epsilon,
            q: QTable::new(),
            replay: VecDeque::with_capacity(config.replay_capacity),
            successes: VecDeque::with_capacity(config.success_history_len + 1),
            rng: new_rng(config.seed),
            config,
        }
    }

    fn update(&mut self, transition: &Transition) {
        let continuation = if transition.terminal { 0.0 } else { 1.0 };
        let target = transition.reward
            + self.config.discount * self.q.max_value(transition.next_state) * continuation;
        self.q.update(
            transition.state,
            transition.action,
            target,
            self.config.learning_rate,
        );
    }

    fn replay_batch(&mut self) {
        let indices = rand::seq::index::sample(
            &mut self.rng,
            self.replay.len(),
            self.config.batch_size.min(self.replay.len()),
        );
        for i in indices {
            if let Some(transition) = self.replay.get(i).copied() {
                self.update(&transition);
            }
        }
    }

    /// Current exploration rate.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// The action-value table.
    pub fn q_table(&self) -> &QTable {
        &self.q
    }

    /// Transitions held for replay.
    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    /// Fraction of recent episodes that ended at the goal. None before the first episode ends.
    pub fn success_rate(&self) -> Option<f64> {
        if self.successes.is_empty() {
            return None;
        }
        let wins = self.successes.iter().filter(|s| **s).count();
        Some(wins as f64 / self.successes.len() as f64)
    }
}

impl Agent for BaselineAgent {
    /// Epsilon-greedy, with ties among the best actions broken at random.
    fn select_action(&mut self, state: Position) -> Action {
        if self.rng.gen::<f64>() < self.epsilon {
            return Action::ALL[self.rng.gen_range(0..ACTION_COUNT)];
        }
        let values = self.q.values(state);
        let best = max_of(&values);
        let ties: Vec<Action> = Action::ALL
            .into_iter()
            .filter(|a| values[a.index()] == best)
            .collect();
        ties.choose(&mut self.rng).copied().unwrap_or(Action::ALL[0])
    }

    fn learn(&mut self, transition: &Transition, _elapsed_steps: u32, _shortest_path: Option<u32>) {
        push_bounded(&mut self.replay, *transition, self.config.replay_capacity);
        if self.config.batch_size > 0 && self.replay.len() >= self.config.batch_size {
            self.replay_batch();
        }
        if transition.terminal {
            self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
            push_bounded(
                &mut self.successes,
                transition.reward >= GOAL_REWARD,
                self.config.success_history_len,
            );
        }
    }

    /// The baseline ignores the goal; it learns positions alone.
    fn set_goal(&mut self, _goal: Position) {}
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn agent() -> BaselineAgent {
        BaselineAgent::new(BaselineConfig::default().with_seed(5))
    }

    fn goal_step() -> Transition {
        let state = Position::new(8, 9);
        Transition {
            state,
            action: Action::Down,
            reward: 10.0,
            next_state: state.offset(Action::Down),
            terminal: true,
        }
    }

    #[test]
    fn test_greedy_choice_follows_table() {
        let mut a = agent();
        a.epsilon = 0.0;
        let s = Position::new(2, 2);
        a.q.insert(s, [0.0, 0.0, 0.0, 1.0]);
        for _ in 0..20 {
            assert_eq!(a.select_action(s), Action::Right);
        }
    }

    #[test]
    fn test_ties_are_broken_randomly() {
        let mut a = agent();
        a.epsilon = 0.0;
        let s = Position::new(0, 0);
        a.q.insert(s, [1.0, 1.0, 0.0, 0.0]);
        let ups = (0..400)
            .filter(|_| a.select_action(s) == Action::Up)
            .count();
        assert!((120..280).contains(&ups), "ups: {}", ups);
    }

    #[test]
    fn test_no_learning_until_batch_is_full() {
        let mut a = agent();
        for _ in 0..31 {
            a.learn(&goal_step(), 1, Some(1));
        }
        assert!(a.q_table().is_empty());
        a.learn(&goal_step(), 1, Some(1));
        assert!(a.q_table().values(goal_step().state)[Action::Down.index()] > 0.0);
    }

    #[test]
    fn test_terminal_transition_decays_epsilon_and_records_success() {
        let mut a = agent();
        a.learn(&goal_step(), 5, Some(5));
        assert_abs_diff_eq!(a.epsilon(), 0.3 * 0.995);
        assert_eq!(a.success_rate(), Some(1.0));

        let timeout = Transition {
            reward: -0.1,
            ..goal_step()
        };
        a.learn(&timeout, 200, Some(5));
        assert_eq!(a.success_rate(), Some(0.5));
    }

    #[test]
    fn test_timeout_while_closing_in_is_not_a_success() {
        let mut a = agent();
        let closer = Transition {
            reward: -0.1 + 1.0,
            ..goal_step()
        };
        a.learn(&closer, 200, Some(12));
        assert_eq!(a.success_rate(), Some(0.0));
    }

    #[test]
    fn test_epsilon_floor() {
        let mut a = agent();
        for _ in 0..1000 {
            a.learn(&goal_step(), 1, Some(1));
        }
        assert_abs_diff_eq!(a.epsilon(), 0.1);
    }

    #[test]
    fn test_replay_keeps_most_recent() {
        let mut config = BaselineConfig::default().with_seed(6);
        config.replay_capacity = 5;
        config.batch_size = 2;
        let mut a = BaselineAgent::new(config);
        for _ in 0..8 {
            a.learn(&goal_step(), 1, Some(1));
        }
        assert_eq!(a.replay_len(), 5);
    }
}
