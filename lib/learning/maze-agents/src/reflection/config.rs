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

use serde::{Deserialize, Serialize};

/// Parameters that callers may read and overwrite while the agent is learning. The agent also
/// moves `epsilon` and `learning_rate` itself as it adapts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tunables {
    /// Mean recent confidence below this counts as doing badly.
    pub confidence_threshold: f64,

    /// Reflection scores below this trigger strategy adaptation.
    pub adaptation_threshold: f64,

    /// Exploration rate.
    pub epsilon: f64,

    /// Exploration never decays below this.
    pub epsilon_min: f64,

    /// Multiplier applied to `epsilon` at the end of every episode.
    pub epsilon_decay: f64,

    /// Base learning rate. The fast and slow tables derive their own rates from it.
    pub learning_rate: f64,

    /// Discount factor.
    pub discount: f64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            adaptation_threshold: 0.4,
            epsilon: 0.9,
            epsilon_min: 0.3,
            epsilon_decay: 0.995,
            learning_rate: 0.5,
            discount: 0.9,
        }
    }
}

/// Construction parameters for [`crate::ReflectionAgent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Initial values of the externally adjustable parameters.
    pub tunables: Tunables,

    /// Experiences kept for replay.
    pub replay_capacity: usize,

    /// Experiences replayed per learning step, once the buffer holds this many.
    pub replay_batch_size: usize,

    /// Floor on replay priorities.
    pub min_priority: f64,

    /// Terminal rewards above this count as successes and get boosted priority.
    pub success_reward_threshold: f64,

    /// Transitions buffered between self-evaluations.
    pub reflection_interval: usize,

    /// Shorter evaluation interval used after a detected change.
    pub reflection_interval_after_change: usize,

    /// Length of the rolling confidence, reward and step histories.
    pub history_len: usize,

    /// Wall memory is aged every this many learning steps.
    pub wall_refresh_interval: u64,

    /// Wall entries older than this become eligible for forgetting.
    pub wall_age_threshold: u32,

    /// Probability that an eligible wall entry is forgotten on each refresh.
    pub wall_forget_probability: f64,

    /// Multiplier applied to stability on an inconsistent outcome.
    pub stability_decay: f64,

    /// Multiplier applied to stability on a consistent outcome.
    pub stability_growth: f64,

    /// Stability never falls below this.
    pub stability_floor: f64,

    /// A change can only be declared while stability is below this.
    pub stability_threshold: f64,

    /// Learning steps that must pass between two declared changes.
    pub change_cooldown: u64,

    /// Outcomes remembered per state and action.
    pub outcome_history_len: usize,

    /// Rewards further apart than this are inconsistent.
    pub reward_tolerance: f64,

    /// Fraction of wall-memory states dropped on a detected change.
    pub wall_clear_fraction: f64,

    /// Fraction of replay priorities halved on a detected change.
    pub priority_decay_fraction: f64,

    /// Fraction of fast-table states softened on a detected change.
    pub fast_soften_fraction: f64,

    /// Exploration boost on a detected change.
    pub change_epsilon_boost: f64,

    /// Fast-table weight right after a detected change.
    pub change_memory_balance: f64,

    /// Knowledge moves to the slow table only while stability is above this.
    pub transfer_stability_gate: f64,

    /// Slow-table size above which stale entries are forgotten.
    pub long_term_capacity: usize,

    /// Fraction of stale slow-table entries deleted per forgetting pass.
    pub forget_fraction: f64,

    /// Seed for the agent's generator. None draws from entropy.
    pub seed: Option<u64>,
}

impl ReflectionConfig {
    /// Same config with a fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            tunables: Tunables::default(),
            replay_capacity: 1000,
            replay_batch_size: 32,
            min_priority: 0.01,
            success_reward_threshold: 1.0,
            reflection_interval: 5,
            reflection_interval_after_change: 3,
            history_len: 10,
            wall_refresh_interval: 20,
            wall_age_threshold: 50,
            wall_forget_probability: 0.2,
            stability_decay: 0.8,
            stability_growth: 1.02,
            stability_floor: 0.5,
            stability_threshold: 0.6,
            change_cooldown: 30,
            outcome_history_len: 3,
            reward_tolerance: 0.5,
            wall_clear_fraction: 0.4,
            priority_decay_fraction: 0.5,
            fast_soften_fraction: 0.2,
            change_epsilon_boost: 0.2,
            change_memory_balance: 0.7,
            transfer_stability_gate: 0.6,
            long_term_capacity: 800,
            forget_fraction: 0.15,
            seed: None,
        }
    }
}
