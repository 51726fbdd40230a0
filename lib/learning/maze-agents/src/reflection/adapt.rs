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

//! Self-evaluation and the two adaptation reactions: one to poor recent performance, one to a
//! detected change in the maze.

use dynamic_maze::{Position, Transition};
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info};

use super::{ReflectionAgent, ReflectionRecord};
use crate::mean;

const PROGRESS_WEIGHT: f64 = 0.5;
const TERMINAL_WEIGHT: f64 = 0.3;
const REWARD_WEIGHT: f64 = 0.2;

/// Exploration is not pushed above this by strategy adaptation.
const MAX_ADAPTIVE_EPSILON: f64 = 0.8;
/// Exploration is not pushed above this by a detected change.
const MAX_CHANGE_EPSILON: f64 = 0.9;
const STALLED_EPSILON_STEP: f64 = 0.05;
const PROGRESS_EPSILON_DECAY: f64 = 0.995;

/// Still this far from the goal after a poor window: learn faster.
const FAR_FROM_GOAL: i32 = 5;
const LEARNING_RATE_STEP: f64 = 0.05;
const MAX_ADAPTIVE_LEARNING_RATE: f64 = 0.7;

/// Mean recent reward below this adds extra exploration, scaled by how bad it is.
const POOR_REWARD: f64 = -0.5;
const MIN_REWARD_EPSILON_BOOST: f64 = 0.05;
const MAX_REWARD_EPSILON_BOOST: f64 = 0.15;

const LOW_CONFIDENCE_DECAY_FRACTION: f64 = 0.05;
const MIN_DECAYED_STATES: usize = 3;
const MAX_DECAYED_STATES: usize = 5;
/// Visits a state needs before it is preferred for low-confidence decay.
const FREQUENT_VISITS: u32 = 2;
const LOW_CONFIDENCE_FACTOR: f64 = 0.5;

/// Softened fast-table entries keep this share of their value.
const SOFTEN_FACTOR: f64 = 0.8;
const REPLAY_DECAY_FACTOR: f64 = 0.5;

/// Result of one self-evaluation window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReflectionSummary {
    /// Net reduction in Manhattan distance to the goal across the window.
    pub progress: i32,

    /// Distance to the goal at the end of the window.
    pub distance_to_goal: i32,

    /// Fraction of the window's transitions that ended an episode.
    pub terminal_rate: f64,

    /// Mean reward across the window.
    pub mean_reward: f64,

    /// Weighted performance score, never negative.
    pub score: f64,

    /// The score fell below the adaptation threshold.
    pub adapted: bool,

    /// Stability was high enough to consolidate into the slow table.
    pub transferred: bool,
}

fn summarize(records: &[ReflectionRecord], goal: Position) -> (i32, i32, f64, f64) {
    let distance = |r: &ReflectionRecord| r.state.manhattan_distance(&goal);
    let progress: i32 = records
        .windows(2)
        .map(|w| distance(&w[0]) - distance(&w[1]))
        .sum();
    let distance_to_goal = records.last().map(distance).unwrap_or(0);
    let n = records.len().max(1) as f64;
    let terminal_rate = records.iter().filter(|r| r.terminal).count() as f64 / n;
    let mean_reward = records.iter().map(|r| r.reward).sum::<f64>() / n;
    (progress, distance_to_goal, terminal_rate, mean_reward)
}

impl ReflectionAgent {
    /// Buffer the transition and, once a full window has accumulated, score it. A poor score
    /// triggers strategy adaptation; high stability triggers consolidation. The window is cleared
    /// either way. Nothing happens until a goal is known.
    pub(super) fn reflect(&mut self, transition: &Transition) -> Option<ReflectionSummary> {
        let goal = self.goal?;
        self.reflection_buffer.push(ReflectionRecord {
            state: transition.state,
            reward: transition.reward,
            terminal: transition.terminal,
        });
        if self.reflection_buffer.len() < self.reflection_interval {
            return None;
        }

        let (progress, distance_to_goal, terminal_rate, mean_reward) =
            summarize(&self.reflection_buffer, goal);
        let n = self.reflection_buffer.len() as f64;
        let score = (PROGRESS_WEIGHT * f64::from(progress) / n
            + TERMINAL_WEIGHT * terminal_rate
            + REWARD_WEIGHT * mean_reward)
            .max(0.0);

        let adapted = score < self.tunables.adaptation_threshold;
        if adapted {
            self.adapt_strategy(progress, distance_to_goal);
        }
        let transferred = self.stability.value() > self.config.transfer_stability_gate;
        if transferred {
            self.transfer_knowledge();
        }
        self.reflection_buffer.clear();

        let summary = ReflectionSummary {
            progress,
            distance_to_goal,
            terminal_rate,
            mean_reward,
            score,
            adapted,
            transferred,
        };
        self.last_reflection = Some(summary.clone());
        Some(summary)
    }

    /// React to a poor window: explore more when stalled, learn faster when far away, explore
    /// more again when rewards have been bad, and partly unlearn frequently visited states when
    /// confidence is low.
    pub(super) fn adapt_strategy(&mut self, progress: i32, distance_to_goal: i32) {
        let t = &mut self.tunables;
        if progress <= 0 {
            t.epsilon = (t.epsilon + STALLED_EPSILON_STEP).min(MAX_ADAPTIVE_EPSILON);
        } else {
            t.epsilon = (t.epsilon * PROGRESS_EPSILON_DECAY).max(t.epsilon_min);
        }
        if distance_to_goal > FAR_FROM_GOAL {
            t.learning_rate = (t.learning_rate + LEARNING_RATE_STEP).min(MAX_ADAPTIVE_LEARNING_RATE);
        }

        if let Some(avg_reward) = mean(&self.recent_rewards) {
            if avg_reward < POOR_REWARD {
                let boost = (avg_reward.abs() * 0.1)
                    .clamp(MIN_REWARD_EPSILON_BOOST, MAX_REWARD_EPSILON_BOOST);
                let t = &mut self.tunables;
                t.epsilon = (t.epsilon + boost).min(MAX_ADAPTIVE_EPSILON);
            }
        }

        if let Some(avg_confidence) = mean(&self.recent_confidences) {
            if avg_confidence < self.tunables.confidence_threshold {
                let decayed = self.decay_low_confidence_states();
                debug!(avg_confidence, decayed, "decayed low-confidence states");
            }
        }
        debug!(
            progress,
            distance_to_goal,
            epsilon = self.tunables.epsilon,
            learning_rate = self.tunables.learning_rate,
            "adapted strategy"
        );
    }

    /// Halve the fast-table values of a few states, preferring ones visited more than a couple
    /// of times. Returns how many states were touched.
    fn decay_low_confidence_states(&mut self) -> usize {
        if self.fast.is_empty() {
            return 0;
        }
        let states = self.fast.states();
        let count = ((states.len() as f64 * LOW_CONFIDENCE_DECAY_FRACTION) as usize)
            .clamp(MIN_DECAYED_STATES, MAX_DECAYED_STATES);
        let frequent: Vec<Position> = states
            .iter()
            .copied()
            .filter(|s| self.visits(*s) > FREQUENT_VISITS)
            .collect();
        let pool = if frequent.len() >= count {
            &frequent
        } else {
            &states
        };
        let chosen: Vec<Position> = pool.choose_multiple(&mut self.rng, count).copied().collect();
        for state in &chosen {
            self.fast.scale(*state, LOW_CONFIDENCE_FACTOR);
        }
        chosen.len()
    }

    /// React to a detected change: explore more, distrust remembered walls and old experience,
    /// evaluate more often, lean on the fast table, and soften part of it.
    pub(super) fn adapt_to_environment_change(&mut self) {
        let t = &mut self.tunables;
        t.epsilon = (t.epsilon + self.config.change_epsilon_boost).min(MAX_CHANGE_EPSILON);

        let walls_cleared = self
            .walls
            .forget_random_states(&mut self.rng, self.config.wall_clear_fraction);
        let priorities_decayed = self.replay.scale_random(
            &mut self.rng,
            self.config.priority_decay_fraction,
            REPLAY_DECAY_FACTOR,
        );
        self.reflection_interval = self.config.reflection_interval_after_change;
        self.memory_balance = self.config.change_memory_balance;
        let softened = self.soften_fast_table();

        info!(
            step = self.learning_steps,
            stability = self.stability.value(),
            epsilon = self.tunables.epsilon,
            walls_cleared,
            priorities_decayed,
            softened,
            "environment change detected, adapting"
        );
    }

    /// Pull a sampled fraction of fast-table entries part of the way towards zero.
    fn soften_fast_table(&mut self) -> usize {
        if self.fast.is_empty() {
            return 0;
        }
        let states = self.fast.states();
        let count = ((states.len() as f64 * self.config.fast_soften_fraction) as usize).max(1);
        let chosen: Vec<Position> = states
            .choose_multiple(&mut self.rng, count)
            .copied()
            .collect();
        for state in &chosen {
            self.fast.scale(*state, SOFTEN_FACTOR);
        }
        chosen.len()
    }
}
