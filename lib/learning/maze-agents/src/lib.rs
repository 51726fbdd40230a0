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

//! Tabular learners for the dynamic maze.
//!
//! Two learners share one interface: a plain Q-learner with uniform experience replay, and a
//! reflection agent that keeps a fast and a slow Q-table, watches for the maze changing under it,
//! and reallocates exploration and learning effort when it does.

use std::collections::VecDeque;

use dynamic_maze::{Action, Position, Rng, Transition};
use rand::SeedableRng;

pub mod baseline;
pub mod q_table;
pub mod reflection;

pub use baseline::{BaselineAgent, BaselineConfig};
pub use q_table::{QTable, QValues};
pub use reflection::{ReflectionAgent, ReflectionConfig, Tunables};

/// Tables are keyed by small integer positions, so a fast non-cryptographic hasher is fine.
pub type HashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// An Agent picks an action for the position it is in, and learns from the transition that
/// followed.
///
/// Notice that the Agent is not aware of the environment. The caller runs the loop and hands it
/// the elapsed step count and the current shortest path length alongside each transition.
pub trait Agent {
    /// Choose the next move.
    fn select_action(&mut self, state: Position) -> Action;

    /// Learn from one transition. `shortest_path` is None when the goal is unreachable.
    fn learn(&mut self, transition: &Transition, elapsed_steps: u32, shortest_path: Option<u32>);

    /// Tell the agent where the goal is for the current episode.
    fn set_goal(&mut self, goal: Position);
}

/// How close the agent is to an optimal run: 1.0 when it has taken no more steps than the
/// shortest path, falling linearly to 0.0 at twice the shortest path and beyond. An unknown or
/// zero-length shortest path gives 0.0.
pub fn confidence(elapsed_steps: u32, shortest_path: Option<u32>) -> f64 {
    match shortest_path {
        Some(shortest) if shortest > 0 => {
            let shortest = f64::from(shortest);
            let overshoot = f64::from(elapsed_steps) - shortest;
            (1.0 - overshoot / shortest).max(0.0)
        }
        _ => 0.0,
    }
}

pub(crate) fn new_rng(seed: Option<u64>) -> Rng {
    match seed {
        Some(seed) => Rng::seed_from_u64(seed),
        None => Rng::from_entropy(),
    }
}

pub(crate) fn push_bounded<T>(window: &mut VecDeque<T>, value: T, capacity: usize) {
    window.push_back(value);
    while window.len() > capacity {
        window.pop_front();
    }
}

pub(crate) fn mean<'a, I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_confidence_on_optimal_run() {
        assert_abs_diff_eq!(confidence(10, Some(10)), 1.0);
    }

    #[test]
    fn test_confidence_halfway_over() {
        assert_abs_diff_eq!(confidence(15, Some(10)), 0.5);
    }

    #[test]
    fn test_confidence_floors_at_zero() {
        assert_abs_diff_eq!(confidence(40, Some(10)), 0.0);
    }

    #[test]
    fn test_confidence_without_path_is_zero() {
        assert_abs_diff_eq!(confidence(10, None), 0.0);
        assert_abs_diff_eq!(confidence(10, Some(0)), 0.0);
    }

    #[test]
    fn test_push_bounded_drops_oldest() {
        let mut window = VecDeque::new();
        for i in 0..5 {
            push_bounded(&mut window, i, 3);
        }
        assert_eq!(window, VecDeque::from(vec![2, 3, 4]));
    }

    #[test]
    fn test_mean_of_nothing_is_none() {
        assert_eq!(mean(&Vec::<f64>::new()), None);
        assert_abs_diff_eq!(mean(&vec![1.0, 2.0, 6.0]).unwrap(), 3.0);
    }
}
