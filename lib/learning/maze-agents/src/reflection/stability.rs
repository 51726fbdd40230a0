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

//! Is the maze still behaving the way it did?
//!
//! Every (state, action) pair remembers its last few outcomes. A new outcome that disagrees with
//! any of them is evidence that the maze changed, and pulls the stability estimate down.

use std::collections::VecDeque;

use dynamic_maze::{Action, Position};

use crate::{push_bounded, HashMap};

/// How a new outcome compares with the remembered ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Nothing remembered for this pair yet.
    FirstVisit,

    /// Agrees with every remembered outcome.
    Consistent,

    /// Disagrees with at least one remembered outcome.
    Inconsistent,
}

/// Scalar in `[floor, 1.0]`, starting at 1.0.
#[derive(Debug, Clone)]
pub struct StabilityEstimate {
    value: f64,
    decay: f64,
    growth: f64,
    floor: f64,
}

impl StabilityEstimate {
    /// `decay` should be below 1 and `growth` above 1.
    pub fn new(decay: f64, growth: f64, floor: f64) -> Self {
        Self {
            value: 1.0,
            decay,
            growth,
            floor,
        }
    }

    /// Current estimate.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Fold in one comparison result. First visits carry no evidence.
    pub fn observe(&mut self, consistency: Consistency) {
        match consistency {
            Consistency::Inconsistent => self.value = (self.value * self.decay).max(self.floor),
            Consistency::Consistent => self.value = (self.value * self.growth).min(1.0),
            Consistency::FirstVisit => {}
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    next_state: Position,
    reward: f64,
}

/// Last few outcomes per (state, action).
#[derive(Debug, Clone)]
pub struct OutcomeHistory {
    outcomes: HashMap<(Position, Action), VecDeque<Outcome>>,
    capacity: usize,
    reward_tolerance: f64,
}

impl OutcomeHistory {
    /// Remember up to `capacity` outcomes per pair.
    pub fn new(capacity: usize, reward_tolerance: f64) -> Self {
        Self {
            outcomes: HashMap::default(),
            capacity,
            reward_tolerance,
        }
    }

    /// Compare an outcome against the remembered ones, then remember it.
    pub fn record(
        &mut self,
        state: Position,
        action: Action,
        next_state: Position,
        reward: f64,
    ) -> Consistency {
        let history = self.outcomes.entry((state, action)).or_default();
        let consistency = if history.is_empty() {
            Consistency::FirstVisit
        } else if history.iter().any(|o| {
            o.next_state != next_state || (o.reward - reward).abs() > self.reward_tolerance
        }) {
            Consistency::Inconsistent
        } else {
            Consistency::Consistent
        };
        push_bounded(history, Outcome { next_state, reward }, self.capacity);
        consistency
    }

    /// Number of (state, action) pairs seen.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// No pairs seen yet.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    use super::*;

    fn history() -> OutcomeHistory {
        OutcomeHistory::new(3, 0.5)
    }

    #[test]
    fn test_first_then_consistent() {
        let mut h = history();
        let s = Position::new(1, 1);
        let n = Position::new(1, 2);
        assert_eq!(h.record(s, Action::Right, n, -0.1), Consistency::FirstVisit);
        assert_eq!(h.record(s, Action::Right, n, 0.2), Consistency::Consistent);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_different_next_state_is_inconsistent() {
        let mut h = history();
        let s = Position::new(1, 1);
        h.record(s, Action::Right, Position::new(1, 2), -0.1);
        assert_eq!(
            h.record(s, Action::Right, s, -0.1),
            Consistency::Inconsistent
        );
    }

    #[test]
    fn test_reward_gap_beyond_tolerance_is_inconsistent() {
        let mut h = history();
        let s = Position::new(0, 0);
        let n = Position::new(1, 0);
        h.record(s, Action::Down, n, 0.9);
        assert_eq!(h.record(s, Action::Down, n, 0.5), Consistency::Consistent);
        assert_eq!(h.record(s, Action::Down, n, -1.1), Consistency::Inconsistent);
    }

    #[test]
    fn test_old_outcomes_fall_out_of_the_window() {
        let mut h = history();
        let s = Position::new(2, 2);
        h.record(s, Action::Up, s, -1.0);
        for _ in 0..3 {
            h.record(s, Action::Up, Position::new(1, 2), 0.9);
        }
        assert_eq!(
            h.record(s, Action::Up, Position::new(1, 2), 0.9),
            Consistency::Consistent
        );
    }

    #[test]
    fn test_stability_is_floored_and_capped() {
        let mut est = StabilityEstimate::new(0.8, 1.02, 0.5);
        est.observe(Consistency::Consistent);
        assert_abs_diff_eq!(est.value(), 1.0);
        for _ in 0..20 {
            est.observe(Consistency::Inconsistent);
        }
        assert_abs_diff_eq!(est.value(), 0.5);
        est.observe(Consistency::FirstVisit);
        assert_abs_diff_eq!(est.value(), 0.5);
    }

    proptest! {
        #[test]
        fn test_repeated_identical_outcomes_never_lower_stability(
            repeats in 1..50usize,
            reward in -2.0..10.0f64,
            prior_inconsistencies in 0..3usize,
        ) {
            let mut est = StabilityEstimate::new(0.8, 1.02, 0.5);
            for _ in 0..prior_inconsistencies {
                est.observe(Consistency::Inconsistent);
            }
            let mut h = history();
            let s = Position::new(3, 3);
            let n = Position::new(3, 4);
            for _ in 0..repeats {
                let before = est.value();
                est.observe(h.record(s, Action::Right, n, reward));
                prop_assert!(est.value() >= before);
            }
        }

        #[test]
        fn test_inconsistent_outcome_strictly_lowers_stability(
            consistent_steps in 0..10usize,
        ) {
            let mut est = StabilityEstimate::new(0.8, 1.02, 0.5);
            let mut h = history();
            let s = Position::new(0, 1);
            let n = Position::new(0, 2);
            for _ in 0..=consistent_steps {
                est.observe(h.record(s, Action::Right, n, -0.1));
            }
            let before = est.value();
            est.observe(h.record(s, Action::Right, s, -1.0));
            prop_assert!(est.value() < before);
        }
    }
}
