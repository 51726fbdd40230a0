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

//! Prioritized experience replay.
//!
//! Priorities live in a vector parallel to the transitions. Eviction and sampling are linear
//! scans, which is fine at a capacity of around a thousand.

use dynamic_maze::{Rng, Transition};
use tracing::debug;

/// Bounded buffer of transitions with sampling weights.
#[derive(Debug, Clone)]
pub struct PrioritizedReplay {
    transitions: Vec<Transition>,
    priorities: Vec<f64>,
    capacity: usize,
}

impl PrioritizedReplay {
    /// Create an empty buffer.
    pub fn new(capacity: usize) -> Self {
        Self {
            transitions: Vec::with_capacity(capacity),
            priorities: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a transition. A full buffer replaces its lowest-priority entry.
    pub fn push(&mut self, transition: Transition, priority: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.transitions.len() < self.capacity {
            self.transitions.push(transition);
            self.priorities.push(priority);
            return;
        }
        if let Some(lowest) = self.lowest_priority_index() {
            self.transitions[lowest] = transition;
            self.priorities[lowest] = priority;
        }
    }

    fn lowest_priority_index(&self) -> Option<usize> {
        self.priorities
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }

    /// Indices of up to `amount` distinct entries, drawn with probability proportional to
    /// priority.
    pub fn sample(&self, rng: &mut Rng, amount: usize) -> Vec<usize> {
        let amount = amount.min(self.transitions.len());
        if amount == 0 {
            return Vec::new();
        }
        match rand::seq::index::sample_weighted(
            rng,
            self.priorities.len(),
            |i| self.priorities[i],
            amount,
        ) {
            Ok(indices) => indices.into_vec(),
            Err(err) => {
                debug!(%err, "replay sampling failed, skipping batch");
                Vec::new()
            }
        }
    }

    /// Transition at an index.
    pub fn get(&self, index: usize) -> Option<&Transition> {
        self.transitions.get(index)
    }

    /// Priority at an index.
    pub fn priority(&self, index: usize) -> Option<f64> {
        self.priorities.get(index).copied()
    }

    /// Overwrite a priority. Out of range indices are ignored.
    pub fn set_priority(&mut self, index: usize, priority: f64) {
        if let Some(p) = self.priorities.get_mut(index) {
            *p = priority;
        }
    }

    /// Multiply the priorities of a random `fraction` of entries by `factor`, at least one entry
    /// if any exist. Returns how many were scaled.
    pub fn scale_random(&mut self, rng: &mut Rng, fraction: f64, factor: f64) -> usize {
        let len = self.priorities.len();
        if len == 0 {
            return 0;
        }
        let count = ((len as f64 * fraction) as usize).clamp(1, len);
        for i in rand::seq::index::sample(rng, len, count) {
            self.priorities[i] *= factor;
        }
        count
    }

    /// Number of stored transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Nothing stored.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}
