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

//! Lazily initialised action-value table.

use dynamic_maze::{Action, Position, ACTION_COUNT};

use crate::HashMap;

/// One value per action, indexed by [`Action::index`].
pub type QValues = [f64; ACTION_COUNT];

/// Maps positions to action values. Positions never seen before read as all zeros.
#[derive(Debug, Clone, Default)]
pub struct QTable {
    values: HashMap<Position, QValues>,
}

impl QTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Values for a state, inserting zeros if the state is new.
    pub fn entry(&mut self, state: Position) -> &mut QValues {
        self.values.entry(state).or_insert([0.0; ACTION_COUNT])
    }

    /// Values for a state if it has an entry.
    pub fn get(&self, state: Position) -> Option<&QValues> {
        self.values.get(&state)
    }

    /// Copy of the values for a state, zeros if the state is new. Does not insert.
    pub fn values(&self, state: Position) -> QValues {
        self.values
            .get(&state)
            .copied()
            .unwrap_or([0.0; ACTION_COUNT])
    }

    /// Highest action value for a state, zero if the state is new.
    pub fn max_value(&self, state: Position) -> f64 {
        max_of(&self.values(state))
    }

    /// Move one action value towards `target` by `alpha`, returning `(old, new)`.
    pub fn update(&mut self, state: Position, action: Action, target: f64, alpha: f64) -> (f64, f64) {
        let slot = &mut self.entry(state)[action.index()];
        let old = *slot;
        *slot = (1.0 - alpha) * old + alpha * target;
        (old, *slot)
    }

    /// Multiply every value of a state by `factor`. Missing states are left alone.
    pub fn scale(&mut self, state: Position, factor: f64) {
        if let Some(values) = self.values.get_mut(&state) {
            for v in values.iter_mut() {
                *v *= factor;
            }
        }
    }

    /// Overwrite the values of a state.
    pub fn insert(&mut self, state: Position, values: QValues) {
        self.values.insert(state, values);
    }

    /// Drop a state.
    pub fn remove(&mut self, state: Position) -> Option<QValues> {
        self.values.remove(&state)
    }

    /// Whether a state has an entry.
    pub fn contains(&self, state: Position) -> bool {
        self.values.contains_key(&state)
    }

    /// Number of states with an entry.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// No states yet.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// States with an entry, sorted, so that random choices over them are reproducible.
    pub fn states(&self) -> Vec<Position> {
        let mut states: Vec<Position> = self.values.keys().copied().collect();
        states.sort_unstable();
        states
    }

    /// Iterate over every entry, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Position, &QValues)> {
        self.values.iter()
    }
}

/// Largest of the action values.
pub fn max_of(values: &QValues) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Action with the largest value. Ties go to the first action in [`Action::ALL`] order.
pub fn greedy_action(values: &QValues) -> Action {
    let mut best = Action::ALL[0];
    let mut best_value = f64::NEG_INFINITY;
    for action in Action::ALL {
        let v = values[action.index()];
        if v > best_value {
            best = action;
            best_value = v;
        }
    }
    best
}
