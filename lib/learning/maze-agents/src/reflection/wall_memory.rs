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

//! Moves the agent has bumped into a wall with, and how long ago.

use dynamic_maze::{Action, Position, Rng, ACTION_COUNT};
use rand::seq::SliceRandom;
use rand::Rng as _;

use crate::HashMap;

/// Per-state ages of blocked actions, indexed by [`Action::index`]. None means not blocked.
pub type WallAges = [Option<u32>; ACTION_COUNT];

/// A state is only present while at least one of its actions is marked blocked.
#[derive(Debug, Clone, Default)]
pub struct WallMemory {
    walls: HashMap<Position, WallAges>,
}

impl WallMemory {
    /// Create an empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an action blocked at a state, resetting its age to zero.
    pub fn mark_blocked(&mut self, state: Position, action: Action) {
        self.walls.entry(state).or_insert([None; ACTION_COUNT])[action.index()] = Some(0);
    }

    /// Whether the action is currently believed blocked.
    pub fn is_blocked(&self, state: Position, action: Action) -> bool {
        self.age(state, action).is_some()
    }

    /// Steps since the wall was last confirmed, in refresh ticks.
    pub fn age(&self, state: Position, action: Action) -> Option<u32> {
        self.walls
            .get(&state)
            .and_then(|ages| ages[action.index()])
    }

    /// Age every entry by one. Entries older than `age_threshold` are each forgotten with
    /// `forget_probability`, and states left without walls are dropped. Returns how many entries
    /// were forgotten.
    pub fn refresh(&mut self, rng: &mut Rng, age_threshold: u32, forget_probability: f64) -> usize {
        let p = forget_probability.clamp(0.0, 1.0);
        let mut forgotten = 0;
        self.walls.retain(|_, ages| {
            for slot in ages.iter_mut() {
                if let Some(age) = slot {
                    *age += 1;
                    if *age > age_threshold && rng.gen_bool(p) {
                        *slot = None;
                        forgotten += 1;
                    }
                }
            }
            ages.iter().any(Option::is_some)
        });
        forgotten
    }

    /// Drop every wall of a random `fraction` of states, at least one state if any exist.
    /// Returns how many states were dropped.
    pub fn forget_random_states(&mut self, rng: &mut Rng, fraction: f64) -> usize {
        if self.walls.is_empty() {
            return 0;
        }
        let mut states: Vec<Position> = self.walls.keys().copied().collect();
        states.sort_unstable();
        let count = ((states.len() as f64 * fraction) as usize).max(1);
        let chosen: Vec<Position> = states.choose_multiple(rng, count).copied().collect();
        for state in &chosen {
            self.walls.remove(state);
        }
        chosen.len()
    }

    /// Number of states with at least one wall.
    pub fn len(&self) -> usize {
        self.walls.len()
    }

    /// No walls remembered.
    pub fn is_empty(&self) -> bool {
        self.walls.is_empty()
    }

    /// Total number of blocked (state, action) entries.
    pub fn wall_count(&self) -> usize {
        self.walls
            .values()
            .map(|ages| ages.iter().filter(|a| a.is_some()).count())
            .sum()
    }
}
