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

//! Moving knowledge from the fast table into the slow one, and pruning the slow one.

use dynamic_maze::{Position, ACTION_COUNT};
use tracing::debug;

use super::ReflectionAgent;
use crate::q_table::max_of;

const MIN_TRANSFER_VISITS: u32 = 3;
const TRANSFER_VISITS_PER_STABILITY: f64 = 5.0;
const MIN_TRANSFER_VALUE: f64 = 0.3;
const TRANSFER_VALUE_PER_STABILITY: f64 = 0.35;
const TRANSFER_RATIO_PER_STABILITY: f64 = 0.35;
const MAX_TRANSFER_RATIO: f64 = 0.4;

/// Weight of the existing slow value when blending.
const SLOW_RETENTION: f64 = 0.6;

/// Slow entries visited fewer times than this and worth less than `STALE_VALUE` are stale.
const STALE_VISITS: u32 = 3;
const STALE_VALUE: f64 = 0.25;

impl ReflectionAgent {
    /// Copy or blend the most valuable well-visited fast-table states into the slow table. The
    /// bar for candidates and the share that moves both rise with stability. Returns how many
    /// states moved.
    pub fn transfer_knowledge(&mut self) -> usize {
        let stability = self.stability.value();
        let visit_threshold =
            ((TRANSFER_VISITS_PER_STABILITY * stability) as u32).max(MIN_TRANSFER_VISITS);
        let value_threshold = (TRANSFER_VALUE_PER_STABILITY * stability).max(MIN_TRANSFER_VALUE);
        let ratio = (TRANSFER_RATIO_PER_STABILITY * (1.0 + stability)).min(MAX_TRANSFER_RATIO);

        let mut candidates: Vec<(Position, f64)> = self
            .fast
            .states()
            .into_iter()
            .filter(|s| self.visits(*s) > visit_threshold)
            .map(|s| (s, self.fast.max_value(s)))
            .filter(|(_, value)| *value > value_threshold)
            .collect();

        let mut moved = 0;
        if !candidates.is_empty() {
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            let count = ((candidates.len() as f64 * ratio) as usize).max(1);
            for (state, _) in candidates.into_iter().take(count) {
                let fast = self.fast.values(state);
                let blended = match self.slow.get(state) {
                    Some(slow) => std::array::from_fn::<f64, ACTION_COUNT, _>(|i| {
                        SLOW_RETENTION * slow[i] + (1.0 - SLOW_RETENTION) * fast[i]
                    }),
                    None => fast,
                };
                self.slow.insert(state, blended);
                moved += 1;
            }
        }

        let forgotten = self.forget_outdated_knowledge();
        if moved > 0 || forgotten > 0 {
            debug!(
                stability,
                moved,
                forgotten,
                slow_states = self.slow.len(),
                "consolidated knowledge"
            );
        }
        moved
    }

    /// Once the slow table is over capacity, delete the lowest-valued share of its rarely
    /// visited, low-valued entries. Returns how many were deleted.
    pub fn forget_outdated_knowledge(&mut self) -> usize {
        if self.slow.len() <= self.config.long_term_capacity {
            return 0;
        }
        let mut stale: Vec<(Position, f64)> = self
            .slow
            .states()
            .into_iter()
            .filter(|s| self.visits(*s) < STALE_VISITS)
            .map(|s| (s, max_of(&self.slow.values(s))))
            .filter(|(_, value)| *value < STALE_VALUE)
            .collect();
        if stale.is_empty() {
            return 0;
        }
        stale.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        let count = ((stale.len() as f64 * self.config.forget_fraction) as usize).max(1);
        for (state, _) in stale.iter().take(count) {
            self.slow.remove(*state);
        }
        count.min(stale.len())
    }
}
