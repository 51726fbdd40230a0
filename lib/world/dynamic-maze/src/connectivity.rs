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

//! Connectivity oracle.
//!
//! Breadth-first search over free cells using the four unit moves. The grid world uses it to
//! validate and repair mutations, and learners use the hop count to judge how well they are doing.

use std::collections::VecDeque;

use crate::{Action, Grid, Position};

/// BFS hop count from `from` to `to`, or None if `to` cannot be reached.
///
/// The start cell itself is not required to be free; the agent may be standing on a cell that a
/// caller has just blocked. Every other cell on the path must be free and in bounds.
pub fn shortest_path_length(grid: &Grid, from: Position, to: Position) -> Option<u32> {
    if !grid.in_bounds(from) || !grid.in_bounds(to) {
        return None;
    }
    if from == to {
        return Some(0);
    }

    let size = grid.size();
    let mut visited = vec![false; size * size];
    let mut queue: VecDeque<(Position, u32)> = VecDeque::new();
    visited[from.row as usize * size + from.col as usize] = true;
    queue.push_back((from, 0));

    while let Some((current, distance)) = queue.pop_front() {
        for action in Action::ALL {
            let next = current.offset(action);
            if !grid.is_free(next) {
                continue;
            }
            let i = next.row as usize * size + next.col as usize;
            if visited[i] {
                continue;
            }
            if next == to {
                return Some(distance + 1);
            }
            visited[i] = true;
            queue.push_back((next, distance + 1));
        }
    }
    None
}

/// Whether any path of free cells joins the two positions.
pub fn is_reachable(grid: &Grid, from: Position, to: Position) -> bool {
    shortest_path_length(grid, from, to).is_some()
}

/// Whether at least one of the four moves from `pos` lands on a free, in-bounds cell.
pub fn has_valid_move(grid: &Grid, pos: Position) -> bool {
    Action::ALL
        .iter()
        .any(|action| grid.is_free(pos.offset(*action)))
}
