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

//! Per-episode measurements and the per-agent report built from them.

use serde::{Deserialize, Serialize};

/// What happened in one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetrics {
    /// Zero-based episode index.
    pub episode: usize,
    /// Steps taken, at most the maze's step budget.
    pub steps: u32,
    /// The agent reached the goal.
    pub success: bool,
    /// Sum of rewards over the episode.
    pub cumulative_reward: f64,

    /// Shortest path at reset divided by steps taken. Zero for failed episodes.
    pub path_efficiency: f64,

    /// Shortest path from start to goal at reset.
    pub optimal_path_length: Option<u32>,
    /// Grid mutations during the episode.
    pub environment_updates: u32,
    /// Times the goal moved.
    pub goal_changes: u32,
    /// Cells flipped by mutations.
    pub obstacle_changes: u32,
    /// Cells opened by connectivity repair.
    pub cells_repaired: u32,

    /// `1 / (1 + mean |r_t - r_{t-1}|)` over the episode's rewards.
    pub reward_stability: f64,
}

/// `1 / (1 + mean absolute change between consecutive rewards)`. Episodes with fewer than two
/// rewards have no changes to measure and score zero.
pub fn reward_stability(rewards: &[f64]) -> f64 {
    if rewards.len() < 2 {
        return 0.0;
    }
    let total: f64 = rewards.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    let mean_change = total / (rewards.len() - 1) as f64;
    1.0 / (1.0 + mean_change)
}

/// Every episode of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    /// Agent name.
    pub agent: String,
    /// Episodes in play order.
    pub episodes: Vec<EpisodeMetrics>,
}

fn mean_of<I: Iterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

impl ExperimentReport {
    /// Empty report for an agent.
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            episodes: Vec::new(),
        }
    }

    /// Append an episode.
    pub fn push(&mut self, metrics: EpisodeMetrics) {
        self.episodes.push(metrics);
    }

    /// Number of episodes.
    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    /// No episodes yet.
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Episodes that reached the goal.
    pub fn successes(&self) -> usize {
        self.episodes.iter().filter(|e| e.success).count()
    }

    /// Fraction of all episodes that reached the goal, zero when there are none.
    pub fn success_rate(&self) -> f64 {
        mean_of(self.episodes.iter().map(|e| f64::from(u8::from(e.success))))
    }

    /// Success rate over the last `window` episodes (fewer if fewer have run). Always in `[0, 1]`;
    /// zero when there are no episodes or the window is empty.
    pub fn rolling_success_rate(&self, window: usize) -> f64 {
        let start = self.episodes.len().saturating_sub(window);
        mean_of(
            self.episodes[start..]
                .iter()
                .map(|e| f64::from(u8::from(e.success))),
        )
    }

    /// Mean steps per episode.
    pub fn mean_steps(&self) -> f64 {
        mean_of(self.episodes.iter().map(|e| f64::from(e.steps)))
    }

    /// Mean cumulative reward.
    pub fn mean_reward(&self) -> f64 {
        mean_of(self.episodes.iter().map(|e| e.cumulative_reward))
    }

    /// Mean path efficiency, failures counting as zero.
    pub fn mean_path_efficiency(&self) -> f64 {
        mean_of(self.episodes.iter().map(|e| e.path_efficiency))
    }

    /// Mean reward stability.
    pub fn mean_reward_stability(&self) -> f64 {
        mean_of(self.episodes.iter().map(|e| e.reward_stability))
    }

    /// Grid mutations over all episodes.
    pub fn total_environment_updates(&self) -> u64 {
        self.episodes
            .iter()
            .map(|e| u64::from(e.environment_updates))
            .sum()
    }
}

impl std::fmt::Display for ExperimentReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<12} episodes {:>4}  success {:>5.1}%  steps {:>6.1}  reward {:>8.2}  efficiency {:.3}  stability {:.3}",
            self.agent,
            self.len(),
            self.success_rate() * 100.0,
            self.mean_steps(),
            self.mean_reward(),
            self.mean_path_efficiency(),
            self.mean_reward_stability(),
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    use super::*;

    fn episode(episode: usize, success: bool, steps: u32) -> EpisodeMetrics {
        EpisodeMetrics {
            episode,
            steps,
            success,
            cumulative_reward: if success { 9.0 } else { -20.0 },
            path_efficiency: if success { 10.0 / f64::from(steps) } else { 0.0 },
            optimal_path_length: Some(10),
            environment_updates: steps / 18,
            goal_changes: 0,
            obstacle_changes: 2 * (steps / 18),
            cells_repaired: 0,
            reward_stability: 0.5,
        }
    }

    #[test]
    fn test_reward_stability() {
        assert_abs_diff_eq!(reward_stability(&[]), 0.0);
        assert_abs_diff_eq!(reward_stability(&[1.0]), 0.0);
        assert_abs_diff_eq!(reward_stability(&[0.9, 0.9, 0.9]), 1.0);
        assert_abs_diff_eq!(reward_stability(&[0.9, -1.1, 0.9]), 1.0 / 3.0);
    }

    #[test]
    fn test_empty_report_is_all_zero() {
        let report = ExperimentReport::new("empty");
        assert_abs_diff_eq!(report.success_rate(), 0.0);
        assert_abs_diff_eq!(report.rolling_success_rate(10), 0.0);
        assert_abs_diff_eq!(report.mean_steps(), 0.0);
    }

    #[test]
    fn test_rolling_success_rate_uses_the_tail() {
        let mut report = ExperimentReport::new("reflection");
        for i in 0..20 {
            report.push(episode(i, i >= 15, 40));
        }
        assert_abs_diff_eq!(report.success_rate(), 0.25);
        assert_abs_diff_eq!(report.rolling_success_rate(10), 0.5);
        assert_abs_diff_eq!(report.rolling_success_rate(5), 1.0);
        assert_abs_diff_eq!(report.rolling_success_rate(100), 0.25);
        assert_abs_diff_eq!(report.rolling_success_rate(0), 0.0);
        assert_eq!(report.successes(), 5);
        assert_eq!(report.total_environment_updates(), 40);
    }

    #[test]
    fn test_report_serializes() {
        let mut report = ExperimentReport::new("baseline");
        report.push(episode(0, true, 20));
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"agent\":\"baseline\""));
        assert!(json.contains("\"path_efficiency\":0.5"));
    }

    proptest! {
        #[test]
        fn test_rolling_success_rate_in_unit_interval(
            outcomes in proptest::collection::vec(any::<bool>(), 0..60),
            window in 0..30usize,
        ) {
            let mut report = ExperimentReport::new("p");
            for (i, success) in outcomes.into_iter().enumerate() {
                report.push(episode(i, success, 30));
            }
            let rate = report.rolling_success_rate(window);
            prop_assert!((0.0..=1.0).contains(&rate));
        }

        #[test]
        fn test_reward_stability_in_unit_interval(
            rewards in proptest::collection::vec(-1.0..10.0f64, 0..50),
        ) {
            let s = reward_stability(&rewards);
            prop_assert!(s >= 0.0 && s <= 1.0);
        }
    }
}
