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

//! Drives agents through episodes.

use dynamic_maze::{DynamicMazeEnvironment, MazeError, StepOutcome, Transition};
use maze_agents::Agent;
use tracing::{debug, info};

use crate::metrics::{reward_stability, EpisodeMetrics, ExperimentReport};
use crate::{ExperimentConfig, ExperimentError};

/// Play one episode on an environment that has just been reset. `observe` sees the environment
/// after every step.
pub fn run_episode_with<A, F>(
    env: &mut DynamicMazeEnvironment,
    agent: &mut A,
    episode: usize,
    mut observe: F,
) -> Result<EpisodeMetrics, MazeError>
where
    A: Agent + ?Sized,
    F: FnMut(&DynamicMazeEnvironment, &StepOutcome),
{
    let optimal_path_length = env.optimal_path_length();
    agent.set_goal(env.goal_position());

    let mut state = env.agent_position();
    let mut rewards = Vec::with_capacity(env.config().max_steps as usize);
    let mut success = false;
    loop {
        let action = agent.select_action(state);
        let outcome = env.step(action)?;
        let transition = Transition {
            state,
            action,
            reward: outcome.reward,
            next_state: outcome.next_state,
            terminal: outcome.terminal,
        };
        agent.learn(&transition, env.steps(), env.shortest_path_length());
        observe(env, &outcome);

        rewards.push(outcome.reward);
        state = outcome.next_state;
        if outcome.terminal {
            success = outcome.info.reached_goal;
            break;
        }
    }

    let steps = env.steps();
    let path_efficiency = match optimal_path_length {
        Some(optimal) if success && steps > 0 => f64::from(optimal) / f64::from(steps),
        _ => 0.0,
    };
    let stats = env.episode_stats();
    Ok(EpisodeMetrics {
        episode,
        steps,
        success,
        cumulative_reward: stats.cumulative_reward,
        path_efficiency,
        optimal_path_length,
        environment_updates: stats.environment_updates,
        goal_changes: stats.goal_changes,
        obstacle_changes: stats.obstacle_changes,
        cells_repaired: stats.cells_repaired,
        reward_stability: reward_stability(&rewards),
    })
}

/// Play one episode on an environment that has just been reset.
pub fn run_episode<A>(
    env: &mut DynamicMazeEnvironment,
    agent: &mut A,
    episode: usize,
) -> Result<EpisodeMetrics, MazeError>
where
    A: Agent + ?Sized,
{
    run_episode_with(env, agent, episode, |_, _| {})
}

/// Run every configured episode for a single agent.
pub fn run_experiment<A: Agent>(
    config: &ExperimentConfig,
    name: &str,
    agent: &mut A,
) -> Result<ExperimentReport, ExperimentError> {
    let mut agents: [(&str, &mut dyn Agent); 1] = [(name, agent)];
    let mut reports = compare_agents(config, &mut agents)?;
    reports.pop().ok_or(ExperimentError::NoAgents)
}

/// Run several agents over the same sequence of mazes. Each episode resets one environment with
/// the episode seed and hands every agent its own copy, so agents never share live state.
pub fn compare_agents(
    config: &ExperimentConfig,
    agents: &mut [(&str, &mut dyn Agent)],
) -> Result<Vec<ExperimentReport>, ExperimentError> {
    if config.episodes == 0 {
        return Err(ExperimentError::NoEpisodes);
    }
    if agents.is_empty() {
        return Err(ExperimentError::NoAgents);
    }

    let mut env = DynamicMazeEnvironment::new(config.maze.clone())?;
    let mut reports: Vec<ExperimentReport> = agents
        .iter()
        .map(|(name, _)| ExperimentReport::new(*name))
        .collect();

    for episode in 0..config.episodes {
        let (_, reset_info) = env.reset(Some(config.episode_seed(episode)))?;
        debug!(
            episode,
            goal = %reset_info.goal,
            optimal = ?reset_info.optimal_path_length,
            "reset maze"
        );
        for ((_, agent), report) in agents.iter_mut().zip(reports.iter_mut()) {
            let mut own = env.clone();
            let metrics = run_episode(&mut own, &mut **agent, episode)?;
            report.push(metrics);
        }

        let done = episode + 1;
        if config.report_every > 0 && done % config.report_every == 0 {
            for report in &reports {
                info!(
                    agent = %report.agent,
                    episodes = done,
                    success_rate = report.success_rate(),
                    rolling_success_rate = report.rolling_success_rate(config.rolling_window),
                    mean_steps = report.mean_steps(),
                    "progress"
                );
            }
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use dynamic_maze::{Action, MazeConfig, Position};
    use maze_agents::{BaselineAgent, BaselineConfig, ReflectionAgent, ReflectionConfig};

    use super::*;

    /// Walks straight at the goal and records what it learned from.
    struct Greedy {
        goal: Position,
        seen: Vec<Transition>,
    }

    impl Agent for Greedy {
        fn select_action(&mut self, state: Position) -> Action {
            if state.row < self.goal.row {
                Action::Down
            } else if state.col < self.goal.col {
                Action::Right
            } else if state.row > self.goal.row {
                Action::Up
            } else {
                Action::Left
            }
        }

        fn learn(&mut self, transition: &Transition, _: u32, _: Option<u32>) {
            self.seen.push(*transition);
        }

        fn set_goal(&mut self, goal: Position) {
            self.goal = goal;
        }
    }

    fn open_config(episodes: usize) -> ExperimentConfig {
        ExperimentConfig::new(MazeConfig::new(6, 0.0, 1000, 50), episodes, 7)
    }

    #[test]
    fn test_greedy_agent_solves_open_maze_optimally() {
        let mut agent = Greedy {
            goal: Position::new(0, 0),
            seen: Vec::new(),
        };
        let report = run_experiment(&open_config(3), "greedy", &mut agent).unwrap();
        assert_eq!(report.len(), 3);
        for e in &report.episodes {
            assert!(e.success);
            assert_eq!(Some(e.steps), e.optimal_path_length);
            assert!((e.path_efficiency - 1.0).abs() < 1e-12);
        }
        assert_eq!(agent.seen.iter().filter(|t| t.terminal).count(), 3);
    }

    #[test]
    fn test_zero_episodes_is_an_error() {
        let mut agent = BaselineAgent::new(BaselineConfig::default().with_seed(1));
        assert_eq!(
            run_experiment(&open_config(0), "baseline", &mut agent),
            Err(ExperimentError::NoEpisodes)
        );
    }

    #[test]
    fn test_bad_maze_config_is_reported() {
        let mut agent = BaselineAgent::new(BaselineConfig::default().with_seed(1));
        let config = ExperimentConfig::new(MazeConfig::new(2, 0.0, 10, 10), 1, 0);
        assert!(matches!(
            run_experiment(&config, "baseline", &mut agent),
            Err(ExperimentError::Maze(MazeError::GridTooSmall { .. }))
        ));
    }

    #[test]
    fn test_agents_see_identical_mazes() {
        let config = ExperimentConfig::new(MazeConfig::new(8, 0.2, 10, 60), 4, 11);
        let mut first = Greedy {
            goal: Position::new(0, 0),
            seen: Vec::new(),
        };
        let mut second = Greedy {
            goal: Position::new(0, 0),
            seen: Vec::new(),
        };
        let mut agents: [(&str, &mut dyn Agent); 2] =
            [("first", &mut first), ("second", &mut second)];
        let reports = compare_agents(&config, &mut agents).unwrap();
        assert_eq!(reports[0].episodes, reports[1].episodes);
        assert_eq!(first.seen, second.seen);
    }

    #[test]
    fn test_learners_run_to_completion() {
        let config = ExperimentConfig::new(MazeConfig::new(8, 0.2, 12, 80), 5, 3);
        let mut baseline = BaselineAgent::new(BaselineConfig::default().with_seed(1));
        let mut reflection = ReflectionAgent::new(ReflectionConfig::default().with_seed(2));
        let mut agents: [(&str, &mut dyn Agent); 2] =
            [("baseline", &mut baseline), ("reflection", &mut reflection)];
        let reports = compare_agents(&config, &mut agents).unwrap();
        for report in &reports {
            assert_eq!(report.len(), 5);
            for e in &report.episodes {
                assert!(e.steps >= 1 && e.steps <= 80);
                assert!(e.success || e.steps == 80);
            }
        }
        assert!(reflection.learning_steps() > 0);
    }
}
