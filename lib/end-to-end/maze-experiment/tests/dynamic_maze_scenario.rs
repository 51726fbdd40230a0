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

//! 10x10 maze, a quarter blocked, mutating every 18 steps with a 200-step cap, played for 100
//! seeded episodes by the reflection agent. The maze must stay solvable at every reset and after
//! every mutation.

use dynamic_maze::DynamicMazeEnvironment;
use maze_agents::{ReflectionAgent, ReflectionConfig};
use maze_experiment::{run_episode_with, ExperimentConfig, ExperimentReport};

fn assert_navigable(env: &DynamicMazeEnvironment, context: &str) {
    assert!(
        env.shortest_path_length().is_some(),
        "{}: goal unreachable\n{}",
        context,
        env
    );
    assert!(
        env.has_valid_move(),
        "{}: agent trapped\n{}",
        context,
        env
    );
}

#[test]
fn test_reflection_agent_keeps_maze_navigable_for_100_episodes() {
    let config = ExperimentConfig::default();
    let mut env = DynamicMazeEnvironment::new(config.maze.clone()).unwrap();
    let mut agent = ReflectionAgent::new(ReflectionConfig::default().with_seed(config.seed));
    agent.tunables_mut().confidence_threshold = 0.25;
    agent.tunables_mut().adaptation_threshold = 0.45;

    let mut report = ExperimentReport::new("reflection");
    let mut mutations_seen = 0u32;
    for episode in 0..config.episodes {
        env.reset(Some(config.episode_seed(episode))).unwrap();
        assert_navigable(&env, &format!("episode {} reset", episode));

        let metrics = run_episode_with(&mut env, &mut agent, episode, |env, outcome| {
            if outcome.info.mutated {
                mutations_seen += 1;
                assert_navigable(env, &format!("episode {} step {}", episode, env.steps()));
            }
        })
        .unwrap();

        assert!(metrics.steps <= config.maze.max_steps);
        assert_eq!(
            metrics.environment_updates,
            env.episode_stats().environment_updates
        );
        report.push(metrics);
    }

    assert_eq!(report.len(), 100);
    assert!(mutations_seen > 0);
    let rolling = report.rolling_success_rate(10);
    assert!((0.0..=1.0).contains(&rolling), "rolling: {}", rolling);
    assert!(!agent.slow_table().is_empty());
}

#[test]
fn test_same_seed_same_run() {
    let mut config = ExperimentConfig::default();
    config.episodes = 5;

    let run = || {
        let mut agent = ReflectionAgent::new(ReflectionConfig::default().with_seed(9));
        maze_experiment::run_experiment(&config, "reflection", &mut agent).unwrap()
    };
    assert_eq!(run(), run());
}
