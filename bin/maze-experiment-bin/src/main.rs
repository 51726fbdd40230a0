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

//! Compare the baseline Q-learner with the reflection agent on a changing maze, over several
//! independently seeded runs in parallel.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::Parser;
use dynamic_maze::MazeConfig;
use maze_agents::{Agent, BaselineAgent, BaselineConfig, ReflectionAgent, ReflectionConfig};
use maze_experiment::{compare_agents, ExperimentConfig, ExperimentError, ExperimentReport};
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "maze-experiment",
    about = "Baseline vs reflection agent on a dynamic maze"
)]
struct Args {
    /// Side length of the maze.
    #[arg(long, default_value_t = 10)]
    size: usize,

    /// Fraction of cells blocked at reset.
    #[arg(long, default_value_t = 0.25)]
    obstacle_ratio: f64,

    /// The maze mutates every this many steps.
    #[arg(long, default_value_t = 18)]
    mutation_interval: u32,

    /// Step budget per episode.
    #[arg(long, default_value_t = 200)]
    max_steps: u32,

    #[arg(long, default_value_t = 100)]
    episodes: usize,

    /// Seed of the first run. Later runs are offset from it.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Independent runs, executed in parallel.
    #[arg(long, default_value_t = 1)]
    runs: usize,

    /// Log progress every this many episodes; 0 disables.
    #[arg(long, default_value_t = 10)]
    report_every: usize,

    /// Window for the rolling success rate.
    #[arg(long, default_value_t = 10)]
    window: usize,

    #[arg(long, default_value_t = 0.25)]
    confidence_threshold: f64,

    #[arg(long, default_value_t = 0.45)]
    adaptation_threshold: f64,

    /// Write every episode of every run to this file as JSON.
    #[arg(long)]
    json: Option<PathBuf>,
}

const RUN_SEED_STRIDE: u64 = 1000;

#[derive(Debug, Serialize)]
struct RunResult {
    seed: u64,
    reflection_changes_detected: u32,
    reports: Vec<ExperimentReport>,
}

const DEFAULT_LOG_DIRECTIVES: &str = "dynamic_maze=info,maze_agents=info,maze_experiment=info";

/// `RUST_LOG` when it is set and parses, otherwise info for the maze crates.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_DIRECTIVES))
}

fn init_logging() {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    fmt().with_env_filter(log_filter(rust_log.as_deref())).init();
}

fn run(args: &Args, seed: u64) -> Result<RunResult, ExperimentError> {
    let mut maze = MazeConfig::new(
        args.size,
        args.obstacle_ratio,
        args.mutation_interval,
        args.max_steps,
    );
    maze.seed = Some(seed);
    let mut config = ExperimentConfig::new(maze, args.episodes, seed);
    config.rolling_window = args.window;
    config.report_every = args.report_every;

    let mut baseline = BaselineAgent::new(BaselineConfig::default().with_seed(seed));
    let mut reflection =
        ReflectionAgent::new(ReflectionConfig::default().with_seed(seed.wrapping_add(1)));
    reflection.tunables_mut().confidence_threshold = args.confidence_threshold;
    reflection.tunables_mut().adaptation_threshold = args.adaptation_threshold;

    let mut agents: [(&str, &mut dyn Agent); 2] =
        [("baseline", &mut baseline), ("reflection", &mut reflection)];
    let reports = compare_agents(&config, &mut agents)?;

    info!(
        seed,
        changes_detected = reflection.changes_detected(),
        stability = reflection.stability(),
        fast_states = reflection.fast_table().len(),
        slow_states = reflection.slow_table().len(),
        walls = reflection.wall_memory().wall_count(),
        "reflection agent after run"
    );
    Ok(RunResult {
        seed,
        reflection_changes_detected: reflection.changes_detected(),
        reports,
    })
}

fn print_summary(results: &[RunResult], window: usize) {
    for result in results {
        println!("seed {}", result.seed);
        for report in &result.reports {
            println!(
                "  {}  last {}: {:>5.1}%",
                report,
                window,
                report.rolling_success_rate(window) * 100.0
            );
        }
    }

    if results.len() > 1 {
        println!("mean over {} runs", results.len());
        let agents = results[0].reports.iter().map(|r| r.agent.as_str());
        for (i, agent) in agents.enumerate() {
            let reports: Vec<&ExperimentReport> =
                results.iter().filter_map(|r| r.reports.get(i)).collect();
            let n = reports.len() as f64;
            let success = reports.iter().map(|r| r.success_rate()).sum::<f64>() / n;
            let steps = reports.iter().map(|r| r.mean_steps()).sum::<f64>() / n;
            let efficiency = reports.iter().map(|r| r.mean_path_efficiency()).sum::<f64>() / n;
            println!(
                "  {:<12} success {:>5.1}%  steps {:>6.1}  efficiency {:.3}",
                agent,
                success * 100.0,
                steps,
                efficiency
            );
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();

    let seeds: Vec<u64> = (0..args.runs.max(1) as u64)
        .map(|i| args.seed.wrapping_add(i * RUN_SEED_STRIDE))
        .collect();
    let results: Vec<RunResult> = seeds
        .par_iter()
        .map(|seed| run(&args, *seed))
        .collect::<Result<_, _>>()?;

    print_summary(&results, args.window);

    if let Some(path) = &args.json {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &results)?;
        info!(path = %path.display(), "wrote report");
    }
    Ok(())
}
