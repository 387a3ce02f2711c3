// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

mod genesis;
mod group;
mod launch;
mod local;
mod readiness;
mod remote;
mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use genesis::*;
pub use group::*;
pub use launch::*;
pub use local::*;
pub use readiness::*;
pub use remote::*;
pub use transport::*;

use crate::{BenchError, display};
use std::{path::PathBuf, time::Duration};
use tokio::time::{Instant, sleep_until};

const PROGRESS_TICKS: u32 = 20;

/// Runs `command` on the local machine and fails with `context` unless it
/// exits successfully.
pub(crate) async fn run_local(
    transport: &dyn Transport,
    context: &str,
    command: &str,
) -> Result<CommandOutput, BenchError> {
    let output = transport
        .execute(LOCAL_HOST, command)
        .await
        .map_err(|error| BenchError::local(context, error))?;
    if output.success() {
        Ok(output)
    } else {
        Err(BenchError::local(context, output.detail()))
    }
}

/// Sleeps exactly `duration`, ticking a progress bar on the way.
pub async fn wait_for_duration(duration: Duration, prefix: &str) {
    let deadline = Instant::now() + duration;
    let bar = display::progress_bar(u64::from(PROGRESS_TICKS), prefix);
    let tick = duration / PROGRESS_TICKS;
    for step in 1..=PROGRESS_TICKS {
        sleep_until((Instant::now() + tick).min(deadline)).await;
        bar.set_position(u64::from(step));
    }
    sleep_until(deadline).await;
    bar.finish_and_clear();
}

/// Outcome of one run of a sweep.
#[derive(Debug)]
pub struct RunRecord {
    pub nodes: usize,
    pub rate: u64,
    pub run: usize,
    /// The result file, or why the run failed.
    pub outcome: Result<PathBuf, String>,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub runs: Vec<RunRecord>,
}

impl SweepReport {
    pub fn record(
        &mut self,
        nodes: usize,
        rate: u64,
        run: usize,
        outcome: Result<PathBuf, String>,
    ) {
        self.runs.push(RunRecord {
            nodes,
            rate,
            run,
            outcome,
        });
    }

    pub fn succeeded(&self) -> usize {
        self.runs.iter().filter(|run| run.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.runs.len() - self.succeeded()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::mock::MockTransport;

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_duration_is_exact() {
        let start = Instant::now();
        wait_for_duration(Duration::from_secs(300), "Running").await;
        assert_eq!(start.elapsed(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_run_local_reports_failures() {
        let transport = MockTransport::new().fail_on_command("cargo build");
        assert!(run_local(&transport, "Failed to clean up", "rm -rf .db-*").await.is_ok());
        let error = run_local(&transport, "Failed to compile", "cargo build --release")
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "Failed to compile: cargo build: command failed");
    }

    #[test]
    fn test_sweep_report() {
        let mut report = SweepReport::default();
        report.record(4, 1_000, 0, Ok(PathBuf::from("results/bench.txt")));
        report.record(4, 1_000, 1, Err("client 0-0 panicked".into()));
        assert_eq!((report.succeeded(), report.failed()), (1, 1));
    }
}
