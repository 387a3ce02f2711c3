// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Concurrent fan-out of one operation over a set of hosts, with a join
//! barrier and a structured per-host outcome.

use crate::{
    BenchError,
    executor::transport::{CommandOutput, Transport, TransportError},
};
use futures::future::join_all;
use std::{collections::BTreeMap, future::Future};
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    AllMustSucceed,
    /// Failures are logged and otherwise ignored.
    BestEffort,
}

/// What counts as a failed command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputCheck {
    ExitStatus,
    /// Also fail on any stderr output. Detached launches print nothing when
    /// they succeed.
    ExitStatusAndStderr,
    /// Also fail on stderr lines reporting an error. Package managers and git
    /// write progress to stderr, so only error lines count.
    ExitStatusAndErrors,
}

const ERROR_PREFIXES: &[&str] = &["error", "fatal:", "e: "];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostFailure {
    pub status: Option<i32>,
    pub detail: String,
}

impl HostFailure {
    pub fn new(detail: impl ToString) -> Self {
        Self {
            status: None,
            detail: detail.to_string(),
        }
    }
}

impl From<TransportError> for HostFailure {
    fn from(error: TransportError) -> Self {
        Self::new(error)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupResult {
    pub succeeded: Vec<String>,
    pub failed: BTreeMap<String, HostFailure>,
}

impl GroupResult {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Fails with the output of the first failing host when any host failed.
    pub fn into_result(self, context: &str) -> Result<Vec<String>, BenchError> {
        match self.failed.iter().next() {
            None => Ok(self.succeeded),
            Some((host, failure)) => Err(BenchError::RemoteExecution {
                context: context.to_string(),
                host: host.clone(),
                failed: self.failed.len(),
                total: self.total(),
                detail: failure.detail.clone(),
            }),
        }
    }

    pub fn with_policy(
        self,
        policy: FailurePolicy,
        context: &str,
    ) -> Result<GroupResult, BenchError> {
        match policy {
            FailurePolicy::AllMustSucceed => {
                if self.is_success() {
                    Ok(self)
                } else {
                    self.into_result(context).map(|_| GroupResult::default())
                }
            },
            FailurePolicy::BestEffort => {
                for (host, failure) in &self.failed {
                    warn!("{} on {}: {}", context, host, failure.detail);
                }
                Ok(self)
            },
        }
    }
}

/// Runs `op` for every host concurrently and waits for all of them.
pub async fn fan_out<'a, F, Fut>(hosts: &'a [String], op: F) -> GroupResult
where
    F: Fn(&'a str) -> Fut,
    Fut: Future<Output = Result<(), HostFailure>>,
{
    let futures = hosts.iter().map(|host| {
        let operation = op(host.as_str());
        async move { (host, operation.await) }
    });
    let mut result = GroupResult::default();
    for (host, outcome) in join_all(futures).await {
        match outcome {
            Ok(()) => result.succeeded.push(host.clone()),
            Err(failure) => {
                result.failed.insert(host.clone(), failure);
            },
        }
    }
    result
}

pub fn check_output(
    outcome: Result<CommandOutput, TransportError>,
    check: OutputCheck,
) -> Result<CommandOutput, HostFailure> {
    let output = outcome?;
    if !output.success() {
        return Err(HostFailure {
            status: output.status,
            detail: output.detail(),
        });
    }
    let detail = match check {
        OutputCheck::ExitStatus => None,
        OutputCheck::ExitStatusAndStderr => {
            let stderr = output.stderr.trim();
            (!stderr.is_empty()).then(|| stderr.to_string())
        },
        OutputCheck::ExitStatusAndErrors => {
            let errors = error_lines(&output.stderr);
            (!errors.is_empty()).then(|| errors.join("\n"))
        },
    };
    match detail {
        None => Ok(output),
        Some(detail) => Err(HostFailure {
            status: output.status,
            detail,
        }),
    }
}

fn error_lines(stderr: &str) -> Vec<&str> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| {
            let line = line.to_ascii_lowercase();
            ERROR_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
        })
        .collect()
}

/// Runs the same command on every host.
pub async fn run_group(
    transport: &dyn Transport,
    hosts: &[String],
    command: &str,
    check: OutputCheck,
) -> GroupResult {
    fan_out(hosts, |host| async move {
        check_output(transport.execute(host, command).await, check).map(|_| ())
    })
    .await
}
