// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{config::ConfigError, topology::InsufficientHosts};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    /// Malformed or insufficient parameters, detected before any host is contacted.
    #[error("Invalid nodes or bench parameters: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    InsufficientHosts(#[from] InsufficientHosts),

    /// A command group failed on at least one host. Carries the output of the
    /// first failing host.
    #[error("{context} ({failed}/{total} hosts failed). {host}: {detail}")]
    RemoteExecution {
        context: String,
        host: String,
        failed: usize,
        total: usize,
        detail: String,
    },

    #[error("{context}: {detail}")]
    LocalExecution { context: String, detail: String },

    #[error("Failed to parse logs: {0}")]
    Parse(String),

    #[error("Error accessing {0}: {1}")]
    IO(String, #[source] std::io::Error),
}

impl BenchError {
    pub fn local(context: impl Into<String>, detail: impl ToString) -> Self {
        Self::LocalExecution {
            context: context.into(),
            detail: detail.to_string(),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, error: std::io::Error) -> Self {
        Self::IO(path.as_ref().display().to_string(), error)
    }

    /// Configuration errors abort the whole invocation. Everything else only
    /// aborts the current run.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
