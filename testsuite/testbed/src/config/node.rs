// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::config::{ConfigError, DeploymentMode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{fs, path::Path};

/// Keys the narwhal node refuses to start without.
pub const REQUIRED_NARWHAL_KEYS: &[&str] = &[
    "header_size",
    "max_header_delay",
    "gc_depth",
    "sync_retry_delay",
    "sync_retry_nodes",
    "batch_size",
];

pub const DEFAULT_EXECUTION: &str = "advanced";
const EXECUTION_KEY: &str = "execution";

/// Free-form node parameters, forwarded to the node binary as a JSON file.
/// Only the presence of the required keys is checked here.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NodeParameters(Value);

impl Default for NodeParameters {
    fn default() -> Self {
        Self(json!({
            "header_size": 1_000,
            "max_header_delay": "200ms",
            "gc_depth": 50,
            "sync_retry_delay": "10_000ms",
            "sync_retry_nodes": 3,
            "batch_size": 500_000,
            "max_batch_delay": "200ms",
            "block_synchronizer": {
                "certificates_synchronize_timeout": "2_000ms",
                "payload_synchronize_timeout": "2_000ms",
                "payload_availability_timeout": "2_000ms",
                "handler_certificate_deliver_timeout": "2_000ms"
            },
            "consensus_api_grpc": {
                "socket_addr": "/ip4/127.0.0.1/tcp/0/http",
                "get_collections_timeout": "5_000ms",
                "remove_collections_timeout": "5_000ms"
            },
            "max_concurrent_requests": 500_000,
            "prometheus_metrics": {
                "socket_addr": "/ip4/127.0.0.1/tcp/0/http"
            }
        }))
    }
}

impl NodeParameters {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn validate(&self, mode: DeploymentMode) -> Result<(), ConfigError> {
        let Some(object) = self.0.as_object() else {
            return Err(ConfigError::invalid(
                "node_parameters",
                "expected a map of parameters",
            ));
        };
        if mode == DeploymentMode::Narwhal {
            if let Some(missing) = REQUIRED_NARWHAL_KEYS
                .iter()
                .find(|key| !object.contains_key(**key))
            {
                return Err(ConfigError::Missing(format!("node_parameters.{}", missing)));
            }
        }
        Ok(())
    }

    /// The execution engine handed to primaries, workers and clients.
    pub fn execution(&self) -> &str {
        self.0
            .get(EXECUTION_KEY)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_EXECUTION)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|error| ConfigError::IO(path.display().to_string(), error))?;
        serde_json::from_str(&contents)
            .map_err(|error| ConfigError::Json(path.display().to_string(), error))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(&self.0)
            .map_err(|error| ConfigError::Json(path.display().to_string(), error))?;
        fs::write(path, contents)
            .map_err(|error| ConfigError::IO(path.display().to_string(), error))
    }
}
