// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    /// The endpoint could not be reached, or it timed out.
    #[error("Failed to fetch metrics from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to build the metrics http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to parse metrics exposition text: {0}")]
    Parse(#[source] std::io::Error),

    #[error("Error accessing {0}: {1}")]
    IO(String, #[source] std::io::Error),

    #[error("Error (de)serializing {0}: {1}")]
    Json(String, #[source] serde_json::Error),

    #[error("Failed to export metrics table: {0}")]
    Export(#[from] csv::Error),
}
