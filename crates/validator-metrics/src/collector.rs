// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{MetricsError, MetricsTable, reduce_exposition};
use futures::future::join_all;
use indexmap::IndexMap;
use reqwest::Client as ReqwestClient;
use std::{collections::HashSet, time::Duration};
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(4);
pub const METRICS_PATH: &str = "metrics";

/// Scrapes the metrics endpoint of every authority concurrently. A fetch that
/// fails or times out leaves that authority's row empty.
#[derive(Clone, Debug)]
pub struct MetricsCollector {
    client: ReqwestClient,
}

impl MetricsCollector {
    pub fn new(timeout: Duration) -> Result<Self, MetricsError> {
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(MetricsError::Client)?;
        Ok(Self { client })
    }

    /// Appends the `/metrics` path to a bare endpoint. Endpoints that already
    /// carry a path are used as given.
    pub fn metrics_endpoint(endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        if url.path().is_empty() || url.path() == "/" {
            url.set_path(METRICS_PATH);
        }
        url
    }

    pub async fn fetch(&self, endpoint: &Url) -> Result<String, MetricsError> {
        let url = Self::metrics_endpoint(endpoint);
        debug!("Connecting to {} to collect metrics", url);
        let fetch_error = |source| MetricsError::Fetch {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(fetch_error)?;
        response.text().await.map_err(fetch_error)
    }

    /// Fetches and reduces the requested metrics for a single authority.
    pub async fn collect_one(
        &self,
        endpoint: &Url,
        metric_names: &HashSet<String>,
    ) -> Result<IndexMap<String, f64>, MetricsError> {
        let text = self.fetch(endpoint).await?;
        reduce_exposition(&text, metric_names)
    }

    /// Collects every authority in parallel and joins before returning. Rows
    /// keep the order of `authorities`.
    pub async fn collect(
        &self,
        authorities: &IndexMap<String, Url>,
        metric_names: &HashSet<String>,
    ) -> MetricsTable {
        let futures = authorities
            .iter()
            .map(|(name, endpoint)| async move {
                let row = match self.collect_one(endpoint, metric_names).await {
                    Ok(row) => row,
                    Err(error) => {
                        warn!("No metrics for authority {}: {}", name, error);
                        IndexMap::new()
                    },
                };
                (name.clone(), row)
            });
        let mut table = MetricsTable::default();
        for (name, row) in join_all(futures).await {
            table.insert_row(name, row);
        }
        table
    }
}
