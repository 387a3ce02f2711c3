// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::MetricsError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path};

pub const DEFAULT_THRESHOLDS_FILE: &str = "metrics_thresholds.json";

/// Selects the metrics to scrape. Keys are metric names, values are the
/// alerting threshold associated with each metric.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsThresholds {
    #[serde(default)]
    pub gauges: IndexMap<String, f64>,
    #[serde(default)]
    pub histograms: IndexMap<String, f64>,
}

impl MetricsThresholds {
    pub fn load(path: &Path) -> Result<Self, MetricsError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|error| MetricsError::IO(path.display().to_string(), error))?;
        Self::parse(&contents, &path.display().to_string())
    }

    pub fn parse(contents: &str, source: &str) -> Result<Self, MetricsError> {
        serde_json::from_str(contents)
            .map_err(|error| MetricsError::Json(source.to_string(), error))
    }

    pub fn metric_names(&self) -> HashSet<String> {
        self.gauges
            .keys()
            .chain(self.histograms.keys())
            .cloned()
            .collect()
    }

    /// Metrics of `row` that exceed their configured threshold.
    pub fn exceeded<'a>(&'a self, row: &'a IndexMap<String, f64>) -> Vec<(&'a str, f64, f64)> {
        self.gauges
            .iter()
            .chain(self.histograms.iter())
            .filter_map(|(name, threshold)| {
                let value = *row.get(name)?;
                (value > *threshold).then_some((name.as_str(), value, *threshold))
            })
            .collect()
    }
}
