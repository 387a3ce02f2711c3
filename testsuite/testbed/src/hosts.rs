// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Hosts grouped by region. Region order and host order within a region are
/// the declared order and stay stable across planning passes.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HostPool(IndexMap<String, Vec<String>>);

impl HostPool {
    pub fn new<R, H, I>(regions: R) -> Self
    where
        R: IntoIterator<Item = (H, I)>,
        H: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self(
            regions
                .into_iter()
                .map(|(region, hosts)| (region.into(), hosts.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn hosts(&self, region: &str) -> Option<&[String]> {
        self.0.get(region).map(Vec::as_slice)
    }

    pub fn region_count(&self) -> usize {
        self.0.len()
    }

    pub fn total_hosts(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_hosts() == 0
    }

    /// Every host, region by region.
    pub fn flat(&self) -> Vec<String> {
        self.0.values().flatten().cloned().collect()
    }

    /// A host may only be listed once in the whole pool, otherwise two roles
    /// could be placed on the same machine without the planner knowing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = IndexSet::new();
        for (region, hosts) in &self.0 {
            for host in hosts {
                if host.trim().is_empty() {
                    return Err(ConfigError::invalid(
                        "inventory",
                        format!("empty host in region {}", region),
                    ));
                }
                if !seen.insert(host.as_str()) {
                    return Err(ConfigError::invalid(
                        "inventory",
                        format!("host {} is listed more than once", host),
                    ));
                }
            }
        }
        Ok(())
    }
}
