// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Maps a logical cluster shape onto the hosts of a [`HostPool`].

use crate::hosts::HostPool;
use indexmap::IndexSet;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusterShape {
    pub validators: usize,
    /// Workers per validator.
    pub workers: usize,
    /// Authorities deliberately left offline. They are still placed.
    pub faults: usize,
    pub collocate: bool,
}

/// The testbed cannot host the requested shape. Nothing was allocated.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("There are not enough instances available: {required} required, {available} available")]
pub struct InsufficientHosts {
    pub required: usize,
    pub available: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    /// One host per validator, running its primary and all its workers.
    Collocated(Vec<String>),
    /// One group per validator, all from one region: the primary's host
    /// followed by one host per worker.
    Distributed(Vec<Vec<String>>),
}

impl Placement {
    pub fn len(&self) -> usize {
        match self {
            Placement::Collocated(hosts) => hosts.len(),
            Placement::Distributed(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_collocated(&self) -> bool {
        matches!(self, Placement::Collocated(_))
    }

    /// The hosts of validator `index`, primary first then one per worker.
    pub fn hosts_for(&self, index: usize, workers: usize) -> Option<Vec<String>> {
        match self {
            Placement::Collocated(hosts) => hosts
                .get(index)
                .map(|host| vec![host.clone(); workers + 1]),
            Placement::Distributed(groups) => groups.get(index).cloned(),
        }
    }

    /// Every host of the placement once, in placement order.
    pub fn unique_hosts(&self) -> Vec<String> {
        let hosts: IndexSet<&String> = match self {
            Placement::Collocated(hosts) => hosts.iter().collect(),
            Placement::Distributed(groups) => groups.iter().flatten().collect(),
        };
        hosts.into_iter().cloned().collect()
    }
}

/// Selects hosts for `shape`. Collocated validators are spread across regions
/// round-robin; distributed validators each take the head of one region.
pub fn plan(pool: &HostPool, shape: &ClusterShape) -> Result<Placement, InsufficientHosts> {
    if shape.collocate {
        plan_collocated(pool, shape.validators)
    } else {
        plan_distributed(pool, shape.validators, shape.workers)
    }
}

fn plan_collocated(pool: &HostPool, validators: usize) -> Result<Placement, InsufficientHosts> {
    let available = pool.total_hosts();
    if available < validators {
        return Err(InsufficientHosts {
            required: validators,
            available,
        });
    }

    // Interleave regions: the first host of every region, then the second, ...
    let regions: Vec<&Vec<String>> = pool.iter().map(|(_, hosts)| hosts).collect();
    let depth = regions.iter().map(|hosts| hosts.len()).max().unwrap_or_default();
    let selected = (0..depth)
        .flat_map(|i| regions.iter().filter_map(move |hosts| hosts.get(i)))
        .take(validators)
        .cloned()
        .collect();
    Ok(Placement::Collocated(selected))
}

fn plan_distributed(
    pool: &HostPool,
    validators: usize,
    workers: usize,
) -> Result<Placement, InsufficientHosts> {
    let group_size = workers + 1;
    let qualifying: Vec<&Vec<String>> = pool
        .iter()
        .map(|(_, hosts)| hosts)
        .filter(|hosts| hosts.len() >= group_size)
        .collect();
    if qualifying.len() < validators {
        return Err(InsufficientHosts {
            required: validators,
            available: qualifying.len(),
        });
    }

    let groups = qualifying
        .into_iter()
        .take(validators)
        .map(|hosts| hosts[..group_size].to_vec())
        .collect();
    Ok(Placement::Distributed(groups))
}
