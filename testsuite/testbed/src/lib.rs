// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Drives validator network benchmarks: host placement, committee and genesis
//! generation, process launch and teardown across a fleet, and log harvesting.

pub mod commands;
pub mod committee;
pub mod config;
pub mod display;
pub mod executor;
pub mod hosts;
pub mod keys;
pub mod logs;
pub mod multiaddr;
pub mod paths;
pub mod topology;

mod error;

pub use commands::{CommandBuilder, CompileProfile};
pub use committee::{AuthorityRecord, Committee, CommitteeBuilder};
pub use config::{
    BenchParameters, ClientKind, ConfigError, DeploymentMode, LocalBenchParameters,
    NodeParameters, PersistableConfig, Settings,
};
pub use error::*;
pub use executor::{LocalBench, RemoteBench, SweepReport, Transport};
pub use hosts::HostPool;
pub use multiaddr::Multiaddr;
pub use paths::PathMaker;
pub use topology::{ClusterShape, InsufficientHosts, Placement};
