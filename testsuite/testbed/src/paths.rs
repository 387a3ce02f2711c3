// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Naming conventions shared by launch, retrieval and aggregation. Paths are
//! relative to the working directory of the host they refer to.

use crate::commands::CompileProfile;
use std::path::{Path, PathBuf};

pub const LOGS_DIR: &str = "logs";
pub const RESULTS_DIR: &str = "results";
pub const COMMITTEE_FILE: &str = ".committee.json";
pub const PARAMETERS_FILE: &str = ".parameters.json";
pub const GENESIS_FILE: &str = "genesis.blob";
pub const COMMITTEE_DIR: &str = "committee";
pub const SIGNATURES_DIR: &str = "signatures";

pub struct PathMaker;

impl PathMaker {
    pub fn binary_path(repo_root: &Path, profile: CompileProfile) -> PathBuf {
        repo_root.join("target").join(profile.target_dir())
    }

    pub fn key_file(index: usize) -> String {
        format!("validator-{}.key", index)
    }

    pub fn db_path(index: usize, worker: Option<usize>) -> String {
        match worker {
            Some(worker) => format!(".db-{}-{}", index, worker),
            None => format!(".db-{}", index),
        }
    }

    pub fn primary_log_file(index: usize) -> String {
        format!("{}/primary-{}.log", LOGS_DIR, index)
    }

    pub fn worker_log_file(index: usize, worker: usize) -> String {
        format!("{}/worker-{}-{}.log", LOGS_DIR, index, worker)
    }

    pub fn client_log_file(index: usize, worker: usize) -> String {
        format!("{}/client-{}-{}.log", LOGS_DIR, index, worker)
    }

    /// `results/bench-<faults>-<nodes>-<workers>-<collocate>-<rate>-<tx_size>.txt`
    pub fn result_file(
        faults: usize,
        nodes: usize,
        workers: usize,
        collocate: bool,
        rate: u64,
        tx_size: usize,
    ) -> String {
        format!(
            "{}/bench-{}-{}-{}-{}-{}-{}.txt",
            RESULTS_DIR, faults, nodes, workers, collocate, rate, tx_size
        )
    }

    pub fn flamegraph_file(session: &str) -> String {
        format!("{}/flamegraph-{}.svg", RESULTS_DIR, session)
    }

    /// The detached session of a process is named after its log file.
    pub fn session_name(log_file: &str) -> String {
        Path::new(log_file)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| log_file.to_string())
    }
}
