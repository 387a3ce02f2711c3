// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Local build and genesis ceremony, shared by local and remote benchmarks.

use crate::{
    BenchError,
    commands::{CommandBuilder, CompileProfile},
    committee::{Committee, CommitteeBuilder},
    config::{DeploymentMode, NodeParameters},
    executor::{Transport, run_local},
    keys::NodeIdentity,
    paths::{
        COMMITTEE_DIR, COMMITTEE_FILE, GENESIS_FILE, PARAMETERS_FILE, PathMaker, SIGNATURES_DIR,
    },
    topology::Placement,
};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct GenesisCeremony<'a> {
    transport: &'a dyn Transport,
    /// Local working directory of `transport`.
    root: &'a Path,
    /// Configuration directory, relative to `root`.
    config_dir: &'a str,
    mode: DeploymentMode,
}

impl<'a> GenesisCeremony<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        root: &'a Path,
        config_dir: &'a str,
        mode: DeploymentMode,
    ) -> Self {
        Self {
            transport,
            root,
            config_dir,
            mode,
        }
    }

    /// Removes the artifacts of previous runs, builds the binaries of
    /// `repo_root` and links them into the working directory.
    pub async fn prepare(
        &self,
        repo_root: &Path,
        profile: CompileProfile,
    ) -> Result<(), BenchError> {
        run_local(self.transport, "Failed to clean up", &CommandBuilder::cleanup()).await?;
        info!("Compiling binaries with the {} profile", profile);
        let repo_root_str = repo_root.display().to_string();
        run_local(
            self.transport,
            "Failed to compile",
            &CommandBuilder::in_dir(&repo_root_str, &CommandBuilder::compile_command(profile)),
        )
        .await?;
        let origin = PathMaker::binary_path(repo_root, profile);
        run_local(
            self.transport,
            "Failed to link binaries",
            &CommandBuilder::alias_binaries(&origin.display().to_string()),
        )
        .await?;
        Ok(())
    }

    /// Generates one key per placed validator, derives the committee from
    /// their names and, in node mode, produces the signed genesis. The
    /// committee and node parameters are written to the config directory.
    pub async fn run(
        &self,
        placement: &Placement,
        builder: &CommitteeBuilder,
        parameters: &NodeParameters,
    ) -> Result<Committee, BenchError> {
        let dir = self.config_dir;
        self.exec("Failed to reset the config directory", &CommandBuilder::reset_config_dir(dir))
            .await?;
        if self.mode == DeploymentMode::Node {
            self.exec("Failed to initialize genesis", &CommandBuilder::init_genesis(dir))
                .await?;
        }

        let mut names = Vec::with_capacity(placement.len());
        for index in 0..placement.len() {
            let key_path = self.key_path(index);
            self.exec("Failed to generate key", &CommandBuilder::generate_key(self.mode, &key_path))
                .await?;
            names.push(NodeIdentity::from_file(&self.root.join(&key_path))?.name);
        }

        let committee = builder.build(&names, placement)?;
        committee.save(&self.root.join(dir).join(COMMITTEE_FILE))?;
        parameters.save(&self.root.join(dir).join(PARAMETERS_FILE))?;

        if self.mode == DeploymentMode::Node {
            for (index, (name, authority)) in committee.authorities.iter().enumerate() {
                let command = CommandBuilder::add_validator_genesis(
                    dir,
                    name,
                    authority,
                    &self.key_path(index),
                );
                self.exec("Failed to add validator to genesis", &command).await?;
            }
            self.exec("Failed to add controllers", &CommandBuilder::add_controllers_genesis(dir))
                .await?;
            self.exec("Failed to build genesis", &CommandBuilder::build_genesis(dir))
                .await?;
            for index in 0..committee.size() {
                let command = CommandBuilder::verify_and_sign_genesis(dir, &self.key_path(index));
                self.exec("Failed to sign genesis", &command).await?;
            }
            self.exec("Failed to finalize genesis", &CommandBuilder::finalize_genesis(dir))
                .await?;
        }
        info!("Generated the configuration of {} validators", committee.size());
        Ok(committee)
    }

    /// Local files validator `index` needs on its hosts.
    pub fn artifacts(&self, index: usize) -> Vec<PathBuf> {
        let dir = self.root.join(self.config_dir);
        let mut artifacts = vec![
            dir.join(PathMaker::key_file(index)),
            dir.join(COMMITTEE_FILE),
            dir.join(PARAMETERS_FILE),
        ];
        if self.mode == DeploymentMode::Node {
            artifacts.extend([
                dir.join(GENESIS_FILE),
                dir.join(COMMITTEE_DIR),
                dir.join(SIGNATURES_DIR),
            ]);
        }
        artifacts
    }

    fn key_path(&self, index: usize) -> String {
        format!("{}/{}", self.config_dir, PathMaker::key_file(index))
    }

    async fn exec(&self, context: &str, command: &str) -> Result<(), BenchError> {
        run_local(self.transport, context, command).await.map(|_| ())
    }
}
