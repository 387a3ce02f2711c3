// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::config::SshSettings;
use async_trait::async_trait;
use std::{
    fs, io,
    path::{Path, PathBuf},
    process::Stdio,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Host name the local transport accepts for every call.
pub const LOCAL_HOST: &str = "localhost";

const SSH_BIN: &str = "ssh";
const SCP_BIN: &str = "scp";
const SHELL_BIN: &str = "sh";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{operation} on {host} exited with {status:?}: {detail}")]
    Failed {
        operation: &'static str,
        host: String,
        status: Option<i32>,
        detail: String,
    },

    #[error("Failed to copy {0}: {1}")]
    Copy(String, #[source] io::Error),
}

/// Captured result of one command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// The most informative text of the output: stderr, else stdout, else
    /// the exit status.
    pub fn detail(&self) -> String {
        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        if !stderr.is_empty() {
            stderr.to_string()
        } else if !stdout.is_empty() {
            stdout.to_string()
        } else {
            match self.status {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            }
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// How the orchestrator reaches a host. Commands run from the host's working
/// directory: the user's home remotely, the bench directory locally.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, host: &str, command: &str) -> Result<CommandOutput, TransportError>;

    /// Copies the local file or directory `local` into the directory
    /// `remote_dir` of `host`.
    async fn upload(
        &self,
        host: &str,
        local: &Path,
        remote_dir: &str,
    ) -> Result<(), TransportError>;

    /// Copies the file `remote` of `host` to `local`.
    async fn download(&self, host: &str, remote: &str, local: &Path) -> Result<(), TransportError>;
}

async fn run(program: &'static str, args: &[String]) -> Result<CommandOutput, TransportError> {
    debug!("{} {}", program, args.join(" "));
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map(CommandOutput::from)
        .map_err(|source| TransportError::Spawn { program, source })
}

/// Reaches hosts with the system `ssh` and `scp` clients.
#[derive(Clone, Debug)]
pub struct SshTransport {
    user: String,
    key_path: PathBuf,
    connect_timeout_secs: u64,
    forward_agent: bool,
}

impl SshTransport {
    pub fn new(settings: &SshSettings) -> Self {
        Self {
            user: settings.user.clone(),
            key_path: settings.key_path.clone(),
            connect_timeout_secs: settings.connect_timeout_secs,
            forward_agent: settings.forward_agent,
        }
    }

    fn options(&self) -> Vec<String> {
        vec![
            "-i".into(),
            self.key_path.display().to_string(),
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
            "-o".into(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ]
    }

    fn destination(&self, host: &str) -> String {
        format!("{}@{}", self.user, host)
    }

    pub fn ssh_args(&self, host: &str, command: &str) -> Vec<String> {
        let mut args = self.options();
        if self.forward_agent {
            args.push("-A".into());
        }
        args.push(self.destination(host));
        args.push(command.to_string());
        args
    }

    pub fn upload_args(&self, host: &str, local: &Path, remote_dir: &str) -> Vec<String> {
        let mut args = self.options();
        args.push("-r".into());
        args.push(local.display().to_string());
        args.push(format!("{}:{}/", self.destination(host), remote_dir));
        args
    }

    pub fn download_args(&self, host: &str, remote: &str, local: &Path) -> Vec<String> {
        let mut args = self.options();
        args.push(format!("{}:{}", self.destination(host), remote));
        args.push(local.display().to_string());
        args
    }

    async fn copy(
        &self,
        host: &str,
        operation: &'static str,
        args: Vec<String>,
    ) -> Result<(), TransportError> {
        let output = run(SCP_BIN, &args).await?;
        if output.success() {
            Ok(())
        } else {
            Err(TransportError::Failed {
                operation,
                host: host.to_string(),
                status: output.status,
                detail: output.detail(),
            })
        }
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn execute(&self, host: &str, command: &str) -> Result<CommandOutput, TransportError> {
        run(SSH_BIN, &self.ssh_args(host, command)).await
    }

    async fn upload(
        &self,
        host: &str,
        local: &Path,
        remote_dir: &str,
    ) -> Result<(), TransportError> {
        self.copy(host, "upload", self.upload_args(host, local, remote_dir)).await
    }

    async fn download(&self, host: &str, remote: &str, local: &Path) -> Result<(), TransportError> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)
                .map_err(|error| TransportError::Copy(parent.display().to_string(), error))?;
        }
        self.copy(host, "download", self.download_args(host, remote, local)).await
    }
}

/// Runs everything on this machine through `sh`, from `working_dir`. The host
/// argument is ignored.
#[derive(Clone, Debug)]
pub struct LocalTransport {
    working_dir: PathBuf,
}

impl LocalTransport {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn execute(&self, _host: &str, command: &str) -> Result<CommandOutput, TransportError> {
        debug!("{} -c {}", SHELL_BIN, command);
        Command::new(SHELL_BIN)
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map(CommandOutput::from)
            .map_err(|source| TransportError::Spawn {
                program: SHELL_BIN,
                source,
            })
    }

    async fn upload(
        &self,
        _host: &str,
        local: &Path,
        remote_dir: &str,
    ) -> Result<(), TransportError> {
        let target_dir = self.working_dir.join(remote_dir);
        let name = local
            .file_name()
            .ok_or_else(|| {
                TransportError::Copy(
                    local.display().to_string(),
                    io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
                )
            })?
            .to_owned();
        let source = local.to_path_buf();
        tokio::task::spawn_blocking(move || copy_recursive(&source, &target_dir.join(name)))
            .await
            .map_err(|error| {
                TransportError::Copy(local.display().to_string(), io::Error::other(error))
            })?
    }

    async fn download(
        &self,
        _host: &str,
        remote: &str,
        local: &Path,
    ) -> Result<(), TransportError> {
        let source = self.working_dir.join(remote);
        let target = local.to_path_buf();
        tokio::task::spawn_blocking(move || copy_recursive(&source, &target))
            .await
            .map_err(|error| TransportError::Copy(remote.to_string(), io::Error::other(error)))?
    }
}

fn copy_recursive(source: &Path, target: &Path) -> Result<(), TransportError> {
    let copy_error = |error| TransportError::Copy(source.display().to_string(), error);
    if source == target {
        return Ok(());
    }
    if source.is_dir() {
        fs::create_dir_all(target).map_err(copy_error)?;
        for entry in fs::read_dir(source).map_err(copy_error)? {
            let entry = entry.map_err(copy_error)?;
            copy_recursive(&entry.path(), &target.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(copy_error)?;
        }
        fs::copy(source, target).map(|_| ()).map_err(copy_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh() -> SshTransport {
        SshTransport::new(&SshSettings {
            user: "ubuntu".into(),
            key_path: PathBuf::from("/keys/aws.pem"),
            connect_timeout_secs: 5,
            forward_agent: true,
        })
    }

    #[test]
    fn test_ssh_arguments() {
        let args = ssh().ssh_args("10.0.0.1", "tmux kill-server");
        assert_eq!(args[..2], ["-i".to_string(), "/keys/aws.pem".to_string()]);
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"ConnectTimeout=5".to_string()));
        assert_eq!(args[args.len() - 3..], [
            "-A".to_string(),
            "ubuntu@10.0.0.1".to_string(),
            "tmux kill-server".to_string()
        ]);

        let upload = ssh().upload_args("10.0.0.1", Path::new(".proto/genesis.blob"), "repo/.proto");
        assert_eq!(upload.last().unwrap(), "ubuntu@10.0.0.1:repo/.proto/");
        let download = ssh().download_args(
            "10.0.0.1",
            "logs/primary-0.log",
            Path::new("logs/primary-0.log"),
        );
        assert_eq!(download[download.len() - 2], "ubuntu@10.0.0.1:logs/primary-0.log");
    }

    #[test]
    fn test_output_detail() {
        let output = CommandOutput {
            status: Some(1),
            stdout: "partial\n".into(),
            stderr: "  \n".into(),
        };
        assert!(!output.success());
        assert_eq!(output.detail(), "partial");
        assert_eq!(
            CommandOutput {
                status: Some(2),
                ..Default::default()
            }
            .detail(),
            "exit status 2"
        );
    }

    #[tokio::test]
    async fn test_local_transport() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());

        let output = transport.execute(LOCAL_HOST, "mkdir -p logs && echo ok").await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "ok");
        let failed = transport.execute(LOCAL_HOST, "echo broken >&2; exit 3").await.unwrap();
        assert_eq!(failed.status, Some(3));
        assert_eq!(failed.detail(), "broken");

        let source = tempfile::tempdir().unwrap();
        fs::create_dir_all(source.path().join("committee")).unwrap();
        fs::write(source.path().join("committee/validator-0"), "key").unwrap();
        transport
            .upload(LOCAL_HOST, &source.path().join("committee"), "config")
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("config/committee/validator-0")).unwrap(),
            "key"
        );

        let local = source.path().join("fetched/validator-0");
        transport
            .download(LOCAL_HOST, "config/committee/validator-0", &local)
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(local).unwrap(), "key");
    }
}
