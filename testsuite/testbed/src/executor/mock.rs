// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! In-memory transport recording every call. With a root directory it also
//! stands in for the binaries: key generation writes key files, detached
//! launches create their log file and downloads write a log.

use crate::executor::transport::{CommandOutput, Transport, TransportError};
use async_trait::async_trait;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Execute { host: String, command: String },
    Upload { host: String, local: PathBuf, remote_dir: String },
    Download { host: String, remote: String, local: PathBuf },
}

#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    root: Option<PathBuf>,
    failing_hosts: HashSet<String>,
    failing_commands: Vec<String>,
    stderr: Vec<(String, String)>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: &Path) -> Self {
        self.root = Some(root.to_path_buf());
        self
    }

    pub fn fail_on_host(mut self, host: &str) -> Self {
        self.failing_hosts.insert(host.to_string());
        self
    }

    pub fn fail_on_command(mut self, pattern: &str) -> Self {
        self.failing_commands.push(pattern.to_string());
        self
    }

    pub fn stderr_on(mut self, pattern: &str, stderr: &str) -> Self {
        self.stderr.push((pattern.to_string(), stderr.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn executed_on(&self, host: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Execute { host: h, command } if h == host => Some(command),
                _ => None,
            })
            .collect()
    }

    pub fn executed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Execute { command, .. } => Some(command),
                _ => None,
            })
            .collect()
    }

    pub fn uploads_to(&self, host: &str) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Upload { host: h, local, .. } if h == host => Some(local),
                _ => None,
            })
            .collect()
    }

    pub fn downloads(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Download { host, remote, .. } => Some((host, remote)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(&self, host: &str, command: &str) -> Option<String> {
        if self.failing_hosts.contains(host) {
            return Some(format!("ssh: connect to host {} port 22: Connection refused", host));
        }
        self.failing_commands
            .iter()
            .find(|pattern| command.contains(pattern.as_str()))
            .map(|pattern| format!("{}: command failed", pattern))
    }

    fn emulate(&self, command: &str) {
        let Some(root) = &self.root else {
            return;
        };
        let words: Vec<&str> = command.split_whitespace().collect();
        if command.contains("generate_keys") || command.contains("generate-key") {
            if let Some(path) = words.last() {
                let stem = Path::new(path).file_stem().unwrap().to_string_lossy().into_owned();
                write(&root.join(path), &format!("{{ \"name\": \"{}\" }}", stem));
            }
        } else if command.starts_with("tmux new") {
            if let Some(position) = words.iter().position(|word| *word == ">") {
                write(&root.join(words[position + 1]), "INFO booted\n");
            }
        }
    }
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, host: &str, command: &str) -> Result<CommandOutput, TransportError> {
        self.record(Call::Execute {
            host: host.to_string(),
            command: command.to_string(),
        });
        if let Some(detail) = self.failure(host, command) {
            return Ok(CommandOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: detail,
            });
        }
        self.emulate(command);
        let stderr = self
            .stderr
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, stderr)| stderr.clone())
            .unwrap_or_default();
        Ok(CommandOutput {
            status: Some(0),
            stdout: String::new(),
            stderr,
        })
    }

    async fn upload(
        &self,
        host: &str,
        local: &Path,
        remote_dir: &str,
    ) -> Result<(), TransportError> {
        self.record(Call::Upload {
            host: host.to_string(),
            local: local.to_path_buf(),
            remote_dir: remote_dir.to_string(),
        });
        match self.failure(host, remote_dir) {
            Some(detail) => Err(TransportError::Failed {
                operation: "upload",
                host: host.to_string(),
                status: Some(1),
                detail,
            }),
            None => Ok(()),
        }
    }

    async fn download(&self, host: &str, remote: &str, local: &Path) -> Result<(), TransportError> {
        self.record(Call::Download {
            host: host.to_string(),
            remote: remote.to_string(),
            local: local.to_path_buf(),
        });
        if let Some(detail) = self.failure(host, remote) {
            return Err(TransportError::Failed {
                operation: "download",
                host: host.to_string(),
                status: Some(1),
                detail,
            });
        }
        write(local, "INFO booted\nWARN slow peer\n");
        Ok(())
    }
}
