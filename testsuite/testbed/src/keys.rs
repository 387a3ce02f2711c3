// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// The public side of a key file written by the key generator. The private
/// key never leaves the file; only its path is tracked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeIdentity {
    pub name: String,
    pub public_key: String,
    pub private_key_file_path: PathBuf,
}

#[derive(Deserialize)]
struct KeyFile {
    name: String,
    #[serde(default)]
    public_key: Option<String>,
}

impl NodeIdentity {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|error| ConfigError::IO(path.display().to_string(), error))?;
        let key_file: KeyFile = serde_json::from_str(&contents)
            .map_err(|error| ConfigError::Json(path.display().to_string(), error))?;
        if key_file.name.is_empty() {
            return Err(ConfigError::Missing(format!("name in {}", path.display())));
        }
        Ok(Self {
            public_key: key_file.public_key.unwrap_or_else(|| key_file.name.clone()),
            name: key_file.name,
            private_key_file_path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validator-0.key");
        fs::write(&path, r#"{ "name": "Zm9vYmFy", "secret": "c2VjcmV0" }"#).unwrap();
        let identity = NodeIdentity::from_file(&path).unwrap();
        assert_eq!(identity.name, "Zm9vYmFy");
        assert_eq!(identity.public_key, "Zm9vYmFy");
        assert_eq!(identity.private_key_file_path, path);

        fs::write(&path, r#"{ "name": "" }"#).unwrap();
        assert!(matches!(NodeIdentity::from_file(&path), Err(ConfigError::Missing(_))));
        assert!(NodeIdentity::from_file(&dir.path().join("missing.key")).is_err());
    }
}
