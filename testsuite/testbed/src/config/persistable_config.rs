// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use serde::{Serialize, de::DeserializeOwned};
use std::{fs, path::Path};

pub trait PersistableConfig: Serialize + DeserializeOwned {
    /// Load the config from disk at the given path
    fn load_config<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_string = path.as_ref().display().to_string();
        let file_contents =
            fs::read_to_string(&path).map_err(|error| ConfigError::IO(path_string.clone(), error))?;
        Self::parse_serialized_config(&file_contents)
    }

    /// Save the config to disk at the given output path
    fn save_config<P: AsRef<Path>>(&self, output_file: P) -> Result<(), ConfigError> {
        let path_string = output_file.as_ref().display().to_string();
        let serialized_config = serde_yaml::to_string(&self)
            .map_err(|error| ConfigError::Yaml(path_string.clone(), error))?;
        if let Some(parent) = output_file.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|error| ConfigError::IO(path_string.clone(), error))?;
            }
        }
        fs::write(output_file.as_ref(), serialized_config)
            .map_err(|error| ConfigError::IO(path_string, error))
    }

    /// Parse the config from the serialized string
    fn parse_serialized_config(serialized_config: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(serialized_config)
            .map_err(|error| ConfigError::Yaml("config".to_string(), error))
    }
}
