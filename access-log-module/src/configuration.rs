// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Structures handling command line options and YAML deserialization for the Access Log Module

use clap::Args;
use log::trace;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::AccessLogError;
use crate::sink::DEFAULT_BUFFER_SIZE;

/// Command line options of the access log module
#[derive(Debug, Default, Args)]
pub struct AccessLogOpt {
    /// Access log file path
    ///
    /// Special value - writes to standard output.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Size of the access log buffer in bytes
    #[arg(long)]
    pub log_buffer_size: Option<usize>,
}

/// Configuration settings of the access log module
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AccessLogConf {
    /// Access log file path
    ///
    /// Special value `-` writes to standard output without any buffering.
    pub log_file: PathBuf,

    /// Size of the in-memory buffer in bytes, data is written to the file whenever the buffer
    /// is full
    pub buffer_size: usize,
}

impl Default for AccessLogConf {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("access.log"),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl AccessLogConf {
    /// Merges the command line options into the current configuration. Any command line options
    /// present overwrite existing settings.
    pub fn merge_with_opt(&mut self, opt: AccessLogOpt) {
        if let Some(log_file) = opt.log_file {
            self.log_file = log_file;
        }

        if let Some(buffer_size) = opt.log_buffer_size {
            self.buffer_size = buffer_size;
        }
    }

    /// Loads configuration from a YAML file.
    pub fn load_from_yaml(path: impl AsRef<Path>) -> Result<Self, AccessLogError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| AccessLogError::Configuration {
            path: path.to_owned(),
            source,
        })?;

        let conf: Self = serde_yaml::from_reader(BufReader::new(file))?;
        trace!("Loaded configuration file {}: {conf:#?}", path.display());
        Ok(conf)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: impl AsRef<str>) -> Result<Self, AccessLogError> {
        Ok(serde_yaml::from_str(yaml.as_ref())?)
    }
}
