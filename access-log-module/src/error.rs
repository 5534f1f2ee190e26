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

//! Error types of the access log module

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while setting up or feeding the access log
#[derive(Debug, Error)]
pub enum AccessLogError {
    /// The log file could not be opened or created
    #[error("failed opening log file {}: {source}", path.display())]
    Open {
        /// Path of the log file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// A configuration file could not be read
    #[error("failed reading configuration file {}: {source}", path.display())]
    Configuration {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// Configuration data is not valid
    #[error("failed parsing configuration: {0}")]
    ConfigurationParse(#[from] serde_yaml::Error),
    /// Writing or flushing log data failed
    #[error("failed writing log data: {0}")]
    Write(#[from] std::io::Error),
    /// The log writer task is no longer running
    #[error("log writer is gone, thread crashed?")]
    SinkClosed,
}

/// Error returned by [`ResponseWriter::write`](crate::ResponseWriter::write)
///
/// Unlike a plain I/O error, this keeps track of the number of bytes that were accepted before
/// the failure occurred.
#[derive(Debug, Error)]
#[error("response write failed after {written} bytes: {source}")]
pub struct WriteError {
    /// Number of bytes accepted before the error
    pub written: usize,
    /// Underlying I/O error
    #[source]
    pub source: std::io::Error,
}

impl WriteError {
    /// Creates an error for a write that accepted `written` bytes before failing.
    pub fn partial(written: usize, source: std::io::Error) -> Self {
        Self { written, source }
    }
}
