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

//! Error type shared by all parts of the crate

use std::path::PathBuf;

/// Errors produced while indexing files or generating responses
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The path does not exist (or is not present in the stat cache).
    #[error("no file at {0:?}")]
    MissingFile(PathBuf),

    /// The path points to a directory rather than a file.
    #[error("path {0:?} is a directory")]
    IsDirectory(PathBuf),

    /// The path exists but is neither a file nor a directory (socket, device, FIFO).
    #[error("path {0:?} is not a regular file")]
    NotARegularFile(PathBuf),

    /// A `Range` header could not be parsed. Requests recover from this by serving the entire
    /// file.
    #[error("invalid range specifier: {0}")]
    InvalidRangeSpec(String),

    /// None of the file variants is acceptable according to the `Accept-Encoding` header. This
    /// only happens if the identity variant is missing, which indicates a bug.
    #[error("no acceptable encoding for the requested file")]
    NoAcceptableEncoding,

    /// Invalid settings or an inconsistent combination of settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O error while accessing the file system.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A computed header value contains characters not allowed in HTTP headers.
    #[error(transparent)]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// An invalid regular expression was configured.
    #[error(transparent)]
    Regex(#[from] regex::Error),

    /// The manifest file could not be parsed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The configuration file could not be parsed.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Returns `true` for the errors meaning that nothing can be served from the path. Lookups
    /// treat these as "no match" and continue with the next candidate.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            Self::MissingFile(_) | Self::IsDirectory(_) | Self::NotARegularFile(_)
        )
    }
}

/// Result type used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;
