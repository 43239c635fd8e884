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

//! Handles the compression algorithms of pre-compressed file variants and matching them against
//! the `Accept-Encoding` HTTP header.

use regex::Regex;
use serde::Deserialize;
use std::ffi::OsString;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Represents a compression algorithm choice.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
pub enum CompressionAlgorithm {
    /// gzip compression
    #[serde(rename = "gz")]
    Gzip,
    /// deflate (zlib) compression
    #[serde(rename = "zz")]
    Deflate,
    /// Brotli compression
    #[serde(rename = "br")]
    Brotli,
    /// Zstandard compression
    #[serde(rename = "zst")]
    Zstandard,
}

impl CompressionAlgorithm {
    /// Returns the file extension corresponding to the algorithm.
    pub fn ext(&self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Deflate => "zz",
            Self::Brotli => "br",
            Self::Zstandard => "zst",
        }
    }

    /// Determines the algorithm corresponding to the file extension if any.
    pub fn from_ext(ext: &str) -> Option<Self> {
        match ext {
            "gz" => Some(Self::Gzip),
            "zz" => Some(Self::Deflate),
            "br" => Some(Self::Brotli),
            "zst" => Some(Self::Zstandard),
            _ => None,
        }
    }

    /// Returns the algorithm name as used in `Accept-Encoding` HTTP header.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Brotli => "br",
            Self::Zstandard => "zstd",
        }
    }

    /// Determines the algorithm corresponding to a name from `Accept-Encoding` HTTP header.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            "br" => Some(Self::Brotli),
            "zstd" => Some(Self::Zstandard),
            _ => None,
        }
    }

    /// Returns the path of the pre-compressed variant of a file, e.g. `app.js.gz` for `app.js`.
    pub fn variant_path(&self, path: &Path) -> PathBuf {
        let mut variant = OsString::from(path.as_os_str());
        variant.push(".");
        variant.push(self.ext());
        variant.into()
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = UnsupportedCompressionAlgorithm;

    /// Coverts a file extension into a compression algorithm.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompressionAlgorithm::from_ext(s).ok_or(UnsupportedCompressionAlgorithm(s.to_owned()))
    }
}

impl Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.name())
    }
}

/// The error type returned by `CompressionAlgorithm::from_str()`
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported compression algorithm: {0}")]
pub struct UnsupportedCompressionAlgorithm(String);

/// Decides whether a file variant is acceptable to the client.
///
/// An encoding is accepted if its name appears as a whole word anywhere in the `Accept-Encoding`
/// header. Quality values are not evaluated: among the acceptable variants the smallest one
/// wins. The identity encoding is always acceptable.
#[derive(Debug, Clone)]
pub struct EncodingMatcher {
    pattern: Option<Regex>,
}

impl EncodingMatcher {
    /// Creates a matcher for the given algorithm, `None` meaning the identity encoding.
    pub fn new(algorithm: Option<CompressionAlgorithm>) -> Result<Self, regex::Error> {
        let pattern = algorithm
            .map(|algorithm| Regex::new(&format!(r"\b{}\b", regex::escape(algorithm.name()))))
            .transpose()?;
        Ok(Self { pattern })
    }

    /// Checks the values of all `Accept-Encoding` headers sent by the client. A lone `*` value
    /// is treated like an empty header.
    pub fn accepts(&self, accept_encoding: &[&str]) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };
        if accept_encoding == ["*"] {
            return false;
        }
        accept_encoding.iter().any(|value| pattern.is_match(value))
    }
}
