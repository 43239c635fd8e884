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

//! Policies deciding which files can be cached forever

use regex::Regex;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use crate::manifest::AssetManifest;
use crate::path::ensure_leading_trailing_slash;

/// Decides whether a file is immutable, meaning that its URL will change whenever its contents
/// change. Typically the URL contains a content hash then.
///
/// Immutable files are sent with a `Cache-Control` header allowing clients to cache them
/// forever. Closures taking the file path and URL implement this trait.
pub trait ImmutabilityPolicy: Send + Sync {
    /// Returns `true` if the file at `path` served under `url` is immutable.
    fn is_immutable(&self, path: &Path, url: &str) -> bool;
}

impl<F> ImmutabilityPolicy for F
where
    F: Fn(&Path, &str) -> bool + Send + Sync,
{
    fn is_immutable(&self, path: &Path, url: &str) -> bool {
        self(path, url)
    }
}

/// Considers files immutable if the regular expression matches anywhere in their URL.
#[derive(Debug, Clone)]
pub struct RegexImmutability {
    regex: Regex,
}

impl RegexImmutability {
    /// Compiles the regular expression.
    pub fn new(regex: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(regex)?,
        })
    }
}

impl ImmutabilityPolicy for RegexImmutability {
    fn is_immutable(&self, _path: &Path, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

/// Recognizes versioned files produced by a build pipeline with a manifest, file names like
/// `css/application.f3ea4bcc2.css`.
///
/// A URL below the static prefix is immutable if removing the hash segment from its name gives a
/// name that the manifest maps back to a URL with the same file name.
#[derive(Debug, Clone)]
pub struct ManifestImmutability {
    static_prefix: String,
    manifest: Arc<dyn AssetManifest>,
}

impl ManifestImmutability {
    /// Creates the policy for files served under `static_prefix`.
    pub fn new(static_prefix: &str, manifest: Arc<dyn AssetManifest>) -> Self {
        Self {
            static_prefix: ensure_leading_trailing_slash(Some(static_prefix)),
            manifest,
        }
    }
}

impl ImmutabilityPolicy for ManifestImmutability {
    fn is_immutable(&self, _path: &Path, url: &str) -> bool {
        let Some(name) = url.strip_prefix(self.static_prefix.as_str()) else {
            return false;
        };
        let name_without_hash = name_without_hash(name);
        if name == name_without_hash {
            return false;
        }

        self.manifest
            .url_for(&name_without_hash)
            .is_some_and(|static_url| basename(&static_url) == basename(url))
    }
}

/// Splits a file name into its stem and extension (including the dot). Leading dots of the last
/// path segment don’t count as extension separators.
fn split_ext(name: &str) -> (&str, &str) {
    let segment_start = name.rfind('/').map_or(0, |index| index + 1);
    let segment = &name[segment_start..];
    let leading_dots = segment.len() - segment.trim_start_matches('.').len();
    match segment.rfind('.') {
        Some(index) if index >= leading_dots => name.split_at(segment_start + index),
        _ => (name, ""),
    }
}

/// Removes the version hash from a file name, e.g. `css/application.f3ea4bcc2.css` becomes
/// `css/application.css`.
pub fn name_without_hash(name: &str) -> String {
    let (name_with_hash, ext) = split_ext(name);
    let (name, _) = split_ext(name_with_hash);
    format!("{name}{ext}")
}

fn basename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

impl Debug for dyn ImmutabilityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ImmutabilityPolicy")
    }
}
