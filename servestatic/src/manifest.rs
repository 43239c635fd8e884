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

//! Asset manifests produced by build pipelines that hash file names
//!
//! The manifest format is the one of Django’s `staticfiles.json`, optionally extended with a
//! `stats` field holding file metadata:
//!
//! ```json
//! {
//!   "paths": {"css/site.css": "css/site.f3ea4bcc2.css"},
//!   "stats": {"css/site.f3ea4bcc2.css": [33188, 1, 2, 1, 0, 0, 1234, 0, 1700000000, 0]}
//! }
//! ```
//!
//! Stat entries use the layout `[mode, ino, dev, nlink, uid, gid, size, atime, mtime, ctime]`.

use log::{debug, trace};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::entry::{FileKind, FileStat};
use crate::error::{Error, Result};
use crate::path::ensure_leading_trailing_slash;

const S_IFMT: u32 = 0o170000;
const S_IFREG: u32 = 0o100000;
const S_IFDIR: u32 = 0o040000;

/// Read-only access to the mapping of original asset names to their hashed names.
pub trait AssetManifest: Debug + Send + Sync {
    /// Returns the URL under which the asset with the given original name is served, `None` if
    /// the manifest doesn’t know the asset.
    fn url_for(&self, name: &str) -> Option<String>;

    /// All known assets, original name mapped to hashed name
    fn hashed_files(&self) -> &HashMap<String, String>;

    /// File metadata recorded at build time, keyed by path relative to the static root
    fn stats(&self) -> Option<&HashMap<String, FileStat>> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    paths: HashMap<String, String>,
    #[serde(default)]
    stats: Option<HashMap<String, Vec<f64>>>,
}

/// Converts a stat list into the metadata needed, only mode, size and mtime are used.
fn stat_from_list(name: &str, list: &[f64]) -> Result<FileStat> {
    let [mode, _, _, _, _, _, size, _, mtime, ..] = list else {
        return Err(Error::Configuration(format!(
            "manifest stats for {name} have {} fields, expected 10",
            list.len()
        )));
    };

    let kind = match (*mode as u32) & S_IFMT {
        S_IFREG => FileKind::File,
        S_IFDIR => FileKind::Directory,
        _ => FileKind::Other,
    };
    let mtime = if mtime.is_finite() && *mtime >= 1.0 {
        let mtime = Duration::try_from_secs_f64(*mtime)
            .ok()
            .and_then(|mtime| SystemTime::UNIX_EPOCH.checked_add(mtime))
            .ok_or_else(|| {
                Error::Configuration(format!("manifest stats for {name} have invalid mtime"))
            })?;
        Some(mtime)
    } else {
        None
    };
    Ok(FileStat {
        kind,
        size: *size as u64,
        mtime,
    })
}

/// A manifest loaded from a JSON file
#[derive(Debug, Clone, Default)]
pub struct JsonManifest {
    static_url: String,
    paths: HashMap<String, String>,
    stats: Option<HashMap<String, FileStat>>,
}

impl JsonManifest {
    /// Creates a manifest from its parts. `static_url` is the URL prefix the hashed names are
    /// served under.
    pub fn new(
        paths: HashMap<String, String>,
        stats: Option<HashMap<String, FileStat>>,
        static_url: &str,
    ) -> Self {
        Self {
            static_url: ensure_leading_trailing_slash(Some(static_url)),
            paths,
            stats,
        }
    }

    /// Parses the manifest from a JSON string.
    pub fn from_json(json: &str, static_url: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(json)?;
        Self::from_raw(raw, static_url)
    }

    /// Loads the manifest from a JSON file.
    pub fn load(path: impl AsRef<Path>, static_url: &str) -> Result<Self> {
        let path = path.as_ref();
        trace!("loading manifest {path:?}");
        let reader = BufReader::new(File::open(path)?);
        let raw: RawManifest = serde_json::from_reader(reader)?;
        let manifest = Self::from_raw(raw, static_url)?;
        debug!(
            "loaded manifest {path:?} with {} entries, stats: {}",
            manifest.paths.len(),
            manifest.stats.is_some()
        );
        Ok(manifest)
    }

    fn from_raw(raw: RawManifest, static_url: &str) -> Result<Self> {
        let stats = raw
            .stats
            .map(|stats| {
                stats
                    .into_iter()
                    .map(|(name, list)| {
                        let stat = stat_from_list(&name, &list)?;
                        Ok((name, stat))
                    })
                    .collect::<Result<HashMap<_, _>>>()
            })
            .transpose()?;
        Ok(Self::new(raw.paths, stats, static_url))
    }
}

impl AssetManifest for JsonManifest {
    fn url_for(&self, name: &str) -> Option<String> {
        let hashed = self.paths.get(name.trim_start_matches('/'))?;
        Some(format!("{}{hashed}", self.static_url))
    }

    fn hashed_files(&self) -> &HashMap<String, String> {
        &self.paths
    }

    fn stats(&self) -> Option<&HashMap<String, FileStat>> {
        self.stats.as_ref()
    }
}
