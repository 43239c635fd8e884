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

//! File metadata handling: stat snapshots and verified file entries

use log::{trace, warn};
use std::collections::HashMap;
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Kind of a file system object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// A regular file
    File,
    /// A directory
    Directory,
    /// Anything else: sockets, devices, FIFOs
    Other,
}

/// The subset of `stat()` results needed to serve a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Kind of the file system object
    pub kind: FileKind,
    /// Size in bytes
    pub size: u64,
    /// Modification time, `None` if unknown or at the epoch
    pub mtime: Option<SystemTime>,
}

impl From<&Metadata> for FileStat {
    fn from(meta: &Metadata) -> Self {
        let kind = if meta.is_file() {
            FileKind::File
        } else if meta.is_dir() {
            FileKind::Directory
        } else {
            FileKind::Other
        };
        Self {
            kind,
            size: meta.len(),
            mtime: meta
                .modified()
                .ok()
                .filter(|mtime| *mtime > SystemTime::UNIX_EPOCH),
        }
    }
}

/// A snapshot of file metadata keyed by absolute path. When building the file index this avoids
/// repeated `stat()` calls, it can also be produced from a manifest without touching the disk at
/// all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatCache {
    entries: HashMap<PathBuf, FileStat>,
}

impl StatCache {
    /// Walks the directory tree under `root` (following symbolic links) and records every
    /// non-directory entry found. Entries that cannot be accessed are logged and skipped.
    pub fn scan(root: &Path) -> Self {
        let mut cache = Self::default();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("failed scanning directory {}: {err}", root.display());
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            match entry.metadata() {
                Ok(meta) => {
                    let stat = FileStat::from(&meta);
                    cache.insert(entry.into_path(), stat);
                }
                Err(err) => warn!("failed retrieving metadata for {:?}: {err}", entry.path()),
            }
        }
        trace!("found {} files under {}", cache.len(), root.display());
        cache
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, path: PathBuf, stat: FileStat) {
        self.entries.insert(path, stat);
    }

    /// Looks up the entry for a path.
    pub fn get(&self, path: &Path) -> Option<&FileStat> {
        self.entries.get(path)
    }

    /// Checks whether the cache contains an entry for the path.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Returns all paths in the cache, sorted.
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths: Vec<_> = self.entries.keys().map(PathBuf::as_path).collect();
        paths.sort();
        paths
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(PathBuf, FileStat)> for StatCache {
    fn from_iter<T: IntoIterator<Item = (PathBuf, FileStat)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A path verified to reference a regular file, along with its size and modification time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Modification time if known
    pub mtime: Option<SystemTime>,
}

impl FileEntry {
    /// Creates an entry for the path, taking the metadata from the stat cache if one is given
    /// and querying the file system otherwise.
    ///
    /// Results in [`Error::MissingFile`] for paths that don’t exist (or aren’t in the cache),
    /// [`Error::IsDirectory`] for directories and [`Error::NotARegularFile`] for anything else
    /// that isn’t a regular file.
    pub fn new(path: &Path, stat_cache: Option<&StatCache>) -> Result<Self> {
        let stat = Self::stat(path, stat_cache)?;
        match stat.kind {
            FileKind::File => Ok(Self {
                path: path.to_owned(),
                size: stat.size,
                mtime: stat.mtime,
            }),
            FileKind::Directory => Err(Error::IsDirectory(path.to_owned())),
            FileKind::Other => Err(Error::NotARegularFile(path.to_owned())),
        }
    }

    fn stat(path: &Path, stat_cache: Option<&StatCache>) -> Result<FileStat> {
        if let Some(stat_cache) = stat_cache {
            return stat_cache
                .get(path)
                .copied()
                .ok_or_else(|| Error::MissingFile(path.to_owned()));
        }

        match path.metadata() {
            Ok(meta) => Ok(FileStat::from(&meta)),
            Err(err) if is_missing(&err) => Err(Error::MissingFile(path.to_owned())),
            Err(err) => Err(err.into()),
        }
    }
}

/// `ENAMETOOLONG` (`ERROR_FILENAME_EXCED_RANGE` on Windows)
#[cfg(any(target_os = "linux", target_os = "android"))]
const NAME_TOO_LONG: Option<i32> = Some(36);
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
const NAME_TOO_LONG: Option<i32> = Some(63);
#[cfg(windows)]
const NAME_TOO_LONG: Option<i32> = Some(206);
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    windows
)))]
const NAME_TOO_LONG: Option<i32> = None;

/// A path that cannot exist counts as missing, e.g. the `.gz` sibling of a file whose name
/// already has the maximal length.
fn is_missing(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::NotFound
        || (NAME_TOO_LONG.is_some() && err.raw_os_error() == NAME_TOO_LONG)
}
