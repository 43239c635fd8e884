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

//! Data structures required for `ServeStatic` configuration

use clap::Parser;
use log::trace;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::compression_algorithm::CompressionAlgorithm;
use crate::error::Result;

/// Default name of directory index files
pub const DEFAULT_INDEX_FILE: &str = "index.html";

/// A directory to serve files from, along with the URL prefix it is served under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDir {
    /// Path to the directory
    pub path: PathBuf,
    /// URL prefix, `/` if missing
    pub prefix: Option<String>,
}

impl From<&str> for RootDir {
    fn from(value: &str) -> Self {
        Self {
            path: value.into(),
            prefix: None,
        }
    }
}

impl<'de> Deserialize<'de> for RootDir {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RootVisitor;

        impl<'de> Visitor<'de> for RootVisitor {
            type Value = RootDir;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("directory path or RootDir structure")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(v.into())
            }

            fn visit_borrowed_str<E>(self, v: &'de str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(v.into())
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                use serde::de::Error as _;

                const PATH_FIELD: &str = "path";
                const PREFIX_FIELD: &str = "prefix";

                let mut path = None;
                let mut prefix = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        PATH_FIELD => {
                            if path.is_some() {
                                return Err(A::Error::duplicate_field(PATH_FIELD));
                            }
                            path = Some(map.next_value()?);
                        }
                        PREFIX_FIELD => {
                            if prefix.is_some() {
                                return Err(A::Error::duplicate_field(PREFIX_FIELD));
                            }
                            prefix = Some(map.next_value()?);
                        }
                        other => {
                            return Err(A::Error::unknown_field(
                                other,
                                &[PATH_FIELD, PREFIX_FIELD],
                            ))
                        }
                    }
                }

                if let Some(path) = path {
                    Ok(Self::Value {
                        path,
                        prefix: prefix.flatten(),
                    })
                } else {
                    Err(A::Error::missing_field(PATH_FIELD))
                }
            }
        }

        deserializer.deserialize_any(RootVisitor)
    }
}

/// The index file setting: `false` disables index files, `true` enables them with the default
/// name `index.html`, a string enables them with a custom name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexFile(Option<String>);

impl IndexFile {
    /// Index files enabled with the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self(Some(name.into()))
    }

    /// Index files disabled
    pub fn disabled() -> Self {
        Self(None)
    }

    /// Name of the index file if enabled
    pub fn name(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl From<bool> for IndexFile {
    fn from(value: bool) -> Self {
        if value {
            Self::named(DEFAULT_INDEX_FILE)
        } else {
            Self::disabled()
        }
    }
}

impl<'de> Deserialize<'de> for IndexFile {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IndexFileVisitor;

        impl Visitor<'_> for IndexFileVisitor {
            type Value = IndexFile;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("boolean or index file name")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(v.into())
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v.is_empty() {
                    Ok(IndexFile::disabled())
                } else {
                    Ok(IndexFile::named(v))
                }
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(IndexFile::disabled())
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(IndexFile::disabled())
            }
        }

        deserializer.deserialize_any(IndexFileVisitor)
    }
}

/// Command line options of the static files server
#[derive(Debug, Default, Parser)]
pub struct ServeStaticOpt {
    /// Directory to serve files from. This command line flag can be specified multiple times,
    /// directories added later take precedence.
    #[clap(short, long)]
    pub root: Option<Vec<PathBuf>>,

    /// URL prefix for the directories given via --root, e.g. /static/
    #[clap(long)]
    pub prefix: Option<String>,

    /// Look up files on every request instead of indexing them once at startup. Useful during
    /// development.
    #[clap(long)]
    pub autorefresh: Option<bool>,

    /// Value of max-age in the Cache-Control header for files that aren’t immutable.
    #[clap(long)]
    pub max_age: Option<u64>,

    /// Name of the index file to serve for directory URLs, e.g. index.html
    #[clap(long)]
    pub index_file: Option<String>,

    /// Regular expression matching URLs of files that never change and can be cached forever.
    #[clap(long)]
    pub immutable_file_test: Option<String>,

    /// File extension to check when looking for pre-compressed versions of a file. This command
    /// line flag can be specified multiple times. Supported file extensions are gz (gzip),
    /// zz (zlib deflate), br (Brotli), zst (Zstandard).
    #[clap(long)]
    pub precompressed: Option<Vec<CompressionAlgorithm>>,

    /// Number of bytes to read from a file at once when sending it.
    #[clap(long)]
    pub block_size: Option<usize>,

    /// Path to a JSON manifest mapping original file names to hashed file names.
    #[clap(long)]
    pub manifest: Option<PathBuf>,

    /// Build the file index from the stats recorded in the manifest instead of scanning the
    /// directories.
    #[clap(long)]
    pub use_manifest_stats: bool,

    /// URL prefix under which the files listed in the manifest are served, e.g. /static/
    #[clap(long)]
    pub static_url: Option<String>,

    /// Charset parameter added to the Content-Type header of text files.
    #[clap(long)]
    pub charset: Option<String>,

    /// List the searched directories on the Not Found page (autorefresh mode only).
    #[clap(long)]
    pub verbose_not_found: bool,
}

/// Configuration file settings of the static files server
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServeStaticConf {
    /// Directories to serve files from. If multiple directories serve the same URL, the one
    /// listed last wins.
    pub roots: Vec<RootDir>,

    /// Look up files on every request instead of indexing them once at startup.
    pub autorefresh: bool,

    /// Value of max-age in the `Cache-Control` header for files that aren’t immutable, `None`
    /// to omit the header.
    pub max_age: Option<u64>,

    /// Add `Access-Control-Allow-Origin: *` to all responses.
    pub allow_all_origins: bool,

    /// Charset parameter added to the `Content-Type` header of text files.
    pub charset: String,

    /// Additional media types, keyed by file name (`robots.txt`) or extension (`.ext`).
    pub mimetypes: HashMap<String, String>,

    /// Index file handling for directory URLs.
    pub index_file: IndexFile,

    /// Regular expression matching URLs of files that can be cached forever.
    pub immutable_file_test: Option<String>,

    /// List of file extensions to check when looking for pre-compressed versions of a file.
    pub precompressed: Vec<CompressionAlgorithm>,

    /// Number of bytes to read from a file at once when sending it.
    pub block_size: usize,

    /// List the searched directories on the Not Found page (autorefresh mode only).
    pub verbose_not_found: bool,

    /// Path to a JSON manifest mapping original file names to hashed file names.
    pub manifest: Option<PathBuf>,

    /// Build the file index from the stats recorded in the manifest instead of scanning the
    /// directories.
    pub use_manifest_stats: bool,

    /// URL prefix under which the files listed in the manifest are served.
    pub static_url: String,
}

impl ServeStaticConf {
    /// Parses the configuration from a YAML string.
    pub fn from_yaml(yaml: impl AsRef<str>) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml.as_ref())?)
    }

    /// Loads the configuration from a YAML file.
    pub fn load_from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let conf = serde_yaml::from_reader(reader)?;
        trace!("Loaded configuration file: {conf:#?}");
        Ok(conf)
    }

    /// Merges the command line options into the current configuration. Any command line options
    /// present overwrite existing settings.
    pub fn merge_with_opt(&mut self, opt: ServeStaticOpt) {
        if let Some(root) = opt.root {
            self.roots = root
                .into_iter()
                .map(|path| RootDir {
                    path,
                    prefix: opt.prefix.clone(),
                })
                .collect();
        }

        if let Some(autorefresh) = opt.autorefresh {
            self.autorefresh = autorefresh;
        }

        if opt.max_age.is_some() {
            self.max_age = opt.max_age;
        }

        if let Some(index_file) = opt.index_file {
            self.index_file = IndexFile::named(index_file);
        }

        if opt.immutable_file_test.is_some() {
            self.immutable_file_test = opt.immutable_file_test;
        }

        if let Some(precompressed) = opt.precompressed {
            self.precompressed = precompressed;
        }

        if let Some(block_size) = opt.block_size {
            self.block_size = block_size;
        }

        if opt.manifest.is_some() {
            self.manifest = opt.manifest;
        }

        if opt.use_manifest_stats {
            self.use_manifest_stats = true;
        }

        if let Some(static_url) = opt.static_url {
            self.static_url = static_url;
        }

        if let Some(charset) = opt.charset {
            self.charset = charset;
        }

        if opt.verbose_not_found {
            self.verbose_not_found = true;
        }
    }
}

impl Default for ServeStaticConf {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            autorefresh: false,
            max_age: Some(60),
            allow_all_origins: true,
            charset: "utf-8".to_owned(),
            mimetypes: HashMap::new(),
            index_file: IndexFile::disabled(),
            immutable_file_test: None,
            precompressed: vec![CompressionAlgorithm::Gzip, CompressionAlgorithm::Brotli],
            block_size: 8192,
            verbose_not_found: false,
            manifest: None,
            use_manifest_stats: false,
            static_url: "/static/".to_owned(),
        }
    }
}
