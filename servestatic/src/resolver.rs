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

//! File index mapping URLs to responders

use http::header::{self, HeaderValue};
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::fmt::Debug;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::configuration::ServeStaticConf;
use crate::entry::{FileKind, StatCache};
use crate::error::{Error, Result};
use crate::headers::{RequestHead, ResponseHeaders};
use crate::immutable::{ImmutabilityPolicy, ManifestImmutability, RegexImmutability};
use crate::manifest::{AssetManifest, JsonManifest};
use crate::media_types::MediaTypes;
use crate::path::{ensure_leading_trailing_slash, relative_url, url_is_canonical};
use crate::redirect::Redirect;
use crate::response::{AsyncSlicedFile, FileSlice, Response, SlicedFile};
use crate::static_file::StaticFile;

/// `max-age` value for immutable files: ten years, the same nginx uses for `expires max`
pub const FOREVER: u64 = 10 * 365 * 24 * 60 * 60;

/// Adds custom headers to a file’s response headers. Called with the headers computed so far,
/// the file path and its URL once per file (per request in autorefresh mode).
///
/// Closures taking the same parameters implement this trait.
pub trait HeaderHook: Send + Sync {
    /// Modifies the response headers of the file at `path` served under `url`.
    fn add_headers(&self, headers: &mut ResponseHeaders, path: &Path, url: &str);
}

impl<F> HeaderHook for F
where
    F: Fn(&mut ResponseHeaders, &Path, &str) + Send + Sync,
{
    fn add_headers(&self, headers: &mut ResponseHeaders, path: &Path, url: &str) {
        self(headers, path, url)
    }
}

impl Debug for dyn HeaderHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HeaderHook")
    }
}

/// Result of a successful URL lookup
#[derive(Debug, Clone)]
pub enum Responder {
    /// A file to be served
    File(Arc<StaticFile>),
    /// A redirect, typically between a directory and its index file
    Redirect(Arc<Redirect>),
}

impl Responder {
    /// Decides on the response for a request, the body is only described and not opened yet.
    pub fn response(&self, request: &impl RequestHead) -> Result<Response<FileSlice>> {
        match self {
            Self::File(file) => file.response(request.method(), request.headers()),
            Self::Redirect(redirect) => redirect.get_response(request.query()),
        }
    }

    /// Produces the response for a request and opens the file for synchronous reading.
    pub fn get_response(&self, request: &impl RequestHead) -> Result<Response<SlicedFile<File>>> {
        Ok(self.response(request)?.open()?)
    }

    /// Produces the response for a request and opens the file for asynchronous reading.
    pub async fn get_response_async(
        &self,
        request: &(impl RequestHead + Sync),
    ) -> Result<Response<AsyncSlicedFile>> {
        let response = self.response(request)?;
        Ok(response.open_async().await?)
    }
}

/// Builder for [`ServeStatic`] allowing to add the settings that cannot be expressed in a
/// configuration file.
#[derive(Debug)]
pub struct ServeStaticBuilder {
    conf: ServeStaticConf,
    header_hook: Option<Box<dyn HeaderHook>>,
    immutability: Option<Box<dyn ImmutabilityPolicy>>,
    manifest: Option<Arc<dyn AssetManifest>>,
}

impl ServeStaticBuilder {
    /// Sets a hook adding custom response headers.
    pub fn header_hook(mut self, hook: impl HeaderHook + 'static) -> Self {
        self.header_hook = Some(Box::new(hook));
        self
    }

    /// Sets the policy recognizing immutable files, replacing `immutable_file_test` from the
    /// configuration.
    pub fn immutability_policy(mut self, policy: impl ImmutabilityPolicy + 'static) -> Self {
        self.immutability = Some(Box::new(policy));
        self
    }

    /// Sets the asset manifest, replacing the `manifest` setting from the configuration.
    pub fn manifest(mut self, manifest: Arc<dyn AssetManifest>) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Builds the file index. Unless autorefresh mode is enabled, this scans all configured
    /// directories.
    pub fn build(self) -> Result<ServeStatic> {
        let conf = self.conf;

        let manifest = match (self.manifest, &conf.manifest) {
            (Some(manifest), _) => Some(manifest),
            (None, Some(path)) => {
                let manifest: Arc<dyn AssetManifest> =
                    Arc::new(JsonManifest::load(path, &conf.static_url)?);
                Some(manifest)
            }
            (None, None) => None,
        };

        let mut immutability: Vec<Box<dyn ImmutabilityPolicy>> = Vec::new();
        if let Some(policy) = self.immutability {
            immutability.push(policy);
        } else if let Some(regex) = &conf.immutable_file_test {
            immutability.push(Box::new(RegexImmutability::new(regex)?));
        }
        if let Some(manifest) = &manifest {
            immutability.push(Box::new(ManifestImmutability::new(
                &conf.static_url,
                manifest.clone(),
            )));
        }

        if conf.use_manifest_stats && manifest.is_none() {
            return Err(Error::Configuration(
                "use_manifest_stats requires a manifest".to_owned(),
            ));
        }

        let roots = conf.roots.clone();
        let mut index = ServeStatic {
            media_types: MediaTypes::new(&conf.mimetypes),
            conf,
            immutability,
            header_hook: self.header_hook,
            files: HashMap::new(),
            directories: Vec::new(),
        };

        for root in roots {
            match &manifest {
                Some(manifest) if index.conf.use_manifest_stats && !index.conf.autorefresh => {
                    index.add_files_from_manifest(
                        &root.path,
                        root.prefix.as_deref(),
                        &**manifest,
                    )?;
                }
                _ => index.add_files(&root.path, root.prefix.as_deref())?,
            }
        }

        if index.conf.autorefresh {
            info!(
                "Serving static files from {} directories, autorefresh enabled",
                index.directories.len()
            );
        } else {
            info!("Indexed {} static file URLs", index.files.len());
        }
        Ok(index)
    }
}

/// The static files index: maps request URLs to files or redirects.
///
/// In the default mode all directories are scanned once and lookups are plain hash map accesses.
/// In autorefresh mode the file system is consulted on every lookup, so that added or changed
/// files are picked up without a restart.
#[derive(Debug)]
pub struct ServeStatic {
    conf: ServeStaticConf,
    media_types: MediaTypes,
    immutability: Vec<Box<dyn ImmutabilityPolicy>>,
    header_hook: Option<Box<dyn HeaderHook>>,
    files: HashMap<String, Responder>,
    directories: Vec<(PathBuf, String)>,
}

impl ServeStatic {
    /// Creates the index from configuration.
    pub fn new(conf: ServeStaticConf) -> Result<Self> {
        Self::builder(conf).build()
    }

    /// Starts building an index with additional programmatic settings.
    pub fn builder(conf: ServeStaticConf) -> ServeStaticBuilder {
        ServeStaticBuilder {
            conf,
            header_hook: None,
            immutability: None,
            manifest: None,
        }
    }

    /// The configuration of this index
    pub fn conf(&self) -> &ServeStaticConf {
        &self.conf
    }

    /// Whether the file system is consulted on every lookup
    pub fn autorefresh(&self) -> bool {
        self.conf.autorefresh
    }

    /// Registered directories along with their URL prefixes, most recently added first
    pub fn directories(&self) -> &[(PathBuf, String)] {
        &self.directories
    }

    /// URLs known to the index. This is always empty in autorefresh mode unless files were
    /// added explicitly.
    pub fn files(&self) -> &HashMap<String, Responder> {
        &self.files
    }

    /// Makes the files in `root` available under the URL `prefix`. Directories added later take
    /// precedence over the ones added earlier.
    ///
    /// A missing directory only produces a warning.
    pub fn add_files(&mut self, root: impl AsRef<Path>, prefix: Option<&str>) -> Result<()> {
        let root = absolute_path(root.as_ref())?;
        let prefix = ensure_leading_trailing_slash(prefix);
        self.record_directory(root.clone(), prefix.clone());

        if self.conf.autorefresh {
            debug!("Will look up files in {} for prefix {prefix}", root.display());
            Ok(())
        } else if root.is_dir() {
            let stat_cache = StatCache::scan(&root);
            for path in stat_cache.paths() {
                let Some(relative) = relative_url(&root, path) else {
                    warn!("Skipping file {path:?}, cannot map it to a URL");
                    continue;
                };
                let url = format!("{prefix}{relative}");
                self.add_file_to_dictionary(&url, path, Some(&stat_cache))?;
            }
            debug!(
                "Added {} files from {} under prefix {prefix}",
                stat_cache.len(),
                root.display()
            );
            Ok(())
        } else {
            warn!("No directory at: {}", root.display());
            Ok(())
        }
    }

    /// Makes the files listed in the manifest’s stats available under the URL `prefix`, using
    /// the recorded metadata instead of querying the file system. The manifest stats are
    /// expected to be relative to `root`.
    pub fn add_files_from_manifest(
        &mut self,
        root: impl AsRef<Path>,
        prefix: Option<&str>,
        manifest: &dyn AssetManifest,
    ) -> Result<()> {
        let Some(stats) = manifest.stats() else {
            return Err(Error::Configuration(
                "the manifest does not contain file stats".to_owned(),
            ));
        };

        let root = absolute_path(root.as_ref())?;
        let prefix = ensure_leading_trailing_slash(prefix);
        self.record_directory(root.clone(), prefix.clone());

        let stat_cache: StatCache = stats
            .iter()
            .map(|(name, stat)| (root.join(name), *stat))
            .collect();
        let mut names: Vec<_> = stats
            .iter()
            .filter(|(_, stat)| stat.kind != FileKind::Directory)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();

        for name in names {
            let url = format!("{prefix}{}", name.trim_start_matches('/'));
            self.add_file_to_dictionary(&url, &root.join(name), Some(&stat_cache))?;
        }
        debug!(
            "Added {} manifest entries for {} under prefix {prefix}",
            stat_cache.len(),
            root.display()
        );
        Ok(())
    }

    /// Registers a single file under the given URL. Pre-compressed variants of other files are
    /// skipped, index files are also registered under their directory URL.
    pub fn add_file_to_dictionary(
        &mut self,
        url: &str,
        path: &Path,
        stat_cache: Option<&StatCache>,
    ) -> Result<()> {
        if self.is_compressed_variant(path, stat_cache) {
            trace!("Skipping compressed variant {path:?}");
            return Ok(());
        }

        let mut url = url.to_owned();
        if let Some(index_file) = self.conf.index_file.name() {
            if let Some(index_url) = url
                .strip_suffix(index_file)
                .filter(|index_url| index_url.ends_with('/'))
            {
                let index_url = index_url.to_owned();
                let index_no_slash = index_url.trim_end_matches('/').to_owned();

                let redirect = self.redirect(&url, &index_url)?;
                self.files.insert(url, redirect);
                if !index_no_slash.is_empty() {
                    let redirect = self.redirect(&index_no_slash, &index_url)?;
                    self.files.insert(index_no_slash, redirect);
                }
                url = index_url;
            }
        }

        match self.get_static_file(path, &url, stat_cache) {
            Ok(file) => {
                trace!("Registered {url} => {path:?}");
                self.files.insert(url, Responder::File(Arc::new(file)));
            }
            Err(Error::NotARegularFile(_)) => {
                warn!("Skipping {path:?}, not a regular file");
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Looks up the responder for a decoded URL path. Returns `None` if no file matches, in
    /// which case the request should be passed on.
    pub fn resolve(&self, url: &str) -> Result<Option<Responder>> {
        if self.conf.index_file.name().is_none() && url.ends_with('/') {
            return Ok(None);
        }
        if !url_is_canonical(url) {
            debug!("Rejecting non-canonical URL {url:?}");
            return Ok(None);
        }

        if self.conf.autorefresh {
            self.find_file(url)
        } else {
            Ok(self.files.get(url).cloned())
        }
    }

    /// Same as [`ServeStatic::resolve`]. In autorefresh mode the file system access happens on
    /// tokio’s blocking thread pool.
    pub async fn resolve_async(self: &Arc<Self>, url: &str) -> Result<Option<Responder>> {
        if !self.conf.autorefresh {
            return self.resolve(url);
        }

        let index = self.clone();
        let url = url.to_owned();
        tokio::task::spawn_blocking(move || index.resolve(&url))
            .await
            .map_err(|err| Error::Io(std::io::Error::other(err)))?
    }

    fn record_directory(&mut self, root: PathBuf, prefix: String) {
        for (other_root, other_prefix) in &self.directories {
            if other_prefix.starts_with(&prefix) || prefix.starts_with(other_prefix.as_str()) {
                warn!(
                    "URL prefix {prefix} for {} overlaps with prefix {other_prefix} for {}, \
                     files from {} take precedence",
                    root.display(),
                    other_root.display(),
                    root.display()
                );
            }
        }
        self.directories.insert(0, (root, prefix));
    }

    fn find_file(&self, url: &str) -> Result<Option<Responder>> {
        for path in self.candidate_paths(url) {
            match self.find_file_at_path(&path, url) {
                Ok(responder) => {
                    debug!("Resolved {url} to {path:?}");
                    return Ok(Some(responder));
                }
                Err(err) if err.is_missing() => trace!("No match for {url}: {err}"),
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    fn candidate_paths(&self, url: &str) -> Vec<PathBuf> {
        self.directories
            .iter()
            .filter_map(|(root, prefix)| {
                let path = root.join(url.strip_prefix(prefix.as_str())?);
                path.starts_with(root).then_some(path)
            })
            .collect()
    }

    fn find_file_at_path(&self, path: &Path, url: &str) -> Result<Responder> {
        if self.is_compressed_variant(path, None) {
            return Err(Error::MissingFile(path.to_owned()));
        }

        let Some(index_file) = self.conf.index_file.name() else {
            return Ok(Responder::File(Arc::new(self.get_static_file(path, url, None)?)));
        };

        if url.ends_with('/') {
            let path = path.join(index_file);
            return Ok(Responder::File(Arc::new(self.get_static_file(&path, url, None)?)));
        }

        if let Some(dir_url) = url
            .strip_suffix(index_file)
            .filter(|dir_url| dir_url.ends_with('/'))
        {
            if path.is_file() {
                return self.redirect(url, dir_url);
            }
        } else {
            match self.get_static_file(path, url, None) {
                Ok(file) => return Ok(Responder::File(Arc::new(file))),
                Err(Error::IsDirectory(_)) => {
                    if path.join(index_file).is_file() {
                        return self.redirect(url, &format!("{url}/"));
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::MissingFile(path.to_owned()))
    }

    fn is_compressed_variant(&self, path: &Path, stat_cache: Option<&StatCache>) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        if !self
            .conf
            .precompressed
            .iter()
            .any(|algorithm| algorithm.ext() == ext)
        {
            return false;
        }

        let uncompressed = path.with_extension("");
        match stat_cache {
            Some(stat_cache) => stat_cache.contains(&uncompressed),
            None => uncompressed.is_file(),
        }
    }

    fn is_immutable(&self, path: &Path, url: &str) -> bool {
        self.immutability
            .iter()
            .any(|policy| policy.is_immutable(path, url))
    }

    fn get_static_file(
        &self,
        path: &Path,
        url: &str,
        stat_cache: Option<&StatCache>,
    ) -> Result<StaticFile> {
        if stat_cache.is_none() && !path.exists() {
            return Err(Error::MissingFile(path.to_owned()));
        }

        let mut headers = ResponseHeaders::new();
        headers.append_header(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&self.media_types.content_type(path, &self.conf.charset))?,
        );
        if self.is_immutable(path, url) {
            headers.insert_header(
                header::CACHE_CONTROL,
                HeaderValue::from_str(&format!("max-age={FOREVER}, public, immutable"))?,
            );
        } else if let Some(max_age) = self.conf.max_age {
            headers.insert_header(
                header::CACHE_CONTROL,
                HeaderValue::from_str(&format!("max-age={max_age}, public"))?,
            );
        }
        if self.conf.allow_all_origins {
            headers.insert_header(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
        }
        if let Some(hook) = &self.header_hook {
            hook.add_headers(&mut headers, path, url);
        }

        let encodings: Vec<_> = self
            .conf
            .precompressed
            .iter()
            .map(|algorithm| (*algorithm, algorithm.variant_path(path)))
            .collect();
        StaticFile::new(path, headers, &encodings, stat_cache)
    }

    /// Produces a relative redirect, either from a directory URL without trailing slash to the
    /// one with it or from an index file URL to its directory.
    fn redirect(&self, from: &str, to: &str) -> Result<Responder> {
        let location = if to.strip_suffix('/') == Some(from) {
            format!("{}/", from.rsplit('/').next().unwrap_or(from))
        } else if self
            .conf
            .index_file
            .name()
            .is_some_and(|index_file| from.strip_suffix(index_file) == Some(to))
        {
            "./".to_owned()
        } else {
            return Err(Error::Configuration(format!(
                "cannot handle redirect: {from} > {to}"
            )));
        };

        let mut headers = ResponseHeaders::new();
        if let Some(max_age) = self.conf.max_age {
            headers.append_header(
                header::CACHE_CONTROL,
                HeaderValue::from_str(&format!("max-age={max_age}, public"))?,
            );
        }
        Ok(Responder::Redirect(Arc::new(Redirect::new(&location, headers)?)))
    }
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_owned())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use test_log::test;

    use crate::configuration::IndexFile;

    fn index(conf: ServeStaticConf) -> ServeStatic {
        ServeStatic::new(conf).unwrap()
    }

    fn location(responder: &Responder) -> &str {
        match responder {
            Responder::Redirect(redirect) => redirect.location(),
            Responder::File(_) => panic!("expected a redirect"),
        }
    }

    #[test]
    fn redirect_locations() {
        let index = index(ServeStaticConf {
            index_file: IndexFile::from(true),
            ..Default::default()
        });
        assert_eq!(
            location(&index.redirect("/static/docs", "/static/docs/").unwrap()),
            "docs/"
        );
        assert_eq!(
            location(
                &index
                    .redirect("/static/docs/index.html", "/static/docs/")
                    .unwrap()
            ),
            "./"
        );
        assert!(matches!(
            index.redirect("/a", "/b"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn redirect_cache_headers() {
        let index = index(ServeStaticConf {
            max_age: None,
            ..Default::default()
        });
        let Responder::Redirect(redirect) = index.redirect("/docs", "/docs/").unwrap() else {
            panic!("expected a redirect");
        };
        let response = redirect.get_response::<()>(None).unwrap();
        assert_eq!(response.headers.len(), 1);
        assert!(response.headers.contains(&header::LOCATION));
    }

    #[test]
    fn compressed_variants() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.js"), "x").unwrap();
        fs::write(dir.path().join("app.js.gz"), "x").unwrap();
        fs::write(dir.path().join("archive.gz"), "x").unwrap();
        fs::write(dir.path().join("app.js.zst"), "x").unwrap();

        let index = index(ServeStaticConf::default());
        assert!(index.is_compressed_variant(&dir.path().join("app.js.gz"), None));
        assert!(!index.is_compressed_variant(&dir.path().join("archive.gz"), None));
        assert!(!index.is_compressed_variant(&dir.path().join("app.js"), None));
        // Not a configured encoding
        assert!(!index.is_compressed_variant(&dir.path().join("app.js.zst"), None));

        let stat_cache = StatCache::scan(dir.path());
        assert!(index.is_compressed_variant(&dir.path().join("app.js.gz"), Some(&stat_cache)));
        assert!(!index.is_compressed_variant(&dir.path().join("archive.gz"), Some(&stat_cache)));
    }

    #[test]
    fn candidate_paths() {
        let mut index = index(ServeStaticConf {
            autorefresh: true,
            ..Default::default()
        });
        index.add_files("/srv/first", None).unwrap();
        index.add_files("/srv/second", Some("static")).unwrap();

        assert_eq!(
            index.candidate_paths("/static/app.js"),
            vec![
                PathBuf::from("/srv/second/app.js"),
                PathBuf::from("/srv/first/static/app.js")
            ]
        );
        assert_eq!(
            index.candidate_paths("/app.js"),
            vec![PathBuf::from("/srv/first/app.js")]
        );
    }

    #[test]
    fn header_hook() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("robots.txt"), "User-agent: *\n").unwrap();

        let conf = ServeStaticConf {
            allow_all_origins: false,
            max_age: None,
            ..Default::default()
        };
        let mut index = ServeStatic::builder(conf)
            .header_hook(|headers: &mut ResponseHeaders, _: &Path, url: &str| {
                headers.append_header(
                    header::HeaderName::from_static("x-url"),
                    HeaderValue::from_str(url).unwrap(),
                );
            })
            .build()
            .unwrap();
        index.add_files(dir.path(), Some("/")).unwrap();

        let Some(Responder::File(file)) = index.resolve("/robots.txt").unwrap() else {
            panic!("expected a file");
        };
        let response = file
            .response(&http::Method::GET, &http::HeaderMap::new())
            .unwrap();
        let names: Vec<_> = response
            .headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["content-type", "x-url", "last-modified", "etag", "content-length"]
        );
        assert_eq!(
            response.headers.get(&header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            response
                .headers
                .get(&header::HeaderName::from_static("x-url"))
                .unwrap(),
            "/robots.txt"
        );
    }

    #[test]
    fn resolve_bails_early() {
        let index = index(ServeStaticConf::default());
        assert!(index.resolve("/").unwrap().is_none());
        assert!(index.resolve("/docs/").unwrap().is_none());
        assert!(index.resolve("/../etc/passwd").unwrap().is_none());
    }

    #[test]
    fn use_manifest_stats_without_manifest() {
        assert!(matches!(
            ServeStatic::new(ServeStaticConf {
                use_manifest_stats: true,
                ..Default::default()
            }),
            Err(Error::Configuration(_))
        ));
    }
}
