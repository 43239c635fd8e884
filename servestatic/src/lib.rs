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

//! # Static asset serving engine
//!
//! This crate decides how static files are served over HTTP: which file a URL maps to, which
//! headers are sent, whether a conditional request results in `304 Not Modified`, which
//! pre-compressed variant of a file is chosen and which part of it is sent for a byte range
//! request. Producing the actual HTTP response is left to a transport, see the
//! `servestatic-transport` crate.
//!
//! ## Supported functionality
//!
//! * `GET` and `HEAD` requests, `405 Method Not Allowed` for everything else
//! * File index built once at startup, or autorefresh mode looking up files on every request
//! * Directory index files with relative redirects between `dir`, `dir/` and `dir/index.html`
//! * Conditional requests via `If-None-Match` and `If-Modified-Since` HTTP headers
//! * Single byte ranges via the `Range` HTTP header
//! * Pre-compressed files (gzip, zlib deflate, Brotli, Zstandard), the smallest variant
//!   acceptable to the client is served
//! * Far-future caching for immutable files, recognized via a regular expression, a custom
//!   policy or an asset manifest
//!
//! ## Known limitations
//!
//! * Requests with multiple byte ranges are not supported and will result in the full file being
//!   returned.
//! * Files are never compressed on the fly, compressed variants have to be produced by the build
//!   pipeline.
//!
//! ## Code example
//!
//! ```rust,no_run
//! use servestatic::{decode_path, ServeStatic, ServeStaticConf};
//!
//! let conf = ServeStaticConf::from_yaml(
//!     r#"
//! roots:
//! - path: /var/www/static
//!   prefix: /static/
//! index_file: true
//! "#,
//! )
//! .unwrap();
//! let index = ServeStatic::new(conf).unwrap();
//!
//! let request = http::Request::get("/static/app.js")
//!     .header("Accept-Encoding", "br, gzip")
//!     .body(())
//!     .unwrap();
//! if let Some(responder) = index.resolve(&decode_path(request.uri().path())).unwrap() {
//!     let response = responder.get_response(&request).unwrap();
//!     println!("{} {:?}", response.status, response.headers);
//! }
//! ```

pub mod compression_algorithm;
pub mod configuration;
pub mod entry;
mod error;
mod headers;
pub mod immutable;
pub mod manifest;
pub mod media_types;
pub mod path;
pub mod range;
mod redirect;
mod resolver;
mod response;
mod static_file;


pub use compression_algorithm::CompressionAlgorithm;
pub use configuration::{IndexFile, RootDir, ServeStaticConf, ServeStaticOpt};
pub use entry::{FileEntry, FileKind, FileStat, StatCache};
pub use error::{Error, Result};
pub use headers::{RequestHead, ResponseHeaders};
pub use immutable::{ImmutabilityPolicy, ManifestImmutability, RegexImmutability};
pub use manifest::{AssetManifest, JsonManifest};
pub use media_types::MediaTypes;
pub use path::decode_path;
pub use redirect::Redirect;
pub use resolver::{HeaderHook, Responder, ServeStatic, ServeStaticBuilder, FOREVER};
pub use response::{AsyncSlicedFile, FileSlice, Response, SlicedFile};
pub use static_file::StaticFile;
