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

//! A servable file with all its response headers precomputed

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use httpdate::{fmt_http_date, parse_http_date};
use log::{debug, trace};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::compression_algorithm::{CompressionAlgorithm, EncodingMatcher};
use crate::entry::{FileEntry, StatCache};
use crate::error::{Error, Result};
use crate::headers::ResponseHeaders;
use crate::range::Range;
use crate::response::{AsyncSlicedFile, FileSlice, Response, SlicedFile};

/// Headers kept in `304 Not Modified` responses, in this order
const NOT_MODIFIED_HEADERS: [HeaderName; 6] = [
    header::CACHE_CONTROL,
    header::CONTENT_LOCATION,
    header::DATE,
    header::ETAG,
    header::EXPIRES,
    header::VARY,
];

/// One representation of a file: the original or a pre-compressed variant.
#[derive(Debug)]
struct Alternative {
    encoding: Option<CompressionAlgorithm>,
    matcher: EncodingMatcher,
    path: Arc<Path>,
    size: u64,
    headers: ResponseHeaders,
}

impl Alternative {
    fn body(&self, start: u64, len: u64) -> FileSlice {
        FileSlice::new(self.path.clone(), start, len)
    }

    fn partial_response(&self, start: u64, end: u64, with_body: bool) -> Result<Response<FileSlice>> {
        let len = end - start + 1;
        let mut headers = self.headers.clone();
        headers.remove_header(&header::CONTENT_LENGTH);
        headers.append_header(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes {start}-{end}/{}", self.size))?,
        );
        headers.append_header(header::CONTENT_LENGTH, HeaderValue::from(len));

        let response = Response::new(StatusCode::PARTIAL_CONTENT, headers);
        Ok(if with_body {
            response.with_body(self.body(start, len))
        } else {
            response
        })
    }

    fn not_satisfiable_response(&self) -> Result<Response<FileSlice>> {
        let mut headers = ResponseHeaders::with_capacity(1);
        headers.append_header(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes */{}", self.size))?,
        );
        Ok(Response::new(StatusCode::RANGE_NOT_SATISFIABLE, headers))
    }
}

/// A file along with its pre-compressed variants and all response headers computed in advance.
///
/// Responding to a request only involves header comparisons, picking one of the variants and
/// cloning the corresponding headers.
#[derive(Debug)]
pub struct StaticFile {
    last_modified: Option<SystemTime>,
    etag: Option<String>,
    not_modified: ResponseHeaders,
    alternatives: Vec<Alternative>,
}

impl StaticFile {
    /// Creates a static file from its path and base headers. `encodings` lists the candidate
    /// paths of pre-compressed variants, the ones that don’t exist are ignored.
    ///
    /// The stat cache, if given, is used instead of querying the file system.
    pub fn new(
        path: &Path,
        headers: ResponseHeaders,
        encodings: &[(CompressionAlgorithm, PathBuf)],
        stat_cache: Option<&StatCache>,
    ) -> Result<Self> {
        let files = Self::file_entries(path, encodings, stat_cache)?;
        let headers = Self::complete_headers(headers, &files)?;

        let last_modified = headers
            .get(&header::LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| parse_http_date(value).ok());
        let etag = headers
            .get(&header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let not_modified = NOT_MODIFIED_HEADERS
            .iter()
            .filter_map(|name| Some((name.clone(), headers.get(name)?.clone())))
            .collect();

        let mut alternatives = files
            .into_iter()
            .map(|(encoding, entry)| Self::alternative(&headers, encoding, entry))
            .collect::<Result<Vec<_>>>()?;
        // Stable sort, the identity variant comes first and wins ties.
        alternatives.sort_by_key(|alternative| alternative.size);

        Ok(Self {
            last_modified,
            etag,
            not_modified,
            alternatives,
        })
    }

    fn file_entries(
        path: &Path,
        encodings: &[(CompressionAlgorithm, PathBuf)],
        stat_cache: Option<&StatCache>,
    ) -> Result<Vec<(Option<CompressionAlgorithm>, FileEntry)>> {
        let mut files = vec![(None, FileEntry::new(path, stat_cache)?)];
        for (encoding, alt_path) in encodings {
            match FileEntry::new(alt_path, stat_cache) {
                Ok(entry) => files.push((Some(*encoding), entry)),
                Err(Error::MissingFile(_) | Error::IsDirectory(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(files)
    }

    fn complete_headers(
        mut headers: ResponseHeaders,
        files: &[(Option<CompressionAlgorithm>, FileEntry)],
    ) -> Result<ResponseHeaders> {
        let main = &files[0].1;

        if files.len() > 1 {
            headers.insert_header(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        }

        if !headers.contains(&header::LAST_MODIFIED) {
            if let Some(mtime) = main.mtime {
                headers.insert_header(
                    header::LAST_MODIFIED,
                    HeaderValue::from_str(&fmt_http_date(mtime))?,
                );
            }
        }

        if !headers.contains(&header::ETAG) {
            let last_modified = headers
                .get(&header::LAST_MODIFIED)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| parse_http_date(value).ok())
                .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok());
            if let Some(last_modified) = last_modified {
                headers.insert_header(
                    header::ETAG,
                    HeaderValue::from_str(&format!(
                        "\"{:x}-{:x}\"",
                        last_modified.as_secs(),
                        main.size
                    ))?,
                );
            }
        }

        Ok(headers)
    }

    fn alternative(
        headers: &ResponseHeaders,
        encoding: Option<CompressionAlgorithm>,
        entry: FileEntry,
    ) -> Result<Alternative> {
        let mut headers = headers.clone();
        headers.insert_header(header::CONTENT_LENGTH, HeaderValue::from(entry.size));
        if let Some(encoding) = encoding {
            headers.insert_header(
                header::CONTENT_ENCODING,
                HeaderValue::from_static(encoding.name()),
            );
        }

        Ok(Alternative {
            encoding,
            matcher: EncodingMatcher::new(encoding)?,
            path: entry.path.into(),
            size: entry.size,
            headers,
        })
    }

    /// The `Last-Modified` time of the file if known
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    /// The `ETag` header value of the file if known
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Encodings available for this file, smallest variant first. `None` stands for the
    /// identity encoding.
    pub fn encodings(&self) -> impl Iterator<Item = Option<CompressionAlgorithm>> + '_ {
        self.alternatives
            .iter()
            .map(|alternative| alternative.encoding)
    }

    /// Decides on the response for a request without touching the file system.
    ///
    /// This checks the request method, evaluates conditional headers, chooses the smallest
    /// variant acceptable to the client and processes the `Range` header. Fails with
    /// [`Error::NoAcceptableEncoding`] if none of the variants is acceptable, which can only
    /// happen if the identity variant is missing.
    pub fn response(&self, method: &Method, headers: &HeaderMap) -> Result<Response<FileSlice>> {
        if method != Method::GET && method != Method::HEAD {
            debug!("denying method {method}");
            return Ok(method_not_allowed());
        }

        if self.is_not_modified(headers) {
            debug!("If-None-Match/If-Modified-Since check resulted in Not Modified");
            return Ok(Response::new(
                StatusCode::NOT_MODIFIED,
                self.not_modified.clone(),
            ));
        }

        let alternative = self.select_alternative(headers)?;
        trace!("serving {:?}", alternative.path);
        let with_body = method != Method::HEAD;

        if let Some(range) = headers
            .get(header::RANGE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
        {
            match Range::parse(range, alternative.size) {
                Some(Range::Valid(start, end)) => {
                    debug!("bytes range requested: {start}-{end}");
                    return alternative.partial_response(start, end, with_body);
                }
                Some(Range::NotSatisfiable) => {
                    debug!("requested bytes range is not satisfiable");
                    return alternative.not_satisfiable_response();
                }
                None => {}
            }
        }

        let response = Response::new(StatusCode::OK, alternative.headers.clone());
        Ok(if with_body {
            response.with_body(alternative.body(0, alternative.size))
        } else {
            response
        })
    }

    /// Produces the response for a request and opens the file for synchronous reading.
    pub fn get_response(
        &self,
        method: &Method,
        headers: &HeaderMap,
    ) -> Result<Response<SlicedFile<File>>> {
        Ok(self.response(method, headers)?.open()?)
    }

    /// Produces the response for a request and opens the file for asynchronous reading.
    pub async fn get_response_async(
        &self,
        method: &Method,
        headers: &HeaderMap,
    ) -> Result<Response<AsyncSlicedFile>> {
        Ok(self.response(method, headers)?.open_async().await?)
    }

    fn is_not_modified(&self, headers: &HeaderMap) -> bool {
        if let Some(value) = headers.get(header::IF_NONE_MATCH) {
            return self
                .etag
                .as_ref()
                .is_some_and(|etag| value.as_bytes() == etag.as_bytes());
        }

        let Some(last_modified) = self.last_modified else {
            return false;
        };
        headers
            .get(header::IF_MODIFIED_SINCE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| parse_http_date(value).ok())
            .is_some_and(|since| since >= last_modified)
    }

    fn select_alternative(&self, headers: &HeaderMap) -> Result<&Alternative> {
        let accept_encoding = headers
            .get_all(header::ACCEPT_ENCODING)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>();
        self.alternatives
            .iter()
            .find(|alternative| alternative.matcher.accepts(&accept_encoding))
            .ok_or(Error::NoAcceptableEncoding)
    }
}

/// Produces the `405 Method Not Allowed` response.
pub(crate) fn method_not_allowed<B>() -> Response<B> {
    let mut headers = ResponseHeaders::with_capacity(1);
    headers.append_header(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
    Response::new(StatusCode::METHOD_NOT_ALLOWED, headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use test_log::test;

    fn setup(variants: &[(&str, usize)]) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.js");
        fs::write(&path, "console.log(1)\n").unwrap();
        for (ext, size) in variants {
            fs::write(dir.path().join(format!("app.js.{ext}")), vec![b'x'; *size]).unwrap();
        }
        (dir, path)
    }

    fn base_headers() -> ResponseHeaders {
        let mut headers = ResponseHeaders::new();
        headers.append_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/javascript; charset=utf-8"),
        );
        headers.append_header(
            header::CACHE_CONTROL,
            HeaderValue::from_static("max-age=60, public"),
        );
        headers
    }

    fn make_file(path: &Path) -> StaticFile {
        let encodings = [
            (
                CompressionAlgorithm::Gzip,
                CompressionAlgorithm::Gzip.variant_path(path),
            ),
            (
                CompressionAlgorithm::Brotli,
                CompressionAlgorithm::Brotli.variant_path(path),
            ),
        ];
        StaticFile::new(path, base_headers(), &encodings, None).unwrap()
    }

    fn request(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    fn header<'a, B>(response: &'a Response<B>, name: &HeaderName) -> Option<&'a str> {
        response
            .headers
            .get(name)
            .map(|value| value.to_str().unwrap())
    }

    #[test]
    fn precomputed_headers() {
        let (_dir, path) = setup(&[]);
        let file = make_file(&path);
        let mtime = fs::metadata(&path).unwrap().modified().unwrap();

        let response = file.response(&Method::GET, &HeaderMap::new()).unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(header(&response, &header::CONTENT_LENGTH), Some("15"));
        assert_eq!(header(&response, &header::VARY), None);
        assert_eq!(header(&response, &header::CONTENT_ENCODING), None);
        assert_eq!(
            header(&response, &header::LAST_MODIFIED),
            Some(fmt_http_date(mtime).as_str())
        );

        let secs = mtime
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let etag = format!("\"{secs:x}-f\"");
        assert_eq!(header(&response, &header::ETAG), Some(etag.as_str()));
        assert_eq!(file.etag(), Some(etag.as_str()));

        let body = response.body.unwrap();
        assert_eq!(body.start(), 0);
        assert_eq!(body.len(), 15);
    }

    #[test]
    fn supplied_headers_are_kept() {
        let (_dir, path) = setup(&[]);
        let mut headers = base_headers();
        headers.append_header(header::ETAG, HeaderValue::from_static("\"custom\""));
        headers.append_header(
            header::LAST_MODIFIED,
            HeaderValue::from_static("Fri, 15 May 2015 15:34:21 GMT"),
        );
        let file = StaticFile::new(&path, headers, &[], None).unwrap();

        assert_eq!(file.etag(), Some("\"custom\""));
        assert_eq!(
            file.last_modified(),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1431704061))
        );
    }

    #[test]
    fn missing_primary() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            StaticFile::new(&dir.path().join("nope.js"), base_headers(), &[], None),
            Err(Error::MissingFile(_))
        ));
    }

    #[test]
    fn smallest_acceptable_variant() {
        let (_dir, path) = setup(&[("gz", 10), ("br", 8)]);
        let file = make_file(&path);
        assert_eq!(
            file.encodings().collect::<Vec<_>>(),
            vec![
                Some(CompressionAlgorithm::Brotli),
                Some(CompressionAlgorithm::Gzip),
                None
            ]
        );

        let response = file
            .response(
                &Method::GET,
                &request(&[("Accept-Encoding", "gzip, deflate, br")]),
            )
            .unwrap();
        assert_eq!(header(&response, &header::CONTENT_ENCODING), Some("br"));
        assert_eq!(header(&response, &header::CONTENT_LENGTH), Some("8"));
        assert_eq!(header(&response, &header::VARY), Some("Accept-Encoding"));
        assert!(response.body.unwrap().path().ends_with("app.js.br"));

        let response = file
            .response(&Method::GET, &request(&[("Accept-Encoding", "gzip")]))
            .unwrap();
        assert_eq!(header(&response, &header::CONTENT_ENCODING), Some("gzip"));
        assert_eq!(header(&response, &header::CONTENT_LENGTH), Some("10"));

        for accept in ["", "*", "identity"] {
            let response = file
                .response(&Method::GET, &request(&[("Accept-Encoding", accept)]))
                .unwrap();
            assert_eq!(header(&response, &header::CONTENT_ENCODING), None);
            assert_eq!(header(&response, &header::CONTENT_LENGTH), Some("15"));
            assert_eq!(header(&response, &header::VARY), Some("Accept-Encoding"));
        }
    }

    #[test]
    fn larger_variant_not_preferred() {
        let (_dir, path) = setup(&[("gz", 100)]);
        let file = make_file(&path);
        let response = file
            .response(&Method::GET, &request(&[("Accept-Encoding", "gzip")]))
            .unwrap();
        assert_eq!(header(&response, &header::CONTENT_ENCODING), None);
        assert_eq!(header(&response, &header::VARY), Some("Accept-Encoding"));
    }

    #[test]
    fn equal_size_prefers_identity() {
        let (_dir, path) = setup(&[("gz", 15)]);
        let file = make_file(&path);
        let response = file
            .response(&Method::GET, &request(&[("Accept-Encoding", "gzip")]))
            .unwrap();
        assert_eq!(header(&response, &header::CONTENT_ENCODING), None);
    }

    #[test]
    fn head_request() {
        let (_dir, path) = setup(&[]);
        let file = make_file(&path);
        let get = file.response(&Method::GET, &HeaderMap::new()).unwrap();
        let head = file.response(&Method::HEAD, &HeaderMap::new()).unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.headers, get.headers);
        assert!(head.body.is_none());
    }

    #[test]
    fn wrong_method() {
        let (_dir, path) = setup(&[]);
        let file = make_file(&path);
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS] {
            let response = file.response(&method, &HeaderMap::new()).unwrap();
            assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(header(&response, &header::ALLOW), Some("GET, HEAD"));
            assert_eq!(response.headers.len(), 1);
            assert!(response.body.is_none());
        }
    }

    #[test]
    fn if_none_match() {
        let (_dir, path) = setup(&[("gz", 5)]);
        let file = make_file(&path);
        let etag = file.etag().unwrap().to_owned();

        let response = file
            .response(&Method::GET, &request(&[("If-None-Match", etag.as_str())]))
            .unwrap();
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);
        assert!(response.body.is_none());
        let names: Vec<_> = response
            .headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["cache-control", "etag", "vary"]);

        // Other methods are rejected before conditional headers are evaluated.
        let response = file
            .response(&Method::POST, &request(&[("If-None-Match", etag.as_str())]))
            .unwrap();
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);

        let response = file
            .response(&Method::GET, &request(&[("If-None-Match", "\"other\"")]))
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);

        // If-None-Match takes precedence over If-Modified-Since.
        let response = file
            .response(
                &Method::GET,
                &request(&[
                    ("If-None-Match", "\"other\""),
                    ("If-Modified-Since", "Fri, 01 Jan 2100 00:00:00 GMT"),
                ]),
            )
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[test]
    fn if_modified_since() {
        let (_dir, path) = setup(&[]);
        let file = make_file(&path);
        let last_modified = fmt_http_date(file.last_modified().unwrap());

        let response = file
            .response(&Method::GET, &request(&[("If-Modified-Since", last_modified.as_str())]))
            .unwrap();
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);

        let response = file
            .response(
                &Method::HEAD,
                &request(&[("If-Modified-Since", "Fri, 01 Jan 2100 00:00:00 GMT")]),
            )
            .unwrap();
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);

        let response = file
            .response(
                &Method::GET,
                &request(&[("If-Modified-Since", "Thu, 01 Jan 1970 00:00:00 GMT")]),
            )
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let response = file
            .response(&Method::GET, &request(&[("If-Modified-Since", "bogus")]))
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[test]
    fn ranged_request() {
        let (_dir, path) = setup(&[]);
        let file = make_file(&path);

        let response = file
            .response(&Method::GET, &request(&[("Range", "bytes=0-13")]))
            .unwrap();
        assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(header(&response, &header::CONTENT_RANGE), Some("bytes 0-13/15"));
        assert_eq!(header(&response, &header::CONTENT_LENGTH), Some("14"));
        let names: Vec<_> = response
            .headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names.last(), Some(&"content-length"));
        assert_eq!(
            names.iter().filter(|name| **name == "content-length").count(),
            1
        );
        let body = response.body.unwrap();
        assert_eq!((body.start(), body.len()), (0, 14));

        let response = file
            .response(&Method::GET, &request(&[("Range", "bytes=-5")]))
            .unwrap();
        assert_eq!(header(&response, &header::CONTENT_RANGE), Some("bytes 10-14/15"));
        let body = response.body.unwrap();
        assert_eq!((body.start(), body.len()), (10, 5));

        let response = file
            .response(&Method::HEAD, &request(&[("Range", "bytes=2-")]))
            .unwrap();
        assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(header(&response, &header::CONTENT_LENGTH), Some("13"));
        assert!(response.body.is_none());
    }

    #[test]
    fn unsatisfiable_range() {
        let (_dir, path) = setup(&[]);
        let file = make_file(&path);

        for range in ["bytes=15-", "bytes=9-3"] {
            let response = file
                .response(&Method::GET, &request(&[("Range", range)]))
                .unwrap();
            assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
            assert_eq!(header(&response, &header::CONTENT_RANGE), Some("bytes */15"));
            assert_eq!(response.headers.len(), 1);
            assert!(response.body.is_none());
        }
    }

    #[test]
    fn malformed_range_ignored() {
        let (_dir, path) = setup(&[]);
        let file = make_file(&path);

        for range in ["bytes=1-2,5-6", "lines=1-2", "bytes=x-", ""] {
            let response = file
                .response(&Method::GET, &request(&[("Range", range)]))
                .unwrap();
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(header(&response, &header::CONTENT_LENGTH), Some("15"));
        }
    }

    #[test]
    fn range_applies_to_selected_variant() {
        let (_dir, path) = setup(&[("gz", 10)]);
        let file = make_file(&path);
        let response = file
            .response(
                &Method::GET,
                &request(&[("Accept-Encoding", "gzip"), ("Range", "bytes=0-")]),
            )
            .unwrap();
        assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(header(&response, &header::CONTENT_RANGE), Some("bytes 0-9/10"));
        assert_eq!(header(&response, &header::CONTENT_ENCODING), Some("gzip"));
    }

    #[test]
    fn get_response_reads_file() {
        let (_dir, path) = setup(&[]);
        let file = make_file(&path);
        let response = file
            .get_response(&Method::GET, &request(&[("Range", "bytes=8-13")]))
            .unwrap();
        let mut body = response.body.unwrap();
        let mut text = String::new();
        std::io::Read::read_to_string(&mut body, &mut text).unwrap();
        assert_eq!(text, "log(1)");
    }

    #[test(tokio::test)]
    async fn get_response_async_reads_file() {
        let (_dir, path) = setup(&[]);
        let file = make_file(&path);
        let response = file
            .get_response_async(&Method::GET, &HeaderMap::new())
            .await
            .unwrap();
        let mut body = response.body.unwrap();
        assert_eq!(
            body.read_chunk(100).await.unwrap(),
            bytes::Bytes::from_static(b"console.log(1)\n")
        );
    }
}
