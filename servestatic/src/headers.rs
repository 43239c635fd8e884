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

//! Request and response header abstractions

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};

/// An ordered list of response headers. Unlike [`HeaderMap`] this keeps the insertion order of
/// all headers, which is also the order they are sent to the client in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders(Vec<(HeaderName, HeaderValue)>);

impl ResponseHeaders {
    /// Creates an empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty header list with room for `capacity` headers.
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Adds a header at the end of the list, keeping any existing headers with the same name.
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.0.push((name, value));
    }

    /// Replaces all headers with the given name by a single one added at the end of the list.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.remove_header(&name);
        self.0.push((name, value));
    }

    /// Removes all headers with the given name, returning `true` if any were present.
    pub fn remove_header(&mut self, name: &HeaderName) -> bool {
        let len = self.0.len();
        self.0.retain(|(existing, _)| existing != name);
        self.0.len() != len
    }

    /// Returns the value of the first header with the given name.
    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    /// Returns a mutable reference to the value of the first header with the given name.
    pub fn get_mut(&mut self, name: &HeaderName) -> Option<&mut HeaderValue> {
        self.0
            .iter_mut()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    /// Checks whether a header with the given name is present.
    pub fn contains(&self, name: &HeaderName) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over all headers in order.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> + '_ {
        self.0.iter().map(|(name, value)| (name, value))
    }

    /// Number of headers in the list
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(HeaderName, HeaderValue)> for ResponseHeaders {
    fn from_iter<T: IntoIterator<Item = (HeaderName, HeaderValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ResponseHeaders {
    type Item = (HeaderName, HeaderValue);
    type IntoIter = std::vec::IntoIter<(HeaderName, HeaderValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<ResponseHeaders> for HeaderMap {
    fn from(headers: ResponseHeaders) -> Self {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            map.append(name, value);
        }
        map
    }
}

/// The parts of an HTTP request relevant when serving static files. Header lookups are
/// case-insensitive.
pub trait RequestHead {
    /// Request method
    fn method(&self) -> &Method;

    /// Request headers
    fn headers(&self) -> &HeaderMap;

    /// Request URI
    fn uri(&self) -> &Uri;

    /// The raw (still percent-encoded) query string if any
    fn query(&self) -> Option<&str> {
        self.uri().query()
    }

    /// The raw (still percent-encoded) URI path
    fn path(&self) -> &str {
        self.uri().path()
    }
}

impl<B> RequestHead for http::Request<B> {
    fn method(&self) -> &Method {
        http::Request::method(self)
    }

    fn headers(&self) -> &HeaderMap {
        http::Request::headers(self)
    }

    fn uri(&self) -> &Uri {
        http::Request::uri(self)
    }
}

impl RequestHead for http::request::Parts {
    fn method(&self) -> &Method {
        &self.method
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn uri(&self) -> &Uri {
        &self.uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::header;

    #[test]
    fn insert_replaces_and_moves_to_end() {
        let mut headers = ResponseHeaders::new();
        headers.append_header(header::CACHE_CONTROL, HeaderValue::from_static("a"));
        headers.append_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.append_header(header::CACHE_CONTROL, HeaderValue::from_static("b"));
        headers.insert_header(header::CACHE_CONTROL, HeaderValue::from_static("c"));

        let names: Vec<_> = headers.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["content-type", "cache-control"]);
        assert_eq!(
            headers.get(&header::CACHE_CONTROL),
            Some(&HeaderValue::from_static("c"))
        );
    }

    #[test]
    fn remove_header() {
        let mut headers: ResponseHeaders = [
            (header::CONTENT_LENGTH, HeaderValue::from(12u64)),
            (header::ETAG, HeaderValue::from_static("\"x\"")),
        ]
        .into_iter()
        .collect();

        assert!(headers.remove_header(&header::CONTENT_LENGTH));
        assert!(!headers.remove_header(&header::CONTENT_LENGTH));
        assert_eq!(headers.len(), 1);
        assert!(headers.contains(&header::ETAG));
    }

    #[test]
    fn request_head_for_parts() {
        let request = http::Request::builder()
            .method(Method::HEAD)
            .uri("/static/app.js?v=1")
            .header("accept-encoding", "gzip")
            .body(())
            .unwrap();
        assert_eq!(RequestHead::path(&request), "/static/app.js");
        assert_eq!(RequestHead::query(&request), Some("v=1"));

        let (parts, _) = request.into_parts();
        assert_eq!(parts.method(), Method::HEAD);
        assert_eq!(parts.path(), "/static/app.js");
        assert_eq!(
            parts.headers().get("Accept-Encoding").unwrap(),
            &HeaderValue::from_static("gzip")
        );
    }
}
