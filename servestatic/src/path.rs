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

//! URL path helpers

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Component, Path};

// Everything except unreserved characters and the path separator
const LOCATION_ESC_CHARSET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Decodes the raw URI path of a request: percent-decoding first, then interpreting the result
/// as UTF-8 with invalid sequences replaced.
pub fn decode_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Percent-encodes a URL path for use in the `Location` header. Only unreserved characters and
/// slashes are kept as is.
pub fn encode_location(location: &str) -> String {
    utf8_percent_encode(location, LOCATION_ESC_CHARSET).to_string()
}

/// Checks whether a decoded URL path is in its canonical form: no backslashes and no empty,
/// `.` or `..` segments. A trailing slash is allowed, `/` is canonical while an empty path
/// isn’t.
pub fn url_is_canonical(url: &str) -> bool {
    if url.contains('\\') {
        return false;
    }
    if url == "/" {
        return true;
    }

    let url = url.strip_prefix('/').unwrap_or(url);
    let url = url.strip_suffix('/').unwrap_or(url);
    !url.is_empty()
        && url
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Normalizes a URL prefix so that it starts and ends with a slash. An empty prefix becomes `/`.
pub fn ensure_leading_trailing_slash(prefix: Option<&str>) -> String {
    let prefix = prefix.unwrap_or("").trim_matches('/');
    if prefix.is_empty() {
        "/".to_owned()
    } else {
        format!("/{prefix}/")
    }
}

/// Converts the location of a file below `root` into a relative URL path (no leading slash).
///
/// This returns `None` for paths outside the root directory and paths that cannot be
/// represented as Unicode.
pub fn relative_url(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?),
            _ => return None,
        }
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_urls() {
        assert!(url_is_canonical("/"));
        assert!(url_is_canonical("/static/app.js"));
        assert!(url_is_canonical("/static/docs/"));
        assert!(url_is_canonical("/static/file..name"));

        assert!(!url_is_canonical(""));
        assert!(!url_is_canonical("/static/../secret"));
        assert!(!url_is_canonical("/static/./app.js"));
        assert!(!url_is_canonical("/static//app.js"));
        assert!(!url_is_canonical("//"));
        assert!(!url_is_canonical("/static\\app.js"));
        assert!(!url_is_canonical("/.."));
    }

    #[test]
    fn prefixes() {
        assert_eq!(ensure_leading_trailing_slash(None), "/");
        assert_eq!(ensure_leading_trailing_slash(Some("")), "/");
        assert_eq!(ensure_leading_trailing_slash(Some("/")), "/");
        assert_eq!(ensure_leading_trailing_slash(Some("foo")), "/foo/");
        assert_eq!(ensure_leading_trailing_slash(Some("/foo/bar/")), "/foo/bar/");
    }

    #[test]
    fn decoding() {
        assert_eq!(decode_path("/static/a%20b.txt"), "/static/a b.txt");
        assert_eq!(decode_path("/%E2%82%AC.txt"), "/\u{20ac}.txt");
        assert_eq!(decode_path("/%FF.txt"), "/\u{fffd}.txt");
        assert_eq!(decode_path("/%2e%2e/x"), "/../x");
    }

    #[test]
    fn encoding() {
        assert_eq!(encode_location("docs/"), "docs/");
        assert_eq!(encode_location("./"), "./");
        assert_eq!(encode_location("a b/"), "a%20b/");
        assert_eq!(encode_location("\u{20ac}/"), "%E2%82%AC/");
    }

    #[test]
    fn relative_urls() {
        let root = Path::new("/srv/static");
        assert_eq!(
            relative_url(root, Path::new("/srv/static/css/site.css")).as_deref(),
            Some("css/site.css")
        );
        assert_eq!(relative_url(root, Path::new("/srv/other/file")), None);
    }
}
