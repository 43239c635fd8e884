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

//! Media type detection from file names

use std::collections::HashMap;
use std::path::Path;

const DEFAULT_TYPE: &str = "application/octet-stream";

/// Types that aren’t in the `mime_guess` table or where its choice is outdated. Keys are either
/// complete file names or extensions including the leading dot.
const BUILTIN_TYPES: &[(&str, &str)] = &[
    ("apple-app-site-association", "application/pseudo-json"),
    ("crossdomain.xml", "text/x-cross-domain-policy"),
    (".js", "text/javascript"),
    (".mjs", "text/javascript"),
    (".map", "application/json"),
    (".webmanifest", "application/manifest+json"),
    (".woff", "font/woff"),
    (".woff2", "font/woff2"),
    (".wasm", "application/wasm"),
    (".md", "text/markdown"),
    (".avif", "image/avif"),
];

/// Maps file names to media types.
///
/// The lookup tries the complete lower-case file name first, then its extension. Custom
/// mappings take precedence over the built-in ones, `mime_guess` is consulted last.
#[derive(Debug, Clone, Default)]
pub struct MediaTypes {
    overrides: HashMap<String, String>,
}

impl MediaTypes {
    /// Creates a media type table with additional mappings. Keys are file names like
    /// `robots.txt` or extensions with a leading dot like `.gz`.
    pub fn new<I, K, V>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            overrides: overrides
                .into_iter()
                .map(|(key, value)| (key.as_ref().to_lowercase(), value.into()))
                .collect(),
        }
    }

    /// Determines the media type of a file, without any parameters.
    pub fn get_type(&self, path: &Path) -> &str {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let ext = name
            .rfind('.')
            .map(|index| &name[index..])
            .filter(|ext| ext.len() > 1);

        let keys = std::iter::once(name.as_str()).chain(ext);
        for key in keys.clone() {
            if let Some(media_type) = self.overrides.get(key) {
                return media_type;
            }
        }
        for key in keys {
            if let Some((_, media_type)) = BUILTIN_TYPES.iter().find(|(name, _)| *name == key) {
                return media_type;
            }
        }

        ext.and_then(|ext| mime_guess::from_ext(&ext[1..]).first_raw())
            .unwrap_or(DEFAULT_TYPE)
    }

    /// Produces the `Content-Type` header value for a file, adding the charset parameter to
    /// textual types.
    pub fn content_type(&self, path: &Path, charset: &str) -> String {
        let media_type = self.get_type(path);
        if media_type.starts_with("text/") {
            format!("{media_type}; charset={charset}")
        } else {
            media_type.to_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media_types() -> MediaTypes {
        MediaTypes::new([(".JS", "application/x-custom"), ("robots.txt", "text/x-robots")])
    }

    #[test]
    fn builtin_types() {
        let types = MediaTypes::default();
        assert_eq!(types.get_type(Path::new("app.js")), "text/javascript");
        assert_eq!(types.get_type(Path::new("APP.MJS")), "text/javascript");
        assert_eq!(types.get_type(Path::new("font.woff2")), "font/woff2");
        assert_eq!(
            types.get_type(Path::new("/srv/.well-known/apple-app-site-association")),
            "application/pseudo-json"
        );
        assert_eq!(
            types.get_type(Path::new("crossdomain.xml")),
            "text/x-cross-domain-policy"
        );
    }

    #[test]
    fn guessed_and_unknown_types() {
        let types = MediaTypes::default();
        assert_eq!(types.get_type(Path::new("style.css")), "text/css");
        assert_eq!(types.get_type(Path::new("image.png")), "image/png");
        assert_eq!(
            types.get_type(Path::new("data.unknownext")),
            "application/octet-stream"
        );
        assert_eq!(types.get_type(Path::new("README")), "application/octet-stream");
        assert_eq!(types.get_type(Path::new("trailing.")), "application/octet-stream");
    }

    #[test]
    fn overrides() {
        let types = media_types();
        assert_eq!(types.get_type(Path::new("app.js")), "application/x-custom");
        assert_eq!(types.get_type(Path::new("robots.txt")), "text/x-robots");
        assert_eq!(types.get_type(Path::new("humans.txt")), "text/plain");
    }

    #[test]
    fn charset() {
        let types = MediaTypes::default();
        assert_eq!(
            types.content_type(Path::new("index.html"), "utf-8"),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            types.content_type(Path::new("app.js"), "latin-1"),
            "text/javascript; charset=latin-1"
        );
        assert_eq!(
            types.content_type(Path::new("image.png"), "utf-8"),
            "image/png"
        );
    }
}
