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

//! Precomputed redirect responses

use http::header::{self, HeaderValue};
use http::StatusCode;

use crate::error::Result;
use crate::headers::ResponseHeaders;
use crate::path::encode_location;
use crate::response::Response;

/// A `302 Found` response to a relative location, used for directory and index file URLs.
#[derive(Debug, Clone)]
pub struct Redirect {
    location: String,
    headers: ResponseHeaders,
}

impl Redirect {
    /// Creates a redirect to the given (decoded) location. Additional headers like
    /// `Cache-Control` are sent before the `Location` header.
    pub fn new(location: &str, mut headers: ResponseHeaders) -> Result<Self> {
        let location = encode_location(location);
        headers.insert_header(header::LOCATION, HeaderValue::from_str(&location)?);
        Ok(Self { location, headers })
    }

    /// The percent-encoded redirect location
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Produces the redirect response. The query string of the request, unless missing or empty,
    /// is appended to the location. The response never has a body, regardless of the request method.
    pub fn get_response<B>(&self, query: Option<&str>) -> Result<Response<B>> {
        let mut headers = self.headers.clone();
        if let Some(query) = query.filter(|query| !query.is_empty()) {
            if let Some(location) = headers.get_mut(&header::LOCATION) {
                *location = HeaderValue::from_str(&format!("{}?{query}", self.location))?;
            }
        }
        Ok(Response::new(StatusCode::FOUND, headers))
    }
}
