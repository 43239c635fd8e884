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

//! Standard responses for various conditions

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use maud::{html, DOCTYPE};
use servestatic::ResponseHeaders;
use std::path::PathBuf;

use crate::writer::{AsyncResponseWriter, ResponseWriter};

/// Produces the text of a standard response page for the given status code. If `searched` isn’t
/// empty, the page lists these directories and their URL prefixes.
pub(crate) fn response_text(status: StatusCode, searched: &[(PathBuf, String)]) -> String {
    let status_str = status.as_str();
    let reason = status.canonical_reason().unwrap_or("");
    html! {
        (DOCTYPE)
        html {
            head {
                title {
                    (status_str) " " (reason)
                }
            }

            body {
                center {
                    h1 {
                        (status_str) " " (reason)
                    }
                }

                @if !searched.is_empty() {
                    p {
                        "Directories searched:"
                    }
                    ul {
                        @for (root, prefix) in searched {
                            li {
                                code { (prefix) } " → " code { (root.display().to_string()) }
                            }
                        }
                    }
                }
            }
        }
    }
    .into()
}

/// A complete standard response: headers and the body to send unless this is a `HEAD` request
#[derive(Debug)]
pub(crate) struct StandardResponse {
    status: StatusCode,
    headers: ResponseHeaders,
    body: Option<Bytes>,
}

impl StandardResponse {
    pub(crate) fn new(method: &Method, status: StatusCode, searched: &[(PathBuf, String)]) -> Self {
        let text = response_text(status, searched);

        let mut headers = ResponseHeaders::with_capacity(2);
        headers.append_header(header::CONTENT_LENGTH, HeaderValue::from(text.len()));
        headers.append_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );

        Self {
            status,
            headers,
            body: (method != Method::HEAD).then(|| text.into()),
        }
    }

    pub(crate) fn write(self, writer: &mut impl ResponseWriter) -> std::io::Result<()> {
        writer.write_response_header(self.status, &self.headers)?;
        writer.write_response_body(self.body.unwrap_or_default(), true)
    }

    pub(crate) async fn write_async(
        self,
        writer: &mut impl AsyncResponseWriter,
    ) -> std::io::Result<()> {
        writer
            .write_response_header(self.status, &self.headers)
            .await?;
        writer
            .write_response_body(self.body.unwrap_or_default(), true)
            .await
    }
}
