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

//! Destinations for responses: traits and the HTTP/1.x implementations

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::StatusCode;
use servestatic::ResponseHeaders;
use std::io::Write;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Receives a response synchronously. The header is always written first, followed by body
/// frames in order. The last body frame has `end_of_stream` set.
pub trait ResponseWriter {
    /// Writes the status and headers of the response.
    fn write_response_header(
        &mut self,
        status: StatusCode,
        headers: &ResponseHeaders,
    ) -> std::io::Result<()>;

    /// Writes a body frame, possibly empty.
    fn write_response_body(&mut self, data: Bytes, end_of_stream: bool) -> std::io::Result<()>;
}

/// Receives a response asynchronously, see [`ResponseWriter`].
#[async_trait]
pub trait AsyncResponseWriter: Send {
    /// Writes the status and headers of the response.
    async fn write_response_header(
        &mut self,
        status: StatusCode,
        headers: &ResponseHeaders,
    ) -> std::io::Result<()>;

    /// Writes a body frame, possibly empty.
    async fn write_response_body(
        &mut self,
        data: Bytes,
        end_of_stream: bool,
    ) -> std::io::Result<()>;
}

/// Serializes the status line and headers of an HTTP/1.1 response.
fn response_head(status: StatusCode, headers: &ResponseHeaders) -> Bytes {
    let mut head = BytesMut::with_capacity(256);
    head.extend_from_slice(b"HTTP/1.1 ");
    head.extend_from_slice(status.as_str().as_bytes());
    head.extend_from_slice(b" ");
    head.extend_from_slice(status.canonical_reason().unwrap_or("").as_bytes());
    head.extend_from_slice(b"\r\n");
    for (name, value) in headers.iter() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head.freeze()
}

/// Writes responses in HTTP/1.1 format to a stream. Headers are written verbatim and in order,
/// the body isn’t transformed in any way. The stream is flushed at the end of the response.
#[derive(Debug)]
pub struct Http1Writer<W> {
    inner: W,
}

impl<W: Write> Http1Writer<W> {
    /// Wraps a stream.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ResponseWriter for Http1Writer<W> {
    fn write_response_header(
        &mut self,
        status: StatusCode,
        headers: &ResponseHeaders,
    ) -> std::io::Result<()> {
        self.inner.write_all(&response_head(status, headers))
    }

    fn write_response_body(&mut self, data: Bytes, end_of_stream: bool) -> std::io::Result<()> {
        if !data.is_empty() {
            self.inner.write_all(&data)?;
        }
        if end_of_stream {
            self.inner.flush()?;
        }
        Ok(())
    }
}

/// The asynchronous counterpart of [`Http1Writer`]
#[derive(Debug)]
pub struct AsyncHttp1Writer<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin + Send> AsyncHttp1Writer<W> {
    /// Wraps a stream.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> AsyncResponseWriter for AsyncHttp1Writer<W> {
    async fn write_response_header(
        &mut self,
        status: StatusCode,
        headers: &ResponseHeaders,
    ) -> std::io::Result<()> {
        let head = response_head(status, headers);
        self.inner.write_all(&head).await
    }

    async fn write_response_body(
        &mut self,
        data: Bytes,
        end_of_stream: bool,
    ) -> std::io::Result<()> {
        if !data.is_empty() {
            self.inner.write_all(&data).await?;
        }
        if end_of_stream {
            self.inner.flush().await?;
        }
        Ok(())
    }
}

/// Collects a response in memory. Useful for integrating with frameworks that expect a complete
/// response object and for tests.
#[derive(Debug, Clone, Default)]
pub struct BufferedResponse {
    status: Option<StatusCode>,
    headers: ResponseHeaders,
    frames: Vec<(Bytes, bool)>,
}

impl BufferedResponse {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Response status, `None` if the header hasn’t been written yet
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Response headers
    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    /// All body frames written, along with their `end_of_stream` flag
    pub fn frames(&self) -> &[(Bytes, bool)] {
        &self.frames
    }

    /// Checks whether the last body frame has been written.
    pub fn is_complete(&self) -> bool {
        self.frames
            .last()
            .is_some_and(|(_, end_of_stream)| *end_of_stream)
    }

    /// The complete response body
    pub fn body(&self) -> Bytes {
        let mut body = BytesMut::new();
        for (data, _) in &self.frames {
            body.extend_from_slice(data);
        }
        body.freeze()
    }

    /// The response body as text, invalid UTF-8 sequences replaced
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body()).into_owned()
    }
}

impl ResponseWriter for BufferedResponse {
    fn write_response_header(
        &mut self,
        status: StatusCode,
        headers: &ResponseHeaders,
    ) -> std::io::Result<()> {
        self.status = Some(status);
        self.headers = headers.clone();
        Ok(())
    }

    fn write_response_body(&mut self, data: Bytes, end_of_stream: bool) -> std::io::Result<()> {
        self.frames.push((data, end_of_stream));
        Ok(())
    }
}

#[async_trait]
impl AsyncResponseWriter for BufferedResponse {
    async fn write_response_header(
        &mut self,
        status: StatusCode,
        headers: &ResponseHeaders,
    ) -> std::io::Result<()> {
        ResponseWriter::write_response_header(self, status, headers)
    }

    async fn write_response_body(
        &mut self,
        data: Bytes,
        end_of_stream: bool,
    ) -> std::io::Result<()> {
        ResponseWriter::write_response_body(self, data, end_of_stream)
    }
}
