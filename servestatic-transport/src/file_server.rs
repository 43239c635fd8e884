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

//! Streaming responses to a writer

use bytes::Bytes;
use log::{error, trace};
use servestatic::{RequestHead, Responder, Result};
use std::io::ErrorKind;

use crate::writer::{AsyncResponseWriter, ResponseWriter};

/// Default number of bytes read from a file at once
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

fn truncated(remaining: u64) -> servestatic::Error {
    error!("file ended with {remaining} bytes left to be written");
    std::io::Error::from(ErrorKind::UnexpectedEof).into()
}

/// Sends responses synchronously, reading files in blocks.
#[derive(Debug, Clone, Copy)]
pub struct FileServer {
    block_size: usize,
}

impl Default for FileServer {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

impl FileServer {
    /// Creates a server reading `block_size` bytes at once.
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }

    /// Number of bytes read from a file at once
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Produces the response for the request and writes it. The file is opened before anything
    /// is written, so failing to open it leaves the writer untouched.
    ///
    /// Responses without a body result in a single empty frame. Otherwise the body is sent in
    /// blocks followed by an empty frame marking the end of the stream.
    pub fn serve(
        &self,
        responder: &Responder,
        request: &impl RequestHead,
        writer: &mut impl ResponseWriter,
    ) -> Result<()> {
        let response = responder.get_response(request)?;
        writer.write_response_header(response.status, &response.headers)?;

        if let Some(mut body) = response.body {
            trace!("sending {} bytes", body.remaining());
            while body.remaining() > 0 {
                let chunk = body.read_chunk(self.block_size)?;
                if chunk.is_empty() {
                    return Err(truncated(body.remaining()));
                }
                writer.write_response_body(chunk, false)?;
            }
        }

        writer.write_response_body(Bytes::new(), true)?;
        Ok(())
    }
}

/// Sends responses asynchronously, file reads happen on tokio’s blocking thread pool. Dropping
/// the future returned by [`AsyncFileServer::serve`] closes the file.
#[derive(Debug, Clone, Copy)]
pub struct AsyncFileServer {
    block_size: usize,
}

impl Default for AsyncFileServer {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

impl AsyncFileServer {
    /// Creates a server reading `block_size` bytes at once.
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }

    /// Number of bytes read from a file at once
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Produces the response for the request and writes it, see [`FileServer::serve`].
    pub async fn serve(
        &self,
        responder: &Responder,
        request: &(impl RequestHead + Sync),
        writer: &mut impl AsyncResponseWriter,
    ) -> Result<()> {
        let response = responder.get_response_async(request).await?;
        writer
            .write_response_header(response.status, &response.headers)
            .await?;

        if let Some(mut body) = response.body {
            trace!("sending {} bytes", body.remaining());
            while body.remaining() > 0 {
                let chunk = body.read_chunk(self.block_size).await?;
                if chunk.is_empty() {
                    return Err(truncated(body.remaining()));
                }
                writer.write_response_body(chunk, false).await?;
            }
        }

        writer.write_response_body(Bytes::new(), true).await?;
        Ok(())
    }
}
