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

//! Responses and their file-backed bodies
//!
//! Response decisions produce a [`Response<FileSlice>`]: the body is only a description of the
//! bytes to be sent. It is turned into a readable body either synchronously via
//! [`Response::open`] or asynchronously via [`Response::open_async`].

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use std::cmp::min;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::headers::ResponseHeaders;

/// A response produced for a request
#[derive(Debug, Clone)]
pub struct Response<B> {
    /// Response status
    pub status: StatusCode,
    /// Response headers, in the order they should be sent
    pub headers: ResponseHeaders,
    /// Response body, `None` for `HEAD` requests and body-less responses
    pub body: Option<B>,
}

impl<B> Response<B> {
    /// Creates a response without a body.
    pub fn new(status: StatusCode, headers: ResponseHeaders) -> Self {
        Self {
            status,
            headers,
            body: None,
        }
    }

    /// Adds a body to the response.
    pub fn with_body(mut self, body: B) -> Self {
        self.body = Some(body);
        self
    }

    fn try_map_body<C, E>(self, f: impl FnOnce(B) -> Result<C, E>) -> Result<Response<C>, E> {
        Ok(Response {
            status: self.status,
            headers: self.headers,
            body: self.body.map(f).transpose()?,
        })
    }
}

impl Response<FileSlice> {
    /// Opens the file backing the response body for synchronous reading.
    pub fn open(self) -> std::io::Result<Response<SlicedFile<File>>> {
        self.try_map_body(|slice| slice.open())
    }

    /// Opens the file backing the response body for asynchronous reading.
    pub async fn open_async(self) -> std::io::Result<Response<AsyncSlicedFile>> {
        let body = match &self.body {
            Some(slice) => Some(slice.open_async().await?),
            None => None,
        };
        Ok(Response {
            status: self.status,
            headers: self.headers,
            body,
        })
    }
}

/// Describes a response body: `len` bytes of a file starting at `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSlice {
    path: Arc<Path>,
    start: u64,
    len: u64,
}

impl FileSlice {
    /// Creates a new slice description.
    pub fn new(path: Arc<Path>, start: u64, len: u64) -> Self {
        Self { path, start, len }
    }

    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the first byte
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Number of bytes in the slice
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Checks whether the slice is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Opens the file synchronously.
    pub fn open(&self) -> std::io::Result<SlicedFile<File>> {
        Ok(SlicedFile::new(File::open(&self.path)?, self.start, self.len))
    }

    /// Opens the file on tokio’s blocking thread pool.
    pub async fn open_async(&self) -> std::io::Result<AsyncSlicedFile> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(AsyncSlicedFile {
            file,
            start: self.start,
            remaining: self.len,
            seeked: false,
        })
    }
}

/// A reader limited to a slice of the underlying file. Seeking to the start of the slice happens
/// on first read.
#[derive(Debug)]
pub struct SlicedFile<F> {
    inner: F,
    start: u64,
    remaining: u64,
    seeked: bool,
}

impl<F> SlicedFile<F> {
    /// Wraps a reader, limiting it to `len` bytes starting at `start`.
    pub fn new(inner: F, start: u64, len: u64) -> Self {
        Self {
            inner,
            start,
            remaining: len,
            seeked: false,
        }
    }

    /// Number of bytes still to be read
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<F: Read + Seek> SlicedFile<F> {
    /// Reads up to `size` bytes. An empty result means that the slice (or the file) is
    /// exhausted.
    pub fn read_chunk(&mut self, size: usize) -> std::io::Result<Bytes> {
        let size = min(size as u64, self.remaining) as usize;
        let mut buf = BytesMut::zeroed(size);
        let len = self.read(&mut buf)?;
        buf.truncate(len);
        Ok(buf.freeze())
    }
}

impl<F: Read + Seek> Read for SlicedFile<F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.seeked {
            if self.start != 0 {
                self.inner.seek(SeekFrom::Start(self.start))?;
            }
            self.seeked = true;
        }

        let max = min(buf.len() as u64, self.remaining) as usize;
        if max == 0 {
            return Ok(0);
        }
        let len = self.inner.read(&mut buf[..max])?;
        self.remaining -= len as u64;
        Ok(len)
    }
}

/// The asynchronous counterpart of [`SlicedFile`], reading via tokio.
#[derive(Debug)]
pub struct AsyncSlicedFile {
    file: tokio::fs::File,
    start: u64,
    remaining: u64,
    seeked: bool,
}

impl AsyncSlicedFile {
    /// Number of bytes still to be read
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Reads up to `size` bytes. An empty result means that the slice (or the file) is
    /// exhausted.
    pub async fn read_chunk(&mut self, size: usize) -> std::io::Result<Bytes> {
        if !self.seeked {
            if self.start != 0 {
                self.file.seek(SeekFrom::Start(self.start)).await?;
            }
            self.seeked = true;
        }

        let size = min(size as u64, self.remaining) as usize;
        if size == 0 {
            return Ok(Bytes::new());
        }
        let mut buf = BytesMut::zeroed(size);
        let len = self.file.read(&mut buf).await?;
        buf.truncate(len);
        self.remaining -= len as u64;
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    #[test]
    fn sliced_reads() {
        let mut file = SlicedFile::new(Cursor::new(b"0123456789".to_vec()), 3, 5);
        let mut result = String::new();
        file.read_to_string(&mut result).unwrap();
        assert_eq!(result, "34567");
        assert_eq!(file.remaining(), 0);
    }

    #[test]
    fn chunked_reads() {
        let mut file = SlicedFile::new(Cursor::new(b"0123456789".to_vec()), 0, 10);
        assert_eq!(file.read_chunk(4).unwrap(), Bytes::from_static(b"0123"));
        assert_eq!(file.read_chunk(4).unwrap(), Bytes::from_static(b"4567"));
        assert_eq!(file.read_chunk(4).unwrap(), Bytes::from_static(b"89"));
        assert!(file.read_chunk(4).unwrap().is_empty());
    }

    #[test]
    fn truncated_file() {
        let mut file = SlicedFile::new(Cursor::new(b"0123".to_vec()), 2, 10);
        assert_eq!(file.read_chunk(100).unwrap(), Bytes::from_static(b"23"));
        assert!(file.read_chunk(100).unwrap().is_empty());
        assert_eq!(file.remaining(), 8);
    }

    #[tokio::test]
    async fn async_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "0123456789").unwrap();

        let slice = FileSlice::new(path.into(), 6, 3);
        let mut file = slice.open_async().await.unwrap();
        assert_eq!(file.read_chunk(2).await.unwrap(), Bytes::from_static(b"67"));
        assert_eq!(file.read_chunk(2).await.unwrap(), Bytes::from_static(b"8"));
        assert!(file.read_chunk(2).await.unwrap().is_empty());
    }

    #[test]
    fn open_keeps_status_and_headers() {
        let response = Response::<FileSlice>::new(StatusCode::NOT_MODIFIED, ResponseHeaders::new());
        let response = response.open().unwrap();
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);
        assert!(response.body.is_none());
    }
}
