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

//! Middleware serving static files and passing everything else on

use async_trait::async_trait;
use http::StatusCode;
use log::debug;
use servestatic::{decode_path, Error, RequestHead, Result, ServeStatic, ServeStaticConf};
use std::path::PathBuf;
use std::sync::Arc;

use crate::file_server::{AsyncFileServer, FileServer};
use crate::standard_response::StandardResponse;
use crate::writer::{AsyncResponseWriter, ResponseWriter};

/// The application wrapped by [`StaticFilesHandler`], handling all requests that don’t map to
/// static files.
pub trait Application {
    /// Handles a request.
    fn call<R, W>(&self, request: &R, writer: &mut W) -> Result<()>
    where
        R: RequestHead,
        W: ResponseWriter;
}

/// The asynchronous counterpart of [`Application`]
#[async_trait]
pub trait AsyncApplication: Send + Sync {
    /// Handles a request.
    async fn call<R, W>(&self, request: &R, writer: &mut W) -> Result<()>
    where
        R: RequestHead + Sync,
        W: AsyncResponseWriter;
}

/// An application responding with `404 Not Found` to every request
#[derive(Debug, Clone, Default)]
pub struct NotFoundApp {
    searched: Vec<(PathBuf, String)>,
}

impl NotFoundApp {
    /// Creates an application listing the searched directories along with their URL prefixes
    /// on the error page.
    pub fn verbose(searched: Vec<(PathBuf, String)>) -> Self {
        Self { searched }
    }

    fn response(&self, request: &impl RequestHead) -> StandardResponse {
        StandardResponse::new(request.method(), StatusCode::NOT_FOUND, &self.searched)
    }
}

impl Application for NotFoundApp {
    fn call<R, W>(&self, request: &R, writer: &mut W) -> Result<()>
    where
        R: RequestHead,
        W: ResponseWriter,
    {
        Ok(self.response(request).write(writer)?)
    }
}

#[async_trait]
impl AsyncApplication for NotFoundApp {
    async fn call<R, W>(&self, request: &R, writer: &mut W) -> Result<()>
    where
        R: RequestHead + Sync,
        W: AsyncResponseWriter,
    {
        let response = self.response(request);
        Ok(response.write_async(writer).await?)
    }
}

/// Serves requests mapping to static files, other requests are left to the wrapped
/// application.
#[derive(Debug, Clone)]
pub struct StaticFilesHandler {
    index: Arc<ServeStatic>,
}

impl TryFrom<ServeStaticConf> for StaticFilesHandler {
    type Error = Error;

    fn try_from(conf: ServeStaticConf) -> Result<Self> {
        Self::new(conf)
    }
}

impl StaticFilesHandler {
    /// Creates a new handler with given configuration. Unless autorefresh mode is enabled, this
    /// scans all configured directories.
    pub fn new(conf: ServeStaticConf) -> Result<Self> {
        let index = ServeStatic::new(conf)?;
        debug!("Initialized static files handler, settings: {:#?}", index.conf());
        Ok(Self::from_index(index))
    }

    /// Creates a new handler for a file index, e.g. one set up via [`ServeStatic::builder`].
    pub fn from_index(index: impl Into<Arc<ServeStatic>>) -> Self {
        Self {
            index: index.into(),
        }
    }

    /// Provides access to the file index.
    pub fn index(&self) -> &Arc<ServeStatic> {
        &self.index
    }

    fn file_server(&self) -> FileServer {
        FileServer::new(self.index.conf().block_size)
    }

    fn async_file_server(&self) -> AsyncFileServer {
        AsyncFileServer::new(self.index.conf().block_size)
    }

    /// The application responding to requests that don’t map to static files by default. It
    /// only lists the searched directories if `verbose_not_found` and `autorefresh` settings are
    /// both enabled.
    pub fn not_found_app(&self) -> NotFoundApp {
        if self.index.conf().verbose_not_found && self.index.autorefresh() {
            NotFoundApp::verbose(self.index.directories().to_vec())
        } else {
            NotFoundApp::default()
        }
    }

    /// Handles the current request. Returns `true` if a response has been written, `false` if
    /// the request doesn’t map to a static file and should be passed on.
    pub fn handle(
        &self,
        request: &impl RequestHead,
        writer: &mut impl ResponseWriter,
    ) -> Result<bool> {
        let url = decode_path(request.path());
        debug!("received URI path {url}");

        let Some(responder) = self.index.resolve(&url)? else {
            debug!("no static file for {url}");
            return Ok(false);
        };
        self.file_server().serve(&responder, request, writer)?;
        Ok(true)
    }

    /// The asynchronous counterpart of [`StaticFilesHandler::handle`]
    pub async fn handle_async(
        &self,
        request: &(impl RequestHead + Sync),
        writer: &mut impl AsyncResponseWriter,
    ) -> Result<bool> {
        let url = decode_path(request.path());
        debug!("received URI path {url}");

        let Some(responder) = self.index.resolve_async(&url).await? else {
            debug!("no static file for {url}");
            return Ok(false);
        };
        self.async_file_server()
            .serve(&responder, request, writer)
            .await?;
        Ok(true)
    }

    /// Serves the request from static files if possible, otherwise calls the application.
    pub fn serve_or_fallback<R, W>(
        &self,
        request: &R,
        writer: &mut W,
        app: &impl Application,
    ) -> Result<()>
    where
        R: RequestHead,
        W: ResponseWriter,
    {
        if !self.handle(request, writer)? {
            app.call(request, writer)?;
        }
        Ok(())
    }

    /// The asynchronous counterpart of [`StaticFilesHandler::serve_or_fallback`]
    pub async fn serve_or_fallback_async<R, W>(
        &self,
        request: &R,
        writer: &mut W,
        app: &impl AsyncApplication,
    ) -> Result<()>
    where
        R: RequestHead + Sync,
        W: AsyncResponseWriter,
    {
        if !self.handle_async(request, writer).await? {
            app.call(request, writer).await?;
        }
        Ok(())
    }
}
