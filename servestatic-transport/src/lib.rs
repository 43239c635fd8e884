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

//! # Transport adapters for servestatic
//!
//! This crate sends the responses produced by the `servestatic` engine: synchronously to any
//! [`std::io::Write`] stream or asynchronously via tokio. The [`StaticFilesHandler`] is the
//! middleware piece: it serves requests mapping to static files and passes everything else on to
//! the wrapped application.
//!
//! ## Code example
//!
//! ```rust,no_run
//! use servestatic::ServeStaticConf;
//! use servestatic_transport::{BufferedResponse, StaticFilesHandler};
//!
//! let conf = ServeStaticConf::from_yaml("roots: [/var/www/static]").unwrap();
//! let handler = StaticFilesHandler::new(conf).unwrap();
//! let not_found = handler.not_found_app();
//!
//! let request = http::Request::get("/app.js").body(()).unwrap();
//! let mut response = BufferedResponse::new();
//! handler
//!     .serve_or_fallback(&request, &mut response, &not_found)
//!     .unwrap();
//! println!("{:?} {} bytes", response.status(), response.body().len());
//! ```
//!
//! Responses are written as a header followed by body frames. The body is read in blocks of
//! `block_size` bytes (8 KiB by default), the last frame is always empty and marks the end of
//! the stream.

mod file_server;
mod handler;
mod standard_response;
mod writer;


pub use file_server::{AsyncFileServer, FileServer, DEFAULT_BLOCK_SIZE};
pub use handler::{Application, AsyncApplication, NotFoundApp, StaticFilesHandler};
pub use writer::{
    AsyncHttp1Writer, AsyncResponseWriter, BufferedResponse, Http1Writer, ResponseWriter,
};
