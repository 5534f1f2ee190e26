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

//! # Access Log Module
//!
//! This crate writes an access log with one line per request in the
//! [Combined Log Format](https://httpd.apache.org/docs/2.4/logs.html#combined), extended by the
//! processing time in seconds:
//!
//! ```text
//! 10.0.0.5 - - [29/May/2024 10:53:19] "GET /widgets HTTP/1.1" 200 42 "-" "Mozilla/5.0" 0.001234
//! ```
//!
//! The fields are: client address without the port, two unsupported fields (`-`), local time
//! when request processing started, request line, response status code, number of response
//! bytes written, `Referer` and `User-Agent` request headers (`-` if missing), time it took to
//! process the request.
//!
//! A configuration could look like this:
//!
//! ```yaml
//! log_file: access.log
//! buffer_size: 4096
//! ```
//!
//! The settings are also available as `--log-file` and `--log-buffer-size` command line options.
//! Log file `-` means writing to standard output.
//!
//! A log file is created if necessary, data in already existing files is kept. Log data is
//! buffered in memory and written to the file whenever the buffer is full. When the process
//! receives an interrupt signal (Ctrl-C), the buffer is flushed before the process exits. On
//! Unix-based systems, the process can be sent a `HUP` or `USR1` signal to make it re-open log
//! files, e.g. after they have been moved away by an external tool.
//!
//! ## Code example
//!
//! [`AccessLog`] is a [`Middleware`] that can be added to a handler [`Chain`]. It wraps the
//! response writer passed down the chain in order to see the status code and response size
//! produced by the handlers after it. The log line is written once the rest of the chain
//! returns.
//!
//! ```rust
//! use access_log_module::{
//!     AccessLog, AccessLogConf, AccessLogOpt, BufferedResponse, Chain, Handler, RemoteAddr,
//!     Request, ResponseWriter,
//! };
//! use async_trait::async_trait;
//! use http::StatusCode;
//!
//! struct NotFound;
//!
//! #[async_trait]
//! impl Handler for NotFound {
//!     async fn serve(&self, response: &mut dyn ResponseWriter, _request: &Request) {
//!         response.set_status(StatusCode::NOT_FOUND);
//!         let _ = response.write(b"Nothing here\n").await;
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let mut conf = AccessLogConf::from_yaml("log_file: '-'").unwrap();
//! conf.merge_with_opt(AccessLogOpt::default());
//!
//! let chain = Chain::new(NotFound).with(AccessLog::from_conf(conf).unwrap());
//!
//! let mut request = Request::default();
//! request.extensions_mut().insert(RemoteAddr::from("127.0.0.1:50000"));
//! let mut response = BufferedResponse::new();
//! chain.serve(&mut response, &request).await;
//! assert_eq!(response.status(), Some(StatusCode::NOT_FOUND));
//! # });
//! ```

pub mod configuration;
mod chain;
mod error;
mod format;
mod handler;
mod record;
mod signal;
mod sink;
mod writer;

pub use chain::{AccessLog, Chain, Middleware};
pub use configuration::{AccessLogConf, AccessLogOpt};
pub use error::{AccessLogError, WriteError};
pub use format::{format_record, format_record_in, TIME_FORMAT};
pub use handler::{AccessLogHandler, Handler};
pub use record::{AccessRecord, RemoteAddr, Request};
pub use sink::{DurableSink, LogSink, WriterSink, DEFAULT_BUFFER_SIZE};
pub use writer::{BufferedResponse, RecordingWriter, ResponseWriter};
