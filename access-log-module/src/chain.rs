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

//! Integration into middleware chains

use async_trait::async_trait;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::configuration::AccessLogConf;
use crate::error::AccessLogError;
use crate::handler::{AccessLogHandler, Handler};
use crate::record::Request;
use crate::sink::{DurableSink, LogSink, WriterSink};
use crate::writer::ResponseWriter;

/// A middleware in a handler chain
///
/// Unlike a [`Handler`], a middleware receives the remainder of the chain as `next` parameter.
/// It is responsible for calling `next` if request processing should continue.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Processes the request, typically calling `next` at some point.
    async fn serve(
        &self,
        response: &mut dyn ResponseWriter,
        request: &Request,
        next: &dyn Handler,
    );
}

/// Middleware adding requests to the access log
#[derive(Debug, Clone)]
pub struct AccessLog {
    sink: Arc<dyn LogSink>,
}

impl AccessLog {
    /// Creates a middleware logging to the given sink.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Creates a middleware from its configuration.
    ///
    /// Log file `-` means logging to standard output, any other value is a file path. Opening
    /// the log file starts a writer task, so this has to be called from within a Tokio runtime.
    pub fn from_conf(conf: AccessLogConf) -> Result<Self, AccessLogError> {
        let sink: Arc<dyn LogSink> = if conf.log_file.as_os_str() == "-" {
            Arc::new(WriterSink::new(std::io::stdout()))
        } else {
            Arc::new(DurableSink::open(conf.log_file, conf.buffer_size)?)
        };
        Ok(Self::new(sink))
    }

    /// The sink log lines are written to
    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }
}

#[async_trait]
impl Middleware for AccessLog {
    async fn serve(
        &self,
        response: &mut dyn ResponseWriter,
        request: &Request,
        next: &dyn Handler,
    ) {
        // The logging handler calls `next` itself, it must not be called here again
        AccessLogHandler::new(next, self.sink.clone())
            .serve(response, request)
            .await;
    }
}

/// The remainder of a chain, passed to middlewares as `next`
struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Handler,
}

#[async_trait]
impl Handler for Next<'_> {
    async fn serve(&self, response: &mut dyn ResponseWriter, request: &Request) {
        match self.middlewares.split_first() {
            Some((middleware, middlewares)) => {
                let next = Next {
                    middlewares,
                    endpoint: self.endpoint,
                };
                middleware.serve(response, request, &next).await;
            }
            None => self.endpoint.serve(response, request).await,
        }
    }
}

/// A list of middlewares followed by an endpoint handler
///
/// Middlewares run in the order they were added, each of them deciding whether to continue to
/// the next one. The endpoint runs last.
///
/// ```rust
/// use access_log_module::{
///     AccessLog, BufferedResponse, Chain, Handler, Request, ResponseWriter, WriterSink,
/// };
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct Hello;
///
/// #[async_trait]
/// impl Handler for Hello {
///     async fn serve(&self, response: &mut dyn ResponseWriter, _request: &Request) {
///         let _ = response.write(b"Hello, world!\n").await;
///     }
/// }
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let log = AccessLog::new(Arc::new(WriterSink::new(std::io::stdout())));
/// let chain = Chain::new(Hello).with(log);
///
/// let mut response = BufferedResponse::new();
/// chain.serve(&mut response, &Request::default()).await;
/// assert_eq!(response.body(), b"Hello, world!\n");
/// # });
/// ```
pub struct Chain {
    middlewares: Vec<Arc<dyn Middleware>>,
    endpoint: Arc<dyn Handler>,
}

impl Debug for Chain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}

impl Chain {
    /// Creates a chain without any middlewares.
    pub fn new(endpoint: impl Handler + 'static) -> Self {
        Self {
            middlewares: Vec::new(),
            endpoint: Arc::new(endpoint),
        }
    }

    /// Adds a middleware at the end of the list, right before the endpoint.
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }
}

#[async_trait]
impl Handler for Chain {
    async fn serve(&self, response: &mut dyn ResponseWriter, request: &Request) {
        Next {
            middlewares: &self.middlewares,
            endpoint: self.endpoint.as_ref(),
        }
        .serve(response, request)
        .await
    }
}
