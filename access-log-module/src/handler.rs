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

//! Request handlers and the handler measuring and logging them

use async_trait::async_trait;
use log::error;
use std::sync::Arc;

use crate::format::format_record;
use crate::record::{AccessRecord, Request};
use crate::sink::LogSink;
use crate::writer::{RecordingWriter, ResponseWriter};

/// A request handler producing a response
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handles the request, writing the response to `response`.
    async fn serve(&self, response: &mut dyn ResponseWriter, request: &Request);
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for &H {
    async fn serve(&self, response: &mut dyn ResponseWriter, request: &Request) {
        (**self).serve(response, request).await
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn serve(&self, response: &mut dyn ResponseWriter, request: &Request) {
        (**self).serve(response, request).await
    }
}

/// Wraps a handler, adding one line to the access log for each request it handles
///
/// The line is only written after the wrapped handler returns. Status code and response size
/// are recorded as the handler produces them, processing time covers everything the wrapped
/// handler does. If the handler never returns, e.g. because the connection has been taken
/// over or the request was cancelled, nothing is logged.
#[derive(Debug)]
pub struct AccessLogHandler<H> {
    handler: H,
    sink: Arc<dyn LogSink>,
}

impl<H: Handler> AccessLogHandler<H> {
    /// Creates a new handler logging requests handled by `handler` to `sink`.
    pub fn new(handler: H, sink: Arc<dyn LogSink>) -> Self {
        Self { handler, sink }
    }

    /// Runs the wrapped handler and returns the completed record without logging it.
    pub async fn capture(
        &self,
        response: &mut dyn ResponseWriter,
        request: &Request,
    ) -> AccessRecord {
        let mut record = AccessRecord::from_request(request);
        {
            let mut recording = RecordingWriter::new(response, &mut record);
            self.handler.serve(&mut recording, request).await;
        }
        record.finish();
        record
    }
}

#[async_trait]
impl<H: Handler> Handler for AccessLogHandler<H> {
    async fn serve(&self, response: &mut dyn ResponseWriter, request: &Request) {
        let record = self.capture(response, request).await;
        if let Err(err) = self.sink.write_line(format_record(&record)).await {
            error!("Failed logging request: {err}");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use bytes::Bytes;
    use http::header::USER_AGENT;
    use http::{Method, StatusCode};
    use std::time::Duration;
    use test_log::test;

    use crate::record::RemoteAddr;
    use crate::sink::WriterSink;
    use crate::writer::BufferedResponse;

    /// Sets the status and writes the body in chunks of the given sizes
    #[derive(Debug)]
    pub(crate) struct TestHandler {
        pub(crate) status: Option<StatusCode>,
        pub(crate) chunks: Vec<usize>,
        pub(crate) delay: Duration,
    }

    #[async_trait]
    impl Handler for TestHandler {
        async fn serve(&self, response: &mut dyn ResponseWriter, _request: &Request) {
            if let Some(status) = self.status {
                response.set_status(status);
            }
            tokio::time::sleep(self.delay).await;
            for chunk in &self.chunks {
                let _ = response.write(&vec![b'x'; *chunk]).await;
            }
        }
    }

    pub(crate) fn widgets_request() -> Request {
        let mut request = http::Request::builder()
            .method(Method::GET)
            .uri("/widgets")
            .body(Bytes::new())
            .unwrap();
        request
            .extensions_mut()
            .insert(RemoteAddr::from("10.0.0.5:54321"));
        request
    }

    fn lines(sink: Arc<WriterSink<Vec<u8>>>) -> Vec<String> {
        let sink = Arc::try_unwrap(sink).unwrap();
        String::from_utf8(sink.into_inner())
            .unwrap()
            .lines()
            .map(|line| line.to_owned())
            .collect()
    }

    #[test(tokio::test)]
    async fn captures_status_and_size() {
        let handler = AccessLogHandler::new(
            TestHandler {
                status: Some(StatusCode::OK),
                chunks: vec![42],
                delay: Duration::ZERO,
            },
            Arc::new(WriterSink::new(Vec::new())),
        );
        let mut response = BufferedResponse::new();
        let record = handler.capture(&mut response, &widgets_request()).await;
        assert_eq!(record.status(), StatusCode::OK);
        assert_eq!(record.bytes_sent(), 42);
        assert_eq!(response.body().len(), 42);
        assert_eq!(response.status(), Some(StatusCode::OK));
    }

    #[test(tokio::test)]
    async fn default_status() {
        let handler = AccessLogHandler::new(
            TestHandler {
                status: None,
                chunks: vec![],
                delay: Duration::ZERO,
            },
            Arc::new(WriterSink::new(Vec::new())),
        );
        let mut response = BufferedResponse::new();
        let record = handler.capture(&mut response, &widgets_request()).await;
        assert_eq!(record.status(), StatusCode::OK);
        assert_eq!(record.bytes_sent(), 0);
        assert_eq!(response.status(), None);
    }

    #[test(tokio::test)]
    async fn elapsed_covers_handler() {
        let handler = AccessLogHandler::new(
            TestHandler {
                status: None,
                chunks: vec![1],
                delay: Duration::from_millis(20),
            },
            Arc::new(WriterSink::new(Vec::new())),
        );
        let mut response = BufferedResponse::new();
        let record = handler.capture(&mut response, &widgets_request()).await;
        assert!(record.elapsed() >= Duration::from_millis(20));
    }

    #[test(tokio::test)]
    async fn one_line_per_request() {
        let sink = Arc::new(WriterSink::new(Vec::new()));
        let handler = AccessLogHandler::new(
            TestHandler {
                status: Some(StatusCode::ACCEPTED),
                chunks: vec![10, 20],
                delay: Duration::ZERO,
            },
            sink.clone(),
        );

        let mut response = BufferedResponse::new();
        handler.serve(&mut response, &widgets_request()).await;
        drop(handler);

        let lines = lines(sink);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("10.0.0.5 - - ["), "{}", lines[0]);
        assert!(
            lines[0].contains("] \"GET /widgets HTTP/1.1\" 202 30 \"-\" \"-\" "),
            "{}",
            lines[0]
        );
    }

    #[test(tokio::test)]
    async fn write_errors_still_logged() {
        let sink = Arc::new(WriterSink::new(Vec::new()));
        let handler = AccessLogHandler::new(
            TestHandler {
                status: Some(StatusCode::OK),
                chunks: vec![10, 20],
                delay: Duration::ZERO,
            },
            sink.clone(),
        );

        let mut request = widgets_request();
        request
            .headers_mut()
            .insert(USER_AGENT, "test-agent/1.0".try_into().unwrap());
        let mut response = BufferedResponse::with_limit(25);
        handler.serve(&mut response, &request).await;
        drop(handler);

        let lines = lines(sink);
        assert_eq!(lines.len(), 1);
        assert!(
            lines[0].contains(" 200 25 \"-\" \"test-agent/1.0\" "),
            "{}",
            lines[0]
        );
    }

    #[test(tokio::test)]
    async fn shared_downstream_handler() {
        let sink = Arc::new(WriterSink::new(Vec::new()));
        let downstream = Arc::new(TestHandler {
            status: Some(StatusCode::NO_CONTENT),
            chunks: vec![],
            delay: Duration::ZERO,
        });
        let first = AccessLogHandler::new(downstream.clone(), sink.clone());
        let second = AccessLogHandler::new(downstream.clone(), sink.clone());
        assert_eq!(Arc::strong_count(&downstream), 3);

        first
            .serve(&mut BufferedResponse::new(), &widgets_request())
            .await;
        second
            .serve(&mut BufferedResponse::new(), &widgets_request())
            .await;
        drop(first);
        drop(second);

        let lines = lines(sink);
        assert_eq!(lines.len(), 2);
        for line in lines {
            assert!(line.contains("\" 204 0 \"-\" \"-\" "), "{line}");
        }
    }
}
