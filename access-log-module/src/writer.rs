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

//! Response writing and the recording wrapper observing it

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};

use crate::error::WriteError;
use crate::record::AccessRecord;

/// The capability to produce a response, implemented by the host server
#[async_trait]
pub trait ResponseWriter: Send {
    /// Returns the response headers.
    fn headers(&self) -> &HeaderMap;

    /// Returns the response headers for modification.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sets the response status code.
    fn set_status(&mut self, status: StatusCode);

    /// Writes a chunk of the response body, returning the number of bytes accepted.
    async fn write(&mut self, data: &[u8]) -> Result<usize, WriteError>;

    /// Sends any data buffered by the response to the client.
    async fn flush(&mut self) -> Result<(), WriteError> {
        Ok(())
    }
}

/// Wraps a [`ResponseWriter`], recording the status code and the number of bytes written into
/// an [`AccessRecord`]
///
/// All calls are passed on to the wrapped writer unchanged, the results of the wrapped writer
/// are returned to the caller.
#[derive(Debug)]
pub struct RecordingWriter<'a, W: ?Sized> {
    inner: &'a mut W,
    record: &'a mut AccessRecord,
}

impl<'a, W: ResponseWriter + ?Sized> RecordingWriter<'a, W> {
    /// Creates a new wrapper around `inner`, recording into `record`.
    pub fn new(inner: &'a mut W, record: &'a mut AccessRecord) -> Self {
        Self { inner, record }
    }

    /// The record being updated
    pub fn record(&self) -> &AccessRecord {
        self.record
    }
}

#[async_trait]
impl<W: ResponseWriter + ?Sized> ResponseWriter for RecordingWriter<'_, W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.record.record_status(status);
        self.inner.set_status(status);
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        match self.inner.write(data).await {
            Ok(written) => {
                self.record.record_bytes(written);
                Ok(written)
            }
            Err(err) => {
                self.record.record_bytes(err.written);
                Err(err)
            }
        }
    }

    async fn flush(&mut self) -> Result<(), WriteError> {
        self.inner.flush().await
    }
}

/// A response writer collecting the response in memory
///
/// This is useful for tests and for hosts that only send out the response once the handler
/// chain is done.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    limit: Option<usize>,
}

impl BufferedResponse {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty response that will refuse to accept more than `limit` body bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Status code set by the handler if any
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Response body written so far
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

#[async_trait]
impl ResponseWriter for BufferedResponse {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        let available = match self.limit {
            Some(limit) => limit.saturating_sub(self.body.len()),
            None => data.len(),
        };
        let accepted = available.min(data.len());
        self.body.extend_from_slice(&data[..accepted]);
        if accepted < data.len() {
            return Err(WriteError::partial(
                accepted,
                std::io::Error::new(std::io::ErrorKind::WriteZero, "response size limit reached"),
            ));
        }
        Ok(accepted)
    }
}
