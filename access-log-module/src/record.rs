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

//! The data collected about a single request

use bytes::Bytes;
use http::header::{HeaderName, REFERER, USER_AGENT};
use http::{HeaderValue, Method, StatusCode, Version};
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime};

/// The request type passed through the handler chain
pub type Request = http::Request<Bytes>;

/// Value logged in place of missing data
pub(crate) const PLACEHOLDER: &str = "-";

/// Remote address of the connection as reported by the host server, e.g. `10.0.0.5:54321`
///
/// The host is expected to store it in the request extensions, the access log will show `-`
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr(pub String);

impl From<SocketAddr> for RemoteAddr {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl From<&str> for RemoteAddr {
    fn from(addr: &str) -> Self {
        Self(addr.to_owned())
    }
}

/// Removes the `:port` suffix from an address, `[::1]:8080` becomes `[::1]`.
fn strip_port(addr: &str) -> &str {
    match addr.rfind(':') {
        Some(colon) => &addr[..colon],
        None => addr,
    }
}

fn client_addr(request: &Request) -> String {
    match request.extensions().get::<RemoteAddr>() {
        Some(RemoteAddr(addr)) if !addr.is_empty() => strip_port(addr).to_owned(),
        _ => PLACEHOLDER.to_owned(),
    }
}

fn header_value(request: &Request, name: HeaderName) -> Option<HeaderValue> {
    request
        .headers()
        .get(name)
        .filter(|value| !value.is_empty())
        .cloned()
}

fn bytes_or_placeholder(value: Option<&HeaderValue>) -> &[u8] {
    value.map_or(PLACEHOLDER.as_bytes(), HeaderValue::as_bytes)
}

/// Everything the access log knows about one request
///
/// A record is created when request processing starts. Status code and byte count are only
/// updated by [`RecordingWriter`](crate::RecordingWriter) while the downstream handler runs,
/// the processing time is set once the handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    client_addr: String,
    time: SystemTime,
    started: Instant,
    method: Method,
    uri: String,
    version: Version,
    status: StatusCode,
    bytes_sent: u64,
    referer: Option<HeaderValue>,
    user_agent: Option<HeaderValue>,
    elapsed: Duration,
}

impl AccessRecord {
    /// Starts a record for the given request, using current time as request time.
    pub fn from_request(request: &Request) -> Self {
        Self {
            client_addr: client_addr(request),
            time: SystemTime::now(),
            started: Instant::now(),
            method: request.method().clone(),
            uri: request.uri().to_string(),
            version: request.version(),
            status: StatusCode::OK,
            bytes_sent: 0,
            referer: header_value(request, REFERER),
            user_agent: header_value(request, USER_AGENT),
            elapsed: Duration::ZERO,
        }
    }

    /// Client address without the port
    pub fn client_addr(&self) -> &str {
        &self.client_addr
    }

    /// Time when request processing started
    pub fn time(&self) -> SystemTime {
        self.time
    }

    /// Request method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI as received
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// HTTP protocol version of the request
    pub fn version(&self) -> Version {
        self.version
    }

    /// Status code of the response, `200 OK` unless the handler set another one
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Number of response body bytes accepted so far
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Raw value of the `Referer` header or `-`
    ///
    /// Header values aren't necessarily valid UTF-8, the formatter escapes any non-printable
    /// bytes.
    pub fn referer(&self) -> &[u8] {
        bytes_or_placeholder(self.referer.as_ref())
    }

    /// Raw value of the `User-Agent` header or `-`
    pub fn user_agent(&self) -> &[u8] {
        bytes_or_placeholder(self.user_agent.as_ref())
    }

    /// Time it took to process the request, zero before the request is complete
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub(crate) fn record_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub(crate) fn record_bytes(&mut self, count: usize) {
        self.bytes_sent = self.bytes_sent.saturating_add(count as u64);
    }

    /// Stops the clock. Called once, after the downstream handler returned.
    pub(crate) fn finish(&mut self) {
        self.elapsed = self.started.elapsed();
    }

    #[cfg(test)]
    pub(crate) fn with_time(mut self, time: SystemTime, elapsed: Duration) -> Self {
        self.time = time;
        self.elapsed = elapsed;
        self
    }
}
