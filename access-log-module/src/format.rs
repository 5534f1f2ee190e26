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

//! Rendering of access records as log lines

use chrono::{DateTime, Local, TimeZone, Utc};
use std::fmt::Display;
use std::io::Write;

use crate::record::AccessRecord;

/// Format of the request time, e.g. `29/May/2024 10:53:19`
pub const TIME_FORMAT: &str = "%d/%b/%Y %H:%M:%S";

fn write_escaped(buf: &mut Vec<u8>, data: impl AsRef<[u8]>) {
    fn is_allowed(byte: u8) -> bool {
        (b' '..=b'~').contains(&byte) && byte != b'"' && byte != b'\\'
    }

    buf.push(b'"');
    for byte in data.as_ref() {
        if is_allowed(*byte) {
            buf.push(*byte);
        } else {
            let _ = write!(buf, "\\x{byte:02x}");
        }
    }
    buf.push(b'"');
}

fn write_record<Tz>(buf: &mut Vec<u8>, record: &AccessRecord, tz: &Tz)
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let time = DateTime::<Utc>::from(record.time())
        .with_timezone(tz)
        .format(TIME_FORMAT);
    let request = format!(
        "{} {} {:?}",
        record.method(),
        record.uri(),
        record.version()
    );

    let _ = write!(buf, "{} - - [{time}] ", record.client_addr());
    write_escaped(buf, request);
    let _ = write!(buf, " {} {} ", record.status().as_u16(), record.bytes_sent());
    write_escaped(buf, record.referer());
    buf.push(b' ');
    write_escaped(buf, record.user_agent());
    let _ = writeln!(buf, " {:.6}", record.elapsed().as_secs_f64());
}

/// Renders a completed record as a single line in the combined log format, followed by
/// processing time in seconds:
///
/// ```text
/// 10.0.0.5 - - [29/May/2024 10:53:19] "GET /widgets HTTP/1.1" 200 42 "-" "-" 0.001234
/// ```
///
/// Request time is shown in local time. Quoted values have quotation marks, backslashes and
/// non-printable bytes escaped as `\xNN`. The result is terminated by a newline character.
pub fn format_record(record: &AccessRecord) -> Vec<u8> {
    format_record_in(record, &Local)
}

/// Same as [`format_record`] but showing request time in the given time zone.
pub fn format_record_in<Tz>(record: &AccessRecord, tz: &Tz) -> Vec<u8>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut buf = Vec::with_capacity(256);
    write_record(&mut buf, record, tz);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use chrono::FixedOffset;
    use http::header::{REFERER, USER_AGENT};
    use http::{Method, StatusCode, Version};
    use std::time::{Duration, SystemTime};

    use crate::record::{RemoteAddr, Request};

    fn widgets_request() -> Request {
        let mut request = http::Request::builder()
            .method(Method::GET)
            .uri("/widgets")
            .version(Version::HTTP_11)
            .body(Bytes::new())
            .unwrap();
        request
            .extensions_mut()
            .insert(RemoteAddr::from("10.0.0.5:54321"));
        request
    }

    fn completed(request: &Request, status: StatusCode, bytes: usize) -> AccessRecord {
        let mut record = AccessRecord::from_request(request);
        record.record_status(status);
        record.record_bytes(bytes);
        record.with_time(
            SystemTime::UNIX_EPOCH + Duration::from_secs(1716979999), // 2024-05-29 10:53:19 UTC
            Duration::from_nanos(1_234_000),
        )
    }

    #[test]
    fn escaping() {
        let mut buf = Vec::<u8>::new();
        write_escaped(&mut buf, b"abcd");
        assert_eq!(&buf, b"\"abcd\"");

        buf.truncate(0);
        write_escaped(&mut buf, b"\0ab\"\\+-=! cd");
        assert_eq!(&buf, b"\"\\x00ab\\x22\\x5c+-=! cd\"");

        buf.truncate(0);
        write_escaped(&mut buf, b"ab~\x7f\x80\xfe\xffcd");
        assert_eq!(&buf, b"\"ab~\\x7f\\x80\\xfe\\xffcd\"");
    }

    #[test]
    fn widgets_line() {
        let record = completed(&widgets_request(), StatusCode::OK, 42);
        assert_eq!(
            String::from_utf8(format_record_in(&record, &Utc)).unwrap(),
            "10.0.0.5 - - [29/May/2024 10:53:19] \"GET /widgets HTTP/1.1\" 200 42 \"-\" \"-\" 0.001234\n"
        );
    }

    #[test]
    fn time_zone() {
        let record = completed(&widgets_request(), StatusCode::OK, 42);
        let tz = FixedOffset::west_opt(3600).unwrap();
        let line = String::from_utf8(format_record_in(&record, &tz)).unwrap();
        assert!(line.contains("[29/May/2024 09:53:19]"), "{line}");
    }

    #[test]
    fn local_time() {
        let record = completed(&widgets_request(), StatusCode::OK, 42);
        let time = DateTime::<Local>::from(record.time()).format(TIME_FORMAT);
        let line = String::from_utf8(format_record(&record)).unwrap();
        assert!(
            line.starts_with(&format!(
                "10.0.0.5 - - [{time}] \"GET /widgets HTTP/1.1\" 200 42 \"-\" \"-\" 0.001234"
            )),
            "{line}"
        );
    }

    #[test]
    fn headers_and_escaping() {
        let mut request = widgets_request();
        *request.uri_mut() = "/search?q=%22x%22".parse().unwrap();
        *request.method_mut() = Method::POST;
        *request.version_mut() = Version::HTTP_10;
        request
            .headers_mut()
            .insert(REFERER, "https://example.com/".try_into().unwrap());
        request.headers_mut().insert(
            USER_AGENT,
            b"Mozilla/1.0 \\\"invalid data\x80"
                .as_ref()
                .try_into()
                .unwrap(),
        );
        let record = completed(&request, StatusCode::NOT_FOUND, 0);
        assert_eq!(
            String::from_utf8(format_record_in(&record, &Utc)).unwrap(),
            "10.0.0.5 - - [29/May/2024 10:53:19] \"POST /search?q=%22x%22 HTTP/1.0\" 404 0 \"https://example.com/\" \"Mozilla/1.0 \\x5c\\x22invalid data\\x80\" 0.001234\n"
        );
    }

    #[test]
    fn deterministic() {
        let record = completed(&widgets_request(), StatusCode::CREATED, 7);
        assert_eq!(format_record(&record), format_record(&record.clone()));
    }
}
