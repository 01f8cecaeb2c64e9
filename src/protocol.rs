//! HTTP/1.1 subset framing.
//!
//! Implements the only exchange the bank speaks: one `GET` per connection
//! and one `text/plain` response, after which the server closes.
//!
//! ```text
//! Request:  GET /transaction=create&account=1 HTTP/1.1\r\n
//!           Host: localhost:8080\r\n
//!           Connection: close\r\n
//!           \r\n
//!
//! Response: HTTP/1.1 200 OK\r\n
//!           Server: BankServer\r\n
//!           Content-Length: 17\r\n
//!           Connection: close\r\n
//!           Content-Type: text/plain\r\n
//!           \r\n
//!           Account 1 created
//! ```
//!
//! Both directions are covered: the server decodes request heads and encodes
//! responses; the driver encodes requests and decodes responses.

use crate::error::ProtocolError;
use bytes::BytesMut;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, Take};
use tracing::warn;

/// Value of the `Server` header
pub const SERVER_NAME: &str = "BankServer";

/// Upper bound for a request or response head (start line plus headers)
pub const MAX_HEAD_BYTES: usize = 8 * 1024;

/// Upper bound for a response body read by the client
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Parsed request head. GET requests carry no body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Request target with the leading `/` removed
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Split a request line into its target and protocol marker.
///
/// The line must start with `GET /` and end with an `HTTP/x.y` marker.
/// Everything in between is the target, spaces included.
pub fn parse_request_line(line: &str) -> Result<(String, String), ProtocolError> {
    let line = line.trim_end_matches(['\r', '\n']);

    let rest = line
        .strip_prefix("GET /")
        .ok_or_else(|| ProtocolError::UnsupportedMethod(line.to_string()))?;

    match rest.rsplit_once(' ') {
        Some((target, version)) if version.starts_with("HTTP/") => {
            Ok((target.to_string(), version.to_string()))
        }
        _ => Err(ProtocolError::MalformedRequestLine(line.to_string())),
    }
}

/// Read a request head: the request line plus headers up to the blank line.
///
/// Returns `Ok(None)` if the peer closed the connection before sending
/// anything. A head that ends at EOF without the blank line is accepted.
pub async fn read_request_head<R>(reader: &mut R) -> Result<Option<Request>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut limited = reader.take(MAX_HEAD_BYTES as u64);
    let mut line = String::new();

    if read_head_line(&mut limited, &mut line).await? == 0 {
        return Ok(None);
    }
    let (target, version) = parse_request_line(&line)?;
    let headers = read_headers(&mut limited).await?;

    Ok(Some(Request {
        method: "GET".to_string(),
        target,
        version,
        headers,
    }))
}

/// Response status. Everything a well-formed request produces is `Ok`;
/// `NotFound` answers request lines the framer rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::NotFound => 404,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::NotFound => "Not Found",
        }
    }
}

/// Server response: a status and a plain-text body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub body: String,
}

impl Response {
    pub fn ok(body: impl Into<String>) -> Self {
        Response {
            status: Status::Ok,
            body: body.into(),
        }
    }

    pub fn not_found(body: impl Into<String>) -> Self {
        Response {
            status: Status::NotFound,
            body: body.into(),
        }
    }

    /// Encode status line, headers, blank line and body.
    pub fn encode(&self) -> BytesMut {
        let head = format!(
            "HTTP/1.1 {} {}\r\n\
             Server: {}\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             Content-Type: text/plain\r\n\
             \r\n",
            self.status.code(),
            self.status.reason(),
            SERVER_NAME,
            self.body.len(),
        );

        let mut buf = BytesMut::with_capacity(head.len() + self.body.len());
        buf.extend_from_slice(head.as_bytes());
        buf.extend_from_slice(self.body.as_bytes());
        buf
    }
}

/// Encode a client request for `target` (without the leading `/`).
pub fn encode_request(target: &str, host: &str) -> BytesMut {
    let request = format!(
        "GET /{target} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Connection: close\r\n\
         \r\n"
    );
    BytesMut::from(request.as_bytes())
}

/// Response as seen by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    /// Declared `Content-Length`, if the server sent one
    pub content_length: Option<usize>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Whether the declared Content-Length matches the body actually read
    pub fn length_matches(&self) -> bool {
        self.content_length == Some(self.body.len())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn status_line(&self) -> String {
        format!("HTTP/1.1 {} {}", self.status, self.reason)
    }
}

/// Read a full response: status line, headers, then the body up to EOF.
///
/// A Content-Length that disagrees with the body is logged and reported via
/// [`HttpResponse::length_matches`]; it does not fail the read.
pub async fn read_response<R>(reader: &mut R) -> Result<HttpResponse, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let (status, reason, headers) = {
        let mut limited = (&mut *reader).take(MAX_HEAD_BYTES as u64);
        let mut line = String::new();

        if read_head_line(&mut limited, &mut line).await? == 0 {
            return Err(ProtocolError::MissingStatusLine);
        }
        let (status, reason) = parse_status_line(&line)?;
        let headers = read_headers(&mut limited).await?;
        (status, reason, headers)
    };

    let content_length = match find_header(&headers, "Content-Length") {
        Some(value) => Some(
            value
                .parse::<usize>()
                .map_err(|_| ProtocolError::BadContentLength(value.to_string()))?,
        ),
        None => None,
    };

    let mut body = Vec::new();
    reader
        .take(MAX_BODY_BYTES as u64)
        .read_to_end(&mut body)
        .await?;

    let response = HttpResponse {
        status,
        reason,
        headers,
        content_length,
        body: String::from_utf8_lossy(&body).into_owned(),
    };

    if !response.length_matches() {
        warn!(
            declared = ?response.content_length,
            actual = response.body.len(),
            "Invalid content length reported by server"
        );
    }

    Ok(response)
}

fn parse_status_line(line: &str) -> Result<(u16, String), ProtocolError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let malformed = || ProtocolError::MalformedStatusLine(trimmed.to_string());

    let mut parts = trimmed.splitn(3, ' ');
    let version = parts.next().ok_or_else(malformed)?;
    if !version.starts_with("HTTP/") {
        return Err(malformed());
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(malformed)?;
    let reason = parts.next().unwrap_or_default().to_string();

    Ok((status, reason))
}

/// Read header lines until the blank line or EOF.
async fn read_headers<R>(reader: &mut Take<R>) -> Result<Vec<(String, String)>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        if read_head_line(reader, &mut line).await? == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(headers)
}

/// Read one line of a head, failing once the head budget is exhausted.
async fn read_head_line<R>(reader: &mut Take<R>, line: &mut String) -> Result<usize, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let n = reader.read_line(line).await?;
    if n > 0 && !line.ends_with('\n') && reader.limit() == 0 {
        return Err(ProtocolError::HeadTooLarge(MAX_HEAD_BYTES));
    }
    Ok(n)
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_line() {
        let (target, version) =
            parse_request_line("GET /transaction=create&account=1 HTTP/1.1\r\n").unwrap();
        assert_eq!(target, "transaction=create&account=1");
        assert_eq!(version, "HTTP/1.1");

        let (target, version) = parse_request_line("GET / HTTP/1.0").unwrap();
        assert_eq!(target, "");
        assert_eq!(version, "HTTP/1.0");
    }

    #[test]
    fn test_parse_request_line_rejects_other_methods() {
        match parse_request_line("POST /transaction=reset HTTP/1.1\r\n") {
            Err(ProtocolError::UnsupportedMethod(line)) => {
                assert_eq!(line, "POST /transaction=reset HTTP/1.1")
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            parse_request_line("get /x HTTP/1.1"),
            Err(ProtocolError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn test_parse_request_line_requires_protocol_marker() {
        assert!(matches!(
            parse_request_line("GET /transaction=reset"),
            Err(ProtocolError::MalformedRequestLine(_))
        ));
        assert!(matches!(
            parse_request_line("GET /a b"),
            Err(ProtocolError::MalformedRequestLine(_))
        ));
    }

    #[test]
    fn test_parse_request_line_keeps_spaces_in_target() {
        let (target, version) =
            parse_request_line("GET /transaction=create&account=John Doe HTTP/1.1\r\n").unwrap();
        assert_eq!(target, "transaction=create&account=John Doe");
        assert_eq!(version, "HTTP/1.1");

        let (target, _) = parse_request_line("GET /a  b HTTP/1.0").unwrap();
        assert_eq!(target, "a  b");
    }

    #[tokio::test]
    async fn test_read_request_head() {
        let mut input: &[u8] = b"GET /transaction=status&account=5 HTTP/1.1\r\n\
                                 Host: localhost:8080\r\n\
                                 Connection: close\r\n\
                                 \r\n\
                                 ignored body";

        let request = read_request_head(&mut input).await.unwrap().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.target, "transaction=status&account=5");
        assert_eq!(request.version, "HTTP/1.1");
        assert_eq!(request.header("host"), Some("localhost:8080"));
        assert_eq!(request.header("Connection"), Some("close"));
        assert_eq!(input, b"ignored body");
    }

    #[tokio::test]
    async fn test_read_request_head_eof() {
        let mut input: &[u8] = b"";
        assert!(read_request_head(&mut input).await.unwrap().is_none());

        let mut input: &[u8] = b"GET /transaction=reset HTTP/1.1\r\n";
        let request = read_request_head(&mut input).await.unwrap().unwrap();
        assert_eq!(request.target, "transaction=reset");
        assert!(request.headers.is_empty());
    }

    #[tokio::test]
    async fn test_read_request_head_too_large() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_HEAD_BYTES));
        raw.extend_from_slice(b" HTTP/1.1\r\n\r\n");
        let mut input: &[u8] = &raw;

        assert!(matches!(
            read_request_head(&mut input).await,
            Err(ProtocolError::HeadTooLarge(_))
        ));
    }

    #[test]
    fn test_response_encode() {
        let encoded = Response::ok("Account 100 created").encode();
        assert_eq!(
            &encoded[..],
            b"HTTP/1.1 200 OK\r\n\
              Server: BankServer\r\n\
              Content-Length: 19\r\n\
              Connection: close\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              Account 100 created"
        );

        let encoded = Response::not_found("Invalid request").encode();
        assert!(encoded.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn test_encode_request() {
        let encoded = encode_request("transaction=reset", "localhost:9000");
        assert_eq!(
            &encoded[..],
            b"GET /transaction=reset HTTP/1.1\r\n\
              Host: localhost:9000\r\n\
              Connection: close\r\n\
              \r\n"
        );
    }

    #[tokio::test]
    async fn test_response_round_trip() {
        let body = "Account 1: $50.00";
        let encoded = Response::ok(body).encode();
        let mut input: &[u8] = &encoded;

        let response = read_response(&mut input).await.unwrap();
        assert!(response.is_ok());
        assert_eq!(response.reason, "OK");
        assert_eq!(response.body, body);
        assert_eq!(response.content_length, Some(body.len()));
        assert!(response.length_matches());
        assert_eq!(response.header("server"), Some(SERVER_NAME));
        assert_eq!(response.status_line(), "HTTP/1.1 200 OK");
    }

    #[tokio::test]
    async fn test_read_response_length_mismatch_is_not_fatal() {
        let mut input: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nAll accounts reset";

        let response = read_response(&mut input).await.unwrap();
        assert_eq!(response.body, "All accounts reset");
        assert!(!response.length_matches());

        let mut input: &[u8] = b"HTTP/1.1 200 OK\r\n\r\nhi";
        let response = read_response(&mut input).await.unwrap();
        assert_eq!(response.content_length, None);
        assert!(!response.length_matches());
    }

    #[tokio::test]
    async fn test_read_response_errors() {
        let mut input: &[u8] = b"";
        assert!(matches!(
            read_response(&mut input).await,
            Err(ProtocolError::MissingStatusLine)
        ));

        let mut input: &[u8] = b"garbage\r\n\r\n";
        assert!(matches!(
            read_response(&mut input).await,
            Err(ProtocolError::MalformedStatusLine(_))
        ));

        let mut input: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: ten\r\n\r\n";
        assert!(matches!(
            read_response(&mut input).await,
            Err(ProtocolError::BadContentLength(_))
        ));
    }
}
