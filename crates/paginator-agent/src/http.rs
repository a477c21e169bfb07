// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal HTTP/1.1 framing for the agent.
//
// One request per connection: read the head line by line, then exactly
// Content-Length body bytes, answer, close. Both parts are size-capped before
// anything is buffered past the cap.

use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Request line plus headers.
pub const MAX_HEAD_BYTES: usize = 64 * 1024; // 64 KiB

/// Request body. Page uploads arrive base64-encoded inside JSON.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024; // 64 MiB

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request head exceeds {MAX_HEAD_BYTES} bytes")]
    HeadTooLarge,

    #[error("request body of {0} bytes exceeds {MAX_BODY_BYTES} bytes")]
    BodyTooLarge(usize),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpError {
    /// Status code to answer with, when the connection is still usable.
    pub fn status(&self) -> u16 {
        match self {
            Self::HeadTooLarge => 431,
            Self::BodyTooLarge(_) => 413,
            Self::Malformed(_) => 400,
            Self::Io(_) => 500,
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// First value of header `name`, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `Upgrade: websocket` together with an `upgrade` token in `Connection`.
    pub fn is_websocket_upgrade(&self) -> bool {
        let upgrade = self
            .header("upgrade")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
        let connection = self.header("connection").is_some_and(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });
        upgrade && connection
    }
}

/// Read one request.
///
/// Returns `Ok(None)` when the peer closes the connection before sending
/// anything.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<HttpRequest>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut head_bytes = 0usize;
    let mut lines: Vec<String> = Vec::new();

    loop {
        let mut line = Vec::new();
        let budget = (MAX_HEAD_BYTES - head_bytes) as u64 + 1;
        let n = (&mut *reader).take(budget).read_until(b'\n', &mut line).await?;

        if n == 0 {
            if head_bytes == 0 {
                return Ok(None);
            }
            return Err(HttpError::Malformed("connection closed mid-request".into()));
        }

        head_bytes += n;
        if head_bytes > MAX_HEAD_BYTES {
            return Err(HttpError::HeadTooLarge);
        }
        if !line.ends_with(b"\n") {
            return Err(HttpError::Malformed("truncated request head".into()));
        }

        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        if line.is_empty() {
            if lines.is_empty() {
                // Tolerate stray blank lines before the request line.
                continue;
            }
            break;
        }
        lines.push(String::from_utf8_lossy(&line).into_owned());
    }

    let mut lines = lines.into_iter();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(_version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::Malformed(format!(
            "bad request line {request_line:?}"
        )));
    };
    let path = target.split('?').next().unwrap_or(target).to_owned();
    let method = method.to_ascii_uppercase();

    let mut headers = Vec::new();
    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            return Err(HttpError::Malformed(format!("bad header line {line:?}")));
        };
        headers.push((key.trim().to_owned(), value.trim().to_owned()));
    }

    let mut request = HttpRequest {
        method,
        path,
        headers,
        body: Vec::new(),
    };

    if request
        .header("transfer-encoding")
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    {
        return Err(HttpError::Malformed(
            "chunked request bodies are not supported".into(),
        ));
    }

    let content_length = match request.header("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| HttpError::Malformed(format!("bad Content-Length {value:?}")))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(HttpError::BodyTooLarge(content_length));
    }

    if content_length > 0 {
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await?;
        request.body = body;
    }

    Ok(Some(request))
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
        }
    }

    /// `{"error": message}` with the given status.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &json!({ "error": message }))
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Vec::new(),
        }
    }

    /// Serialise head and body. Every response allows any origin and closes
    /// the connection.
    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Access-Control-Allow-Methods: GET, POST, DELETE, OPTIONS\r\n\
             Access-Control-Allow-Headers: Content-Type, X-API-Key, X-Return-PDF\r\n\
             Connection: close\r\n\
             \r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len()
        );
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &[u8]) -> Result<Option<HttpRequest>, HttpError> {
        let mut reader = raw;
        read_request(&mut reader).await
    }

    #[tokio::test]
    async fn parses_get_with_headers_and_query() {
        let req = parse(b"GET /job/abc?verbose=1 HTTP/1.1\r\nHost: x\r\nX-API-Key: k1\r\n\r\n")
            .await
            .expect("parse")
            .expect("request");
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/job/abc");
        assert_eq!(req.header("x-api-key"), Some("k1"));
        assert_eq!(req.header("missing"), None);
        assert!(req.body.is_empty());
    }

    #[tokio::test]
    async fn reads_exactly_content_length_body() {
        let req = parse(b"POST /process HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloEXTRA")
            .await
            .expect("parse")
            .expect("request");
        assert_eq!(req.body, b"hello");
    }

    #[tokio::test]
    async fn eof_before_request_is_none() {
        assert!(parse(b"").await.expect("clean close").is_none());
    }

    #[tokio::test]
    async fn oversized_head_is_rejected() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Big: ".to_vec();
        raw.extend(std::iter::repeat_n(b'a', MAX_HEAD_BYTES));
        raw.extend_from_slice(b"\r\n\r\n");
        let err = parse(&raw).await.expect_err("too big");
        assert!(matches!(err, HttpError::HeadTooLarge));
        assert_eq!(err.status(), 431);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_before_reading() {
        let raw = format!(
            "POST /process HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_BYTES + 1
        );
        let err = parse(raw.as_bytes()).await.expect_err("too big");
        assert!(matches!(err, HttpError::BodyTooLarge(_)));
        assert_eq!(err.status(), 413);
    }

    #[tokio::test]
    async fn garbage_request_line_is_malformed() {
        let err = parse(b"HELLO\r\n\r\n").await.expect_err("bad line");
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn detects_websocket_upgrade() {
        let req = parse(
            b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: keep-alive, Upgrade\r\n\r\n",
        )
        .await
        .expect("parse")
        .expect("request");
        assert!(req.is_websocket_upgrade());
    }

    #[test]
    fn response_carries_cors_and_length() {
        let bytes = HttpResponse::error(404, "Job not found").to_bytes();
        let text = String::from_utf8(bytes).expect("utf8");
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.contains("Content-Length: 25\r\n"));
        assert!(text.ends_with("{\"error\":\"Job not found\"}"));
    }
}
