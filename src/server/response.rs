//! HTTP response types and the response state tracker.

use std::fmt;

use log::warn;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::server::error::Error;

/// HTTP status codes with their standard reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,
    MovedPermanently = 301,
    Found = 302,
    NotModified = 304,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    PayloadTooLarge = 413,
    RequestHeaderFieldsTooLarge = 431,
    InternalServerError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Get the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// The numeric code.
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

/// The value of the `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    None,
    Strict,
    Lax,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::None => f.write_str("None"),
            SameSite::Strict => f.write_str("Strict"),
            SameSite::Lax => f.write_str("Lax"),
        }
    }
}

/// Attributes for a `Set-Cookie` header. Unset attributes are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    pub max_age: Option<i64>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub same_site: Option<SameSite>,
    pub secure: Option<bool>,
    pub http_only: Option<bool>,
}

impl CookieOptions {
    /// Options with only `Max-Age` set.
    pub fn max_age(seconds: i64) -> Self {
        Self {
            max_age: Some(seconds),
            ..Self::default()
        }
    }
}

impl From<i64> for CookieOptions {
    fn from(seconds: i64) -> Self {
        Self::max_age(seconds)
    }
}

/// Serialize a cookie and its attributes into a `Set-Cookie` value.
///
/// Attributes appear in a fixed order: `Max-Age`, `Domain`, `Path`,
/// `SameSite`, `Secure`, `HttpOnly`. Flags are written only when true.
pub fn serialize_cookie(key: &str, value: &str, options: &CookieOptions) -> String {
    let mut cookie = format!("{key}={value}");
    if let Some(max_age) = options.max_age {
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    if let Some(domain) = &options.domain {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    if let Some(path) = &options.path {
        cookie.push_str(&format!("; Path={path}"));
    }
    if let Some(same_site) = options.same_site {
        cookie.push_str(&format!("; SameSite={same_site}"));
    }
    if options.secure == Some(true) {
        cookie.push_str("; Secure");
    }
    if options.http_only == Some(true) {
        cookie.push_str("; HttpOnly");
    }
    cookie
}

/// Something a handler can send as a response body.
pub enum Payload {
    /// Raw bytes, sent as-is.
    Bytes(Vec<u8>),
    /// Text, sent as UTF-8.
    Text(String),
    /// A structured value, sent as serialized JSON.
    Json(Value),
    /// A stream copied to the connection until it ends.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Payload::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Payload::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// An outbound response bound to the connection's write half.
///
/// The response is completed by the first terminal write: [`Response::end`],
/// [`Response::send`] or [`Response::stream`]. Once completed it stays
/// completed, and the dispatcher runs no further middleware.
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, String)>,
    completed: bool,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl Response {
    /// Create a response that writes to `writer`.
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            status: StatusCode::Ok,
            headers: vec![("Server".to_string(), "chainhttp-rs".to_string())],
            completed: false,
            writer: Box::new(writer),
        }
    }

    /// Set the status code.
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// The current status code.
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Add or replace a header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Add a header occurrence, keeping existing ones.
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Get the first value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Set the content type.
    pub fn content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        self.set_header("Content-Type", content_type)
    }

    /// Append a `Set-Cookie` header. Pass `CookieOptions::default()` for a
    /// session cookie, or a number of seconds for `Max-Age`.
    pub fn cookie(&mut self, key: &str, value: &str, options: impl Into<CookieOptions>) -> &mut Self {
        let cookie = serialize_cookie(key, value, &options.into());
        self.append_header("Set-Cookie", cookie)
    }

    /// Whether a terminal write has been issued.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Send a payload and complete the response.
    pub async fn send(&mut self, payload: impl Into<Payload>) -> Result<(), Error> {
        match payload.into() {
            Payload::Bytes(bytes) => self.end(bytes).await,
            Payload::Text(text) => self.end(text.into_bytes()).await,
            Payload::Json(value) => {
                let bytes = serde_json::to_vec(&value)?;
                if self.header("Content-Type").is_none() {
                    self.set_header("Content-Type", "application/json");
                }
                self.end(bytes).await
            }
            Payload::Stream(reader) => self.stream(reader).await,
        }
    }

    /// Serialize `value` to JSON and send it.
    pub async fn send_json<T: Serialize>(&mut self, value: &T) -> Result<(), Error> {
        let value = serde_json::to_value(value)?;
        self.send(Payload::Json(value)).await
    }

    /// Finalize the response with `body`.
    ///
    /// This is the single point that completes a buffered response. Calling
    /// it on a completed response writes nothing and returns
    /// [`Error::ResponseCompleted`].
    pub async fn end(&mut self, body: impl Into<Vec<u8>>) -> Result<(), Error> {
        if self.completed {
            warn!("Attempted to finalize a completed response");
            return Err(Error::ResponseCompleted);
        }
        self.completed = true;

        let body = body.into();
        let mut bytes = self.head_bytes(Some(body.len()));
        bytes.extend_from_slice(&body);
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Pipe `reader` to the connection.
    ///
    /// The response counts as completed as soon as piping starts. No
    /// `Content-Length` is sent unless one was set explicitly; the body ends
    /// when the connection closes.
    pub async fn stream(&mut self, mut reader: impl AsyncRead + Send + Unpin) -> Result<(), Error> {
        if self.completed {
            warn!("Attempted to stream to a completed response");
            return Err(Error::ResponseCompleted);
        }
        self.completed = true;

        let head = self.head_bytes(None);
        self.writer.write_all(&head).await?;
        tokio::io::copy(&mut reader, &mut self.writer).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shut down the write half once the exchange is over.
    pub(crate) async fn close(&mut self) -> Result<(), Error> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Status line and headers, ending with the blank line.
    fn head_bytes(&self, content_length: Option<usize>) -> Vec<u8> {
        let mut bytes = format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), self.status.reason_phrase()).into_bytes();

        for (name, value) in &self.headers {
            if content_length.is_some() && name.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            bytes.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        if let Some(length) = content_length {
            bytes.extend_from_slice(format!("Content-Length: {length}\r\n").as_bytes());
        }
        if self.header("Connection").is_none() {
            bytes.extend_from_slice(b"Connection: close\r\n");
        }

        bytes.extend_from_slice(b"\r\n");
        bytes
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("completed", &self.completed)
            .finish()
    }
}
