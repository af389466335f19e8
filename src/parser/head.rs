//! Request head parsing: request line, method, version and headers.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::parser::error::Error;

/// HTTP request methods.
///
/// Well-formed tokens that are not one of the standard methods are kept as
/// [`Method::Extension`] so that middleware can decide what to do with them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    OPTIONS,
    PATCH,
    CONNECT,
    TRACE,
    /// Any other token, e.g. `PURGE` or `PROPFIND`.
    Extension(String),
}

impl Method {
    /// The method as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::CONNECT => "CONNECT",
            Method::TRACE => "TRACE",
            Method::Extension(token) => token,
        }
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "HEAD" => Ok(Method::HEAD),
            "OPTIONS" => Ok(Method::OPTIONS),
            "PATCH" => Ok(Method::PATCH),
            "CONNECT" => Ok(Method::CONNECT),
            "TRACE" => Ok(Method::TRACE),
            _ if !s.is_empty() && s.chars().all(is_token_char) => Ok(Method::Extension(s.to_string())),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported HTTP protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl FromStr for HttpVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP/1.0" => Ok(HttpVersion::Http10),
            "HTTP/1.1" => Ok(HttpVersion::Http11),
            _ => Err(Error::InvalidVersion(s.to_string())),
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpVersion::Http10 => write!(f, "HTTP/1.0"),
            HttpVersion::Http11 => write!(f, "HTTP/1.1"),
        }
    }
}

/// The head of an inbound request as delivered by the transport.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// The HTTP method.
    pub method: Method,
    /// The raw request target, e.g. `/foo/bar?cow=moo`.
    pub target: Option<String>,
    /// The HTTP version.
    pub version: HttpVersion,
    /// Header map keyed by lower-case header name.
    pub headers: HashMap<String, String>,
}

impl RequestHead {
    /// Create a head for `target` with no headers.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: Some(target.into()),
            version: HttpVersion::Http11,
            headers: HashMap::new(),
        }
    }

    /// Add a header, merging with an existing value of the same name.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        insert_header(&mut self.headers, name, value.into());
        self
    }

    /// Get a header value. Lookup is case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The declared body length, if the `Content-Length` header is numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.header("Content-Length")
            .and_then(|value| value.trim().parse().ok())
    }
}

/// Insert a header under its lower-case name.
///
/// Repeated headers are joined with `, `, except `Cookie` which is joined
/// with `; ` so the merged value still parses as one cookie list.
fn insert_header(headers: &mut HashMap<String, String>, name: &str, value: String) {
    let name = name.to_ascii_lowercase();
    match headers.get_mut(&name) {
        Some(existing) => {
            let separator = if name == "cookie" { "; " } else { ", " };
            existing.push_str(separator);
            existing.push_str(&value);
        }
        None => {
            headers.insert(name, value);
        }
    }
}

/// Find the end of the request head (the index of the blank line's `\r\n\r\n`).
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Parse a request head from a byte slice.
///
/// # Arguments
///
/// * `input` - The request line and header lines, optionally followed by the blank line
///
/// # Returns
///
/// The parsed head, or an error if the head is invalid
pub fn parse_request_head(input: &[u8]) -> Result<RequestHead, Error> {
    let input_str = match std::str::from_utf8(input) {
        Ok(s) => s,
        Err(_) => return Err(Error::MalformedRequestLine("Invalid UTF-8".to_string())),
    };

    let mut lines = input_str.lines();

    let request_line = match lines.next() {
        Some(line) if !line.trim().is_empty() => line,
        _ => return Err(Error::EmptyRequest),
    };

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::MalformedRequestLine(request_line.to_string()));
    }

    let method = Method::from_str(parts[0])?;
    let target = parts[1].to_string();
    if target.is_empty() {
        return Err(Error::InvalidPath);
    }
    let version = HttpVersion::from_str(parts[2])?;

    let mut headers = HashMap::new();
    for line in lines {
        // Empty line indicates the end of headers
        if line.is_empty() {
            break;
        }

        let (name, value) = line.split_once(':').ok_or(Error::InvalidHeaderFormat)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidHeaderFormat);
        }
        insert_header(&mut headers, name, value.trim().to_string());
    }

    if version == HttpVersion::Http11 && !headers.contains_key("host") {
        return Err(Error::MissingHeader("Host".to_string()));
    }

    Ok(RequestHead {
        method,
        target: Some(target),
        version,
        headers,
    })
}
