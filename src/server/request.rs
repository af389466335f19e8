//! The decorated request handed to middleware.

use std::cell::OnceCell;
use std::collections::HashMap;

use log::debug;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

use crate::parser::{Body, HttpVersion, Method, RequestHead};
use crate::server::Error;

/// An inbound request plus the metadata the router derives from it.
///
/// Cookies and the JSON body are parsed on first access. The first parse
/// wins for the lifetime of the request, even if headers change later.
#[derive(Debug)]
pub struct Request {
    /// The HTTP method.
    pub method: Method,
    /// The raw request target, if the transport delivered one.
    pub target: Option<String>,
    /// The HTTP version.
    pub version: HttpVersion,
    /// Header map keyed by lower-case header name.
    pub headers: HashMap<String, String>,
    /// Path parameters captured by the route entry currently running.
    pub params: HashMap<String, String>,
    parsed_url: Option<Url>,
    cookies: OnceCell<HashMap<String, String>>,
    json: OnceCell<Value>,
    body: Option<Body>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Request {
    /// Create a request from a parsed head and its body stream.
    pub fn new(head: RequestHead, body: Body) -> Self {
        Self {
            method: head.method,
            target: head.target,
            version: head.version,
            headers: head.headers,
            params: HashMap::new(),
            parsed_url: None,
            cookies: OnceCell::new(),
            json: OnceCell::new(),
            body: Some(body),
        }
    }

    /// Get a header value. Lookup is case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Check if a header exists.
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Set a header, replacing any existing value.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// The parsed request URL, once [`decorate`] has run.
    pub fn url(&self) -> Option<&Url> {
        self.parsed_url.as_ref()
    }

    /// Install an already-parsed URL. [`decorate`] will leave it alone.
    pub fn set_url(&mut self, url: Url) {
        self.parsed_url = Some(url);
    }

    /// The path component of the parsed URL.
    pub fn pathname(&self) -> Option<&str> {
        self.parsed_url.as_ref().map(Url::path)
    }

    /// The first value of a query parameter.
    pub fn query(&self, name: &str) -> Option<String> {
        self.parsed_url.as_ref().and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        })
    }

    /// All query parameters. Later duplicates overwrite earlier ones.
    pub fn query_pairs(&self) -> HashMap<String, String> {
        self.parsed_url
            .as_ref()
            .map(|url| url.query_pairs().into_owned().collect())
            .unwrap_or_default()
    }

    /// A path parameter of the route entry currently running.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// The request cookies, parsed from the `Cookie` header on first access.
    pub fn cookies(&self) -> &HashMap<String, String> {
        self.cookies.get_or_init(|| parse_cookies(self.header("Cookie")))
    }

    /// A single request cookie.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(String::as_str)
    }

    /// Take the raw body stream, if neither this call nor [`Request::json`]
    /// has consumed it yet.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Whether the head announces a non-empty JSON body.
    fn has_json_body(&self) -> bool {
        let has_length = self
            .header("Content-Length")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .is_some_and(|length| length > 0);
        let is_json = self.header("Content-Type").is_some_and(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .eq_ignore_ascii_case("application/json")
        });
        has_length && is_json
    }

    /// The request body parsed as JSON.
    ///
    /// Without a positive `Content-Length` and a JSON `Content-Type` this
    /// resolves to an empty object and leaves the body stream alone.
    /// Otherwise the whole stream is read and parsed. A parse or stream
    /// error is returned once; afterwards the call resolves to an empty
    /// object, since the stream cannot be read again.
    pub async fn json(&mut self) -> Result<Value, Error> {
        if let Some(value) = self.json.get() {
            return Ok(value.clone());
        }

        if !self.has_json_body() {
            debug!("Request has no JSON body, using an empty object");
            self.json = OnceCell::from(empty_object());
            return Ok(empty_object());
        }

        // A failed read leaves the empty object behind.
        self.json = OnceCell::from(empty_object());
        let Some(body) = self.body.take() else {
            return Ok(empty_object());
        };

        let bytes = body.collect().await?;
        let value: Value = serde_json::from_slice(&bytes)?;
        self.json = OnceCell::from(value.clone());
        Ok(value)
    }

    /// The request body deserialized into `T`.
    pub async fn json_as<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let value = self.json().await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Parse a `Cookie` header value into a map.
///
/// Pieces are split on `;`, trimmed, and empty pieces dropped. Each piece is
/// split on its first `=`; a piece without `=` maps to an empty value.
pub fn parse_cookies(header: Option<&str>) -> HashMap<String, String> {
    header
        .map(|header| {
            header
                .split(';')
                .map(str::trim)
                .filter(|piece| !piece.is_empty())
                .map(|piece| match piece.split_once('=') {
                    Some((key, value)) => (key.to_string(), value.to_string()),
                    None => (piece.to_string(), String::new()),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Prepare a request for dispatch.
///
/// Parses the raw target against the request's `Origin` header, or against
/// `default_origin` when that header is absent or unusable, and resets the
/// parameter map. A request whose URL is already parsed keeps it. A request
/// without a target, or with a target that does not parse, is left without
/// a URL, and dispatch will skip it.
pub fn decorate(req: &mut Request, default_origin: &str) {
    if req.parsed_url.is_none() {
        if let Some(target) = req.target.as_deref() {
            let base = req
                .header("Origin")
                .and_then(|origin| Url::parse(origin).ok())
                .or_else(|| Url::parse(default_origin).ok());

            match base.map(|base| base.join(target)) {
                Some(Ok(url)) => req.parsed_url = Some(url),
                Some(Err(e)) => debug!("Could not parse request target '{target}': {e}"),
                None => debug!("No usable origin to resolve '{target}' against"),
            }
        }
    }
    req.params = HashMap::new();
}
