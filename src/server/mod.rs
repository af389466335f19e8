//! HTTP server implementation for chainhttp-rs.
//!
//! This module wires connections to the router: each inbound request is
//! decorated, dispatched through the normal middleware chain, and on failure
//! through the error chain.

mod config;
mod error;
mod http_server;
mod request;
mod response;
mod tests;

// Re-export public items
pub use config::ServerConfig;
pub use error::Error;
pub use http_server::HttpServer;
pub use request::{decorate, parse_cookies, Request};
pub use response::{serialize_cookie, CookieOptions, Payload, Response, SameSite, StatusCode};
