//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// The largest request head accepted, in bytes.
    pub read_buffer_size: usize,
    /// Base URL for request targets when the request has no `Origin` header.
    pub default_origin: String,
    /// How long a stopping listener waits for in-flight exchanges.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            max_connections: 1024,
            read_buffer_size: 8192,
            default_origin: "http://localhost/".to_string(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}
