//! Error types for the HTTP wire parser.

use thiserror::Error;

/// Errors that can occur while reading an HTTP request head.
#[derive(Debug, Error)]
pub enum Error {
    /// The method token contains characters outside the HTTP token set.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The request target is missing.
    #[error("Invalid HTTP path")]
    InvalidPath,

    /// The request line is malformed (wrong format or missing components).
    #[error("Malformed request line: {0}")]
    MalformedRequestLine(String),

    /// The HTTP version in the request is not supported.
    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    /// A required header is missing from the request.
    #[error("Required header is missing: {0}")]
    MissingHeader(String),

    /// A header line has no `:` separator or an empty name.
    #[error("Invalid header format")]
    InvalidHeaderFormat,

    /// The request is empty.
    #[error("Empty request")]
    EmptyRequest,

    /// The request head did not fit in the configured read buffer.
    #[error("Request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    /// The peer closed the connection before the head was complete.
    #[error("Connection closed before the request head was complete")]
    IncompleteHead,
}
