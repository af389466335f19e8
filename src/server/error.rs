//! Error types for the HTTP server.

use thiserror::Error;

use crate::parser::Error as ParserError;

/// Errors that can occur while routing and serving an exchange.
///
/// Handlers return this type; an `Err` from a normal handler is what gets
/// threaded through the error handler chain.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing an HTTP request head.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error, including errors on the request body stream.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A route pattern could not be compiled.
    #[error("Invalid route pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A terminal write was attempted on a response that is already completed.
    #[error("Response already completed")]
    ResponseCompleted,

    /// An error raised by a handler.
    #[error("Handler error: {0}")]
    HandlerError(Box<dyn std::error::Error + Send + Sync>),

    /// Internal server error.
    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl Error {
    /// Wrap any error raised inside a handler.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::HandlerError(err.into())
    }

    /// An internal error carrying just a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::InternalError(message.into())
    }
}
