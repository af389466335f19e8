//! HTTP wire module.
//!
//! This module turns the bytes arriving on a connection into a request head
//! and a body stream, which is all the routing layer needs from the
//! transport.

mod body;
mod error;
mod head;

// Re-export public items
pub use body::{Body, BodySender};
pub use error::Error;
pub use head::{HttpVersion, Method, RequestHead};

pub use head::{find_head_end, parse_request_head};
