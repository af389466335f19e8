//! A minimal HTTP middleware router.
//!
//! Requests are decorated with their parsed URL, path parameters, cookies
//! and JSON body, then run through an ordered list of middleware chains
//! selected by path pattern. Dispatch stops as soon as a response has been
//! sent. A second list of chains handles errors raised by the first.
//!
//! # Features
//!
//! - Path templates with named parameters (`/users/:id`) or raw regular expressions
//! - Every matching route entry runs, in registration order, until one responds
//! - Error middleware chains that receive the failing handler's error
//! - Lazily parsed cookies and JSON bodies, cached per request
//! - `Set-Cookie` serialization with the usual attributes
//! - Every request gets a terminated response, even when nothing matched
//!
//! # Examples
//!
//! ## Path patterns
//!
//! ```
//! use chainhttp_rs::RoutePattern;
//!
//! let pattern = RoutePattern::compile("/get/:id").unwrap();
//! assert!(pattern.is_match("/get/5"));
//! assert!(pattern.is_match("/get/5/"));
//! assert!(!pattern.is_match("/get/5/extra"));
//! assert_eq!(pattern.extract_params("/get/5")["id"], "5");
//! ```
//!
//! ## A small server
//!
//! ```no_run
//! use chainhttp_rs::router::{error_handler, handler};
//! use chainhttp_rs::{CookieOptions, HttpServer, ServerConfig, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chainhttp_rs::ServerError> {
//!     let server = HttpServer::new(ServerConfig::default());
//!
//!     // Runs for every request, never responds
//!     server.use_all(vec![handler(|req, res| Box::pin(async move {
//!         if req.cookie("visited").is_none() {
//!             res.cookie("visited", "yes", CookieOptions::default());
//!         }
//!         Ok(())
//!     }))]);
//!
//!     server.use_path("/get/:id", vec![handler(|req, res| Box::pin(async move {
//!         let id = req.param("id").unwrap_or_default().to_string();
//!         res.send(format!("Here's object id {id}")).await
//!     }))])?;
//!
//!     server.use_error_handler_all(vec![error_handler(|err, _req, res| Box::pin(async move {
//!         res.status(StatusCode::InternalServerError);
//!         res.send(err.to_string()).await
//!     }))]);
//!
//!     server.run().await
//! }
//! ```

// Export the wire module
pub mod parser;

// Export the routing module
pub mod router;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{Body, Error as ParserError, HttpVersion, Method, RequestHead};
pub use router::{PathSpec, RoutePattern};
pub use server::{
    CookieOptions, Error as ServerError, HttpServer, Payload, Request, Response, SameSite, ServerConfig, StatusCode,
};
