//! Middleware handlers and route entries.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::router::pattern::RoutePattern;
use crate::server::{Error, Request, Response};

/// Type alias for the boxed future every handler returns.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

/// A type-erased middleware.
///
/// All middleware share one calling convention: the error being propagated
/// (if any), then the request and response. Normal handlers ignore the
/// error; error handlers only run when there is one.
pub type Middleware =
    Arc<dyn for<'a> Fn(Option<&'a Error>, &'a mut Request, &'a mut Response) -> HandlerFuture<'a> + Send + Sync>;

fn erase<F>(f: F) -> F
where
    F: for<'a> Fn(Option<&'a Error>, &'a mut Request, &'a mut Response) -> HandlerFuture<'a>
        + Send
        + Sync
        + 'static,
{
    f
}

fn skip<'a>() -> HandlerFuture<'a> {
    Box::pin(async { Ok(()) })
}

/// Build a normal middleware from a `(request, response)` function.
///
/// The function returns a boxed future so that it may borrow both
/// arguments across suspension points:
///
/// ```
/// use chainhttp_rs::router::handler;
///
/// let greet = handler(|_req, res| Box::pin(async move {
///     res.send("hello").await?;
///     Ok(())
/// }));
/// ```
pub fn handler<F>(f: F) -> Middleware
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> HandlerFuture<'a> + Send + Sync + 'static,
{
    Arc::new(erase(move |_error, req, res| f(req, res)))
}

/// Build an error middleware from an `(error, request, response)` function.
///
/// Invoked without a propagated error, the middleware does nothing.
pub fn error_handler<F>(f: F) -> Middleware
where
    F: for<'a> Fn(&'a Error, &'a mut Request, &'a mut Response) -> HandlerFuture<'a>
        + Send
        + Sync
        + 'static,
{
    Arc::new(erase(move |error, req, res| match error {
        Some(error) => f(error, req, res),
        None => skip(),
    }))
}

/// A route entry: a pattern and the middleware it runs, in order.
#[derive(Clone)]
pub struct Route {
    /// The compiled pattern.
    pub pattern: RoutePattern,
    /// The middleware chain.
    pub handlers: Vec<Middleware>,
}

impl Route {
    /// Create a route entry.
    pub fn new(pattern: RoutePattern, handlers: Vec<Middleware>) -> Self {
        Self { pattern, handlers }
    }
}
