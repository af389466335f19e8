//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::{oneshot, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use log::{debug, error, info, warn};

use crate::parser::{find_head_end, parse_request_head, Body, Error as ParserError, RequestHead};
use crate::router::{dispatch, Middleware, PathSpec, Route, RoutePattern, RouteTable};
use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::request::{decorate, Request};
use crate::server::response::{Response, StatusCode};

/// The normal and error route tables of one server.
#[derive(Default)]
pub(crate) struct Routes {
    normal: RouteTable,
    errors: RouteTable,
}

/// A listener owned by the server.
struct Listener {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// An HTTP server that runs requests through ordered middleware chains.
pub struct HttpServer {
    /// The server configuration.
    pub config: ServerConfig,
    routes: Arc<Routes>,
    listener: Mutex<Option<Listener>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            routes: Arc::new(Routes::default()),
            listener: Mutex::new(None),
        }
    }

    /// Register middleware that runs for every path.
    pub fn use_all(&self, handlers: Vec<Middleware>) {
        self.routes.normal.push(Route::new(RoutePattern::Any, handlers));
    }

    /// Register middleware for paths matching `spec`.
    pub fn use_path(&self, spec: impl Into<PathSpec>, handlers: Vec<Middleware>) -> Result<(), Error> {
        let pattern = RoutePattern::compile(spec)?;
        self.routes.normal.push(Route::new(pattern, handlers));
        Ok(())
    }

    /// Register error middleware that runs for every path.
    pub fn use_error_handler_all(&self, handlers: Vec<Middleware>) {
        self.routes.errors.push(Route::new(RoutePattern::Any, handlers));
    }

    /// Register error middleware for paths matching `spec`.
    pub fn use_error_handler_path(&self, spec: impl Into<PathSpec>, handlers: Vec<Middleware>) -> Result<(), Error> {
        let pattern = RoutePattern::compile(spec)?;
        self.routes.errors.push(Route::new(pattern, handlers));
        Ok(())
    }

    /// The normal route table.
    pub fn routes(&self) -> &RouteTable {
        &self.routes.normal
    }

    /// The error route table.
    pub fn error_routes(&self) -> &RouteTable {
        &self.routes.errors
    }

    /// Run one exchange through the middleware chains.
    ///
    /// The request is decorated and dispatched against the normal routes.
    /// If a handler fails, the error routes run with that error. A response
    /// that is still open afterwards is finalized empty.
    pub async fn handle(&self, req: &mut Request, res: &mut Response) -> Result<(), Error> {
        Self::process(&self.routes, &self.config.default_origin, req, res).await
    }

    async fn process(
        routes: &Routes,
        default_origin: &str,
        req: &mut Request,
        res: &mut Response,
    ) -> Result<(), Error> {
        decorate(req, default_origin);

        let normal = routes.normal.snapshot();
        if let Err(err) = dispatch(&normal, None, req, res).await {
            warn!("Handler failed, running error handlers: {err}");
            let errors = routes.errors.snapshot();
            dispatch(&errors, Some(&err), req, res).await?;
        }

        if !res.is_completed() {
            res.end(Vec::new()).await?;
        }
        Ok(())
    }

    /// Serve a single connection with this server's routes.
    pub async fn serve_connection<S>(&self, socket: S) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::handle_connection(socket, self.routes.clone(), Arc::new(self.config.clone())).await
    }

    /// Read the request head, stopping at the blank line.
    ///
    /// Returns `None` if the peer closes the connection before sending anything.
    async fn read_head<R>(reader: &mut R, limit: usize) -> Result<Option<(RequestHead, Vec<u8>)>, Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = Vec::with_capacity(limit.min(4096));
        let mut chunk = vec![0; 4096];

        loop {
            if let Some(end) = find_head_end(&buf) {
                if end > limit {
                    return Err(ParserError::HeadTooLarge(limit).into());
                }
                let head = parse_request_head(&buf[..end])?;
                let buffered = buf.split_off(end + 4);
                return Ok(Some((head, buffered)));
            }
            if buf.len() >= limit {
                return Err(ParserError::HeadTooLarge(limit).into());
            }

            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                if buf.is_empty() {
                    return Ok(None);
                }
                return Err(ParserError::IncompleteHead.into());
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Handle a single connection: one request, one response.
    pub(crate) async fn handle_connection<S>(
        socket: S,
        routes: Arc<Routes>,
        config: Arc<ServerConfig>,
    ) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(socket);
        let mut res = Response::new(writer);

        let (head, buffered) = match Self::read_head(&mut reader, config.read_buffer_size).await {
            Ok(Some(parts)) => parts,
            Ok(None) => return Ok(()), // Connection closed
            Err(Error::ParseError(e)) => {
                let status = match e {
                    ParserError::HeadTooLarge(_) => StatusCode::RequestHeaderFieldsTooLarge,
                    _ => StatusCode::BadRequest,
                };
                res.status(status).content_type("text/plain");
                res.send(format!("Error parsing request: {e}")).await?;
                res.close().await?;
                return Err(Error::ParseError(e));
            }
            Err(e) => return Err(e),
        };

        debug!(
            "{method} request received for '{target}'",
            method = head.method,
            target = head.target.as_deref().unwrap_or_default()
        );

        let length = head.content_length().unwrap_or(0);
        let body = Body::from_reader(buffered, Box::new(reader), length);
        let mut req = Request::new(head, body);

        let outcome = Self::process(&routes, &config.default_origin, &mut req, &mut res).await;
        if let Err(e) = &outcome {
            if !res.is_completed() {
                res.status(StatusCode::InternalServerError).content_type("text/plain");
                res.send(format!("Internal server error: {e}")).await?;
            }
        }

        res.close().await?;
        outcome
    }

    /// Log the listening address and the registered routes.
    fn display_server_info(&self, addr: SocketAddr) {
        info!("Server listening on http://{addr}");
        info!("Registered routes:");
        for route in self.routes.normal.snapshot().iter() {
            info!("  {pattern} ({count} handlers)", pattern = route.pattern, count = route.handlers.len());
        }
        for route in self.routes.errors.snapshot().iter() {
            info!("  {pattern} ({count} error handlers)", pattern = route.pattern, count = route.handlers.len());
        }
    }

    /// Handle a new connection.
    async fn handle_new_connection(
        socket: TcpStream,
        addr: SocketAddr,
        semaphore: Arc<Semaphore>,
        routes: Arc<Routes>,
        config: Arc<ServerConfig>,
        tasks: &mut JoinSet<()>,
    ) {
        // Try to acquire a permit from the semaphore
        let permit = match semaphore.try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, rejecting connection from {addr}");
                let mut res = Response::new(socket);
                res.status(StatusCode::ServiceUnavailable).content_type("text/plain");
                let _ = res.send("Server is at capacity, please try again later").await;
                let _ = res.close().await;
                return;
            }
        };

        tasks.spawn(async move {
            // The permit is dropped when the task completes, releasing the semaphore slot
            let _permit = permit;

            if let Err(e) = Self::handle_connection(socket, routes, config).await {
                error!("Error handling connection from {addr}: {e}");
            }
        });
    }

    /// Handle accept errors. They are usually transient (e.g. out of file
    /// descriptors), so back off briefly and keep accepting.
    async fn handle_accept_error(e: std::io::Error) {
        error!("Error accepting connection: {e}");
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    /// Wait for in-flight connections, then abort any that outlive the timeout.
    async fn perform_shutdown(tasks: &mut JoinSet<()>, timeout: std::time::Duration) {
        info!("Waiting for {len} active connections to complete...", len = tasks.len());
        let drained = tokio::time::timeout(timeout, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown timed out, aborting {len} connections", len = tasks.len());
            tasks.shutdown().await;
        }
        info!("Listener shutdown complete");
    }

    /// Accept connections until asked to stop.
    async fn accept_loop(
        listener: TcpListener,
        routes: Arc<Routes>,
        config: Arc<ServerConfig>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let semaphore = Arc::new(Semaphore::new(config.max_connections));
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                // A send or a dropped sender both mean stop
                _ = &mut shutdown_rx => {
                    info!("Shutting down listener...");
                    break;
                }

                // Reap finished connections
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {e}");
                    }
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((socket, addr)) => {
                            Self::handle_new_connection(
                                socket,
                                addr,
                                semaphore.clone(),
                                routes.clone(),
                                config.clone(),
                                &mut tasks,
                            ).await;
                        }
                        Err(e) => Self::handle_accept_error(e).await,
                    }
                }
            }
        }

        drop(listener);
        Self::perform_shutdown(&mut tasks, config.shutdown_timeout).await;
    }

    /// Start serving on `listener`.
    fn spawn_listener(&self, listener: TcpListener, addr: SocketAddr) -> Listener {
        self.display_server_info(addr);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(Self::accept_loop(
            listener,
            self.routes.clone(),
            Arc::new(self.config.clone()),
            shutdown_rx,
        ));
        Listener { addr, shutdown, task }
    }

    async fn shutdown_listener(listener: Listener) {
        info!("Stopping listener on {addr}", addr = listener.addr);
        let _ = listener.shutdown.send(());
        if let Err(e) = listener.task.await {
            error!("Listener task failed: {e}");
        }
    }

    /// Bind `port` on the configured IP and start accepting connections.
    ///
    /// Any listener the server already owns is stopped first. Returns the
    /// bound address, which is useful with port `0`.
    pub async fn start_server(&self, port: u16) -> Result<SocketAddr, Error> {
        let mut slot = self.listener.lock().await;
        if let Some(owned) = slot.take() {
            Self::shutdown_listener(owned).await;
        }

        let listener = TcpListener::bind(SocketAddr::new(self.config.addr.ip(), port)).await?;
        let addr = listener.local_addr()?;
        *slot = Some(self.spawn_listener(listener, addr));
        Ok(addr)
    }

    /// Serve connections from an externally created listener.
    ///
    /// Any listener the server already owns is stopped first. The server
    /// owns `listener` from then on, so [`HttpServer::stop_server`] closes it.
    pub async fn attach_to(&self, listener: TcpListener) -> Result<SocketAddr, Error> {
        let mut slot = self.listener.lock().await;
        if let Some(owned) = slot.take() {
            Self::shutdown_listener(owned).await;
        }

        let addr = listener.local_addr()?;
        *slot = Some(self.spawn_listener(listener, addr));
        Ok(addr)
    }

    /// Stop the owned listener, waiting for in-flight exchanges.
    ///
    /// Does nothing when the server is not listening.
    pub async fn stop_server(&self) {
        let owned = self.listener.lock().await.take();
        match owned {
            Some(listener) => Self::shutdown_listener(listener).await,
            None => debug!("Server is not listening, nothing to stop"),
        }
    }

    /// The address of the owned listener, if any.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(|listener| listener.addr)
    }

    /// Listen on the configured address until Ctrl+C, then shut down gracefully.
    pub async fn run(&self) -> Result<(), Error> {
        self.start_server(self.config.addr.port()).await?;

        signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating graceful shutdown");

        self.stop_server().await;
        Ok(())
    }
}
