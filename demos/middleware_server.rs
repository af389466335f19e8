//! A small server demonstrating middleware chains, path parameters and error handlers.

use chainhttp_rs::router::{error_handler, handler};
use chainhttp_rs::{CookieOptions, HttpServer, ServerConfig, StatusCode};
use log::{info, warn};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the logger
    env_logger::init();

    let config = ServerConfig {
        addr: "127.0.0.1:3000".parse()?,
        ..ServerConfig::default()
    };
    let server = HttpServer::new(config);

    // Runs for every request and never responds, so dispatch continues
    server.use_all(vec![handler(|req, res| {
        if req.cookie("foo").is_none() {
            res.cookie("foo", "bar", CookieOptions::default());
        }
        Box::pin(async { Ok(()) })
    })]);

    server.use_path(
        "/",
        vec![handler(|_req, res| {
            Box::pin(async move { res.send(json!({ "message": "request handled!!" })).await })
        })],
    )?;

    server.use_path(
        "/foo/bar",
        vec![handler(|_req, res| Box::pin(async move { res.send("Fooo Baaar").await }))],
    )?;

    server.use_path(
        "/get/:id",
        vec![handler(|req, res| {
            let id = req.param("id").unwrap_or_default().to_string();
            Box::pin(async move { res.end(format!("Here's object id {id}")).await })
        })],
    )?;

    // Echo a JSON body back, failing on malformed input
    server.use_path(
        "/echo",
        vec![handler(|req, res| {
            Box::pin(async move {
                let body = req.json().await?;
                res.send(body).await
            })
        })],
    )?;

    server.use_error_handler_all(vec![error_handler(|err, req, res| {
        warn!("Request for {:?} failed: {err}", req.pathname());
        let message = err.to_string();
        Box::pin(async move {
            res.status(StatusCode::BadRequest);
            res.send(json!({ "error": message })).await
        })
    })]);

    info!("Routes:");
    info!("  *         (cookie middleware)");
    info!("  /         JSON greeting");
    info!("  /foo/bar  text");
    info!("  /get/:id  path parameter");
    info!("  /echo     JSON echo");

    server.run().await?;
    Ok(())
}
