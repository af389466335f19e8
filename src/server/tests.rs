//! Tests for the HTTP server implementation.

#[cfg(test)]
mod request_tests {
    use std::collections::HashMap;
    use std::io;

    use serde::Deserialize;
    use serde_json::json;
    use url::Url;

    use crate::parser::{Body, Method, RequestHead};
    use crate::server::{decorate, Error, Request};

    const ORIGIN: &str = "http://localhost/";

    fn request(head: RequestHead) -> Request {
        Request::new(head, Body::empty())
    }

    fn json_request(body: Body, length: &str) -> Request {
        let head = RequestHead::new(Method::POST, "/")
            .with_header("Content-Type", "application/json")
            .with_header("Content-Length", length);
        Request::new(head, body)
    }

    #[test]
    fn test_decorate_parses_url_and_query() {
        let mut req = request(RequestHead::new(Method::GET, "/foo/bar?cow=moo&dog=bark"));
        decorate(&mut req, ORIGIN);

        assert_eq!(req.pathname(), Some("/foo/bar"));
        assert_eq!(req.query("cow").as_deref(), Some("moo"));
        let expected: HashMap<String, String> = [("cow", "moo"), ("dog", "bark")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(req.query_pairs(), expected);
        assert_eq!(req.url().unwrap().host_str(), Some("localhost"));
    }

    #[test]
    fn test_decorate_prefers_origin_header() {
        let head = RequestHead::new(Method::GET, "/foo").with_header("Origin", "https://example.com");
        let mut req = request(head);
        decorate(&mut req, ORIGIN);

        let url = req.url().unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/foo");
    }

    #[test]
    fn test_decorate_falls_back_on_unusable_origin() {
        let head = RequestHead::new(Method::GET, "/foo").with_header("Origin", "null");
        let mut req = request(head);
        decorate(&mut req, ORIGIN);

        assert_eq!(req.url().unwrap().host_str(), Some("localhost"));
    }

    #[test]
    fn test_decorate_skips_missing_target() {
        let mut head = RequestHead::new(Method::GET, "/");
        head.target = None;
        let mut req = request(head);
        decorate(&mut req, ORIGIN);

        assert!(req.url().is_none());
        assert!(req.pathname().is_none());
    }

    #[test]
    fn test_decorate_skips_malformed_target() {
        let mut req = request(RequestHead::new(Method::GET, "http://[::1"));
        decorate(&mut req, ORIGIN);

        assert!(req.url().is_none());
        assert!(req.pathname().is_none());
    }

    #[test]
    fn test_decorate_keeps_parsed_url() {
        let mut req = request(RequestHead::new(Method::GET, "/foo/bar?cow=moo"));
        req.set_url(Url::parse("http://already.parsed/kept").unwrap());
        decorate(&mut req, ORIGIN);

        assert_eq!(req.pathname(), Some("/kept"));
    }

    #[test]
    fn test_decorate_resets_params() {
        let mut req = request(RequestHead::new(Method::GET, "/"));
        req.params.insert("stale".to_string(), "value".to_string());
        decorate(&mut req, ORIGIN);

        assert!(req.params.is_empty());
    }

    #[test]
    fn test_no_cookies() {
        let req = request(RequestHead::new(Method::GET, "/"));
        assert!(req.cookies().is_empty());
    }

    #[test]
    fn test_single_cookie() {
        let req = request(RequestHead::new(Method::GET, "/").with_header("Cookie", "foo=bar"));
        assert_eq!(req.cookie("foo"), Some("bar"));
        assert_eq!(req.cookies().len(), 1);
    }

    #[test]
    fn test_multiple_cookies_ignore_empty_pieces() {
        let req = request(RequestHead::new(Method::GET, "/").with_header("Cookie", "cow=moo; dog=bark;"));
        assert_eq!(req.cookies().len(), 2);
        assert_eq!(req.cookie("cow"), Some("moo"));
        assert_eq!(req.cookie("dog"), Some("bark"));

        let req = request(RequestHead::new(Method::GET, "/").with_header("Cookie", " cow=moo;; ;dog=bark "));
        assert_eq!(req.cookies().len(), 2);
    }

    #[test]
    fn test_cookie_splits_on_first_equals() {
        let req = request(RequestHead::new(Method::GET, "/").with_header("Cookie", "token=a=b=c; flag"));
        assert_eq!(req.cookie("token"), Some("a=b=c"));
        assert_eq!(req.cookie("flag"), Some(""));
    }

    #[test]
    fn test_cookies_are_parsed_once() {
        let mut req = request(RequestHead::new(Method::GET, "/").with_header("Cookie", "cow=moo; dog=bark"));
        assert_eq!(req.cookie("cow"), Some("moo"));

        req.set_header("Cookie", "cow=changed");
        assert_eq!(req.cookie("cow"), Some("moo"));
        assert_eq!(req.cookies().len(), 2);
    }

    #[tokio::test]
    async fn test_json_from_chunks() {
        let (tx, body) = Body::channel(4);
        let mut req = json_request(body, "13");

        tx.send(Ok(b"{\"cow\":".to_vec())).await.unwrap();
        tx.send(Ok(b"\"moo\"}".to_vec())).await.unwrap();
        drop(tx);

        assert_eq!(req.json().await.unwrap(), json!({"cow": "moo"}));
        assert!(req.take_body().is_none());
        // Cached: the stream is gone, yet the value is still there
        assert_eq!(req.json().await.unwrap(), json!({"cow": "moo"}));
    }

    #[tokio::test]
    async fn test_malformed_json_rejects_once() {
        let (tx, body) = Body::channel(4);
        let mut req = json_request(body, "12");

        tx.send(Ok(b"{\"cow\":\"moo\"".to_vec())).await.unwrap();
        drop(tx);

        assert!(matches!(req.json().await, Err(Error::JsonError(_))));
        assert_eq!(req.json().await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_stream_error_rejects_once() {
        let (tx, body) = Body::channel(4);
        let mut req = json_request(body, "20");

        tx.send(Ok(b"{\"cow\":".to_vec())).await.unwrap();
        tx.send(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))).await.unwrap();
        drop(tx);

        assert!(matches!(req.json().await, Err(Error::IoError(_))));
        assert_eq!(req.json().await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_json_requires_json_content_type() {
        let head = RequestHead::new(Method::POST, "/")
            .with_header("Content-Type", "text/plain")
            .with_header("Content-Length", "13");
        let mut req = Request::new(head, Body::from_bytes("{\"cow\":\"moo\"}"));

        assert_eq!(req.json().await.unwrap(), json!({}));
        // The body was not consumed
        let body = req.take_body().unwrap();
        assert_eq!(body.collect().await.unwrap(), b"{\"cow\":\"moo\"}");
    }

    #[tokio::test]
    async fn test_json_requires_positive_content_length() {
        for length in ["0", "abc"] {
            let mut req = json_request(Body::from_bytes("{\"cow\":\"moo\"}"), length);
            assert_eq!(req.json().await.unwrap(), json!({}));
            assert!(req.take_body().is_some());
        }

        let head = RequestHead::new(Method::POST, "/").with_header("Content-Type", "application/json");
        let mut req = Request::new(head, Body::from_bytes("{\"cow\":\"moo\"}"));
        assert_eq!(req.json().await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_json_content_type_parameters_are_ignored() {
        let head = RequestHead::new(Method::POST, "/")
            .with_header("Content-Type", "Application/JSON; charset=utf-8")
            .with_header("Content-Length", "13");
        let mut req = Request::new(head, Body::from_bytes("{\"cow\":\"moo\"}"));

        assert_eq!(req.json().await.unwrap(), json!({"cow": "moo"}));
    }

    #[tokio::test]
    async fn test_json_as_typed_value() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Animal {
            cow: String,
        }

        let mut req = json_request(Body::from_bytes("{\"cow\":\"moo\"}"), "13");
        let animal: Animal = req.json_as().await.unwrap();
        assert_eq!(animal, Animal { cow: "moo".to_string() });
    }
}

#[cfg(test)]
mod response_tests {
    use std::io;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    use serde::Serialize;
    use serde_json::json;
    use tokio::io::AsyncWrite;

    use crate::server::{serialize_cookie, CookieOptions, Error, Response, SameSite, StatusCode};

    // Writer that keeps everything written to it
    #[derive(Clone, Default)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl SharedWriter {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        fn body(&self) -> String {
            let text = self.text();
            text.split_once("\r\n\r\n").map(|(_, body)| body.to_string()).unwrap_or_default()
        }
    }

    impl AsyncWrite for SharedWriter {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn response() -> (SharedWriter, Response) {
        let writer = SharedWriter::default();
        (writer.clone(), Response::new(writer))
    }

    #[tokio::test]
    async fn test_send_bytes() {
        let (out, mut res) = response();
        res.send(b"done".to_vec()).await.unwrap();

        assert!(res.is_completed());
        assert!(out.text().starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.text().contains("Content-Length: 4\r\n"));
        assert_eq!(out.body(), "done");
    }

    #[tokio::test]
    async fn test_send_text() {
        let (out, mut res) = response();
        res.send("done").await.unwrap();

        assert!(res.is_completed());
        assert_eq!(out.body(), "done");
        assert!(!out.text().contains("Content-Type"));
    }

    #[tokio::test]
    async fn test_send_json_value() {
        let (out, mut res) = response();
        res.send(json!({"cow": "moo"})).await.unwrap();

        assert_eq!(out.body(), "{\"cow\":\"moo\"}");
        assert!(out.text().contains("Content-Type: application/json\r\n"));
    }

    #[tokio::test]
    async fn test_send_json_keeps_explicit_content_type() {
        #[derive(Serialize)]
        struct Message {
            message: &'static str,
        }

        let (out, mut res) = response();
        res.content_type("application/vnd.api+json");
        res.send_json(&Message { message: "hi" }).await.unwrap();

        assert_eq!(out.body(), "{\"message\":\"hi\"}");
        assert!(out.text().contains("Content-Type: application/vnd.api+json\r\n"));
        assert!(!out.text().contains("Content-Type: application/json\r\n"));
    }

    #[tokio::test]
    async fn test_stream_pipes_reader() {
        let (out, mut res) = response();
        let source: &'static [u8] = b"streamed data";
        res.stream(source).await.unwrap();

        assert!(res.is_completed());
        assert_eq!(out.body(), "streamed data");
        assert!(!out.text().contains("Content-Length"));
    }

    #[tokio::test]
    async fn test_end_twice_is_an_error() {
        let (out, mut res) = response();
        res.end("first").await.unwrap();

        assert!(matches!(res.end("second").await, Err(Error::ResponseCompleted)));
        assert!(matches!(res.send("third").await, Err(Error::ResponseCompleted)));
        assert!(res.is_completed());
        assert_eq!(out.body(), "first");
    }

    #[tokio::test]
    async fn test_status_and_headers() {
        let (out, mut res) = response();
        res.status(StatusCode::NotFound).set_header("X-Test", "one");
        res.set_header("x-test", "two");
        res.end(Vec::new()).await.unwrap();

        let text = out.text();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("x-test: two\r\n"));
        assert!(!text.contains("X-Test: one"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.contains("Connection: close\r\n"));
    }

    #[test]
    fn test_session_cookie() {
        let (_, mut res) = response();
        res.cookie("foo", "bar", CookieOptions::default());
        assert_eq!(res.header("Set-Cookie"), Some("foo=bar"));
    }

    #[test]
    fn test_cookie_with_max_age() {
        let (_, mut res) = response();
        res.cookie("foo", "bar", 3600_i64);
        assert_eq!(res.header("Set-Cookie"), Some("foo=bar; Max-Age=3600"));
    }

    #[test]
    fn test_cookie_boolean_options() {
        let options = CookieOptions {
            secure: Some(true),
            http_only: Some(false),
            ..CookieOptions::default()
        };
        assert_eq!(serialize_cookie("foo", "bar", &options), "foo=bar; Secure");
    }

    #[test]
    fn test_cookie_partial_options() {
        let options = CookieOptions {
            max_age: Some(3600),
            domain: Some("example.com".to_string()),
            secure: Some(true),
            http_only: Some(true),
            ..CookieOptions::default()
        };
        assert_eq!(
            serialize_cookie("foo", "bar", &options),
            "foo=bar; Max-Age=3600; Domain=example.com; Secure; HttpOnly"
        );
    }

    #[test]
    fn test_cookie_all_options_in_order() {
        let options = CookieOptions {
            max_age: Some(60),
            domain: Some("example.com".to_string()),
            path: Some("/app".to_string()),
            same_site: Some(SameSite::Strict),
            secure: Some(true),
            http_only: Some(true),
        };
        assert_eq!(
            serialize_cookie("id", "42", &options),
            "id=42; Max-Age=60; Domain=example.com; Path=/app; SameSite=Strict; Secure; HttpOnly"
        );
    }

    #[test]
    fn test_cookie_unset_options_are_omitted() {
        let options = CookieOptions {
            max_age: Some(3600),
            secure: None,
            ..CookieOptions::default()
        };
        assert_eq!(serialize_cookie("foo", "bar", &options), "foo=bar; Max-Age=3600");
    }

    #[tokio::test]
    async fn test_multiple_cookies_are_appended() {
        let (out, mut res) = response();
        res.cookie("a", "1", CookieOptions::default());
        res.cookie("b", "2", CookieOptions::default());
        res.end(Vec::new()).await.unwrap();

        let set_cookies: Vec<&str> = res
            .headers()
            .iter()
            .filter(|(name, _)| name == "Set-Cookie")
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(set_cookies, vec!["a=1", "b=2"]);
        assert!(out.text().contains("Set-Cookie: a=1\r\nSet-Cookie: b=2\r\n"));
    }
}

#[cfg(test)]
mod server_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use crate::router::{error_handler, handler};
    use crate::server::{Error, HttpServer, ServerConfig, StatusCode};

    async fn exchange(server: &HttpServer, request: &[u8]) -> (Result<(), Error>, String) {
        let (mut client, socket) = tokio::io::duplex(64 * 1024);
        client.write_all(request).await.unwrap();

        let result = server.serve_connection(socket).await;

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        (result, String::from_utf8_lossy(&response).into_owned())
    }

    fn body_of(response: &str) -> &str {
        response.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or_default()
    }

    fn echo_id_server() -> HttpServer {
        let server = HttpServer::new(ServerConfig::default());
        server
            .use_path(
                "/get/:id",
                vec![handler(|req, res| {
                    let id = req.param("id").unwrap_or_default().to_string();
                    Box::pin(async move { res.send(format!("Here's object id {id}")).await })
                })],
            )
            .unwrap();
        server
    }

    #[test]
    fn test_registration_appends_entries() {
        let server = HttpServer::new(ServerConfig::default());
        server.use_all(vec![handler(|_req, _res| Box::pin(async { Ok(()) }))]);
        server.use_path("/foo", vec![]).unwrap();
        server.use_error_handler_all(vec![]);
        server.use_error_handler_path("/foo/:id", vec![]).unwrap();

        assert_eq!(server.routes().len(), 2);
        assert_eq!(server.error_routes().len(), 2);
        let routes = server.routes().snapshot();
        assert!(routes[0].pattern.is_match_all());
        assert_eq!(routes[1].pattern.to_string(), "/foo");
    }

    #[tokio::test]
    async fn test_path_parameter_is_echoed() {
        let server = echo_id_server();
        let (result, response) = exchange(&server, b"GET /get/5 HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(body_of(&response).contains('5'));
        assert_eq!(body_of(&response), "Here's object id 5");
    }

    #[tokio::test]
    async fn test_unmatched_request_gets_empty_response() {
        let server = echo_id_server();
        let (result, response) = exchange(&server, b"GET /nothing/here HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Length: 0\r\n"));
        assert_eq!(body_of(&response), "");
    }

    #[tokio::test]
    async fn test_middleware_runs_before_route() {
        let server = HttpServer::new(ServerConfig::default());
        server.use_all(vec![handler(|req, res| {
            if req.cookie("foo").is_none() {
                res.cookie("foo", "bar", crate::server::CookieOptions::default());
            }
            Box::pin(async { Ok(()) })
        })]);
        server
            .use_path("/", vec![handler(|_req, res| {
                Box::pin(async move { res.send(serde_json::json!({"message": "request handled!!"})).await })
            })])
            .unwrap();

        let (_, response) = exchange(&server, b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(response.contains("Set-Cookie: foo=bar\r\n"));
        assert_eq!(body_of(&response), "{\"message\":\"request handled!!\"}");

        let (_, response) = exchange(&server, b"GET / HTTP/1.1\r\nHost: localhost\r\nCookie: foo=bar\r\n\r\n").await;
        assert!(!response.contains("Set-Cookie"));
    }

    #[tokio::test]
    async fn test_json_body_is_read_from_connection() {
        let server = HttpServer::new(ServerConfig::default());
        server
            .use_path("/echo", vec![handler(|req, res| {
                Box::pin(async move {
                    let body = req.json().await?;
                    res.send(body).await
                })
            })])
            .unwrap();

        let request = b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"cow\":\"moo\"}";
        let (result, response) = exchange(&server, request).await;

        assert!(result.is_ok());
        assert_eq!(body_of(&response), "{\"cow\":\"moo\"}");
    }

    #[tokio::test]
    async fn test_handler_error_runs_error_chain() {
        let server = HttpServer::new(ServerConfig::default());
        server.use_all(vec![handler(|_req, _res| Box::pin(async { Err(Error::msg("boom")) }))]);
        server.use_error_handler_all(vec![error_handler(|err, _req, res| {
            let message = format!("recovered from {err}");
            Box::pin(async move {
                res.status(StatusCode::BadGateway);
                res.send(message).await
            })
        })]);

        let (result, response) = exchange(&server, b"GET /any HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
        assert_eq!(body_of(&response), "recovered from Internal server error: boom");
    }

    #[tokio::test]
    async fn test_error_after_send_skips_error_chain() {
        let server = HttpServer::new(ServerConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        server.use_all(vec![handler(|_req, res| {
            Box::pin(async move {
                res.send("done").await?;
                Err(Error::msg("late failure"))
            })
        })]);

        let counted = calls.clone();
        server.use_error_handler_all(vec![error_handler(move |_err, _req, res| {
            counted.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { res.send("recovered").await })
        })]);

        let (result, response) = exchange(&server, b"GET /any HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert!(result.is_ok());
        assert_eq!(body_of(&response), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_target_gets_empty_response() {
        let server = HttpServer::new(ServerConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        server.use_all(vec![handler(move |_req, res| {
            counted.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { res.send("matched").await })
        })]);

        let (result, response) = exchange(&server, b"GET http://[::1 HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Length: 0\r\n"));
        assert_eq!(body_of(&response), "");
    }

    #[tokio::test]
    async fn test_handler_error_without_error_chain_gets_empty_response() {
        let server = HttpServer::new(ServerConfig::default());
        server.use_all(vec![handler(|_req, _res| Box::pin(async { Err(Error::msg("boom")) }))]);

        let (result, response) = exchange(&server, b"GET /any HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(body_of(&response), "");
    }

    #[tokio::test]
    async fn test_failing_error_handler_gets_internal_error() {
        let server = HttpServer::new(ServerConfig::default());
        server.use_all(vec![handler(|_req, _res| Box::pin(async { Err(Error::msg("boom")) }))]);
        server.use_error_handler_all(vec![error_handler(|_err, _req, _res| {
            Box::pin(async { Err(Error::msg("still broken")) })
        })]);

        let (result, response) = exchange(&server, b"GET /any HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert!(matches!(result, Err(Error::InternalError(ref m)) if m == "still broken"));
        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    }

    #[tokio::test]
    async fn test_error_routes_match_on_path() {
        let server = HttpServer::new(ServerConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        server.use_all(vec![handler(|_req, _res| Box::pin(async { Err(Error::msg("boom")) }))]);

        let counted = calls.clone();
        server
            .use_error_handler_path("/api/:name", vec![error_handler(move |_err, req, res| {
                counted.fetch_add(1, Ordering::SeqCst);
                let name = req.param("name").unwrap_or_default().to_string();
                Box::pin(async move { res.send(name).await })
            })])
            .unwrap();

        let (_, response) = exchange(&server, b"GET /api/users HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert_eq!(body_of(&response), "users");

        let (_, response) = exchange(&server, b"GET /web HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert_eq!(body_of(&response), "");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_gets_bad_request() {
        let server = echo_id_server();
        let (result, response) = exchange(&server, b"INVALID REQUEST\r\n\r\n").await;

        assert!(matches!(result, Err(Error::ParseError(_))));
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("Error parsing request:"));
    }

    #[tokio::test]
    async fn test_oversized_head_is_rejected() {
        let server = HttpServer::new(ServerConfig {
            read_buffer_size: 64,
            ..ServerConfig::default()
        });
        let mut request = b"GET / HTTP/1.1\r\nHost: localhost\r\nX-Padding: ".to_vec();
        request.extend(std::iter::repeat(b'a').take(256));
        request.extend_from_slice(b"\r\n\r\n");

        let (result, response) = exchange(&server, &request).await;

        assert!(matches!(result, Err(Error::ParseError(_))));
        assert!(response.starts_with("HTTP/1.1 431 Request Header Fields Too Large\r\n"));
    }

    #[tokio::test]
    async fn test_closed_connection_is_ignored() {
        let server = echo_id_server();
        let (client, socket) = tokio::io::duplex(1024);
        drop(client);

        assert!(server.serve_connection(socket).await.is_ok());
    }

    async fn get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_start_and_stop_server() {
        let server = echo_id_server();
        assert!(server.local_addr().await.is_none());

        let addr = server.start_server(0).await.unwrap();
        assert_eq!(server.local_addr().await, Some(addr));

        let response = get(addr, "/get/42").await;
        assert_eq!(body_of(&response), "Here's object id 42");

        server.stop_server().await;
        assert!(server.local_addr().await.is_none());
        assert!(TcpStream::connect(addr).await.is_err());

        // Stopping again is a no-op
        server.stop_server().await;
    }

    #[tokio::test]
    async fn test_restart_replaces_listener() {
        let server = echo_id_server();
        let first = server.start_server(0).await.unwrap();
        let second = server.start_server(0).await.unwrap();

        assert_eq!(server.local_addr().await, Some(second));
        assert!(TcpStream::connect(first).await.is_err());
        assert_eq!(body_of(&get(second, "/get/7").await), "Here's object id 7");

        server.stop_server().await;
    }

    #[tokio::test]
    async fn test_attach_to_external_listener() {
        let server = echo_id_server();
        server.start_server(0).await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server.attach_to(listener).await.unwrap();

        assert_eq!(server.local_addr().await, Some(addr));
        assert_eq!(body_of(&get(addr, "/get/9").await), "Here's object id 9");

        server.stop_server().await;
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let server = HttpServer::new(ServerConfig {
            max_connections: 0,
            ..ServerConfig::default()
        });
        let addr = server.start_server(0).await.unwrap();

        // Rejected before the request is read, so send nothing
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
        assert_eq!(body_of(&response), "Server is at capacity, please try again later");

        server.stop_server().await;
    }
}
