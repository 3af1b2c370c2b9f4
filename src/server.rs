//! Ephemeral HTTP listener.
//!
//! Binds a local port, hands every request to a `Respond` implementation
//! and records the validation failures it reports.

use crate::handler::{IncomingRequest, Respond};
use crate::matcher::ValidationFailure;
use crate::synth::CONTENT_TYPE as JSON_CONTENT_TYPE;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What the listener saw while it was up.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    /// Requests received
    pub requests: usize,
    /// Responses written
    pub responses: usize,
    /// Validation failures reported by the handler, in arrival order
    pub failures: Vec<ValidationFailure>,
}

/// A running listener. Dropping it stops the accept loop.
pub struct MockListener {
    addr: SocketAddr,
    log: Arc<Mutex<RequestLog>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MockListener {
    /// Start a single-request listener on an ephemeral loopback port.
    ///
    /// Any request after the first is recorded as a failure.
    pub async fn start<R: Respond + 'static>(responder: R) -> std::io::Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        Self::spawn(addr, Arc::new(responder), true).await
    }

    /// Start a long-running listener on `addr`.
    pub async fn serve<R: Respond + 'static>(
        addr: SocketAddr,
        responder: R,
    ) -> std::io::Result<Self> {
        Self::spawn(addr, Arc::new(responder), false).await
    }

    async fn spawn(
        addr: SocketAddr,
        responder: Arc<dyn Respond>,
        single_request: bool,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let log = Arc::new(Mutex::new(RequestLog::default()));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let log_clone = log.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(conn) => conn,
                            Err(e) => {
                                warn!(error = %e, "Failed to accept connection");
                                break;
                            }
                        };
                        debug!(%peer, "Accepted connection");

                        let responder = responder.clone();
                        let log = log_clone.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req: Request<Incoming>| {
                                let response = serve_request(responder.as_ref(), &log, single_request, req);
                                async move { Ok::<_, Infallible>(response) }
                            });

                            if let Err(e) = http1::Builder::new()
                                .keep_alive(false)
                                .serve_connection(TokioIo::new(stream), service)
                                .await
                            {
                                debug!(error = %e, "Connection ended with error");
                            }
                        });
                    }
                    _ = &mut shutdown_rx => {
                        debug!(%addr, "Listener shutting down");
                        break;
                    }
                }
            }
        });

        debug!(%addr, single_request, "Listener started");

        Ok(Self {
            addr,
            log,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Get the address this listener is bound to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Snapshot of the request log.
    pub fn log(&self) -> RequestLog {
        self.log.lock().clone()
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn shutdown(mut self) -> RequestLog {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Listener task failed");
            }
        }
        self.log()
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve_request(
    responder: &dyn Respond,
    log: &Mutex<RequestLog>,
    single_request: bool,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let request = IncomingRequest {
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
        headers: flatten_headers(req.headers()),
    };

    {
        let mut log = log.lock();
        log.requests += 1;
        if single_request && log.requests > 1 {
            let count = log.requests;
            log.failures
                .push(ValidationFailure::RepeatedRequest { count });
        }
    }

    let outcome = responder.respond(&request);

    let mut response = Response::new(Full::new(Bytes::from(outcome.response.body)));
    *response.status_mut() =
        StatusCode::from_u16(outcome.response.status).unwrap_or(StatusCode::OK);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );

    let mut log = log.lock();
    log.responses += 1;
    log.failures.extend(outcome.validation.into_failures());

    response
}

/// Flatten headers to single values, joining repeated names with `", "`
fn flatten_headers(headers: &hyper::HeaderMap) -> HashMap<String, String> {
    let mut flat: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        flat.entry(name.as_str().to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::handler::{MockApi, MockHandler, MockRouter};
    use crate::matcher::EndpointFamily;

    const ACCEPT: &str = "application/vnd.github.v3+json";

    fn api() -> Arc<MockApi> {
        Arc::new(MockApi::new(MockConfig::default()).unwrap())
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn test_single_request_round_trip() {
        let listener = MockListener::start(MockHandler::new(api(), EndpointFamily::Repository))
            .await
            .unwrap();

        let resp = client()
            .get(format!("{}/repos/octocat/Hello-World", listener.base_url()))
            .header("Accept", ACCEPT)
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()["content-type"],
            "application/json; charset=utf-8"
        );
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["owner"]["login"], "octocat");

        let log = listener.shutdown().await;
        assert_eq!(log.requests, 1);
        assert_eq!(log.responses, 1);
        assert!(log.failures.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_recorded() {
        let listener = MockListener::start(MockHandler::new(api(), EndpointFamily::RepositoryList))
            .await
            .unwrap();

        let resp = client()
            .get(format!("{}/users/octocat/repos", listener.base_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let log = listener.shutdown().await;
        assert!(matches!(
            log.failures.as_slice(),
            [ValidationFailure::NotAcceptable { .. }]
        ));
    }

    #[tokio::test]
    async fn test_repeated_request_is_recorded() {
        let listener = MockListener::start(MockHandler::new(api(), EndpointFamily::ReleaseList))
            .await
            .unwrap();
        let client = client();
        let url = format!("{}/repos/o/r/releases", listener.base_url());

        for _ in 0..2 {
            let resp = client.get(&url).header("Accept", ACCEPT).send().await.unwrap();
            assert_eq!(resp.status(), 200);
        }

        let log = listener.shutdown().await;
        assert_eq!(log.requests, 2);
        assert_eq!(
            log.failures,
            vec![ValidationFailure::RepeatedRequest { count: 2 }]
        );
    }

    #[tokio::test]
    async fn test_router_serves_many_requests() {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let listener = MockListener::serve(addr, MockRouter::new(api())).await.unwrap();
        let client = client();

        for path in ["/repos/a/b", "/users/a/repos", "/repos/a/b/releases"] {
            let resp = client
                .get(format!("{}{}", listener.base_url(), path))
                .header("Accept", ACCEPT)
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200, "{}", path);
        }

        let resp = client
            .get(format!("{}/gists", listener.base_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let log = listener.shutdown().await;
        assert_eq!(log.requests, 4);
        assert!(!log
            .failures
            .iter()
            .any(|f| matches!(f, ValidationFailure::RepeatedRequest { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_closes_port() {
        let listener = MockListener::start(MockHandler::new(api(), EndpointFamily::Repository))
            .await
            .unwrap();
        let url = format!("{}/repos/a/b", listener.base_url());

        listener.shutdown().await;

        let result = client().get(&url).send().await;
        assert!(result.is_err());
    }

    #[test]
    fn test_flatten_headers_joins_repeated() {
        let mut headers = hyper::HeaderMap::new();
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/vnd.a+json"));
        headers.insert("user-agent", HeaderValue::from_static("test"));

        let flat = flatten_headers(&headers);
        assert_eq!(
            flat.get("accept").map(String::as_str),
            Some("text/html, application/vnd.a+json")
        );
        assert_eq!(flat.get("user-agent").map(String::as_str), Some("test"));
    }

    #[tokio::test]
    async fn test_repeated_accept_header_is_negotiated() {
        let listener = MockListener::start(MockHandler::new(api(), EndpointFamily::Repository))
            .await
            .unwrap();

        let resp = client()
            .get(format!("{}/repos/octocat/Hello-World", listener.base_url()))
            .header("Accept", "text/html")
            .header("Accept", ACCEPT)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let log = listener.shutdown().await;
        assert!(log.failures.is_empty(), "{:?}", log.failures);
    }
}
