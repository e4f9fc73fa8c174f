// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface: one path per registry, each serving the registry's current snapshot.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper::{header, http, Method, Request, Response, StatusCode};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::registry::Registry;

pub type Body = Full<Bytes>;
pub type HttpResponse = Response<Body>;

/// Metrics paths and the registry each one serves.
#[derive(Default, Clone)]
pub struct Routes {
    registries: BTreeMap<String, Arc<Registry>>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, path: impl Into<String>, registry: Arc<Registry>) -> Self {
        self.registries.insert(path.into(), registry);
        self
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.registries.keys().map(String::as_str)
    }

    fn landing_page(&self) -> String {
        let links: String = self
            .paths()
            .map(|path| format!("<p><a href=\"{path}\">{path}</a></p>"))
            .collect();
        format!(
            "<html><head><title>RDS exporter</title></head><body><h1>RDS exporter</h1>{links}</body></html>"
        )
    }
}

/// Logs the message and returns it as the JSON body `{"message": ...}` of a response with the
/// given status.
fn log_and_create_http_response(
    message: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    let body = json!({ "message": message }).to_string();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
}

async fn handle<B>(req: Request<B>, routes: Arc<Routes>) -> http::Result<HttpResponse> {
    let (parts, _body) = req.into_parts();
    if parts.method != Method::GET && parts.method != Method::HEAD {
        return log_and_create_http_response(
            &format!("Method {} not allowed on {}", parts.method, parts.uri.path()),
            StatusCode::METHOD_NOT_ALLOWED,
        );
    }

    let path = parts.uri.path();
    if path == "/" {
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(Body::from(routes.landing_page()));
    }

    let Some(registry) = routes.registries.get(path) else {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("Not Found"));
    };
    // HEAD answers from the route table alone; collecting a snapshot costs upstream API calls.
    if parts.method == Method::HEAD {
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)
            .body(Body::default());
    }
    match registry.encode_text().await {
        Ok(buffer) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)
            .body(Body::from(buffer)),
        Err(e) => log_and_create_http_response(
            &format!("Failed to encode metrics for {path}: {e}"),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    }
}

/// Accepts connections until `cancel` fires. In-flight connections are dropped on shutdown.
pub async fn serve(
    listener: TcpListener,
    routes: Arc<Routes>,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let service = service_fn(move |req| handle(req, Arc::clone(&routes)));
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = tokio::task::JoinSet::new();

    loop {
        let conn = tokio::select! {
            con_res = listener.accept() => match con_res {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("Server error: {e}");
                    return Err(e.into());
                }
                Ok((conn, _)) => conn,
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => match finished {
                Err(e) if e.is_panic() => {
                    error!("Connection handler panicked: {:?}", e);
                    continue;
                },
                Ok(()) | Err(_) => continue,
            },
            _ = cancel.cancelled() => {
                debug!("Shutting down metrics server");
                return Ok(());
            },
        };
        let conn = hyper_util::rt::TokioIo::new(conn);
        let server = server.clone();
        let service = service.clone();
        joinset.spawn(async move {
            if let Err(e) = server.serve_connection(conn, service).await {
                error!("Connection error: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::collector::Collector;
    use crate::sample::{MetricDescriptor, MetricKind, Sample};
    use crate::stats::{Api, ExporterStats};

    const UP: MetricDescriptor = MetricDescriptor {
        name: "rds_test_up",
        help: "Always one.",
        kind: MetricKind::Gauge,
        labels: &[],
    };

    #[derive(Default)]
    struct Counting {
        collects: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Collector for Counting {
        fn describe(&self) -> Vec<MetricDescriptor> {
            vec![UP]
        }

        async fn collect(&self) -> Vec<Sample> {
            self.collects.fetch_add(1, Ordering::SeqCst);
            vec![Sample::new(UP.name, vec![], 1.0)]
        }
    }

    async fn start() -> (String, CancellationToken, tokio::task::JoinHandle<()>) {
        let stats = ExporterStats::new().unwrap();
        stats.record_request(Api::GetMetricData);
        let registry = Registry::new();
        registry.register_native(Box::new(stats)).unwrap();
        start_with(registry).await
    }

    async fn start_with(
        registry: Registry,
    ) -> (String, CancellationToken, tokio::task::JoinHandle<()>) {
        let routes = Arc::new(Routes::new().route("/basic", Arc::new(registry)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            serve(listener, routes, token).await.unwrap();
        });
        (address, cancel, handle)
    }

    #[tokio::test]
    async fn test_metrics_path() {
        let (address, cancel, handle) = start().await;
        let response = reqwest::get(format!("{address}/basic")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            prometheus::TEXT_FORMAT
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("rds_exporter_api_requests_total{api=\"GetMetricData\"} 1"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_landing_page_and_errors() {
        let (address, cancel, _handle) = start().await;

        let landing = reqwest::get(format!("{address}/")).await.unwrap();
        assert_eq!(landing.status(), 200);
        assert!(landing.text().await.unwrap().contains("href=\"/basic\""));

        let missing = reqwest::get(format!("{address}/enhanced")).await.unwrap();
        assert_eq!(missing.status(), 404);

        let post = reqwest::Client::new()
            .post(format!("{address}/basic"))
            .send()
            .await
            .unwrap();
        assert_eq!(post.status(), 405);
        assert!(post.text().await.unwrap().contains("not allowed"));

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_head_skips_collection() {
        let counting = Arc::new(Counting::default());
        let mut registry = Registry::new();
        registry.register(counting.clone()).unwrap();
        let (address, cancel, handle) = start_with(registry).await;
        let client = reqwest::Client::new();

        let head = client.head(format!("{address}/basic")).send().await.unwrap();
        assert_eq!(head.status(), 200);
        assert_eq!(
            head.headers()[reqwest::header::CONTENT_TYPE],
            prometheus::TEXT_FORMAT
        );
        assert_eq!(counting.collects.load(Ordering::SeqCst), 0);

        let missing = client.head(format!("{address}/enhanced")).send().await.unwrap();
        assert_eq!(missing.status(), 404);

        let get = client.get(format!("{address}/basic")).send().await.unwrap();
        assert!(get.text().await.unwrap().contains("rds_test_up 1"));
        assert_eq!(counting.collects.load(Ordering::SeqCst), 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
