//! 指标服务测试

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use flare_bootstrap::metrics::{AppMetrics, GrpcMetrics, MetricsServer};
use flare_bootstrap::{Context, Process};
use prometheus::{Encoder, Registry, TextEncoder};
use tower::ServiceExt;

async fn scrape(server: &MetricsServer, path: &str) -> (StatusCode, String) {
    let response = server
        .router()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn exposition(registry: &Registry) -> String {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .unwrap();
    String::from_utf8(buffer).unwrap()
}

#[test]
fn app_version_is_exposed_with_value_one() {
    let registry = Registry::new();
    let metrics = AppMetrics::new("1.2.3").unwrap();
    metrics.register(&registry).unwrap();

    assert!(exposition(&registry).contains(r#"app_version{version="1.2.3"} 1"#));
}

#[test]
fn duplicate_registration_fails() {
    let registry = Registry::new();
    let metrics = AppMetrics::new("1.0.0").unwrap();
    metrics.register(&registry).unwrap();
    assert!(metrics.register(&registry).is_err());

    metrics.unregister(&registry).unwrap();
    assert!(registry.gather().is_empty());
    assert!(metrics.unregister(&registry).is_err());
}

#[test]
fn grpc_metrics_count_by_method_and_status() {
    let registry = Registry::new();
    let metrics = GrpcMetrics::new("orders").unwrap();
    metrics.register(&registry).unwrap();

    metrics.observe("/orders.v1.Orders/Get", "OK", Duration::from_millis(5));
    metrics.observe("/orders.v1.Orders/Get", "OK", Duration::from_millis(7));
    metrics.observe("/orders.v1.Orders/Get", "NOT_FOUND", Duration::from_millis(1));

    assert_eq!(metrics.request_count("/orders.v1.Orders/Get", "OK"), 2);
    assert_eq!(metrics.request_count("/orders.v1.Orders/Get", "NOT_FOUND"), 1);

    let text = exposition(&registry);
    assert!(text.contains(
        r#"orders_grpc_requests_total{method="/orders.v1.Orders/Get",status="OK"} 2"#
    ));
    assert!(text.contains("orders_grpc_request_duration_seconds_count"));
}

#[tokio::test]
async fn router_serves_text_exposition_on_every_path() {
    let registry = Registry::new();
    AppMetrics::new("2.0.0").unwrap().register(&registry).unwrap();
    let server = MetricsServer::new("127.0.0.1:0", Duration::from_secs(5), registry, "2.0.0")
        .unwrap()
        .with_path("/internal/metrics");

    for path in ["/metrics", "/internal/metrics"] {
        let (status, body) = scrape(&server, path).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"app_version{version="2.0.0"} 1"#));
    }

    let (status, _) = scrape(&server, "/other").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn extra_path_without_leading_slash_is_normalized() {
    let registry = Registry::new();
    AppMetrics::new("1.0.0").unwrap().register(&registry).unwrap();
    let server = MetricsServer::new("127.0.0.1:0", Duration::from_secs(5), registry, "1.0.0")
        .unwrap()
        .with_path("custom")
        .with_path("/custom")
        .with_path("  ");

    let (status, body) = scrape(&server, "/custom").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("app_version"));

    let (status, _) = scrape(&server, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn metrics_process_lifecycle_registers_and_unregisters() {
    let registry = Registry::new();
    let server = Arc::new(
        MetricsServer::new("127.0.0.1:0", Duration::from_secs(5), registry.clone(), "3.1.0")
            .unwrap(),
    );
    let ctx = Context::background();

    server.pre_run(&ctx).await.unwrap();
    assert!(!registry.gather().is_empty());
    let addr = server.local_addr().unwrap();

    let runner = Arc::clone(&server);
    let run_ctx = ctx.clone();
    let handle = tokio::spawn(async move { runner.run(run_ctx).await });

    let body = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains(r#"app_version{version="3.1.0"} 1"#));

    server
        .shutdown(&Context::with_timeout(Duration::from_secs(5)))
        .await
        .unwrap();
    handle.await.unwrap().unwrap();
    assert!(registry.gather().is_empty());
}

#[tokio::test]
async fn shutdown_without_run_succeeds() {
    let server = MetricsServer::new(
        "127.0.0.1:0",
        Duration::from_secs(1),
        Registry::new(),
        "0.1.0",
    )
    .unwrap();
    server.pre_run(&Context::background()).await.unwrap();
    server
        .shutdown(&Context::with_timeout(Duration::from_secs(1)))
        .await
        .unwrap();
}

#[tokio::test]
async fn bind_conflict_fails_pre_run() {
    let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let taken = holder.local_addr().unwrap().to_string();

    let server =
        MetricsServer::new(taken, Duration::from_secs(1), Registry::new(), "0.1.0").unwrap();
    let err = server.pre_run(&Context::background()).await.unwrap_err();
    assert!(err.to_string().contains("failed to listen"));
}
