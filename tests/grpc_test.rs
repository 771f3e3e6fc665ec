//! gRPC 服务端测试

use std::sync::Arc;
use std::time::Duration;

use flare_bootstrap::grpc::GrpcServer;
use flare_bootstrap::interceptor::{InterceptorChain, interceptor};
use flare_bootstrap::metrics::GrpcMetrics;
use flare_bootstrap::{Context, Process};
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Status};
use tonic_health::pb::HealthCheckRequest;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;

const HEALTH_CHECK: &str = "/grpc.health.v1.Health/Check";

async fn start(server: GrpcServer) -> (Arc<GrpcServer>, tokio::task::JoinHandle<()>, String) {
    let server = Arc::new(server);
    server.pre_run(&Context::background()).await.unwrap();
    let url = format!("http://{}", server.local_addr().unwrap());

    let runner = Arc::clone(&server);
    let handle = tokio::spawn(async move {
        runner.run(Context::background()).await.unwrap();
    });
    (server, handle, url)
}

async fn health_client(url: String) -> HealthClient<Channel> {
    let channel = Endpoint::from_shared(url).unwrap().connect().await.unwrap();
    HealthClient::new(channel)
}

async fn stop(server: Arc<GrpcServer>, handle: tokio::task::JoinHandle<()>) {
    server
        .shutdown(&Context::with_timeout(Duration::from_secs(5)))
        .await
        .unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn health_check_reports_serving() {
    let (server, handle, url) = start(
        GrpcServer::new("127.0.0.1:0", Duration::from_secs(5))
            .with_health_check(true)
            .with_reflection(true),
    )
    .await;

    let mut client = health_client(url).await;
    let response = client
        .check(HealthCheckRequest {
            service: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(response.into_inner().status(), ServingStatus::Serving);
    drop(client);

    stop(server, handle).await;
}

#[tokio::test]
async fn shutdown_reports_not_serving_before_stopping() {
    let server = Arc::new(
        GrpcServer::new("127.0.0.1:0", Duration::from_millis(500)).with_health_check(true),
    );
    server.pre_run(&Context::background()).await.unwrap();
    let url = format!("http://{}", server.local_addr().unwrap());
    let runner = Arc::clone(&server);
    let handle = tokio::spawn(async move { runner.run(Context::background()).await });

    let mut client = health_client(url).await;
    let mut updates = client
        .watch(HealthCheckRequest::default())
        .await
        .unwrap()
        .into_inner();
    let first = updates.message().await.unwrap().unwrap();
    assert_eq!(first.status(), ServingStatus::Serving);

    let stopper = Arc::clone(&server);
    let shutdown = tokio::spawn(async move {
        stopper
            .shutdown(&Context::with_timeout(Duration::from_secs(5)))
            .await
    });

    let next = updates.message().await.unwrap().unwrap();
    assert_eq!(next.status(), ServingStatus::NotServing);

    // 未结束的 watch 流使优雅停止超时，强制停止不视为错误
    shutdown.await.unwrap().unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn interceptor_rejection_is_returned_to_client() {
    let require_token = interceptor(|req: Request<()>| {
        if req.metadata().contains_key("authorization") {
            Ok(req)
        } else {
            Err(Status::permission_denied("missing token"))
        }
    });
    let metrics = Arc::new(GrpcMetrics::new("test").unwrap());

    let (server, handle, url) = start(
        GrpcServer::new("127.0.0.1:0", Duration::from_secs(5))
            .with_health_check(true)
            .with_interceptors(vec![require_token])
            .with_metrics(Some(Arc::clone(&metrics))),
    )
    .await;

    let mut client = health_client(url).await;

    let status = client
        .check(HealthCheckRequest::default())
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);
    assert_eq!(metrics.request_count(HEALTH_CHECK, "PERMISSION_DENIED"), 1);

    let mut request = Request::new(HealthCheckRequest::default());
    request
        .metadata_mut()
        .insert("authorization", "Bearer t".parse().unwrap());
    client.check(request).await.unwrap();
    assert_eq!(metrics.request_count(HEALTH_CHECK, "OK"), 1);
    drop(client);

    stop(server, handle).await;
}

#[tokio::test]
async fn server_without_health_check_returns_unimplemented() {
    let (server, handle, url) =
        start(GrpcServer::new("127.0.0.1:0", Duration::from_secs(5))).await;

    let mut client = health_client(url).await;
    let status = client
        .check(HealthCheckRequest::default())
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented);
    drop(client);

    stop(server, handle).await;
}

#[tokio::test]
async fn run_without_pre_run_fails() {
    let server = GrpcServer::new("127.0.0.1:0", Duration::from_secs(1));
    let err = server.run(Context::background()).await.unwrap_err();
    assert!(err.to_string().contains("not prepared"));
}

#[tokio::test]
async fn run_stops_when_context_is_cancelled() {
    let server = GrpcServer::new("127.0.0.1:0", Duration::from_secs(1));
    server.pre_run(&Context::background()).await.unwrap();

    let ctx = Context::background();
    let cancel = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    tokio::time::timeout(Duration::from_secs(5), server.run(ctx))
        .await
        .unwrap()
        .unwrap();
}

#[test]
fn interceptor_chain_stops_at_first_rejection() {
    let chain = InterceptorChain::new(vec![
        interceptor(|mut req: Request<()>| {
            req.metadata_mut().insert("x-step", "one".parse().unwrap());
            Ok(req)
        }),
        interceptor(|_req: Request<()>| Err(Status::unauthenticated("denied"))),
        interceptor(|_req: Request<()>| panic!("must not run")),
    ]);
    assert_eq!(chain.len(), 3);

    let status = chain.intercept(Request::new(())).unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
}

#[test]
fn empty_interceptor_chain_passes_request_through() {
    let chain = InterceptorChain::default();
    assert!(chain.is_empty());
    assert!(chain.intercept(Request::new(())).is_ok());
}

#[test]
fn make_span_tolerates_missing_otel_layer() {
    use flare_bootstrap::interceptor::GrpcMakeSpan;
    use tower_http::trace::MakeSpan;

    let request = http::Request::builder()
        .uri("/orders.v1.Orders/Get")
        .header(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )
        .body(())
        .unwrap();

    tracing::subscriber::with_default(tracing_subscriber::registry(), || {
        let span = GrpcMakeSpan.make_span(&request);
        assert_eq!(span.metadata().map(|m| m.name()), Some("grpc.request"));
    });
}
