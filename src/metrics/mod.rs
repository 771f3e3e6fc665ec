//! 指标模块
//!
//! - [`MetricsServer`]：在独立端口上暴露 Prometheus 文本格式指标
//! - [`GrpcMetrics`]：gRPC 请求计数与耗时
//!
//! 所有指标注册到显式持有的 [`Registry`]，不使用全局默认注册表。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::{info, warn};

use crate::context::Context;
use crate::error::{ProcessResult, ServerError};
use crate::runtime::Process;
use crate::server::endpoint::{Endpoint, shutdown_budget};

/// 应用版本指标：`app_version{version="..."} 1`
#[derive(Clone)]
pub struct AppMetrics {
    version_gauge: GaugeVec,
    version: String,
}

impl AppMetrics {
    pub fn new(version: impl Into<String>) -> prometheus::Result<Self> {
        let version_gauge = GaugeVec::new(
            Opts::new("version", "Application version").namespace("app"),
            &["version"],
        )?;
        Ok(Self {
            version_gauge,
            version: version.into(),
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.version_gauge.clone()))?;
        self.version_gauge
            .with_label_values(&[self.version.as_str()])
            .set(1.0);
        Ok(())
    }

    pub fn unregister(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.unregister(Box::new(self.version_gauge.clone()))
    }
}

/// gRPC 请求指标
#[derive(Debug, Clone)]
pub struct GrpcMetrics {
    requests: IntCounterVec,
    duration: HistogramVec,
}

impl GrpcMetrics {
    pub fn new(namespace: &str) -> prometheus::Result<Self> {
        let requests = IntCounterVec::new(
            Opts::new("grpc_requests_total", "Total number of gRPC requests").namespace(namespace),
            &["method", "status"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "grpc_request_duration_seconds",
                "gRPC request duration in seconds",
            )
            .namespace(namespace),
            &["method"],
        )?;
        Ok(Self { requests, duration })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.requests.clone()))?;
        registry.register(Box::new(self.duration.clone()))
    }

    pub fn unregister(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.unregister(Box::new(self.requests.clone()))?;
        registry.unregister(Box::new(self.duration.clone()))
    }

    pub fn observe(&self, method: &str, status: &str, elapsed: Duration) {
        self.requests.with_label_values(&[method, status]).inc();
        self.duration
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    }

    pub fn request_count(&self, method: &str, status: &str) -> u64 {
        self.requests.with_label_values(&[method, status]).get()
    }
}

/// 指标服务进程
///
/// `pre_run` 绑定端口并注册版本指标，`shutdown` 停止服务后注销。
pub struct MetricsServer {
    endpoint: Endpoint,
    close_timeout: Duration,
    registry: Registry,
    app: AppMetrics,
    paths: Vec<String>,
}

impl MetricsServer {
    pub fn new(
        address: impl Into<String>,
        close_timeout: Duration,
        registry: Registry,
        app_version: impl Into<String>,
    ) -> prometheus::Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new("metrics", address),
            close_timeout,
            registry,
            app: AppMetrics::new(app_version)?,
            paths: vec!["/metrics".to_string()],
        })
    }

    /// 额外的指标路径（与 `/metrics` 相同时忽略）
    /// 额外的暴露路径，缺少前导 `/` 时自动补齐
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = path.trim();
        if path.is_empty() {
            return self;
        }
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn router(&self) -> Router {
        let registry = Arc::new(self.registry.clone());
        self.paths
            .iter()
            .fold(Router::new(), |router, path| {
                router.route(path, get(metrics_handler))
            })
            .with_state(registry)
    }
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&registry.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[async_trait]
impl Process for MetricsServer {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn pre_run(&self, _ctx: &Context) -> ProcessResult {
        self.endpoint.bind().await?;
        self.app.register(&self.registry).map_err(ServerError::from)?;
        Ok(())
    }

    async fn run(&self, ctx: Context) -> ProcessResult {
        info!(address = %self.endpoint.address(), "📈 Starting metrics server");
        self.endpoint.serve_http(self.router(), ctx).await?;
        Ok(())
    }

    async fn shutdown(&self, ctx: &Context) -> ProcessResult {
        info!("Shutting down metrics server");
        let graceful = self
            .endpoint
            .stop(shutdown_budget(ctx, Some(self.close_timeout)))
            .await;

        if let Err(e) = self.app.unregister(&self.registry) {
            warn!(error = %e, "Failed to unregister app version metric");
        }

        if graceful {
            Ok(())
        } else {
            Err(ServerError::ShutdownTimeout {
                component: "metrics",
            }
            .into())
        }
    }
}
