//! gRPC 服务端
//!
//! `pre_run` 绑定端口并组装路由（业务服务、健康检查、反射），
//! `run` 挂上追踪、指标与拦截器后开始服务，
//! `shutdown` 先优雅停止，超过关闭时限后强制停止。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::interceptor::InterceptorLayer;
use tonic::service::{Routes, RoutesBuilder};
use tonic::transport::Server;
use tonic_health::ServingStatus;
use tonic_health::server::HealthReporter;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::context::Context;
use crate::error::{ProcessResult, ServerError};
use crate::interceptor::{GrpcMakeSpan, GrpcMetricsLayer, Interceptor, InterceptorChain};
use crate::metrics::GrpcMetrics;
use crate::runtime::Process;
use crate::server::endpoint::{Endpoint, graceful_signal, shutdown_budget};
use crate::service::ServiceRegistrar;

/// gRPC 传输选项
#[derive(Debug, Clone)]
pub struct GrpcOptions {
    pub max_concurrent_streams: Option<u32>,
    pub concurrency_limit_per_connection: Option<usize>,
}

impl Default for GrpcOptions {
    fn default() -> Self {
        Self {
            max_concurrent_streams: Some(1000),
            concurrency_limit_per_connection: None,
        }
    }
}

/// gRPC 服务进程
pub struct GrpcServer {
    endpoint: Endpoint,
    close_timeout: Duration,
    registrars: Vec<Arc<dyn ServiceRegistrar>>,
    interceptors: Vec<Interceptor>,
    metrics: Option<Arc<GrpcMetrics>>,
    options: GrpcOptions,
    reflection_enabled: bool,
    health_check_enabled: bool,
    routes: Mutex<Option<Routes>>,
    health: Mutex<Option<HealthReporter>>,
}

impl GrpcServer {
    pub fn new(address: impl Into<String>, close_timeout: Duration) -> Self {
        Self {
            endpoint: Endpoint::new("grpc", address),
            close_timeout,
            registrars: Vec::new(),
            interceptors: Vec::new(),
            metrics: None,
            options: GrpcOptions::default(),
            reflection_enabled: false,
            health_check_enabled: false,
            routes: Mutex::new(None),
            health: Mutex::new(None),
        }
    }

    pub fn with_registrars(mut self, registrars: Vec<Arc<dyn ServiceRegistrar>>) -> Self {
        self.registrars.extend(registrars);
        self
    }

    /// 追加拦截器，按追加顺序执行
    pub fn with_interceptors(mut self, interceptors: Vec<Interceptor>) -> Self {
        self.interceptors.extend(interceptors);
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<GrpcMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_options(mut self, options: GrpcOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_reflection(mut self, enabled: bool) -> Self {
        self.reflection_enabled = enabled;
        self
    }

    pub fn with_health_check(mut self, enabled: bool) -> Self {
        self.health_check_enabled = enabled;
        self
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.endpoint.local_addr()
    }

    async fn build_routes(&self) -> ProcessResult<Routes> {
        let mut builder = RoutesBuilder::default();
        for registrar in &self.registrars {
            registrar.register_grpc(&mut builder);
        }

        if self.health_check_enabled {
            let (reporter, health_service) = tonic_health::server::health_reporter();
            builder.add_service(health_service);
            *self.health.lock().await = Some(reporter);
            info!("gRPC health check service registered");
        }

        if self.reflection_enabled {
            let mut reflection = tonic_reflection::server::Builder::configure();
            for registrar in &self.registrars {
                if let Some(descriptor_set) = registrar.file_descriptor_set() {
                    reflection = reflection.register_encoded_file_descriptor_set(descriptor_set);
                }
            }
            let reflection = reflection
                .build_v1()
                .map_err(|e| format!("failed to build reflection service: {e}"))?;
            builder.add_service(reflection);
            info!("gRPC reflection service registered");
        }

        Ok(builder.routes())
    }
}

#[async_trait]
impl Process for GrpcServer {
    fn name(&self) -> &str {
        "grpc"
    }

    async fn pre_run(&self, _ctx: &Context) -> ProcessResult {
        let routes = self.build_routes().await?;
        self.endpoint.bind().await?;
        *self.routes.lock().await = Some(routes);
        Ok(())
    }

    async fn run(&self, ctx: Context) -> ProcessResult {
        let listener = self.endpoint.take_listener().await?;
        let routes = self
            .routes
            .lock()
            .await
            .take()
            .ok_or(ServerError::NotPrepared { component: "grpc" })?;

        info!(address = %self.endpoint.address(), "🚀 Starting gRPC server");

        let mut builder =
            Server::builder().max_concurrent_streams(self.options.max_concurrent_streams);
        if let Some(limit) = self.options.concurrency_limit_per_connection {
            builder = builder.concurrency_limit_per_connection(limit);
        }

        let serve = builder
            .layer(TraceLayer::new_for_grpc().make_span_with(GrpcMakeSpan))
            .layer(GrpcMetricsLayer::new(self.metrics.clone()))
            .layer(InterceptorLayer::new(InterceptorChain::new(
                self.interceptors.clone(),
            )))
            .add_routes(routes)
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                graceful_signal(self.endpoint.graceful_token(), ctx),
            );
        let force = self.endpoint.force_token();

        let result = tokio::select! {
            res = serve => res.map_err(ServerError::from),
            _ = force.cancelled() => {
                warn!("gRPC server forced to stop");
                Ok(())
            }
        };

        self.endpoint.mark_stopped();
        result?;
        Ok(())
    }

    async fn shutdown(&self, ctx: &Context) -> ProcessResult {
        info!("Shutting down gRPC server");

        if let Some(reporter) = self.health.lock().await.as_mut() {
            reporter
                .set_service_status("", ServingStatus::NotServing)
                .await;
        }

        let budget = shutdown_budget(ctx, Some(self.close_timeout));
        if self.endpoint.stop(budget).await {
            info!("gRPC server stopped gracefully");
        } else {
            warn!(timeout = ?budget, "gRPC graceful stop timed out, forced stop");
        }
        Ok(())
    }
}
