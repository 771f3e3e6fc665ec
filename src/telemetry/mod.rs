//! 遥测服务
//!
//! 被动进程：`pre_run` 中依次初始化追踪、指标、日志与性能分析，
//! `run` 仅等待上下文结束，`shutdown` 刷新并关闭全部提供者。

mod logging;
mod meter;
pub mod otel;
mod profiling;
mod trace;

pub use otel::{ServiceInfo, otlp_url, parse_headers};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use prometheus::Registry;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{Config, MetricsBackend, TelemetryConfig};
use crate::context::Context;
use crate::error::{ProcessResult, Result, ServerError};
use crate::metrics::GrpcMetrics;
use crate::runtime::Process;
use profiling::Profiler;

const DEFAULT_SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);
const TRACER_NAME: &str = "flare-bootstrap";

/// 遥测服务进程
pub struct TelemetryService {
    config: TelemetryConfig,
    service: ServiceInfo,
    log_level: String,
    pprof_address: String,
    registry: Registry,
    grpc_metrics: Option<Arc<GrpcMetrics>>,
    metrics_registered: AtomicBool,
    tracer_provider: Mutex<Option<SdkTracerProvider>>,
    meter_provider: Mutex<Option<SdkMeterProvider>>,
    profiler: Mutex<Option<Box<dyn Profiler>>>,
}

impl TelemetryService {
    /// 创建遥测服务，Prometheus 指标注册到 `registry`
    pub fn new(config: &Config, registry: Registry) -> Result<Self> {
        let telemetry = config.telemetry.clone();
        let grpc_metrics = if telemetry.metrics.enabled
            && telemetry.metrics.backend == MetricsBackend::Prometheus
        {
            Some(Arc::new(GrpcMetrics::new(&telemetry.metrics.namespace)?))
        } else {
            None
        };

        Ok(Self {
            config: telemetry,
            service: ServiceInfo {
                name: config.app_name.clone(),
                version: config.app_version.clone(),
                environment: config.environment.clone(),
            },
            log_level: config.log_level.clone(),
            pprof_address: config.pprof_address.clone(),
            registry,
            grpc_metrics,
            metrics_registered: AtomicBool::new(false),
            tracer_provider: Mutex::new(None),
            meter_provider: Mutex::new(None),
            profiler: Mutex::new(None),
        })
    }

    /// gRPC 请求指标（仅 Prometheus 指标后端）
    pub fn grpc_metrics(&self) -> Option<Arc<GrpcMetrics>> {
        self.grpc_metrics.clone()
    }

    /// 启用的遥测功能，用于启动画面
    pub fn features(&self) -> Vec<String> {
        let mut features = Vec::new();
        if self.config.tracing.enabled {
            features.push(format!("Tracing ({})", self.config.tracing.backend));
        }
        if self.config.metrics.enabled {
            features.push(format!("Metrics ({})", self.config.metrics.backend));
        }
        if self.config.profiling.enabled {
            features.push(format!("Profiling ({})", self.config.profiling.backend));
        }
        features
    }

    async fn setup_tracing(&self) -> anyhow::Result<()> {
        if !self.config.tracing.enabled {
            info!("Tracing is disabled");
            return Ok(());
        }

        let config = self.config.tracing.clone();
        let resource = otel::resource(&self.service);
        // 导出器内部使用阻塞 HTTP 客户端，不能在异步上下文中构建
        let provider =
            tokio::task::spawn_blocking(move || trace::init_tracer_provider(&config, resource))
                .await
                .context("tracing setup task failed")??;
        *self.tracer_provider.lock().await = Some(provider);
        Ok(())
    }

    async fn setup_metrics(&self) -> anyhow::Result<()> {
        if !self.config.metrics.enabled {
            info!("Metrics export is disabled");
            return Ok(());
        }

        match self.config.metrics.backend {
            MetricsBackend::Prometheus => {
                if let Some(metrics) = &self.grpc_metrics {
                    metrics
                        .register(&self.registry)
                        .context("failed to register gRPC metrics")?;
                    self.metrics_registered.store(true, Ordering::SeqCst);
                }
                info!(path = %self.config.metrics.path, "Prometheus metrics initialized");
            }
            MetricsBackend::Otlp => {
                let config = self.config.metrics.clone();
                let resource = otel::resource(&self.service);
                let provider = tokio::task::spawn_blocking(move || {
                    meter::init_meter_provider(&config, resource)
                })
                .await
                .context("metrics setup task failed")??;
                *self.meter_provider.lock().await = Some(provider);
            }
        }
        Ok(())
    }

    async fn setup_logging(&self) -> anyhow::Result<()> {
        let tracer = self
            .tracer_provider
            .lock()
            .await
            .as_ref()
            .map(|provider| provider.tracer(TRACER_NAME));
        let logging = self.config.logging.enabled.then_some(&self.config.logging);

        if logging.is_none() && tracer.is_none() {
            info!("Structured logging is disabled");
            return Ok(());
        }

        logging::init_subscriber(&self.log_level, logging, tracer, &self.service)?;
        Ok(())
    }

    async fn setup_profiling(&self) -> anyhow::Result<()> {
        if !self.config.profiling.enabled {
            info!("Continuous profiling is disabled");
            return Ok(());
        }

        let profiler =
            profiling::start_profiler(&self.config.profiling, &self.service, &self.pprof_address)?;
        *self.profiler.lock().await = profiler;
        Ok(())
    }
}

#[async_trait]
impl Process for TelemetryService {
    fn name(&self) -> &str {
        "telemetry"
    }

    async fn pre_run(&self, _ctx: &Context) -> ProcessResult {
        info!("📡 Initializing telemetry services");

        self.setup_tracing()
            .await
            .map_err(|e| ServerError::telemetry(format!("failed to set up tracing: {e:#}")))?;
        self.setup_metrics()
            .await
            .map_err(|e| ServerError::telemetry(format!("failed to set up metrics: {e:#}")))?;
        self.setup_logging()
            .await
            .map_err(|e| ServerError::telemetry(format!("failed to set up logging: {e:#}")))?;
        self.setup_profiling()
            .await
            .map_err(|e| ServerError::telemetry(format!("failed to set up profiling: {e:#}")))?;
        Ok(())
    }

    async fn run(&self, ctx: Context) -> ProcessResult {
        ctx.done().await;
        Ok(())
    }

    async fn shutdown(&self, ctx: &Context) -> ProcessResult {
        info!("Shutting down telemetry services");
        let budget = ctx.remaining().unwrap_or(DEFAULT_SHUTDOWN_BUDGET);
        let mut errors = Vec::new();

        if let Some(provider) = self.tracer_provider.lock().await.take() {
            if let Err(e) = shutdown_blocking(budget, move || provider.shutdown()).await {
                errors.push(format!("trace provider shutdown: {e}"));
            }
        }

        if let Some(provider) = self.meter_provider.lock().await.take() {
            if let Err(e) = shutdown_blocking(budget, move || provider.shutdown()).await {
                errors.push(format!("meter provider shutdown: {e}"));
            }
        }

        if let Some(profiler) = self.profiler.lock().await.take() {
            if let Err(e) = shutdown_blocking(budget, move || profiler.stop()).await {
                errors.push(format!("profiler shutdown: {e}"));
            }
        }

        if self.metrics_registered.swap(false, Ordering::SeqCst) {
            if let Some(metrics) = &self.grpc_metrics {
                if let Err(e) = metrics.unregister(&self.registry) {
                    errors.push(format!("metrics unregister: {e}"));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            warn!(errors = ?errors, "Telemetry shutdown finished with errors");
            Err(ServerError::TelemetryShutdown(errors).into())
        }
    }
}

/// 在阻塞线程中执行关闭操作，并受预算约束
async fn shutdown_blocking<F, E>(budget: Duration, f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> std::result::Result<(), E> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    match tokio::time::timeout(budget, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(anyhow!("{e}")),
        Ok(Err(e)) => Err(anyhow!("task failed: {e}")),
        Err(_) => Err(anyhow!("deadline exceeded")),
    }
}
