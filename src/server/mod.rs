//! 服务器组装
//!
//! 由配置构造内置进程，按固定顺序排在自定义进程之前：
//! gRPC → 网关 → 指标 → 性能分析 → 遥测（可选）→ 自定义进程。

mod builder;
pub(crate) mod endpoint;

pub use builder::ServerBuilder;

use std::sync::Arc;

use prometheus::Registry;
use tracing::info;

use crate::config::{Config, MetricsBackend};
use crate::context::Context;
use crate::error::Result;
use crate::gateway::{CorsOptions, GatewayServer, JsonConfig, SwaggerConfig};
use crate::grpc::{GrpcOptions, GrpcServer};
use crate::interceptor::Interceptor;
use crate::metrics::MetricsServer;
use crate::profiler::PprofServer;
use crate::runtime::{Process, ProcessRuntime, RuntimeConfig};
use crate::service::ServiceRegistrar;
use crate::splash::Splash;
use crate::telemetry::TelemetryService;

/// 服务器
///
/// 只能运行一次。
pub struct Server {
    config: Config,
    services: Vec<Arc<dyn ServiceRegistrar>>,
    processes: Vec<Arc<dyn Process>>,
    interceptors: Vec<Interceptor>,
    cors: Option<CorsOptions>,
    json: JsonConfig,
    grpc_options: GrpcOptions,
    telemetry: bool,
    registry: Registry,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 组装进程运行时（不运行）
    pub fn into_runtime(self) -> Result<ProcessRuntime> {
        let Self {
            config,
            services,
            processes,
            interceptors,
            cors,
            json,
            grpc_options,
            telemetry,
            registry,
        } = self;

        let telemetry = if telemetry {
            Some(Arc::new(TelemetryService::new(&config, registry.clone())?))
        } else {
            None
        };

        let grpc = GrpcServer::new(config.grpc_address.clone(), config.close_timeout)
            .with_registrars(services.clone())
            .with_interceptors(interceptors)
            .with_metrics(telemetry.as_ref().and_then(|t| t.grpc_metrics()))
            .with_options(grpc_options)
            .with_reflection(config.reflection_enabled)
            .with_health_check(config.health_check_enabled);

        let swagger = config.swagger_enabled.then(|| SwaggerConfig {
            dir: config.swagger_dir.clone(),
            base_path: config.swagger_base_path.clone(),
        });
        let cors_enabled = cors.is_some();
        let gateway = GatewayServer::new(
            config.http_address.clone(),
            config.grpc_address.clone(),
            config.close_timeout,
        )
        .with_registrars(services)
        .with_cors(cors)
        .with_swagger(swagger)
        .with_json_config(json);

        let mut metrics = MetricsServer::new(
            config.metrics_address.clone(),
            config.close_timeout,
            registry,
            config.app_version.clone(),
        )?;
        let telemetry_metrics = &config.telemetry.metrics;
        if telemetry.is_some()
            && telemetry_metrics.enabled
            && telemetry_metrics.backend == MetricsBackend::Prometheus
        {
            metrics = metrics.with_path(telemetry_metrics.path.clone());
        }

        let pprof = PprofServer::new(config.pprof_address.clone());

        let mut splash = Splash::new()
            .with_app(config.app_name.clone(), config.app_version.clone())
            .with_environment(config.environment.clone())
            .with_grpc_address(config.grpc_address.clone())
            .with_http_address(config.http_address.clone())
            .with_metrics_address(config.metrics_address.clone())
            .with_pprof_address(config.pprof_address.clone())
            .with_swagger(config.swagger_enabled);
        if config.reflection_enabled {
            splash = splash.with_feature("gRPC Reflection");
        }
        if config.health_check_enabled {
            splash = splash.with_feature("Health Checks");
        }
        if cors_enabled {
            splash = splash.with_feature("CORS");
        }

        let mut system: Vec<Arc<dyn Process>> = vec![
            Arc::new(grpc),
            Arc::new(gateway),
            Arc::new(metrics),
            Arc::new(pprof),
        ];
        if let Some(telemetry) = telemetry {
            for feature in telemetry.features() {
                splash = splash.with_feature(feature);
            }
            system.push(telemetry);
        }

        let mut runtime = ProcessRuntime::new(
            RuntimeConfig::default().with_close_timeout(config.close_timeout),
        )
        .with_processes(system)
        .with_processes(processes);

        if config.splash_enabled {
            runtime = runtime.on_started(move || splash.display());
        }
        Ok(runtime)
    }

    /// 运行直到 `ctx` 结束或任一进程失败
    pub async fn run(self, ctx: Context) -> Result<()> {
        info!(
            app = %self.config.app_name,
            version = %self.config.app_version,
            environment = %self.config.environment,
            "Starting application"
        );
        let result = self.into_runtime()?.run(ctx).await;
        info!("Application stopped");
        result
    }
}
