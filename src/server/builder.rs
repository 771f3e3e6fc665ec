//! 服务器构建器
//!
//! 标量选项后设置者生效，列表选项（服务、进程、拦截器）累加。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;

use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::gateway::{CorsOptions, JsonConfig};
use crate::grpc::GrpcOptions;
use crate::interceptor::Interceptor;
use crate::runtime::Process;
use crate::server::Server;
use crate::service::ServiceRegistrar;

/// 服务器构建器
///
/// # 示例
/// ```rust,no_run
/// use std::time::Duration;
/// use flare_bootstrap::{Config, Server};
///
/// # fn demo() -> flare_bootstrap::Result<()> {
/// let server = Server::builder()
///     .with_config(Config::from_env("APP")?)
///     .with_grpc_address(":50051")
///     .with_close_timeout(Duration::from_secs(15))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ServerBuilder {
    config: Config,
    services: Vec<Arc<dyn ServiceRegistrar>>,
    processes: Vec<Arc<dyn Process>>,
    interceptors: Vec<Interceptor>,
    cors: Option<CorsOptions>,
    json: JsonConfig,
    grpc_options: GrpcOptions,
    telemetry: bool,
    registry: Option<Registry>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体替换配置（之前设置的单项配置会被覆盖）
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.config.app_version = version.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.config.environment = environment.into();
        self
    }

    pub fn with_grpc_address(mut self, address: impl Into<String>) -> Self {
        self.config.grpc_address = address.into();
        self
    }

    pub fn with_http_address(mut self, address: impl Into<String>) -> Self {
        self.config.http_address = address.into();
        self
    }

    pub fn with_metrics_address(mut self, address: impl Into<String>) -> Self {
        self.config.metrics_address = address.into();
        self
    }

    pub fn with_pprof_address(mut self, address: impl Into<String>) -> Self {
        self.config.pprof_address = address.into();
        self
    }

    pub fn with_reflection(mut self, enabled: bool) -> Self {
        self.config.reflection_enabled = enabled;
        self
    }

    pub fn with_health_check(mut self, enabled: bool) -> Self {
        self.config.health_check_enabled = enabled;
        self
    }

    /// 设置 Swagger 目录并启用 Swagger
    pub fn with_swagger_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.swagger_dir = dir.into();
        self.config.swagger_enabled = true;
        self
    }

    /// 设置 Swagger 基础路径并启用 Swagger
    pub fn with_swagger_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.config.swagger_base_path = base_path.into();
        self.config.swagger_enabled = true;
        self
    }

    pub fn with_swagger(mut self, enabled: bool) -> Self {
        self.config.swagger_enabled = enabled;
        self
    }

    pub fn with_splash(mut self, enabled: bool) -> Self {
        self.config.splash_enabled = enabled;
        self
    }

    pub fn with_service(mut self, service: Arc<dyn ServiceRegistrar>) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_services<I>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ServiceRegistrar>>,
    {
        self.services.extend(services);
        self
    }

    /// 追加自定义进程（排在内置进程之后）
    pub fn with_process(mut self, process: Arc<dyn Process>) -> Self {
        self.processes.push(process);
        self
    }

    pub fn with_processes<I>(mut self, processes: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Process>>,
    {
        self.processes.extend(processes);
        self
    }

    pub fn with_grpc_interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_grpc_interceptors<I>(mut self, interceptors: I) -> Self
    where
        I: IntoIterator<Item = Interceptor>,
    {
        self.interceptors.extend(interceptors);
        self
    }

    pub fn with_grpc_options(mut self, options: GrpcOptions) -> Self {
        self.grpc_options = options;
        self
    }

    pub fn with_gateway_cors(mut self, cors: CorsOptions) -> Self {
        self.cors = Some(cors);
        self
    }

    pub fn with_json_config(mut self, json: JsonConfig) -> Self {
        self.json = json;
        self
    }

    /// 启用遥测服务（具体组件由 `config.telemetry` 决定）
    pub fn with_telemetry(mut self) -> Self {
        self.telemetry = true;
        self
    }

    /// 指定指标注册表，默认新建
    pub fn with_metrics_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<Server> {
        validate(&self.config)?;
        Ok(Server {
            config: self.config,
            services: self.services,
            processes: self.processes,
            interceptors: self.interceptors,
            cors: self.cors,
            json: self.json,
            grpc_options: self.grpc_options,
            telemetry: self.telemetry,
            registry: self.registry.unwrap_or_default(),
        })
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.close_timeout.is_zero() {
        return Err(ServerError::config("close timeout must be greater than zero"));
    }

    let addresses = [
        ("grpc_address", &config.grpc_address),
        ("http_address", &config.http_address),
        ("metrics_address", &config.metrics_address),
        ("pprof_address", &config.pprof_address),
    ];
    for (name, address) in addresses {
        if address.trim().is_empty() {
            return Err(ServerError::config(format!("{name} must not be empty")));
        }
    }
    Ok(())
}
