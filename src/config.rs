//! 服务配置
//!
//! 支持三种来源：默认值、环境变量（可带前缀）、TOML 文件。

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    #[serde(with = "humantime_serde")]
    pub close_timeout: Duration,

    pub app_name: String,
    pub app_version: String,
    pub environment: String,

    pub grpc_address: String,
    pub http_address: String,
    pub metrics_address: String,
    pub pprof_address: String,

    pub reflection_enabled: bool,
    pub health_check_enabled: bool,
    pub swagger_enabled: bool,
    pub swagger_dir: PathBuf,
    pub swagger_base_path: String,
    pub splash_enabled: bool,

    pub telemetry: TelemetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            close_timeout: Duration::from_secs(10),
            app_name: "Service".to_string(),
            app_version: "dev".to_string(),
            environment: "development".to_string(),
            grpc_address: ":9090".to_string(),
            http_address: ":8080".to_string(),
            metrics_address: ":9091".to_string(),
            pprof_address: ":6060".to_string(),
            reflection_enabled: true,
            health_check_enabled: true,
            swagger_enabled: true,
            swagger_dir: PathBuf::from("./api"),
            swagger_base_path: "/".to_string(),
            splash_enabled: true,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Config {
    /// 从进程环境变量加载，`prefix` 为空时不加前缀
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_vars(prefix, std::env::vars())
    }

    /// 从给定的变量集合加载
    ///
    /// 前缀非空时只读取 `PREFIX_NAME` 形式的变量，并去掉前缀。
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = strip_prefix(prefix, vars);
        let settings = EnvSettings::init_from_hashmap(&vars)
            .map_err(|e| ServerError::config(e.to_string()))?;
        settings.try_into()
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ServerError::config(e.to_string()))
    }
}

/// 遥测配置
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub tracing: TracingConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    pub profiling: ProfilingConfig,
}

impl TelemetryConfig {
    pub fn any_enabled(&self) -> bool {
        self.tracing.enabled
            || self.metrics.enabled
            || self.logging.enabled
            || self.profiling.enabled
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub backend: TracingBackend,
    pub endpoint: String,
    pub insecure: bool,
    pub sample_rate: f64,
    pub batch_size: usize,
    #[serde(with = "humantime_serde")]
    pub batch_timeout: Duration,
    /// 形如 `k1=v1,k2=v2` 的导出请求头
    pub headers: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: TracingBackend::Otlp,
            endpoint: "localhost:4318".to_string(),
            insecure: true,
            sample_rate: 1.0,
            batch_size: 512,
            batch_timeout: Duration::from_secs(5),
            headers: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub backend: MetricsBackend,
    pub endpoint: String,
    pub insecure: bool,
    pub path: String,
    pub namespace: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: MetricsBackend::Prometheus,
            endpoint: "localhost:4318".to_string(),
            insecure: true,
            path: "/metrics".to_string(),
            namespace: "app".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub format: LogFormat,
    /// 为空时输出到标准输出
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            format: LogFormat::Json,
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfilingConfig {
    pub enabled: bool,
    pub backend: ProfilingBackend,
    pub endpoint: String,
    pub sample_rate: f64,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: ProfilingBackend::Pprof,
            endpoint: "http://localhost:4040".to_string(),
            sample_rate: 1.0,
        }
    }
}

macro_rules! backend_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ServerError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ServerError::config(format!(
                        concat!("unsupported ", $kind, " backend: {}"),
                        other
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = ServerError;

            fn try_from(s: String) -> Result<Self> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(backend: $name) -> Self {
                backend.as_str().to_string()
            }
        }
    };
}

backend_enum!(
    /// 链路追踪后端（jaeger 通过 OTLP 接入）
    TracingBackend, "tracing" { Otlp => "otlp", Jaeger => "jaeger" }
);
backend_enum!(
    /// 指标后端
    MetricsBackend, "metrics" { Prometheus => "prometheus", Otlp => "otlp" }
);
backend_enum!(
    /// 日志格式
    LogFormat, "logging" { Json => "json", Text => "text" }
);
backend_enum!(
    /// 性能分析后端
    ProfilingBackend, "profiling" {
        Pprof => "pprof",
        Pyroscope => "pyroscope",
        Otlp => "otlp",
        None => "none",
    }
);

pub(crate) fn strip_prefix<I, K, V>(prefix: &str, vars: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let prefix = if prefix.is_empty() {
        String::new()
    } else {
        format!("{}_", prefix.to_ascii_uppercase())
    };
    vars.into_iter()
        .filter_map(|(k, v)| {
            let key: String = k.into();
            key.strip_prefix(&prefix)
                .map(|stripped| (stripped.to_string(), v.into()))
        })
        .collect()
}

/// 环境变量的扁平表示
#[derive(Envconfig)]
struct EnvSettings {
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    log_level: String,
    #[envconfig(from = "CLOSE_TIMEOUT", default = "10s")]
    close_timeout: humantime::Duration,
    #[envconfig(from = "APP_NAME", default = "Service")]
    app_name: String,
    #[envconfig(from = "APP_VERSION", default = "dev")]
    app_version: String,
    #[envconfig(from = "ENVIRONMENT", default = "development")]
    environment: String,

    #[envconfig(from = "GRPC_ADDRESS", default = ":9090")]
    grpc_address: String,
    #[envconfig(from = "HTTP_ADDRESS", default = ":8080")]
    http_address: String,
    #[envconfig(from = "METRICS_ADDRESS", default = ":9091")]
    metrics_address: String,
    #[envconfig(from = "PPROF_ADDRESS", default = ":6060")]
    pprof_address: String,

    #[envconfig(from = "REFLECTION_ENABLED", default = "true")]
    reflection_enabled: bool,
    #[envconfig(from = "HEALTH_CHECK_ENABLED", default = "true")]
    health_check_enabled: bool,
    #[envconfig(from = "SWAGGER_ENABLED", default = "true")]
    swagger_enabled: bool,
    #[envconfig(from = "SWAGGER_DIR", default = "./api")]
    swagger_dir: String,
    #[envconfig(from = "SWAGGER_BASE_PATH", default = "/")]
    swagger_base_path: String,
    #[envconfig(from = "SPLASH_ENABLED", default = "true")]
    splash_enabled: bool,

    #[envconfig(from = "TRACING_ENABLED", default = "false")]
    tracing_enabled: bool,
    #[envconfig(from = "TRACING_BACKEND", default = "otlp")]
    tracing_backend: String,
    #[envconfig(from = "TRACING_ENDPOINT", default = "localhost:4318")]
    tracing_endpoint: String,
    #[envconfig(from = "TRACING_INSECURE", default = "true")]
    tracing_insecure: bool,
    #[envconfig(from = "TRACING_SAMPLE_RATE", default = "1.0")]
    tracing_sample_rate: f64,
    #[envconfig(from = "TRACING_BATCH_SIZE", default = "512")]
    tracing_batch_size: usize,
    #[envconfig(from = "TRACING_BATCH_TIMEOUT", default = "5s")]
    tracing_batch_timeout: humantime::Duration,
    #[envconfig(from = "TRACING_HEADERS", default = "")]
    tracing_headers: String,

    #[envconfig(from = "METRICS_ENABLED", default = "false")]
    metrics_enabled: bool,
    #[envconfig(from = "METRICS_BACKEND", default = "prometheus")]
    metrics_backend: String,
    #[envconfig(from = "METRICS_ENDPOINT", default = "localhost:4318")]
    metrics_endpoint: String,
    #[envconfig(from = "METRICS_INSECURE", default = "true")]
    metrics_insecure: bool,
    #[envconfig(from = "METRICS_PATH", default = "/metrics")]
    metrics_path: String,
    #[envconfig(from = "METRICS_NAMESPACE", default = "app")]
    metrics_namespace: String,

    #[envconfig(from = "LOGGING_ENABLED", default = "false")]
    logging_enabled: bool,
    #[envconfig(from = "LOG_FORMAT", default = "json")]
    log_format: String,
    #[envconfig(from = "LOG_FILE_PATH", default = "")]
    log_file_path: String,

    #[envconfig(from = "PROFILING_ENABLED", default = "false")]
    profiling_enabled: bool,
    #[envconfig(from = "PROFILING_BACKEND", default = "pprof")]
    profiling_backend: String,
    #[envconfig(from = "PROFILING_ENDPOINT", default = "http://localhost:4040")]
    profiling_endpoint: String,
    #[envconfig(from = "PROFILING_SAMPLE_RATE", default = "1.0")]
    profiling_sample_rate: f64,
}

impl TryFrom<EnvSettings> for Config {
    type Error = ServerError;

    fn try_from(env: EnvSettings) -> Result<Self> {
        let log_file_path = match env.log_file_path.trim() {
            "" => None,
            path => Some(PathBuf::from(path)),
        };

        Ok(Self {
            log_level: env.log_level,
            close_timeout: env.close_timeout.into(),
            app_name: env.app_name,
            app_version: env.app_version,
            environment: env.environment,
            grpc_address: env.grpc_address,
            http_address: env.http_address,
            metrics_address: env.metrics_address,
            pprof_address: env.pprof_address,
            reflection_enabled: env.reflection_enabled,
            health_check_enabled: env.health_check_enabled,
            swagger_enabled: env.swagger_enabled,
            swagger_dir: PathBuf::from(env.swagger_dir),
            swagger_base_path: env.swagger_base_path,
            splash_enabled: env.splash_enabled,
            telemetry: TelemetryConfig {
                tracing: TracingConfig {
                    enabled: env.tracing_enabled,
                    backend: env.tracing_backend.parse()?,
                    endpoint: env.tracing_endpoint,
                    insecure: env.tracing_insecure,
                    sample_rate: env.tracing_sample_rate,
                    batch_size: env.tracing_batch_size,
                    batch_timeout: env.tracing_batch_timeout.into(),
                    headers: env.tracing_headers,
                },
                metrics: MetricsConfig {
                    enabled: env.metrics_enabled,
                    backend: env.metrics_backend.parse()?,
                    endpoint: env.metrics_endpoint,
                    insecure: env.metrics_insecure,
                    path: env.metrics_path,
                    namespace: env.metrics_namespace,
                },
                logging: LoggingConfig {
                    enabled: env.logging_enabled,
                    format: env.log_format.parse()?,
                    file_path: log_file_path,
                },
                profiling: ProfilingConfig {
                    enabled: env.profiling_enabled,
                    backend: env.profiling_backend.parse()?,
                    endpoint: env.profiling_endpoint,
                    sample_rate: env.profiling_sample_rate,
                },
            },
        })
    }
}
