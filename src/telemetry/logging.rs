use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use opentelemetry_sdk::trace::SdkTracer;
use tracing::{info, warn};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use super::otel::ServiceInfo;
use crate::config::{LogFormat, LoggingConfig};

type Base = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Base> + Send + Sync>;

/// 安装全局日志订阅者
///
/// `logging` 为空时使用默认的文本输出；`tracer` 存在时附加 OpenTelemetry 层。
/// 已存在全局订阅者时仅记录警告并返回 `false`。
pub(crate) fn init_subscriber(
    level: &str,
    logging: Option<&LoggingConfig>,
    tracer: Option<SdkTracer>,
    service: &ServiceInfo,
) -> Result<bool> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let format = logging.map(|l| l.format).unwrap_or(LogFormat::Text);
    let file = match logging.and_then(|l| l.file_path.as_ref()) {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?,
        ),
        None => None,
    };

    let fmt_layer: BoxedLayer = match (format, file) {
        (LogFormat::Json, Some(file)) => fmt::layer().json().with_writer(Mutex::new(file)).boxed(),
        (LogFormat::Json, None) => fmt::layer().json().boxed(),
        (LogFormat::Text, Some(file)) => fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .boxed(),
        (LogFormat::Text, None) => fmt::layer().boxed(),
    };
    layers.push(fmt_layer);

    if let Some(tracer) = tracer {
        layers.push(tracing_opentelemetry::layer().with_tracer(tracer).boxed());
    }

    match tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
    {
        Ok(()) => {
            info!(
                service = %service.name,
                version = %service.version,
                environment = %service.environment,
                format = %format,
                log_level = %level,
                "Structured logging initialized"
            );
            Ok(true)
        }
        Err(e) => {
            warn!(error = %e, "Global subscriber already installed, keeping it");
            Ok(false)
        }
    }
}
