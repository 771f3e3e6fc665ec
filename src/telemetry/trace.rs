use anyhow::{Context, Result};
use opentelemetry::global;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, Sampler, SdkTracerProvider};
use tracing::info;

use super::otel::{otlp_url, parse_headers};
use crate::config::{TracingBackend, TracingConfig};

/// 创建 OTLP 追踪提供者并设为全局
///
/// jaeger 后端同样走 OTLP（Jaeger 原生支持 OTLP 接收）。
pub(crate) fn init_tracer_provider(
    config: &TracingConfig,
    resource: Resource,
) -> Result<SdkTracerProvider> {
    let endpoint = otlp_url(&config.endpoint, config.insecure, "/v1/traces");
    if config.backend == TracingBackend::Jaeger {
        info!(endpoint = %endpoint, "Jaeger tracing exports via OTLP");
    }

    let exporter = SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint.clone())
        .with_headers(parse_headers(&config.headers))
        .build()
        .context("failed to create OTLP HTTP trace exporter")?;

    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            BatchConfigBuilder::default()
                .with_max_export_batch_size(config.batch_size)
                .with_scheduled_delay(config.batch_timeout)
                .build(),
        )
        .build();

    let provider = SdkTracerProvider::builder()
        .with_span_processor(processor)
        .with_sampler(Sampler::TraceIdRatioBased(config.sample_rate))
        .with_resource(resource)
        .build();

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    info!(
        backend = %config.backend,
        endpoint = %endpoint,
        sample_rate = config.sample_rate,
        "OTLP tracing initialized"
    );
    Ok(provider)
}
