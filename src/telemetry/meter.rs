use anyhow::{Context, Result};
use opentelemetry::global;
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use tracing::info;

use super::otel::otlp_url;
use crate::config::MetricsConfig;

/// 创建 OTLP 指标提供者并设为全局
pub(crate) fn init_meter_provider(
    config: &MetricsConfig,
    resource: Resource,
) -> Result<SdkMeterProvider> {
    let endpoint = otlp_url(&config.endpoint, config.insecure, "/v1/metrics");
    let exporter = MetricExporter::builder()
        .with_http()
        .with_endpoint(endpoint.clone())
        .build()
        .context("failed to create OTLP HTTP metric exporter")?;

    let provider = SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(exporter).build())
        .with_resource(resource)
        .build();

    global::set_meter_provider(provider.clone());
    info!(endpoint = %endpoint, "OTLP metrics initialized");
    Ok(provider)
}
