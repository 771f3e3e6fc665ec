//! OpenTelemetry 公共设置

use std::collections::HashMap;

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;

/// 服务标识，写入遥测资源与日志
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub environment: String,
}

/// 解析 `k1=v1,k2=v2` 形式的请求头，忽略空段与缺少 `=` 的段
pub fn parse_headers(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// 补全 OTLP HTTP 导出地址
///
/// `localhost:4318` + `/v1/traces` → `http://localhost:4318/v1/traces`（insecure 时）。
/// 已带路径的地址原样保留路径。
pub fn otlp_url(endpoint: &str, insecure: bool, signal_path: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    let with_scheme = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else if insecure {
        format!("http://{endpoint}")
    } else {
        format!("https://{endpoint}")
    };

    let has_path = with_scheme
        .split_once("://")
        .is_some_and(|(_, rest)| rest.contains('/'));
    if has_path {
        with_scheme
    } else {
        format!("{with_scheme}{signal_path}")
    }
}

pub(crate) fn resource(service: &ServiceInfo) -> Resource {
    Resource::builder()
        .with_service_name(service.name.clone())
        .with_attributes([
            KeyValue::new("service.version", service.version.clone()),
            KeyValue::new("environment", service.environment.clone()),
        ])
        .build()
}
