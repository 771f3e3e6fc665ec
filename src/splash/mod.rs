//! 启动画面

use std::fmt;

use crate::utils::port_of;

/// 启动信息
#[derive(Debug, Clone, Default)]
pub struct Splash {
    app_name: String,
    app_version: String,
    environment: String,
    hostname: String,
    grpc_address: String,
    http_address: String,
    metrics_address: String,
    pprof_address: String,
    swagger_enabled: bool,
    features: Vec<String>,
}

impl Splash {
    pub fn new() -> Self {
        Self {
            hostname: hostname(),
            ..Default::default()
        }
    }

    pub fn with_app(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.app_name = name.into();
        self.app_version = version.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_grpc_address(mut self, address: impl Into<String>) -> Self {
        self.grpc_address = address.into();
        self
    }

    pub fn with_http_address(mut self, address: impl Into<String>) -> Self {
        self.http_address = address.into();
        self
    }

    pub fn with_metrics_address(mut self, address: impl Into<String>) -> Self {
        self.metrics_address = address.into();
        self
    }

    pub fn with_pprof_address(mut self, address: impl Into<String>) -> Self {
        self.pprof_address = address.into();
        self
    }

    pub fn with_swagger(mut self, enabled: bool) -> Self {
        self.swagger_enabled = enabled;
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    /// 输出到标准输出
    pub fn display(&self) {
        println!("{self}");
    }
}

impl fmt::Display for Splash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        let version = if self.app_version.is_empty() {
            String::new()
        } else {
            format!(" v{}", self.app_version.trim_start_matches('v'))
        };
        writeln!(f, "🚀 {}{}", format_app_name(&self.app_name), version)?;
        if !self.environment.is_empty() {
            writeln!(f, "🌍 Environment: {}", self.environment.to_uppercase())?;
        }
        writeln!(f, "💻 Hostname: {}", self.hostname)?;
        writeln!(f, "🦀 Toolkit: {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
        writeln!(f)?;

        let endpoints = [
            ("gRPC API", &self.grpc_address),
            ("HTTP API", &self.http_address),
            ("Metrics", &self.metrics_address),
            ("Profiling", &self.pprof_address),
        ];
        if endpoints.iter().any(|(_, address)| !address.is_empty()) {
            writeln!(f, "📡 Endpoints:")?;
            for (label, address) in endpoints {
                if !address.is_empty() {
                    writeln!(f, "   • {label}: {address}")?;
                }
            }
            if self.swagger_enabled {
                if let Some(port) = port_of(&self.http_address) {
                    let url = format!("http://localhost:{port}/swagger/");
                    writeln!(f, "   • Swagger UI: {}", hyperlink(&url))?;
                }
            }
            writeln!(f)?;
        }

        if !self.features.is_empty() {
            writeln!(f, "✨ Features:")?;
            for feature in &self.features {
                writeln!(f, "   • {feature}")?;
            }
        }
        Ok(())
    }
}

/// `my-cool_service` → `My Cool Service`，空名称为 `Service`
pub fn format_app_name(name: &str) -> String {
    let words = name
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>();

    if words.is_empty() {
        "Service".to_string()
    } else {
        words.join(" ")
    }
}

/// OSC-8 终端超链接
fn hyperlink(url: &str) -> String {
    format!("\u{1b}]8;;{url}\u{7}{url}\u{1b}]8;;\u{7}")
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
