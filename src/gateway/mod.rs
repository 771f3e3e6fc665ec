//! HTTP/REST 网关
//!
//! 路由由三部分组成：业务服务注册的路由、`/health` 健康检查、可选的 Swagger 文档。
//! 配置了 CORS 时整个路由包裹一层 `CorsLayer`。

pub mod config;
pub mod swagger;

pub use config::{CorsOptions, JsonConfig};
pub use swagger::SwaggerConfig;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::routing::get;
use tokio::sync::Mutex;
use tracing::info;

use crate::context::Context;
use crate::error::{ProcessResult, Result, ServerError};
use crate::runtime::Process;
use crate::server::endpoint::{Endpoint, shutdown_budget};
use crate::service::{GatewayContext, ServiceRegistrar};
use crate::utils::dial_target;

/// 网关服务进程
pub struct GatewayServer {
    endpoint: Endpoint,
    close_timeout: Duration,
    grpc_address: String,
    registrars: Vec<Arc<dyn ServiceRegistrar>>,
    cors: Option<CorsOptions>,
    swagger: Option<SwaggerConfig>,
    json: JsonConfig,
    router: Mutex<Option<Router>>,
}

impl GatewayServer {
    pub fn new(
        address: impl Into<String>,
        grpc_address: impl Into<String>,
        close_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: Endpoint::new("gateway", address),
            close_timeout,
            grpc_address: grpc_address.into(),
            registrars: Vec::new(),
            cors: None,
            swagger: None,
            json: JsonConfig::default(),
            router: Mutex::new(None),
        }
    }

    pub fn with_registrars(mut self, registrars: Vec<Arc<dyn ServiceRegistrar>>) -> Self {
        self.registrars.extend(registrars);
        self
    }

    pub fn with_cors(mut self, cors: Option<CorsOptions>) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_swagger(mut self, swagger: Option<SwaggerConfig>) -> Self {
        self.swagger = swagger;
        self
    }

    pub fn with_json_config(mut self, json: JsonConfig) -> Self {
        self.json = json;
        self
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn gateway_context(&self) -> GatewayContext {
        GatewayContext {
            grpc_endpoint: dial_target(&self.grpc_address),
            json: self.json.clone(),
        }
    }

    /// 构建网关路由
    pub fn router(&self) -> Result<Router> {
        let ctx = self.gateway_context();
        let mut router = Router::new();
        for registrar in &self.registrars {
            router = registrar
                .register_http(router, &ctx)
                .map_err(ServerError::Gateway)?;
        }

        router = router.route("/health", get(|| async { "OK" }));

        if let Some(swagger) = &self.swagger {
            router = swagger::register(router, swagger);
        }

        if let Some(cors) = &self.cors {
            router = router.layer(cors.to_layer()?);
        }

        Ok(router)
    }
}

#[async_trait]
impl Process for GatewayServer {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn pre_run(&self, _ctx: &Context) -> ProcessResult {
        let router = self.router()?;
        self.endpoint.bind().await?;
        *self.router.lock().await = Some(router);
        Ok(())
    }

    async fn run(&self, ctx: Context) -> ProcessResult {
        let router = self
            .router
            .lock()
            .await
            .take()
            .ok_or(ServerError::NotPrepared {
                component: "gateway",
            })?;
        info!(
            address = %self.endpoint.address(),
            grpc_endpoint = %dial_target(&self.grpc_address),
            "🌐 Starting HTTP gateway"
        );
        self.endpoint.serve_http(router, ctx).await?;
        Ok(())
    }

    async fn shutdown(&self, ctx: &Context) -> ProcessResult {
        info!("Shutting down HTTP gateway");
        if self
            .endpoint
            .stop(shutdown_budget(ctx, Some(self.close_timeout)))
            .await
        {
            Ok(())
        } else {
            Err(ServerError::ShutdownTimeout {
                component: "gateway",
            }
            .into())
        }
    }
}
