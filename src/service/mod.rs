//! 业务服务注册
//!
//! 业务服务实现 [`ServiceRegistrar`]，同时向 gRPC 服务器和 HTTP 网关注册自身。

use axum::Router;
use tonic::service::RoutesBuilder;

use crate::error::ProcessError;
use crate::gateway::JsonConfig;

/// 网关注册上下文
#[derive(Debug, Clone)]
pub struct GatewayContext {
    /// gRPC 服务的本机拨号地址，如 `http://127.0.0.1:9090`
    pub grpc_endpoint: String,
    pub json: JsonConfig,
}

/// 服务注册 trait
///
/// # 示例
/// ```rust,no_run
/// use axum::{Router, routing::get};
/// use flare_bootstrap::error::ProcessError;
/// use flare_bootstrap::service::{GatewayContext, ServiceRegistrar};
/// use tonic::service::RoutesBuilder;
///
/// struct Greeter;
///
/// impl ServiceRegistrar for Greeter {
///     fn register_grpc(&self, routes: &mut RoutesBuilder) {
///         // routes.add_service(GreeterServer::new(GreeterImpl));
///     }
///
///     fn register_http(&self, router: Router, _ctx: &GatewayContext) -> Result<Router, ProcessError> {
///         Ok(router.route("/v1/hello", get(|| async { "hello" })))
///     }
/// }
/// ```
pub trait ServiceRegistrar: Send + Sync {
    /// 注册 gRPC 服务
    fn register_grpc(&self, routes: &mut RoutesBuilder);

    /// 注册 HTTP 路由，默认不注册
    fn register_http(&self, router: Router, _ctx: &GatewayContext) -> Result<Router, ProcessError> {
        Ok(router)
    }

    /// 编码后的 `FileDescriptorSet`，用于 gRPC 反射
    fn file_descriptor_set(&self) -> Option<&'static [u8]> {
        None
    }
}
