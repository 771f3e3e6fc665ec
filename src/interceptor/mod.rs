//! gRPC 拦截器模块
//!
//! - [`InterceptorChain`]：按注册顺序依次执行的用户拦截器链
//! - [`GrpcMakeSpan`]：为每个 gRPC 请求创建追踪 span，并从请求头提取 W3C 上下文
//! - [`GrpcMetricsLayer`]：按方法与状态记录请求数和耗时

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::LoggingInterceptor;
pub use metrics::{GrpcMetricsLayer, GrpcMetricsService};
pub use tracing::GrpcMakeSpan;

use std::fmt;
use std::sync::Arc;

use tonic::{Request, Status};

/// 单个拦截器
pub type Interceptor =
    Arc<dyn Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync + 'static>;

/// 把闭包包装成 [`Interceptor`]
pub fn interceptor<F>(f: F) -> Interceptor
where
    F: Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 拦截器链
///
/// 任意一个拦截器返回错误时请求被拒绝，后续拦截器不再执行。
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Arc<Vec<Interceptor>>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Interceptor>) -> Self {
        Self {
            interceptors: Arc::new(interceptors),
        }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn intercept(&self, mut req: Request<()>) -> Result<Request<()>, Status> {
        for interceptor in self.interceptors.iter() {
            req = interceptor(req)?;
        }
        Ok(req)
    }
}

impl tonic::service::Interceptor for InterceptorChain {
    fn call(&mut self, req: Request<()>) -> Result<Request<()>, Status> {
        self.intercept(req)
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

/// 追踪信息
#[derive(Debug, Clone)]
pub struct TraceInfo {
    pub trace_id: String,
    pub request_id: String,
}

/// 提取追踪信息（`x-trace-id` / `x-request-id`）
pub fn extract_trace_info<T>(req: &Request<T>) -> Option<TraceInfo> {
    let metadata = req.metadata();

    let trace_id = metadata
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let request_id = metadata
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if trace_id.is_empty() && request_id.is_empty() {
        return None;
    }

    Some(TraceInfo {
        trace_id,
        request_id,
    })
}
