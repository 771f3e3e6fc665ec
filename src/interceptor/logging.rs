use std::sync::Arc;

use tonic::{Request, Status};
use tracing::debug;

use super::{Interceptor, extract_trace_info};

/// 日志拦截器
///
/// 记录带有 `x-trace-id` / `x-request-id` 元数据的请求。
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self
    }

    pub fn intercept(&self, req: Request<()>) -> Result<Request<()>, Status> {
        if let Some(trace_info) = extract_trace_info(&req) {
            debug!(
                trace_id = %trace_info.trace_id,
                request_id = %trace_info.request_id,
                "Processing gRPC request"
            );
        }
        Ok(req)
    }

    pub fn into_interceptor(self) -> Interceptor {
        Arc::new(move |req| self.intercept(req))
    }
}
