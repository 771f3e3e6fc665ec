//! 网络监听端点
//!
//! gRPC、网关、指标与性能分析服务共用的监听与停机逻辑：
//! `pre_run` 中绑定端口，`run` 中取出监听器开始服务，
//! `shutdown` 先请求优雅停止，超出预算后强制停止。

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::Context;
use crate::error::{Result, ServerError};
use crate::utils::bind_address;

pub(crate) struct Endpoint {
    component: &'static str,
    address: String,
    listener: Mutex<Option<TcpListener>>,
    local_addr: OnceLock<SocketAddr>,
    graceful: CancellationToken,
    force: CancellationToken,
    stopped: CancellationToken,
}

impl Endpoint {
    pub(crate) fn new(component: &'static str, address: impl Into<String>) -> Self {
        Self {
            component,
            address: address.into(),
            listener: Mutex::new(None),
            local_addr: OnceLock::new(),
            graceful: CancellationToken::new(),
            force: CancellationToken::new(),
            stopped: CancellationToken::new(),
        }
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    /// 实际监听地址（端口为 0 时由系统分配）
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub(crate) async fn bind(&self) -> Result<SocketAddr> {
        let address = bind_address(&self.address);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let _ = self.local_addr.set(local_addr);
        *self.listener.lock().await = Some(listener);
        info!(component = self.component, address = %local_addr, "Listener bound");
        Ok(local_addr)
    }

    pub(crate) async fn take_listener(&self) -> Result<TcpListener> {
        self.listener
            .lock()
            .await
            .take()
            .ok_or(ServerError::NotPrepared {
                component: self.component,
            })
    }

    pub(crate) fn graceful_token(&self) -> CancellationToken {
        self.graceful.clone()
    }

    pub(crate) fn force_token(&self) -> CancellationToken {
        self.force.clone()
    }

    pub(crate) fn mark_stopped(&self) {
        self.stopped.cancel();
    }

    /// 在 axum 上提供 HTTP 服务直到停止
    pub(crate) async fn serve_http(&self, router: Router, ctx: Context) -> Result<()> {
        let listener = self.take_listener().await?;
        info!(component = self.component, address = %self.address, "Starting HTTP server");

        let serve = axum::serve(listener, router)
            .with_graceful_shutdown(graceful_signal(self.graceful_token(), ctx))
            .into_future();
        let force = self.force_token();

        let result = tokio::select! {
            res = serve => res.map_err(|source| ServerError::Serve {
                component: self.component,
                source,
            }),
            _ = force.cancelled() => {
                warn!(component = self.component, "HTTP server forced to stop");
                Ok(())
            }
        };

        self.mark_stopped();
        result
    }

    /// 请求停止并在预算内等待服务退出
    ///
    /// 返回 `true` 表示已优雅退出（或从未开始服务），`false` 表示超时并已强制停止。
    pub(crate) async fn stop(&self, budget: Option<Duration>) -> bool {
        self.graceful.cancel();

        // 监听器仍未被取走说明服务从未启动
        if self.listener.lock().await.take().is_some() {
            return true;
        }
        if self.stopped.is_cancelled() {
            return true;
        }

        let finished = match budget {
            Some(budget) => tokio::time::timeout(budget, self.stopped.cancelled())
                .await
                .is_ok(),
            None => {
                self.stopped.cancelled().await;
                true
            }
        };

        if !finished {
            self.force.cancel();
        }
        finished
    }
}

/// 优雅停止信号：调用 `shutdown` 或运行上下文结束
pub(crate) fn graceful_signal(
    graceful: CancellationToken,
    ctx: Context,
) -> impl Future<Output = ()> + Send + 'static {
    async move {
        tokio::select! {
            _ = graceful.cancelled() => {}
            _ = ctx.done() => {}
        }
    }
}

/// 关闭预算：上下文剩余时间与关闭超时取较小者
pub(crate) fn shutdown_budget(ctx: &Context, close_timeout: Option<Duration>) -> Option<Duration> {
    match (ctx.remaining(), close_timeout) {
        (Some(remaining), Some(timeout)) => Some(remaining.min(timeout)),
        (remaining, timeout) => remaining.or(timeout),
    }
}
