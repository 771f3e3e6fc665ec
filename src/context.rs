//! 生命周期上下文
//!
//! 由取消令牌与可选截止时间组成，贯穿进程的三个阶段。

use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 可取消、可带截止时间的上下文
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// 永不过期的根上下文（除非被显式取消）
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// 全新的、与任何父上下文无关的超时上下文
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// 由外部令牌构造
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// 派生子上下文：父上下文取消时子上下文随之取消，截止时间继承
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// 绑定 Ctrl+C / SIGTERM 的根上下文
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn with_shutdown_signals() -> Self {
        let ctx = Self::background();
        let token = ctx.token.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            token.cancel();
        });
        ctx
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 已取消或已超过截止时间
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 距截止时间的剩余时长，无截止时间时返回 `None`
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// 等待上下文结束（取消或超时）
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("shutdown signal received (Ctrl+C)"),
                    _ = terminate.recv() => info!("shutdown signal received (SIGTERM)"),
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler, falling back to Ctrl+C")
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received (Ctrl+C)"),
        Err(e) => warn!(error = %e, "failed to listen for Ctrl+C"),
    }
}
