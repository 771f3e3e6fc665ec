//! 进程定义模块
//!
//! 所有由运行时管理的长期运行组件（gRPC、网关、指标、性能分析、遥测以及用户自定义组件）
//! 都实现同一个三阶段契约：`pre_run` → `run` → `shutdown`。

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::context::Context;
use crate::error::ProcessResult;

/// 进程 trait
#[async_trait]
pub trait Process: Send + Sync {
    /// 进程名称（用于日志）
    fn name(&self) -> &str {
        "process"
    }

    /// 启动前准备（绑定监听、注册指标等），不得无限阻塞
    async fn pre_run(&self, ctx: &Context) -> ProcessResult;

    /// 运行直到组件停止或 `ctx` 结束
    async fn run(&self, ctx: Context) -> ProcessResult;

    /// 释放资源，需遵守 `ctx` 的截止时间
    async fn shutdown(&self, ctx: &Context) -> ProcessResult;
}

type ProcessFn =
    Box<dyn FnOnce(Context) -> Pin<Box<dyn Future<Output = ProcessResult> + Send>> + Send>;

/// 闭包进程
///
/// 将一个接收 [`Context`] 的闭包包装为 [`Process`]，`pre_run` 与 `shutdown` 为空操作。
/// 闭包只会被执行一次。
///
/// # 示例
/// ```rust,no_run
/// use flare_bootstrap::runtime::SpawnProcess;
///
/// let worker = SpawnProcess::new("worker", |ctx| async move {
///     ctx.done().await;
///     Ok(())
/// });
/// ```
pub struct SpawnProcess {
    name: String,
    run_fn: Mutex<Option<ProcessFn>>,
}

impl SpawnProcess {
    pub fn new<F, Fut>(name: impl Into<String>, run_fn: F) -> Self
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = ProcessResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            run_fn: Mutex::new(Some(Box::new(move |ctx| Box::pin(run_fn(ctx))))),
        }
    }
}

#[async_trait]
impl Process for SpawnProcess {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pre_run(&self, _ctx: &Context) -> ProcessResult {
        Ok(())
    }

    async fn run(&self, ctx: Context) -> ProcessResult {
        let run_fn = self
            .run_fn
            .lock()
            .await
            .take()
            .ok_or_else(|| format!("process {} has already been run", self.name))?;
        run_fn(ctx).await
    }

    async fn shutdown(&self, _ctx: &Context) -> ProcessResult {
        Ok(())
    }
}
