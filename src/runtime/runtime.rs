//! 进程生命周期协调器
//!
//! 启动顺序：
//! 1. 按列表顺序依次执行 `pre_run`，任何失败立即返回，不进入关闭阶段
//! 2. 每个进程一个任务并发执行 `run`，失败通过有界通道上报
//! 3. 等待启动延迟后展示启动信息
//! 4. 等待外部上下文结束或第一个运行错误
//! 5. 以全新的超时上下文按逆序依次执行 `shutdown`

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::error::{Result, ServerError};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::process::Process;

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    PreRunning,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::PreRunning => "pre-running",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

type Announcer = Box<dyn FnOnce() + Send>;

/// 进程运行时
///
/// 持有有序的进程列表，列表顺序即启动顺序，逆序即关闭顺序。
/// 运行时只能运行一次：[`ProcessRuntime::run`] 会消费自身。
///
/// # 使用示例
/// ```rust,no_run
/// use std::sync::Arc;
/// use flare_bootstrap::context::Context;
/// use flare_bootstrap::runtime::{ProcessRuntime, RuntimeConfig, SpawnProcess};
///
/// # async fn demo() -> flare_bootstrap::Result<()> {
/// let runtime = ProcessRuntime::new(RuntimeConfig::default())
///     .add_process(Arc::new(SpawnProcess::new("worker", |ctx| async move {
///         ctx.done().await;
///         Ok(())
///     })));
///
/// runtime.run(Context::with_shutdown_signals()).await
/// # }
/// ```
pub struct ProcessRuntime {
    processes: Vec<Arc<dyn Process>>,
    config: RuntimeConfig,
    announcer: Option<Announcer>,
    state_tx: watch::Sender<LifecycleState>,
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl ProcessRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Idle);
        Self {
            processes: Vec::new(),
            config,
            announcer: None,
            state_tx,
        }
    }

    /// 添加进程（追加到列表末尾）
    pub fn add_process(mut self, process: Arc<dyn Process>) -> Self {
        debug!(process = %process.name(), "Adding process to runtime");
        self.processes.push(process);
        self
    }

    /// 批量添加进程
    pub fn with_processes<I>(mut self, processes: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Process>>,
    {
        for process in processes {
            self = self.add_process(process);
        }
        self
    }

    /// 设置启动完成后调用一次的回调（如启动画面）
    pub fn on_started<F>(mut self, announcer: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.announcer = Some(Box::new(announcer));
        self
    }

    /// 订阅生命周期状态
    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn process_names(&self) -> Vec<&str> {
        self.processes.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// 运行全部进程直到 `ctx` 结束或某个进程失败，然后逆序关闭
    ///
    /// 返回值优先级：运行错误 > 第一个关闭错误 > `Ok(())`。
    pub async fn run(self, ctx: Context) -> Result<()> {
        let Self {
            processes,
            config,
            announcer,
            state_tx,
        } = self;

        info!(processes = processes.len(), "🚀 Starting process runtime");
        state_tx.send_replace(LifecycleState::PreRunning);

        for (index, process) in processes.iter().enumerate() {
            debug!(index, process = %process.name(), "Pre-running process");
            if let Err(e) = process.pre_run(&ctx).await {
                error!(index, process = %process.name(), error = %e, "❌ Pre-run failed");
                state_tx.send_replace(LifecycleState::Stopped);
                return Err(ServerError::PreRun(e));
            }
        }

        let run_ctx = ctx.child();
        let (err_tx, mut err_rx) = mpsc::channel(processes.len().max(1));
        let mut join_set = JoinSet::new();

        for (index, process) in processes.iter().enumerate() {
            let process = Arc::clone(process);
            let run_ctx = run_ctx.clone();
            let err_tx = err_tx.clone();
            join_set.spawn(async move {
                debug!(index, process = %process.name(), "Running process");
                let result = AssertUnwindSafe(process.run(run_ctx))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err("process panicked".into()));
                match result {
                    Ok(()) => debug!(index, process = %process.name(), "Process exited"),
                    Err(source) => {
                        // 通道容量等于进程数，发送不会阻塞
                        let _ = err_tx.try_send(ServerError::Process { index, source });
                    }
                }
            });
        }
        drop(err_tx);
        state_tx.send_replace(LifecycleState::Running);

        tokio::time::sleep(config.startup_delay).await;
        if let Some(announce) = announcer {
            announce();
        }
        info!("✅ All processes started");

        let run_error = tokio::select! {
            _ = ctx.done() => {
                info!("Context done, shutting down");
                None
            }
            Some(e) = err_rx.recv() => {
                error!(error = %e, "❌ Process failed, shutting down");
                Some(e)
            }
        };

        state_tx.send_replace(LifecycleState::Stopping);
        let shutdown_ctx = Context::with_timeout(config.close_timeout);
        let mut result = match run_error {
            Some(e) => Err(e),
            None => Ok(()),
        };

        for (index, process) in processes.iter().enumerate().rev() {
            debug!(index, process = %process.name(), "Shutting down process");
            if let Err(source) = process.shutdown(&shutdown_ctx).await {
                error!(index, process = %process.name(), error = %source, "Shutdown failed");
                if result.is_ok() {
                    result = Err(ServerError::Shutdown { index, source });
                }
            }
        }

        run_ctx.cancel();
        Self::wait_for_processes(&shutdown_ctx, &mut join_set).await;
        while let Ok(e) = err_rx.try_recv() {
            warn!(error = %e, "Additional process error after shutdown began");
        }

        state_tx.send_replace(LifecycleState::Stopped);
        info!("Process runtime stopped");
        result
    }

    /// 在关闭预算内等待运行任务退出，超时后强制中止
    async fn wait_for_processes(shutdown_ctx: &Context, join_set: &mut JoinSet<()>) {
        let drain = async {
            while let Some(joined) = join_set.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Process task join error");
                }
            }
        };

        let finished = match shutdown_ctx.remaining() {
            Some(remaining) => tokio::time::timeout(remaining, drain).await.is_ok(),
            None => {
                drain.await;
                true
            }
        };

        if finished {
            debug!("All process tasks completed");
        } else {
            warn!("Process tasks did not exit in time, aborting");
            join_set.abort_all();
        }
    }
}
