//! 错误处理模块
//!
//! 协调器、各个内置进程以及配置加载统一使用 [`ServerError`]。
//! 进程各阶段返回的错误统一为 [`ProcessError`]，由协调器按阶段包装。

use thiserror::Error;

/// 进程阶段错误（与任意实现 `std::error::Error` 的错误兼容）
pub type ProcessError = Box<dyn std::error::Error + Send + Sync>;

/// 进程阶段执行结果
pub type ProcessResult<T = ()> = std::result::Result<T, ProcessError>;

/// 库内默认结果类型
pub type Result<T, E = ServerError> = std::result::Result<T, E>;

/// 服务器错误
#[derive(Debug, Error)]
pub enum ServerError {
    /// PreRun 阶段失败，没有任何进程进入运行阶段
    #[error("pre-run error: {0}")]
    PreRun(#[source] ProcessError),

    /// Run 阶段失败，`index` 为进程在列表中的位置
    #[error("process {index} error: {source}")]
    Process {
        index: usize,
        #[source]
        source: ProcessError,
    },

    /// Shutdown 阶段失败
    #[error("process {index} shutdown error: {source}")]
    Shutdown {
        index: usize,
        #[source]
        source: ProcessError,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{component} is not prepared, pre_run must succeed before run")]
    NotPrepared { component: &'static str },

    #[error("{component} server error: {source}")]
    Serve {
        component: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("gRPC server error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("{component} server shutdown error: deadline exceeded")]
    ShutdownTimeout { component: &'static str },

    #[error("gateway registration error: {0}")]
    Gateway(#[source] ProcessError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("telemetry error: {0}")]
    Telemetry(String),

    #[error("telemetry shutdown errors: [{}]", .0.join("; "))]
    TelemetryShutdown(Vec<String>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// 创建配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// 创建遥测错误
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    /// 失败进程的索引（仅 Run / Shutdown 阶段错误携带）
    pub fn process_index(&self) -> Option<usize> {
        match self {
            Self::Process { index, .. } | Self::Shutdown { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// 是否为启动前（PreRun）错误
    pub fn is_pre_run(&self) -> bool {
        matches!(self, Self::PreRun(_))
    }
}
