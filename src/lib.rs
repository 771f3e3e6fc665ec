//! Flare Bootstrap
//!
//! 服务启动工具包：在统一的生命周期协调器下运行 gRPC 服务、HTTP 网关、
//! Prometheus 指标、性能分析端点与遥测服务，以及任意自定义进程。
//!
//! # 生命周期
//!
//! 1. **PreRun**：按注册顺序逐个准备（绑定端口、初始化提供者）
//! 2. **Run**：所有进程并发运行，直到上下文结束或任一进程出错
//! 3. **Shutdown**：以全新的超时预算逆序关闭全部进程
//!
//! # 示例
//! ```rust,no_run
//! use flare_bootstrap::{Context, Server};
//!
//! # async fn demo() -> flare_bootstrap::Result<()> {
//! let server = Server::builder()
//!     .with_app_name("order-service")
//!     .with_grpc_address(":50051")
//!     .build()?;
//! server.run(Context::with_shutdown_signals()).await
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod grpc;
pub mod interceptor;
pub mod metrics;
pub mod observability;
pub mod profiler;
pub mod runtime;
pub mod server;
pub mod service;
pub mod splash;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use context::Context;
pub use error::{ProcessError, ProcessResult, Result, ServerError};
pub use runtime::{LifecycleState, Process, ProcessRuntime, RuntimeConfig, SpawnProcess};
pub use server::{Server, ServerBuilder};
pub use service::{GatewayContext, ServiceRegistrar};

pub use async_trait::async_trait;
