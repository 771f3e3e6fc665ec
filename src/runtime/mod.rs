//! 进程运行时框架
//!
//! 统一管理多个长期运行组件的生命周期：顺序准备、并发运行、逆序关闭。
//!
//! # 设计理念
//!
//! 1. **统一进程契约**：通过 `Process` trait 支持 gRPC、HTTP、遥测及自定义组件
//! 2. **首错优先**：第一个运行错误决定返回值，后续错误仅记录日志
//! 3. **尽力关闭**：关闭阶段不因单个进程失败而中断
//! 4. **独立关闭预算**：关闭阶段使用全新的超时上下文，不受外部取消影响

pub mod config;
pub mod process;
#[allow(clippy::module_inception)]
pub mod runtime;

pub use config::RuntimeConfig;
pub use process::{Process, SpawnProcess};
pub use runtime::{LifecycleState, ProcessRuntime};
