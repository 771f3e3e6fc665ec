//! 运行时配置模块

use std::time::Duration;

/// 运行时配置
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// 关闭阶段的总时限（默认 10 秒）
    pub close_timeout: Duration,
    /// 启动全部进程后、展示启动信息前的等待时间（默认 100 毫秒）
    pub startup_delay: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            close_timeout: Duration::from_secs(10),
            startup_delay: Duration::from_millis(100),
        }
    }
}

impl RuntimeConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置关闭超时时间
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// 设置启动等待时间
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }
}
