use anyhow::Result;
use tracing::info;

use super::otel::ServiceInfo;
use crate::config::{ProfilingBackend, ProfilingConfig};

/// 运行中的持续性能分析器
pub(crate) trait Profiler: Send {
    fn stop(self: Box<Self>) -> Result<()>;
}

/// 按后端启动性能分析
///
/// pprof 由独立的性能分析服务按需采样，这里只记录日志。
pub(crate) fn start_profiler(
    config: &ProfilingConfig,
    service: &ServiceInfo,
    pprof_address: &str,
) -> Result<Option<Box<dyn Profiler>>> {
    match config.backend {
        ProfilingBackend::Pprof => {
            info!(address = %pprof_address, "Using pprof profiling endpoint");
            Ok(None)
        }
        ProfilingBackend::Pyroscope => start_pyroscope(config, service),
        ProfilingBackend::Otlp => {
            info!("OTLP profiling is not supported yet");
            Ok(None)
        }
        ProfilingBackend::None => {
            info!("Profiling backend is none, profiling disabled");
            Ok(None)
        }
    }
}

#[cfg(feature = "pyroscope")]
fn start_pyroscope(
    config: &ProfilingConfig,
    service: &ServiceInfo,
) -> Result<Option<Box<dyn Profiler>>> {
    use anyhow::Context;
    use pyroscope::PyroscopeAgent;
    use pyroscope_pprofrs::{PprofConfig, pprof_backend};

    // 采样率 1.0 对应 100Hz
    let sample_rate = (config.sample_rate * 100.0).round().max(1.0) as u32;
    let agent = PyroscopeAgent::builder(&config.endpoint, &service.name)
        .backend(pprof_backend(PprofConfig::new().sample_rate(sample_rate)))
        .tags(vec![
            ("version", service.version.as_str()),
            ("environment", service.environment.as_str()),
        ])
        .build()
        .context("failed to build pyroscope agent")?
        .start()
        .context("failed to start pyroscope agent")?;

    info!(endpoint = %config.endpoint, sample_rate, "Pyroscope profiling started");
    Ok(Some(Box::new(PyroscopeProfiler(agent))))
}

#[cfg(not(feature = "pyroscope"))]
fn start_pyroscope(
    _config: &ProfilingConfig,
    _service: &ServiceInfo,
) -> Result<Option<Box<dyn Profiler>>> {
    anyhow::bail!("pyroscope profiling backend requires the `pyroscope` feature")
}

#[cfg(feature = "pyroscope")]
struct PyroscopeProfiler(pyroscope::PyroscopeAgent<pyroscope::pyroscope::PyroscopeAgentRunning>);

#[cfg(feature = "pyroscope")]
impl Profiler for PyroscopeProfiler {
    fn stop(self: Box<Self>) -> Result<()> {
        let ready = self
            .0
            .stop()
            .map_err(|e| anyhow::anyhow!("failed to stop pyroscope agent: {e}"))?;
        ready.shutdown();
        Ok(())
    }
}
