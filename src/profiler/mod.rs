//! 性能分析服务
//!
//! 采样期间持有 `ProfilerGuard`，结束后生成报告。
//!
//! ```text
//! curl -sSL "http://localhost:6060/debug/pprof/profile?seconds=10&frequency=200" > profile.pb.gz
//! curl -sSL "http://localhost:6060/debug/pprof/flamegraph?seconds=10" > flamegraph.svg
//! ```

use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use axum::Router;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use flate2::Compression;
use flate2::write::GzEncoder;
use pprof::{ProfilerGuardBuilder, flamegraph::Options, protos::Message};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::info;

use crate::context::Context;
use crate::error::{ProcessResult, ServerError};
use crate::runtime::Process;
use crate::server::endpoint::{Endpoint, shutdown_budget};

const DEFAULT_SECONDS: u64 = 30;
const MAX_SECONDS: u64 = 300;
const DEFAULT_FREQUENCY: i32 = 100;
const DEFAULT_IMAGE_WIDTH: usize = 2500;
const BLOCKLIST: &[&str] = &["libc", "libgcc", "pthread", "vdso"];

#[derive(Debug, Default, Deserialize)]
pub struct ProfileQueryParams {
    /// 采样时长（秒）
    pub seconds: Option<u64>,
    /// 采样频率（Hz）
    pub frequency: Option<i32>,
    pub image_width: Option<usize>,
}

impl ProfileQueryParams {
    /// 采样时长，限制在 1 到 300 秒之间
    pub fn seconds(&self) -> u64 {
        self.seconds.unwrap_or(DEFAULT_SECONDS).clamp(1, MAX_SECONDS)
    }

    /// 非正数时回退到默认频率
    pub fn frequency(&self) -> i32 {
        self.frequency.filter(|f| *f > 0).unwrap_or(DEFAULT_FREQUENCY)
    }
}

/// 性能分析服务进程
pub struct PprofServer {
    endpoint: Endpoint,
}

impl PprofServer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::new("pprof", address),
        }
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn router() -> Router {
        Router::new()
            .route("/debug/pprof", get(handle_index))
            .route("/debug/pprof/", get(handle_index))
            .route("/debug/pprof/profile", get(handle_profile))
            .route("/debug/pprof/flamegraph", get(handle_flamegraph))
    }
}

#[async_trait]
impl Process for PprofServer {
    fn name(&self) -> &str {
        "pprof"
    }

    async fn pre_run(&self, _ctx: &Context) -> ProcessResult {
        self.endpoint.bind().await?;
        Ok(())
    }

    async fn run(&self, ctx: Context) -> ProcessResult {
        info!(address = %self.endpoint.address(), "🔬 Starting pprof server");
        self.endpoint.serve_http(Self::router(), ctx).await?;
        Ok(())
    }

    async fn shutdown(&self, ctx: &Context) -> ProcessResult {
        info!("Shutting down pprof server");
        if self.endpoint.stop(shutdown_budget(ctx, None)).await {
            Ok(())
        } else {
            Err(ServerError::ShutdownTimeout { component: "pprof" }.into())
        }
    }
}

async fn handle_index() -> &'static str {
    "Available profiles:\n\
     \n\
     /debug/pprof/profile?seconds=30&frequency=100    CPU profile (gzipped pprof protobuf)\n\
     /debug/pprof/flamegraph?seconds=30&frequency=100 CPU flamegraph (SVG)\n"
}

async fn handle_profile(Query(params): Query<ProfileQueryParams>) -> Response {
    match generate_report(params.frequency(), params.seconds()).await {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "application/octet-stream")],
            body,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_flamegraph(Query(params): Query<ProfileQueryParams>) -> Response {
    let image_width = params.image_width.unwrap_or(DEFAULT_IMAGE_WIDTH);
    match generate_flamegraph(params.frequency(), params.seconds(), image_width).await {
        Ok(body) => (StatusCode::OK, [(CONTENT_TYPE, "image/svg+xml")], body).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(e: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(CONTENT_TYPE, "text/plain")],
        format!("{e:#}"),
    )
        .into_response()
}

async fn generate_report(frequency: i32, seconds: u64) -> Result<Vec<u8>> {
    let guard = ProfilerGuardBuilder::default()
        .frequency(frequency)
        .blocklist(BLOCKLIST)
        .build()
        .context("Failed to build profiler guard")?;

    sleep(Duration::from_secs(seconds)).await;

    let profile = guard
        .report()
        .build()
        .context("Failed to build profiler report")?
        .pprof()
        .context("Failed to build profiler profile")?;

    let mut body = Vec::new();
    let mut encoder = GzEncoder::new(&mut body, Compression::default());
    profile
        .write_to_writer(&mut encoder)
        .context("Failed to write profile to writer")?;
    encoder
        .finish()
        .context("Failed to finish encoding profile")?;

    Ok(body)
}

async fn generate_flamegraph(
    frequency: i32,
    seconds: u64,
    image_width: usize,
) -> Result<Vec<u8>> {
    let guard = ProfilerGuardBuilder::default()
        .frequency(frequency)
        .blocklist(BLOCKLIST)
        .build()
        .context("Failed to build profiler guard")?;

    sleep(Duration::from_secs(seconds)).await;

    let mut options = Options::default();
    options.image_width = Some(image_width);
    let mut svg = Vec::new();
    guard
        .report()
        .build()
        .context("Failed to build flamegraph report")?
        .flamegraph_with_options(&mut svg, &mut options)
        .context("Failed to render flamegraph")?;

    Ok(svg)
}
