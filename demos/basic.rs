//! 最小服务示例
//!
//! ```text
//! APP_APP_NAME=demo cargo run --example basic
//! curl http://localhost:8080/v1/hello
//! curl http://localhost:9091/metrics
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use flare_bootstrap::error::ProcessError;
use flare_bootstrap::interceptor::LoggingInterceptor;
use flare_bootstrap::observability::init_tracing;
use flare_bootstrap::{Config, Context, GatewayContext, Server, ServiceRegistrar, SpawnProcess};
use tonic::service::RoutesBuilder;
use tracing::info;

struct HelloService;

impl ServiceRegistrar for HelloService {
    fn register_grpc(&self, _routes: &mut RoutesBuilder) {
        // routes.add_service(HelloServer::new(HelloImpl));
    }

    fn register_http(&self, router: Router, ctx: &GatewayContext) -> Result<Router, ProcessError> {
        info!(grpc_endpoint = %ctx.grpc_endpoint, "Registering hello routes");
        Ok(router.route("/v1/hello", get(|| async { "hello from flare" })))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env("APP")?;
    init_tracing(&config.log_level);

    let heartbeat = SpawnProcess::new("heartbeat", |ctx: Context| async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = ctx.done() => return Ok(()),
                _ = ticker.tick() => info!("💓 heartbeat"),
            }
        }
    });

    Server::builder()
        .with_config(config)
        .with_service(Arc::new(HelloService))
        .with_grpc_interceptor(LoggingInterceptor::new().into_interceptor())
        .with_process(Arc::new(heartbeat))
        .with_telemetry()
        .build()?
        .run(Context::with_shutdown_signals())
        .await?;

    Ok(())
}
