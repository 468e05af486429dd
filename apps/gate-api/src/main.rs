//! 门禁 HTTP API：设备接入、通行校验与运维接口。

mod handlers;
mod middleware;
mod routes;
mod state;
mod utils;


use gate_config::AppConfig;
use gate_telemetry::init_tracing;
use tracing::info;

pub use state::{AppState, Stores};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let stores = Stores::from_config(&config).await?;
    info!(
        target: "gate.api",
        postgres = config.database_url.is_some(),
        redis = config.redis_url.is_some(),
        emergency_code_configured = config.emergency_code.is_some(),
        "stores_ready"
    );
    let state = AppState::build(&config, stores);
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "gate.api", addr = %config.http_addr, "server_listening");
    axum::serve(listener, app).await?;
    Ok(())
}
