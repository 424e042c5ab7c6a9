//! Vision Bridge - programa principal

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vision_bridge::config::BridgeConfig;
use vision_bridge::server;

#[tokio::main]
async fn main() -> Result<()> {
    let config = BridgeConfig::parse();

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Iniciando vision-bridge {}", server::built_info::PKG_VERSION);
    info!("  Escuta: {}", config.listen);
    info!("  Backend: {:?}", config.backend);

    let state = vision_bridge::build_state(&config).await?;
    let app = server::router(state, config.max_body_bytes());

    if let Err(e) = server::serve(config.listen, app).await {
        error!("Servidor falhou: {:#}", e);
        return Err(e);
    }

    Ok(())
}
