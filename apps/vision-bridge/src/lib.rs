//! Vision Bridge - serviço HTTP do painel de análise de imagens
//!
//! Expõe o histórico local de análises, o cadastro de pacientes e as
//! estatísticas derivadas, e repassa imagens e credenciais aos serviços
//! externos de detecção e login.

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod session;
pub mod upstream;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use vision_db::VisionContext;

use config::BridgeConfig;
use server::{AppState, SharedState};
use session::SessionState;
use upstream::{HttpAuthClient, HttpDetectionClient};

/// Abre a persistência e os clientes externos conforme a configuração
pub async fn build_state(config: &BridgeConfig) -> Result<SharedState> {
    let context = VisionContext::open(&config.db_config())
        .await
        .context("Falha ao abrir a persistência local")?;

    let detector = HttpDetectionClient::new(&config.detector_url, config.upstream_timeout())
        .context("Falha ao criar cliente do serviço de detecção")?;
    let auth = HttpAuthClient::new(&config.auth_url, config.upstream_timeout())
        .context("Falha ao criar cliente do serviço de login")?;

    let session = SessionState::open(config.session_path());

    info!("Serviço de detecção: {}", config.detector_url);
    info!("Serviço de login: {}", config.auth_url);

    Ok(AppState::new(context, session, Arc::new(detector), Arc::new(auth), config.stats_days))
}
