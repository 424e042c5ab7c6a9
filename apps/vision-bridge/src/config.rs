//! Configuração do serviço (linha de comando ou variáveis de ambiente)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use vision_db::{DbConfig, StorageBackend};

/// Maior janela aceita para as estatísticas, em dias
pub const MAX_WINDOW_DAYS: u32 = 366;

/// Ponte entre o painel e o histórico local de análises
#[derive(Parser, Debug, Clone)]
#[command(name = "vision-bridge")]
#[command(about = "Serviço do painel de detecção de tumores")]
pub struct BridgeConfig {
    /// Endereço de escuta
    #[arg(long, env = "VISION_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// Backend de armazenamento (sqlite ou json)
    #[arg(long, env = "VISION_BACKEND", default_value = "sqlite")]
    pub backend: StorageBackend,

    /// Arquivo SQLite
    #[arg(long, env = "VISION_DB_PATH", default_value = "data/tumor_vision.db")]
    pub db_path: String,

    /// Diretório das coleções JSON
    #[arg(long, env = "VISION_DATA_DIR", default_value = "data")]
    pub data_dir: String,

    /// URL base do serviço de detecção
    #[arg(long, env = "VISION_DETECTOR_URL", default_value = "http://localhost:8000")]
    pub detector_url: String,

    /// URL base do serviço de login
    #[arg(long, env = "VISION_AUTH_URL", default_value = "http://localhost:8000")]
    pub auth_url: String,

    /// Tempo máximo de espera pelos serviços externos, em segundos
    #[arg(long, env = "VISION_UPSTREAM_TIMEOUT", default_value_t = 60)]
    pub upstream_timeout_secs: u64,

    /// Dias da janela das estatísticas diárias
    #[arg(
        long,
        env = "VISION_STATS_DAYS",
        default_value_t = 7,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_WINDOW_DAYS))
    )]
    pub stats_days: u32,

    /// Tamanho máximo do corpo das requisições, em MB
    #[arg(long, env = "VISION_MAX_BODY_MB", default_value_t = 25)]
    pub max_body_mb: usize,

    /// Nível de log
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Logs em JSON
    #[arg(long, env = "VISION_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl BridgeConfig {
    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            backend: self.backend,
            db_path: self.db_path.clone(),
            data_dir: self.data_dir.clone(),
            ..Default::default()
        }
    }

    /// Arquivo onde o médico conectado é lembrado entre reinícios
    pub fn session_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("session.json")
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb * 1024 * 1024
    }
}
