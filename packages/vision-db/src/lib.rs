//! Vision DB - Persistência local do histórico de análises
//!
//! Esta biblioteca fornece:
//! - Modelos de análises, detecções e pacientes
//! - Armazenamento durável com dois backends (SQLite e arquivo JSON)
//! - Histórico em memória sincronizado com o armazenamento
//! - Cadastro de pacientes
//! - Visões derivadas para estatísticas
//! - Contratos dos serviços externos de detecção e login

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

pub mod collaborators;
pub mod error;
pub mod history;
pub mod migrations;
pub mod models;
pub mod notices;
pub mod patients;
pub mod storage;
pub mod views;

pub use error::{DbError, DbResult};
pub use history::HistoryStore;
pub use notices::{Notice, NoticeBoard, NoticeLevel};
pub use patients::PatientRegistry;

use models::{AnalysisEntry, Patient};
use storage::{JsonFileStore, RecordStore, SqliteStore};

/// Backend de armazenamento durável
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Um registro por linha em SQLite
    Sqlite,
    /// Um documento JSON por coleção
    JsonFile,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "json" | "json_file" => Ok(StorageBackend::JsonFile),
            other => Err(format!("Backend desconhecido: {}", other)),
        }
    }
}

/// Configuração da persistência
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub backend: StorageBackend,
    /// Caminho para o arquivo SQLite
    pub db_path: String,
    /// Diretório das coleções JSON
    pub data_dir: String,
    /// Número máximo de conexões no pool
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            db_path: "data/tumor_vision.db".to_string(),
            data_dir: "data".to_string(),
            max_connections: 5,
        }
    }
}

/// Inicializa uma conexão com o banco de dados SQLite
pub async fn init_db_pool(config: &DbConfig) -> Result<SqlitePool> {
    let db_path = Path::new(&config.db_path);

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .context("Falha ao criar diretório para banco de dados")?;
        }
    }

    let connection_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .pragma("synchronous", "NORMAL");

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connection_options)
        .await
        .context("Falha ao conectar ao banco de dados SQLite")?;

    migrations::run_migrations(&pool).await
        .context("Falha ao aplicar migrações")?;

    info!("Banco de dados inicializado com sucesso: {}", config.db_path);
    Ok(pool)
}

/// Contexto único da sessão: histórico, pacientes e avisos.
///
/// Construído uma vez na inicialização, já com as coleções carregadas.
pub struct VisionContext {
    pub history: HistoryStore,
    pub patients: PatientRegistry,
    pub notices: NoticeBoard,
}

impl VisionContext {
    /// Abre o backend configurado e carrega as coleções
    pub async fn open(config: &DbConfig) -> Result<Self> {
        let (history_store, patient_store): (
            Arc<dyn RecordStore<AnalysisEntry>>,
            Arc<dyn RecordStore<Patient>>,
        ) = match config.backend {
            StorageBackend::Sqlite => {
                let store = Arc::new(SqliteStore::new(init_db_pool(config).await?));
                (store.clone() as Arc<dyn RecordStore<AnalysisEntry>>, store as Arc<dyn RecordStore<Patient>>)
            }
            StorageBackend::JsonFile => {
                let history = JsonFileStore::<AnalysisEntry>::open(&config.data_dir, storage::HISTORY_KEY)
                    .context("Falha ao abrir histórico em arquivo")?;
                let patients = JsonFileStore::<Patient>::open(&config.data_dir, storage::PATIENTS_KEY)
                    .context("Falha ao abrir cadastro em arquivo")?;
                info!("Histórico em arquivo: {}", history.path().display());
                (
                    Arc::new(history) as Arc<dyn RecordStore<AnalysisEntry>>,
                    Arc::new(patients) as Arc<dyn RecordStore<Patient>>,
                )
            }
        };

        Ok(Self::load(history_store, patient_store, NoticeBoard::new()).await)
    }

    /// Monta o contexto sobre armazenamentos já abertos e carrega tudo
    pub async fn load(
        history_store: Arc<dyn RecordStore<AnalysisEntry>>,
        patient_store: Arc<dyn RecordStore<Patient>>,
        notices: NoticeBoard,
    ) -> Self {
        let history = HistoryStore::new(history_store, notices.clone());
        let patients = PatientRegistry::new(patient_store, notices.clone());
        history.load().await;
        patients.load().await;

        info!(
            "Contexto pronto: {} análises, {} pacientes",
            history.len(),
            patients.list().len()
        );
        Self { history, patients, notices }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{NewAnalysisEntry, PatientForm};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_db_connection() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test.db");

        let config = DbConfig {
            db_path: db_path.to_str().unwrap().to_string(),
            max_connections: 2,
            ..Default::default()
        };

        let pool = init_db_pool(&config).await?;

        let result: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await?;

        assert_eq!(result.0, 1);

        Ok(())
    }

    async fn roundtrip(config: DbConfig) -> Result<()> {
        let context = VisionContext::open(&config).await?;
        let patient = context
            .patients
            .add(PatientForm { name: "Rita".to_string(), ..Default::default() })
            .await?;
        context
            .history
            .add(NewAnalysisEntry {
                image_url: "blob:1".to_string(),
                file_name: "rm.png".to_string(),
                patient_id: Some(patient.id),
                patient_name: Some(patient.name.clone()),
                ..Default::default()
            })
            .await?;
        drop(context);

        let reopened = VisionContext::open(&config).await?;
        assert_eq!(reopened.history.len(), 1);
        assert_eq!(*reopened.patients.list(), vec![patient]);
        Ok(())
    }

    #[tokio::test]
    async fn test_context_sqlite_backend() -> Result<()> {
        let temp_dir = tempdir()?;
        roundtrip(DbConfig {
            db_path: temp_dir.path().join("ctx.db").to_str().unwrap().to_string(),
            max_connections: 2,
            ..Default::default()
        })
        .await
    }

    #[tokio::test]
    async fn test_context_json_backend() -> Result<()> {
        let temp_dir = tempdir()?;
        roundtrip(DbConfig {
            backend: StorageBackend::JsonFile,
            data_dir: temp_dir.path().to_str().unwrap().to_string(),
            ..Default::default()
        })
        .await
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("sqlite".parse::<StorageBackend>(), Ok(StorageBackend::Sqlite));
        assert_eq!("json".parse::<StorageBackend>(), Ok(StorageBackend::JsonFile));
        assert!("redis".parse::<StorageBackend>().is_err());
    }
}
