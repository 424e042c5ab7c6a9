//! Sistema de migrações para banco de dados
//!
//! Este módulo gerencia as migrações do banco de dados SQLite

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{error, info};

/// Lista de migrações SQL a serem aplicadas
pub(crate) const MIGRATIONS: &[&str] = &[
    // 001_analysis_history.sql
    r#"
    -- Histórico de análises, um registro por análise
    CREATE TABLE IF NOT EXISTS analysis_history (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        timestamp INTEGER NOT NULL,
        image_url TEXT NOT NULL,
        image_with_detections TEXT,
        file_name TEXT NOT NULL,
        detections TEXT NOT NULL DEFAULT '[]', -- JSON com as caixas detectadas
        patient_id TEXT, -- referência fraca, sem FOREIGN KEY
        patient_name TEXT,
        doctor_name TEXT,
        doctor_crm TEXT,
        doctor_uf TEXT,
        doctor_specialty TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_analysis_history_timestamp ON analysis_history (timestamp);
    CREATE INDEX IF NOT EXISTS idx_analysis_history_patient_id ON analysis_history (patient_id);
    "#,

    // 002_patients.sql
    r#"
    -- Cadastro de pacientes, ciclo de vida independente do histórico
    CREATE TABLE IF NOT EXISTS patients (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        age INTEGER,
        gender TEXT,
        birthdate DATE,
        record_number TEXT,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_patients_record_number ON patients (record_number);
    "#,
];

/// Executa todas as migrações pendentes no banco de dados
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Aplicando migrações de banco de dados...");

    // Obter a versão atual do banco de dados
    let mut version: i64 = 0;
    match sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
    {
        Ok(v) => version = v,
        Err(e) => {
            error!("Erro ao obter versão do banco: {}", e);
        }
    }

    info!("Versão atual do banco: {}", version);

    for (i, migration_sql) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as i64;

        if migration_version <= version {
            info!("Migração {} já aplicada", migration_version);
            continue;
        }

        info!("Aplicando migração {}...", migration_version);

        let mut transaction = pool.begin().await
            .context(format!("Falha ao iniciar transação para migração {}", migration_version))?;

        sqlx::query(migration_sql)
            .execute(&mut *transaction)
            .await
            .context(format!("Falha ao executar migração {}", migration_version))?;

        sqlx::query(&format!("PRAGMA user_version = {}", migration_version))
            .execute(&mut *transaction)
            .await
            .context(format!("Falha ao atualizar versão para {}", migration_version))?;

        transaction.commit().await
            .context(format!("Falha ao confirmar transação para migração {}", migration_version))?;

        info!("Migração {} aplicada com sucesso", migration_version);
    }

    info!("Migrações concluídas. Versão atual: {}", MIGRATIONS.len());
    Ok(())
}
