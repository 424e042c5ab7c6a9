//! Backend SQLite: um registro por linha, indexado por `id`

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use super::RecordStore;
use crate::error::{DbError, DbResult};
use crate::models::{AnalysisEntry, Patient};

/// Armazenamento assíncrono sobre um pool SQLite já migrado
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ensure_affected(rows: u64, what: &str, id: Uuid) -> DbResult<()> {
    if rows == 0 {
        return Err(DbError::NotFound(format!("{} {}", what, id)));
    }
    Ok(())
}

#[async_trait]
impl RecordStore<AnalysisEntry> for SqliteStore {
    async fn load_all(&self) -> DbResult<Vec<AnalysisEntry>> {
        let entries = sqlx::query_as::<_, AnalysisEntry>(
            "SELECT id, timestamp, image_url, image_with_detections, file_name, detections,
             patient_id, patient_name, doctor_name, doctor_crm, doctor_uf, doctor_specialty
             FROM analysis_history ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        debug!("{} análises lidas do SQLite", entries.len());
        Ok(entries)
    }

    async fn insert(&self, entry: &AnalysisEntry) -> DbResult<()> {
        let doctor = entry.doctor_info.as_ref();
        sqlx::query(
            "INSERT INTO analysis_history (id, timestamp, image_url, image_with_detections, file_name,
             detections, patient_id, patient_name, doctor_name, doctor_crm, doctor_uf, doctor_specialty)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(entry.id.to_string())
        .bind(entry.timestamp)
        .bind(&entry.image_url)
        .bind(&entry.image_with_detections)
        .bind(&entry.file_name)
        .bind(Json(&entry.detections))
        .bind(entry.patient_id.map(|id| id.to_string()))
        .bind(&entry.patient_name)
        .bind(doctor.map(|d| d.name.clone()))
        .bind(doctor.map(|d| d.crm.clone()))
        .bind(doctor.map(|d| d.uf.clone()))
        .bind(doctor.and_then(|d| d.specialty.clone()))
        .execute(&self.pool)
        .await?;

        debug!("Análise {} gravada", entry.id);
        Ok(())
    }

    async fn replace(&self, _entry: &AnalysisEntry) -> DbResult<()> {
        Err(DbError::ConstraintViolation(
            "análises não podem ser alteradas depois de gravadas".to_string(),
        ))
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM analysis_history WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "Análise", id)
    }

    async fn clear(&self) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM analysis_history")
            .execute(&self.pool)
            .await?;
        debug!("{} análises removidas", result.rows_affected());
        Ok(())
    }
}

#[async_trait]
impl RecordStore<Patient> for SqliteStore {
    async fn load_all(&self) -> DbResult<Vec<Patient>> {
        let patients = sqlx::query_as::<_, Patient>(
            "SELECT id, name, age, gender, birthdate, record_number, created_at, updated_at
             FROM patients ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(patients)
    }

    async fn insert(&self, patient: &Patient) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO patients (id, name, age, gender, birthdate, record_number, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(patient.id.to_string())
        .bind(&patient.name)
        .bind(patient.age.map(i64::from))
        .bind(&patient.gender)
        .bind(patient.birthdate)
        .bind(&patient.record_number)
        .bind(patient.created_at)
        .bind(patient.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace(&self, patient: &Patient) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE patients SET name = ?2, age = ?3, gender = ?4, birthdate = ?5,
             record_number = ?6, created_at = ?7, updated_at = ?8 WHERE id = ?1",
        )
        .bind(patient.id.to_string())
        .bind(&patient.name)
        .bind(patient.age.map(i64::from))
        .bind(&patient.gender)
        .bind(patient.birthdate)
        .bind(&patient.record_number)
        .bind(patient.created_at)
        .bind(patient.updated_at)
        .execute(&self.pool)
        .await?;
        ensure_affected(result.rows_affected(), "Paciente", patient.id)
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM patients WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "Paciente", id)
    }

    async fn clear(&self) -> DbResult<()> {
        sqlx::query("DELETE FROM patients").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::contract;
    use crate::{init_db_pool, DbConfig};
    use tempfile::{tempdir, TempDir};

    async fn store() -> (TempDir, SqliteStore) {
        let temp_dir = tempdir().unwrap();
        let config = DbConfig {
            db_path: temp_dir.path().join("vision.db").to_str().unwrap().to_string(),
            max_connections: 2,
            ..Default::default()
        };
        let pool = init_db_pool(&config).await.unwrap();
        (temp_dir, SqliteStore::new(pool))
    }

    #[tokio::test]
    async fn test_history_contract() {
        let (_dir, store) = store().await;
        contract::history_contract(&store).await;
    }

    #[tokio::test]
    async fn test_patient_contract() {
        let (_dir, store) = store().await;
        contract::patient_contract(&store).await;
    }

    #[tokio::test]
    async fn test_entries_keep_doctor_snapshot() {
        let (_dir, store) = store().await;
        let mut entry = contract::entry("doc.png", 5_000);
        entry.doctor_info = Some(crate::models::DoctorInfo {
            name: "Dra. Helena".to_string(),
            crm: "123456".to_string(),
            uf: "SP".to_string(),
            specialty: None,
        });
        RecordStore::<AnalysisEntry>::insert(&store, &entry).await.unwrap();

        let loaded = RecordStore::<AnalysisEntry>::load_all(&store).await.unwrap();
        assert_eq!(loaded, vec![entry]);
    }

    #[tokio::test]
    async fn test_entries_are_immutable() {
        let (_dir, store) = store().await;
        let entry = contract::entry("x.png", 1);
        RecordStore::<AnalysisEntry>::insert(&store, &entry).await.unwrap();
        let result = RecordStore::<AnalysisEntry>::replace(&store, &entry).await;
        assert!(matches!(result, Err(DbError::ConstraintViolation(_))));
    }
}
