//! Armazenamento durável de registros
//!
//! Dois backends atendem ao mesmo contrato:
//! - `SqliteStore`: um registro por linha, assíncrono (sqlx)
//! - `JsonFileStore`: um documento JSON por coleção, síncrono

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DbResult;

mod json_file;
mod sqlite;

pub use json_file::{JsonFileStore, HISTORY_KEY, PATIENTS_KEY};
pub use sqlite::SqliteStore;

/// Contrato de um armazenamento chave-valor indexado por `id`
#[async_trait]
pub trait RecordStore<T>: Send + Sync {
    /// Lê todos os registros na ordem de inserção
    async fn load_all(&self) -> DbResult<Vec<T>>;

    /// Grava um registro novo; id repetido é violação de restrição
    async fn insert(&self, record: &T) -> DbResult<()>;

    /// Substitui um registro existente com o mesmo id
    async fn replace(&self, record: &T) -> DbResult<()>;

    async fn delete(&self, id: Uuid) -> DbResult<()>;

    /// Remove todos os registros da coleção
    async fn clear(&self) -> DbResult<()>;
}

#[cfg(test)]
pub(crate) mod contract {
    //! Comportamento comum exigido de qualquer backend

    use super::RecordStore;
    use crate::error::DbError;
    use crate::models::{AnalysisEntry, DetectionBox, NewAnalysisEntry, Patient, PatientForm};
    use chrono::Utc;
    use uuid::Uuid;

    pub fn entry(file_name: &str, timestamp: i64) -> AnalysisEntry {
        AnalysisEntry::from_new(
            Uuid::new_v4(),
            timestamp,
            NewAnalysisEntry {
                image_url: format!("data:image/png;base64,{}", file_name),
                file_name: file_name.to_string(),
                detections: vec![DetectionBox {
                    x1: 1.0,
                    y1: 2.0,
                    x2: 30.0,
                    y2: 40.0,
                    label: "glioma 90%".to_string(),
                }],
                patient_id: Some(Uuid::new_v4()),
                patient_name: Some("Paciente Teste".to_string()),
                ..Default::default()
            },
        )
    }

    pub fn patient(name: &str) -> Patient {
        Patient::from_form(
            Uuid::new_v4(),
            PatientForm { name: name.to_string(), age: Some(50), ..Default::default() },
            Utc::now(),
        )
    }

    pub async fn history_contract(store: &dyn RecordStore<AnalysisEntry>) {
        let first = entry("a.png", 1_000);
        let second = entry("b.png", 2_000);

        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded, vec![first.clone(), second.clone()]);

        let duplicate = store.insert(&first).await;
        assert!(matches!(duplicate, Err(DbError::ConstraintViolation(_))));

        store.clear().await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    pub async fn patient_contract(store: &dyn RecordStore<Patient>) {
        let ana = patient("Ana");
        let bruno = patient("Bruno");
        store.insert(&ana).await.unwrap();
        store.insert(&bruno).await.unwrap();

        let mut edited = ana.clone();
        edited.name = "Ana Lima".to_string();
        store.replace(&edited).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "Ana Lima");
        assert_eq!(loaded[1].id, bruno.id);

        store.delete(bruno.id).await.unwrap();
        assert!(matches!(store.delete(bruno.id).await, Err(DbError::NotFound(_))));
        assert!(matches!(store.replace(&bruno).await, Err(DbError::NotFound(_))));

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded, vec![edited]);
    }
}
