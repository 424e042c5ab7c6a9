//! Backend de chave única: a coleção inteira é um documento JSON
//!
//! Corresponde ao armazenamento síncrono por chave de texto. Cada coleção
//! fica em `<data_dir>/<key>.json` e é regravada por completo a cada
//! alteração (arquivo temporário + rename).

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::RecordStore;
use crate::error::{DbError, DbResult};
use crate::models::Record;

/// Chave do histórico de análises
pub const HISTORY_KEY: &str = "analysisHistory";
/// Chave do cadastro de pacientes
pub const PATIENTS_KEY: &str = "patients";

pub struct JsonFileStore<T> {
    path: PathBuf,
    // serializa leitura-modificação-escrita do arquivo
    lock: Mutex<()>,
    _records: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T>
where
    T: Record + Serialize + DeserializeOwned,
{
    /// Abre (ou prepara) a coleção `key` dentro de `data_dir`
    pub fn open(data_dir: impl AsRef<Path>, key: &str) -> DbResult<Self> {
        let data_dir = data_dir.as_ref();
        if !data_dir.exists() {
            fs::create_dir_all(data_dir)?;
        }
        Ok(Self {
            path: data_dir.join(format!("{}.json", key)),
            lock: Mutex::new(()),
            _records: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> DbResult<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let records = serde_json::from_reader(reader)?;
        Ok(records)
    }

    fn write(&self, records: &[T]) -> DbResult<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            serde_json::to_writer(&mut writer, records)?;
            writer.flush()?;
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            warn!("Falha ao substituir {}: {}", self.path.display(), e);
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        debug!("{} registros gravados em {}", records.len(), self.path.display());
        Ok(())
    }

    fn modify<F>(&self, change: F) -> DbResult<()>
    where
        F: FnOnce(&mut Vec<T>) -> DbResult<()>,
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| DbError::InternalError("lock do arquivo envenenado".to_string()))?;
        let mut records = self.read()?;
        change(&mut records)?;
        self.write(&records)
    }
}

fn position<T: Record>(records: &[T], id: Uuid) -> DbResult<usize> {
    records
        .iter()
        .position(|r| r.id() == id)
        .ok_or_else(|| DbError::NotFound(format!("Registro {}", id)))
}

#[async_trait]
impl<T> RecordStore<T> for JsonFileStore<T>
where
    T: Record + Serialize + DeserializeOwned,
{
    async fn load_all(&self) -> DbResult<Vec<T>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| DbError::InternalError("lock do arquivo envenenado".to_string()))?;
        self.read()
    }

    async fn insert(&self, record: &T) -> DbResult<()> {
        self.modify(|records| {
            if records.iter().any(|r| r.id() == record.id()) {
                return Err(DbError::ConstraintViolation(format!("id {} já existe", record.id())));
            }
            records.push(record.clone());
            Ok(())
        })
    }

    async fn replace(&self, record: &T) -> DbResult<()> {
        self.modify(|records| {
            let index = position(records, record.id())?;
            records[index] = record.clone();
            Ok(())
        })
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        self.modify(|records| {
            let index = position(records, id)?;
            records.remove(index);
            Ok(())
        })
    }

    async fn clear(&self) -> DbResult<()> {
        self.modify(|records| {
            records.clear();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisEntry, Patient};
    use crate::storage::contract;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_history_contract() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::<AnalysisEntry>::open(dir.path(), HISTORY_KEY).unwrap();
        contract::history_contract(&store).await;
    }

    #[tokio::test]
    async fn test_patient_contract() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::<Patient>::open(dir.path(), PATIENTS_KEY).unwrap();
        contract::patient_contract(&store).await;
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let entry = contract::entry("persistida.png", 42);
        {
            let store = JsonFileStore::<AnalysisEntry>::open(dir.path(), HISTORY_KEY).unwrap();
            store.insert(&entry).await.unwrap();
        }

        let reopened = JsonFileStore::<AnalysisEntry>::open(dir.path(), HISTORY_KEY).unwrap();
        assert_eq!(reopened.load_all().await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn test_corrupted_file_is_an_error() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::<AnalysisEntry>::open(dir.path(), HISTORY_KEY).unwrap();
        std::fs::write(store.path(), "{ invalid json }").unwrap();

        let result = store.load_all().await;
        assert!(matches!(result, Err(DbError::SerializationError(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::<Patient>::open(dir.path().join("novo"), PATIENTS_KEY).unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
