//! Histórico de análises
//!
//! Mantém o conjunto de trabalho em memória (mais recente primeiro)
//! sincronizado com o armazenamento durável. A memória só muda depois
//! que o armazenamento confirma a escrita.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::{AnalysisEntry, NewAnalysisEntry};
use crate::notices::NoticeBoard;
use crate::storage::RecordStore;

/// Instantâneo imutável do histórico
pub type HistorySnapshot = Arc<Vec<AnalysisEntry>>;

pub struct HistoryStore {
    store: Arc<dyn RecordStore<AnalysisEntry>>,
    notices: NoticeBoard,
    state: watch::Sender<HistorySnapshot>,
    // um escritor por vez
    writer: Mutex<()>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn RecordStore<AnalysisEntry>>, notices: NoticeBoard) -> Self {
        let (state, _) = watch::channel(Arc::new(Vec::new()));
        Self { store, notices, state, writer: Mutex::new(()) }
    }

    /// Carrega todos os registros persistidos, mais recente primeiro.
    ///
    /// Falha de leitura não é fatal: o histórico fica vazio e um aviso
    /// de erro é publicado.
    pub async fn load(&self) -> HistorySnapshot {
        let _writer = self.writer.lock().await;

        let entries = match self.store.load_all().await {
            Ok(mut entries) => {
                entries.reverse();
                // estável: empates mantêm a inserção mais nova na frente
                entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                info!("Histórico carregado: {} análises", entries.len());
                entries
            }
            Err(e) => {
                error!("Erro ao carregar histórico: {}", e);
                self.notices.error("Não foi possível carregar o histórico de análises");
                Vec::new()
            }
        };

        let snapshot = Arc::new(entries);
        self.state.send_replace(snapshot.clone());
        snapshot
    }

    /// Registra uma análise concluída.
    ///
    /// Gera id e timestamp, grava no armazenamento e só então insere no
    /// início do conjunto em memória.
    pub async fn add(&self, new: NewAnalysisEntry) -> DbResult<AnalysisEntry> {
        let _writer = self.writer.lock().await;
        let current = self.entries();

        let known: HashSet<Uuid> = current.iter().map(|e| e.id).collect();
        let mut id = Uuid::new_v4();
        while known.contains(&id) {
            id = Uuid::new_v4();
        }

        let newest = current.first().map(|e| e.timestamp).unwrap_or(i64::MIN);
        let timestamp = Utc::now().timestamp_millis().max(newest);
        let entry = AnalysisEntry::from_new(id, timestamp, new);

        if let Err(e) = self.store.insert(&entry).await {
            error!("Erro ao salvar análise {}: {}", entry.file_name, e);
            self.notices.error("Erro ao salvar a análise no histórico");
            return Err(e);
        }

        let mut entries = Vec::with_capacity(current.len() + 1);
        entries.push(entry.clone());
        entries.extend(current.iter().cloned());
        self.state.send_replace(Arc::new(entries));

        info!("Análise {} adicionada ao histórico ({} detecções)", entry.id, entry.detections.len());
        Ok(entry)
    }

    /// Apaga todo o histórico, no armazenamento e em memória
    pub async fn clear(&self) -> DbResult<()> {
        let _writer = self.writer.lock().await;

        if let Err(e) = self.store.clear().await {
            error!("Erro ao limpar histórico: {}", e);
            self.notices.error("Erro ao limpar o histórico");
            return Err(e);
        }

        self.state.send_replace(Arc::new(Vec::new()));
        info!("Histórico apagado");
        self.notices.success("Histórico limpo com sucesso");
        Ok(())
    }

    /// Conjunto de trabalho atual
    pub fn entries(&self) -> HistorySnapshot {
        self.state.borrow().clone()
    }

    pub fn get(&self, id: Uuid) -> Option<AnalysisEntry> {
        self.state.borrow().iter().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recebe um novo instantâneo a cada alteração
    pub fn subscribe(&self) -> watch::Receiver<HistorySnapshot> {
        self.state.subscribe()
    }
}
