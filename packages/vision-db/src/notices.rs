//! Avisos não fatais exibidos ao usuário
//!
//! Toda falha recuperável da camada de persistência termina aqui e é
//! publicada para quem estiver exibindo avisos. O detalhe da falha vai
//! para o log em quem a detectou; aqui o aviso só aparece em `debug`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Quantidade de avisos recentes mantidos para consulta
const RECENT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoticeLevel::Success => write!(f, "success"),
            NoticeLevel::Info => write!(f, "info"),
            NoticeLevel::Warning => write!(f, "warning"),
            NoticeLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Quadro de avisos compartilhado
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    sender: broadcast::Sender<Notice>,
    recent: Arc<Mutex<VecDeque<Notice>>>,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeBoard {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(RECENT_CAPACITY);
        Self {
            sender,
            recent: Arc::new(Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY))),
        }
    }

    pub fn post(&self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice { level, message: message.into(), at: Utc::now() };

        debug!("Aviso [{}]: {}", level, notice.message);

        if let Ok(mut recent) = self.recent.lock() {
            if recent.len() == RECENT_CAPACITY {
                recent.pop_front();
            }
            recent.push_back(notice.clone());
        }
        // sem assinantes o envio falha, e tudo bem
        let _ = self.sender.send(notice);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.post(NoticeLevel::Success, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.post(NoticeLevel::Info, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.post(NoticeLevel::Error, message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    /// Avisos mais recentes, do mais antigo para o mais novo
    pub fn recent(&self) -> Vec<Notice> {
        self.recent
            .lock()
            .map(|recent| recent.iter().cloned().collect())
            .unwrap_or_default()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_notices() {
        let board = NoticeBoard::new();
        let mut rx = board.subscribe();

        board.error("Falha ao gravar análise");

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "Falha ao gravar análise");
    }

    #[test]
    fn test_recent_is_bounded() {
        let board = NoticeBoard::new();
        for i in 0..(RECENT_CAPACITY + 5) {
            board.info(format!("aviso {}", i));
        }

        let recent = board.recent();
        assert_eq!(recent.len(), RECENT_CAPACITY);
        assert_eq!(recent[0].message, "aviso 5");
        assert_eq!(recent.last().unwrap().message, format!("aviso {}", RECENT_CAPACITY + 4));
    }

    #[test]
    fn test_error_notice_is_not_logged_as_error() {
        let log = error_log::capture();
        let board = NoticeBoard::new();

        board.error("Erro ao salvar a análise no histórico");

        assert_eq!(log.count(), 0);
        assert_eq!(board.recent().len(), 1);
    }
}
