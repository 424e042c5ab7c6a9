//! Serviços externos consumidos pela camada de persistência
//!
//! A detecção de tumores e o login de médicos são opacos: aqui ficam
//! apenas os contratos e os tipos trocados com eles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{DetectionBox, DoctorInfo};

#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("Serviço indisponível: {0}")]
    Unavailable(String),

    #[error("Requisição recusada: {0}")]
    Rejected(String),

    #[error("Resposta inválida do serviço: {0}")]
    InvalidResponse(String),
}

/// Imagem enviada para detecção
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub patient_id: Option<Uuid>,
}

/// Par de credenciais aceito pelo serviço de login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub crm: String,
    pub uf: String,
}

/// Médico autenticado
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorSession {
    pub name: String,
    pub crm: String,
    pub uf: String,
    pub specialty: Option<String>,
    pub registered_at: Option<String>,
    pub status: Option<String>,
    #[serde(skip_serializing, default)]
    pub access_token: String,
}

impl From<&DoctorSession> for DoctorInfo {
    fn from(session: &DoctorSession) -> Self {
        DoctorInfo {
            name: session.name.clone(),
            crm: session.crm.clone(),
            uf: session.uf.clone(),
            specialty: session.specialty.clone(),
        }
    }
}

#[async_trait]
pub trait DetectionService: Send + Sync {
    /// Envia a imagem e devolve as caixas na ordem recebida
    async fn detect(&self, upload: ImageUpload) -> Result<Vec<DetectionBox>, CollaboratorError>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, credentials: Credentials) -> Result<DoctorSession, CollaboratorError>;
}
