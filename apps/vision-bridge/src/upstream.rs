//! Clientes HTTP dos serviços de detecção e de login

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vision_db::collaborators::{
    AuthService, CollaboratorError, Credentials, DetectionService, DoctorSession, ImageUpload,
};
use vision_db::models::DetectionBox;

/// Cabeçalho exigido quando o serviço está atrás de um túnel ngrok
const NGROK_SKIP_WARNING: &str = "ngrok-skip-browser-warning";

fn build_client(timeout: Duration) -> Result<Client, CollaboratorError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CollaboratorError::Unavailable(e.to_string()))
}

fn unavailable(e: reqwest::Error) -> CollaboratorError {
    if e.is_timeout() {
        CollaboratorError::Unavailable("tempo de resposta esgotado".to_string())
    } else {
        CollaboratorError::Unavailable(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    detections: Vec<DetectionBox>,
}

/// Cliente do serviço de inferência (`POST /upload/`)
#[derive(Debug, Clone)]
pub struct HttpDetectionClient {
    client: Client,
    base_url: String,
}

impl HttpDetectionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DetectionService for HttpDetectionClient {
    async fn detect(&self, upload: ImageUpload) -> Result<Vec<DetectionBox>, CollaboratorError> {
        let url = format!("{}/upload/", self.base_url);
        let file_name = upload.file_name.clone();

        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;
        let mut form = Form::new().part("file", part);
        if let Some(patient_id) = upload.patient_id {
            form = form.text("patient_id", patient_id.to_string());
        }

        debug!("Enviando {} para {}", file_name, url);
        let response = self
            .client
            .post(&url)
            .header(NGROK_SKIP_WARNING, "true")
            .multipart(form)
            .send()
            .await
            .map_err(unavailable)?;

        let response = check_status(response).await?;
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        info!("{} detecções recebidas para {}", body.detections.len(), file_name);
        Ok(body.detections)
    }
}

async fn check_status(response: Response) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("Serviço respondeu {}: {}", status, body);
    if status.is_client_error() {
        Err(CollaboratorError::Rejected(format!("Erro na requisição: {}", status.as_u16())))
    } else {
        Err(CollaboratorError::Unavailable(format!("Erro na requisição: {}", status.as_u16())))
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    crm: &'a str,
    uf: &'a str,
}

/// Registro do médico como devolvido pelo serviço de login
#[derive(Debug, Deserialize)]
struct DoctorRecord {
    #[serde(rename = "NM_MEDICO")]
    name: String,
    #[serde(rename = "NU_CRM")]
    crm: String,
    #[serde(rename = "SG_UF")]
    uf: String,
    #[serde(rename = "ESPECIALIDADE", default)]
    specialty: Option<String>,
    #[serde(rename = "DT_INSCRICAO", default)]
    registered_at: Option<String>,
    #[serde(rename = "SITUACAO", default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    medico: DoctorRecord,
}

#[derive(Debug, Deserialize)]
struct LoginFailure {
    mensagem: Option<String>,
}

/// Cliente do serviço de login (`POST /login`)
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    client: Client,
    base_url: String,
}

impl HttpAuthClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AuthService for HttpAuthClient {
    async fn login(&self, credentials: Credentials) -> Result<DoctorSession, CollaboratorError> {
        let url = format!("{}/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(NGROK_SKIP_WARNING, "true")
            .json(&LoginRequest { crm: &credentials.crm, uf: &credentials.uf })
            .send()
            .await
            .map_err(|e| {
                warn!("Erro ao conectar com o serviço de login: {}", e);
                CollaboratorError::Unavailable("Erro ao conectar com o servidor".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let failure = response.json::<LoginFailure>().await.ok();
            let reason = failure
                .and_then(|f| f.mensagem)
                .unwrap_or_else(|| "Erro ao fazer login".to_string());
            return Err(if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                CollaboratorError::Unavailable(reason)
            } else {
                CollaboratorError::Rejected(reason)
            });
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        info!("Login realizado: CRM {}/{}", body.medico.crm, body.medico.uf);
        Ok(DoctorSession {
            name: body.medico.name,
            crm: body.medico.crm,
            uf: body.medico.uf,
            specialty: body.medico.specialty,
            registered_at: body.medico.registered_at,
            status: body.medico.status,
            access_token: body.access_token,
        })
    }
}
