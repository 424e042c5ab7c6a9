//! Handlers HTTP

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use validator::{Validate, ValidationError};
use vision_db::collaborators::{CollaboratorError, Credentials, ImageUpload};
use vision_db::models::{AnalysisEntry, DetectionBox, NewAnalysisEntry, Patient, PatientForm};
use vision_db::views;
use vision_db::DbError;

use crate::config::MAX_WINDOW_DAYS;
use crate::error::{ApiError, ApiResult};
use crate::server::{built_info, SharedState};

/// Health check
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": built_info::PKG_VERSION,
        "rustc": built_info::RUSTC_VERSION,
        "analyses": state.context.history.len(),
        "patients": state.context.patients.list().len(),
    }))
}

// --- sessão ---

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(max = 20), custom = "not_blank")]
    pub crm: String,
    #[validate(length(min = 2, max = 2))]
    pub uf: String,
}

pub async fn login(
    State(state): State<SharedState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    request.validate()?;
    let credentials = Credentials {
        crm: request.crm.trim().to_string(),
        uf: request.uf.to_uppercase(),
    };

    match state.auth.login(credentials).await {
        Ok(doctor) => {
            info!("Médico {} ({}/{}) autenticado", doctor.name, doctor.crm, doctor.uf);
            state.session.login(doctor.clone());
            state.context.notices.success("Login realizado com sucesso");
            Ok(Json(doctor))
        }
        Err(CollaboratorError::Rejected(reason)) => {
            state.context.notices.error(reason.clone());
            Err(ApiError::LoginRejected(reason))
        }
        Err(e) => {
            state.context.notices.error(e.to_string());
            Err(e.into())
        }
    }
}

pub async fn logout(State(state): State<SharedState>) -> impl IntoResponse {
    if let Some(doctor) = state.session.logout() {
        info!("Sessão de {} encerrada", doctor.crm);
        state.context.notices.info("Logout realizado com sucesso");
    }
    StatusCode::NO_CONTENT
}

pub async fn current_session(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    state.session.current().map(Json).ok_or(ApiError::Unauthenticated)
}

// --- detecção ---

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    #[validate(custom = "not_blank")]
    pub file_name: String,
    /// Imagem como data URL em base64
    pub image_url: String,
    #[serde(default)]
    pub patient_id: Option<Uuid>,
}

/// Separa o tipo e os bytes de uma data URL `data:<mime>;base64,<dados>`
pub fn decode_data_url(url: &str) -> ApiResult<(String, Vec<u8>)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ApiError::BadRequest("imagem deve ser enviada como data URL".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ApiError::BadRequest("data URL sem conteúdo".to_string()))?;
    let content_type = meta
        .strip_suffix(";base64")
        .ok_or_else(|| ApiError::BadRequest("data URL deve estar em base64".to_string()))?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ApiError::BadRequest(format!("base64 inválido: {}", e)))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("imagem vazia".to_string()));
    }

    let content_type = if content_type.is_empty() {
        "application/octet-stream".to_string()
    } else {
        content_type.to_string()
    };
    Ok((content_type, bytes))
}

pub async fn detect(
    State(state): State<SharedState>,
    Json(request): Json<DetectRequest>,
) -> ApiResult<impl IntoResponse> {
    request.validate()?;
    let (content_type, bytes) = decode_data_url(&request.image_url)?;
    let upload = ImageUpload {
        file_name: request.file_name,
        content_type,
        bytes,
        patient_id: request.patient_id,
    };

    match state.detector.detect(upload).await {
        Ok(detections) => {
            info!("Detecção concluída: {} caixas", detections.len());
            state.context.notices.success("Análise concluída com sucesso");
            Ok(Json(json!({ "detections": detections })))
        }
        Err(e) => {
            state
                .context
                .notices
                .error("Erro ao processar a imagem. Verifique se o servidor está online.");
            Err(e.into())
        }
    }
}

// --- histórico ---

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(alias = "patient_id")]
    pub patient_id: Option<Uuid>,
    /// Início do intervalo, em milissegundos
    pub from: Option<i64>,
    pub to: Option<i64>,
}

pub async fn list_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<AnalysisEntry>> {
    let entries = state.context.history.entries();
    let selected = views::in_date_range(&entries, query.from, query.to)
        .into_iter()
        .filter(|e| query.patient_id.map_or(true, |id| e.patient_id == Some(id)))
        .cloned()
        .collect();
    Json(selected)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveAnalysisRequest {
    #[validate(custom = "not_blank")]
    pub file_name: String,
    #[validate(custom = "not_blank")]
    pub image_url: String,
    #[serde(default)]
    pub image_with_detections: Option<String>,
    #[serde(default)]
    pub detections: Vec<DetectionBox>,
    #[serde(default)]
    pub patient_id: Option<Uuid>,
}

pub async fn add_history(
    State(state): State<SharedState>,
    Json(request): Json<SaveAnalysisRequest>,
) -> ApiResult<impl IntoResponse> {
    request.validate()?;

    let patient_name = match request.patient_id {
        Some(id) => {
            let patient = state
                .context
                .patients
                .get(id)
                .ok_or_else(|| DbError::NotFound(format!("Paciente {}", id)))?;
            Some(patient.name)
        }
        None => None,
    };

    let entry = state
        .context
        .history
        .add(NewAnalysisEntry {
            image_url: request.image_url,
            image_with_detections: request.image_with_detections,
            file_name: request.file_name,
            detections: request.detections,
            patient_id: request.patient_id,
            patient_name,
            doctor_info: state.session.doctor_info(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn get_history_entry(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AnalysisEntry>> {
    state
        .context
        .history
        .get(id)
        .map(Json)
        .ok_or_else(|| DbError::NotFound(format!("Análise {}", id)).into())
}

pub async fn clear_history(State(state): State<SharedState>) -> ApiResult<StatusCode> {
    state.context.history.clear().await?;
    info!("Histórico apagado pela API");
    Ok(StatusCode::NO_CONTENT)
}

// --- pacientes ---

pub async fn list_patients(State(state): State<SharedState>) -> Json<Vec<Patient>> {
    Json(state.context.patients.list().as_ref().clone())
}

pub async fn create_patient(
    State(state): State<SharedState>,
    Json(form): Json<PatientForm>,
) -> ApiResult<impl IntoResponse> {
    let patient = state.context.patients.add(form).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn get_patient(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Patient>> {
    state
        .context
        .patients
        .get(id)
        .map(Json)
        .ok_or_else(|| DbError::NotFound(format!("Paciente {}", id)).into())
}

pub async fn update_patient(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(form): Json<PatientForm>,
) -> ApiResult<Json<Patient>> {
    Ok(Json(state.context.patients.update(id, form).await?))
}

pub async fn delete_patient(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Patient>> {
    Ok(Json(state.context.patients.remove(id).await?))
}

/// Análises do paciente; continua respondendo depois que ele é removido
pub async fn patient_analyses(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Json<Vec<AnalysisEntry>> {
    let entries = state.context.history.entries();
    Json(views::for_patient(&entries, id).into_iter().cloned().collect())
}

pub async fn select_patient(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Patient>> {
    Ok(Json(state.context.patients.select(id)?))
}

pub async fn current_patient(State(state): State<SharedState>) -> Json<Option<Patient>> {
    Json(state.context.patients.current())
}

// --- estatísticas ---

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

fn window(state: &SharedState, query: &WindowQuery) -> ApiResult<u32> {
    let days = query.days.unwrap_or(state.stats_days);
    if days == 0 || days > MAX_WINDOW_DAYS {
        return Err(ApiError::BadRequest(format!("days deve estar entre 1 e {}", MAX_WINDOW_DAYS)));
    }
    Ok(days)
}

pub async fn label_stats(State(state): State<SharedState>) -> impl IntoResponse {
    Json(views::label_frequencies(&state.context.history.entries()))
}

pub async fn class_stats(State(state): State<SharedState>) -> impl IntoResponse {
    Json(views::class_frequencies(&state.context.history.entries()))
}

pub async fn daily_stats(
    State(state): State<SharedState>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<impl IntoResponse> {
    let days = window(&state, &query)?;
    let today = Utc::now().date_naive();
    Ok(Json(views::daily_counts(&state.context.history.entries(), today, days)))
}

pub async fn patient_stats(
    State(state): State<SharedState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let mut summaries = views::patient_summaries(&state.context.history.entries());
    if let Some(limit) = query.limit {
        summaries.truncate(limit);
    }
    Json(summaries)
}

pub async fn overview_stats(
    State(state): State<SharedState>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<impl IntoResponse> {
    let days = window(&state, &query)?;
    let today = Utc::now().date_naive();
    Ok(Json(views::overview(&state.context.history.entries(), today, days)))
}

// --- avisos ---

pub async fn notices(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.context.notices.recent())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data_url() {
        let (content_type, bytes) = decode_data_url("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_login_request_validation() {
        let ok = LoginRequest { crm: "123456".to_string(), uf: "sp".to_string() };
        assert!(ok.validate().is_ok());

        let blank = LoginRequest { crm: "  ".to_string(), uf: "SP".to_string() };
        assert!(blank.validate().is_err());

        let bad_uf = LoginRequest { crm: "1".to_string(), uf: "SPO".to_string() };
        assert!(bad_uf.validate().is_err());
    }

    #[test]
    fn test_decode_data_url_rejects_other_references() {
        assert!(decode_data_url("blob:http://localhost/123").is_err());
        assert!(decode_data_url("data:image/png,plain").is_err());
        assert!(decode_data_url("data:image/png;base64,@@@").is_err());
        assert!(decode_data_url("data:image/png;base64,").is_err());
    }
}
