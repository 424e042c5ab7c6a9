//! Modelos de dados compartilhados
//!
//! Este módulo define as estruturas persistidas pelo histórico de análises
//! e pelo cadastro de pacientes

use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use uuid::Uuid;
use validator::{Validate, ValidationError};

lazy_static! {
    /// Percentual de confiança embutido no fim do rótulo: "glioma 87%", "glioma (87.5%)"
    static ref CONFIDENCE_SUFFIX: Regex =
        Regex::new(r"\s*[(\[]?\s*(\d{1,3}(?:[.,]\d+)?)\s*%\s*[)\]]?\s*$").unwrap();
}

/// Registro persistido com identificador próprio
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
}

/// Região detectada pelo serviço de inferência
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    /// Coordenadas em pixels da imagem original
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    /// Classificação em texto livre (pode conter a confiança)
    pub label: String,
}

impl DetectionBox {
    /// Rótulo sem o percentual de confiança
    pub fn class_name(&self) -> &str {
        match CONFIDENCE_SUFFIX.find(&self.label) {
            Some(m) if m.start() > 0 => self.label[..m.start()].trim(),
            _ => self.label.trim(),
        }
    }

    /// Confiança embutida no rótulo, normalizada para 0..=1
    pub fn confidence(&self) -> Option<f64> {
        let caps = CONFIDENCE_SUFFIX.captures(&self.label)?;
        let value: f64 = caps.get(1)?.as_str().replace(',', ".").parse().ok()?;
        if (0.0..=100.0).contains(&value) {
            Some(value / 100.0)
        } else {
            None
        }
    }

    pub fn area(&self) -> f64 {
        ((self.x2 - self.x1) * (self.y2 - self.y1)).abs()
    }
}

/// Dados do médico capturados da sessão no momento da análise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorInfo {
    pub name: String,
    pub crm: String,
    pub uf: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
}

/// Uma análise de imagem concluída
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisEntry {
    /// Identificador único, nunca reutilizado
    pub id: Uuid,
    /// Instante de criação em milissegundos desde a época
    pub timestamp: i64,
    /// Referência à imagem enviada (data URL ou blob)
    pub image_url: String,
    /// Imagem composta com as detecções desenhadas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_with_detections: Option<String>,
    pub file_name: String,
    /// Detecções na ordem devolvida pelo serviço
    #[serde(default)]
    pub detections: Vec<DetectionBox>,
    /// Referência fraca ao paciente (sem cascata)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<Uuid>,
    /// Nome do paciente copiado no momento da gravação
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_info: Option<DoctorInfo>,
}

impl AnalysisEntry {
    /// Monta o registro final a partir dos dados enviados
    pub fn from_new(id: Uuid, timestamp: i64, new: NewAnalysisEntry) -> Self {
        Self {
            id,
            timestamp,
            image_url: new.image_url,
            image_with_detections: new.image_with_detections,
            file_name: new.file_name,
            detections: new.detections,
            patient_id: new.patient_id,
            patient_name: new.patient_name,
            doctor_info: new.doctor_info,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp)
    }
}

impl Record for AnalysisEntry {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl FromRow<'_, SqliteRow> for AnalysisEntry {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let doctor_info = match row.try_get::<Option<String>, _>("doctor_name")? {
            Some(name) => Some(DoctorInfo {
                name,
                crm: row.try_get("doctor_crm")?,
                uf: row.try_get("doctor_uf")?,
                specialty: row.try_get("doctor_specialty")?,
            }),
            None => None,
        };
        let patient_id = row
            .try_get::<Option<String>, _>("patient_id")?
            .map(|raw| parse_uuid("patient_id", &raw))
            .transpose()?;

        Ok(Self {
            id: parse_uuid("id", &row.try_get::<String, _>("id")?)?,
            timestamp: row.try_get("timestamp")?,
            image_url: row.try_get("image_url")?,
            image_with_detections: row.try_get("image_with_detections")?,
            file_name: row.try_get("file_name")?,
            detections: row.try_get::<Json<Vec<DetectionBox>>, _>("detections")?.0,
            patient_id,
            patient_name: row.try_get("patient_name")?,
            doctor_info,
        })
    }
}

/// Dados de uma análise antes de receber id e timestamp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnalysisEntry {
    pub image_url: String,
    #[serde(default)]
    pub image_with_detections: Option<String>,
    pub file_name: String,
    #[serde(default)]
    pub detections: Vec<DetectionBox>,
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub doctor_info: Option<DoctorInfo>,
}

/// Paciente cadastrado
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Identificador estável entre edições
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
    /// Número do prontuário
    #[serde(default)]
    pub record_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn from_form(id: Uuid, form: PatientForm, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: form.name.trim().to_string(),
            age: form.age,
            gender: form.gender,
            birthdate: form.birthdate,
            record_number: form.record_number,
            created_at: now,
            updated_at: now,
        }
    }

    /// Aplica uma edição mantendo id e data de criação
    pub fn apply(&self, form: PatientForm, now: DateTime<Utc>) -> Self {
        Self {
            created_at: self.created_at,
            ..Self::from_form(self.id, form, now)
        }
    }
}

impl Record for Patient {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl FromRow<'_, SqliteRow> for Patient {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: parse_uuid("id", &row.try_get::<String, _>("id")?)?,
            name: row.try_get("name")?,
            age: row.try_get::<Option<i64>, _>("age")?.map(|age| age as u32),
            gender: row.try_get("gender")?,
            birthdate: row.try_get("birthdate")?,
            record_number: row.try_get("record_number")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Campos editáveis do formulário de paciente
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PatientForm {
    #[validate(length(max = 200), custom = "not_blank")]
    pub name: String,
    #[validate(range(max = 150))]
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
    #[validate(length(max = 64))]
    #[serde(default)]
    pub record_number: Option<String>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn parse_uuid(column: &str, raw: &str) -> sqlx::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str) -> DetectionBox {
        DetectionBox { x1: 10.0, y1: 20.0, x2: 110.0, y2: 70.0, label: label.to_string() }
    }

    #[test]
    fn test_class_name_strips_confidence() {
        assert_eq!(detection("glioma 87%").class_name(), "glioma");
        assert_eq!(detection("meningioma (91.5%)").class_name(), "meningioma");
        assert_eq!(detection("pituitary").class_name(), "pituitary");
    }

    #[test]
    fn test_confidence_parsing() {
        assert_eq!(detection("glioma 87%").confidence(), Some(0.87));
        assert_eq!(detection("glioma 87,5%").confidence(), Some(0.875));
        assert_eq!(detection("glioma").confidence(), None);
        assert_eq!(detection("glioma 187%").confidence(), None);
    }

    #[test]
    fn test_area() {
        assert_eq!(detection("x").area(), 5000.0);
    }

    #[test]
    fn test_entry_json_uses_camel_case() {
        let entry = AnalysisEntry::from_new(
            Uuid::new_v4(),
            1_700_000_000_000,
            NewAnalysisEntry {
                image_url: "data:image/png;base64,AAAA".to_string(),
                file_name: "scan.png".to_string(),
                detections: vec![detection("glioma 87%")],
                ..Default::default()
            },
        );

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["fileName"], "scan.png");
        assert_eq!(json["imageUrl"], "data:image/png;base64,AAAA");
        assert!(json.get("patientId").is_none());
        assert_eq!(json["detections"][0]["label"], "glioma 87%");
    }

    #[test]
    fn test_patient_form_validation() {
        let valid = PatientForm { name: "Maria Souza".to_string(), age: Some(42), ..Default::default() };
        assert!(valid.validate().is_ok());

        let blank = PatientForm { name: "   ".to_string(), ..Default::default() };
        assert!(blank.validate().is_err());

        let too_old = PatientForm { name: "João".to_string(), age: Some(151), ..Default::default() };
        assert!(too_old.validate().is_err());
    }

    #[test]
    fn test_patient_apply_keeps_identity() {
        let created = Utc::now();
        let patient = Patient::from_form(
            Uuid::new_v4(),
            PatientForm { name: " Ana ".to_string(), ..Default::default() },
            created,
        );
        assert_eq!(patient.name, "Ana");

        let later = created + chrono::Duration::minutes(5);
        let edited = patient.apply(PatientForm { name: "Ana Lima".to_string(), ..Default::default() }, later);
        assert_eq!(edited.id, patient.id);
        assert_eq!(edited.created_at, created);
        assert_eq!(edited.updated_at, later);
        assert_eq!(edited.name, "Ana Lima");
    }
}
