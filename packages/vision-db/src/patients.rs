//! Cadastro de pacientes
//!
//! Ciclo de vida independente do histórico: editar ou remover um paciente
//! nunca altera análises já gravadas, que guardam uma cópia do nome.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{DbError, DbResult};
use crate::models::{Patient, PatientForm};
use crate::notices::NoticeBoard;
use crate::storage::RecordStore;

#[derive(Debug, Clone, Default)]
struct RegistryState {
    patients: Arc<Vec<Patient>>,
    current: Option<Uuid>,
}

pub struct PatientRegistry {
    store: Arc<dyn RecordStore<Patient>>,
    notices: NoticeBoard,
    state: watch::Sender<RegistryState>,
    writer: Mutex<()>,
}

impl PatientRegistry {
    pub fn new(store: Arc<dyn RecordStore<Patient>>, notices: NoticeBoard) -> Self {
        let (state, _) = watch::channel(RegistryState::default());
        Self { store, notices, state, writer: Mutex::new(()) }
    }

    /// Lê o cadastro persistido; falhas resultam em cadastro vazio e aviso
    pub async fn load(&self) -> Arc<Vec<Patient>> {
        let _writer = self.writer.lock().await;

        let patients = match self.store.load_all().await {
            Ok(patients) => {
                info!("Cadastro carregado: {} pacientes", patients.len());
                patients
            }
            Err(e) => {
                error!("Erro ao carregar pacientes: {}", e);
                self.notices.error("Não foi possível carregar o cadastro de pacientes");
                Vec::new()
            }
        };

        let patients = Arc::new(patients);
        self.state.send_replace(RegistryState { patients: patients.clone(), current: None });
        patients
    }

    pub async fn add(&self, form: PatientForm) -> DbResult<Patient> {
        self.validate(&form)?;
        let _writer = self.writer.lock().await;

        let patient = Patient::from_form(Uuid::new_v4(), form, Utc::now());
        if let Err(e) = self.store.insert(&patient).await {
            error!("Erro ao cadastrar paciente: {}", e);
            self.notices.error("Erro ao cadastrar paciente");
            return Err(e);
        }

        self.state.send_modify(|state| {
            let mut patients = state.patients.as_ref().clone();
            patients.push(patient.clone());
            state.patients = Arc::new(patients);
        });

        info!("Paciente {} cadastrado", patient.id);
        self.notices.success(format!("Paciente {} cadastrado com sucesso", patient.name));
        Ok(patient)
    }

    pub async fn update(&self, id: Uuid, form: PatientForm) -> DbResult<Patient> {
        self.validate(&form)?;
        let _writer = self.writer.lock().await;

        let existing = self
            .get(id)
            .ok_or_else(|| DbError::NotFound(format!("Paciente {}", id)))?;
        let patient = existing.apply(form, Utc::now());

        if let Err(e) = self.store.replace(&patient).await {
            error!("Erro ao atualizar paciente {}: {}", id, e);
            self.notices.error("Erro ao atualizar paciente");
            return Err(e);
        }

        self.state.send_modify(|state| {
            let patients = state
                .patients
                .iter()
                .map(|p| if p.id == id { patient.clone() } else { p.clone() })
                .collect();
            state.patients = Arc::new(patients);
        });

        info!("Paciente {} atualizado", id);
        self.notices.success(format!("Paciente {} atualizado com sucesso", patient.name));
        Ok(patient)
    }

    /// Remove o paciente; análises que o referenciam permanecem intactas
    pub async fn remove(&self, id: Uuid) -> DbResult<Patient> {
        let _writer = self.writer.lock().await;

        let existing = self
            .get(id)
            .ok_or_else(|| DbError::NotFound(format!("Paciente {}", id)))?;

        if let Err(e) = self.store.delete(id).await {
            error!("Erro ao remover paciente {}: {}", id, e);
            self.notices.error("Erro ao remover paciente");
            return Err(e);
        }

        self.state.send_modify(|state| {
            let patients = state.patients.iter().filter(|p| p.id != id).cloned().collect();
            state.patients = Arc::new(patients);
            if state.current == Some(id) {
                state.current = None;
            }
        });

        info!("Paciente {} removido", id);
        self.notices.success("Paciente removido com sucesso");
        Ok(existing)
    }

    /// Pacientes na ordem de cadastro
    pub fn list(&self) -> Arc<Vec<Patient>> {
        self.state.borrow().patients.clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Patient> {
        self.state.borrow().patients.iter().find(|p| p.id == id).cloned()
    }

    /// Define o paciente em atendimento
    pub fn select(&self, id: Uuid) -> DbResult<Patient> {
        let patient = self
            .get(id)
            .ok_or_else(|| DbError::NotFound(format!("Paciente {}", id)))?;
        self.state.send_modify(|state| state.current = Some(id));
        Ok(patient)
    }

    pub fn deselect(&self) {
        self.state.send_modify(|state| state.current = None);
    }

    /// Paciente em atendimento, sempre com os dados mais recentes
    pub fn current(&self) -> Option<Patient> {
        let state = self.state.borrow();
        let id = state.current?;
        state.patients.iter().find(|p| p.id == id).cloned()
    }

    fn validate(&self, form: &PatientForm) -> DbResult<()> {
        if let Err(errors) = form.validate() {
            let err = DbError::from(errors);
            warn!("Formulário de paciente rejeitado: {}", err);
            self.notices.error(err.to_string());
            return Err(err);
        }
        Ok(())
    }
}
