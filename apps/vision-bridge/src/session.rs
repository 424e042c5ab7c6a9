//! Sessão do médico autenticado
//!
//! Guarda apenas o sujeito devolvido pelo serviço de login; o protocolo de
//! autenticação em si é responsabilidade desse serviço. Quando aberta sobre
//! um arquivo, a sessão sobrevive a reinícios do serviço (sem o token).

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use anyhow::{Context, Result};
use tracing::{info, warn};
use vision_db::collaborators::DoctorSession;
use vision_db::models::DoctorInfo;

#[derive(Debug, Default)]
pub struct SessionState {
    doctor: RwLock<Option<DoctorSession>>,
    path: Option<PathBuf>,
}

impl SessionState {
    /// Sessão apenas em memória
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessão lembrada em `path`; restaura o médico gravado, se houver
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doctor = match read_session(&path) {
            Ok(Some(doctor)) => {
                info!("Sessão restaurada: {} ({}/{})", doctor.name, doctor.crm, doctor.uf);
                Some(doctor)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Sessão gravada ignorada ({}): {:#}", path.display(), e);
                None
            }
        };
        Self { doctor: RwLock::new(doctor), path: Some(path) }
    }

    pub fn login(&self, doctor: DoctorSession) {
        self.persist(Some(&doctor));
        *self.write() = Some(doctor);
    }

    /// Encerra a sessão; devolve o médico que estava conectado
    pub fn logout(&self) -> Option<DoctorSession> {
        self.persist(None);
        self.write().take()
    }

    pub fn current(&self) -> Option<DoctorSession> {
        self.doctor.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Cópia dos dados do médico para gravar junto da análise
    pub fn doctor_info(&self) -> Option<DoctorInfo> {
        self.current().as_ref().map(DoctorInfo::from)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<DoctorSession>> {
        // o valor guardado é sempre completo, mesmo após pânico de outra thread
        self.doctor.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, doctor: Option<&DoctorSession>) {
        let Some(path) = &self.path else { return };
        let result = match doctor {
            Some(doctor) => write_session(path, doctor),
            None => remove_session(path),
        };
        if let Err(e) = result {
            warn!("Falha ao gravar sessão em {}: {:#}", path.display(), e);
        }
    }
}

fn read_session(path: &Path) -> Result<Option<DoctorSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(File::open(path)?);
    let doctor = serde_json::from_reader(reader).context("Arquivo de sessão inválido")?;
    Ok(Some(doctor))
}

fn write_session(path: &Path, doctor: &DoctorSession) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        serde_json::to_writer(&mut writer, doctor)?;
        writer.flush()?;
    }
    fs::rename(&tmp_path, path).context("Falha ao substituir arquivo de sessão")?;
    Ok(())
}

fn remove_session(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
