//! Definições de erro para a biblioteca vision-db
//!
//! Este módulo define os tipos de erro usados pelos armazenamentos,
//! pelo histórico e pelo cadastro de pacientes

use thiserror::Error;

/// Erros específicos para operações de persistência
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Erro de conexão com banco de dados: {0}")]
    ConnectionError(String),

    #[error("Erro de migração: {0}")]
    MigrationError(String),

    #[error("Erro de consulta: {0}")]
    QueryError(String),

    #[error("Entidade não encontrada: {0}")]
    NotFound(String),

    #[error("Violação de restrição: {0}")]
    ConstraintViolation(String),

    #[error("Erro de serialização: {0}")]
    SerializationError(String),

    #[error("Dados inválidos: {0}")]
    ValidationError(String),

    #[error("Erro interno: {0}")]
    InternalError(String),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

/// Conversão de erros específicos do SQLx para nossos tipos de erro
impl From<sqlx::Error> for DbError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DbError::NotFound("Registro não encontrado".to_string()),
            sqlx::Error::Database(dbe) => {
                if let Some(code) = dbe.code() {
                    // 1555 = SQLITE_CONSTRAINT_PRIMARYKEY, 2067 = SQLITE_CONSTRAINT_UNIQUE
                    if code.as_ref() == "1555" || code.as_ref() == "2067" {
                        return DbError::ConstraintViolation(dbe.message().to_string());
                    }
                }
                DbError::QueryError(dbe.message().to_string())
            },
            sqlx::Error::ColumnNotFound(col) =>
                DbError::QueryError(format!("Coluna não encontrada: {}", col)),
            sqlx::Error::ColumnDecode { index, source } =>
                DbError::QueryError(format!("Erro ao decodificar coluna {}: {}", index, source)),
            sqlx::Error::Io(io_err) =>
                DbError::ConnectionError(io_err.to_string()),
            sqlx::Error::Configuration(conf_err) =>
                DbError::ConnectionError(conf_err.to_string()),
            sqlx::Error::PoolClosed =>
                DbError::ConnectionError("Pool de conexões fechado".to_string()),
            sqlx::Error::PoolTimedOut =>
                DbError::ConnectionError("Timeout no pool de conexões".to_string()),
            sqlx::Error::WorkerCrashed =>
                DbError::InternalError("Worker do banco de dados falhou".to_string()),
            _ => DbError::InternalError(format!("Erro inesperado: {:?}", error)),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(error: serde_json::Error) -> Self {
        DbError::SerializationError(error.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(error: std::io::Error) -> Self {
        DbError::ConnectionError(error.to_string())
    }
}

impl From<validator::ValidationErrors> for DbError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = errors
            .field_errors()
            .keys()
            .map(|field| field.to_string())
            .collect::<Vec<_>>();
        fields.sort();
        DbError::ValidationError(format!("campos inválidos: {}", fields.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ invalido").unwrap_err();
        let err: DbError = json_err.into();
        assert!(matches!(err, DbError::SerializationError(_)));
    }
}
