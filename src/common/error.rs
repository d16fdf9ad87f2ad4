// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

// ---
// Tipos de erro expostos na fronteira do núcleo
// ---
/// Discriminante estável do erro. É o que os chamadores externos
/// (handlers, ações de UI, operadores) devem inspecionar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthenticated,
    AccessDenied,
    ResourceNotFound,
    Conflict,
    ConsistencyFault,
    Validation,
    Internal,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Sessão inválida ou ausente")]
    Unauthenticated,

    // Nunca diferencia "tenant inexistente" de "sem acesso".
    #[error("Acesso negado")]
    AccessDenied,

    #[error("{0} não encontrado")]
    ResourceNotFound(&'static str),

    // Colisão de numero que esgotou as tentativas
    #[error("Não foi possível atribuir um número único após {attempts} tentativas")]
    NumberingConflict { attempts: u32 },

    // Violação da constraint (tenant, tipo, numero). Consumido pelo laço de
    // nova tentativa do motor de numeração.
    #[error("O número {0} já está em uso neste escopo")]
    DuplicateNumero(String),

    #[error("Divergência entre snapshot ({snapshot_count} itens) e linhas ({row_count} itens)")]
    ConsistencyFault {
        snapshot_count: usize,
        row_count: usize,
    },

    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Documento bloqueado: {0}")]
    DocumentLocked(&'static str),

    #[error("Usuário já é membro deste tenant")]
    MemberAlreadyExists,

    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro de serialização: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Unauthenticated | AppError::JwtError(_) => ErrorKind::Unauthenticated,
            AppError::AccessDenied => ErrorKind::AccessDenied,
            AppError::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            AppError::NumberingConflict { .. } | AppError::DuplicateNumero(_) => ErrorKind::Conflict,
            AppError::ConsistencyFault { .. } => ErrorKind::ConsistencyFault,
            AppError::ValidationError(_)
            | AppError::InvalidInput(_)
            | AppError::DocumentLocked(_)
            | AppError::MemberAlreadyExists => ErrorKind::Validation,
            AppError::DatabaseError(_)
            | AppError::SerializationError(_)
            | AppError::InternalServerError(_) => ErrorKind::Internal,
        }
    }

    /// Falhas de infraestrutura: as únicas que os lotes deixam escapar.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}

// Corpo padrão das respostas de erro
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
            ErrorKind::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict | ErrorKind::ConsistencyFault => StatusCode::CONFLICT,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match self {
            // Retorna todos os detalhes da validação, campo a campo.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                ErrorBody {
                    kind,
                    error: "Um ou mais campos são inválidos.".to_string(),
                    details: Some(json!(details)),
                }
            }
            ref e if kind == ErrorKind::Internal => {
                tracing::error!("Erro Interno do Servidor: {:?}", e);
                ErrorBody {
                    kind,
                    error: "Ocorreu um erro inesperado.".to_string(),
                    details: None,
                }
            }
            e => ErrorBody {
                kind,
                error: e.to_string(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}
