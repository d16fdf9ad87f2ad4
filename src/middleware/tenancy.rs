// src/middleware/tenancy.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::common::error::AppError;

// O nome do nosso cabeçalho HTTP customizado
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

// O tenant que o usuário *pede* para acessar. É só um pedido: todo handler
// passa o ID pelo guardião de acesso antes de usá-lo.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext(pub Uuid);

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(TENANT_ID_HEADER)
            .ok_or_else(|| AppError::InvalidInput("O cabeçalho X-Tenant-ID é obrigatório.".into()))?;

        let value_str = value.to_str().map_err(|_| {
            AppError::InvalidInput("Cabeçalho X-Tenant-ID contém caracteres inválidos.".into())
        })?;

        let tenant_id = Uuid::parse_str(value_str.trim()).map_err(|_| {
            AppError::InvalidInput("Cabeçalho X-Tenant-ID inválido (não é um UUID).".into())
        })?;

        Ok(TenantContext(tenant_id))
    }
}
