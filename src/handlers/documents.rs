// src/handlers/documents.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::{AppError, ErrorBody},
    config::AppState,
    middleware::{auth::SessionToken, tenancy::TenantContext},
    models::documents::{CreateDocumentPayload, FinancialDocument, ResolvedItems, UpdateItemsPayload},
};

#[utoipa::path(
    post,
    path = "/api/documents",
    tag = "Documents",
    request_body = CreateDocumentPayload,
    responses(
        (status = 201, description = "Documento criado e numerado", body = FinancialDocument),
        (status = 400, description = "Itens inválidos", body = ErrorBody),
        (status = 403, description = "Acesso negado", body = ErrorBody),
        (status = 409, description = "Numeração esgotou as tentativas", body = ErrorBody)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_document(
    State(app_state): State<AppState>,
    session: SessionToken,
    tenant: TenantContext,
    Json(payload): Json<CreateDocumentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let document = app_state
        .document_service
        .create_document(session.as_deref(), tenant.0, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

#[utoipa::path(
    get,
    path = "/api/documents/{id}/items",
    tag = "Documents",
    responses(
        (status = 200, description = "Itens do documento e a sua origem", body = ResolvedItems),
        (status = 403, description = "Acesso negado", body = ErrorBody),
        (status = 404, description = "Documento não encontrado", body = ErrorBody),
        (status = 409, description = "Snapshot e linhas divergem (modo estrito)", body = ErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do Documento")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_document_items(
    State(app_state): State<AppState>,
    session: SessionToken,
    Path(document_id): Path<Uuid>,
) -> Result<Json<ResolvedItems>, AppError> {
    let items = app_state
        .document_service
        .get_document_items(session.as_deref(), document_id)
        .await?;
    Ok(Json(items))
}

#[utoipa::path(
    put,
    path = "/api/documents/{id}/items",
    tag = "Documents",
    request_body = UpdateItemsPayload,
    responses(
        (status = 200, description = "Itens substituídos", body = FinancialDocument),
        (status = 400, description = "Itens inválidos ou documento bloqueado", body = ErrorBody),
        (status = 403, description = "Acesso negado", body = ErrorBody),
        (status = 404, description = "Documento não encontrado", body = ErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do Documento")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_document_items(
    State(app_state): State<AppState>,
    session: SessionToken,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<UpdateItemsPayload>,
) -> Result<Json<FinancialDocument>, AppError> {
    let document = app_state
        .document_service
        .update_document_items(session.as_deref(), document_id, payload)
        .await?;
    Ok(Json(document))
}

#[utoipa::path(
    delete,
    path = "/api/documents/{id}",
    tag = "Documents",
    responses(
        (status = 204, description = "Documento excluído (numero continua reservado)"),
        (status = 403, description = "Acesso negado", body = ErrorBody),
        (status = 404, description = "Documento não encontrado", body = ErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do Documento")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_document(
    State(app_state): State<AppState>,
    session: SessionToken,
    Path(document_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    app_state
        .document_service
        .delete_document(session.as_deref(), document_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
