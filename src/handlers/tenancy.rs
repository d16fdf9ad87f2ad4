// src/handlers/tenancy.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::{AppError, ErrorBody},
    config::AppState,
    middleware::{auth::SessionToken, tenancy::TenantContext},
    models::tenancy::{AddMemberPayload, ChangeRolePayload, CreateTenantPayload, Membership, Tenant},
};

// Resposta da criação: o tenant e a membership OWNER do criador
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTenant {
    pub tenant: Tenant,
    pub membership: Membership,
}

#[utoipa::path(
    post,
    path = "/api/tenants",
    tag = "Tenancy",
    request_body = CreateTenantPayload,
    responses(
        (status = 201, description = "Tenant criado; o criador é OWNER", body = CreatedTenant),
        (status = 400, description = "Dados inválidos", body = ErrorBody),
        (status = 401, description = "Sessão ausente ou inválida", body = ErrorBody)
    ),
    security(("api_jwt" = []))
)]
pub async fn create_tenant(
    State(app_state): State<AppState>,
    session: SessionToken,
    Json(payload): Json<CreateTenantPayload>,
) -> Result<impl IntoResponse, AppError> {
    let (tenant, membership) = app_state
        .membership_service
        .create_tenant(session.as_deref(), payload)
        .await?;

    Ok((StatusCode::CREATED, Json(CreatedTenant { tenant, membership })))
}

#[utoipa::path(
    get,
    path = "/api/tenants",
    tag = "Tenancy",
    responses(
        (status = 200, description = "Tenants com membership ativa", body = Vec<Tenant>),
        (status = 401, description = "Sessão ausente ou inválida", body = ErrorBody)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_my_tenants(
    State(app_state): State<AppState>,
    session: SessionToken,
) -> Result<Json<Vec<Tenant>>, AppError> {
    let tenants = app_state
        .membership_service
        .list_my_tenants(session.as_deref())
        .await?;
    Ok(Json(tenants))
}

#[utoipa::path(
    get,
    path = "/api/tenants/members",
    tag = "Tenancy",
    responses(
        (status = 200, description = "Memberships do tenant", body = Vec<Membership>),
        (status = 403, description = "Acesso negado", body = ErrorBody)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_members(
    State(app_state): State<AppState>,
    session: SessionToken,
    tenant: TenantContext,
) -> Result<Json<Vec<Membership>>, AppError> {
    let members = app_state
        .membership_service
        .list_members(session.as_deref(), tenant.0)
        .await?;
    Ok(Json(members))
}

#[utoipa::path(
    post,
    path = "/api/tenants/members",
    tag = "Tenancy",
    request_body = AddMemberPayload,
    responses(
        (status = 201, description = "Membro adicionado", body = Membership),
        (status = 400, description = "Papel inválido ou membro já existente", body = ErrorBody),
        (status = 403, description = "Acesso negado", body = ErrorBody)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn add_member(
    State(app_state): State<AppState>,
    session: SessionToken,
    tenant: TenantContext,
    Json(payload): Json<AddMemberPayload>,
) -> Result<impl IntoResponse, AppError> {
    let membership = app_state
        .membership_service
        .add_member(session.as_deref(), tenant.0, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

#[utoipa::path(
    put,
    path = "/api/tenants/members/{user_id}",
    tag = "Tenancy",
    request_body = ChangeRolePayload,
    responses(
        (status = 200, description = "Papel alterado", body = Membership),
        (status = 403, description = "Acesso negado", body = ErrorBody),
        (status = 404, description = "Membro não encontrado", body = ErrorBody)
    ),
    params(
        ("user_id" = Uuid, Path, description = "ID do Usuário"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn change_role(
    State(app_state): State<AppState>,
    session: SessionToken,
    tenant: TenantContext,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<ChangeRolePayload>,
) -> Result<Json<Membership>, AppError> {
    let membership = app_state
        .membership_service
        .change_role(session.as_deref(), tenant.0, user_id, payload)
        .await?;
    Ok(Json(membership))
}

#[utoipa::path(
    delete,
    path = "/api/tenants/members/{user_id}",
    tag = "Tenancy",
    responses(
        (status = 200, description = "Acesso revogado", body = Membership),
        (status = 403, description = "Acesso negado", body = ErrorBody),
        (status = 404, description = "Membro não encontrado", body = ErrorBody)
    ),
    params(
        ("user_id" = Uuid, Path, description = "ID do Usuário"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn revoke_member(
    State(app_state): State<AppState>,
    session: SessionToken,
    tenant: TenantContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Membership>, AppError> {
    let membership = app_state
        .membership_service
        .revoke_member(session.as_deref(), tenant.0, user_id)
        .await?;
    Ok(Json(membership))
}
