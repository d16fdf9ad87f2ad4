// src/handlers/auth.rs

use axum::{extract::State, Json};

use crate::{
    common::error::{AppError, ErrorBody},
    config::AppState,
    middleware::auth::SessionToken,
    models::auth::User,
};

// Handler da rota protegida /me
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "Usuário da sessão", body = User),
        (status = 401, description = "Sessão ausente ou inválida", body = ErrorBody)
    ),
    security(("api_jwt" = []))
)]
pub async fn get_me(
    State(app_state): State<AppState>,
    session: SessionToken,
) -> Result<Json<User>, AppError> {
    let user = app_state
        .guard
        .require_authenticated_user(session.as_deref())
        .await?;
    Ok(Json(user))
}
