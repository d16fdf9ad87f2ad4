// src/routes.rs

use axum::{
    routing::{delete, get, post, put},
    Json, Router,
};
use utoipa::OpenApi;

use crate::{config::AppState, docs::ApiDoc, handlers};

/// Router completo da API. Toda rota protegida passa pelo guardião de
/// acesso dentro do serviço; aqui só há o mapeamento de caminhos.
pub fn build_router(app_state: AppState) -> Router {
    // Rotas de tenancy e memberships
    let tenancy_routes = Router::new()
        .route(
            "/api/tenants",
            post(handlers::tenancy::create_tenant).get(handlers::tenancy::list_my_tenants),
        )
        .route(
            "/api/tenants/members",
            get(handlers::tenancy::list_members).post(handlers::tenancy::add_member),
        )
        .route(
            "/api/tenants/members/{user_id}",
            put(handlers::tenancy::change_role).delete(handlers::tenancy::revoke_member),
        );

    // Documentos: criação no tenant do cabeçalho, o resto pelo ID do documento
    let document_routes = Router::new()
        .route("/api/documents", post(handlers::documents::create_document))
        .route("/api/documents/{id}", delete(handlers::documents::delete_document))
        .route(
            "/api/documents/{id}/items",
            get(handlers::documents::get_document_items)
                .put(handlers::documents::update_document_items),
        );

    // Combina tudo no router principal
    Router::new()
        .route("/api/health", get(handlers::health::health))
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route("/api/users/me", get(handlers::auth::get_me))
        .merge(tenancy_routes)
        .merge(document_routes)
        .with_state(app_state)
}
