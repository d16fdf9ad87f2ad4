// src/docs.rs

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::OpenApi;

use crate::common;
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Health ---
        handlers::health::health,

        // --- Users ---
        handlers::auth::get_me,

        // --- Tenancy ---
        handlers::tenancy::create_tenant,
        handlers::tenancy::list_my_tenants,
        handlers::tenancy::list_members,
        handlers::tenancy::add_member,
        handlers::tenancy::change_role,
        handlers::tenancy::revoke_member,

        // --- Documents ---
        handlers::documents::create_document,
        handlers::documents::get_document_items,
        handlers::documents::update_document_items,
        handlers::documents::delete_document,
    ),
    components(
        schemas(
            // --- Erros ---
            common::error::ErrorKind,
            common::error::ErrorBody,

            handlers::health::HealthResponse,

            // --- Auth ---
            models::auth::User,

            // --- TENANCY ---
            models::tenancy::Tenant,
            models::tenancy::MembershipRole,
            models::tenancy::MembershipStatus,
            models::tenancy::Membership,
            models::tenancy::CreateTenantPayload,
            models::tenancy::AddMemberPayload,
            models::tenancy::ChangeRolePayload,
            handlers::tenancy::CreatedTenant,

            // --- Documents ---
            models::documents::DocumentType,
            models::documents::DocumentStatus,
            models::documents::DiscountKind,
            models::documents::LineItem,
            models::documents::FinancialDocument,
            models::documents::CreateDocumentPayload,
            models::documents::UpdateItemsPayload,
            models::documents::ItemsSource,
            models::documents::CountDivergence,
            models::documents::ResolvedItems,
        )
    ),
    tags(
        (name = "Health", description = "Estado do serviço"),
        (name = "Users", description = "Dados do Usuário da sessão"),
        (name = "Tenancy", description = "Tenants, memberships e papéis"),
        (name = "Documents", description = "Faturas e orçamentos: numeração e itens")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}
