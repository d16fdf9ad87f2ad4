// tests/access_guard.rs

mod common;

use uuid::Uuid;

use common::{invoice, item, Harness};
use facturation_core::{
    common::error::AppError,
    models::tenancy::{Capability, MembershipRole, ResourceKind},
};

#[tokio::test]
async fn missing_or_garbage_token_is_unauthenticated() {
    let h = Harness::new();
    let (tenant, _, _) = h.tenant_with_owner("Euromed");

    let err = h.state.guard.require_tenant_access(None, tenant.id).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated));

    let err = h
        .state
        .guard
        .require_tenant_access(Some("nao-e-um-jwt"), tenant.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated));
}

#[tokio::test]
async fn token_for_deleted_user_is_unauthenticated() {
    let h = Harness::new();
    let ghost = h.state.identity.issue_token(Uuid::new_v4()).unwrap();

    let err = h
        .state
        .guard
        .require_authenticated_user(Some(&ghost))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated));
}

#[tokio::test]
async fn owner_has_access_with_membership_in_result() {
    let h = Harness::new();
    let (tenant, owner, token) = h.tenant_with_owner("Euromed");

    let access = h
        .state
        .guard
        .require_tenant_access(Some(&token), tenant.id)
        .await
        .unwrap();

    assert_eq!(access.user.id, owner.id);
    assert_eq!(access.tenant.id, tenant.id);
    assert_eq!(access.membership.role, MembershipRole::Owner);
}

#[tokio::test]
async fn non_member_and_unknown_tenant_get_the_same_denial() {
    let h = Harness::new();
    let (tenant, _, _) = h.tenant_with_owner("Euromed");
    let outsider = h.store.add_user("intrus@ailleurs.fr", false);
    let token = h.token(&outsider);

    let err = h
        .state
        .guard
        .require_tenant_access(Some(&token), tenant.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied));

    let err = h
        .state
        .guard
        .require_tenant_access(Some(&token), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied));
}

#[tokio::test]
async fn global_admin_flag_grants_nothing_inside_a_tenant() {
    let h = Harness::new();
    let (tenant, _, _) = h.tenant_with_owner("Euromed");
    let admin = h.store.add_user("root@plateforme.fr", true);
    let token = h.token(&admin);

    let err = h
        .state
        .guard
        .require_tenant_access(Some(&token), tenant.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied));
}

#[tokio::test]
async fn revoked_membership_loses_access() {
    let h = Harness::new();
    let (tenant, _, owner_token) = h.tenant_with_owner("Euromed");
    let (editor, editor_token) = h.member(&tenant, "edit@euromed.fr", MembershipRole::Editor);

    h.state
        .guard
        .require_tenant_access(Some(&editor_token), tenant.id)
        .await
        .unwrap();

    h.state
        .membership_service
        .revoke_member(Some(&owner_token), tenant.id, editor.id)
        .await
        .unwrap();

    let err = h
        .state
        .guard
        .require_tenant_access(Some(&editor_token), tenant.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied));
}

#[tokio::test]
async fn capabilities_follow_role_order() {
    let h = Harness::new();
    let (tenant, _, _) = h.tenant_with_owner("Euromed");
    let (_, viewer) = h.member(&tenant, "view@euromed.fr", MembershipRole::Viewer);
    let (_, editor) = h.member(&tenant, "edit@euromed.fr", MembershipRole::Editor);
    let guard = &h.state.guard;

    guard
        .require_tenant_capability(Some(&viewer), tenant.id, Capability::ReadDocuments)
        .await
        .unwrap();
    let err = guard
        .require_tenant_capability(Some(&viewer), tenant.id, Capability::WriteDocuments)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied));

    guard
        .require_tenant_capability(Some(&editor), tenant.id, Capability::WriteDocuments)
        .await
        .unwrap();
    let err = guard
        .require_tenant_capability(Some(&editor), tenant.id, Capability::ManageMembers)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied));
}

#[tokio::test]
async fn resource_access_resolves_the_owning_tenant() {
    let h = Harness::new();
    let (tenant_a, _, token_a) = h.tenant_with_owner("Alpha");
    let (_, _, token_b) = h.tenant_with_owner("Beta");
    let client = h.store.add_client(tenant_a.id);

    let access = h
        .state
        .guard
        .require_resource_access(Some(&token_a), ResourceKind::Client, client)
        .await
        .unwrap();
    assert_eq!(access.tenant.id, tenant_a.id);

    let err = h
        .state
        .guard
        .require_resource_access(Some(&token_b), ResourceKind::Client, client)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied));
}

#[tokio::test]
async fn missing_resource_is_not_found_after_authentication() {
    let h = Harness::new();
    let (_, _, token) = h.tenant_with_owner("Alpha");

    let err = h
        .state
        .guard
        .require_resource_access(Some(&token), ResourceKind::Document, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ResourceNotFound("Documento")));

    // Sem sessão, a existência do recurso nem é consultada
    let err = h
        .state
        .guard
        .require_resource_access(None, ResourceKind::Document, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated));
}

#[tokio::test]
async fn cross_tenant_document_operations_are_denied() {
    let h = Harness::new();
    let (tenant_a, _, token_a) = h.tenant_with_owner("Alpha");
    let (_, _, token_b) = h.tenant_with_owner("Beta");

    let doc = h
        .state
        .document_service
        .create_document(Some(&token_a), tenant_a.id, invoice(vec![item("Site", 1, "900")]))
        .await
        .unwrap();

    let svc = &h.state.document_service;
    let err = svc.get_document_items(Some(&token_b), doc.id).await.unwrap_err();
    assert!(matches!(err, AppError::AccessDenied));

    let err = svc.delete_document(Some(&token_b), doc.id).await.unwrap_err();
    assert!(matches!(err, AppError::AccessDenied));

    // Nem criar no tenant alheio
    let err = svc
        .create_document(Some(&token_b), tenant_a.id, invoice(vec![item("X", 1, "1")]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied));
}
