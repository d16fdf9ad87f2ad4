// src/services/access_guard.rs
//
// Ponto único de autorização. Nenhuma leitura ou escrita de documento,
// cliente ou produto acontece sem passar por uma destas verificações.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{MembershipStore, ResourceDirectory, TenantStore},
    models::{
        auth::User,
        tenancy::{Capability, Membership, ResourceKind, Tenant},
    },
    services::auth::IdentityResolver,
};

/// Resultado de uma verificação bem-sucedida.
#[derive(Debug, Clone)]
pub struct TenantAccess {
    pub user: User,
    pub tenant: Tenant,
    pub membership: Membership,
}

#[derive(Clone)]
pub struct AccessGuard {
    identity: Arc<dyn IdentityResolver>,
    tenants: Arc<dyn TenantStore>,
    memberships: Arc<dyn MembershipStore>,
    resources: Arc<dyn ResourceDirectory>,
}

impl AccessGuard {
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        tenants: Arc<dyn TenantStore>,
        memberships: Arc<dyn MembershipStore>,
        resources: Arc<dyn ResourceDirectory>,
    ) -> Self {
        Self {
            identity,
            tenants,
            memberships,
            resources,
        }
    }

    pub async fn require_authenticated_user(&self, token: Option<&str>) -> Result<User, AppError> {
        let token = token.ok_or(AppError::Unauthenticated)?;
        self.identity
            .resolve_session(token)
            .await?
            .ok_or(AppError::Unauthenticated)
    }

    /// Exige uma membership ativa no tenant, qualquer que seja o papel.
    pub async fn require_tenant_access(
        &self,
        token: Option<&str>,
        tenant_id: Uuid,
    ) -> Result<TenantAccess, AppError> {
        let user = self.require_authenticated_user(token).await?;
        self.membership_access(user, tenant_id).await
    }

    pub async fn require_tenant_capability(
        &self,
        token: Option<&str>,
        tenant_id: Uuid,
        capability: Capability,
    ) -> Result<TenantAccess, AppError> {
        let access = self.require_tenant_access(token, tenant_id).await?;
        Self::ensure_capability(access, capability)
    }

    /// Resolve o tenant dono do recurso e delega a `require_tenant_access`.
    pub async fn require_resource_access(
        &self,
        token: Option<&str>,
        kind: ResourceKind,
        resource_id: Uuid,
    ) -> Result<TenantAccess, AppError> {
        // Autentica antes de consultar o recurso
        let user = self.require_authenticated_user(token).await?;

        let tenant_id = self
            .resources
            .owning_tenant(kind, resource_id)
            .await?
            .ok_or(AppError::ResourceNotFound(kind.label()))?;

        self.membership_access(user, tenant_id).await
    }

    pub async fn require_resource_capability(
        &self,
        token: Option<&str>,
        kind: ResourceKind,
        resource_id: Uuid,
        capability: Capability,
    ) -> Result<TenantAccess, AppError> {
        let access = self.require_resource_access(token, kind, resource_id).await?;
        Self::ensure_capability(access, capability)
    }

    // Tenant desconhecido e membership ausente/revogada dão o mesmo erro,
    // para não permitir enumeração de IDs de tenant.
    async fn membership_access(&self, user: User, tenant_id: Uuid) -> Result<TenantAccess, AppError> {
        let Some(tenant) = self.tenants.find_tenant(tenant_id).await? else {
            tracing::debug!(user_id = %user.id, %tenant_id, "Tenant inexistente");
            return Err(AppError::AccessDenied);
        };

        let membership = self
            .memberships
            .find_membership(user.id, tenant_id)
            .await?
            .filter(Membership::is_active)
            .ok_or(AppError::AccessDenied)?;

        Ok(TenantAccess {
            user,
            tenant,
            membership,
        })
    }

    fn ensure_capability(access: TenantAccess, capability: Capability) -> Result<TenantAccess, AppError> {
        if !access.membership.role.allows(capability) {
            tracing::debug!(
                user_id = %access.user.id,
                role = ?access.membership.role,
                ?capability,
                "Papel insuficiente"
            );
            return Err(AppError::AccessDenied);
        }
        Ok(access)
    }
}
