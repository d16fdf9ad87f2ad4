// src/services/membership_service.rs

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::{MembershipStore, TenantStore, UserStore},
    models::{
        history::{HistoryAction, HistoryEntity, NewHistoryEntry},
        tenancy::{
            AddMemberPayload, Capability, ChangeRolePayload, CreateTenantPayload, Membership,
            MembershipRole, MembershipStatus, MembershipWrite, MembershipWriteKind, Tenant,
        },
    },
    services::access_guard::{AccessGuard, TenantAccess},
};

#[derive(Clone)]
pub struct MembershipService {
    guard: AccessGuard,
    users: Arc<dyn UserStore>,
    tenants: Arc<dyn TenantStore>,
    memberships: Arc<dyn MembershipStore>,
}

impl MembershipService {
    pub fn new(
        guard: AccessGuard,
        users: Arc<dyn UserStore>,
        tenants: Arc<dyn TenantStore>,
        memberships: Arc<dyn MembershipStore>,
    ) -> Self {
        Self {
            guard,
            users,
            tenants,
            memberships,
        }
    }

    /// Cria um tenant e, atomicamente, torna o criador o seu OWNER.
    pub async fn create_tenant(
        &self,
        token: Option<&str>,
        payload: CreateTenantPayload,
    ) -> Result<(Tenant, Membership), AppError> {
        let user = self.guard.require_authenticated_user(token).await?;
        payload.validate()?;

        let (tenant, membership) = self
            .tenants
            .create_tenant_with_owner(&payload, user.id)
            .await?;

        tracing::info!(tenant_id = %tenant.id, owner_id = %user.id, "Tenant criado");
        Ok((tenant, membership))
    }

    pub async fn list_my_tenants(&self, token: Option<&str>) -> Result<Vec<Tenant>, AppError> {
        let user = self.guard.require_authenticated_user(token).await?;
        self.tenants.list_tenants_for_user(user.id).await
    }

    pub async fn list_members(
        &self,
        token: Option<&str>,
        tenant_id: Uuid,
    ) -> Result<Vec<Membership>, AppError> {
        self.guard
            .require_tenant_capability(token, tenant_id, Capability::ListMembers)
            .await?;
        self.memberships.list_memberships(tenant_id).await
    }

    /// Adiciona um usuário existente. OWNER não é atribuível; uma membership
    /// revogada é reativada com o novo papel.
    pub async fn add_member(
        &self,
        token: Option<&str>,
        tenant_id: Uuid,
        payload: AddMemberPayload,
    ) -> Result<Membership, AppError> {
        let access = self
            .guard
            .require_tenant_capability(token, tenant_id, Capability::ManageMembers)
            .await?;
        Self::ensure_assignable(payload.role)?;

        self.users
            .find_user(payload.user_id)
            .await?
            .ok_or(AppError::ResourceNotFound("Usuário"))?;

        // Uma membership revogada é reaproveitada: o par (usuário, tenant) é único
        let kind = match self
            .memberships
            .find_membership(payload.user_id, tenant_id)
            .await?
        {
            Some(existing) if existing.is_active() => return Err(AppError::MemberAlreadyExists),
            Some(_) => MembershipWriteKind::Update,
            None => MembershipWriteKind::Insert,
        };

        let membership = self
            .memberships
            .write_membership(&MembershipWrite {
                kind,
                user_id: payload.user_id,
                tenant_id,
                role: payload.role,
                status: MembershipStatus::Active,
                audit: Self::audit(
                    &access,
                    HistoryAction::Create,
                    format!("Membro {} adicionado como {:?}", payload.user_id, payload.role),
                ),
            })
            .await?;

        Ok(membership)
    }

    pub async fn change_role(
        &self,
        token: Option<&str>,
        tenant_id: Uuid,
        user_id: Uuid,
        payload: ChangeRolePayload,
    ) -> Result<Membership, AppError> {
        let access = self
            .guard
            .require_tenant_capability(token, tenant_id, Capability::ManageMembers)
            .await?;
        Self::ensure_assignable(payload.role)?;

        let target = self.modifiable_member(user_id, tenant_id).await?;
        let membership = self
            .memberships
            .write_membership(&MembershipWrite {
                kind: MembershipWriteKind::Update,
                user_id,
                tenant_id,
                role: payload.role,
                status: target.status,
                audit: Self::audit(
                    &access,
                    HistoryAction::Update,
                    format!("Papel de {} alterado de {:?} para {:?}", user_id, target.role, payload.role),
                ),
            })
            .await?;

        Ok(membership)
    }

    pub async fn revoke_member(
        &self,
        token: Option<&str>,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Membership, AppError> {
        let access = self
            .guard
            .require_tenant_capability(token, tenant_id, Capability::ManageMembers)
            .await?;

        let target = self.modifiable_member(user_id, tenant_id).await?;
        if !target.is_active() {
            return Ok(target);
        }

        let membership = self
            .memberships
            .write_membership(&MembershipWrite {
                kind: MembershipWriteKind::Update,
                user_id,
                tenant_id,
                role: target.role,
                status: MembershipStatus::Revoked,
                audit: Self::audit(
                    &access,
                    HistoryAction::Delete,
                    format!("Acesso de {} revogado", user_id),
                ),
            })
            .await?;

        Ok(membership)
    }

    fn ensure_assignable(role: MembershipRole) -> Result<(), AppError> {
        if role == MembershipRole::Owner {
            return Err(AppError::InvalidInput(
                "O papel OWNER é definido na criação do tenant e não pode ser atribuído.".into(),
            ));
        }
        Ok(())
    }

    // O OWNER não é alterado nem revogado pelos fluxos normais
    async fn modifiable_member(&self, user_id: Uuid, tenant_id: Uuid) -> Result<Membership, AppError> {
        let target = self
            .memberships
            .find_membership(user_id, tenant_id)
            .await?
            .ok_or(AppError::ResourceNotFound("Membro"))?;

        if target.role == MembershipRole::Owner {
            return Err(AppError::InvalidInput(
                "A membership OWNER não pode ser modificada.".into(),
            ));
        }
        Ok(target)
    }

    // O store completa `entity_id` com o id da membership gravada
    fn audit(access: &TenantAccess, action: HistoryAction, description: String) -> NewHistoryEntry {
        NewHistoryEntry {
            actor_user_id: access.user.id,
            tenant_id: access.tenant.id,
            entity_type: HistoryEntity::Membership,
            entity_id: None,
            action,
            description,
        }
    }
}
