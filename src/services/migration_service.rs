// src/services/migration_service.rs
//
// Migração RBAC: converte a relação legada usuário↔tenant em memberships
// com papel. Idempotente; um tenant com erro não interrompe os demais.

use std::sync::Arc;

use crate::{
    common::error::AppError,
    db::{HistoryStore, MembershipStore, TenantStore},
    models::{
        auth::User,
        reports::{
            IndexRebuildReport, MemberMigration, MemberOutcome, MigrationReport, OwnerInference,
            OwnerSource, TenantMigrationReport,
        },
        tenancy::{MembershipRole, NewMembership, Tenant},
    },
};

#[derive(Clone)]
pub struct MigrationService {
    tenants: Arc<dyn TenantStore>,
    memberships: Arc<dyn MembershipStore>,
    history: Arc<dyn HistoryStore>,
}

impl MigrationService {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        memberships: Arc<dyn MembershipStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            tenants,
            memberships,
            history,
        }
    }

    pub async fn run_membership_migration(&self) -> Result<MigrationReport, AppError> {
        // Sem a lista de tenants não há o que migrar: única falha global
        let tenants = self.tenants.list_tenants().await?;
        tracing::info!("Migração de memberships: {} tenants", tenants.len());

        let mut report = MigrationReport::default();
        for tenant in tenants {
            let tenant_report = match self.migrate_tenant(&tenant).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(tenant_id = %tenant.id, "Falha ao migrar tenant: {}", e);
                    TenantMigrationReport {
                        tenant_id: tenant.id,
                        tenant_name: tenant.name.clone(),
                        owner: None,
                        members: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            report.tenants.push(tenant_report);
        }

        tracing::info!(
            failed = report.failed_tenants(),
            "Migração de memberships concluída"
        );
        Ok(report)
    }

    /// Sincroniza o índice legado com as memberships.
    pub async fn rebuild_legacy_index(&self) -> Result<IndexRebuildReport, AppError> {
        let (removed, added) = self.tenants.rebuild_legacy_index().await?;
        tracing::info!(removed, added, "Índice legado reconstruído");
        Ok(IndexRebuildReport { removed, added })
    }

    async fn migrate_tenant(&self, tenant: &Tenant) -> Result<TenantMigrationReport, AppError> {
        // 1. Membros legados
        let legacy = self.tenants.legacy_members(tenant.id).await?;

        // 2-3. Dono inferido
        let owner = self.infer_owner(tenant, &legacy).await?;

        // Um OWNER já existente (execução anterior ou criação pelo fluxo novo)
        // nunca é substituído
        let existing = self.memberships.list_memberships(tenant.id).await?;
        let current_owner = existing
            .iter()
            .find(|m| m.role == MembershipRole::Owner)
            .map(|m| m.user_id);

        // 4-5. Uma membership por membro legado
        let mut members = Vec::with_capacity(legacy.len());
        for user in legacy {
            let outcome = match existing.iter().find(|m| m.user_id == user.id) {
                Some(m) => MemberOutcome::Skipped {
                    existing_role: m.role,
                },
                None => {
                    let is_owner = owner.as_ref().is_some_and(|o| o.user_id == user.id)
                        && current_owner.is_none_or(|id| id == user.id);
                    let role = if is_owner {
                        MembershipRole::Owner
                    } else {
                        MembershipRole::Viewer
                    };
                    self.create_membership(tenant, &user, role).await
                }
            };
            members.push(MemberMigration {
                user_id: user.id,
                email: user.email,
                outcome,
            });
        }

        let report = TenantMigrationReport {
            tenant_id: tenant.id,
            tenant_name: tenant.name.clone(),
            owner,
            members,
            error: None,
        };
        tracing::info!(
            tenant_id = %tenant.id,
            created = report.created(),
            skipped = report.skipped(),
            "Tenant migrado"
        );
        Ok(report)
    }

    async fn create_membership(&self, tenant: &Tenant, user: &User, role: MembershipRole) -> MemberOutcome {
        let new = NewMembership {
            user_id: user.id,
            tenant_id: tenant.id,
            role,
        };
        match self.memberships.insert_membership_if_absent(&new).await {
            Ok(Some(_)) => MemberOutcome::Created { role },
            // Criada entre a leitura e a inserção
            Ok(None) => match self.memberships.find_membership(user.id, tenant.id).await {
                Ok(Some(m)) => MemberOutcome::Skipped {
                    existing_role: m.role,
                },
                Ok(None) => MemberOutcome::Failed {
                    error: "membership desapareceu durante a migração".into(),
                },
                Err(e) => MemberOutcome::Failed {
                    error: e.to_string(),
                },
            },
            Err(e) => {
                tracing::warn!(
                    tenant_id = %tenant.id,
                    user_id = %user.id,
                    "Falha ao criar membership: {}",
                    e
                );
                MemberOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn infer_owner(
        &self,
        tenant: &Tenant,
        legacy: &[User],
    ) -> Result<Option<OwnerInference>, AppError> {
        if let Some(entry) = self.history.earliest_tenant_creation(tenant.id).await? {
            return Ok(Some(OwnerInference {
                user_id: entry.actor_user_id,
                source: OwnerSource::CreationHistory,
            }));
        }

        // `legacy` já vem ordenado por (created_at, id)
        let fallback = legacy
            .iter()
            .find(|u| u.is_global_admin)
            .map(|u| (u, OwnerSource::GlobalAdminFallback))
            .or_else(|| legacy.first().map(|u| (u, OwnerSource::FirstMemberFallback)));

        Ok(fallback.map(|(user, source)| {
            tracing::warn!(
                tenant_id = %tenant.id,
                user_id = %user.id,
                ?source,
                "Sem histórico de criação: dono inferido por heurística"
            );
            OwnerInference {
                user_id: user.id,
                source,
            }
        }))
    }
}
