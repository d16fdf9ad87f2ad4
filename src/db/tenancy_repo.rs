// src/db/tenancy_repo.rs

use async_trait::async_trait;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{history_repo::HistoryRepository, membership_repo::map_membership_violation, store::TenantStore},
    models::{
        auth::User,
        history::{HistoryAction, HistoryEntity, NewHistoryEntry},
        tenancy::{CreateTenantPayload, Membership, MembershipRole, Tenant},
    },
};

#[derive(Clone)]
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cria um novo tenant na base de dados.
    async fn insert_tenant<'e, E>(
        executor: E, // Aceita um executor (pool ou transação)
        payload: &CreateTenantPayload,
    ) -> Result<Tenant, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (name, invoice_prefix, quote_prefix)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(payload.name.trim())
        .bind(payload.invoice_prefix.as_deref())
        .bind(payload.quote_prefix.as_deref())
        .fetch_one(executor)
        .await?;

        Ok(tenant)
    }

    async fn insert_owner<'e, E>(
        executor: E,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Membership, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO memberships (user_id, tenant_id, role)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .bind(MembershipRole::Owner)
        .fetch_one(executor)
        .await
        .map_err(map_membership_violation)
    }
}

#[async_trait]
impl TenantStore for TenantRepository {
    async fn find_tenant(&self, id: Uuid) -> Result<Option<Tenant>, AppError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, AppError> {
        let tenants =
            sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(tenants)
    }

    async fn list_tenants_for_user(&self, user_id: Uuid) -> Result<Vec<Tenant>, AppError> {
        let tenants = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT t.*
            FROM tenants t
            INNER JOIN memberships m ON m.tenant_id = t.id
            WHERE m.user_id = $1 AND m.status = 'active'
            ORDER BY t.name ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tenants)
    }

    async fn create_tenant_with_owner(
        &self,
        payload: &CreateTenantPayload,
        owner_id: Uuid,
    ) -> Result<(Tenant, Membership), AppError> {
        // 1. Inicia a transação
        let mut tx = self.pool.begin().await?;

        // 2. Cria o tenant
        let tenant = Self::insert_tenant(&mut *tx, payload).await?;

        // 3. O criador vira OWNER
        let membership = Self::insert_owner(&mut *tx, owner_id, tenant.id).await?;

        // 4. Histórico "create tenant" (usado pela migração para inferir o dono)
        let audit = NewHistoryEntry {
            actor_user_id: owner_id,
            tenant_id: tenant.id,
            entity_type: HistoryEntity::Tenant,
            entity_id: Some(tenant.id),
            action: HistoryAction::Create,
            description: format!("Tenant '{}' criado", tenant.name),
        };
        HistoryRepository::insert_entry(&mut *tx, &audit).await?;

        // 5. Commit
        tx.commit().await?;

        Ok((tenant, membership))
    }

    async fn legacy_members(&self, tenant_id: Uuid) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.full_name, u.is_global_admin, u.created_at
            FROM user_tenants ut
            INNER JOIN users u ON u.id = ut.user_id
            WHERE ut.tenant_id = $1
            ORDER BY u.created_at ASC, u.id ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn rebuild_legacy_index(&self) -> Result<(u64, u64), AppError> {
        let mut tx = self.pool.begin().await?;

        // Pares revogados saem do índice
        let removed = sqlx::query(
            r#"
            DELETE FROM user_tenants ut
            USING memberships m
            WHERE m.user_id = ut.user_id
              AND m.tenant_id = ut.tenant_id
              AND m.status = 'revoked'
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // Memberships ativas que ainda não estão no índice entram
        let added = sqlx::query(
            r#"
            INSERT INTO user_tenants (user_id, tenant_id, created_at)
            SELECT user_id, tenant_id, created_at
            FROM memberships
            WHERE status = 'active'
            ON CONFLICT (user_id, tenant_id) DO NOTHING
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok((removed, added))
    }
}
