// src/db/membership_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{history_repo::HistoryRepository, store::MembershipStore},
    models::tenancy::{Membership, MembershipWrite, MembershipWriteKind, NewMembership},
};

const SINGLE_OWNER_INDEX: &str = "memberships_single_owner_idx";
const USER_TENANT_KEY: &str = "memberships_user_tenant_key";

/// Traduz as violações de unicidade de `memberships` em erros de domínio.
pub(crate) fn map_membership_violation(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some(SINGLE_OWNER_INDEX) => {
                    return AppError::InvalidInput("O tenant já possui um OWNER.".into());
                }
                Some(USER_TENANT_KEY) => return AppError::MemberAlreadyExists,
                _ => {}
            }
        }
    }
    e.into()
}

#[derive(Clone)]
pub struct MembershipRepository {
    pool: PgPool,
}

impl MembershipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for MembershipRepository {
    async fn find_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<Membership>, AppError> {
        let membership = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE user_id = $1 AND tenant_id = $2",
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(membership)
    }

    async fn list_memberships(&self, tenant_id: Uuid) -> Result<Vec<Membership>, AppError> {
        let memberships = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE tenant_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(memberships)
    }

    async fn insert_membership_if_absent(
        &self,
        new: &NewMembership,
    ) -> Result<Option<Membership>, AppError> {
        // ON CONFLICT mantém a operação idempotente: reexecuções não duplicam
        let inserted = sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO memberships (user_id, tenant_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, tenant_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(new.tenant_id)
        .bind(new.role)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_membership_violation)?;
        Ok(inserted)
    }

    async fn write_membership(&self, write: &MembershipWrite) -> Result<Membership, AppError> {
        // 1. Inicia a transação
        let mut tx = self.pool.begin().await?;

        // 2. Grava a membership
        let membership = match write.kind {
            MembershipWriteKind::Insert => sqlx::query_as::<_, Membership>(
                r#"
                INSERT INTO memberships (user_id, tenant_id, role, status)
                VALUES ($1, $2, $3, $4)
                RETURNING *
                "#,
            )
            .bind(write.user_id)
            .bind(write.tenant_id)
            .bind(write.role)
            .bind(write.status)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_membership_violation)?,

            MembershipWriteKind::Update => sqlx::query_as::<_, Membership>(
                r#"
                UPDATE memberships
                SET role = $3, status = $4, updated_at = NOW()
                WHERE user_id = $1 AND tenant_id = $2
                RETURNING *
                "#,
            )
            .bind(write.user_id)
            .bind(write.tenant_id)
            .bind(write.role)
            .bind(write.status)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_membership_violation)?
            .ok_or(AppError::ResourceNotFound("Membro"))?,
        };

        // 3. Histórico apontando para a membership gravada
        let mut audit = write.audit.clone();
        audit.entity_id = Some(membership.id);
        HistoryRepository::insert_entry(&mut *tx, &audit).await?;

        // 4. Commit
        tx.commit().await?;

        Ok(membership)
    }
}
