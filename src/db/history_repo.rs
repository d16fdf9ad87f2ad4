// src/db/history_repo.rs

use async_trait::async_trait;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::store::HistoryStore,
    models::history::{HistoryEntry, NewHistoryEntry},
};

#[derive(Clone)]
pub struct HistoryRepository {
    pool: PgPool,
}

impl HistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insere um registro usando qualquer executor (pool ou transação).
    /// Os outros repositórios chamam isto dentro das suas transações.
    pub async fn insert_entry<'e, E>(
        executor: E,
        entry: &NewHistoryEntry,
    ) -> Result<HistoryEntry, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let saved = sqlx::query_as::<_, HistoryEntry>(
            r#"
            INSERT INTO history_entries
                (actor_user_id, tenant_id, entity_type, entity_id, action, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(entry.actor_user_id)
        .bind(entry.tenant_id)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(entry.action)
        .bind(&entry.description)
        .fetch_one(executor)
        .await?;

        Ok(saved)
    }
}

#[async_trait]
impl HistoryStore for HistoryRepository {
    async fn earliest_tenant_creation(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<HistoryEntry>, AppError> {
        let entry = sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT * FROM history_entries
            WHERE tenant_id = $1
              AND entity_type = 'tenant'
              AND action = 'create'
            ORDER BY "timestamp" ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }
}
