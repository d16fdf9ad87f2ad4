// src/db/document_repo.rs

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        history_repo::HistoryRepository,
        store::{DocumentStore, ResourceDirectory},
    },
    models::{
        documents::{
            DocumentDraft, DocumentType, FinancialDocument, ItemsWrite, LineItemRow,
            NewLineItemRow, NumberedDocument,
        },
        history::NewHistoryEntry,
        tenancy::ResourceKind,
    },
};

// Nome da constraint UNIQUE (tenant_id, doc_type, numero) na migration
pub const NUMERO_CONSTRAINT: &str = "financial_documents_scope_numero_key";

fn map_numero_violation(e: sqlx::Error, numero: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() && db_err.constraint() == Some(NUMERO_CONSTRAINT) {
            return AppError::DuplicateNumero(numero.to_string());
        }
    }
    e.into()
}

#[derive(Clone)]
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_rows(
        tx: &mut Transaction<'_, Postgres>,
        document_id: Uuid,
        rows: &[NewLineItemRow],
    ) -> Result<(), AppError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO line_item_rows (
                    document_id, position, description, quantity, unit_price,
                    tax_rate, discount, discount_kind, product_id, line_total
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(document_id)
            .bind(row.position)
            .bind(&row.description)
            .bind(row.quantity)
            .bind(row.unit_price)
            .bind(row.tax_rate)
            .bind(row.discount)
            .bind(row.discount_kind)
            .bind(row.product_id)
            .bind(row.line_total)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    // Trava a linha do documento até o fim da transação
    async fn lock_document(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<FinancialDocument, AppError> {
        sqlx::query_as::<_, FinancialDocument>(
            "SELECT * FROM financial_documents WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AppError::ResourceNotFound("Documento"))
    }
}

#[async_trait]
impl DocumentStore for DocumentRepository {
    async fn max_sequence(
        &self,
        tenant_id: Uuid,
        doc_type: DocumentType,
        stem: &str,
    ) -> Result<Option<i64>, AppError> {
        let stem_len = stem.chars().count() as i32;

        // Só conta numeros "stem + dígitos"; sufixos como "-2" do reparo ficam de fora.
        // O limite de 18 dígitos garante que o CAST para BIGINT não estoura.
        let max: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(
                CASE WHEN substring(numero FROM $4) ~ '^[0-9]{1,18}$'
                     THEN CAST(substring(numero FROM $4) AS BIGINT)
                END
            )
            FROM financial_documents
            WHERE tenant_id = $1
              AND doc_type = $2
              AND left(numero, $3) = $5
            "#,
        )
        .bind(tenant_id)
        .bind(doc_type)
        .bind(stem_len)
        .bind(stem_len + 1)
        .bind(stem)
        .fetch_one(&self.pool)
        .await?;

        Ok(max)
    }

    async fn insert_document(&self, draft: &DocumentDraft) -> Result<FinancialDocument, AppError> {
        // 1. Inicia a transação: documento, linhas e histórico entram juntos
        let mut tx = self.pool.begin().await?;

        // 2. Cabeçalho + snapshot
        let document = sqlx::query_as::<_, FinancialDocument>(
            r#"
            INSERT INTO financial_documents (
                id, tenant_id, client_id, doc_type, numero, status, emission_date,
                total_ht, total_ttc, items_snapshot, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(draft.id)
        .bind(draft.tenant_id)
        .bind(draft.client_id)
        .bind(draft.doc_type)
        .bind(&draft.numero)
        .bind(draft.status)
        .bind(draft.emission_date)
        .bind(draft.items.total_ht)
        .bind(draft.items.total_ttc)
        .bind(&draft.items.snapshot)
        .bind(draft.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_numero_violation(e, &draft.numero))?;

        // 3. Linhas relacionais
        Self::insert_rows(&mut tx, document.id, &draft.items.rows).await?;

        // 4. Histórico
        HistoryRepository::insert_entry(&mut *tx, &draft.audit).await?;

        // 5. Commit
        tx.commit().await?;

        Ok(document)
    }

    async fn find_document(&self, id: Uuid) -> Result<Option<FinancialDocument>, AppError> {
        let document =
            sqlx::query_as::<_, FinancialDocument>("SELECT * FROM financial_documents WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(document)
    }

    async fn list_line_item_rows(&self, document_id: Uuid) -> Result<Vec<LineItemRow>, AppError> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            "SELECT * FROM line_item_rows WHERE document_id = $1 ORDER BY position ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn replace_line_items(&self, write: &ItemsWrite) -> Result<FinancialDocument, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Trava e revalida a mutabilidade dentro da transação
        let current = Self::lock_document(&mut tx, write.document_id).await?;
        if let Some(reason) = current.immutability_reason() {
            return Err(AppError::DocumentLocked(reason));
        }

        // 2. Snapshot e totais
        let document = sqlx::query_as::<_, FinancialDocument>(
            r#"
            UPDATE financial_documents
            SET items_snapshot = $2, total_ht = $3, total_ttc = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(write.document_id)
        .bind(&write.items.snapshot)
        .bind(write.items.total_ht)
        .bind(write.items.total_ttc)
        .fetch_one(&mut *tx)
        .await?;

        // 3. Linhas: substituição completa
        sqlx::query("DELETE FROM line_item_rows WHERE document_id = $1")
            .bind(write.document_id)
            .execute(&mut *tx)
            .await?;
        Self::insert_rows(&mut tx, write.document_id, &write.items.rows).await?;

        // 4. Histórico
        HistoryRepository::insert_entry(&mut *tx, &write.audit).await?;

        tx.commit().await?;

        Ok(document)
    }

    async fn soft_delete_document(&self, id: Uuid, audit: &NewHistoryEntry) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query(
            r#"
            UPDATE financial_documents
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::ResourceNotFound("Documento"));
        }

        HistoryRepository::insert_entry(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn write_snapshot(&self, id: Uuid, snapshot: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE financial_documents SET items_snapshot = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(snapshot)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_numbering_scopes(
        &self,
        tenant_id: Option<Uuid>,
        doc_type: Option<DocumentType>,
    ) -> Result<Vec<(Uuid, DocumentType)>, AppError> {
        let scopes = sqlx::query_as::<_, (Uuid, DocumentType)>(
            r#"
            SELECT DISTINCT tenant_id, doc_type
            FROM financial_documents
            WHERE ($1::uuid IS NULL OR tenant_id = $1)
              AND ($2::document_type IS NULL OR doc_type = $2)
            ORDER BY tenant_id, doc_type
            "#,
        )
        .bind(tenant_id)
        .bind(doc_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(scopes)
    }

    async fn list_numbered_documents(
        &self,
        tenant_id: Uuid,
        doc_type: DocumentType,
    ) -> Result<Vec<NumberedDocument>, AppError> {
        let docs = sqlx::query_as::<_, NumberedDocument>(
            r#"
            SELECT id, numero, created_at
            FROM financial_documents
            WHERE tenant_id = $1 AND doc_type = $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(doc_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    async fn reassign_numero(&self, id: Uuid, numero: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE financial_documents SET numero = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(numero)
            .execute(&self.pool)
            .await
            .map_err(|e| map_numero_violation(e, numero))?;
        Ok(())
    }

    async fn list_document_ids(&self, tenant_id: Option<Uuid>) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM financial_documents
            WHERE deleted_at IS NULL
              AND ($1::uuid IS NULL OR tenant_id = $1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl ResourceDirectory for DocumentRepository {
    async fn owning_tenant(&self, kind: ResourceKind, id: Uuid) -> Result<Option<Uuid>, AppError> {
        let sql = match kind {
            ResourceKind::Client => "SELECT tenant_id FROM clients WHERE id = $1",
            ResourceKind::Product => "SELECT tenant_id FROM products WHERE id = $1",
            ResourceKind::Document => {
                "SELECT tenant_id FROM financial_documents WHERE id = $1 AND deleted_at IS NULL"
            }
        };

        let tenant_id = sqlx::query_scalar::<_, Uuid>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant_id)
    }
}
