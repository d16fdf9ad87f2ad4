// src/services/document_service.rs

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::{DocumentStore, ResourceDirectory},
    models::{
        documents::{
            CreateDocumentPayload, DocumentDraft, FinancialDocument, ItemsWrite, LineItem,
            ResolvedItems, UpdateItemsPayload,
        },
        history::{HistoryAction, HistoryEntity, NewHistoryEntry},
        tenancy::{Capability, ResourceKind},
    },
    services::{
        access_guard::AccessGuard, consistency::ConsistencyManager, numbering::NumberingEngine,
    },
};

#[derive(Clone)]
pub struct DocumentService {
    guard: AccessGuard,
    numbering: NumberingEngine,
    consistency: ConsistencyManager,
    documents: Arc<dyn DocumentStore>,
    resources: Arc<dyn ResourceDirectory>,
}

impl DocumentService {
    pub fn new(
        guard: AccessGuard,
        numbering: NumberingEngine,
        consistency: ConsistencyManager,
        documents: Arc<dyn DocumentStore>,
        resources: Arc<dyn ResourceDirectory>,
    ) -> Self {
        Self {
            guard,
            numbering,
            consistency,
            documents,
            resources,
        }
    }

    /// Cria o documento: verificação de acesso, atribuição do numero e
    /// escrita dupla (snapshot + linhas + histórico) numa única unidade.
    pub async fn create_document(
        &self,
        token: Option<&str>,
        tenant_id: Uuid,
        payload: CreateDocumentPayload,
    ) -> Result<FinancialDocument, AppError> {
        // 1. Acesso
        let access = self
            .guard
            .require_tenant_capability(token, tenant_id, Capability::WriteDocuments)
            .await?;

        // 2. Entrada
        payload.validate()?;
        if let Some(client_id) = payload.client_id {
            self.ensure_in_tenant(ResourceKind::Client, client_id, tenant_id).await?;
        }
        self.ensure_products_in_tenant(&payload.items, tenant_id).await?;

        // 3. As duas representações saem da mesma lista
        let prepared = self.consistency.prepare(&payload.items)?;

        // 4. Numeração com nova tentativa em caso de colisão
        let emission_date = payload.emission_date.unwrap_or_else(|| Utc::now().date_naive());
        let scope = self
            .numbering
            .scope_for(&access.tenant, payload.doc_type, emission_date);
        let document_id = Uuid::new_v4();
        let actor = access.user.id;

        let document = self
            .numbering
            .assign(&scope, |numero| {
                let draft = DocumentDraft {
                    id: document_id,
                    tenant_id,
                    client_id: payload.client_id,
                    doc_type: payload.doc_type,
                    status: payload.status.unwrap_or_default(),
                    emission_date,
                    created_by: actor,
                    items: prepared.clone(),
                    audit: NewHistoryEntry {
                        actor_user_id: actor,
                        tenant_id,
                        entity_type: HistoryEntity::Document,
                        entity_id: Some(document_id),
                        action: HistoryAction::Create,
                        description: format!(
                            "Criação de {} {}",
                            payload.doc_type.label(),
                            numero
                        ),
                    },
                    numero,
                };
                let documents = self.documents.clone();
                async move { documents.insert_document(&draft).await }
            })
            .await?;

        tracing::info!(
            %tenant_id,
            document_id = %document.id,
            numero = %document.numero,
            "Documento criado"
        );
        Ok(document)
    }

    /// Substitui os itens (linhas + snapshot + totais) atomicamente.
    /// O numero nunca muda aqui.
    pub async fn update_document_items(
        &self,
        token: Option<&str>,
        document_id: Uuid,
        payload: UpdateItemsPayload,
    ) -> Result<FinancialDocument, AppError> {
        let access = self
            .guard
            .require_resource_capability(
                token,
                ResourceKind::Document,
                document_id,
                Capability::WriteDocuments,
            )
            .await?;
        let tenant_id = access.tenant.id;

        payload.validate()?;

        let current = self
            .documents
            .find_document(document_id)
            .await?
            .ok_or(AppError::ResourceNotFound("Documento"))?;
        if let Some(reason) = current.immutability_reason() {
            return Err(AppError::DocumentLocked(reason));
        }
        self.ensure_products_in_tenant(&payload.items, tenant_id).await?;

        let write = ItemsWrite {
            document_id,
            items: self.consistency.prepare(&payload.items)?,
            audit: NewHistoryEntry {
                actor_user_id: access.user.id,
                tenant_id,
                entity_type: HistoryEntity::Document,
                entity_id: Some(document_id),
                action: HistoryAction::Update,
                description: format!(
                    "Itens de {} {} atualizados ({} linhas)",
                    current.doc_type.label(),
                    current.numero,
                    payload.items.len()
                ),
            },
        };

        self.documents.replace_line_items(&write).await
    }

    pub async fn get_document_items(
        &self,
        token: Option<&str>,
        document_id: Uuid,
    ) -> Result<ResolvedItems, AppError> {
        self.guard
            .require_resource_capability(
                token,
                ResourceKind::Document,
                document_id,
                Capability::ReadDocuments,
            )
            .await?;

        let document = self
            .documents
            .find_document(document_id)
            .await?
            .ok_or(AppError::ResourceNotFound("Documento"))?;
        let rows = self.documents.list_line_item_rows(document_id).await?;

        self.consistency.resolve(&document, &rows)
    }

    /// Exclusão lógica: o numero continua reservado no escopo.
    pub async fn delete_document(&self, token: Option<&str>, document_id: Uuid) -> Result<(), AppError> {
        let access = self
            .guard
            .require_resource_capability(
                token,
                ResourceKind::Document,
                document_id,
                Capability::WriteDocuments,
            )
            .await?;

        let document = self
            .documents
            .find_document(document_id)
            .await?
            .ok_or(AppError::ResourceNotFound("Documento"))?;

        let audit = NewHistoryEntry {
            actor_user_id: access.user.id,
            tenant_id: access.tenant.id,
            entity_type: HistoryEntity::Document,
            entity_id: Some(document_id),
            action: HistoryAction::Delete,
            description: format!(
                "Exclusão de {} {}",
                document.doc_type.label(),
                document.numero
            ),
        };

        self.documents.soft_delete_document(document_id, &audit).await
    }

    // Referência a recurso de outro tenant responde como inexistente
    async fn ensure_in_tenant(
        &self,
        kind: ResourceKind,
        id: Uuid,
        tenant_id: Uuid,
    ) -> Result<(), AppError> {
        match self.resources.owning_tenant(kind, id).await? {
            Some(owner) if owner == tenant_id => Ok(()),
            _ => Err(AppError::ResourceNotFound(kind.label())),
        }
    }

    async fn ensure_products_in_tenant(
        &self,
        items: &[LineItem],
        tenant_id: Uuid,
    ) -> Result<(), AppError> {
        for product_id in items.iter().filter_map(|i| i.product_id) {
            self.ensure_in_tenant(ResourceKind::Product, product_id, tenant_id)
                .await?;
        }
        Ok(())
    }
}
