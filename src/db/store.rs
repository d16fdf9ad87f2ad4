// src/db/store.rs
//
// Portas de persistência. Os serviços só enxergam estes traits; o Postgres e
// o armazenamento em memória (testes, ferramentas locais) os implementam.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        document_repo::DocumentRepository, history_repo::HistoryRepository,
        memory::MemoryStore, membership_repo::MembershipRepository,
        tenancy_repo::TenantRepository, user_repo::UserRepository,
    },
    models::{
        auth::User,
        documents::{
            DocumentDraft, DocumentType, FinancialDocument, ItemsWrite, LineItemRow,
            NumberedDocument,
        },
        history::{HistoryEntry, NewHistoryEntry},
        tenancy::{
            CreateTenantPayload, Membership, MembershipWrite, NewMembership, ResourceKind, Tenant,
        },
    },
};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_tenant(&self, id: Uuid) -> Result<Option<Tenant>, AppError>;

    async fn list_tenants(&self) -> Result<Vec<Tenant>, AppError>;

    /// Tenants onde o usuário tem uma membership ativa.
    async fn list_tenants_for_user(&self, user_id: Uuid) -> Result<Vec<Tenant>, AppError>;

    /// Cria o tenant, a membership OWNER do criador e o registro de histórico
    /// numa única transação.
    async fn create_tenant_with_owner(
        &self,
        payload: &CreateTenantPayload,
        owner_id: Uuid,
    ) -> Result<(Tenant, Membership), AppError>;

    /// Usuários do índice legado `user_tenants`, ordenados por (created_at, id).
    async fn legacy_members(&self, tenant_id: Uuid) -> Result<Vec<User>, AppError>;

    /// Sincroniza o índice legado com as memberships: remove pares revogados
    /// e adiciona os ativos que faltam. Devolve (removidos, adicionados).
    async fn rebuild_legacy_index(&self) -> Result<(u64, u64), AppError>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn find_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<Membership>, AppError>;

    async fn list_memberships(&self, tenant_id: Uuid) -> Result<Vec<Membership>, AppError>;

    /// `None` quando o par (usuário, tenant) já existe.
    async fn insert_membership_if_absent(
        &self,
        new: &NewMembership,
    ) -> Result<Option<Membership>, AppError>;

    /// Grava a membership e o seu histórico numa única transação.
    /// Inserção repetida vira `AppError::MemberAlreadyExists`.
    async fn write_membership(&self, write: &MembershipWrite) -> Result<Membership, AppError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Registro "create tenant" mais antigo do tenant.
    async fn earliest_tenant_creation(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<HistoryEntry>, AppError>;
}

#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Tenant dono do recurso; `None` se o recurso não existe.
    async fn owning_tenant(&self, kind: ResourceKind, id: Uuid) -> Result<Option<Uuid>, AppError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Maior sequência do escopo: documentos cujo numero começa por `stem` e
    /// cujo restante é inteiramente numérico.
    async fn max_sequence(
        &self,
        tenant_id: Uuid,
        doc_type: DocumentType,
        stem: &str,
    ) -> Result<Option<i64>, AppError>;

    /// Insere documento, linhas e histórico atomicamente.
    /// Numero repetido no escopo vira `AppError::DuplicateNumero`.
    async fn insert_document(&self, draft: &DocumentDraft) -> Result<FinancialDocument, AppError>;

    async fn find_document(&self, id: Uuid) -> Result<Option<FinancialDocument>, AppError>;

    async fn list_line_item_rows(&self, document_id: Uuid) -> Result<Vec<LineItemRow>, AppError>;

    /// Troca snapshot, linhas e totais de uma vez. Recusa documentos imutáveis.
    async fn replace_line_items(&self, write: &ItemsWrite) -> Result<FinancialDocument, AppError>;

    async fn soft_delete_document(&self, id: Uuid, audit: &NewHistoryEntry) -> Result<(), AppError>;

    async fn write_snapshot(&self, id: Uuid, snapshot: &str) -> Result<(), AppError>;

    async fn list_numbering_scopes(
        &self,
        tenant_id: Option<Uuid>,
        doc_type: Option<DocumentType>,
    ) -> Result<Vec<(Uuid, DocumentType)>, AppError>;

    /// Todos os documentos do escopo (inclusive excluídos), por (created_at, id).
    async fn list_numbered_documents(
        &self,
        tenant_id: Uuid,
        doc_type: DocumentType,
    ) -> Result<Vec<NumberedDocument>, AppError>;

    async fn reassign_numero(&self, id: Uuid, numero: &str) -> Result<(), AppError>;

    /// Documentos não excluídos, opcionalmente de um só tenant.
    async fn list_document_ids(&self, tenant_id: Option<Uuid>) -> Result<Vec<Uuid>, AppError>;
}

// ---
// Conjunto de portas injetado no AppState e nas ferramentas de lote
// ---
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub tenants: Arc<dyn TenantStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub history: Arc<dyn HistoryStore>,
    pub resources: Arc<dyn ResourceDirectory>,
    pub documents: Arc<dyn DocumentStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        let documents = Arc::new(DocumentRepository::new(pool.clone()));
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            tenants: Arc::new(TenantRepository::new(pool.clone())),
            memberships: Arc::new(MembershipRepository::new(pool.clone())),
            history: Arc::new(HistoryRepository::new(pool)),
            resources: documents.clone(),
            documents,
        }
    }

    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            tenants: store.clone(),
            memberships: store.clone(),
            history: store.clone(),
            resources: store.clone(),
            documents: store,
        }
    }
}
