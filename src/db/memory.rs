// src/db/memory.rs
//
// Implementação em memória de todas as portas. Usada pelos testes e pelas
// ferramentas que rodam sem banco. As escritas "transacionais" validam tudo
// antes de aplicar qualquer mudança, então uma falha não deixa estado parcial.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::store::{
        DocumentStore, HistoryStore, MembershipStore, ResourceDirectory, TenantStore, UserStore,
    },
    models::{
        auth::User,
        documents::{
            DocumentDraft, DocumentStatus, DocumentType, FinancialDocument, ItemsWrite,
            LineItemRow, NewLineItemRow, NumberedDocument,
        },
        history::{HistoryAction, HistoryEntity, HistoryEntry, NewHistoryEntry},
        tenancy::{
            CreateTenantPayload, Membership, MembershipRole, MembershipStatus, MembershipWrite,
            MembershipWriteKind, NewMembership, ResourceKind, Tenant,
        },
    },
};

/// Documento "como veio do sistema antigo": ignora a unicidade do numero e
/// aceita qualquer snapshot, inclusive ausente ou corrompido.
#[derive(Debug, Clone)]
pub struct LegacyDocument {
    pub tenant_id: Uuid,
    pub doc_type: DocumentType,
    pub numero: String,
    pub snapshot: Option<String>,
    pub rows: Vec<NewLineItemRow>,
}

#[derive(Default)]
struct MemoryState {
    ticks: i64,
    users: Vec<User>,
    tenants: Vec<Tenant>,
    legacy_index: Vec<(Uuid, Uuid, DateTime<Utc>)>,
    memberships: Vec<Membership>,
    clients: HashMap<Uuid, Uuid>,
    products: HashMap<Uuid, Uuid>,
    documents: Vec<FinancialDocument>,
    rows: Vec<LineItemRow>,
    history: Vec<HistoryEntry>,
    fail_history_writes: bool,
}

pub struct MemoryStore {
    base: DateTime<Utc>,
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            base: Utc::now(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Relógio monotônico: cada leitura avança 1ms, então a ordem de criação
    // é sempre estrita (o Postgres usa clock_timestamp() para o mesmo fim)
    fn tick(&self, state: &mut MemoryState) -> DateTime<Utc> {
        state.ticks += 1;
        self.base + Duration::milliseconds(state.ticks)
    }

    fn history_entry(&self, state: &mut MemoryState, entry: &NewHistoryEntry) -> HistoryEntry {
        HistoryEntry {
            id: Uuid::new_v4(),
            actor_user_id: entry.actor_user_id,
            tenant_id: entry.tenant_id,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            action: entry.action,
            description: entry.description.clone(),
            timestamp: self.tick(state),
        }
    }

    fn check_history_writable(state: &MemoryState) -> Result<(), AppError> {
        if state.fail_history_writes {
            return Err(AppError::InternalServerError(anyhow::anyhow!(
                "falha simulada ao gravar histórico"
            )));
        }
        Ok(())
    }

    fn materialize_rows(document_id: Uuid, rows: &[NewLineItemRow]) -> Vec<LineItemRow> {
        rows.iter()
            .map(|row| LineItemRow {
                id: Uuid::new_v4(),
                document_id,
                position: row.position,
                description: row.description.clone(),
                quantity: row.quantity,
                unit_price: row.unit_price,
                tax_rate: row.tax_rate,
                discount: row.discount,
                discount_kind: row.discount_kind,
                product_id: row.product_id,
                line_total: row.line_total,
            })
            .collect()
    }

    fn owner_conflict(
        state: &MemoryState,
        user_id: Uuid,
        tenant_id: Uuid,
        role: MembershipRole,
    ) -> bool {
        role == MembershipRole::Owner
            && state.memberships.iter().any(|m| {
                m.tenant_id == tenant_id && m.role == MembershipRole::Owner && m.user_id != user_id
            })
    }

    // --- Carga de dados (testes e ferramentas) ---

    pub fn add_user(&self, email: &str, is_global_admin: bool) -> User {
        let mut state = self.state();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: email.split('@').next().unwrap_or_default().to_string(),
            is_global_admin,
            created_at: self.tick(&mut state),
        };
        state.users.push(user.clone());
        user
    }

    pub fn add_tenant(
        &self,
        name: &str,
        invoice_prefix: Option<&str>,
        quote_prefix: Option<&str>,
    ) -> Tenant {
        let mut state = self.state();
        let now = self.tick(&mut state);
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: name.to_string(),
            invoice_prefix: invoice_prefix.map(str::to_string),
            quote_prefix: quote_prefix.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        state.tenants.push(tenant.clone());
        tenant
    }

    pub fn add_legacy_member(&self, user_id: Uuid, tenant_id: Uuid) {
        let mut state = self.state();
        let now = self.tick(&mut state);
        if !state
            .legacy_index
            .iter()
            .any(|(u, t, _)| *u == user_id && *t == tenant_id)
        {
            state.legacy_index.push((user_id, tenant_id, now));
        }
    }

    /// Grava uma membership diretamente, sem as regras do serviço.
    pub fn add_membership(&self, user_id: Uuid, tenant_id: Uuid, role: MembershipRole) -> Membership {
        let mut state = self.state();
        let now = self.tick(&mut state);
        let membership = Membership {
            id: Uuid::new_v4(),
            user_id,
            tenant_id,
            role,
            status: MembershipStatus::Active,
            created_at: now,
            updated_at: now,
        };
        state.memberships.push(membership.clone());
        membership
    }

    pub fn add_client(&self, tenant_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.state().clients.insert(id, tenant_id);
        id
    }

    pub fn add_product(&self, tenant_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.state().products.insert(id, tenant_id);
        id
    }

    pub fn record_tenant_creation(&self, actor_user_id: Uuid, tenant_id: Uuid) -> HistoryEntry {
        let mut state = self.state();
        let entry = NewHistoryEntry {
            actor_user_id,
            tenant_id,
            entity_type: HistoryEntity::Tenant,
            entity_id: Some(tenant_id),
            action: HistoryAction::Create,
            description: "Tenant criado".into(),
        };
        let saved = self.history_entry(&mut state, &entry);
        state.history.push(saved.clone());
        saved
    }

    pub fn insert_legacy_document(&self, legacy: LegacyDocument) -> Uuid {
        let mut state = self.state();
        let now = self.tick(&mut state);
        let id = Uuid::new_v4();
        let total_ht: Decimal = legacy.rows.iter().map(|r| r.line_total).sum();
        state.documents.push(FinancialDocument {
            id,
            tenant_id: legacy.tenant_id,
            client_id: None,
            doc_type: legacy.doc_type,
            numero: legacy.numero,
            status: DocumentStatus::Draft,
            emission_date: now.date_naive(),
            total_ht,
            total_ttc: total_ht,
            items_snapshot: legacy.snapshot,
            is_locked: false,
            created_by: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
            deleted_at: None,
        });
        let rows = Self::materialize_rows(id, &legacy.rows);
        state.rows.extend(rows);
        id
    }

    pub fn set_locked(&self, document_id: Uuid, locked: bool) {
        let mut state = self.state();
        if let Some(doc) = state.documents.iter_mut().find(|d| d.id == document_id) {
            doc.is_locked = locked;
        }
    }

    /// Faz falhar toda escrita que inclui histórico (simula rollback).
    pub fn fail_history_writes(&self, fail: bool) {
        self.state().fail_history_writes = fail;
    }

    // --- Inspeção ---

    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        self.state().history.clone()
    }

    pub fn all_memberships(&self) -> Vec<Membership> {
        self.state().memberships.clone()
    }

    pub fn legacy_index(&self) -> Vec<(Uuid, Uuid)> {
        self.state()
            .legacy_index
            .iter()
            .map(|(u, t, _)| (*u, *t))
            .collect()
    }

    pub fn all_documents(&self) -> Vec<FinancialDocument> {
        self.state().documents.clone()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state().users.iter().find(|u| u.id == id).cloned())
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn find_tenant(&self, id: Uuid) -> Result<Option<Tenant>, AppError> {
        Ok(self.state().tenants.iter().find(|t| t.id == id).cloned())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, AppError> {
        let mut tenants = self.state().tenants.clone();
        tenants.sort_by_key(|t| (t.created_at, t.id));
        Ok(tenants)
    }

    async fn list_tenants_for_user(&self, user_id: Uuid) -> Result<Vec<Tenant>, AppError> {
        let state = self.state();
        let mut tenants: Vec<Tenant> = state
            .tenants
            .iter()
            .filter(|t| {
                state
                    .memberships
                    .iter()
                    .any(|m| m.tenant_id == t.id && m.user_id == user_id && m.is_active())
            })
            .cloned()
            .collect();
        tenants.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tenants)
    }

    async fn create_tenant_with_owner(
        &self,
        payload: &CreateTenantPayload,
        owner_id: Uuid,
    ) -> Result<(Tenant, Membership), AppError> {
        let mut state = self.state();
        Self::check_history_writable(&state)?;

        let now = self.tick(&mut state);
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: payload.name.trim().to_string(),
            invoice_prefix: payload.invoice_prefix.clone(),
            quote_prefix: payload.quote_prefix.clone(),
            created_at: now,
            updated_at: now,
        };
        let membership = Membership {
            id: Uuid::new_v4(),
            user_id: owner_id,
            tenant_id: tenant.id,
            role: MembershipRole::Owner,
            status: MembershipStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let audit = NewHistoryEntry {
            actor_user_id: owner_id,
            tenant_id: tenant.id,
            entity_type: HistoryEntity::Tenant,
            entity_id: Some(tenant.id),
            action: HistoryAction::Create,
            description: format!("Tenant '{}' criado", tenant.name),
        };
        let entry = self.history_entry(&mut state, &audit);

        state.tenants.push(tenant.clone());
        state.memberships.push(membership.clone());
        state.history.push(entry);

        Ok((tenant, membership))
    }

    async fn legacy_members(&self, tenant_id: Uuid) -> Result<Vec<User>, AppError> {
        let state = self.state();
        let mut users: Vec<User> = state
            .legacy_index
            .iter()
            .filter(|(_, t, _)| *t == tenant_id)
            .filter_map(|(u, _, _)| state.users.iter().find(|user| user.id == *u))
            .cloned()
            .collect();
        users.sort_by_key(|u| (u.created_at, u.id));
        Ok(users)
    }

    async fn rebuild_legacy_index(&self) -> Result<(u64, u64), AppError> {
        let mut state = self.state();

        let revoked: Vec<(Uuid, Uuid)> = state
            .memberships
            .iter()
            .filter(|m| !m.is_active())
            .map(|m| (m.user_id, m.tenant_id))
            .collect();
        let before = state.legacy_index.len();
        state
            .legacy_index
            .retain(|(u, t, _)| !revoked.contains(&(*u, *t)));
        let removed = (before - state.legacy_index.len()) as u64;

        let missing: Vec<(Uuid, Uuid, DateTime<Utc>)> = state
            .memberships
            .iter()
            .filter(|m| m.is_active())
            .filter(|m| {
                !state
                    .legacy_index
                    .iter()
                    .any(|(u, t, _)| *u == m.user_id && *t == m.tenant_id)
            })
            .map(|m| (m.user_id, m.tenant_id, m.created_at))
            .collect();
        let added = missing.len() as u64;
        state.legacy_index.extend(missing);

        Ok((removed, added))
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn find_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<Membership>, AppError> {
        Ok(self
            .state()
            .memberships
            .iter()
            .find(|m| m.user_id == user_id && m.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_memberships(&self, tenant_id: Uuid) -> Result<Vec<Membership>, AppError> {
        let mut memberships: Vec<Membership> = self
            .state()
            .memberships
            .iter()
            .filter(|m| m.tenant_id == tenant_id)
            .cloned()
            .collect();
        memberships.sort_by_key(|m| (m.created_at, m.id));
        Ok(memberships)
    }

    async fn insert_membership_if_absent(
        &self,
        new: &NewMembership,
    ) -> Result<Option<Membership>, AppError> {
        let mut state = self.state();
        if state
            .memberships
            .iter()
            .any(|m| m.user_id == new.user_id && m.tenant_id == new.tenant_id)
        {
            return Ok(None);
        }
        if Self::owner_conflict(&state, new.user_id, new.tenant_id, new.role) {
            return Err(AppError::InvalidInput("O tenant já possui um OWNER.".into()));
        }

        let now = self.tick(&mut state);
        let membership = Membership {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            tenant_id: new.tenant_id,
            role: new.role,
            status: MembershipStatus::Active,
            created_at: now,
            updated_at: now,
        };
        state.memberships.push(membership.clone());
        Ok(Some(membership))
    }

    async fn write_membership(&self, write: &MembershipWrite) -> Result<Membership, AppError> {
        let mut state = self.state();

        let existing = state
            .memberships
            .iter()
            .position(|m| m.user_id == write.user_id && m.tenant_id == write.tenant_id);
        match (write.kind, existing) {
            (MembershipWriteKind::Insert, Some(_)) => return Err(AppError::MemberAlreadyExists),
            (MembershipWriteKind::Update, None) => return Err(AppError::ResourceNotFound("Membro")),
            _ => {}
        }
        if Self::owner_conflict(&state, write.user_id, write.tenant_id, write.role) {
            return Err(AppError::InvalidInput("O tenant já possui um OWNER.".into()));
        }
        Self::check_history_writable(&state)?;

        let now = self.tick(&mut state);
        let membership = match existing {
            Some(index) => {
                let current = &mut state.memberships[index];
                current.role = write.role;
                current.status = write.status;
                current.updated_at = now;
                current.clone()
            }
            None => {
                let created = Membership {
                    id: Uuid::new_v4(),
                    user_id: write.user_id,
                    tenant_id: write.tenant_id,
                    role: write.role,
                    status: write.status,
                    created_at: now,
                    updated_at: now,
                };
                state.memberships.push(created.clone());
                created
            }
        };

        let mut audit = write.audit.clone();
        audit.entity_id = Some(membership.id);
        let entry = self.history_entry(&mut state, &audit);
        state.history.push(entry);

        Ok(membership)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn earliest_tenant_creation(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<HistoryEntry>, AppError> {
        Ok(self
            .state()
            .history
            .iter()
            .filter(|h| {
                h.tenant_id == tenant_id
                    && h.entity_type == HistoryEntity::Tenant
                    && h.action == HistoryAction::Create
            })
            .min_by_key(|h| (h.timestamp, h.id))
            .cloned())
    }
}

#[async_trait]
impl ResourceDirectory for MemoryStore {
    async fn owning_tenant(&self, kind: ResourceKind, id: Uuid) -> Result<Option<Uuid>, AppError> {
        let state = self.state();
        let tenant = match kind {
            ResourceKind::Client => state.clients.get(&id).copied(),
            ResourceKind::Product => state.products.get(&id).copied(),
            ResourceKind::Document => state
                .documents
                .iter()
                .find(|d| d.id == id && d.deleted_at.is_none())
                .map(|d| d.tenant_id),
        };
        Ok(tenant)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn max_sequence(
        &self,
        tenant_id: Uuid,
        doc_type: DocumentType,
        stem: &str,
    ) -> Result<Option<i64>, AppError> {
        Ok(self
            .state()
            .documents
            .iter()
            .filter(|d| d.tenant_id == tenant_id && d.doc_type == doc_type)
            .filter_map(|d| d.numero.strip_prefix(stem))
            .filter(|rest| !rest.is_empty() && rest.len() <= 18)
            .filter(|rest| rest.bytes().all(|b| b.is_ascii_digit()))
            .filter_map(|rest| rest.parse::<i64>().ok())
            .max())
    }

    async fn insert_document(&self, draft: &DocumentDraft) -> Result<FinancialDocument, AppError> {
        let mut state = self.state();

        if state.documents.iter().any(|d| {
            d.tenant_id == draft.tenant_id && d.doc_type == draft.doc_type && d.numero == draft.numero
        }) {
            return Err(AppError::DuplicateNumero(draft.numero.clone()));
        }
        Self::check_history_writable(&state)?;

        let now = self.tick(&mut state);
        let document = FinancialDocument {
            id: draft.id,
            tenant_id: draft.tenant_id,
            client_id: draft.client_id,
            doc_type: draft.doc_type,
            numero: draft.numero.clone(),
            status: draft.status,
            emission_date: draft.emission_date,
            total_ht: draft.items.total_ht,
            total_ttc: draft.items.total_ttc,
            items_snapshot: Some(draft.items.snapshot.clone()),
            is_locked: false,
            created_by: Some(draft.created_by),
            created_at: now,
            updated_at: now,
            archived_at: None,
            deleted_at: None,
        };
        let rows = Self::materialize_rows(document.id, &draft.items.rows);
        let entry = self.history_entry(&mut state, &draft.audit);

        state.documents.push(document.clone());
        state.rows.extend(rows);
        state.history.push(entry);

        Ok(document)
    }

    async fn find_document(&self, id: Uuid) -> Result<Option<FinancialDocument>, AppError> {
        Ok(self.state().documents.iter().find(|d| d.id == id).cloned())
    }

    async fn list_line_item_rows(&self, document_id: Uuid) -> Result<Vec<LineItemRow>, AppError> {
        let mut rows: Vec<LineItemRow> = self
            .state()
            .rows
            .iter()
            .filter(|r| r.document_id == document_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.position);
        Ok(rows)
    }

    async fn replace_line_items(&self, write: &ItemsWrite) -> Result<FinancialDocument, AppError> {
        let mut state = self.state();

        let current = state
            .documents
            .iter()
            .find(|d| d.id == write.document_id)
            .ok_or(AppError::ResourceNotFound("Documento"))?;
        if let Some(reason) = current.immutability_reason() {
            return Err(AppError::DocumentLocked(reason));
        }
        Self::check_history_writable(&state)?;

        let now = self.tick(&mut state);
        let rows = Self::materialize_rows(write.document_id, &write.items.rows);
        let entry = self.history_entry(&mut state, &write.audit);

        state.rows.retain(|r| r.document_id != write.document_id);
        state.rows.extend(rows);
        state.history.push(entry);

        let document = state
            .documents
            .iter_mut()
            .find(|d| d.id == write.document_id)
            .ok_or(AppError::ResourceNotFound("Documento"))?;
        document.items_snapshot = Some(write.items.snapshot.clone());
        document.total_ht = write.items.total_ht;
        document.total_ttc = write.items.total_ttc;
        document.updated_at = now;

        Ok(document.clone())
    }

    async fn soft_delete_document(&self, id: Uuid, audit: &NewHistoryEntry) -> Result<(), AppError> {
        let mut state = self.state();
        if !state
            .documents
            .iter()
            .any(|d| d.id == id && d.deleted_at.is_none())
        {
            return Err(AppError::ResourceNotFound("Documento"));
        }
        Self::check_history_writable(&state)?;

        let now = self.tick(&mut state);
        let entry = self.history_entry(&mut state, audit);
        state.history.push(entry);
        if let Some(doc) = state.documents.iter_mut().find(|d| d.id == id) {
            doc.deleted_at = Some(now);
            doc.updated_at = now;
        }
        Ok(())
    }

    async fn write_snapshot(&self, id: Uuid, snapshot: &str) -> Result<(), AppError> {
        let mut state = self.state();
        let now = self.tick(&mut state);
        let doc = state
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(AppError::ResourceNotFound("Documento"))?;
        doc.items_snapshot = Some(snapshot.to_string());
        doc.updated_at = now;
        Ok(())
    }

    async fn list_numbering_scopes(
        &self,
        tenant_id: Option<Uuid>,
        doc_type: Option<DocumentType>,
    ) -> Result<Vec<(Uuid, DocumentType)>, AppError> {
        let scopes: BTreeSet<(Uuid, DocumentType)> = self
            .state()
            .documents
            .iter()
            .filter(|d| tenant_id.is_none_or(|t| d.tenant_id == t))
            .filter(|d| doc_type.is_none_or(|k| d.doc_type == k))
            .map(|d| (d.tenant_id, d.doc_type))
            .collect();
        Ok(scopes.into_iter().collect())
    }

    async fn list_numbered_documents(
        &self,
        tenant_id: Uuid,
        doc_type: DocumentType,
    ) -> Result<Vec<NumberedDocument>, AppError> {
        let mut docs: Vec<NumberedDocument> = self
            .state()
            .documents
            .iter()
            .filter(|d| d.tenant_id == tenant_id && d.doc_type == doc_type)
            .map(|d| NumberedDocument {
                id: d.id,
                numero: d.numero.clone(),
                created_at: d.created_at,
            })
            .collect();
        docs.sort_by_key(|d| (d.created_at, d.id));
        Ok(docs)
    }

    async fn reassign_numero(&self, id: Uuid, numero: &str) -> Result<(), AppError> {
        let mut state = self.state();
        let (tenant_id, doc_type) = state
            .documents
            .iter()
            .find(|d| d.id == id)
            .map(|d| (d.tenant_id, d.doc_type))
            .ok_or(AppError::ResourceNotFound("Documento"))?;
        if state.documents.iter().any(|d| {
            d.id != id && d.tenant_id == tenant_id && d.doc_type == doc_type && d.numero == numero
        }) {
            return Err(AppError::DuplicateNumero(numero.to_string()));
        }

        let now = self.tick(&mut state);
        if let Some(doc) = state.documents.iter_mut().find(|d| d.id == id) {
            doc.numero = numero.to_string();
            doc.updated_at = now;
        }
        Ok(())
    }

    async fn list_document_ids(&self, tenant_id: Option<Uuid>) -> Result<Vec<Uuid>, AppError> {
        let mut docs: Vec<(DateTime<Utc>, Uuid)> = self
            .state()
            .documents
            .iter()
            .filter(|d| d.deleted_at.is_none())
            .filter(|d| tenant_id.is_none_or(|t| d.tenant_id == t))
            .map(|d| (d.created_at, d.id))
            .collect();
        docs.sort();
        Ok(docs.into_iter().map(|(_, id)| id).collect())
    }
}
