// src/models/reports.rs
//
// Relatórios devolvidos pelas ferramentas de lote. Todos serializáveis para
// revisão do operador.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{documents::DocumentType, tenancy::MembershipRole};

// =========================================================================
//  MIGRAÇÃO RBAC
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OwnerSource {
    /// Autor do registro de histórico "create tenant" mais antigo
    CreationHistory,
    /// Heurística: membro legado marcado como administrador global
    GlobalAdminFallback,
    /// Heurística: primeiro membro legado (ordem de criação)
    FirstMemberFallback,
}

impl OwnerSource {
    pub fn is_heuristic(self) -> bool {
        !matches!(self, OwnerSource::CreationHistory)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerInference {
    pub user_id: Uuid,
    pub source: OwnerSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberOutcome {
    Created { role: MembershipRole },
    Skipped { existing_role: MembershipRole },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberMigration {
    pub user_id: Uuid,
    pub email: String,
    #[serde(flatten)]
    pub outcome: MemberOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantMigrationReport {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub owner: Option<OwnerInference>,
    pub members: Vec<MemberMigration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TenantMigrationReport {
    pub fn created(&self) -> usize {
        self.members
            .iter()
            .filter(|m| matches!(m.outcome, MemberOutcome::Created { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.members
            .iter()
            .filter(|m| matches!(m.outcome, MemberOutcome::Skipped { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub tenants: Vec<TenantMigrationReport>,
}

impl MigrationReport {
    pub fn failed_tenants(&self) -> usize {
        self.tenants.iter().filter(|t| t.error.is_some()).count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRebuildReport {
    pub removed: u64,
    pub added: u64,
}

// =========================================================================
//  REPARO DE NUMERAÇÃO
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Renumbering {
    pub document_id: Uuid,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRepairReport {
    pub tenant_id: Uuid,
    pub doc_type: DocumentType,
    pub duplicate_groups: usize,
    /// Originais mantidos (o mais antigo de cada grupo duplicado)
    pub kept: usize,
    pub renumbered: usize,
    pub renumberings: Vec<Renumbering>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberingRepairReport {
    pub scopes: Vec<ScopeRepairReport>,
}

impl NumberingRepairReport {
    pub fn total_renumbered(&self) -> usize {
        self.scopes.iter().map(|s| s.renumbered).sum()
    }
}

// =========================================================================
//  AUDITORIA DE CONSISTÊNCIA
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MismatchKind {
    SnapshotMissing,
    SnapshotUnparseable,
    CountMismatch,
    FieldMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMismatch {
    pub document_id: Uuid,
    pub tenant_id: Uuid,
    pub numero: String,
    pub kind: MismatchKind,
    pub snapshot_count: Option<usize>,
    pub row_count: usize,
    pub details: Vec<String>,
    /// Snapshot reconstruído a partir das linhas (modo de reconstrução)
    pub rebuilt: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub examined: usize,
    pub consistent: usize,
    pub mismatches: Vec<ItemMismatch>,
    pub errors: Vec<String>,
}
