// src/models/tenancy.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{documents::DocumentType, history::NewHistoryEntry};

// ---
// 1. Tenant (A "Sociedade")
// ---
// A organização dona dos documentos, clientes e produtos
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    #[schema(example = "Euromed Multimedia")]
    pub name: String,
    #[schema(example = "F-")]
    pub invoice_prefix: Option<String>,
    #[schema(example = "DEV-")]
    pub quote_prefix: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Prefixo de numeração configurado para o tipo de documento (vazio se ausente).
    pub fn prefix_for(&self, doc_type: DocumentType) -> &str {
        let prefix = match doc_type {
            DocumentType::Invoice => self.invoice_prefix.as_deref(),
            DocumentType::Quote => self.quote_prefix.as_deref(),
        };
        prefix.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantPayload {
    #[validate(length(min = 1, message = "O nome do tenant é obrigatório."))]
    #[schema(example = "Euromed Multimedia")]
    pub name: String,

    #[validate(length(max = 16, message = "Prefixo longo demais."))]
    pub invoice_prefix: Option<String>,

    #[validate(length(max = 16, message = "Prefixo longo demais."))]
    pub quote_prefix: Option<String>,
}

// ---
// 2. Membership (A "Ponte" Usuário-Tenant com papel)
// ---
// A ordem de declaração define a hierarquia: Viewer < Editor < Admin < Owner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "membership_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipRole {
    Viewer,
    Editor,
    Admin,
    Owner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "membership_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Revoked,
}

/// Capacidades verificadas pelo guardião. Adicionar uma verificação nova é
/// uma linha em `minimum_role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ReadDocuments,
    WriteDocuments,
    ListMembers,
    ManageMembers,
}

impl Capability {
    pub const fn minimum_role(self) -> MembershipRole {
        match self {
            Capability::ReadDocuments => MembershipRole::Viewer,
            Capability::ListMembers => MembershipRole::Viewer,
            Capability::WriteDocuments => MembershipRole::Editor,
            Capability::ManageMembers => MembershipRole::Admin,
        }
    }
}

impl MembershipRole {
    pub fn allows(self, capability: Capability) -> bool {
        self >= capability.minimum_role()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: MembershipRole,
    pub status: MembershipStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewMembership {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: MembershipRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipWriteKind {
    Insert,
    Update,
}

/// Mudança de membership feita pelos administradores do tenant, gravada
/// junto com o seu registro de histórico. O `entity_id` do histórico é
/// preenchido pelo store com o id da membership gravada.
#[derive(Debug, Clone)]
pub struct MembershipWrite {
    pub kind: MembershipWriteKind,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: MembershipRole,
    pub status: MembershipStatus,
    pub audit: NewHistoryEntry,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberPayload {
    pub user_id: Uuid,
    pub role: MembershipRole,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRolePayload {
    pub role: MembershipRole,
}

// ---
// 3. Recursos pertencentes a um tenant
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Client,
    Document,
    Product,
}

impl ResourceKind {
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Client => "Cliente",
            ResourceKind::Document => "Documento",
            ResourceKind::Product => "Produto",
        }
    }
}
