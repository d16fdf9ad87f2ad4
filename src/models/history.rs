// src/models/history.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "history_action", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "history_entity", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HistoryEntity {
    Tenant,
    Membership,
    Document,
    Client,
    Product,
}

// Registro de auditoria. Somente inserção, nunca alterado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub actor_user_id: Uuid,
    pub tenant_id: Uuid,
    pub entity_type: HistoryEntity,
    pub entity_id: Option<Uuid>,
    pub action: HistoryAction,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub actor_user_id: Uuid,
    pub tenant_id: Uuid,
    pub entity_type: HistoryEntity,
    pub entity_id: Option<Uuid>,
    pub action: HistoryAction,
    pub description: String,
}
