// src/models/documents.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::history::NewHistoryEntry;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "document_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Invoice, // Facture
    Quote,   // Devis
}

impl DocumentType {
    pub fn label(self) -> &'static str {
        match self {
            DocumentType::Invoice => "fatura",
            DocumentType::Quote => "orçamento",
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "invoice" | "facture" => Ok(DocumentType::Invoice),
            "quote" | "devis" => Ok(DocumentType::Quote),
            other => Err(format!("tipo de documento desconhecido: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "document_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    #[default]
    Draft,     // Brouillon
    Sent,      // Envoyée
    Accepted,  // Devis accepté
    Paid,      // Payée
    Cancelled, // Annulée
    Archived,  // Archivée
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "discount_kind", rename_all = "lowercase")]
pub enum DiscountKind {
    #[default]
    #[serde(rename = "percentage", alias = "pourcentage")]
    Percentage,
    #[serde(rename = "amount", alias = "montant")]
    Amount,
}

// --- Validações customizadas ---

// Colunas NUMERIC(14, 4) das linhas: no máximo 10 dígitos inteiros
const AMOUNT_LIMIT: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 0);

fn validate_amount(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    if *val >= AMOUNT_LIMIT {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor deve ser menor que 10 000 000 000.".into());
        return Err(err);
    }
    Ok(())
}

fn validate_tax_rate(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() || *val > Decimal::ONE_HUNDRED {
        let mut err = ValidationError::new("range");
        err.message = Some("A taxa de imposto deve estar entre 0 e 100.".into());
        return Err(err);
    }
    Ok(())
}

// ---
// LineItem: o formato do snapshot
// ---
#[derive(Debug, Clone, PartialEq, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[validate(length(min = 1, message = "O nome do item é obrigatório."))]
    #[schema(example = "Création site vitrine")]
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[validate(custom(function = "validate_amount"))]
    #[schema(value_type = String, example = "2")]
    pub quantity: Decimal,

    #[validate(custom(function = "validate_amount"))]
    #[schema(value_type = String, example = "450.00")]
    pub unit_price: Decimal,

    #[validate(custom(function = "validate_tax_rate"))]
    #[schema(value_type = String, example = "20")]
    pub tax_rate: Decimal,

    #[validate(custom(function = "validate_amount"))]
    #[schema(value_type = String, example = "0")]
    pub discount: Decimal,

    pub discount_kind: DiscountKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<Uuid>,

    #[validate(custom(function = "validate_amount"))]
    #[schema(value_type = String, example = "900.00")]
    pub line_total: Decimal,
}

impl LineItem {
    /// Total da linha sem imposto, descontos aplicados.
    /// `None` quando o cálculo estoura a faixa de `Decimal`.
    pub fn computed_total(
        quantity: Decimal,
        unit_price: Decimal,
        discount: Decimal,
        kind: DiscountKind,
    ) -> Option<Decimal> {
        let gross = quantity.checked_mul(unit_price)?;
        let reduction = match kind {
            DiscountKind::Percentage => gross
                .checked_mul(discount)?
                .checked_div(Decimal::ONE_HUNDRED)?,
            DiscountKind::Amount => discount,
        };
        Some(gross.checked_sub(reduction)?.round_dp(2))
    }
}

// Forma tolerante usada na leitura: aceita os nomes de campo do snapshot
// legado (nom, quantite, prixUnitaire, tva, totalLigne/montantHT...).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLineItem {
    #[serde(alias = "nom")]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(alias = "quantite")]
    quantity: Decimal,
    #[serde(alias = "prixUnitaire")]
    unit_price: Decimal,
    #[serde(alias = "tva", default)]
    tax_rate: Decimal,
    #[serde(alias = "remise", default)]
    discount: Decimal,
    #[serde(alias = "remiseType", default)]
    discount_kind: DiscountKind,
    #[serde(alias = "produitId", default)]
    product_id: Option<String>,
    #[serde(alias = "totalLigne", default)]
    line_total: Option<Decimal>,
    #[serde(rename = "montantHT", default)]
    montant_ht: Option<Decimal>,
}

impl<'de> Deserialize<'de> for LineItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawLineItem::deserialize(deserializer)?;

        // Itens legados só têm "description" como rótulo
        let name = raw
            .name
            .or_else(|| raw.description.clone())
            .ok_or_else(|| serde::de::Error::missing_field("name"))?;

        let line_total = match raw.line_total.or(raw.montant_ht) {
            Some(total) => total,
            None => LineItem::computed_total(
                raw.quantity,
                raw.unit_price,
                raw.discount,
                raw.discount_kind,
            )
            .ok_or_else(|| serde::de::Error::custom("total da linha fora da faixa numérica"))?,
        };

        Ok(LineItem {
            name,
            description: raw.description,
            quantity: raw.quantity,
            unit_price: raw.unit_price,
            tax_rate: raw.tax_rate,
            discount: raw.discount,
            discount_kind: raw.discount_kind,
            // IDs de produto legados que não são UUID são descartados
            product_id: raw.product_id.and_then(|id| Uuid::parse_str(&id).ok()),
            line_total,
        })
    }
}

// ---
// LineItemRow: o registro relacional (sistema de registro dos relatórios)
// ---
#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub position: i32,
    pub description: String,
    #[schema(value_type = String)]
    pub quantity: Decimal,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    #[schema(value_type = String)]
    pub tax_rate: Decimal,
    #[schema(value_type = String)]
    pub discount: Decimal,
    pub discount_kind: DiscountKind,
    pub product_id: Option<Uuid>,
    #[schema(value_type = String)]
    pub line_total: Decimal,
}

impl From<&LineItemRow> for LineItem {
    fn from(row: &LineItemRow) -> Self {
        LineItem {
            // "description" da linha vira "name" no snapshot
            name: row.description.clone(),
            description: None,
            quantity: row.quantity,
            unit_price: row.unit_price,
            tax_rate: row.tax_rate,
            discount: row.discount,
            discount_kind: row.discount_kind,
            product_id: row.product_id,
            line_total: row.line_total,
        }
    }
}

/// Linha a ser inserida; `id` e `document_id` são atribuídos pelo store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLineItemRow {
    pub position: i32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub discount: Decimal,
    pub discount_kind: DiscountKind,
    pub product_id: Option<Uuid>,
    pub line_total: Decimal,
}

/// As duas representações dos itens, derivadas da mesma lista.
#[derive(Debug, Clone)]
pub struct PreparedItems {
    pub rows: Vec<NewLineItemRow>,
    pub snapshot: String,
    pub total_ht: Decimal,
    pub total_ttc: Decimal,
}

// ---
// FinancialDocument (Fatura ou Orçamento)
// ---
#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinancialDocument {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub client_id: Option<Uuid>,
    pub doc_type: DocumentType,
    #[schema(example = "00000042")]
    pub numero: String,
    pub status: DocumentStatus,
    #[schema(value_type = String, format = Date, example = "2025-06-01")]
    pub emission_date: NaiveDate,
    #[schema(value_type = String, example = "900.00")]
    pub total_ht: Decimal,
    #[schema(value_type = String, example = "1080.00")]
    pub total_ttc: Decimal,

    // O snapshot bruto não sai na API; os itens são servidos pelo gerenciador de consistência
    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub items_snapshot: Option<String>,

    pub is_locked: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FinancialDocument {
    /// Motivo pelo qual os itens não podem mais ser alterados, se houver.
    pub fn immutability_reason(&self) -> Option<&'static str> {
        if self.deleted_at.is_some() {
            return Some("documento excluído");
        }
        if self.archived_at.is_some() || self.status == DocumentStatus::Archived {
            return Some("documento arquivado");
        }
        if self.status == DocumentStatus::Cancelled {
            return Some("documento cancelado");
        }
        if self.is_locked {
            return Some("documento travado");
        }
        None
    }
}

/// Documento pronto para inserção, com numero já proposto.
#[derive(Debug, Clone)]
pub struct DocumentDraft {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub client_id: Option<Uuid>,
    pub doc_type: DocumentType,
    pub numero: String,
    pub status: DocumentStatus,
    pub emission_date: NaiveDate,
    pub created_by: Uuid,
    pub items: PreparedItems,
    pub audit: NewHistoryEntry,
}

/// Substituição completa dos itens de um documento existente.
#[derive(Debug, Clone)]
pub struct ItemsWrite {
    pub document_id: Uuid,
    pub items: PreparedItems,
    pub audit: NewHistoryEntry,
}

// Projeção usada pelo reparo de numeração
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct NumberedDocument {
    pub id: Uuid,
    pub numero: String,
    pub created_at: DateTime<Utc>,
}

// --- Payloads ---

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentPayload {
    pub doc_type: DocumentType,
    pub client_id: Option<Uuid>,
    #[schema(value_type = Option<String>, format = Date)]
    pub emission_date: Option<NaiveDate>,
    pub status: Option<DocumentStatus>,
    #[validate(nested)]
    pub items: Vec<LineItem>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemsPayload {
    #[validate(nested)]
    pub items: Vec<LineItem>,
}

// --- Resultado da leitura ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemsSource {
    Snapshot,
    RelationalFallback,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CountDivergence {
    pub snapshot_count: usize,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedItems {
    pub items: Vec<LineItem>,
    pub source: ItemsSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence: Option<CountDivergence>,
}

impl ResolvedItems {
    pub fn is_fallback(&self) -> bool {
        self.source == ItemsSource::RelationalFallback
    }
}
