// src/services/numbering.rs

use std::{future::Future, str::FromStr, sync::Arc};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::DocumentStore,
    models::{documents::DocumentType, tenancy::Tenant},
};

// Largura da sequência depois do ano na política anual (F-2025-0001 -> "0001")
const YEARLY_SEQUENCE_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberingPolicy {
    /// Sequência única por (tenant, tipo): 00000001, 00000002...
    #[default]
    Continuous,
    /// Sequência reiniciada a cada ano de emissão: 20250001, 20250002...
    Yearly,
}

impl FromStr for NumberingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" => Ok(NumberingPolicy::Continuous),
            "yearly" => Ok(NumberingPolicy::Yearly),
            other => Err(format!("política de numeração desconhecida: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NumberingConfig {
    pub policy: NumberingPolicy,
    pub width: usize,
    pub max_attempts: u32,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            policy: NumberingPolicy::Continuous,
            width: 8,
            max_attempts: 5,
        }
    }
}

/// Escopo de unicidade: (tenant, tipo) mais o radical comum dos numeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberingScope {
    pub tenant_id: Uuid,
    pub doc_type: DocumentType,
    pub stem: String,
    pub width: usize,
}

impl NumberingScope {
    pub fn format(&self, sequence: i64) -> String {
        format!("{}{:0width$}", self.stem, sequence, width = self.width)
    }
}

/// Separa o numero em (radical, dígitos finais). "F-00000042" -> ("F-", "00000042").
pub fn split_numero(numero: &str) -> (&str, &str) {
    let digits_start = numero
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(numero.len());
    numero.split_at(digits_start)
}

#[derive(Clone)]
pub struct NumberingEngine {
    documents: Arc<dyn DocumentStore>,
    config: NumberingConfig,
}

impl NumberingEngine {
    pub fn new(documents: Arc<dyn DocumentStore>, config: NumberingConfig) -> Self {
        Self { documents, config }
    }

    pub fn scope_for(
        &self,
        tenant: &Tenant,
        doc_type: DocumentType,
        emission_date: NaiveDate,
    ) -> NumberingScope {
        let prefix = tenant.prefix_for(doc_type);
        let (stem, width) = match self.config.policy {
            NumberingPolicy::Continuous => (prefix.to_string(), self.config.width),
            NumberingPolicy::Yearly => (
                format!("{}{:04}", prefix, emission_date.year()),
                YEARLY_SEQUENCE_WIDTH,
            ),
        };

        NumberingScope {
            tenant_id: tenant.id,
            doc_type,
            stem,
            width,
        }
    }

    /// Propõe `max + 1` e chama `insert` com o numero formatado. Se o store
    /// responder `DuplicateNumero` (outro pedido ganhou a corrida), relê o
    /// máximo e tenta de novo, até `max_attempts`. O estado das tentativas é
    /// local a esta chamada.
    pub async fn assign<T, F, Fut>(&self, scope: &NumberingScope, mut insert: F) -> Result<T, AppError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut previous: Option<i64> = None;

        for attempt in 1..=max_attempts {
            let current_max = self
                .documents
                .max_sequence(scope.tenant_id, scope.doc_type, &scope.stem)
                .await?;
            let fresh = current_max.map_or(1, |max| max + 1);

            // Nunca repete um candidato que já colidiu
            let candidate = match previous {
                Some(prev) => fresh.max(prev + 1),
                None => fresh,
            };
            let numero = scope.format(candidate);

            match insert(numero.clone()).await {
                Ok(value) => return Ok(value),
                Err(AppError::DuplicateNumero(_)) => {
                    tracing::warn!(
                        tenant_id = %scope.tenant_id,
                        doc_type = ?scope.doc_type,
                        %numero,
                        attempt,
                        "Colisão de numeração, tentando novamente"
                    );
                    previous = Some(candidate);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(
            tenant_id = %scope.tenant_id,
            doc_type = ?scope.doc_type,
            attempts = max_attempts,
            "Tentativas de numeração esgotadas"
        );
        Err(AppError::NumberingConflict {
            attempts: max_attempts,
        })
    }
}
