// src/services/repair_service.rs
//
// Ferramentas de lote do operador: reparo de numeros duplicados e auditoria
// snapshot × linhas. Ambas reexecutáveis; erros por item vão para o
// relatório e o processamento continua.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::DocumentStore,
    models::{
        documents::{DocumentType, NumberedDocument},
        reports::{
            ConsistencyReport, ItemMismatch, MismatchKind, NumberingRepairReport, Renumbering,
            ScopeRepairReport,
        },
    },
    services::{
        consistency::{ConsistencyManager, SnapshotState},
        numbering::split_numero,
    },
};

// Tentativas por documento quando outro processo ocupa o candidato
const MAX_REASSIGN_ATTEMPTS: u32 = 5;

/// Filtro dos escopos a reparar. Vazio = todos.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepairScope {
    pub tenant_id: Option<Uuid>,
    pub doc_type: Option<DocumentType>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuditMode {
    /// Apenas relata
    #[default]
    ReportOnly,
    /// Reconstrói snapshots ausentes ou ilegíveis a partir das linhas.
    /// Divergências de contagem ou de campos continuam só relatadas.
    RebuildMissingSnapshots,
}

/// Próximo numero livre acima de `numero`, mesmo radical e mesma largura.
/// Numeros sem dígitos finais recebem um sufixo "-N" a partir de 2.
pub fn next_free_numero(numero: &str, used: &HashSet<String>) -> String {
    let (stem, digits) = split_numero(numero);

    // Sequência já no teto de u64: cai no sufixo
    if let Some(start) = digits.parse::<u64>().ok().and_then(|v| v.checked_add(1)) {
        let width = digits.len();
        if let Some(candidate) = (start..=u64::MAX)
            .map(|n| format!("{stem}{n:0width$}"))
            .find(|candidate| !used.contains(candidate))
        {
            return candidate;
        }
    }

    (2u64..=u64::MAX)
        .map(|n| format!("{numero}-{n}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| format!("{numero}-2"))
}

#[derive(Clone)]
pub struct RepairService {
    documents: Arc<dyn DocumentStore>,
    consistency: ConsistencyManager,
}

impl RepairService {
    pub fn new(documents: Arc<dyn DocumentStore>, consistency: ConsistencyManager) -> Self {
        Self {
            documents,
            consistency,
        }
    }

    // =====================================================================
    //  REPARO DE NUMERAÇÃO
    // =====================================================================

    pub async fn run_numbering_repair(
        &self,
        scope: RepairScope,
    ) -> Result<NumberingRepairReport, AppError> {
        let scopes = self
            .documents
            .list_numbering_scopes(scope.tenant_id, scope.doc_type)
            .await?;
        tracing::info!("Reparo de numeração: {} escopos", scopes.len());

        let mut report = NumberingRepairReport::default();
        for (tenant_id, doc_type) in scopes {
            report.scopes.push(self.repair_scope(tenant_id, doc_type).await);
        }

        tracing::info!(
            renumbered = report.total_renumbered(),
            "Reparo de numeração concluído"
        );
        Ok(report)
    }

    async fn repair_scope(&self, tenant_id: Uuid, doc_type: DocumentType) -> ScopeRepairReport {
        let mut report = ScopeRepairReport {
            tenant_id,
            doc_type,
            duplicate_groups: 0,
            kept: 0,
            renumbered: 0,
            renumberings: Vec::new(),
            errors: Vec::new(),
        };

        // Já vem ordenado por (created_at, id): o primeiro de cada grupo é o original
        let docs = match self.documents.list_numbered_documents(tenant_id, doc_type).await {
            Ok(docs) => docs,
            Err(e) => {
                report.errors.push(format!("falha ao listar documentos: {e}"));
                return report;
            }
        };

        // Ocupados = persistidos ∪ atribuídos nesta passada
        let mut used: HashSet<String> = docs.iter().map(|d| d.numero.clone()).collect();

        for group in duplicate_groups(&docs) {
            report.duplicate_groups += 1;
            report.kept += 1;

            for doc in &group[1..] {
                match self.reassign(doc, &mut used).await {
                    Ok(to) => {
                        tracing::info!(
                            %tenant_id,
                            document_id = %doc.id,
                            from = %doc.numero,
                            %to,
                            "Documento renumerado"
                        );
                        report.renumbered += 1;
                        report.renumberings.push(Renumbering {
                            document_id: doc.id,
                            from: doc.numero.clone(),
                            to,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(document_id = %doc.id, "Falha ao renumerar: {}", e);
                        report
                            .errors
                            .push(format!("{} ({}): {}", doc.numero, doc.id, e));
                    }
                }
            }
        }

        report
    }

    async fn reassign(
        &self,
        doc: &NumberedDocument,
        used: &mut HashSet<String>,
    ) -> Result<String, AppError> {
        let mut last_error = None;
        for _ in 0..MAX_REASSIGN_ATTEMPTS {
            let candidate = next_free_numero(&doc.numero, used);
            // Reservado antes da tentativa: nunca é proposto duas vezes
            used.insert(candidate.clone());

            match self.documents.reassign_numero(doc.id, &candidate).await {
                Ok(()) => return Ok(candidate),
                Err(e @ AppError::DuplicateNumero(_)) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or(AppError::NumberingConflict {
            attempts: MAX_REASSIGN_ATTEMPTS,
        }))
    }

    // =====================================================================
    //  AUDITORIA DE CONSISTÊNCIA
    // =====================================================================

    pub async fn run_consistency_audit(
        &self,
        tenant_id: Option<Uuid>,
        mode: AuditMode,
    ) -> Result<ConsistencyReport, AppError> {
        let ids = self.documents.list_document_ids(tenant_id).await?;
        tracing::info!(?mode, "Auditoria de itens: {} documentos", ids.len());

        let mut report = ConsistencyReport::default();
        for id in ids {
            report.examined += 1;
            match self.audit_document(id, mode).await {
                Ok(None) => report.consistent += 1,
                Ok(Some(mismatch)) => report.mismatches.push(mismatch),
                Err(e) => report.errors.push(format!("{id}: {e}")),
            }
        }

        tracing::info!(
            examined = report.examined,
            mismatches = report.mismatches.len(),
            "Auditoria de itens concluída"
        );
        Ok(report)
    }

    async fn audit_document(
        &self,
        id: Uuid,
        mode: AuditMode,
    ) -> Result<Option<ItemMismatch>, AppError> {
        let document = self
            .documents
            .find_document(id)
            .await?
            .ok_or(AppError::ResourceNotFound("Documento"))?;
        let rows = self.documents.list_line_item_rows(id).await?;

        let (kind, snapshot_count, details) =
            match SnapshotState::parse(document.items_snapshot.as_deref()) {
                SnapshotState::Missing if rows.is_empty() => return Ok(None),
                SnapshotState::Missing => (MismatchKind::SnapshotMissing, None, Vec::new()),
                // "[]" com linhas: a leitura usa o fallback, então conta como ausente
                SnapshotState::Parsed(items) if items.is_empty() && !rows.is_empty() => {
                    (MismatchKind::SnapshotMissing, Some(0), Vec::new())
                }
                SnapshotState::Unparseable(reason) => {
                    (MismatchKind::SnapshotUnparseable, None, vec![reason])
                }
                SnapshotState::Parsed(items) if items.len() != rows.len() => {
                    (MismatchKind::CountMismatch, Some(items.len()), Vec::new())
                }
                SnapshotState::Parsed(items) => {
                    let diffs = self.consistency.compare(&items, &rows);
                    if diffs.is_empty() {
                        return Ok(None);
                    }
                    (MismatchKind::FieldMismatch, Some(items.len()), diffs)
                }
            };

        tracing::warn!(
            document_id = %id,
            numero = %document.numero,
            ?kind,
            ?snapshot_count,
            row_count = rows.len(),
            "Divergência de itens"
        );

        // Só o snapshot (cópia) é reconstruído, e só quando há linhas para isso
        let rebuildable = matches!(
            kind,
            MismatchKind::SnapshotMissing | MismatchKind::SnapshotUnparseable
        ) && !rows.is_empty();
        let mut rebuilt = false;
        if mode == AuditMode::RebuildMissingSnapshots && rebuildable {
            let snapshot = self.consistency.rebuild_snapshot(&rows)?;
            self.documents.write_snapshot(id, &snapshot).await?;
            tracing::info!(document_id = %id, "Snapshot reconstruído a partir das linhas");
            rebuilt = true;
        }

        Ok(Some(ItemMismatch {
            document_id: id,
            tenant_id: document.tenant_id,
            numero: document.numero,
            kind,
            snapshot_count,
            row_count: rows.len(),
            details,
            rebuilt,
        }))
    }
}

// Grupos de numero repetido, na ordem do seu membro mais antigo
fn duplicate_groups(docs: &[NumberedDocument]) -> Vec<Vec<&NumberedDocument>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<&NumberedDocument>> = Vec::new();

    for doc in docs {
        match index.get(doc.numero.as_str()) {
            Some(&i) => groups[i].push(doc),
            None => {
                index.insert(doc.numero.as_str(), groups.len());
                groups.push(vec![doc]);
            }
        }
    }

    groups.retain(|g| g.len() > 1);
    groups
}
