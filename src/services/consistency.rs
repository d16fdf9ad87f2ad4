// src/services/consistency.rs
//
// Contrato entre as duas representações dos itens de um documento:
// o snapshot JSON (cópia desnormalizada) e as linhas relacionais
// (sistema de registro). Escrita: ambas derivadas da mesma lista.
// Leitura: snapshot quando válido, linhas como fallback registrado.

use rust_decimal::Decimal;

use crate::{
    common::error::AppError,
    models::documents::{
        CountDivergence, FinancialDocument, ItemsSource, LineItem, LineItemRow, NewLineItemRow,
        PreparedItems, ResolvedItems,
    },
};

/// Estado do snapshot bruto guardado no documento.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotState {
    Missing,
    Unparseable(String),
    Parsed(Vec<LineItem>),
}

impl SnapshotState {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => SnapshotState::Missing,
            Some(text) => match serde_json::from_str::<Vec<LineItem>>(text) {
                Ok(items) => SnapshotState::Parsed(items),
                Err(e) => SnapshotState::Unparseable(e.to_string()),
            },
        }
    }
}

// 10^12: limite dos totais gravados no documento
const TOTAL_LIMIT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyManager {
    strict: bool,
}

impl ConsistencyManager {
    /// `strict`: divergência de contagem na leitura vira `ConsistencyFault`.
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    // ---
    // Escrita
    // ---

    /// Deriva linhas, snapshot e totais da mesma lista de itens.
    pub fn prepare(&self, items: &[LineItem]) -> Result<PreparedItems, AppError> {
        let rows = items
            .iter()
            .enumerate()
            .map(|(position, item)| NewLineItemRow {
                position: position as i32,
                description: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                tax_rate: item.tax_rate,
                discount: item.discount,
                discount_kind: item.discount_kind,
                product_id: item.product_id,
                line_total: item.line_total,
            })
            .collect();

        let snapshot = serde_json::to_string(items)?;

        let (total_ht, total_ttc) = Self::totals(items).ok_or_else(|| {
            AppError::InvalidInput("Os totais do documento excedem o valor máximo permitido.".into())
        })?;

        Ok(PreparedItems {
            rows,
            snapshot,
            total_ht,
            total_ttc,
        })
    }

    // (total HT, total TTC), ou `None` se estourar a faixa das colunas NUMERIC(14, 2)
    fn totals(items: &[LineItem]) -> Option<(Decimal, Decimal)> {
        let mut total_ht = Decimal::ZERO;
        let mut total_tax = Decimal::ZERO;
        for item in items {
            total_ht = total_ht.checked_add(item.line_total)?;
            let tax = item
                .line_total
                .checked_mul(item.tax_rate)?
                .checked_div(Decimal::ONE_HUNDRED)?;
            total_tax = total_tax.checked_add(tax)?;
        }

        let total_ht = total_ht.round_dp(2);
        let total_ttc = total_ht.checked_add(total_tax)?.round_dp(2);
        (total_ttc < TOTAL_LIMIT).then_some((total_ht, total_ttc))
    }

    /// Snapshot reconstruído a partir das linhas (sistema de registro).
    pub fn rebuild_snapshot(&self, rows: &[LineItemRow]) -> Result<String, AppError> {
        let items: Vec<LineItem> = rows.iter().map(LineItem::from).collect();
        Ok(serde_json::to_string(&items)?)
    }

    // ---
    // Leitura
    // ---

    pub fn resolve(
        &self,
        document: &FinancialDocument,
        rows: &[LineItemRow],
    ) -> Result<ResolvedItems, AppError> {
        let snapshot = SnapshotState::parse(document.items_snapshot.as_deref());

        match snapshot {
            SnapshotState::Parsed(items) if !items.is_empty() => {
                let divergence = (!rows.is_empty() && rows.len() != items.len()).then(|| {
                    CountDivergence {
                        snapshot_count: items.len(),
                        row_count: rows.len(),
                    }
                });

                if let Some(d) = divergence {
                    tracing::warn!(
                        document_id = %document.id,
                        numero = %document.numero,
                        snapshot_count = d.snapshot_count,
                        row_count = d.row_count,
                        "Divergência entre snapshot e linhas relacionais"
                    );
                    if self.strict {
                        return Err(AppError::ConsistencyFault {
                            snapshot_count: d.snapshot_count,
                            row_count: d.row_count,
                        });
                    }
                }

                Ok(ResolvedItems {
                    items,
                    source: ItemsSource::Snapshot,
                    divergence,
                })
            }
            other => {
                if rows.is_empty() {
                    if let SnapshotState::Unparseable(reason) = &other {
                        tracing::warn!(
                            document_id = %document.id,
                            %reason,
                            "Snapshot ilegível e nenhuma linha relacional"
                        );
                    }
                    return Ok(ResolvedItems {
                        items: Vec::new(),
                        source: ItemsSource::Empty,
                        divergence: None,
                    });
                }

                let state = match &other {
                    SnapshotState::Missing => "ausente",
                    SnapshotState::Unparseable(_) => "ilegível",
                    SnapshotState::Parsed(_) => "vazio",
                };
                tracing::warn!(
                    document_id = %document.id,
                    numero = %document.numero,
                    row_count = rows.len(),
                    snapshot = state,
                    "Usando linhas relacionais como fallback"
                );

                Ok(ResolvedItems {
                    items: rows.iter().map(LineItem::from).collect(),
                    source: ItemsSource::RelationalFallback,
                    divergence: None,
                })
            }
        }
    }

    /// Diferenças de campos-chave por posição (nome, quantidade, preço
    /// unitário, total da linha). Só compara as posições presentes nos dois.
    pub fn compare(&self, snapshot: &[LineItem], rows: &[LineItemRow]) -> Vec<String> {
        let mut diffs = Vec::new();
        for (position, (item, row)) in snapshot.iter().zip(rows).enumerate() {
            if item.name != row.description {
                diffs.push(format!(
                    "posição {position}: nome '{}' != '{}'",
                    item.name, row.description
                ));
            }
            if item.quantity != row.quantity {
                diffs.push(format!(
                    "posição {position}: quantidade {} != {}",
                    item.quantity, row.quantity
                ));
            }
            if item.unit_price != row.unit_price {
                diffs.push(format!(
                    "posição {position}: preço unitário {} != {}",
                    item.unit_price, row.unit_price
                ));
            }
            if item.line_total != row.line_total {
                diffs.push(format!(
                    "posição {position}: total da linha {} != {}",
                    item.line_total, row.line_total
                ));
            }
        }
        diffs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::documents::{DiscountKind, DocumentStatus, DocumentType};
    use chrono::Utc;
    use std::str::FromStr;
    use uuid::Uuid;

    fn item(name: &str, quantity: i64, unit_price: &str) -> LineItem {
        let quantity = Decimal::from(quantity);
        let unit_price = Decimal::from_str(unit_price).unwrap();
        LineItem {
            name: name.into(),
            description: None,
            quantity,
            unit_price,
            tax_rate: Decimal::from(20),
            discount: Decimal::ZERO,
            discount_kind: DiscountKind::Percentage,
            product_id: None,
            line_total: quantity * unit_price,
        }
    }

    fn document(snapshot: Option<&str>) -> FinancialDocument {
        let now = Utc::now();
        FinancialDocument {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            client_id: None,
            doc_type: DocumentType::Invoice,
            numero: "00000001".into(),
            status: DocumentStatus::Draft,
            emission_date: now.date_naive(),
            total_ht: Decimal::ZERO,
            total_ttc: Decimal::ZERO,
            items_snapshot: snapshot.map(str::to_string),
            is_locked: false,
            created_by: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
            deleted_at: None,
        }
    }

    fn rows_from(prepared: &PreparedItems, document_id: Uuid) -> Vec<LineItemRow> {
        prepared
            .rows
            .iter()
            .map(|r| LineItemRow {
                id: Uuid::new_v4(),
                document_id,
                position: r.position,
                description: r.description.clone(),
                quantity: r.quantity,
                unit_price: r.unit_price,
                tax_rate: r.tax_rate,
                discount: r.discount,
                discount_kind: r.discount_kind,
                product_id: r.product_id,
                line_total: r.line_total,
            })
            .collect()
    }

    #[test]
    fn prepare_derives_rows_snapshot_and_totals_from_one_list() {
        let manager = ConsistencyManager::new(false);
        let items = vec![item("Logo", 1, "300.00"), item("Site", 2, "450.00")];

        let prepared = manager.prepare(&items).unwrap();

        assert_eq!(prepared.rows.len(), 2);
        assert_eq!(prepared.rows[1].description, "Site");
        assert_eq!(prepared.rows[1].position, 1);
        assert_eq!(prepared.total_ht, Decimal::from_str("1200.00").unwrap());
        assert_eq!(prepared.total_ttc, Decimal::from_str("1440.00").unwrap());

        let parsed: Vec<LineItem> = serde_json::from_str(&prepared.snapshot).unwrap();
        assert_eq!(parsed, items);
    }

    #[test]
    fn totals_beyond_the_column_range_are_rejected() {
        let manager = ConsistencyManager::default();
        // Cada linha é válida isoladamente; a soma não cabe no documento
        let items: Vec<LineItem> = (0..200).map(|_| item("Lote", 1, "9999999999")).collect();

        let err = manager.prepare(&items).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let mut huge = item("Estouro", 1, "1");
        huge.line_total = Decimal::MAX;
        huge.tax_rate = Decimal::ONE_HUNDRED;
        let err = manager.prepare(&[huge]).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn valid_snapshot_is_preferred() {
        let manager = ConsistencyManager::new(false);
        let items = vec![item("Logo", 1, "300.00")];
        let prepared = manager.prepare(&items).unwrap();
        let doc = document(Some(&prepared.snapshot));
        let rows = rows_from(&prepared, doc.id);

        let resolved = manager.resolve(&doc, &rows).unwrap();

        assert_eq!(resolved.source, ItemsSource::Snapshot);
        assert_eq!(resolved.items, items);
        assert_eq!(resolved.divergence, None);
    }

    #[test]
    fn corrupted_snapshot_falls_back_to_rows() {
        let manager = ConsistencyManager::new(false);
        let items = vec![item("A", 1, "1"), item("B", 2, "2"), item("C", 3, "3")];
        let prepared = manager.prepare(&items).unwrap();
        let doc = document(Some("[{\"nom\": "));
        let rows = rows_from(&prepared, doc.id);

        let resolved = manager.resolve(&doc, &rows).unwrap();

        assert!(resolved.is_fallback());
        let names: Vec<&str> = resolved.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
    }

    #[test]
    fn empty_snapshot_with_rows_is_a_fallback() {
        let manager = ConsistencyManager::new(false);
        let prepared = manager.prepare(&[item("A", 1, "1")]).unwrap();
        let doc = document(Some("[]"));
        let rows = rows_from(&prepared, doc.id);

        assert!(manager.resolve(&doc, &rows).unwrap().is_fallback());
    }

    #[test]
    fn nothing_anywhere_is_empty() {
        let manager = ConsistencyManager::new(true);
        let resolved = manager.resolve(&document(None), &[]).unwrap();
        assert_eq!(resolved.source, ItemsSource::Empty);
        assert!(resolved.items.is_empty());
    }

    #[test]
    fn count_divergence_is_flagged_or_fails_in_strict_mode() {
        let two = ConsistencyManager::default()
            .prepare(&[item("A", 1, "1"), item("B", 1, "1")])
            .unwrap();
        let three = ConsistencyManager::default()
            .prepare(&[item("A", 1, "1"), item("B", 1, "1"), item("C", 1, "1")])
            .unwrap();
        let doc = document(Some(&two.snapshot));
        let rows = rows_from(&three, doc.id);

        let lenient = ConsistencyManager::new(false).resolve(&doc, &rows).unwrap();
        assert_eq!(lenient.source, ItemsSource::Snapshot);
        assert_eq!(
            lenient.divergence,
            Some(CountDivergence {
                snapshot_count: 2,
                row_count: 3
            })
        );

        let strict = ConsistencyManager::new(true).resolve(&doc, &rows);
        assert!(matches!(
            strict,
            Err(AppError::ConsistencyFault {
                snapshot_count: 2,
                row_count: 3
            })
        ));
    }

    #[test]
    fn compare_reports_field_differences() {
        let manager = ConsistencyManager::default();
        let prepared = manager.prepare(&[item("Logo", 1, "300.00")]).unwrap();
        let rows = rows_from(&prepared, Uuid::new_v4());
        let edited = vec![item("Logo v2", 1, "350.00")];

        let diffs = manager.compare(&edited, &rows);

        assert_eq!(diffs.len(), 3);
        assert!(diffs[0].contains("nome"));
    }

    #[test]
    fn rebuilt_snapshot_mirrors_rows() {
        let manager = ConsistencyManager::default();
        let prepared = manager.prepare(&[item("A", 1, "10"), item("B", 2, "5")]).unwrap();
        let rows = rows_from(&prepared, Uuid::new_v4());

        let rebuilt = manager.rebuild_snapshot(&rows).unwrap();

        match SnapshotState::parse(Some(&rebuilt)) {
            SnapshotState::Parsed(items) => {
                assert_eq!(items.len(), 2);
                assert!(manager.compare(&items, &rows).is_empty());
            }
            other => panic!("snapshot inesperado: {other:?}"),
        }
    }
}
