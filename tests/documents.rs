// tests/documents.rs

mod common;

use rust_decimal::Decimal;

use common::{invoice, item, row, Harness};
use facturation_core::{
    common::error::{AppError, ErrorKind},
    db::{memory::LegacyDocument, DocumentStore},
    models::{
        documents::{DocumentType, ItemsSource, UpdateItemsPayload},
        history::{HistoryAction, HistoryEntity},
        tenancy::MembershipRole,
    },
    services::numbering::NumberingConfig,
};

#[tokio::test]
async fn created_items_read_back_from_snapshot() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");
    let items = vec![item("Site vitrine", 2, "450.00"), item("Hébergement", 12, "9.90")];

    let doc = h
        .state
        .document_service
        .create_document(Some(&token), tenant.id, invoice(items.clone()))
        .await
        .unwrap();

    assert_eq!(doc.total_ht, Decimal::new(101880, 2));
    assert_eq!(doc.total_ttc, Decimal::new(122256, 2));

    let resolved = h
        .state
        .document_service
        .get_document_items(Some(&token), doc.id)
        .await
        .unwrap();
    assert_eq!(resolved.source, ItemsSource::Snapshot);
    assert_eq!(resolved.items, items);
    assert!(resolved.divergence.is_none());
}

#[tokio::test]
async fn rows_match_snapshot_position_by_position() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");

    let doc = h
        .state
        .document_service
        .create_document(
            Some(&token),
            tenant.id,
            invoice(vec![item("A", 1, "1"), item("B", 2, "2"), item("C", 3, "3")]),
        )
        .await
        .unwrap();

    let rows = h.store.list_line_item_rows(doc.id).await.unwrap();
    let names: Vec<_> = rows.iter().map(|r| (r.position, r.description.as_str())).collect();
    assert_eq!(names, vec![(0, "A"), (1, "B"), (2, "C")]);
}

#[tokio::test]
async fn corrupted_snapshot_falls_back_to_rows() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");

    let id = h.store.insert_legacy_document(LegacyDocument {
        tenant_id: tenant.id,
        doc_type: DocumentType::Invoice,
        numero: "00000007".into(),
        snapshot: Some("[{\"nom\": \"tronqué".into()),
        rows: vec![
            row(0, "Audit", 1, "300"),
            row(1, "Formation", 2, "150"),
            row(2, "Support", 3, "50"),
        ],
    });

    let resolved = h
        .state
        .document_service
        .get_document_items(Some(&token), id)
        .await
        .unwrap();

    assert!(resolved.is_fallback());
    assert_eq!(resolved.items.len(), 3);
    assert_eq!(resolved.items[0].name, "Audit");
    assert_eq!(resolved.items[2].line_total, Decimal::from(150));
}

#[tokio::test]
async fn empty_snapshot_array_falls_back_to_rows() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");

    let id = h.store.insert_legacy_document(LegacyDocument {
        tenant_id: tenant.id,
        doc_type: DocumentType::Invoice,
        numero: "00000001".into(),
        snapshot: Some("[]".into()),
        rows: vec![row(0, "Audit", 1, "300")],
    });

    let resolved = h
        .state
        .document_service
        .get_document_items(Some(&token), id)
        .await
        .unwrap();
    assert_eq!(resolved.source, ItemsSource::RelationalFallback);
}

#[tokio::test]
async fn no_snapshot_and_no_rows_is_empty() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");

    let id = h.store.insert_legacy_document(LegacyDocument {
        tenant_id: tenant.id,
        doc_type: DocumentType::Quote,
        numero: "00000001".into(),
        snapshot: None,
        rows: Vec::new(),
    });

    let resolved = h
        .state
        .document_service
        .get_document_items(Some(&token), id)
        .await
        .unwrap();
    assert_eq!(resolved.source, ItemsSource::Empty);
    assert!(resolved.items.is_empty());
}

#[tokio::test]
async fn count_divergence_is_reported_and_fatal_only_in_strict_mode() {
    let snapshot = serde_json::to_string(&vec![item("Seul", 1, "10")]).unwrap();
    let seed = |h: &Harness, tenant_id: uuid::Uuid| {
        h.store.insert_legacy_document(LegacyDocument {
            tenant_id,
            doc_type: DocumentType::Invoice,
            numero: "00000001".into(),
            snapshot: Some(snapshot.clone()),
            rows: vec![row(0, "Seul", 1, "10"), row(1, "Oublié", 1, "5")],
        })
    };

    let lenient = Harness::new();
    let (tenant, _, token) = lenient.tenant_with_owner("Euromed");
    let id = seed(&lenient, tenant.id);
    let resolved = lenient
        .state
        .document_service
        .get_document_items(Some(&token), id)
        .await
        .unwrap();
    assert_eq!(resolved.source, ItemsSource::Snapshot);
    let divergence = resolved.divergence.unwrap();
    assert_eq!((divergence.snapshot_count, divergence.row_count), (1, 2));

    let strict = Harness::with_config(NumberingConfig::default(), true);
    let (tenant, _, token) = strict.tenant_with_owner("Euromed");
    let id = seed(&strict, tenant.id);
    let err = strict
        .state
        .document_service
        .get_document_items(Some(&token), id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::ConsistencyFault {
            snapshot_count: 1,
            row_count: 2
        }
    ));
}

#[tokio::test]
async fn update_replaces_both_representations() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");
    let svc = &h.state.document_service;

    let doc = svc
        .create_document(
            Some(&token),
            tenant.id,
            invoice(vec![item("A", 1, "10"), item("B", 1, "20")]),
        )
        .await
        .unwrap();

    let updated = svc
        .update_document_items(
            Some(&token),
            doc.id,
            UpdateItemsPayload {
                items: vec![item("C", 3, "100")],
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.numero, doc.numero);
    assert_eq!(updated.total_ht, Decimal::from(300));

    let rows = h.store.list_line_item_rows(doc.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].description, "C");

    let resolved = svc.get_document_items(Some(&token), doc.id).await.unwrap();
    assert_eq!(resolved.source, ItemsSource::Snapshot);
    assert_eq!(resolved.items, vec![item("C", 3, "100")]);
}

#[tokio::test]
async fn locked_document_rejects_item_updates() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");
    let svc = &h.state.document_service;

    let doc = svc
        .create_document(Some(&token), tenant.id, invoice(vec![item("A", 1, "10")]))
        .await
        .unwrap();
    h.store.set_locked(doc.id, true);

    let err = svc
        .update_document_items(
            Some(&token),
            doc.id,
            UpdateItemsPayload {
                items: vec![item("B", 1, "20")],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DocumentLocked(_)));

    let resolved = svc.get_document_items(Some(&token), doc.id).await.unwrap();
    assert_eq!(resolved.items[0].name, "A");
}

#[tokio::test]
async fn failed_history_write_leaves_nothing_behind() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");
    let svc = &h.state.document_service;

    let doc = svc
        .create_document(Some(&token), tenant.id, invoice(vec![item("A", 1, "10")]))
        .await
        .unwrap();

    h.store.fail_history_writes(true);

    let err = svc
        .create_document(Some(&token), tenant.id, invoice(vec![item("B", 1, "10")]))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(h.store.all_documents().len(), 1);

    let err = svc
        .update_document_items(
            Some(&token),
            doc.id,
            UpdateItemsPayload {
                items: vec![item("Z", 9, "9")],
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_fatal());

    h.store.fail_history_writes(false);
    let resolved = svc.get_document_items(Some(&token), doc.id).await.unwrap();
    assert_eq!(resolved.items, vec![item("A", 1, "10")]);

    let rows = h.store.list_line_item_rows(doc.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].description, "A");
}

#[tokio::test]
async fn writes_are_recorded_in_history() {
    let h = Harness::new();
    let (tenant, owner, token) = h.tenant_with_owner("Euromed");
    let svc = &h.state.document_service;

    let doc = svc
        .create_document(Some(&token), tenant.id, invoice(vec![item("A", 1, "10")]))
        .await
        .unwrap();
    svc.delete_document(Some(&token), doc.id).await.unwrap();

    let entries: Vec<_> = h
        .store
        .history_entries()
        .into_iter()
        .filter(|e| e.entity_type == HistoryEntity::Document)
        .collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, HistoryAction::Create);
    assert_eq!(entries[1].action, HistoryAction::Delete);
    assert!(entries.iter().all(|e| e.actor_user_id == owner.id && e.entity_id == Some(doc.id)));
}

#[tokio::test]
async fn viewer_reads_but_cannot_write() {
    let h = Harness::new();
    let (tenant, _, owner_token) = h.tenant_with_owner("Euromed");
    let (_, viewer) = h.member(&tenant, "view@euromed.fr", MembershipRole::Viewer);
    let svc = &h.state.document_service;

    let doc = svc
        .create_document(Some(&owner_token), tenant.id, invoice(vec![item("A", 1, "10")]))
        .await
        .unwrap();

    svc.get_document_items(Some(&viewer), doc.id).await.unwrap();

    let err = svc
        .create_document(Some(&viewer), tenant.id, invoice(vec![item("B", 1, "1")]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied));

    let err = svc.delete_document(Some(&viewer), doc.id).await.unwrap_err();
    assert!(matches!(err, AppError::AccessDenied));
}

#[tokio::test]
async fn client_and_products_must_belong_to_the_tenant() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Alpha");
    let (other, _, _) = h.tenant_with_owner("Beta");
    let foreign_client = h.store.add_client(other.id);
    let foreign_product = h.store.add_product(other.id);
    let svc = &h.state.document_service;

    let mut payload = invoice(vec![item("A", 1, "10")]);
    payload.client_id = Some(foreign_client);
    let err = svc.create_document(Some(&token), tenant.id, payload).await.unwrap_err();
    assert!(matches!(err, AppError::ResourceNotFound("Cliente")));

    let mut line = item("Produto alheio", 1, "10");
    line.product_id = Some(foreign_product);
    let err = svc
        .create_document(Some(&token), tenant.id, invoice(vec![line]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ResourceNotFound("Produto")));

    let own_product = h.store.add_product(tenant.id);
    let mut line = item("Produto próprio", 1, "10");
    line.product_id = Some(own_product);
    svc.create_document(Some(&token), tenant.id, invoice(vec![line]))
        .await
        .unwrap();
}

#[tokio::test]
async fn invalid_items_are_rejected_before_numbering() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");

    let mut bad = item("Negativo", 1, "10");
    bad.quantity = Decimal::from(-1);
    let err = h
        .state
        .document_service
        .create_document(Some(&token), tenant.id, invoice(vec![bad]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ValidationError(_)));
    assert!(h.store.all_documents().is_empty());
}

#[tokio::test]
async fn oversized_amounts_are_validation_errors() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");
    let svc = &h.state.document_service;

    let mut huge = item("Gigante", 1, "1");
    huge.quantity = Decimal::from(1_000_000_000_000_000i64);
    huge.unit_price = Decimal::from(1_000_000_000_000_000i64);
    let err = svc
        .create_document(Some(&token), tenant.id, invoice(vec![huge.clone()]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(h.store.all_documents().is_empty());

    let doc = svc
        .create_document(Some(&token), tenant.id, invoice(vec![item("A", 1, "10")]))
        .await
        .unwrap();
    let err = svc
        .update_document_items(Some(&token), doc.id, UpdateItemsPayload { items: vec![huge] })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let resolved = svc.get_document_items(Some(&token), doc.id).await.unwrap();
    assert_eq!(resolved.items, vec![item("A", 1, "10")]);
}

#[tokio::test]
async fn stored_snapshot_with_overflowing_amounts_falls_back_to_rows() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");

    let id = h.store.insert_legacy_document(LegacyDocument {
        tenant_id: tenant.id,
        doc_type: DocumentType::Invoice,
        numero: "00000001".into(),
        snapshot: Some(
            r#"[{"nom": "x", "quantite": "1000000000000000", "prixUnitaire": "1000000000000000"}]"#
                .into(),
        ),
        rows: vec![row(0, "x", 1, "10")],
    });

    let resolved = h
        .state
        .document_service
        .get_document_items(Some(&token), id)
        .await
        .unwrap();
    assert!(resolved.is_fallback());
    assert_eq!(resolved.items[0].line_total, Decimal::from(10));
}

#[tokio::test]
async fn deleted_document_is_no_longer_reachable() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");
    let svc = &h.state.document_service;

    let doc = svc
        .create_document(Some(&token), tenant.id, invoice(vec![item("A", 1, "10")]))
        .await
        .unwrap();
    svc.delete_document(Some(&token), doc.id).await.unwrap();

    let err = svc.get_document_items(Some(&token), doc.id).await.unwrap_err();
    assert!(matches!(err, AppError::ResourceNotFound("Documento")));

    let err = svc.delete_document(Some(&token), doc.id).await.unwrap_err();
    assert!(matches!(err, AppError::ResourceNotFound("Documento")));
}
