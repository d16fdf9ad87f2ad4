// tests/numbering.rs

mod common;

use std::{collections::HashSet, sync::Mutex};

use chrono::NaiveDate;
use tokio::task::JoinSet;

use common::{invoice, item, Harness};
use facturation_core::{
    common::error::AppError,
    db::memory::LegacyDocument,
    models::documents::{CreateDocumentPayload, DocumentType},
    services::numbering::{NumberingConfig, NumberingEngine, NumberingPolicy},
};

fn legacy(tenant_id: uuid::Uuid, numero: &str) -> LegacyDocument {
    LegacyDocument {
        tenant_id,
        doc_type: DocumentType::Invoice,
        numero: numero.into(),
        snapshot: None,
        rows: Vec::new(),
    }
}

#[tokio::test]
async fn sequential_documents_are_numbered_from_one() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");

    let mut numeros = Vec::new();
    for _ in 0..3 {
        let doc = h
            .state
            .document_service
            .create_document(Some(&token), tenant.id, invoice(vec![item("Site", 1, "10")]))
            .await
            .unwrap();
        numeros.push(doc.numero);
    }

    assert_eq!(numeros, vec!["00000001", "00000002", "00000003"]);
}

#[tokio::test]
async fn scopes_are_per_tenant_and_per_type() {
    let h = Harness::new();
    let (alpha, _, token_a) = h.tenant_with_owner("Alpha");
    let (beta, _, token_b) = h.tenant_with_owner("Beta");
    let svc = &h.state.document_service;

    let a1 = svc
        .create_document(Some(&token_a), alpha.id, invoice(vec![item("A", 1, "1")]))
        .await
        .unwrap();
    let b1 = svc
        .create_document(Some(&token_b), beta.id, invoice(vec![item("B", 1, "1")]))
        .await
        .unwrap();
    let quote = svc
        .create_document(
            Some(&token_a),
            alpha.id,
            CreateDocumentPayload {
                doc_type: DocumentType::Quote,
                ..invoice(vec![item("Devis", 1, "1")])
            },
        )
        .await
        .unwrap();

    assert_eq!(a1.numero, "00000001");
    assert_eq!(b1.numero, "00000001");
    assert_eq!(quote.numero, "00000001");
}

#[tokio::test]
async fn prefix_is_kept_and_non_numeric_legacy_values_are_ignored() {
    let h = Harness::new();
    let owner = h.store.add_user("dono@euromed.fr", false);
    let tenant = h.store.add_tenant("Euromed", Some("F-"), Some("DEV-"));
    h.store
        .add_membership(owner.id, tenant.id, facturation_core::models::tenancy::MembershipRole::Owner);
    let token = h.token(&owner);

    h.store.insert_legacy_document(legacy(tenant.id, "F-00000041"));
    h.store.insert_legacy_document(legacy(tenant.id, "F-BROUILLON"));
    h.store.insert_legacy_document(legacy(tenant.id, "00009999"));

    let doc = h
        .state
        .document_service
        .create_document(Some(&token), tenant.id, invoice(vec![item("Site", 1, "10")]))
        .await
        .unwrap();

    assert_eq!(doc.numero, "F-00000042");
}

#[tokio::test]
async fn deleted_document_keeps_its_numero_reserved() {
    let h = Harness::new();
    let (tenant, _, token) = h.tenant_with_owner("Euromed");
    let svc = &h.state.document_service;

    let first = svc
        .create_document(Some(&token), tenant.id, invoice(vec![item("Site", 1, "10")]))
        .await
        .unwrap();
    svc.delete_document(Some(&token), first.id).await.unwrap();

    let second = svc
        .create_document(Some(&token), tenant.id, invoice(vec![item("Site", 1, "10")]))
        .await
        .unwrap();
    assert_eq!(second.numero, "00000002");
}

#[tokio::test]
async fn yearly_policy_restarts_each_emission_year() {
    let config = NumberingConfig {
        policy: NumberingPolicy::Yearly,
        ..NumberingConfig::default()
    };
    let h = Harness::with_config(config, false);
    let owner = h.store.add_user("dono@euromed.fr", false);
    let tenant = h.store.add_tenant("Euromed", Some("F-"), None);
    h.store
        .add_membership(owner.id, tenant.id, facturation_core::models::tenancy::MembershipRole::Owner);
    let token = h.token(&owner);

    let dated = |y: i32, m: u32, d: u32| CreateDocumentPayload {
        emission_date: NaiveDate::from_ymd_opt(y, m, d),
        ..invoice(vec![item("Site", 1, "10")])
    };
    let svc = &h.state.document_service;

    let a = svc.create_document(Some(&token), tenant.id, dated(2025, 3, 1)).await.unwrap();
    let b = svc.create_document(Some(&token), tenant.id, dated(2025, 11, 30)).await.unwrap();
    let c = svc.create_document(Some(&token), tenant.id, dated(2026, 1, 2)).await.unwrap();

    assert_eq!(a.numero, "F-20250001");
    assert_eq!(b.numero, "F-20250002");
    assert_eq!(c.numero, "F-20260001");
}

#[tokio::test]
async fn collision_rereads_the_maximum_and_retries() {
    let h = Harness::new();
    let tenant = h.store.add_tenant("Euromed", None, None);
    let engine = NumberingEngine::new(h.state.stores.documents.clone(), NumberingConfig::default());
    let scope = engine.scope_for(
        &tenant,
        DocumentType::Invoice,
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
    );

    let attempts = Mutex::new(Vec::new());
    let store = h.store.clone();
    let result = engine
        .assign(&scope, |numero| {
            let mut seen = attempts.lock().unwrap();
            seen.push(numero.clone());
            // Outro pedido grava o mesmo numero antes de nós na primeira tentativa
            store.insert_legacy_document(legacy(tenant.id, &numero));
            let outcome = if seen.len() == 1 {
                Err(AppError::DuplicateNumero(numero))
            } else {
                Ok(numero)
            };
            std::future::ready(outcome)
        })
        .await
        .unwrap();

    assert_eq!(result, "00000002");
    assert_eq!(*attempts.lock().unwrap(), vec!["00000001", "00000002"]);
}

#[tokio::test]
async fn failed_candidate_is_never_proposed_again() {
    let h = Harness::new();
    let tenant = h.store.add_tenant("Euromed", None, None);
    let config = NumberingConfig {
        max_attempts: 3,
        ..NumberingConfig::default()
    };
    let engine = NumberingEngine::new(h.state.stores.documents.clone(), config);
    let scope = engine.scope_for(
        &tenant,
        DocumentType::Invoice,
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
    );

    // O máximo persistido nunca avança, mas o store recusa sempre
    let attempts = Mutex::new(Vec::new());
    let err = engine
        .assign(&scope, |numero| {
            attempts.lock().unwrap().push(numero.clone());
            std::future::ready(Err::<(), _>(AppError::DuplicateNumero(numero)))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NumberingConflict { attempts: 3 }));
    assert_eq!(
        *attempts.lock().unwrap(),
        vec!["00000001", "00000002", "00000003"]
    );
}

#[tokio::test]
async fn other_store_errors_are_not_retried() {
    let h = Harness::new();
    let tenant = h.store.add_tenant("Euromed", None, None);
    let engine = NumberingEngine::new(h.state.stores.documents.clone(), NumberingConfig::default());
    let scope = engine.scope_for(
        &tenant,
        DocumentType::Invoice,
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
    );

    let calls = Mutex::new(0);
    let err = engine
        .assign(&scope, |_| {
            *calls.lock().unwrap() += 1;
            std::future::ready(Err::<(), _>(AppError::AccessDenied))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AccessDenied));
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creations_get_distinct_gapless_numeros() {
    const N: usize = 12;
    let config = NumberingConfig {
        max_attempts: N as u32 + 1,
        ..NumberingConfig::default()
    };
    let h = Harness::with_config(config, false);
    let (tenant, _, token) = h.tenant_with_owner("Euromed");

    let mut tasks = JoinSet::new();
    for i in 0..N {
        let svc = h.state.document_service.clone();
        let token = token.clone();
        let tenant_id = tenant.id;
        tasks.spawn(async move {
            svc.create_document(
                Some(&token),
                tenant_id,
                invoice(vec![item(&format!("Item {i}"), 1, "10")]),
            )
            .await
        });
    }

    let mut numeros = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        let doc = joined.unwrap().unwrap();
        assert!(numeros.insert(doc.numero), "numero repetido");
    }

    let expected: HashSet<String> = (1..=N).map(|n| format!("{n:08}")).collect();
    assert_eq!(numeros, expected);
}
