// tests/common/mod.rs
//
// Montagem comum dos testes de integração: AppState completo sobre o
// MemoryStore, mais atalhos para usuários, tenants e itens.

#![allow(dead_code)]

use std::{str::FromStr, sync::Arc};

use rust_decimal::Decimal;

use facturation_core::{
    config::AppState,
    db::{MemoryStore, Stores},
    models::{
        auth::User,
        documents::{CreateDocumentPayload, DiscountKind, DocumentType, LineItem, NewLineItemRow},
        tenancy::{MembershipRole, Tenant},
    },
    services::numbering::NumberingConfig,
};

pub const JWT_SECRET: &str = "segredo-de-teste";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(NumberingConfig::default(), false)
    }

    pub fn with_config(numbering: NumberingConfig, strict_item_reads: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::from_stores(
            Stores::in_memory(store.clone()),
            JWT_SECRET.to_string(),
            numbering,
            strict_item_reads,
        );
        Self { store, state }
    }

    pub fn token(&self, user: &User) -> String {
        self.state.identity.issue_token(user.id).unwrap()
    }

    /// Tenant sem prefixos com um OWNER já cadastrado.
    pub fn tenant_with_owner(&self, name: &str) -> (Tenant, User, String) {
        let owner = self.store.add_user(&format!("dono@{}.fr", name.to_lowercase()), false);
        let tenant = self.store.add_tenant(name, None, None);
        self.store.add_membership(owner.id, tenant.id, MembershipRole::Owner);
        let token = self.token(&owner);
        (tenant, owner, token)
    }

    pub fn member(&self, tenant: &Tenant, email: &str, role: MembershipRole) -> (User, String) {
        let user = self.store.add_user(email, false);
        self.store.add_membership(user.id, tenant.id, role);
        let token = self.token(&user);
        (user, token)
    }
}

pub fn item(name: &str, quantity: i64, unit_price: &str) -> LineItem {
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

pub fn invoice(items: Vec<LineItem>) -> CreateDocumentPayload {
    CreateDocumentPayload {
        doc_type: DocumentType::Invoice,
        client_id: None,
        emission_date: None,
        status: None,
        items,
    }
}

pub fn row(position: i32, description: &str, quantity: i64, unit_price: &str) -> NewLineItemRow {
    let quantity = Decimal::from(quantity);
    let unit_price = Decimal::from_str(unit_price).unwrap();
    NewLineItemRow {
        position,
        description: description.into(),
        quantity,
        unit_price,
        tax_rate: Decimal::from(20),
        discount: Decimal::ZERO,
        discount_kind: DiscountKind::Percentage,
        product_id: None,
        line_total: quantity * unit_price,
    }
}
