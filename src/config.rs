// src/config.rs

use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::Stores,
    services::{
        access_guard::AccessGuard,
        auth::{IdentityResolver, JwtIdentityResolver},
        consistency::ConsistencyManager,
        document_service::DocumentService,
        membership_service::MembershipService,
        migration_service::MigrationService,
        numbering::{NumberingConfig, NumberingEngine, NumberingPolicy},
        repair_service::RepairService,
    },
};

// ---
// Configuração lida do ambiente (.env incluído)
// ---
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub numbering: NumberingConfig,
    pub strict_item_reads: bool,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?;

        let width: usize = env_or("NUMBERING_WIDTH", 8)?;
        if !(1..=18).contains(&width) {
            anyhow::bail!("NUMBERING_WIDTH deve estar entre 1 e 18 (recebido {width})");
        }

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000".to_string())?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 5)?,
            db_acquire_timeout: Duration::from_secs(env_or("DB_ACQUIRE_TIMEOUT_SECS", 3)?),
            numbering: NumberingConfig {
                policy: env_or("NUMBERING_POLICY", NumberingPolicy::Continuous)?,
                width,
                max_attempts: env_or("NUMBERING_MAX_ATTEMPTS", 5)?,
            },
            strict_item_reads: env_or("STRICT_ITEM_READS", false)?,
        })
    }

    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        // Conecta ao banco de dados, usando '?' para propagar erros
        let pool = PgPoolOptions::new()
            .max_connections(self.db_max_connections)
            .acquire_timeout(self.db_acquire_timeout)
            .connect(&self.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");
        Ok(pool)
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} inválido ({raw}): {e}")),
        _ => Ok(default),
    }
}

// ---
// Estado compartilhado pelos handlers e pelas ferramentas de lote
// ---
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub identity: JwtIdentityResolver,
    pub guard: AccessGuard,
    pub document_service: DocumentService,
    pub membership_service: MembershipService,
    pub migration_service: MigrationService,
    pub repair_service: RepairService,
}

impl AppState {
    pub fn new(pool: PgPool, settings: &Settings) -> Self {
        Self::from_stores(
            Stores::postgres(pool),
            settings.jwt_secret.clone(),
            settings.numbering.clone(),
            settings.strict_item_reads,
        )
    }

    /// Monta o grafo de dependências sobre qualquer conjunto de stores.
    pub fn from_stores(
        stores: Stores,
        jwt_secret: String,
        numbering: NumberingConfig,
        strict_item_reads: bool,
    ) -> Self {
        let identity = JwtIdentityResolver::new(stores.users.clone(), jwt_secret);
        let resolver: std::sync::Arc<dyn IdentityResolver> = std::sync::Arc::new(identity.clone());

        let guard = AccessGuard::new(
            resolver,
            stores.tenants.clone(),
            stores.memberships.clone(),
            stores.resources.clone(),
        );
        let consistency = ConsistencyManager::new(strict_item_reads);
        let numbering = NumberingEngine::new(stores.documents.clone(), numbering);

        let document_service = DocumentService::new(
            guard.clone(),
            numbering,
            consistency,
            stores.documents.clone(),
            stores.resources.clone(),
        );
        let membership_service = MembershipService::new(
            guard.clone(),
            stores.users.clone(),
            stores.tenants.clone(),
            stores.memberships.clone(),
        );
        let migration_service = MigrationService::new(
            stores.tenants.clone(),
            stores.memberships.clone(),
            stores.history.clone(),
        );
        // Auditoria sempre tolerante: divergências são o que ela relata
        let repair_service =
            RepairService::new(stores.documents.clone(), ConsistencyManager::new(false));

        Self {
            stores,
            identity,
            guard,
            document_service,
            membership_service,
            migration_service,
            repair_service,
        }
    }
}
