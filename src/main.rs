//src/main.rs

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use facturation_core::{
    config::{AppState, Settings},
    models::documents::DocumentType,
    routes::build_router,
    services::repair_service::{AuditMode, RepairScope},
};

#[derive(Parser)]
#[command(name = "facturation")]
#[command(author, version, about = "Núcleo de faturação multi-tenant: API e ferramentas de operador")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sobe a API HTTP (roda as migrações antes)
    Serve,
    /// Aplica as migrações SQL pendentes
    MigrateDb,
    /// Converte a relação legada usuário↔tenant em memberships com papel
    MigrateMemberships,
    /// Sincroniza o índice legado `user_tenants` com as memberships
    RebuildMemberIndex,
    /// Renumera documentos com numero duplicado
    RepairNumbering {
        /// Restringe a um tenant
        #[arg(long)]
        tenant: Option<Uuid>,

        /// Restringe a um tipo (invoice/facture, quote/devis)
        #[arg(long)]
        doc_type: Option<DocumentType>,
    },
    /// Compara snapshot e linhas relacionais de cada documento
    AuditItems {
        /// Restringe a um tenant
        #[arg(long)]
        tenant: Option<Uuid>,

        /// Reconstrói snapshots ausentes ou ilegíveis a partir das linhas
        #[arg(long)]
        rebuild_missing_snapshots: bool,
    },
    /// Emite um token de sessão para um usuário existente
    IssueToken {
        #[arg(long)]
        user: Uuid,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Inicializa o logger (RUST_LOG, padrão "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Comando falhou: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let pool = settings.connect().await?;

    match cli.command {
        Commands::MigrateDb => {
            sqlx::migrate!()
                .run(&pool)
                .await
                .context("Falha ao rodar as migrações do banco de dados")?;
            tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");
        }
        Commands::Serve => {
            sqlx::migrate!()
                .run(&pool)
                .await
                .context("Falha ao rodar as migrações do banco de dados")?;
            tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

            let app = build_router(AppState::new(pool, &settings));

            let listener = TcpListener::bind(&settings.bind_addr)
                .await
                .with_context(|| format!("Falha ao escutar em {}", settings.bind_addr))?;
            tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
            axum::serve(listener, app).await.context("Erro no servidor Axum")?;
        }
        Commands::MigrateMemberships => {
            let state = AppState::new(pool, &settings);
            let report = state.migration_service.run_membership_migration().await?;
            print_report(&report)?;
        }
        Commands::RebuildMemberIndex => {
            let state = AppState::new(pool, &settings);
            let report = state.migration_service.rebuild_legacy_index().await?;
            print_report(&report)?;
        }
        Commands::RepairNumbering { tenant, doc_type } => {
            let state = AppState::new(pool, &settings);
            let scope = RepairScope {
                tenant_id: tenant,
                doc_type,
            };
            let report = state.repair_service.run_numbering_repair(scope).await?;
            print_report(&report)?;
        }
        Commands::AuditItems {
            tenant,
            rebuild_missing_snapshots,
        } => {
            let state = AppState::new(pool, &settings);
            let mode = if rebuild_missing_snapshots {
                AuditMode::RebuildMissingSnapshots
            } else {
                AuditMode::ReportOnly
            };
            let report = state.repair_service.run_consistency_audit(tenant, mode).await?;
            print_report(&report)?;
        }
        Commands::IssueToken { user } => {
            let state = AppState::new(pool, &settings);
            let found = state
                .stores
                .users
                .find_user(user)
                .await?
                .with_context(|| format!("Usuário {user} não encontrado"))?;
            println!("{}", state.identity.issue_token(found.id)?);
        }
    }

    Ok(())
}

// Relatórios saem em JSON no stdout; o log vai para o stderr do subscriber
fn print_report<T: Serialize>(report: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
