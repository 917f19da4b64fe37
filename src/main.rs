//! # NAISPD — Cadastro e Plano Individual de Atendimento
//!
//! **Ponto de entrada** do servidor de registros do NAISPD.
//!
//! Carrega a configuração, abre o banco (PostgreSQL ou memória), monta o
//! router e serve até receber Ctrl-C.
//!
//! ## Fluxo de Inicialização
//!
//! ```text
//! main()
//!   ├── Configura tracing/logging (RUST_LOG, padrão "info")
//!   ├── Lê naispd.toml (ou --config) e aplica variáveis de ambiente
//!   ├── store::connect()  → pool + schema
//!   ├── AppState { store, PiaWorkflow }
//!   ├── web::create_router()
//!   └── axum::serve com graceful shutdown
//! ```
//!
//! ## Exemplo de Uso
//!
//! ```bash
//! # PostgreSQL local
//! DATABASE_URL=postgres://postgres@localhost:5432/NAISPD cargo run
//!
//! # Sem banco, dados apenas em memória
//! DATABASE_URL=memory: RUST_LOG=debug cargo run
//! ```

/// Módulo `config` — configuração TOML + variáveis de ambiente.
mod config;

/// Módulo `core` — atendidos, validação, busca, paginação e tipos do PIA.
mod core;

/// Módulo `store` — traits de armazenamento, PostgreSQL e memória.
mod store;

/// Módulo `web` — servidor axum, handlers HTTP e templates.
mod web;

/// Módulo `workflow` — salvamento atômico do PIA.
mod workflow;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::web::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "naispd", version, about = "Cadastro de atendidos e PIA do NAISPD")]
struct Args {
    /// Arquivo de configuração TOML (padrão: ./naispd.toml, se existir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endereço de escuta; vence o arquivo e as variáveis de ambiente.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = config::load_config(args.config.as_deref())?
        .with_env(|var| std::env::var(var).ok())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    tracing::info!(
        bind = %config.server.bind,
        max_connections = config.database.max_connections,
        pia_timeout_secs = config.pia.transaction_timeout_secs,
        "NAISPD iniciando"
    );

    let store = store::connect(&config.database)
        .await
        .context("falha ao abrir o banco de registros")?;
    tracing::info!(backend = store.backend(), "Banco de registros pronto");

    let state = AppState::new(store, &config);
    let app = web::create_router(state, &config.server.assets_dir);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("falha ao escutar em {}", config.server.bind))?;
    tracing::info!("Servidor em http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Servidor encerrado");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Falha ao instalar o handler de Ctrl-C");
        std::future::pending::<()>().await;
    }
}
