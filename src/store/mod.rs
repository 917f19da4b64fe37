//! # Armazenamento — Fronteira com o Banco de Registros
//!
//! Toda leitura e escrita passa por dois traits:
//!
//! - [`RecordStore`] — o banco como um todo: listagens, busca, cadastro,
//!   carga do PIA e abertura de sessões transacionais.
//! - [`PiaSession`] — **uma** conexão exclusiva com uma transação aberta.
//!   Todas as etapas do salvamento do PIA rodam na mesma sessão.
//!
//! ## Implementações
//!
//! | Backend | Tipo | Uso |
//! |---------|------|-----|
//! | PostgreSQL | [`postgres::PgStore`] | produção (`sqlx::PgPool`) |
//! | memória | [`memory::MemoryStore`] | demonstração local e testes |
//!
//! ## Ciclo de Vida de uma Sessão
//!
//! ```text
//! begin() ──→ Box<dyn PiaSession> ──┬── commit()   → conexão devolvida ao pool
//!   │ (pool cheio: StoreError::Acquire)├── rollback() → conexão devolvida ao pool
//!                                     └── drop       → rollback implícito + devolução
//! ```
//!
//! Nenhuma sessão sobrevive ao seu dono: se o futuro que a segura for
//! cancelado, o drop desfaz a transação.

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::DatabaseConfig;
use crate::core::{
    Atendido, AtendidoId, AtendidoPatch, AtendidoResumo, Familiar, FiltroBusca, InformacoesServico,
    InterfaceRedeExecutiva, MembroEquipe, NovoAtendido, Opiniao, PiaRegistro, Posicionado,
};

/// Erro de origem arbitrária carregado por [`StoreError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// URL que seleciona o backend em memória.
pub const MEMORY_URL: &str = "memory:";

/// Falha do armazenamento, separando "não consegui conexão" de "o banco
/// recusou o comando".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("não foi possível obter uma sessão do pool: {0}")]
    Acquire(#[source] BoxError),
    #[error("erro no banco de dados: {0}")]
    Database(#[source] BoxError),
}

impl StoreError {
    pub fn acquire(erro: impl Into<BoxError>) -> Self {
        StoreError::Acquire(erro.into())
    }

    pub fn database(erro: impl Into<BoxError>) -> Self {
        StoreError::Database(erro.into())
    }
}

/// As três listas dependentes do PIA, identificadas por (usuario_id, posicao).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListaPia {
    Familiares,
    Interfaces,
    Equipe,
}

impl ListaPia {
    pub fn tabela(self) -> &'static str {
        match self {
            ListaPia::Familiares => "familiares",
            ListaPia::Interfaces => "interfaces_rede_executiva",
            ListaPia::Equipe => "equipe_tecnica",
        }
    }
}

/// O banco de registros do NAISPD.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Nome do backend, exibido em `/status`.
    fn backend(&self) -> &'static str;

    /// Sessões/conexões atualmente fora do pool.
    fn sessions_open(&self) -> usize;

    async fn count_atendidos(&self) -> Result<i64, StoreError>;

    /// Página da listagem, ordenada por id.
    async fn list_atendidos(&self, offset: i64, limit: i64)
        -> Result<Vec<AtendidoResumo>, StoreError>;

    /// Todos os atendidos, ordenados por nome.
    async fn list_all_atendidos(&self) -> Result<Vec<AtendidoResumo>, StoreError>;

    async fn search_atendidos(&self, filtro: &FiltroBusca)
        -> Result<Vec<AtendidoResumo>, StoreError>;

    async fn create_atendido(&self, novo: &NovoAtendido) -> Result<AtendidoId, StoreError>;

    async fn find_atendido(&self, id: AtendidoId) -> Result<Option<Atendido>, StoreError>;

    /// Atendido e suas seis tabelas dependentes; `None` se o atendido não existe.
    async fn load_pia(&self, id: AtendidoId) -> Result<Option<PiaRegistro>, StoreError>;

    /// Obtém uma conexão exclusiva do pool e abre uma transação nela.
    async fn begin(&self) -> Result<Box<dyn PiaSession>, StoreError>;
}

/// Uma transação aberta sobre uma única conexão.
///
/// Os upserts usam a posição ou o `usuario_id` como alvo de conflito; nenhum
/// método consulta antes de escrever.
#[async_trait]
pub trait PiaSession: Send {
    /// Retorna o número de linhas afetadas (0 se o atendido não existe).
    async fn update_atendido(
        &mut self,
        id: AtendidoId,
        patch: &AtendidoPatch,
    ) -> Result<u64, StoreError>;

    async fn upsert_familiar(
        &mut self,
        id: AtendidoId,
        familiar: &Posicionado<Familiar>,
    ) -> Result<(), StoreError>;

    async fn upsert_interface(
        &mut self,
        id: AtendidoId,
        interface: &Posicionado<InterfaceRedeExecutiva>,
    ) -> Result<(), StoreError>;

    async fn upsert_membro_equipe(
        &mut self,
        id: AtendidoId,
        membro: &Posicionado<MembroEquipe>,
    ) -> Result<(), StoreError>;

    /// Remove as linhas da lista com `posicao > manter`; retorna quantas saíram.
    async fn prune(
        &mut self,
        lista: ListaPia,
        id: AtendidoId,
        manter: i32,
    ) -> Result<u64, StoreError>;

    async fn upsert_propostas(&mut self, id: AtendidoId, propostas: &str)
        -> Result<(), StoreError>;

    async fn upsert_opinioes(&mut self, id: AtendidoId, opinioes: &Opiniao)
        -> Result<(), StoreError>;

    async fn upsert_informacoes_servico(
        &mut self,
        id: AtendidoId,
        informacoes: &InformacoesServico,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Abre o backend indicado por `database.url`.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn RecordStore>, StoreError> {
    let acquire_timeout = Duration::from_secs(config.acquire_timeout_secs);
    if config.url == MEMORY_URL {
        tracing::warn!("Usando armazenamento em memória: os dados não sobrevivem ao processo");
        return Ok(Arc::new(memory::MemoryStore::new(
            config.max_connections as usize,
            acquire_timeout,
        )));
    }

    let store = postgres::PgStore::connect(&config.url, config.max_connections, acquire_timeout)
        .await?;
    if config.apply_schema {
        store.apply_schema().await?;
    }
    Ok(Arc::new(store))
}
