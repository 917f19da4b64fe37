//! # Salvamento do PIA — Uma Transação, Sete Tabelas
//!
//! O [`PiaWorkflow`] grava o Plano Individual de Atendimento inteiro de forma
//! atômica: ou as sete tabelas refletem o formulário enviado, ou nenhuma
//! muda.
//!
//! ## Etapas
//!
//! ```text
//! PiaRequest
//!   │ validar()                       ── falha → Validacao (sem sessão)
//!   ▼
//! begin()                             ── falha → Acquire
//!   │ ┌──────────── timeout ──────────────────────────────┐
//!   │ │ UPDATE atendidos               0 linhas → AtendidoNaoEncontrado
//!   │ │ upsert familiares        + poda posicao > n        │
//!   │ │ upsert interfaces        + poda posicao > n        │
//!   │ │ upsert equipe_tecnica    + poda posicao > n        │
//!   │ │ upsert propostas_pia / opinioes / informacoes_servico
//!   │ └───────────────────────────────────────────────────┘
//!   ├── tudo ok  → commit()
//!   └── qualquer erro ou timeout → rollback() e devolve o erro original
//! ```
//!
//! A sessão é devolvida ao pool em todos os caminhos. Se o futuro de
//! [`PiaWorkflow::save`] for descartado (cliente desconectou), o drop da
//! sessão desfaz a transação.
//!
//! Não há trava na aplicação: dois salvamentos simultâneos do mesmo
//! atendido são serializados pelo banco, e o último a confirmar vence.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::core::atendido::hoje;
use crate::core::{AtendidoId, PiaRequest, PiaValidado, ValidationError};
use crate::store::{ListaPia, PiaSession, RecordStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum PiaError {
    #[error(transparent)]
    Validacao(#[from] ValidationError),
    #[error("atendido {0} não encontrado")]
    AtendidoNaoEncontrado(AtendidoId),
    #[error("sistema ocupado, tente novamente: {0}")]
    Acquire(#[source] StoreError),
    #[error("falha ao salvar o PIA: {0}")]
    Store(#[from] StoreError),
    #[error("o salvamento do PIA excedeu {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Resumo de um salvamento confirmado.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PiaSalvo {
    pub id: AtendidoId,
    pub familiares: usize,
    pub interfaces: usize,
    pub equipe: usize,
    /// Linhas removidas das listas por excederem o novo comprimento.
    pub linhas_podadas: u64,
}

pub struct PiaWorkflow {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl PiaWorkflow {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn save(&self, request: PiaRequest) -> Result<PiaSalvo, PiaError> {
        let pia = request.validar(hoje())?;
        self.save_validated(pia).await
    }

    pub async fn save_validated(&self, pia: PiaValidado) -> Result<PiaSalvo, PiaError> {
        let mut sessao = self.store.begin().await.map_err(|e| match e {
            StoreError::Acquire(_) => PiaError::Acquire(e),
            outro => PiaError::Store(outro),
        })?;

        let resultado = match tokio::time::timeout(self.timeout, gravar(sessao.as_mut(), &pia))
            .await
        {
            Ok(resultado) => resultado,
            Err(_) => Err(PiaError::Timeout(self.timeout)),
        };

        match resultado {
            Ok(salvo) => {
                sessao.commit().await?;
                tracing::info!(
                    id = salvo.id,
                    familiares = salvo.familiares,
                    interfaces = salvo.interfaces,
                    equipe = salvo.equipe,
                    podadas = salvo.linhas_podadas,
                    "PIA salvo"
                );
                Ok(salvo)
            }
            Err(erro) => {
                tracing::warn!(id = pia.id, error = %erro, "Salvamento do PIA desfeito");
                if let Err(e) = sessao.rollback().await {
                    tracing::error!(id = pia.id, error = %e, "Falha no rollback do PIA");
                }
                Err(erro)
            }
        }
    }
}

fn comprimento<T>(itens: &[T]) -> i32 {
    i32::try_from(itens.len()).unwrap_or(i32::MAX)
}

async fn gravar(sessao: &mut dyn PiaSession, pia: &PiaValidado) -> Result<PiaSalvo, PiaError> {
    let id = pia.id;
    if sessao.update_atendido(id, &pia.patch).await? == 0 {
        return Err(PiaError::AtendidoNaoEncontrado(id));
    }

    let mut podadas = 0;
    for familiar in &pia.familiares {
        sessao.upsert_familiar(id, familiar).await?;
    }
    podadas += sessao
        .prune(ListaPia::Familiares, id, comprimento(&pia.familiares))
        .await?;

    for interface in &pia.interfaces {
        sessao.upsert_interface(id, interface).await?;
    }
    podadas += sessao
        .prune(ListaPia::Interfaces, id, comprimento(&pia.interfaces))
        .await?;

    for membro in &pia.equipe {
        sessao.upsert_membro_equipe(id, membro).await?;
    }
    podadas += sessao
        .prune(ListaPia::Equipe, id, comprimento(&pia.equipe))
        .await?;

    sessao.upsert_propostas(id, &pia.propostas).await?;
    sessao.upsert_opinioes(id, &pia.opinioes).await?;
    sessao
        .upsert_informacoes_servico(id, &pia.informacoes_servico)
        .await?;

    Ok(PiaSalvo {
        id,
        familiares: pia.familiares.len(),
        interfaces: pia.interfaces.len(),
        equipe: pia.equipe.len(),
        linhas_podadas: podadas,
    })
}
