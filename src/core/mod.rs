//! # Módulo Core — Tipos do Domínio NAISPD
//!
//! Tipos puros, sem I/O, compartilhados pela camada web, pelo fluxo de
//! salvamento do PIA e pelas implementações de armazenamento:
//!
//! - [`Atendido`] — a pessoa acompanhada (tabela `atendidos`)
//! - [`PiaRequest`] / [`PiaValidado`] — o Plano Individual de Atendimento
//!   antes e depois da validação
//! - [`FiltroBusca`] — critérios do formulário de busca
//! - [`Paginacao`] — aritmética da listagem paginada
//! - [`ValidationError`] — falhas detectadas antes de tocar no banco

/// Sub-módulo com [`Atendido`] e o cálculo de idade.
pub mod atendido;

/// Sub-módulo com os filtros de `POST /buscar`.
pub mod busca;

/// Sub-módulo com a paginação de `GET /`.
pub mod paginacao;

/// Sub-módulo com os tipos do PIA e sua validação.
pub mod pia;

/// Sub-módulo com as regras de validação de entrada.
pub mod validacao;

pub use atendido::{Atendido, AtendidoId, AtendidoResumo, NovoAtendido};
pub use busca::FiltroBusca;
pub use paginacao::Paginacao;
pub use pia::{
    AtendidoPatch, Familiar, InformacoesServico, InterfaceRedeExecutiva, MembroEquipe, Opiniao,
    PiaRegistro, PiaRequest, PiaValidado, Posicionado,
};
pub use validacao::{NovoAtendidoForm, ValidationError};
