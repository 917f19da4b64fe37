//! # Estado da Aplicação Web
//!
//! ```text
//! AppState (Clone, barato: só Arcs)
//!  ├── store     Arc<dyn RecordStore>   listagens, busca, cadastro, /alterar
//!  ├── workflow  Arc<PiaWorkflow>       POST /salvar_pia
//!  └── por_pagina                       tamanho da página em GET /
//! ```
//!
//! Não há cache de atendidos no processo: toda página lê o banco.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::store::RecordStore;
use crate::workflow::PiaWorkflow;

/// Estado compartilhado da aplicação Axum.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub workflow: Arc<PiaWorkflow>,
    pub por_pagina: i64,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, config: &AppConfig) -> Self {
        let timeout = Duration::from_secs(config.pia.transaction_timeout_secs);
        Self {
            workflow: Arc::new(PiaWorkflow::new(store.clone(), timeout)),
            store,
            por_pagina: config.listagem.por_pagina,
        }
    }
}
