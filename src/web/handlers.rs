//! # Handlers HTTP — Os Endpoints da Aplicação
//!
//! Cada função pública neste módulo é um handler Axum, mapeado a uma
//! rota em [`super::create_router()`].
//!
//! ## Padrão de Resposta
//!
//! | Handler | Método | Retorno | Uso |
//! |---------|--------|---------|-----|
//! | `pesquisar` | GET | HTML completo | Listagem paginada |
//! | `inserir` | GET | HTML completo | Cadastro + lista completa |
//! | `criar` | POST | 303 | Cadastro de atendido |
//! | `buscar` | POST | HTML completo | Listagem filtrada |
//! | `alterar` | GET | HTML completo | Formulário do PIA |
//! | `salvar_pia` | POST | texto | Confirmação ou motivo da falha |
//! | `status` | GET | JSON | Backend e sessões abertas |
//!
//! ## Status de Erro
//!
//! | Falha | Status |
//! |-------|--------|
//! | validação / JSON malformado | 400 |
//! | atendido inexistente | 404 |
//! | erro do banco | 500 |
//! | pool sem sessão livre | 503 |
//! | transação do PIA excedeu o tempo | 504 |

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};

use super::state::AppState;
use super::templates;
use crate::core::{FiltroBusca, NovoAtendidoForm, Paginacao, PiaRequest, ValidationError};
use crate::store::StoreError;
use crate::workflow::PiaError;

/// Resposta do endpoint `/status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub backend: String,
    pub sessions_open: usize,
}

#[derive(Debug, Deserialize)]
pub struct PaginaQuery {
    pub page: Option<String>,
}

/// Falha dos handlers de página, renderizada como página de erro.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error(transparent)]
    Validacao(#[from] ValidationError),
    #[error("{0}")]
    NaoEncontrado(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Corpo das respostas 500; o detalhe fica no log.
pub const ERRO_INTERNO: &str = "Erro interno do servidor.";
pub const SISTEMA_OCUPADO: &str = "Sistema ocupado, tente novamente.";

impl WebError {
    fn status(&self) -> StatusCode {
        match self {
            WebError::Validacao(_) => StatusCode::BAD_REQUEST,
            WebError::NaoEncontrado(_) => StatusCode::NOT_FOUND,
            WebError::Store(StoreError::Acquire(_)) => StatusCode::SERVICE_UNAVAILABLE,
            WebError::Store(StoreError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mensagem = match &self {
            WebError::Store(e) => {
                tracing::error!(error = %e, "Falha de banco ao atender página");
                ERRO_INTERNO.to_string()
            }
            outro => outro.to_string(),
        };
        (status, markup_to_html(templates::erro_page(status, &mensagem))).into_response()
    }
}

impl PiaError {
    pub fn status(&self) -> StatusCode {
        match self {
            PiaError::Validacao(_) => StatusCode::BAD_REQUEST,
            PiaError::AtendidoNaoEncontrado(_) => StatusCode::NOT_FOUND,
            PiaError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PiaError::Acquire(_) => StatusCode::SERVICE_UNAVAILABLE,
            PiaError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for PiaError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mensagem = match &self {
            PiaError::Store(_) => ERRO_INTERNO.to_string(),
            PiaError::Acquire(_) => SISTEMA_OCUPADO.to_string(),
            outro => outro.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Falha ao salvar PIA");
        }
        (status, mensagem).into_response()
    }
}

/// Converte Maud Markup em resposta Html<String> do Axum.
fn markup_to_html(m: maud::Markup) -> Html<String> {
    Html(m.into_string())
}

/// GET `/` — Listagem paginada por id.
pub async fn pesquisar(
    State(state): State<AppState>,
    Query(query): Query<PaginaQuery>,
) -> Result<Html<String>, WebError> {
    let total = state.store.count_atendidos().await?;
    let paginacao = Paginacao::from_query(query.page.as_deref(), state.por_pagina, total);
    let atendidos = state
        .store
        .list_atendidos(paginacao.offset(), paginacao.por_pagina)
        .await?;
    Ok(markup_to_html(templates::pesquisar_page(
        &atendidos,
        Some(&paginacao),
    )))
}

/// GET `/inserir` — Formulário de cadastro e todos os atendidos por nome.
pub async fn inserir(State(state): State<AppState>) -> Result<Html<String>, WebError> {
    let atendidos = state.store.list_all_atendidos().await?;
    Ok(markup_to_html(templates::inserir_page(&atendidos)))
}

/// POST `/criar` — Valida e cadastra; em caso de sucesso volta a `/inserir`.
pub async fn criar(
    State(state): State<AppState>,
    Form(form): Form<NovoAtendidoForm>,
) -> Result<Redirect, WebError> {
    let novo = form.validar()?;
    let id = state.store.create_atendido(&novo).await?;
    tracing::info!(id, "Atendido cadastrado");
    Ok(Redirect::to("/inserir"))
}

/// POST `/buscar` — Busca por nome, faixa etária e filtros opcionais.
///
/// O formulário chega como mapa cru para que campos desconhecidos sejam
/// listados no erro em vez de ignorados.
pub async fn buscar(
    State(state): State<AppState>,
    Form(campos): Form<HashMap<String, String>>,
) -> Result<Html<String>, WebError> {
    let filtro = FiltroBusca::from_campos(&campos)?;
    let encontrados = state.store.search_atendidos(&filtro).await?;
    tracing::debug!(nome = %filtro.nome, encontrados = encontrados.len(), "Busca de atendidos");
    Ok(markup_to_html(templates::pesquisar_page(&encontrados, None)))
}

/// GET `/alterar?id=N` — Formulário do PIA com o que já está gravado.
pub async fn alterar(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Html<String>, WebError> {
    let id = params
        .get("id")
        .and_then(|v| v.trim().parse::<i32>().ok())
        .filter(|&id| id > 0)
        .ok_or(ValidationError::Id)?;
    let registro = state
        .store
        .load_pia(id)
        .await?
        .ok_or_else(|| WebError::NaoEncontrado(format!("Atendido {id} não encontrado.")))?;
    Ok(markup_to_html(templates::pia_page(&registro)))
}

/// POST `/salvar_pia` — Grava o PIA inteiro numa única transação.
pub async fn salvar_pia(
    State(state): State<AppState>,
    payload: Result<Json<PiaRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejeicao) => {
            tracing::warn!(error = %rejeicao.body_text(), "Payload do PIA rejeitado");
            return PiaError::from(ValidationError::Corpo(rejeicao.body_text())).into_response();
        }
    };

    match state.workflow.save(request).await {
        Ok(salvo) => (
            StatusCode::OK,
            format!("PIA do atendido {} salvo com sucesso.", salvo.id),
        )
            .into_response(),
        Err(erro) => erro.into_response(),
    }
}

/// GET `/status` — Retorna JSON `{ "backend": ..., "sessions_open": n }`.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        backend: state.store.backend().to_string(),
        sessions_open: state.store.sessions_open(),
    })
}
