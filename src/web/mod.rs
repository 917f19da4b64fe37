//! # Módulo Web — Cadastro e PIA pelo Navegador
//!
//! Camada HTTP da aplicação, construída com **Axum** + **Maud**. Páginas
//! completas renderizadas no servidor; o único JavaScript é o do formulário
//! do PIA, que envia o plano como JSON.
//!
//! ## Rotas
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ Axum Router (este módulo)                                 │
//! │  ├── GET  /?page=N        → listagem paginada             │
//! │  ├── GET  /inserir        → formulário de cadastro + lista│
//! │  ├── POST /criar          → cadastro, 303 → /inserir      │
//! │  ├── POST /buscar         → listagem filtrada             │
//! │  ├── GET  /alterar?id=N   → formulário do PIA preenchido  │
//! │  ├── POST /salvar_pia     → PiaWorkflow (JSON)            │
//! │  └── GET  /status         → JSON: backend, sessões abertas│
//! ├───────────────────────────────────────────────────────────┤
//! │ Static Assets (tower_http::ServeDir → /assets/)           │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Submódulos
//!
//! | Módulo | Responsabilidade |
//! |--------|------------------|
//! | [`state`] | Estado compartilhado (`AppState`) |
//! | [`handlers`] | Handlers Axum e mapeamento de erros para status HTTP |
//! | [`templates`] | Templates Maud (HTML server-side) |

pub mod handlers;
pub mod state;
pub mod templates;

use std::path::Path;

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Cria o router Axum com todas as rotas da aplicação.
///
/// `assets_dir` é servido em `/assets` (CSS).
pub fn create_router(state: AppState, assets_dir: impl AsRef<Path>) -> Router {
    Router::new()
        // ── Páginas HTML ──────────────────────────────────────
        .route("/", get(handlers::pesquisar))
        .route("/inserir", get(handlers::inserir))
        .route("/alterar", get(handlers::alterar))
        // ── Formulários ───────────────────────────────────────
        .route("/criar", post(handlers::criar))
        .route("/buscar", post(handlers::buscar))
        .route("/salvar_pia", post(handlers::salvar_pia))
        // ── API JSON ──────────────────────────────────────────
        .route("/status", get(handlers::status))
        // ── Arquivos estáticos ────────────────────────────────
        .nest_service("/assets", ServeDir::new(assets_dir.as_ref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::store::memory::{Etapa, MemoryStore};
    use crate::store::RecordStore;

    fn app(store: &MemoryStore) -> Router {
        let state = AppState::new(Arc::new(store.clone()), &AppConfig::default());
        create_router(state, "assets")
    }

    fn store() -> MemoryStore {
        MemoryStore::new(2, Duration::from_millis(50))
    }

    async fn corpo(resposta: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(resposta.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn form(uri: &str, corpo: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(corpo.to_string()))
            .unwrap()
    }

    fn json(corpo: serde_json::Value) -> Request<Body> {
        Request::post("/salvar_pia")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(corpo.to_string()))
            .unwrap()
    }

    const CADASTRO: &str = "nome=Ana+Souza&telefone=%2811%29+91234-5678&email=ana%40exemplo.com\
        &dataNascimento=1950-01-01&rg=1234567&cpf=529.982.247-25";

    async fn cadastrar(store: &MemoryStore) {
        let resposta = app(store).oneshot(form("/criar", CADASTRO)).await.unwrap();
        assert_eq!(resposta.status(), StatusCode::SEE_OTHER);
        assert_eq!(resposta.headers()[header::LOCATION], "/inserir");
    }

    fn pia(id: i32) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "nome": "Ana Souza",
            "dataNascimento": "1950-01-01",
            "filiacao": "",
            "enderecoFamilia": "",
            "familiaresData": [{ "nome": "Bia" }],
            "propostasPia": "x",
            "interfacesRedeExecutivaData": [],
            "opiniaoUsuarioPia": "u",
            "opiniaoFamiliaPia": "f",
            "equipeTecnicaData": [],
            "informacoesServico": {}
        })
    }

    #[tokio::test]
    async fn cadastro_aparece_na_listagem() {
        let store = store();
        cadastrar(&store).await;

        let resposta = app(&store)
            .oneshot(Request::get("/?page=abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resposta.status(), StatusCode::OK);
        let html = corpo(resposta).await;
        assert!(html.contains("Ana Souza"));
        assert!(html.contains("Página 1 de 1"));
    }

    #[tokio::test]
    async fn cadastro_invalido_retorna_400_com_mensagem() {
        let store = store();
        let resposta = app(&store)
            .oneshot(form("/criar", &CADASTRO.replace("529.982.247-25", "111.111.111-11")))
            .await
            .unwrap();
        assert_eq!(resposta.status(), StatusCode::BAD_REQUEST);
        assert!(corpo(resposta).await.contains("CPF inválido."));
        assert_eq!(store.count_atendidos().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn busca_filtra_e_rejeita_campos_desconhecidos() {
        let store = store();
        cadastrar(&store).await;

        let resposta = app(&store)
            .oneshot(form("/buscar", "nome_buscar=souza&idade=60%2B"))
            .await
            .unwrap();
        assert_eq!(resposta.status(), StatusCode::OK);
        assert!(corpo(resposta).await.contains("Ana Souza"));

        let resposta = app(&store)
            .oneshot(form("/buscar", "nome_buscar=souza&idade=all&cor=azul"))
            .await
            .unwrap();
        assert_eq!(resposta.status(), StatusCode::BAD_REQUEST);
        assert!(corpo(resposta).await.contains("Campos de busca inválidos: cor."));
    }

    #[tokio::test]
    async fn alterar_valida_id_e_existencia() {
        let store = store();
        cadastrar(&store).await;
        let get = |uri: &str| Request::get(uri).body(Body::empty()).unwrap();

        let resposta = app(&store).oneshot(get("/alterar?id=1")).await.unwrap();
        assert_eq!(resposta.status(), StatusCode::OK);
        assert!(corpo(resposta).await.contains("pia-form"));

        let resposta = app(&store).oneshot(get("/alterar?id=-1")).await.unwrap();
        assert_eq!(resposta.status(), StatusCode::BAD_REQUEST);

        let resposta = app(&store).oneshot(get("/alterar?id=99")).await.unwrap();
        assert_eq!(resposta.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn salvar_pia_grava_e_mapeia_falhas() {
        let store = store();
        cadastrar(&store).await;

        let resposta = app(&store).oneshot(json(pia(1))).await.unwrap();
        assert_eq!(resposta.status(), StatusCode::OK);
        assert_eq!(corpo(resposta).await, "PIA do atendido 1 salvo com sucesso.");
        assert_eq!(store.snapshot().familiares[&(1, 1)].nome, "Bia");

        let resposta = app(&store).oneshot(json(pia(99))).await.unwrap();
        assert_eq!(resposta.status(), StatusCode::NOT_FOUND);

        let mut sem_lista = pia(1);
        sem_lista.as_object_mut().unwrap().remove("familiaresData");
        let resposta = app(&store).oneshot(json(sem_lista)).await.unwrap();
        assert_eq!(resposta.status(), StatusCode::BAD_REQUEST);

        store.fail_at(Some(Etapa::Opinioes));
        let resposta = app(&store).oneshot(json(pia(1))).await.unwrap();
        assert_eq!(resposta.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.sessions_open(), 0);
    }

    #[tokio::test]
    async fn erro_de_banco_nao_expoe_detalhes() {
        let store = store();
        cadastrar(&store).await;
        store.fail_at(Some(Etapa::Familiar));

        let resposta = app(&store).oneshot(json(pia(1))).await.unwrap();
        assert_eq!(resposta.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let texto = corpo(resposta).await;
        assert_eq!(texto, handlers::ERRO_INTERNO);
        assert!(!texto.contains("falha simulada"));
    }

    #[tokio::test]
    async fn pool_esgotado_retorna_503() {
        let store = MemoryStore::new(1, Duration::from_millis(20));
        cadastrar(&store).await;
        let _ocupada = store.begin().await.unwrap();

        let resposta = app(&store).oneshot(json(pia(1))).await.unwrap();
        assert_eq!(resposta.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(corpo(resposta).await, handlers::SISTEMA_OCUPADO);
    }

    #[tokio::test]
    async fn timeout_retorna_504() {
        let store = store();
        cadastrar(&store).await;
        store.set_step_delay(Some(Duration::from_millis(50)));
        let config = AppConfig {
            pia: crate::config::PiaConfig {
                transaction_timeout_secs: 0,
            },
            ..AppConfig::default()
        };
        let app = create_router(AppState::new(Arc::new(store.clone()), &config), "assets");

        let resposta = app.oneshot(json(pia(1))).await.unwrap();
        assert_eq!(resposta.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(store.sessions_open(), 0);
    }

    #[tokio::test]
    async fn status_informa_backend() {
        let store = store();
        let resposta = app(&store)
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resposta.status(), StatusCode::OK);
        let status: handlers::StatusResponse = serde_json::from_str(&corpo(resposta).await).unwrap();
        assert_eq!(status.backend, "memory");
        assert_eq!(status.sessions_open, 0);
    }
}
