//! # Armazenamento PostgreSQL
//!
//! [`PgStore`] fala com o banco via `sqlx::PgPool`. Todos os comandos são
//! parametrizados (`$1`, `$2`, …); nenhum valor do usuário entra no texto SQL.
//!
//! ## Upserts do PIA
//!
//! | Tabela | Alvo de conflito |
//! |--------|------------------|
//! | `familiares` | `(usuario_id, posicao)` |
//! | `interfaces_rede_executiva` | `(usuario_id, posicao)` |
//! | `equipe_tecnica` | `(usuario_id, posicao)` |
//! | `propostas_pia` | `(usuario_id)` |
//! | `opinioes` | `(usuario_id)` |
//! | `informacoes_servico` | `(usuario_id)` |
//!
//! Cada [`PgSession`] é dona de uma `sqlx::Transaction`; se for descartada
//! sem `commit()`, o sqlx emite o `ROLLBACK` e devolve a conexão ao pool.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

use super::{ListaPia, PiaSession, RecordStore, StoreError};
use crate::core::atendido::idade_hoje;
use crate::core::busca::padrao_like;
use crate::core::{
    Atendido, AtendidoId, AtendidoPatch, AtendidoResumo, Familiar, FiltroBusca,
    InformacoesServico, InterfaceRedeExecutiva, MembroEquipe, NovoAtendido, Opiniao, PiaRegistro,
    Posicionado,
};

/// DDL aplicada por [`PgStore::apply_schema`].
pub const SCHEMA: &str = include_str!("schema.sql");

const COLUNAS_RESUMO: &str = r#"
    id, nome, telefone, email, data_nascimento, rg, cpf,
    EXTRACT(YEAR FROM AGE(NOW(), data_nascimento))::INT4 AS idade
"#;

impl From<sqlx::Error> for StoreError {
    fn from(erro: sqlx::Error) -> Self {
        match erro {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreError::acquire(erro),
            outro => StoreError::database(outro),
        }
    }
}

fn resumo_de(row: &PgRow) -> Result<AtendidoResumo, sqlx::Error> {
    Ok(AtendidoResumo {
        id: row.try_get("id")?,
        nome: row.try_get("nome")?,
        telefone: row.try_get("telefone")?,
        email: row.try_get("email")?,
        data_nascimento: row.try_get("data_nascimento")?,
        rg: row.try_get("rg")?,
        cpf: row.try_get("cpf")?,
        idade: row.try_get("idade")?,
    })
}

fn atendido_de(row: &PgRow) -> Result<Atendido, sqlx::Error> {
    Ok(Atendido {
        id: row.try_get("id")?,
        nome: row.try_get("nome")?,
        telefone: row.try_get("telefone")?,
        email: row.try_get("email")?,
        data_nascimento: row.try_get("data_nascimento")?,
        rg: row.try_get("rg")?,
        cpf: row.try_get("cpf")?,
        idade: row.try_get("idade")?,
        filiacao: row.try_get("filiacao")?,
        endereco_familia: row.try_get("endereco_familia")?,
        motivo_encaminhamento: row.try_get("motivo_encaminhamento")?,
        historico_pessoa: row.try_get("historico_pessoa")?,
        responsavel: row.try_get("responsavel")?,
        raca: row.try_get("raca")?,
        deficiencia: row.try_get("deficiencia")?,
        genero: row.try_get("genero")?,
    })
}

/// Colunas de texto anuláveis lidas como `String` vazia.
fn texto(row: &PgRow, coluna: &str) -> Result<String, sqlx::Error> {
    Ok(row.try_get::<Option<String>, _>(coluna)?.unwrap_or_default())
}

/// Banco de registros PostgreSQL.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Cria o pool limitado a `max_connections` conexões.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(StoreError::acquire)?;
        tracing::info!(max_connections, "Pool PostgreSQL criado");
        Ok(Self { pool })
    }

    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("Schema aplicado");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn sessions_open(&self) -> usize {
        (self.pool.size() as usize).saturating_sub(self.pool.num_idle())
    }

    async fn count_atendidos(&self) -> Result<i64, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM atendidos")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn list_atendidos(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AtendidoResumo>, StoreError> {
        let sql = format!("SELECT {COLUNAS_RESUMO} FROM atendidos ORDER BY id OFFSET $1 LIMIT $2");
        let rows = sqlx::query(&sql)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(resumo_de).collect::<Result<_, _>>()?)
    }

    async fn list_all_atendidos(&self) -> Result<Vec<AtendidoResumo>, StoreError> {
        let sql = format!("SELECT {COLUNAS_RESUMO} FROM atendidos ORDER BY nome, id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(resumo_de).collect::<Result<_, _>>()?)
    }

    async fn search_atendidos(
        &self,
        filtro: &FiltroBusca,
    ) -> Result<Vec<AtendidoResumo>, StoreError> {
        let (idade_min, idade_max) = filtro.faixa.limites();
        let faixa_livre = idade_min.is_none() && idade_max.is_none();
        let like = |termo: &Option<String>| termo.as_deref().map(padrao_like);

        let sql = format!(
            r#"
            SELECT * FROM (
                SELECT {COLUNAS_RESUMO}, responsavel, raca, deficiencia, genero
                FROM atendidos
            ) a
            WHERE nome ILIKE $1
              AND ($2::BOOL OR (idade IS NOT NULL
                          AND ($3::INT4 IS NULL OR idade >= $3)
                          AND ($4::INT4 IS NULL OR idade <= $4)))
              AND ($5::TEXT IS NULL OR responsavel ILIKE $5)
              AND ($6::TEXT IS NULL OR raca ILIKE $6)
              AND ($7::TEXT IS NULL OR deficiencia ILIKE $7)
              AND ($8::TEXT IS NULL OR genero ILIKE $8)
            ORDER BY nome, id
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(padrao_like(&filtro.nome))
            .bind(faixa_livre)
            .bind(idade_min)
            .bind(idade_max)
            .bind(like(&filtro.responsavel))
            .bind(like(&filtro.raca))
            .bind(like(&filtro.deficiencia))
            .bind(like(&filtro.genero))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(resumo_de).collect::<Result<_, _>>()?)
    }

    async fn create_atendido(&self, novo: &NovoAtendido) -> Result<AtendidoId, StoreError> {
        let id: AtendidoId = sqlx::query_scalar(
            r#"
            INSERT INTO atendidos (nome, telefone, email, data_nascimento, rg, cpf, idade)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&novo.nome)
        .bind(&novo.telefone)
        .bind(&novo.email)
        .bind(novo.data_nascimento)
        .bind(&novo.rg)
        .bind(&novo.cpf)
        .bind(idade_hoje(novo.data_nascimento))
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_atendido(&self, id: AtendidoId) -> Result<Option<Atendido>, StoreError> {
        let row = sqlx::query("SELECT * FROM atendidos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(atendido_de).transpose()?)
    }

    async fn load_pia(&self, id: AtendidoId) -> Result<Option<PiaRegistro>, StoreError> {
        let Some(atendido) = self.find_atendido(id).await? else {
            return Ok(None);
        };

        let familiares = sqlx::query(
            "SELECT * FROM familiares WHERE usuario_id = $1 ORDER BY posicao",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| -> Result<_, sqlx::Error> {
            Ok(Posicionado {
                posicao: r.try_get("posicao")?,
                item: Familiar {
                    nome: r.try_get("nome")?,
                    data_nascimento: r.try_get("data_nascimento")?,
                    parentesco: texto(r, "parentesco")?,
                    servico_socioassistencial: texto(r, "servico_socioassistencial")?,
                    telefone: texto(r, "telefone")?,
                    demanda_apresentada: texto(r, "demanda_apresentada")?,
                },
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

        let interfaces = sqlx::query(
            "SELECT * FROM interfaces_rede_executiva WHERE usuario_id = $1 ORDER BY posicao",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| -> Result<_, sqlx::Error> {
            Ok(Posicionado {
                posicao: r.try_get("posicao")?,
                item: InterfaceRedeExecutiva {
                    acao_encaminhamento: texto(r, "acao_encaminhamento")?,
                    a_quem_destina: texto(r, "a_quem_destina")?,
                    orgao_servico_atendimento: texto(r, "orgao_servico_atendimento")?,
                },
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

        let equipe = sqlx::query(
            "SELECT * FROM equipe_tecnica WHERE usuario_id = $1 ORDER BY posicao",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| -> Result<_, sqlx::Error> {
            Ok(Posicionado {
                posicao: r.try_get("posicao")?,
                item: MembroEquipe {
                    nome: r.try_get("nome")?,
                    funcao: texto(r, "funcao")?,
                },
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

        let propostas: Option<Option<String>> =
            sqlx::query_scalar("SELECT propostas FROM propostas_pia WHERE usuario_id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let opinioes = sqlx::query("SELECT * FROM opinioes WHERE usuario_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| {
                Ok::<_, sqlx::Error>(Opiniao {
                    opiniao_usuario_pia: texto(&r, "opiniao_usuario_pia")?,
                    opiniao_familia_pia: texto(&r, "opiniao_familia_pia")?,
                })
            })
            .transpose()?;

        let informacoes_servico =
            sqlx::query("SELECT * FROM informacoes_servico WHERE usuario_id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .map(|r| {
                    Ok::<_, sqlx::Error>(InformacoesServico {
                        nome_servico: texto(&r, "nome_servico")?,
                        endereco_servico: texto(&r, "endereco_servico")?,
                        email_servico: texto(&r, "email_servico")?,
                        telefone_servico: texto(&r, "telefone_servico")?,
                    })
                })
                .transpose()?;

        Ok(Some(PiaRegistro {
            atendido,
            familiares,
            propostas: propostas.map(Option::unwrap_or_default),
            interfaces,
            opinioes,
            equipe,
            informacoes_servico,
        }))
    }

    async fn begin(&self) -> Result<Box<dyn PiaSession>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx }))
    }
}

/// Transação aberta sobre uma conexão do pool.
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PiaSession for PgSession {
    async fn update_atendido(
        &mut self,
        id: AtendidoId,
        patch: &AtendidoPatch,
    ) -> Result<u64, StoreError> {
        let resultado = sqlx::query(
            r#"
            UPDATE atendidos
            SET nome = $1,
                data_nascimento = $2,
                idade = $3,
                filiacao = $4,
                endereco_familia = $5,
                motivo_encaminhamento = CASE WHEN $6 THEN $7 ELSE motivo_encaminhamento END,
                historico_pessoa = CASE WHEN $8 THEN $9 ELSE historico_pessoa END
            WHERE id = $10
            "#,
        )
        .bind(&patch.nome)
        .bind(patch.data_nascimento)
        .bind(patch.idade)
        .bind(&patch.filiacao)
        .bind(&patch.endereco_familia)
        .bind(patch.motivo_encaminhamento.is_some())
        .bind(patch.motivo_encaminhamento.clone().flatten())
        .bind(patch.historico_pessoa.is_some())
        .bind(patch.historico_pessoa.clone().flatten())
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(resultado.rows_affected())
    }

    async fn upsert_familiar(
        &mut self,
        id: AtendidoId,
        familiar: &Posicionado<Familiar>,
    ) -> Result<(), StoreError> {
        let f = &familiar.item;
        sqlx::query(
            r#"
            INSERT INTO familiares (
                usuario_id, posicao, nome, data_nascimento, parentesco,
                servico_socioassistencial, telefone, demanda_apresentada
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (usuario_id, posicao) DO UPDATE SET
                nome = EXCLUDED.nome,
                data_nascimento = EXCLUDED.data_nascimento,
                parentesco = EXCLUDED.parentesco,
                servico_socioassistencial = EXCLUDED.servico_socioassistencial,
                telefone = EXCLUDED.telefone,
                demanda_apresentada = EXCLUDED.demanda_apresentada
            "#,
        )
        .bind(id)
        .bind(familiar.posicao)
        .bind(&f.nome)
        .bind(f.data_nascimento)
        .bind(&f.parentesco)
        .bind(&f.servico_socioassistencial)
        .bind(&f.telefone)
        .bind(&f.demanda_apresentada)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn upsert_interface(
        &mut self,
        id: AtendidoId,
        interface: &Posicionado<InterfaceRedeExecutiva>,
    ) -> Result<(), StoreError> {
        let i = &interface.item;
        sqlx::query(
            r#"
            INSERT INTO interfaces_rede_executiva (
                usuario_id, posicao, acao_encaminhamento, a_quem_destina,
                orgao_servico_atendimento
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (usuario_id, posicao) DO UPDATE SET
                acao_encaminhamento = EXCLUDED.acao_encaminhamento,
                a_quem_destina = EXCLUDED.a_quem_destina,
                orgao_servico_atendimento = EXCLUDED.orgao_servico_atendimento
            "#,
        )
        .bind(id)
        .bind(interface.posicao)
        .bind(&i.acao_encaminhamento)
        .bind(&i.a_quem_destina)
        .bind(&i.orgao_servico_atendimento)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn upsert_membro_equipe(
        &mut self,
        id: AtendidoId,
        membro: &Posicionado<MembroEquipe>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO equipe_tecnica (usuario_id, posicao, nome, funcao)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (usuario_id, posicao) DO UPDATE SET
                nome = EXCLUDED.nome,
                funcao = EXCLUDED.funcao
            "#,
        )
        .bind(id)
        .bind(membro.posicao)
        .bind(&membro.item.nome)
        .bind(&membro.item.funcao)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn prune(
        &mut self,
        lista: ListaPia,
        id: AtendidoId,
        manter: i32,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "DELETE FROM {} WHERE usuario_id = $1 AND posicao > $2",
            lista.tabela()
        );
        let resultado = sqlx::query(&sql)
            .bind(id)
            .bind(manter)
            .execute(&mut *self.tx)
            .await?;
        Ok(resultado.rows_affected())
    }

    async fn upsert_propostas(
        &mut self,
        id: AtendidoId,
        propostas: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO propostas_pia (usuario_id, propostas)
            VALUES ($1, $2)
            ON CONFLICT (usuario_id) DO UPDATE SET propostas = EXCLUDED.propostas
            "#,
        )
        .bind(id)
        .bind(propostas)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn upsert_opinioes(
        &mut self,
        id: AtendidoId,
        opinioes: &Opiniao,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO opinioes (usuario_id, opiniao_usuario_pia, opiniao_familia_pia)
            VALUES ($1, $2, $3)
            ON CONFLICT (usuario_id) DO UPDATE SET
                opiniao_usuario_pia = EXCLUDED.opiniao_usuario_pia,
                opiniao_familia_pia = EXCLUDED.opiniao_familia_pia
            "#,
        )
        .bind(id)
        .bind(&opinioes.opiniao_usuario_pia)
        .bind(&opinioes.opiniao_familia_pia)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn upsert_informacoes_servico(
        &mut self,
        id: AtendidoId,
        informacoes: &InformacoesServico,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO informacoes_servico (
                usuario_id, nome_servico, endereco_servico, email_servico, telefone_servico
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (usuario_id) DO UPDATE SET
                nome_servico = EXCLUDED.nome_servico,
                endereco_servico = EXCLUDED.endereco_servico,
                email_servico = EXCLUDED.email_servico,
                telefone_servico = EXCLUDED.telefone_servico
            "#,
        )
        .bind(id)
        .bind(&informacoes.nome_servico)
        .bind(&informacoes.endereco_servico)
        .bind(&informacoes.email_servico)
        .bind(&informacoes.telefone_servico)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::NaiveDate;

    use crate::core::PiaRequest;
    use crate::workflow::PiaWorkflow;

    #[test]
    fn pool_esgotado_e_falha_de_aquisicao() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Acquire(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolClosed),
            StoreError::Acquire(_)
        ));
    }

    #[test]
    fn demais_erros_sao_do_banco() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
    }

    fn definicao(tabela: &str) -> String {
        let inicio = SCHEMA
            .find(&format!("CREATE TABLE IF NOT EXISTS {tabela} ("))
            .unwrap();
        let fim = inicio + SCHEMA[inicio..].find(");").unwrap();
        SCHEMA[inicio..fim].split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn schema_declara_alvos_de_conflito() {
        for tabela in ["familiares", "interfaces_rede_executiva", "equipe_tecnica"] {
            assert!(definicao(tabela).contains("PRIMARY KEY (usuario_id, posicao)"), "{tabela}");
        }
        for tabela in ["propostas_pia", "opinioes", "informacoes_servico"] {
            assert!(
                definicao(tabela).contains("usuario_id INTEGER PRIMARY KEY REFERENCES atendidos(id)"),
                "{tabela}"
            );
        }
    }

    // Os testes abaixo precisam de um PostgreSQL local:
    // DATABASE_URL=postgres://postgres@localhost:5432/naispd_teste cargo test -- --ignored

    async fn banco(teste: &str) -> Option<Arc<PgStore>> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("pulando {teste}: DATABASE_URL não definida");
            return None;
        };
        let store = match PgStore::connect(&url, 4, Duration::from_secs(5)).await {
            Ok(store) => store,
            Err(e) => {
                eprintln!("pulando {teste}: PostgreSQL inacessível ({e})");
                return None;
            }
        };
        store.apply_schema().await.unwrap();
        Some(Arc::new(store))
    }

    async fn novo_atendido(store: &PgStore) -> AtendidoId {
        store
            .create_atendido(&NovoAtendido {
                nome: "Carlos".into(),
                telefone: "(11) 91234-5678".into(),
                email: "carlos@exemplo.com".into(),
                data_nascimento: NaiveDate::from_ymd_opt(2010, 5, 2).unwrap(),
                rg: "1234567".into(),
                cpf: "52998224725".into(),
            })
            .await
            .unwrap()
    }

    fn plano(id: AtendidoId, familiares: &[&str]) -> PiaRequest {
        let familiares: Vec<_> = familiares
            .iter()
            .map(|nome| serde_json::json!({ "nome": nome, "parentesco": "irmã" }))
            .collect();
        serde_json::from_value(serde_json::json!({
            "id": id,
            "nome": "Carlos Silva",
            "dataNascimento": "2010-05-02",
            "filiacao": "Maria",
            "enderecoFamilia": "Rua A, 1",
            "motivoEncaminhamento": "evasão escolar",
            "familiaresData": familiares,
            "propostasPia": "acompanhamento escolar",
            "interfacesRedeExecutivaData": [
                { "acao_encaminhamento": "matrícula", "a_quem_destina": "Carlos", "orgao_servico_atendimento": "Escola" }
            ],
            "opiniaoUsuarioPia": "u",
            "opiniaoFamiliaPia": "f",
            "equipeTecnicaData": [{ "nome": "Rita", "funcao": "psicóloga" }],
            "informacoesServico": { "nome_servico": "NAISPD" }
        }))
        .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL and a local PostgreSQL"]
    async fn pg_salva_pia_completo() {
        let Some(store) = banco("pg_salva_pia_completo").await else {
            return;
        };
        let id = novo_atendido(&store).await;
        let wf = PiaWorkflow::new(store.clone(), Duration::from_secs(10));

        let salvo = wf.save(plano(id, &["Ana", "Bia"])).await.unwrap();
        assert_eq!((salvo.familiares, salvo.interfaces, salvo.equipe), (2, 1, 1));

        let registro = store.load_pia(id).await.unwrap().unwrap();
        assert_eq!(registro.atendido.nome, "Carlos Silva");
        assert_eq!(
            registro.atendido.motivo_encaminhamento.as_deref(),
            Some("evasão escolar")
        );
        let nomes: Vec<_> = registro.familiares.iter().map(|f| f.item.nome.as_str()).collect();
        assert_eq!(nomes, ["Ana", "Bia"]);
        assert_eq!(registro.propostas.as_deref(), Some("acompanhamento escolar"));
        assert_eq!(registro.opinioes.unwrap().opiniao_familia_pia, "f");
        assert_eq!(registro.equipe[0].item.nome, "Rita");
        assert_eq!(registro.informacoes_servico.unwrap().nome_servico, "NAISPD");

        let mut sem_motivo = plano(id, &["Ana", "Bia"]);
        sem_motivo.motivo_encaminhamento = None;
        wf.save(sem_motivo).await.unwrap();
        let registro = store.load_pia(id).await.unwrap().unwrap();
        assert_eq!(
            registro.atendido.motivo_encaminhamento.as_deref(),
            Some("evasão escolar")
        );
        assert_eq!(store.sessions_open(), 0);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL and a local PostgreSQL"]
    async fn pg_falha_no_meio_desfaz_tudo() {
        let Some(store) = banco("pg_falha_no_meio_desfaz_tudo").await else {
            return;
        };
        let id = novo_atendido(&store).await;
        let antes = store.load_pia(id).await.unwrap().unwrap();

        let mut sessao = store.begin().await.unwrap();
        let hoje = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let pia = plano(id, &["Ana"]).validar(hoje).unwrap();
        assert_eq!(sessao.update_atendido(id, &pia.patch).await.unwrap(), 1);
        sessao.upsert_familiar(id, &pia.familiares[0]).await.unwrap();
        sessao.upsert_propostas(id, "gravado e desfeito").await.unwrap();
        let erro = sessao.upsert_opinioes(AtendidoId::MAX, &Opiniao::default()).await;
        assert!(matches!(erro, Err(StoreError::Database(_))));
        sessao.rollback().await.unwrap();

        assert_eq!(store.load_pia(id).await.unwrap().unwrap(), antes);
        assert_eq!(store.sessions_open(), 0);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL and a local PostgreSQL"]
    async fn pg_lista_menor_poda_excedentes() {
        let Some(store) = banco("pg_lista_menor_poda_excedentes").await else {
            return;
        };
        let id = novo_atendido(&store).await;
        let wf = PiaWorkflow::new(store.clone(), Duration::from_secs(10));

        wf.save(plano(id, &["A", "B"])).await.unwrap();
        let salvo = wf.save(plano(id, &["B"])).await.unwrap();
        assert_eq!(salvo.linhas_podadas, 1);

        let registro = store.load_pia(id).await.unwrap().unwrap();
        assert_eq!(registro.familiares.len(), 1);
        assert_eq!(registro.familiares[0].posicao, 1);
        assert_eq!(registro.familiares[0].item.nome, "B");
    }
}
