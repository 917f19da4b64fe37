//! # PIA — Plano Individual de Atendimento
//!
//! Tipos do registro composto que o fluxo de salvamento
//! ([`crate::workflow::PiaWorkflow`]) grava de forma atômica.
//!
//! ## Do Payload ao Registro Validado
//!
//! ```text
//! JSON (POST /salvar_pia)
//!   │  serde (campos do formulário original: familiaresData, propostasPia, ...)
//!   ▼
//! PiaRequest ──validar()──→ PiaValidado
//!                             ├── AtendidoPatch           → UPDATE atendidos
//!                             ├── Vec<Posicionado<Familiar>>              ┐
//!                             ├── Vec<Posicionado<InterfaceRedeExecutiva>> ├ upsert (usuario_id, posicao)
//!                             ├── Vec<Posicionado<MembroEquipe>>          ┘
//!                             ├── propostas: String       ┐
//!                             ├── Opiniao                  ├ upsert (usuario_id)
//!                             └── InformacoesServico       ┘
//! ```
//!
//! ## Posição
//!
//! As três listas recebem a posição **explícita** no momento da validação,
//! 1-indexada pela ordem em que chegaram. A camada de armazenamento nunca
//! infere posição a partir do índice de um array.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::atendido::{idade_em, Atendido, AtendidoId};
use super::validacao::ValidationError;

/// Membro da família do atendido (`familiares`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Familiar {
    pub nome: String,
    pub data_nascimento: Option<NaiveDate>,
    pub parentesco: String,
    #[serde(alias = "servico")]
    pub servico_socioassistencial: String,
    pub telefone: String,
    #[serde(alias = "demanda")]
    pub demanda_apresentada: String,
}

/// Encaminhamento para a rede executiva (`interfaces_rede_executiva`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceRedeExecutiva {
    pub acao_encaminhamento: String,
    pub a_quem_destina: String,
    pub orgao_servico_atendimento: String,
}

/// Profissional da equipe técnica (`equipe_tecnica`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembroEquipe {
    pub nome: String,
    pub funcao: String,
}

/// Opiniões do atendido e da família sobre o plano (`opinioes`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Opiniao {
    pub opiniao_usuario_pia: String,
    pub opiniao_familia_pia: String,
}

/// Dados da unidade que presta o atendimento (`informacoes_servico`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InformacoesServico {
    pub nome_servico: String,
    pub endereco_servico: String,
    pub email_servico: String,
    pub telefone_servico: String,
}

/// Item de uma lista dependente com sua posição (1-indexada) sob o atendido.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Posicionado<T> {
    pub posicao: i32,
    pub item: T,
}

/// Atribui posições 1, 2, 3… na ordem recebida.
pub fn posicionar<T>(itens: Vec<T>) -> Vec<Posicionado<T>> {
    itens
        .into_iter()
        .zip(1..)
        .map(|(item, posicao)| Posicionado { posicao, item })
        .collect()
}

/// Subconjunto de colunas de `atendidos` que o PIA sobrescreve.
#[derive(Debug, Clone, PartialEq)]
pub struct AtendidoPatch {
    pub nome: String,
    pub data_nascimento: Option<NaiveDate>,
    /// Sempre derivada de `data_nascimento`.
    pub idade: Option<i32>,
    pub filiacao: Option<String>,
    pub endereco_familia: Option<String>,
    /// `None` mantém o valor gravado; `Some(None)` apaga.
    pub motivo_encaminhamento: Option<Option<String>>,
    /// `None` mantém o valor gravado; `Some(None)` apaga.
    pub historico_pessoa: Option<Option<String>>,
}

impl AtendidoPatch {
    pub fn aplicar(&self, atendido: &mut Atendido) {
        atendido.nome = self.nome.clone();
        atendido.data_nascimento = self.data_nascimento;
        atendido.idade = self.idade;
        atendido.filiacao = self.filiacao.clone();
        atendido.endereco_familia = self.endereco_familia.clone();
        if let Some(motivo) = &self.motivo_encaminhamento {
            atendido.motivo_encaminhamento = motivo.clone();
        }
        if let Some(historico) = &self.historico_pessoa {
            atendido.historico_pessoa = historico.clone();
        }
    }
}

/// Payload de `POST /salvar_pia`, com os nomes de campo do formulário.
///
/// As seis coleções são obrigatórias (podem vir vazias); a ausência de
/// qualquer uma delas falha na desserialização. `motivoEncaminhamento` e
/// `historicoPessoa` ausentes (ou `null`) não alteram o que está gravado.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiaRequest {
    pub id: AtendidoId,
    pub nome: String,
    pub data_nascimento: Option<NaiveDate>,
    pub filiacao: Option<String>,
    pub endereco_familia: Option<String>,
    pub motivo_encaminhamento: Option<String>,
    pub historico_pessoa: Option<String>,
    pub familiares_data: Vec<Familiar>,
    pub propostas_pia: String,
    pub interfaces_rede_executiva_data: Vec<InterfaceRedeExecutiva>,
    pub opiniao_usuario_pia: String,
    pub opiniao_familia_pia: String,
    pub equipe_tecnica_data: Vec<MembroEquipe>,
    pub informacoes_servico: InformacoesServico,
}

/// PIA pronto para gravação: id positivo, posições atribuídas, idade derivada.
#[derive(Debug, Clone, PartialEq)]
pub struct PiaValidado {
    pub id: AtendidoId,
    pub patch: AtendidoPatch,
    pub familiares: Vec<Posicionado<Familiar>>,
    pub propostas: String,
    pub interfaces: Vec<Posicionado<InterfaceRedeExecutiva>>,
    pub opinioes: Opiniao,
    pub equipe: Vec<Posicionado<MembroEquipe>>,
    pub informacoes_servico: InformacoesServico,
}

fn vazio_como_none(valor: Option<String>) -> Option<String> {
    valor.filter(|v| !v.trim().is_empty())
}

fn exigir_nomes<T>(
    lista: &'static str,
    itens: &[Posicionado<T>],
    campo: impl Fn(&T) -> &str,
    motivo: &'static str,
) -> Result<(), ValidationError> {
    match itens.iter().find(|p| campo(&p.item).trim().is_empty()) {
        Some(p) => Err(ValidationError::Item {
            lista,
            posicao: p.posicao,
            motivo,
        }),
        None => Ok(()),
    }
}

impl PiaRequest {
    /// Valida o payload tendo `hoje` como referência para a idade.
    pub fn validar(self, hoje: NaiveDate) -> Result<PiaValidado, ValidationError> {
        if self.id <= 0 {
            return Err(ValidationError::Id);
        }
        let nome = self.nome.trim().to_string();
        if nome.is_empty() {
            return Err(ValidationError::CampoObrigatorio("nome"));
        }
        if self.data_nascimento.is_some_and(|d| d > hoje) {
            return Err(ValidationError::DataNascimento);
        }

        let familiares = posicionar(self.familiares_data);
        exigir_nomes("familiaresData", &familiares, |f| &f.nome, "nome obrigatório")?;
        let interfaces = posicionar(self.interfaces_rede_executiva_data);
        exigir_nomes(
            "interfacesRedeExecutivaData",
            &interfaces,
            |i| &i.acao_encaminhamento,
            "ação de encaminhamento obrigatória",
        )?;
        let equipe = posicionar(self.equipe_tecnica_data);
        exigir_nomes("equipeTecnicaData", &equipe, |m| &m.nome, "nome obrigatório")?;

        Ok(PiaValidado {
            id: self.id,
            patch: AtendidoPatch {
                nome,
                data_nascimento: self.data_nascimento,
                idade: self.data_nascimento.map(|d| idade_em(d, hoje)),
                filiacao: vazio_como_none(self.filiacao),
                endereco_familia: vazio_como_none(self.endereco_familia),
                motivo_encaminhamento: self.motivo_encaminhamento.map(|v| vazio_como_none(Some(v))),
                historico_pessoa: self.historico_pessoa.map(|v| vazio_como_none(Some(v))),
            },
            familiares,
            propostas: self.propostas_pia,
            interfaces,
            opinioes: Opiniao {
                opiniao_usuario_pia: self.opiniao_usuario_pia,
                opiniao_familia_pia: self.opiniao_familia_pia,
            },
            equipe,
            informacoes_servico: self.informacoes_servico,
        })
    }
}

/// PIA gravado, carregado para pré-preencher o formulário de `/alterar`.
#[derive(Debug, Clone, PartialEq)]
pub struct PiaRegistro {
    pub atendido: Atendido,
    pub familiares: Vec<Posicionado<Familiar>>,
    pub propostas: Option<String>,
    pub interfaces: Vec<Posicionado<InterfaceRedeExecutiva>>,
    pub opinioes: Option<Opiniao>,
    pub equipe: Vec<Posicionado<MembroEquipe>>,
    pub informacoes_servico: Option<InformacoesServico>,
}
