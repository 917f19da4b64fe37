//! # Atendido — A Pessoa Acompanhada pelo Serviço
//!
//! O [`Atendido`] é a entidade primária do NAISPD: cada registro representa
//! uma pessoa acompanhada pelo programa socioassistencial. Todas as tabelas
//! do PIA (familiares, propostas, encaminhamentos, opiniões, equipe técnica e
//! informações do serviço) apontam para um atendido via `usuario_id`.
//!
//! ## Ciclo de Vida
//!
//! ```text
//! POST /criar ──→ NovoAtendido ──→ INSERT atendidos (id gerado)
//!                                        │
//! POST /salvar_pia ──→ AtendidoPatch ──→ UPDATE atendidos (nunca INSERT)
//! ```
//!
//! Nenhum fluxo remove atendidos.
//!
//! ## Idade
//!
//! A idade nunca é confiada ao cliente: é sempre derivada da data de
//! nascimento via [`idade_em`].

use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;

/// Identificador de um atendido (`atendidos.id`, `SERIAL`).
pub type AtendidoId = i32;

/// Registro completo de um atendido, como armazenado em `atendidos`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Atendido {
    pub id: AtendidoId,
    pub nome: String,
    pub telefone: Option<String>,
    pub email: Option<String>,
    pub data_nascimento: Option<NaiveDate>,
    pub rg: Option<String>,
    pub cpf: Option<String>,
    /// Idade gravada no último salvamento do PIA.
    pub idade: Option<i32>,
    pub filiacao: Option<String>,
    pub endereco_familia: Option<String>,
    pub motivo_encaminhamento: Option<String>,
    pub historico_pessoa: Option<String>,
    pub responsavel: Option<String>,
    pub raca: Option<String>,
    pub deficiencia: Option<String>,
    pub genero: Option<String>,
}

impl Atendido {
    /// Cria o registro recém-inserido a partir dos dados de cadastro.
    pub fn from_novo(id: AtendidoId, novo: &NovoAtendido) -> Self {
        Self {
            id,
            nome: novo.nome.clone(),
            telefone: Some(novo.telefone.clone()),
            email: Some(novo.email.clone()),
            data_nascimento: Some(novo.data_nascimento),
            rg: Some(novo.rg.clone()),
            cpf: Some(novo.cpf.clone()),
            idade: Some(idade_hoje(novo.data_nascimento)),
            filiacao: None,
            endereco_familia: None,
            motivo_encaminhamento: None,
            historico_pessoa: None,
            responsavel: None,
            raca: None,
            deficiencia: None,
            genero: None,
        }
    }

    /// Projeção usada nas listagens, com a idade calculada para `hoje`.
    pub fn resumo(&self, hoje: NaiveDate) -> AtendidoResumo {
        AtendidoResumo {
            id: self.id,
            nome: self.nome.clone(),
            telefone: self.telefone.clone(),
            email: self.email.clone(),
            data_nascimento: self.data_nascimento,
            rg: self.rg.clone(),
            cpf: self.cpf.clone(),
            idade: self.data_nascimento.map(|d| idade_em(d, hoje)),
        }
    }
}

/// Dados do formulário de cadastro já validados.
#[derive(Debug, Clone, PartialEq)]
pub struct NovoAtendido {
    pub nome: String,
    pub telefone: String,
    pub email: String,
    pub data_nascimento: NaiveDate,
    pub rg: String,
    pub cpf: String,
}

/// Linha das tabelas de listagem (`/`, `/inserir`, `/buscar`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtendidoResumo {
    pub id: AtendidoId,
    pub nome: String,
    pub telefone: Option<String>,
    pub email: Option<String>,
    pub data_nascimento: Option<NaiveDate>,
    pub rg: Option<String>,
    pub cpf: Option<String>,
    pub idade: Option<i32>,
}

/// Idade em anos completos na data `hoje`.
///
/// O aniversário só conta quando (mês, dia) de `hoje` alcança o de
/// `nascimento`; datas futuras resultam em idade negativa.
pub fn idade_em(nascimento: NaiveDate, hoje: NaiveDate) -> i32 {
    let mut anos = hoje.year() - nascimento.year();
    if (hoje.month(), hoje.day()) < (nascimento.month(), nascimento.day()) {
        anos -= 1;
    }
    anos
}

/// Idade em anos completos na data local corrente.
pub fn idade_hoje(nascimento: NaiveDate) -> i32 {
    idade_em(nascimento, hoje())
}

/// Data local corrente.
pub fn hoje() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn idade_antes_do_aniversario() {
        assert_eq!(idade_em(data(2000, 6, 15), data(2024, 6, 14)), 23);
    }

    #[test]
    fn idade_no_dia_do_aniversario() {
        assert_eq!(idade_em(data(2000, 6, 15), data(2024, 6, 15)), 24);
    }

    #[test]
    fn idade_nascido_em_29_de_fevereiro() {
        assert_eq!(idade_em(data(2004, 2, 29), data(2023, 2, 28)), 18);
        assert_eq!(idade_em(data(2004, 2, 29), data(2023, 3, 1)), 19);
    }

    #[test]
    fn resumo_calcula_idade_pela_data_informada() {
        let novo = NovoAtendido {
            nome: "Maria".into(),
            telefone: "(11) 91234-5678".into(),
            email: "maria@exemplo.com".into(),
            data_nascimento: data(1990, 1, 10),
            rg: "1234567".into(),
            cpf: "52998224725".into(),
        };
        let atendido = Atendido::from_novo(7, &novo);
        let resumo = atendido.resumo(data(2020, 1, 9));
        assert_eq!(resumo.id, 7);
        assert_eq!(resumo.idade, Some(29));
        assert_eq!(resumo.telefone.as_deref(), Some("(11) 91234-5678"));
    }
}
