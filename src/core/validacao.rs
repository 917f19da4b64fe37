//! # Validação de Entrada
//!
//! Regras aplicadas **antes** de qualquer acesso ao banco. Uma falha aqui
//! vira `400 Bad Request` com a mensagem em português exibida ao usuário.
//!
//! | Campo | Regra |
//! |-------|-------|
//! | telefone | `(DD) DDDDD-DDDD` |
//! | email | `algo@dominio.tld`, sem espaços |
//! | data de nascimento | `AAAA-MM-DD` e data de calendário real |
//! | RG | 7 ou mais dígitos |
//! | CPF | 11 dígitos com dígitos verificadores válidos (pontuação aceita) |

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;

use super::atendido::NovoAtendido;

static TELEFONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\d{2}\) \d{5}-\d{4}$").expect("regex de telefone"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("regex de email"));
static DATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("regex de data"));
static RG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{7,}$").expect("regex de RG"));

/// Falha de validação — sempre detectada antes de abrir transação.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Todos os campos são obrigatórios.")]
    CamposObrigatorios,
    #[error("O campo {0} é obrigatório.")]
    CampoObrigatorio(&'static str),
    #[error("Número de telefone inválido.")]
    Telefone,
    #[error("Endereço de e-mail inválido.")]
    Email,
    #[error("Data de nascimento inválida. Use o formato AAAA-MM-DD.")]
    DataNascimento,
    #[error("RG inválido.")]
    Rg,
    #[error("CPF inválido.")]
    Cpf,
    #[error("ID inválido.")]
    Id,
    #[error("Os campos idade e nome para busca são obrigatórios.")]
    CamposBuscaObrigatorios,
    #[error("Valor inválido para idade.")]
    FaixaEtaria,
    #[error("Campos de busca inválidos: {}.", .0.join(", "))]
    CamposBusca(Vec<String>),
    #[error("{lista}[{posicao}]: {motivo}")]
    Item {
        lista: &'static str,
        posicao: i32,
        motivo: &'static str,
    },
    #[error("Requisição malformada: {0}")]
    Corpo(String),
}

pub fn telefone_valido(telefone: &str) -> bool {
    TELEFONE.is_match(telefone)
}

pub fn email_valido(email: &str) -> bool {
    EMAIL.is_match(email)
}

pub fn rg_valido(rg: &str) -> bool {
    RG.is_match(rg)
}

/// Interpreta `AAAA-MM-DD`, rejeitando datas inexistentes (ex: 2023-02-30).
pub fn parse_data(valor: &str) -> Option<NaiveDate> {
    if !DATA.is_match(valor) {
        return None;
    }
    NaiveDate::parse_from_str(valor, "%Y-%m-%d").ok()
}

/// Verifica os dois dígitos verificadores do CPF (módulo 11).
///
/// Pontuação é ignorada; sequências de um só dígito (ex: `111.111.111-11`)
/// passam no cálculo mas são inválidas por regra da Receita.
pub fn cpf_valido(cpf: &str) -> bool {
    let digitos: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();
    if digitos.len() != 11 || cpf.chars().any(|c| !(c.is_ascii_digit() || c == '.' || c == '-')) {
        return false;
    }
    if digitos.iter().all(|&d| d == digitos[0]) {
        return false;
    }

    let verificador = |tamanho: usize| -> u32 {
        let soma: u32 = digitos[..tamanho]
            .iter()
            .enumerate()
            .map(|(i, d)| d * (tamanho as u32 + 1 - i as u32))
            .sum();
        match (soma * 10) % 11 {
            10 => 0,
            resto => resto,
        }
    };

    verificador(9) == digitos[9] && verificador(10) == digitos[10]
}

/// Campos do formulário de cadastro (`POST /criar`).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NovoAtendidoForm {
    pub nome: String,
    pub telefone: String,
    pub email: String,
    pub data_nascimento: String,
    pub rg: String,
    pub cpf: String,
}

impl NovoAtendidoForm {
    /// Valida na mesma ordem em que os erros são exibidos no formulário.
    pub fn validar(self) -> Result<NovoAtendido, ValidationError> {
        let campos = [
            &self.nome,
            &self.telefone,
            &self.email,
            &self.data_nascimento,
            &self.rg,
            &self.cpf,
        ];
        if campos.iter().any(|c| c.trim().is_empty()) {
            return Err(ValidationError::CamposObrigatorios);
        }
        if !telefone_valido(&self.telefone) {
            return Err(ValidationError::Telefone);
        }
        if !email_valido(&self.email) {
            return Err(ValidationError::Email);
        }
        let data_nascimento =
            parse_data(&self.data_nascimento).ok_or(ValidationError::DataNascimento)?;
        if !rg_valido(&self.rg) {
            return Err(ValidationError::Rg);
        }
        if !cpf_valido(&self.cpf) {
            return Err(ValidationError::Cpf);
        }

        Ok(NovoAtendido {
            nome: self.nome.trim().to_string(),
            telefone: self.telefone,
            email: self.email,
            data_nascimento,
            rg: self.rg,
            cpf: self.cpf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_valido() -> NovoAtendidoForm {
        NovoAtendidoForm {
            nome: "  João da Silva ".into(),
            telefone: "(21) 98765-4321".into(),
            email: "joao@exemplo.com.br".into(),
            data_nascimento: "1985-03-20".into(),
            rg: "12345678".into(),
            cpf: "529.982.247-25".into(),
        }
    }

    // ─── cpf_valido ────────────────────────────────────────────

    #[test]
    fn cpf_com_e_sem_pontuacao() {
        assert!(cpf_valido("52998224725"));
        assert!(cpf_valido("529.982.247-25"));
    }

    #[test]
    fn cpf_com_digito_errado() {
        assert!(!cpf_valido("52998224726"));
        assert!(!cpf_valido("52998224715"));
    }

    #[test]
    fn cpf_repetido_ou_curto() {
        assert!(!cpf_valido("11111111111"));
        assert!(!cpf_valido("5299822472"));
        assert!(!cpf_valido("5299822472a5"));
    }

    // ─── regras de formato ─────────────────────────────────────

    #[test]
    fn telefone_exige_mascara() {
        assert!(telefone_valido("(11) 91234-5678"));
        assert!(!telefone_valido("11912345678"));
        assert!(!telefone_valido("(11) 1234-5678"));
    }

    #[test]
    fn email_basico() {
        assert!(email_valido("a@b.co"));
        assert!(!email_valido("a@b"));
        assert!(!email_valido("a b@c.com"));
    }

    #[test]
    fn data_inexistente_rejeitada() {
        assert!(parse_data("2023-02-28").is_some());
        assert!(parse_data("2023-02-30").is_none());
        assert!(parse_data("28/02/2023").is_none());
    }

    // ─── NovoAtendidoForm ──────────────────────────────────────

    #[test]
    fn formulario_valido_normaliza_nome() {
        let novo = form_valido().validar().unwrap();
        assert_eq!(novo.nome, "João da Silva");
        assert_eq!(novo.data_nascimento, NaiveDate::from_ymd_opt(1985, 3, 20).unwrap());
    }

    #[test]
    fn formulario_com_campo_vazio() {
        let form = NovoAtendidoForm {
            rg: " ".into(),
            ..form_valido()
        };
        assert_eq!(form.validar(), Err(ValidationError::CamposObrigatorios));
    }

    #[test]
    fn formulario_reporta_primeiro_erro() {
        let form = NovoAtendidoForm {
            email: "invalido".into(),
            cpf: "000".into(),
            ..form_valido()
        };
        assert_eq!(form.validar(), Err(ValidationError::Email));
    }

    #[test]
    fn mensagem_de_campos_de_busca() {
        let erro = ValidationError::CamposBusca(vec!["x".into(), "y".into()]);
        assert_eq!(erro.to_string(), "Campos de busca inválidos: x, y.");
    }
}
