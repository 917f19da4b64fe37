//! # Filtros de Busca de Atendidos
//!
//! Converte os campos do formulário de `POST /buscar` em um [`FiltroBusca`]
//! tipado. Campos fora da lista conhecida são rejeitados, e os textos
//! opcionais vazios significam "sem filtro".
//!
//! ## Faixas Etárias
//!
//! | Valor | Idade mínima | Idade máxima |
//! |-------|--------------|--------------|
//! | `all` | — | — |
//! | `10-18` | 10 | 18 |
//! | `18-30` | 18 | 30 |
//! | `18-60` | 18 | 60 |
//! | `60+` | 60 | — |

use std::collections::HashMap;
use std::str::FromStr;

use super::validacao::ValidationError;

/// Campos aceitos pelo formulário de busca.
pub const CAMPOS_BUSCA: [&str; 6] = [
    "nome_buscar",
    "idade",
    "responsavel_buscar",
    "raca_buscar",
    "deficiencia_buscar",
    "sexo_buscar",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaixaEtaria {
    Todas,
    DezADezoito,
    DezoitoATrinta,
    DezoitoASessenta,
    SessentaMais,
}

impl FaixaEtaria {
    /// Limites inclusivos `(mínimo, máximo)`; `None` não restringe.
    pub fn limites(self) -> (Option<i32>, Option<i32>) {
        match self {
            FaixaEtaria::Todas => (None, None),
            FaixaEtaria::DezADezoito => (Some(10), Some(18)),
            FaixaEtaria::DezoitoATrinta => (Some(18), Some(30)),
            FaixaEtaria::DezoitoASessenta => (Some(18), Some(60)),
            FaixaEtaria::SessentaMais => (Some(60), None),
        }
    }

    /// `Todas` aceita também quem não tem data de nascimento cadastrada.
    pub fn contem(self, idade: Option<i32>) -> bool {
        let (min, max) = self.limites();
        match idade {
            Some(idade) => {
                min.is_none_or(|m| idade >= m) && max.is_none_or(|m| idade <= m)
            }
            None => self == FaixaEtaria::Todas,
        }
    }
}

impl FromStr for FaixaEtaria {
    type Err = ValidationError;

    fn from_str(valor: &str) -> Result<Self, Self::Err> {
        match valor {
            "all" => Ok(FaixaEtaria::Todas),
            "10-18" => Ok(FaixaEtaria::DezADezoito),
            "18-30" => Ok(FaixaEtaria::DezoitoATrinta),
            "18-60" => Ok(FaixaEtaria::DezoitoASessenta),
            "60+" => Ok(FaixaEtaria::SessentaMais),
            _ => Err(ValidationError::FaixaEtaria),
        }
    }
}

/// Critérios de busca validados.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiltroBusca {
    pub nome: String,
    pub faixa: FaixaEtaria,
    pub responsavel: Option<String>,
    pub raca: Option<String>,
    pub deficiencia: Option<String>,
    pub genero: Option<String>,
}

impl FiltroBusca {
    /// Valida os campos crus do formulário.
    ///
    /// `nome_buscar` e `idade` são obrigatórios; qualquer chave fora de
    /// [`CAMPOS_BUSCA`] é listada no erro.
    pub fn from_campos(campos: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let mut invalidos: Vec<String> = campos
            .keys()
            .filter(|k| !CAMPOS_BUSCA.contains(&k.as_str()))
            .cloned()
            .collect();
        if !invalidos.is_empty() {
            invalidos.sort();
            return Err(ValidationError::CamposBusca(invalidos));
        }

        let nome = campos.get("nome_buscar").map(|s| s.trim()).unwrap_or_default();
        let idade = campos.get("idade").map(|s| s.trim()).unwrap_or_default();
        if nome.is_empty() || idade.is_empty() {
            return Err(ValidationError::CamposBuscaObrigatorios);
        }

        let opcional = |chave: &str| {
            campos
                .get(chave)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            nome: nome.to_string(),
            faixa: idade.parse()?,
            responsavel: opcional("responsavel_buscar"),
            raca: opcional("raca_buscar"),
            deficiencia: opcional("deficiencia_buscar"),
            genero: opcional("sexo_buscar"),
        })
    }
}

/// Padrão `ILIKE` de substring, com `%`, `_` e `\` do usuário escapados.
pub fn padrao_like(termo: &str) -> String {
    let mut padrao = String::with_capacity(termo.len() + 2);
    padrao.push('%');
    for c in termo.chars() {
        if matches!(c, '%' | '_' | '\\') {
            padrao.push('\\');
        }
        padrao.push(c);
    }
    padrao.push('%');
    padrao
}

/// Equivalente em memória de `texto ILIKE padrao_like(termo)`.
pub fn contem_sem_caixa(texto: &str, termo: &str) -> bool {
    texto.to_lowercase().contains(&termo.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campos(pares: &[(&str, &str)]) -> HashMap<String, String> {
        pares
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn faixa_sessenta_mais_sem_teto() {
        assert!(FaixaEtaria::SessentaMais.contem(Some(95)));
        assert!(!FaixaEtaria::SessentaMais.contem(Some(59)));
        assert!(!FaixaEtaria::SessentaMais.contem(None));
    }

    #[test]
    fn faixa_todas_aceita_sem_data() {
        assert!(FaixaEtaria::Todas.contem(None));
        assert!(FaixaEtaria::Todas.contem(Some(3)));
    }

    #[test]
    fn faixa_desconhecida() {
        assert_eq!("30-40".parse::<FaixaEtaria>(), Err(ValidationError::FaixaEtaria));
    }

    #[test]
    fn filtro_completo() {
        let filtro = FiltroBusca::from_campos(&campos(&[
            ("nome_buscar", " ana "),
            ("idade", "18-30"),
            ("raca_buscar", "parda"),
            ("sexo_buscar", ""),
        ]))
        .unwrap();
        assert_eq!(filtro.nome, "ana");
        assert_eq!(filtro.faixa, FaixaEtaria::DezoitoATrinta);
        assert_eq!(filtro.raca.as_deref(), Some("parda"));
        assert_eq!(filtro.genero, None);
        assert_eq!(filtro.responsavel, None);
    }

    #[test]
    fn filtro_exige_nome_e_idade() {
        let erro = FiltroBusca::from_campos(&campos(&[("nome_buscar", "ana")])).unwrap_err();
        assert_eq!(erro, ValidationError::CamposBuscaObrigatorios);
    }

    #[test]
    fn filtro_rejeita_campos_extras() {
        let erro = FiltroBusca::from_campos(&campos(&[
            ("nome_buscar", "ana"),
            ("idade", "all"),
            ("zzz", "1"),
            ("cpf", "1"),
        ]))
        .unwrap_err();
        assert_eq!(
            erro,
            ValidationError::CamposBusca(vec!["cpf".into(), "zzz".into()])
        );
    }

    #[test]
    fn like_escapa_curingas() {
        assert_eq!(padrao_like("ana"), "%ana%");
        assert_eq!(padrao_like("50%_a\\b"), "%50\\%\\_a\\\\b%");
    }

    #[test]
    fn busca_em_memoria_ignora_caixa() {
        assert!(contem_sem_caixa("Ana Souza", "SOUZA"));
        assert!(!contem_sem_caixa("Ana Souza", "silva"));
    }
}
