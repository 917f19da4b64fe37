//! # Configuração
//!
//! Lida em duas camadas, a última vencendo:
//!
//! 1. arquivo TOML opcional (`naispd.toml` no diretório corrente, ou o
//!    caminho passado em `--config`);
//! 2. variáveis de ambiente.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3000"
//! assets_dir = "assets"
//!
//! [database]
//! url = "postgres://postgres@localhost:5432/NAISPD"   # ou "memory:"
//! max_connections = 10
//! acquire_timeout_secs = 5
//! apply_schema = true
//!
//! [pia]
//! transaction_timeout_secs = 30
//!
//! [listagem]
//! por_pagina = 20
//! ```
//!
//! | Variável | Campo |
//! |----------|-------|
//! | `DATABASE_URL` | `database.url` |
//! | `NAISPD_BIND` | `server.bind` |
//! | `PORT` | porta de `server.bind` (host `0.0.0.0`) |
//! | `NAISPD_MAX_CONNECTIONS` | `database.max_connections` |
//! | `NAISPD_PIA_TIMEOUT_SECS` | `pia.transaction_timeout_secs` |

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("falha ao ler {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("configuração inválida em {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("valor inválido para {var}: {value:?}")]
    Env { var: &'static str, value: String },
    #[error("{campo} = {valor} fora do intervalo {min}..={max}")]
    ForaDoIntervalo {
        campo: &'static str,
        valor: i128,
        min: i128,
        max: i128,
    },
}

/// Limites aceitos para os campos numéricos.
const LIMITES: [(&str, i128, i128); 4] = [
    ("database.max_connections", 1, 1_000),
    ("database.acquire_timeout_secs", 1, 3_600),
    ("pia.transaction_timeout_secs", 1, 3_600),
    ("listagem.por_pagina", 1, 1_000),
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub assets_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".into(),
            assets_dir: PathBuf::from("assets"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// URL PostgreSQL, ou `memory:` para o armazenamento em memória.
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Aplica `schema.sql` na inicialização.
    pub apply_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://postgres@localhost:5432/NAISPD".into(),
            max_connections: 10,
            acquire_timeout_secs: 5,
            apply_schema: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PiaConfig {
    /// Tempo máximo da transação de salvamento do PIA.
    pub transaction_timeout_secs: u64,
}

impl Default for PiaConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ListagemConfig {
    pub por_pagina: i64,
}

impl Default for ListagemConfig {
    fn default() -> Self {
        Self { por_pagina: 20 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pia: PiaConfig,
    pub listagem: ListagemConfig,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("naispd.toml")
}

/// Lê o arquivo de configuração.
///
/// Sem `path`, um `naispd.toml` ausente resulta nos valores padrão; um
/// caminho explícito precisa existir.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let explicito = path.is_some();
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !explicito && !path.exists() {
        return Ok(AppConfig::default());
    }

    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config: AppConfig =
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?;
    config.validate()?;
    Ok(config)
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

impl AppConfig {
    /// Sobrepõe os campos com as variáveis de ambiente presentes em `lookup`.
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(port) = lookup("PORT") {
            let port: u16 = parse_env("PORT", port)?;
            self.server.bind = format!("0.0.0.0:{port}");
        }
        if let Some(bind) = lookup("NAISPD_BIND") {
            self.server.bind = bind;
        }
        if let Some(max) = lookup("NAISPD_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("NAISPD_MAX_CONNECTIONS", max)?;
        }
        if let Some(secs) = lookup("NAISPD_PIA_TIMEOUT_SECS") {
            self.pia.transaction_timeout_secs = parse_env("NAISPD_PIA_TIMEOUT_SECS", secs)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Rejeita zeros e valores grandes demais para pool, timeouts e paginação.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valores = [
            i128::from(self.database.max_connections),
            i128::from(self.database.acquire_timeout_secs),
            i128::from(self.pia.transaction_timeout_secs),
            i128::from(self.listagem.por_pagina),
        ];
        for ((campo, min, max), valor) in LIMITES.into_iter().zip(valores) {
            if !(min..=max).contains(&valor) {
                return Err(ConfigError::ForaDoIntervalo {
                    campo,
                    valor,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }
}
