//! Paginação da listagem principal (`GET /?page=N`).

/// Página corrente de uma listagem com `total` registros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginacao {
    /// Página 1-indexada.
    pub pagina: i64,
    pub por_pagina: i64,
    pub total: i64,
}

impl Paginacao {
    /// Interpreta o parâmetro `page`; ausente, inválido ou < 1 vira página 1.
    pub fn from_query(page: Option<&str>, por_pagina: i64, total: i64) -> Self {
        let pagina = page
            .and_then(|p| p.trim().parse::<i64>().ok())
            .filter(|&p| p >= 1)
            .unwrap_or(1);
        Self {
            pagina,
            por_pagina: por_pagina.max(1),
            total: total.max(0),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.pagina - 1).saturating_mul(self.por_pagina)
    }

    /// Número de páginas; uma listagem vazia ainda tem uma página.
    pub fn total_paginas(&self) -> i64 {
        let resto = i64::from(self.total % self.por_pagina != 0);
        (self.total / self.por_pagina + resto).max(1)
    }

    pub fn anterior(&self) -> Option<i64> {
        (self.pagina > 1).then(|| self.pagina - 1)
    }

    pub fn proxima(&self) -> Option<i64> {
        (self.pagina < self.total_paginas()).then(|| self.pagina + 1)
    }
}
