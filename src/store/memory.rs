//! # Armazenamento em Memória
//!
//! Implementação de [`RecordStore`] que mantém as sete tabelas em
//! `BTreeMap`s dentro do processo, com o mesmo contrato transacional do
//! PostgreSQL:
//!
//! - **Pool limitado**: cada sessão segura uma permissão de um
//!   [`Semaphore`]; com o pool esgotado, `begin()` espera até
//!   `acquire_timeout` e então falha com [`StoreError::Acquire`].
//! - **Isolamento**: as escritas de uma sessão ficam num log de operações e
//!   só tocam as tabelas no `commit()`, de uma vez, sob o lock.
//! - **Rollback**: `rollback()` ou o simples drop da sessão descartam o log.
//! - **Chave estrangeira**: toda escrita dependente exige que o atendido
//!   exista, como o `REFERENCES atendidos(id)` do schema.
//!
//! ## Contabilidade de Sessões
//!
//! ```text
//! begin() → adquiridas += 1      Drop(MemorySession) → liberadas += 1
//! sessions_open() = adquiridas − liberadas
//! ```
//!
//! Nos testes, falhas podem ser injetadas em qualquer [`Etapa`] e cada
//! etapa pode ser atrasada para simular I/O lento.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{ListaPia, PiaSession, RecordStore, StoreError};
use crate::core::atendido::hoje;
use crate::core::busca::contem_sem_caixa;
use crate::core::{
    Atendido, AtendidoId, AtendidoPatch, AtendidoResumo, Familiar, FiltroBusca,
    InformacoesServico, InterfaceRedeExecutiva, MembroEquipe, NovoAtendido, Opiniao, PiaRegistro,
    Posicionado,
};

/// Etapas de uma sessão em que uma falha pode ser injetada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Etapa {
    AtualizarAtendido,
    Familiar,
    Interface,
    MembroEquipe,
    Poda,
    Propostas,
    Opinioes,
    InformacoesServico,
    Commit,
}

type Chave = (AtendidoId, i32);

/// Conteúdo confirmado das sete tabelas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tabelas {
    pub atendidos: BTreeMap<AtendidoId, Atendido>,
    pub familiares: BTreeMap<Chave, Familiar>,
    pub propostas_pia: BTreeMap<AtendidoId, String>,
    pub interfaces_rede_executiva: BTreeMap<Chave, InterfaceRedeExecutiva>,
    pub opinioes: BTreeMap<AtendidoId, Opiniao>,
    pub equipe_tecnica: BTreeMap<Chave, MembroEquipe>,
    pub informacoes_servico: BTreeMap<AtendidoId, InformacoesServico>,
    proximo_id: AtendidoId,
}

/// Escrita pendente de uma sessão.
#[derive(Debug)]
enum Operacao {
    Patch(AtendidoId, AtendidoPatch),
    Familiar(AtendidoId, Posicionado<Familiar>),
    Interface(AtendidoId, Posicionado<InterfaceRedeExecutiva>),
    Membro(AtendidoId, Posicionado<MembroEquipe>),
    Poda(ListaPia, AtendidoId, i32),
    Propostas(AtendidoId, String),
    Opinioes(AtendidoId, Opiniao),
    Servico(AtendidoId, InformacoesServico),
}

fn lista_de<T: Clone>(mapa: &BTreeMap<Chave, T>, id: AtendidoId) -> Vec<Posicionado<T>> {
    mapa.range((id, i32::MIN)..=(id, i32::MAX))
        .map(|(&(_, posicao), item)| Posicionado {
            posicao,
            item: item.clone(),
        })
        .collect()
}

fn acima_de<T>(mapa: &BTreeMap<Chave, T>, id: AtendidoId, manter: i32) -> u64 {
    mapa.range((id, manter.saturating_add(1))..=(id, i32::MAX)).count() as u64
}

fn podar<T>(mapa: &mut BTreeMap<Chave, T>, id: AtendidoId, manter: i32) {
    mapa.retain(|&(usuario, posicao), _| usuario != id || posicao <= manter);
}

impl Tabelas {
    fn aplicar(&mut self, operacao: Operacao) {
        match operacao {
            Operacao::Patch(id, patch) => {
                if let Some(atendido) = self.atendidos.get_mut(&id) {
                    patch.aplicar(atendido);
                }
            }
            Operacao::Familiar(id, f) => {
                self.familiares.insert((id, f.posicao), f.item);
            }
            Operacao::Interface(id, i) => {
                self.interfaces_rede_executiva.insert((id, i.posicao), i.item);
            }
            Operacao::Membro(id, m) => {
                self.equipe_tecnica.insert((id, m.posicao), m.item);
            }
            Operacao::Poda(lista, id, manter) => match lista {
                ListaPia::Familiares => podar(&mut self.familiares, id, manter),
                ListaPia::Interfaces => podar(&mut self.interfaces_rede_executiva, id, manter),
                ListaPia::Equipe => podar(&mut self.equipe_tecnica, id, manter),
            },
            Operacao::Propostas(id, texto) => {
                self.propostas_pia.insert(id, texto);
            }
            Operacao::Opinioes(id, opiniao) => {
                self.opinioes.insert(id, opiniao);
            }
            Operacao::Servico(id, info) => {
                self.informacoes_servico.insert(id, info);
            }
        }
    }

    fn inserir_atendido(&mut self, atendido: Atendido) {
        self.proximo_id = self.proximo_id.max(atendido.id);
        self.atendidos.insert(atendido.id, atendido);
    }
}

struct Compartilhado {
    tabelas: Mutex<Tabelas>,
    pool: Arc<Semaphore>,
    acquire_timeout: Duration,
    adquiridas: AtomicUsize,
    liberadas: AtomicUsize,
    falha: Mutex<Option<Etapa>>,
    atraso: Mutex<Option<Duration>>,
}

/// Banco de registros em memória com pool de `max_sessions` sessões.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Compartilhado>,
}

impl MemoryStore {
    pub fn new(max_sessions: usize, acquire_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Compartilhado {
                tabelas: Mutex::new(Tabelas::default()),
                pool: Arc::new(Semaphore::new(max_sessions.max(1))),
                acquire_timeout,
                adquiridas: AtomicUsize::new(0),
                liberadas: AtomicUsize::new(0),
                falha: Mutex::new(None),
                atraso: Mutex::new(None),
            }),
        }
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Insere um atendido com id fixo.
    pub fn seed_atendido(&self, atendido: Atendido) {
        self.shared.tabelas.lock().inserir_atendido(atendido);
    }

    /// Faz a etapa indicada falhar em todas as sessões até ser limpa com `None`.
    pub fn fail_at(&self, etapa: Option<Etapa>) {
        *self.shared.falha.lock() = etapa;
    }

    /// Atrasa cada etapa de cada sessão.
    pub fn set_step_delay(&self, atraso: Option<Duration>) {
        *self.shared.atraso.lock() = atraso;
    }

    pub fn snapshot(&self) -> Tabelas {
        self.shared.tabelas.lock().clone()
    }

    pub fn sessions_acquired(&self) -> usize {
        self.shared.adquiridas.load(Ordering::SeqCst)
    }

    pub fn sessions_released(&self) -> usize {
        self.shared.liberadas.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn sessions_open(&self) -> usize {
        let adquiridas = self.shared.adquiridas.load(Ordering::SeqCst);
        adquiridas.saturating_sub(self.shared.liberadas.load(Ordering::SeqCst))
    }

    async fn count_atendidos(&self) -> Result<i64, StoreError> {
        Ok(self.shared.tabelas.lock().atendidos.len() as i64)
    }

    async fn list_atendidos(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AtendidoResumo>, StoreError> {
        let hoje = hoje();
        let tabelas = self.shared.tabelas.lock();
        Ok(tabelas
            .atendidos
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|a| a.resumo(hoje))
            .collect())
    }

    async fn list_all_atendidos(&self) -> Result<Vec<AtendidoResumo>, StoreError> {
        let hoje = hoje();
        let mut todos: Vec<_> = {
            let tabelas = self.shared.tabelas.lock();
            tabelas.atendidos.values().map(|a| a.resumo(hoje)).collect()
        };
        todos.sort_by(|a, b| a.nome.cmp(&b.nome).then(a.id.cmp(&b.id)));
        Ok(todos)
    }

    async fn search_atendidos(
        &self,
        filtro: &FiltroBusca,
    ) -> Result<Vec<AtendidoResumo>, StoreError> {
        let hoje = hoje();
        let opcional = |termo: &Option<String>, valor: &Option<String>| match termo {
            None => true,
            Some(termo) => valor.as_deref().is_some_and(|v| contem_sem_caixa(v, termo)),
        };

        let mut encontrados: Vec<_> = {
            let tabelas = self.shared.tabelas.lock();
            tabelas
                .atendidos
                .values()
                .filter(|a| contem_sem_caixa(&a.nome, &filtro.nome))
                .filter(|a| opcional(&filtro.responsavel, &a.responsavel))
                .filter(|a| opcional(&filtro.raca, &a.raca))
                .filter(|a| opcional(&filtro.deficiencia, &a.deficiencia))
                .filter(|a| opcional(&filtro.genero, &a.genero))
                .map(|a| a.resumo(hoje))
                .filter(|r| filtro.faixa.contem(r.idade))
                .collect()
        };
        encontrados.sort_by(|a, b| a.nome.cmp(&b.nome).then(a.id.cmp(&b.id)));
        Ok(encontrados)
    }

    async fn create_atendido(&self, novo: &NovoAtendido) -> Result<AtendidoId, StoreError> {
        let mut tabelas = self.shared.tabelas.lock();
        let id = tabelas.proximo_id + 1;
        tabelas.inserir_atendido(Atendido::from_novo(id, novo));
        Ok(id)
    }

    async fn find_atendido(&self, id: AtendidoId) -> Result<Option<Atendido>, StoreError> {
        Ok(self.shared.tabelas.lock().atendidos.get(&id).cloned())
    }

    async fn load_pia(&self, id: AtendidoId) -> Result<Option<PiaRegistro>, StoreError> {
        let tabelas = self.shared.tabelas.lock();
        let Some(atendido) = tabelas.atendidos.get(&id) else {
            return Ok(None);
        };
        Ok(Some(PiaRegistro {
            atendido: atendido.clone(),
            familiares: lista_de(&tabelas.familiares, id),
            propostas: tabelas.propostas_pia.get(&id).cloned(),
            interfaces: lista_de(&tabelas.interfaces_rede_executiva, id),
            opinioes: tabelas.opinioes.get(&id).cloned(),
            equipe: lista_de(&tabelas.equipe_tecnica, id),
            informacoes_servico: tabelas.informacoes_servico.get(&id).cloned(),
        }))
    }

    async fn begin(&self) -> Result<Box<dyn PiaSession>, StoreError> {
        let permit = tokio::time::timeout(
            self.shared.acquire_timeout,
            self.shared.pool.clone().acquire_owned(),
        )
        .await
        .map_err(|_| StoreError::acquire("tempo esgotado aguardando sessão livre"))?
        .map_err(StoreError::acquire)?;

        self.shared.adquiridas.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            shared: self.shared.clone(),
            _permit: permit,
            operacoes: Vec::new(),
        }))
    }
}

struct MemorySession {
    shared: Arc<Compartilhado>,
    _permit: OwnedSemaphorePermit,
    operacoes: Vec<Operacao>,
}

impl MemorySession {
    /// Aplica o atraso configurado e a falha injetada, se for esta etapa.
    async fn etapa(&self, etapa: Etapa) -> Result<(), StoreError> {
        let atraso = *self.shared.atraso.lock();
        if let Some(atraso) = atraso {
            tokio::time::sleep(atraso).await;
        }
        let falha = *self.shared.falha.lock();
        if falha == Some(etapa) {
            return Err(StoreError::database(format!("falha simulada em {etapa:?}")));
        }
        Ok(())
    }

    fn exigir_atendido(&self, id: AtendidoId) -> Result<(), StoreError> {
        if self.shared.tabelas.lock().atendidos.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::database(format!(
                "violação de chave estrangeira: atendido {id} não existe"
            )))
        }
    }

    async fn dependente(
        &mut self,
        etapa: Etapa,
        id: AtendidoId,
        operacao: Operacao,
    ) -> Result<(), StoreError> {
        self.etapa(etapa).await?;
        self.exigir_atendido(id)?;
        self.operacoes.push(operacao);
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.shared.liberadas.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PiaSession for MemorySession {
    async fn update_atendido(
        &mut self,
        id: AtendidoId,
        patch: &AtendidoPatch,
    ) -> Result<u64, StoreError> {
        self.etapa(Etapa::AtualizarAtendido).await?;
        if self.exigir_atendido(id).is_err() {
            return Ok(0);
        }
        self.operacoes.push(Operacao::Patch(id, patch.clone()));
        Ok(1)
    }

    async fn upsert_familiar(
        &mut self,
        id: AtendidoId,
        familiar: &Posicionado<Familiar>,
    ) -> Result<(), StoreError> {
        self.dependente(Etapa::Familiar, id, Operacao::Familiar(id, familiar.clone()))
            .await
    }

    async fn upsert_interface(
        &mut self,
        id: AtendidoId,
        interface: &Posicionado<InterfaceRedeExecutiva>,
    ) -> Result<(), StoreError> {
        self.dependente(Etapa::Interface, id, Operacao::Interface(id, interface.clone()))
            .await
    }

    async fn upsert_membro_equipe(
        &mut self,
        id: AtendidoId,
        membro: &Posicionado<MembroEquipe>,
    ) -> Result<(), StoreError> {
        self.dependente(Etapa::MembroEquipe, id, Operacao::Membro(id, membro.clone()))
            .await
    }

    /// A contagem considera o estado confirmado.
    async fn prune(
        &mut self,
        lista: ListaPia,
        id: AtendidoId,
        manter: i32,
    ) -> Result<u64, StoreError> {
        self.etapa(Etapa::Poda).await?;
        let removidas = {
            let tabelas = self.shared.tabelas.lock();
            match lista {
                ListaPia::Familiares => acima_de(&tabelas.familiares, id, manter),
                ListaPia::Interfaces => acima_de(&tabelas.interfaces_rede_executiva, id, manter),
                ListaPia::Equipe => acima_de(&tabelas.equipe_tecnica, id, manter),
            }
        };
        self.operacoes.push(Operacao::Poda(lista, id, manter));
        Ok(removidas)
    }

    async fn upsert_propostas(
        &mut self,
        id: AtendidoId,
        propostas: &str,
    ) -> Result<(), StoreError> {
        self.dependente(Etapa::Propostas, id, Operacao::Propostas(id, propostas.to_string()))
            .await
    }

    async fn upsert_opinioes(
        &mut self,
        id: AtendidoId,
        opinioes: &Opiniao,
    ) -> Result<(), StoreError> {
        self.dependente(Etapa::Opinioes, id, Operacao::Opinioes(id, opinioes.clone()))
            .await
    }

    async fn upsert_informacoes_servico(
        &mut self,
        id: AtendidoId,
        informacoes: &InformacoesServico,
    ) -> Result<(), StoreError> {
        self.dependente(
            Etapa::InformacoesServico,
            id,
            Operacao::Servico(id, informacoes.clone()),
        )
        .await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut sessao = self;
        sessao.etapa(Etapa::Commit).await?;
        let operacoes = std::mem::take(&mut sessao.operacoes);
        let mut tabelas = sessao.shared.tabelas.lock();
        for operacao in operacoes {
            tabelas.aplicar(operacao);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        drop(self);
        Ok(())
    }
}
