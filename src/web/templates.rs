//! # Templates Maud — HTML Server-Side Rendering
//!
//! Todas as páginas compartilham o [`layout()`]: barra de navegação e o
//! formulário de busca no topo.
//!
//! ## Templates Disponíveis
//!
//! | Função | Rota | Descrição |
//! |--------|------|-----------|
//! | [`pesquisar_page()`] | `/`, `/buscar` | Tabela de atendidos (+ paginação em `/`) |
//! | [`inserir_page()`] | `/inserir` | Cadastro + todos os atendidos |
//! | [`pia_page()`] | `/alterar` | Formulário do PIA com linhas dinâmicas |
//! | [`erro_page()`] | qualquer | Mensagem de falha com link de volta |
//!
//! ## Formulário do PIA
//!
//! ```text
//! ┌ Identificação ─────────────── nome, nascimento, filiação, ...
//! ├ Familiares ─────────── tabela [data-lista=familiaresData]  + Adicionar
//! ├ Propostas ─────────── textarea
//! ├ Rede executiva ─────── tabela [data-lista=interfacesRedeExecutivaData]
//! ├ Opiniões ──────────── usuário / família
//! ├ Equipe técnica ────── tabela [data-lista=equipeTecnicaData]
//! └ Serviço ───────────── nome, endereço, e-mail, telefone
//! ```
//!
//! Cada linha nova é clonada de um `<template>`. No envio, o script lê as
//! tabelas na ordem da tela e posta um único JSON em `/salvar_pia`; a ordem
//! das linhas vira a posição gravada.

use axum::http::StatusCode;
use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::core::{
    AtendidoResumo, Familiar, InterfaceRedeExecutiva, MembroEquipe, Paginacao, PiaRegistro,
};

fn texto(valor: &Option<String>) -> &str {
    valor.as_deref().unwrap_or("")
}

fn data(valor: Option<chrono::NaiveDate>) -> String {
    valor.map(|d| d.to_string()).unwrap_or_default()
}

/// Esqueleto comum: `<head>`, navegação e busca.
pub fn layout(titulo: &str, conteudo: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="pt-BR" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (titulo) " — NAISPD" }
                link rel="stylesheet" href="/assets/style.css";
            }
            body {
                nav class="nav-bar" {
                    a href="/" class="nav-brand" { "NAISPD" }
                    div class="nav-links" {
                        a href="/" class="nav-link" { "Pesquisar" }
                        a href="/inserir" class="nav-link" { "Inserir" }
                    }
                }
                main class="container" {
                    (busca_form())
                    h1 { (titulo) }
                    (conteudo)
                }
            }
        }
    }
}

fn busca_form() -> Markup {
    html! {
        form class="busca" method="post" action="/buscar" {
            input type="text" name="nome_buscar" placeholder="Nome" required;
            select name="idade" {
                option value="all" { "Todas as idades" }
                option value="10-18" { "10 a 18" }
                option value="18-30" { "18 a 30" }
                option value="18-60" { "18 a 60" }
                option value="60+" { "60+" }
            }
            input type="text" name="responsavel_buscar" placeholder="Responsável";
            input type="text" name="raca_buscar" placeholder="Raça";
            input type="text" name="deficiencia_buscar" placeholder="Deficiência";
            input type="text" name="sexo_buscar" placeholder="Gênero";
            button type="submit" { "Buscar" }
        }
    }
}

fn tabela_atendidos(atendidos: &[AtendidoResumo]) -> Markup {
    html! {
        @if atendidos.is_empty() {
            p class="vazio" { "Nenhum atendido encontrado." }
        } @else {
            table class="atendidos" {
                thead {
                    tr {
                        th { "Nome" }
                        th { "Telefone" }
                        th { "E-mail" }
                        th { "Nascimento" }
                        th { "Idade" }
                        th { "RG" }
                        th { "CPF" }
                        th {}
                    }
                }
                tbody {
                    @for a in atendidos {
                        tr {
                            td { (a.nome) }
                            td { (texto(&a.telefone)) }
                            td { (texto(&a.email)) }
                            td { (data(a.data_nascimento)) }
                            td { (a.idade.map(|i| i.to_string()).unwrap_or_default()) }
                            td { (texto(&a.rg)) }
                            td { (texto(&a.cpf)) }
                            td {
                                a href={ "/alterar?id=" (a.id) } { "PIA" }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn paginacao_nav(p: &Paginacao) -> Markup {
    html! {
        nav class="paginacao" {
            @if let Some(anterior) = p.anterior() {
                a href={ "/?page=" (anterior) } { "« Anterior" }
            }
            span { "Página " (p.pagina) " de " (p.total_paginas()) " (" (p.total) " atendidos)" }
            @if let Some(proxima) = p.proxima() {
                a href={ "/?page=" (proxima) } { "Próxima »" }
            }
        }
    }
}

/// Listagem de atendidos; `paginacao` é `None` nos resultados de busca.
pub fn pesquisar_page(atendidos: &[AtendidoResumo], paginacao: Option<&Paginacao>) -> Markup {
    let titulo = if paginacao.is_some() { "Atendidos" } else { "Resultado da busca" };
    layout(
        titulo,
        html! {
            (tabela_atendidos(atendidos))
            @if let Some(p) = paginacao {
                (paginacao_nav(p))
            }
        },
    )
}

pub fn inserir_page(atendidos: &[AtendidoResumo]) -> Markup {
    layout(
        "Inserir atendido",
        html! {
            form class="cadastro" method="post" action="/criar" {
                label { "Nome" input type="text" name="nome" required; }
                label { "Telefone" input type="tel" name="telefone" placeholder="(11) 91234-5678" required; }
                label { "E-mail" input type="email" name="email" required; }
                label { "Data de nascimento" input type="date" name="dataNascimento" required; }
                label { "RG" input type="text" name="rg" inputmode="numeric" required; }
                label { "CPF" input type="text" name="cpf" required; }
                button type="submit" { "Cadastrar" }
            }
            h2 { "Todos os atendidos" }
            (tabela_atendidos(atendidos))
        },
    )
}

fn botao_remover() -> Markup {
    html! {
        td { button type="button" class="remover" data-remover { "Remover" } }
    }
}

fn linha_familiar(f: &Familiar) -> Markup {
    html! {
        tr {
            td { input type="text" data-campo="nome" value=(f.nome); }
            td { input type="date" data-campo="data_nascimento" value=(data(f.data_nascimento)); }
            td { input type="text" data-campo="parentesco" value=(f.parentesco); }
            td { input type="text" data-campo="servico_socioassistencial" value=(f.servico_socioassistencial); }
            td { input type="text" data-campo="telefone" value=(f.telefone); }
            td { input type="text" data-campo="demanda_apresentada" value=(f.demanda_apresentada); }
            (botao_remover())
        }
    }
}

fn linha_interface(i: &InterfaceRedeExecutiva) -> Markup {
    html! {
        tr {
            td { input type="text" data-campo="acao_encaminhamento" value=(i.acao_encaminhamento); }
            td { input type="text" data-campo="a_quem_destina" value=(i.a_quem_destina); }
            td { input type="text" data-campo="orgao_servico_atendimento" value=(i.orgao_servico_atendimento); }
            (botao_remover())
        }
    }
}

fn linha_membro(m: &MembroEquipe) -> Markup {
    html! {
        tr {
            td { input type="text" data-campo="nome" value=(m.nome); }
            td { input type="text" data-campo="funcao" value=(m.funcao); }
            (botao_remover())
        }
    }
}

/// Tabela editável de uma lista do PIA, com o `<template>` da linha vazia.
fn lista_editavel(
    lista: &str,
    titulo: &str,
    colunas: &[&str],
    linhas: Markup,
    modelo: Markup,
) -> Markup {
    html! {
        fieldset {
            legend { (titulo) }
            table class="lista-pia" data-lista=(lista) {
                thead {
                    tr {
                        @for coluna in colunas {
                            th { (*coluna) }
                        }
                        th {}
                    }
                }
                tbody { (linhas) }
            }
            template id={ "modelo-" (lista) } { (modelo) }
            button type="button" data-adicionar=(lista) { "Adicionar" }
        }
    }
}

/// Formulário do PIA de um atendido, pré-preenchido com o que está gravado.
pub fn pia_page(registro: &PiaRegistro) -> Markup {
    let a = &registro.atendido;
    let opinioes = registro.opinioes.clone().unwrap_or_default();
    let servico = registro.informacoes_servico.clone().unwrap_or_default();

    layout(
        &format!("PIA de {}", a.nome),
        html! {
            form id="pia-form" class="pia" {
                input type="hidden" name="id" value=(a.id);
                fieldset {
                    legend { "Identificação" }
                    label { "Nome" input type="text" name="nome" value=(a.nome) required; }
                    label { "Data de nascimento" input type="date" name="dataNascimento" value=(data(a.data_nascimento)); }
                    label { "Filiação" input type="text" name="filiacao" value=(texto(&a.filiacao)); }
                    label { "Endereço da família" input type="text" name="enderecoFamilia" value=(texto(&a.endereco_familia)); }
                    label { "Motivo do encaminhamento" textarea name="motivoEncaminhamento" { (texto(&a.motivo_encaminhamento)) } }
                    label { "Histórico da pessoa" textarea name="historicoPessoa" { (texto(&a.historico_pessoa)) } }
                }

                (lista_editavel(
                    "familiaresData",
                    "Familiares",
                    &["Nome", "Nascimento", "Parentesco", "Serviço socioassistencial", "Telefone", "Demanda"],
                    html! { @for f in &registro.familiares { (linha_familiar(&f.item)) } },
                    linha_familiar(&Familiar::default()),
                ))

                fieldset {
                    legend { "Propostas" }
                    textarea name="propostasPia" { (registro.propostas.as_deref().unwrap_or("")) }
                }

                (lista_editavel(
                    "interfacesRedeExecutivaData",
                    "Interfaces com a rede executiva",
                    &["Ação / encaminhamento", "A quem se destina", "Órgão / serviço"],
                    html! { @for i in &registro.interfaces { (linha_interface(&i.item)) } },
                    linha_interface(&InterfaceRedeExecutiva::default()),
                ))

                fieldset {
                    legend { "Opiniões sobre o PIA" }
                    label { "Do usuário" textarea name="opiniaoUsuarioPia" { (opinioes.opiniao_usuario_pia) } }
                    label { "Da família" textarea name="opiniaoFamiliaPia" { (opinioes.opiniao_familia_pia) } }
                }

                (lista_editavel(
                    "equipeTecnicaData",
                    "Equipe técnica",
                    &["Nome", "Função"],
                    html! { @for m in &registro.equipe { (linha_membro(&m.item)) } },
                    linha_membro(&MembroEquipe::default()),
                ))

                fieldset {
                    legend { "Informações do serviço" }
                    label { "Nome" input type="text" name="nome_servico" value=(servico.nome_servico); }
                    label { "Endereço" input type="text" name="endereco_servico" value=(servico.endereco_servico); }
                    label { "E-mail" input type="email" name="email_servico" value=(servico.email_servico); }
                    label { "Telefone" input type="tel" name="telefone_servico" value=(servico.telefone_servico); }
                }

                button type="submit" { "Salvar PIA" }
                p id="pia-status" class="aviso" {}
            }
            script { (PreEscaped(PIA_SCRIPT)) }
        },
    )
}

pub fn erro_page(status: StatusCode, mensagem: &str) -> Markup {
    layout(
        &format!("Erro {}", status.as_u16()),
        html! {
            p class="aviso erro" { (mensagem) }
            a href="javascript:history.back()" { "Voltar" }
        },
    )
}

const PIA_SCRIPT: &str = r#"
(function () {
  const form = document.getElementById('pia-form');
  const aviso = document.getElementById('pia-status');
  const nulo = (v) => (v === '' ? null : v);

  form.addEventListener('click', (ev) => {
    const alvo = ev.target;
    if (alvo.matches('[data-adicionar]')) {
      const lista = alvo.dataset.adicionar;
      const modelo = document.getElementById('modelo-' + lista);
      form.querySelector('[data-lista="' + lista + '"] tbody')
        .appendChild(modelo.content.cloneNode(true));
    } else if (alvo.matches('[data-remover]')) {
      alvo.closest('tr').remove();
    }
  });

  function lerLista(lista) {
    const linhas = form.querySelectorAll('[data-lista="' + lista + '"] tbody tr');
    return Array.from(linhas).map((linha) => {
      const item = {};
      linha.querySelectorAll('[data-campo]').forEach((campo) => {
        item[campo.dataset.campo] = campo.type === 'date' ? nulo(campo.value) : campo.value;
      });
      return item;
    });
  }

  form.addEventListener('submit', async (ev) => {
    ev.preventDefault();
    const valor = (nome) => form.elements[nome].value;
    const corpo = {
      id: Number(valor('id')),
      nome: valor('nome'),
      dataNascimento: nulo(valor('dataNascimento')),
      filiacao: valor('filiacao'),
      enderecoFamilia: valor('enderecoFamilia'),
      motivoEncaminhamento: valor('motivoEncaminhamento'),
      historicoPessoa: valor('historicoPessoa'),
      familiaresData: lerLista('familiaresData'),
      propostasPia: valor('propostasPia'),
      interfacesRedeExecutivaData: lerLista('interfacesRedeExecutivaData'),
      opiniaoUsuarioPia: valor('opiniaoUsuarioPia'),
      opiniaoFamiliaPia: valor('opiniaoFamiliaPia'),
      equipeTecnicaData: lerLista('equipeTecnicaData'),
      informacoesServico: {
        nome_servico: valor('nome_servico'),
        endereco_servico: valor('endereco_servico'),
        email_servico: valor('email_servico'),
        telefone_servico: valor('telefone_servico'),
      },
    };
    try {
      const resposta = await fetch('/salvar_pia', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(corpo),
      });
      aviso.textContent = await resposta.text();
      aviso.className = resposta.ok ? 'aviso sucesso' : 'aviso erro';
    } catch (erro) {
      aviso.textContent = 'Falha de conexão: ' + erro;
      aviso.className = 'aviso erro';
    }
  });
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Atendido, NovoAtendido, Posicionado};
    use chrono::NaiveDate;

    fn registro() -> PiaRegistro {
        let atendido = Atendido::from_novo(
            7,
            &NovoAtendido {
                nome: "Ana <Souza>".into(),
                telefone: "(11) 91234-5678".into(),
                email: "ana@exemplo.com".into(),
                data_nascimento: NaiveDate::from_ymd_opt(2000, 3, 4).unwrap(),
                rg: "1234567".into(),
                cpf: "52998224725".into(),
            },
        );
        PiaRegistro {
            atendido,
            familiares: vec![Posicionado {
                posicao: 1,
                item: Familiar {
                    nome: "Bia".into(),
                    ..Familiar::default()
                },
            }],
            propostas: Some("reforço escolar".into()),
            interfaces: vec![],
            opinioes: None,
            equipe: vec![],
            informacoes_servico: None,
        }
    }

    #[test]
    fn pia_preenchido_e_escapado() {
        let html = pia_page(&registro()).into_string();
        assert!(html.contains("Ana &lt;Souza&gt;"));
        assert!(!html.contains("Ana <Souza>"));
        assert!(html.contains(r#"value="2000-03-04""#));
        assert!(html.contains(r#"value="Bia""#));
        assert!(html.contains("reforço escolar"));
        assert!(html.contains(r#"data-lista="equipeTecnicaData""#));
        assert!(html.contains("id=\"modelo-familiaresData\""));
        assert!(html.contains("fetch('/salvar_pia'"));
    }

    #[test]
    fn paginacao_mostra_links_vizinhos() {
        let p = Paginacao::from_query(Some("2"), 20, 45);
        let html = pesquisar_page(&[], Some(&p)).into_string();
        assert!(html.contains(r#"href="/?page=1""#));
        assert!(html.contains(r#"href="/?page=3""#));
        assert!(html.contains("Página 2 de 3"));
        assert!(html.contains("Nenhum atendido encontrado."));
    }

    #[test]
    fn resultado_de_busca_sem_paginacao() {
        let resumo = registro().atendido.resumo(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        let html = pesquisar_page(&[resumo], None).into_string();
        assert!(html.contains("Resultado da busca"));
        assert!(html.contains(r#"href="/alterar?id=7""#));
        assert!(html.contains("<td>24</td>"));
        assert!(!html.contains("paginacao"));
    }
}
