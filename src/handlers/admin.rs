use std::{path::PathBuf, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;

use super::{json, ApiErr, ApiResp, Ctx, Result};
use crate::{corpus::Corpus, manager, store::Stats};

#[derive(Serialize)]
pub struct HealthResp {
    pub version: String,
    pub langs: Vec<LangResp>,
    pub enrichment: bool,
    pub stats: Option<Stats>,
}

#[derive(Serialize)]
pub struct LangResp {
    pub id: String,
    pub name: String,
    pub enrichment: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResp {
    pub lang: String,
    pub entries: usize,
}

/// Service health, languages and entry stats.
pub async fn health(State(ctx): State<Arc<Ctx>>) -> Result<ApiResp<HealthResp>> {
    let stats = match ctx.mgr.stats().await {
        Ok(s) => Some(s),
        Err(e) => {
            log::error!("error reading stats: {}", e);
            None
        }
    };

    // Languages with a loaded corpus, sorted by ID.
    let langs: Vec<LangResp> = ctx
        .mgr
        .languages()
        .into_iter()
        .map(|id| LangResp {
            name: ctx.langs.get(&id).map(|l| l.name.clone()).unwrap_or_default(),
            enrichment: ctx.mgr.enricher().supports(&id),
            id,
        })
        .collect();

    Ok(json(HealthResp {
        version: ctx.version.clone(),
        langs,
        enrichment: ctx.consts.enrichment,
        stats,
    }))
}

/// Re-read a language's corpus file and swap it in.
pub async fn reload_corpus(
    State(ctx): State<Arc<Ctx>>,
    Path(lang): Path<String>,
) -> Result<ApiResp<ReloadResp>> {
    let Some(l) = ctx.langs.get(&lang) else {
        return Err(manager::Error::UnknownLang(lang).into());
    };

    let path = PathBuf::from(&l.corpus);
    let corpus = tokio::task::spawn_blocking(move || Corpus::from_file(&path))
        .await
        .map_err(|e| ApiErr::new(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR))??;

    let entries = corpus.len();
    ctx.mgr.replace_corpus(&lang, corpus);

    Ok(json(ReloadResp { lang, entries }))
}
