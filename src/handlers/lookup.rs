use std::sync::Arc;

use axum::extract::{Path, Query, State};

use super::{json, limit, ApiResp, Ctx, LimitQuery, Result};
use crate::models::{Lookup, PopularWord, SearchHit};

/// Look up a single word.
pub async fn lookup(
    State(ctx): State<Arc<Ctx>>,
    Path((lang, word)): Path<(String, String)>,
) -> Result<ApiResp<Lookup>> {
    let out = ctx.mgr.lookup(&lang, &word).await?;
    Ok(json(out))
}

/// Autocomplete suggestions for a partial query.
pub async fn search(
    State(ctx): State<Arc<Ctx>>,
    Path((lang, q)): Path<(String, String)>,
    Query(query): Query<LimitQuery>,
) -> Result<ApiResp<Vec<SearchHit>>> {
    let n = limit(
        query.limit,
        ctx.consts.default_search_limit,
        ctx.consts.max_search_limit,
    );

    let out = ctx.mgr.search(&lang, &q, n).await?;
    Ok(json(out))
}

/// Most looked-up words in a language.
pub async fn popular(
    State(ctx): State<Arc<Ctx>>,
    Path(lang): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<ApiResp<Vec<PopularWord>>> {
    if !ctx.langs.contains_key(&lang) {
        return Err(crate::manager::Error::UnknownLang(lang).into());
    }

    let n = limit(
        query.limit,
        ctx.consts.default_popular_limit,
        ctx.consts.max_search_limit,
    );

    let out = ctx.mgr.popularity().top_words(&lang, n).await?;
    Ok(json(out))
}
