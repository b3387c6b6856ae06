mod http;

pub use http::HttpAnalyzer;

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    cache::{make_enrichment_cache_key, Cache},
    models::EnrichmentResult,
    normalize::normalize,
};

/// External morphological analysis service for one language.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze a single word.
    async fn analyze(&self, word: &str) -> Result<EnrichmentResult, AnalyzerError>;

    /// Whether the service is up and has its models loaded.
    async fn is_ready(&self) -> bool {
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    Schema(String),
    #[error("malformed request: {0}")]
    Malformed(String),
}

/// The only enrichment error that reaches callers. Service failures are
/// reported as an absent result instead.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("malformed enrichment request: {0}")]
    Malformed(String),
}

pub type Analyzers = HashMap<String, Arc<dyn Analyzer>>;

/// Enrichment client: per-language analyzers behind a result cache and a
/// per-call deadline.
pub struct Enricher {
    analyzers: Analyzers,
    cache: Option<Cache>,
    timeout: Duration,
}

impl Enricher {
    pub fn new(analyzers: Analyzers, cache: Option<Cache>, timeout: Duration) -> Self {
        Self {
            analyzers,
            cache,
            timeout,
        }
    }

    /// Enricher that never has a result.
    pub fn disabled() -> Self {
        Self::new(HashMap::new(), None, Duration::ZERO)
    }

    /// Whether words in `lang` can be enriched at all.
    pub fn supports(&self, lang: &str) -> bool {
        self.analyzers.contains_key(lang)
    }

    /// Enrich a word. Returns Ok(None) when the language has no analyzer or
    /// the analyzer is unavailable, fails, or misses the deadline. Failures
    /// are not cached and not retried here.
    pub async fn enrich(
        &self,
        lang: &str,
        word: &str,
    ) -> Result<Option<EnrichmentResult>, EnrichError> {
        let word = word.trim();
        if word.is_empty() {
            return Err(EnrichError::Malformed("empty word".to_string()));
        }

        let Some(analyzer) = self.analyzers.get(lang) else {
            return Ok(None);
        };

        let key = make_enrichment_cache_key(lang, &normalize(word));
        if let Some(r) = self.cached(&key).await {
            log::debug!("enrichment cache hit: {}/{}", lang, word);
            return Ok(Some(r));
        }

        let r = match tokio::time::timeout(self.timeout, analyzer.analyze(word)).await {
            Ok(Ok(r)) => r,
            Ok(Err(AnalyzerError::Malformed(msg))) => return Err(EnrichError::Malformed(msg)),
            Ok(Err(e)) => {
                log::warn!("enrichment unavailable for {}/{}: {}", lang, word, e);
                return Ok(None);
            }
            Err(_) => {
                log::warn!(
                    "enrichment timed out for {}/{} after {:?}",
                    lang,
                    word,
                    self.timeout
                );
                return Ok(None);
            }
        };

        if let Some(cache) = &self.cache {
            match rmp_serde::to_vec(&r) {
                Ok(b) => cache.put(&key, &b),
                Err(e) => log::warn!("error encoding enrichment for cache: {}", e),
            }
        }

        Ok(Some(r))
    }

    async fn cached(&self, key: &str) -> Option<EnrichmentResult> {
        let b = self.cache.as_ref()?.get(key).await?;
        match rmp_serde::from_slice(&b) {
            Ok(r) => Some(r),
            Err(e) => {
                log::warn!("error decoding cached enrichment {}: {}", key, e);
                None
            }
        }
    }

    /// Log the readiness of every configured analyzer.
    pub async fn check(&self) {
        for (lang, a) in &self.analyzers {
            if a.is_ready().await {
                log::info!("analyzer for '{}' is ready", lang);
            } else {
                log::warn!(
                    "analyzer for '{}' is not ready. Lookups will be served without enrichment until it is",
                    lang
                );
            }
        }
    }

    /// Flush the result cache.
    pub async fn close(&self) {
        if let Some(c) = &self.cache {
            c.close().await;
        }
    }
}
