use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::{
    background::Background,
    corpus::Corpus,
    enrich::{EnrichError, Enricher},
    models::{CachedEntry, EnrichMode, Lookup, Provenance, SearchHit},
    normalize::normalize,
    popularity::PopularityTracker,
    store::{Stats, Store, StoreError},
};


#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("unknown language: {0}")]
    UnknownLang(String),
    #[error("{0}")]
    Validation(String),
    #[error("lookup task failed: {0}")]
    Task(String),
}

impl From<EnrichError> for Error {
    fn from(e: EnrichError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// (language, normalized word).
type Key = (String, String);

/// A cold resolution shared by every concurrent lookup of the same key.
type Flight = Shared<BoxFuture<'static, Result<Option<Resolved>, Error>>>;

#[derive(Debug, Clone)]
struct Resolved {
    entry: CachedEntry,
    provenance: Provenance,
}

#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    pub enrich_mode: EnrichMode,
}

/// Manager orchestrates lookups across the tiers:
/// persistent cache -> static corpus -> enrichment -> persist.
pub struct Manager {
    store: Arc<dyn Store>,
    enricher: Arc<Enricher>,
    corpora: RwLock<HashMap<String, Arc<Corpus>>>,
    popularity: PopularityTracker,
    bg: Background,
    cfg: ManagerConfig,

    /// Cold resolutions in progress.
    flights: Mutex<HashMap<Key, Flight>>,
    /// Keys with a detached promotion in progress.
    promoting: Mutex<HashSet<Key>>,
}

/// Runs the closure on drop, including when a task unwinds.
struct Release<F: FnMut()>(F);

impl<F: FnMut()> Drop for Release<F> {
    fn drop(&mut self) {
        (self.0)()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Manager {
    pub fn new(
        store: Arc<dyn Store>,
        enricher: Arc<Enricher>,
        corpora: HashMap<String, Corpus>,
        cfg: ManagerConfig,
    ) -> Self {
        let bg = Background::new();
        Self {
            popularity: PopularityTracker::new(store.clone(), bg.clone()),
            store,
            enricher,
            corpora: RwLock::new(
                corpora
                    .into_iter()
                    .map(|(lang, c)| (lang, Arc::new(c)))
                    .collect(),
            ),
            bg,
            cfg,
            flights: Mutex::new(HashMap::new()),
            promoting: Mutex::new(HashSet::new()),
        }
    }

    pub fn popularity(&self) -> &PopularityTracker {
        &self.popularity
    }

    pub fn enricher(&self) -> &Enricher {
        &self.enricher
    }

    /// Languages with a loaded corpus.
    pub fn languages(&self) -> Vec<String> {
        let corpora = self.corpora.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<String> = corpora.keys().cloned().collect();
        out.sort();
        out
    }

    /// Current corpus snapshot for a language.
    fn corpus(&self, lang: &str) -> Result<Arc<Corpus>, Error> {
        let corpora = self.corpora.read().unwrap_or_else(PoisonError::into_inner);
        corpora
            .get(lang)
            .cloned()
            .ok_or_else(|| Error::UnknownLang(lang.to_string()))
    }

    /// Swap in a new corpus for a language. Lookups already holding the old
    /// snapshot finish with it. Nothing in the persistent cache is invalidated
    /// as negative results are never cached.
    pub fn replace_corpus(&self, lang: &str, corpus: Corpus) {
        log::info!("replacing corpus for '{}' ({} entries)", lang, corpus.len());
        let mut corpora = self.corpora.write().unwrap_or_else(PoisonError::into_inner);
        corpora.insert(lang.to_string(), Arc::new(corpus));
    }

    // #########################
    // Lookup

    /// Look up a single word.
    pub async fn lookup(self: &Arc<Self>, lang: &str, word: &str) -> Result<Lookup, Error> {
        let word = word.trim();
        if word.is_empty() {
            return Err(Error::Validation("word is required".to_string()));
        }
        self.corpus(lang)?;

        let key = normalize(word);

        if let Some(entry) = self.cached(lang, &key).await {
            log::debug!("cache hit: {}/{}", lang, word);
            return Ok(self.serve(entry, Provenance::Cache));
        }

        match self.join(lang, word, &key).await? {
            Some(r) => Ok(self.serve(r.entry, r.provenance)),
            None => Ok(Lookup::not_found()),
        }
    }

    /// Read from the persistent cache. A read error is treated as a miss.
    async fn cached(&self, lang: &str, key: &str) -> Option<CachedEntry> {
        match self.store.get(lang, key).await {
            Ok(e) => e,
            Err(e) => {
                log::error!("error reading cache for {}/{}: {}", lang, key, e);
                None
            }
        }
    }

    /// Join the in-flight resolution for a key, or start one. The lock is only
    /// held to check and register the flight.
    fn join(self: &Arc<Self>, lang: &str, word: &str, key: &str) -> Flight {
        let k: Key = (lang.to_string(), key.to_string());

        let mut flights = lock(&self.flights);
        if let Some(f) = flights.get(&k) {
            log::debug!("joining in-flight lookup: {}/{}", lang, word);
            return f.clone();
        }

        let this = self.clone();
        let (lang, word, key) = (lang.to_string(), word.to_string(), k.clone());

        // The resolution runs as its own task so that it completes even if
        // every waiter goes away.
        let handle = tokio::spawn(async move {
            let _release = {
                let this = this.clone();
                let key = key.clone();
                Release(move || {
                    lock(&this.flights).remove(&key);
                })
            };
            this.resolve(&lang, &word, &key.1).await
        });

        let flight = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(Error::Task(e.to_string())))
        }
        .boxed()
        .shared();

        flights.insert(k, flight.clone());
        flight
    }

    /// Cold path: corpus -> enrichment -> persist.
    async fn resolve(
        self: &Arc<Self>,
        lang: &str,
        word: &str,
        key: &str,
    ) -> Result<Option<Resolved>, Error> {
        // Another flight for this key may have finished between our cache
        // miss and registering this one.
        if let Some(entry) = self.cached(lang, key).await {
            return Ok(Some(Resolved {
                entry,
                provenance: Provenance::Cache,
            }));
        }

        let mut entry = {
            let corpus = self.corpus(lang)?;
            match corpus.lookup(word) {
                Some(lex) => CachedEntry::provisional(lang, word, lex),
                None => {
                    log::debug!("not found: {}/{}", lang, word);
                    return Ok(None);
                }
            }
        };

        if self.cfg.enrich_mode == EnrichMode::Inline {
            if let Some(r) = self.enricher.enrich(lang, word).await? {
                entry.enrich(r, Utc::now());
            }
        }

        // Persistence is best-effort. The resolved entry is served regardless.
        if let Err(e) = self.store.put(&entry).await {
            log::error!("error persisting {}/{}: {}", lang, word, e);
        }

        if self.cfg.enrich_mode == EnrichMode::Background {
            self.promote(&entry);
        }

        Ok(Some(Resolved {
            provenance: entry.provenance,
            entry,
        }))
    }

    /// Count the request and build the response.
    fn serve(self: &Arc<Self>, mut entry: CachedEntry, provenance: Provenance) -> Lookup {
        entry.lookup_count = self.popularity.record(
            &entry.language,
            &entry.normalized_word,
            entry.lookup_count,
        );

        // Entries that were served without enrichment get another attempt,
        // off the request path.
        if provenance == Provenance::Cache && !entry.is_enriched() {
            self.promote(&entry);
        }

        Lookup::found(entry, provenance)
    }

    /// Enrich and re-persist an un-enriched entry as a detached task. At most
    /// one promotion runs per key.
    fn promote(self: &Arc<Self>, entry: &CachedEntry) {
        if !self.enricher.supports(&entry.language) {
            return;
        }

        let k: Key = (entry.language.clone(), entry.normalized_word.clone());
        if !lock(&self.promoting).insert(k.clone()) {
            return;
        }

        let this = self.clone();
        let mut entry = entry.clone();

        self.bg.spawn(async move {
            let _release = {
                let this = this.clone();
                Release(move || {
                    lock(&this.promoting).remove(&k);
                })
            };

            match this.enricher.enrich(&entry.language, &entry.word).await {
                Ok(Some(r)) => {
                    entry.enrich(r, Utc::now());
                    match this.store.put(&entry).await {
                        Ok(_) => log::debug!("promoted {}/{}", entry.language, entry.word),
                        Err(e) => log::error!(
                            "error persisting promotion of {}/{}: {}",
                            entry.language,
                            entry.word,
                            e
                        ),
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("error promoting {}/{}: {}", entry.language, entry.word, e),
            }
        });
    }

    // #########################
    // Search

    /// Autocomplete: cached entries first (most looked-up first), then corpus
    /// entries in load order, de-duplicated by normalized headword.
    pub async fn search(
        &self,
        lang: &str,
        query: &str,
        limit: i32,
    ) -> Result<Vec<SearchHit>, Error> {
        let corpus = self.corpus(lang)?;

        let query = normalize(query.trim());
        if limit <= 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit as usize;

        let cached = match self.store.search(lang, &query, limit as i32).await {
            Ok(v) => v,
            Err(e) => {
                log::error!("error searching cache for {}/{}: {}", lang, query, e);
                Vec::new()
            }
        };

        let mut seen: HashSet<String> = HashSet::with_capacity(limit);
        let mut out: Vec<SearchHit> = Vec::with_capacity(limit);

        for e in &cached {
            if seen.insert(e.normalized_word.clone()) {
                out.push(e.into());
            }
        }

        // Fill up from the corpus. Matches are walked lazily so that entries
        // skipped as duplicates don't count against the limit.
        for e in corpus.matches(&query) {
            if out.len() >= limit {
                break;
            }
            if seen.insert(normalize(&e.headword)) {
                out.push(e.into());
            }
        }

        out.truncate(limit);
        Ok(out)
    }

    // #########################
    // Misc

    pub async fn stats(&self) -> Result<Stats, StoreError> {
        self.store.stats().await
    }

    /// Wait for detached work (lookup counters, promotions) to finish.
    pub async fn settle(&self) {
        self.bg.settle().await
    }
}
