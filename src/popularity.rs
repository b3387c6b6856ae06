use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    background::Background,
    models::PopularWord,
    normalize::normalize,
    store::{Store, StoreError},
};

type Counts = Arc<Mutex<HashMap<(String, String), i64>>>;

/// Lookup counters for cached entries and the "most looked up" read path.
///
/// The store holds the durable count. `counts` mirrors it per key in-process
/// so that the count reported for a lookup is the value this lookup raised it
/// to, even while earlier increments are still in flight.
pub struct PopularityTracker {
    store: Arc<dyn Store>,
    bg: Background,
    counts: Counts,
}

impl PopularityTracker {
    pub fn new(store: Arc<dyn Store>, bg: Background) -> Self {
        Self {
            store,
            bg,
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one served lookup and return the post-increment count. `stored`
    /// is the count read along with the entry. The store increment runs
    /// detached so it never adds latency to the lookup; a failed increment is
    /// logged and dropped.
    pub fn record(&self, lang: &str, word: &str, stored: i64) -> i64 {
        let key = (lang.to_string(), normalize(word));

        let n = {
            let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
            let c = counts.entry(key.clone()).or_insert(stored);
            *c = (*c).max(stored) + 1;
            *c
        };

        let store = self.store.clone();
        let counts = self.counts.clone();
        self.bg.spawn(async move {
            match store.increment_lookup_count(&key.0, &key.1).await {
                // Fold in increments made outside this process.
                Ok(v) => {
                    let mut counts = counts.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Some(c) = counts.get_mut(&key) {
                        *c = (*c).max(v);
                    }
                }
                Err(e) => {
                    log::warn!("error incrementing lookup count for {}/{}: {}", key.0, key.1, e);
                }
            }
        });

        n
    }

    /// Most looked-up words in a language.
    pub async fn top_words(&self, lang: &str, limit: i32) -> Result<Vec<PopularWord>, StoreError> {
        let rows = self.store.top_words(lang, limit).await?;
        Ok(rows
            .into_iter()
            .map(|(word, lookup_count)| PopularWord { word, lookup_count })
            .collect())
    }
}
