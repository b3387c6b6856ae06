use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePool, FromRow};

use crate::{
    models::{q, schema, CachedEntry, FeatureMap, ParseError, StringArray},
    normalize::normalize,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(#[from] ParseError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not found")]
    NotFound,
}

/// Cached entry statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub entries: i64,
    pub enriched: i64,
    #[serde(default)]
    pub languages: HashMap<String, i64>,
}

/// Durable store of resolved entries, unique per (language, normalized word).
/// Words passed in are normalized by the store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, lang: &str, word: &str) -> Result<Option<CachedEntry>, StoreError>;

    /// Insert or promote an entry. Never changes the lookup count.
    async fn put(&self, entry: &CachedEntry) -> Result<(), StoreError>;

    /// Atomically increment and return the lookup count.
    async fn increment_lookup_count(&self, lang: &str, word: &str) -> Result<i64, StoreError>;

    /// Entries whose normalized word contains `query`, most looked-up first,
    /// then in insertion order.
    async fn search(&self, lang: &str, query: &str, limit: i32)
        -> Result<Vec<CachedEntry>, StoreError>;

    /// (word, lookup count) pairs, most looked-up first.
    async fn top_words(&self, lang: &str, limit: i32) -> Result<Vec<(String, i64)>, StoreError>;

    async fn stats(&self) -> Result<Stats, StoreError>;
}

/// Raw `entries` row.
#[derive(Debug, FromRow)]
struct EntryRow {
    language: String,
    word: String,
    normalized_word: String,
    lemma: String,
    headword: String,
    part_of_speech: String,
    gender: Option<String>,
    inflection_class: Option<String>,
    senses: StringArray,
    notes: String,
    features: FeatureMap,
    confidence: Option<f64>,
    provenance: String,
    enriched_at: Option<DateTime<Utc>>,
    lookup_count: i64,
}

impl TryFrom<EntryRow> for CachedEntry {
    type Error = StoreError;

    fn try_from(r: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            language: r.language,
            word: r.word,
            normalized_word: r.normalized_word,
            lemma: r.lemma,
            headword: r.headword,
            part_of_speech: r.part_of_speech,
            gender: r.gender.as_deref().map(str::parse).transpose()?,
            inflection_class: r.inflection_class.as_deref().map(str::parse).transpose()?,
            senses: r.senses.0,
            notes: r.notes,
            features: r.features.0,
            confidence: r.confidence,
            provenance: r.provenance.parse()?,
            enriched_at: r.enriched_at,
            lookup_count: r.lookup_count,
        })
    }
}

/// SQLite-backed store.
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

/// Create the schema on a fresh database.
pub async fn install(db: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(&schema.pragma.query).execute(db).await?;
    sqlx::query(&schema.schema.query).execute(db).await?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, lang: &str, word: &str) -> Result<Option<CachedEntry>, StoreError> {
        let row: Option<EntryRow> = sqlx::query_as(&q.get_entry.query)
            .bind(lang)
            .bind(normalize(word))
            .fetch_optional(&self.db)
            .await?;

        row.map(CachedEntry::try_from).transpose()
    }

    async fn put(&self, e: &CachedEntry) -> Result<(), StoreError> {
        sqlx::query(&q.upsert_entry.query)
            .bind(&e.language)
            .bind(&e.word)
            .bind(&e.normalized_word)
            .bind(&e.lemma)
            .bind(&e.headword)
            .bind(&e.part_of_speech)
            .bind(e.gender.map(|g| g.as_str()))
            .bind(e.inflection_class.map(|c| c.to_string()))
            .bind(StringArray(e.senses.clone()))
            .bind(&e.notes)
            .bind(FeatureMap(e.features.clone()))
            .bind(e.confidence)
            .bind(e.provenance.as_str())
            .bind(e.enriched_at)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn increment_lookup_count(&self, lang: &str, word: &str) -> Result<i64, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(&q.increment_lookup_count.query)
            .bind(lang)
            .bind(normalize(word))
            .fetch_optional(&self.db)
            .await?;

        row.map(|(n,)| n).ok_or(StoreError::NotFound)
    }

    async fn search(
        &self,
        lang: &str,
        query: &str,
        limit: i32,
    ) -> Result<Vec<CachedEntry>, StoreError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<EntryRow> = sqlx::query_as(&q.search_entries.query)
            .bind(lang)
            .bind(normalize(query))
            .bind(limit)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(CachedEntry::try_from).collect()
    }

    async fn top_words(&self, lang: &str, limit: i32) -> Result<Vec<(String, i64)>, StoreError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<(String, i64)> = sqlx::query_as(&q.get_top_words.query)
            .bind(lang)
            .bind(limit)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn stats(&self) -> Result<Stats, StoreError> {
        let row: (String,) = sqlx::query_as(&q.get_stats.query)
            .fetch_one(&self.db)
            .await?;
        Ok(serde_json::from_str(&row.0)?)
    }
}
