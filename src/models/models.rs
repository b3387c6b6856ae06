use std::{collections::BTreeMap, collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{
    encode::IsNull,
    error::BoxDynError,
    sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef},
    Decode, Encode, Sqlite, Type,
};

use crate::{cache::CacheConfig, normalize::normalize};

pub const PROVENANCE_CACHE: &str = "cache";
pub const PROVENANCE_STATIC: &str = "static";
pub const PROVENANCE_ENRICHED: &str = "static+enrichment";

/// JSON array wrapper for SQLite TEXT columns storing JSON arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringArray(pub Vec<String>);

impl From<Vec<String>> for StringArray {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

impl Type<Sqlite> for StringArray {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, Sqlite> for StringArray {
    fn encode_by_ref(&self, buf: &mut Vec<SqliteArgumentValue<'q>>) -> Result<IsNull, BoxDynError> {
        let json = serde_json::to_string(&self.0)?;
        <String as Encode<Sqlite>>::encode(json, buf)
    }
}

impl<'r> Decode<'r, Sqlite> for StringArray {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Sqlite>>::decode(value)?;
        if s.is_empty() {
            return Ok(Self(Vec::new()));
        }
        let v: Vec<String> = serde_json::from_str(&s)?;
        Ok(Self(v))
    }
}

/// Morphological features (feature name -> value). Keys are present only when
/// the feature applies to the word; there is no "unknown" value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMap(pub BTreeMap<String, String>);

impl Type<Sqlite> for FeatureMap {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, Sqlite> for FeatureMap {
    fn encode_by_ref(&self, buf: &mut Vec<SqliteArgumentValue<'q>>) -> Result<IsNull, BoxDynError> {
        let json = serde_json::to_string(&self.0)?;
        <String as Encode<Sqlite>>::encode(json, buf)
    }
}

impl<'r> Decode<'r, Sqlite> for FeatureMap {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Sqlite>>::decode(value)?;
        if s.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self(serde_json::from_str(&s)?))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseError {
    kind: &'static str,
    value: String,
}

impl ParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// How a served entry was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    #[serde(rename = "cache")]
    Cache,
    #[serde(rename = "static")]
    Static,
    #[serde(rename = "static+enrichment")]
    StaticEnrichment,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => PROVENANCE_CACHE,
            Self::Static => PROVENANCE_STATIC,
            Self::StaticEnrichment => PROVENANCE_ENRICHED,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            PROVENANCE_CACHE => Ok(Self::Cache),
            PROVENANCE_STATIC => Ok(Self::Static),
            PROVENANCE_ENRICHED => Ok(Self::StaticEnrichment),
            _ => Err(ParseError::new("provenance", s)),
        }
    }
}

/// Grammatical gender of a nominal headword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Masculine,
    Feminine,
    Neuter,
    Common,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Masculine => "masculine",
            Self::Feminine => "feminine",
            Self::Neuter => "neuter",
            Self::Common => "common",
        }
    }
}

impl FromStr for Gender {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "m" | "masc" | "masculine" => Ok(Self::Masculine),
            "f" | "fem" | "feminine" => Ok(Self::Feminine),
            "n" | "neut" | "neuter" => Ok(Self::Neuter),
            "c" | "common" => Ok(Self::Common),
            _ => Err(ParseError::new("gender", s)),
        }
    }
}

/// Declension or conjugation class of a headword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum InflectionClass {
    Declension(u8),
    Conjugation(u8),
    Irregular,
}

impl fmt::Display for InflectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declension(n) => write!(f, "declension:{}", n),
            Self::Conjugation(n) => write!(f, "conjugation:{}", n),
            Self::Irregular => f.write_str("irregular"),
        }
    }
}

impl FromStr for InflectionClass {
    type Err = ParseError;

    /// Accepts "declension:1", "conjugation:3", "irregular" and
    /// the longhand "1st declension" / "3rd conjugation".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "irregular" {
            return Ok(Self::Irregular);
        }

        let (kind, num) = if let Some((kind, num)) = s.split_once(':') {
            (kind.trim(), num.trim())
        } else if let Some((num, kind)) = s.split_once(' ') {
            (
                kind.trim(),
                num.trim_end_matches(|c: char| c.is_ascii_alphabetic()),
            )
        } else {
            return Err(ParseError::new("inflection class", &s));
        };

        let n: u8 = match num.parse() {
            Ok(n) if n > 0 => n,
            _ => return Err(ParseError::new("inflection class", &s)),
        };

        match kind {
            "declension" | "decl" => Ok(Self::Declension(n)),
            "conjugation" | "conj" => Ok(Self::Conjugation(n)),
            _ => Err(ParseError::new("inflection class", &s)),
        }
    }
}

impl From<InflectionClass> for String {
    fn from(c: InflectionClass) -> Self {
        c.to_string()
    }
}

impl TryFrom<String> for InflectionClass {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Immutable dictionary entry from the static corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexicalEntry {
    pub headword: String,
    pub part_of_speech: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inflection_class: Option<InflectionClass>,
    /// Senses in corpus order. The primary sense is first.
    pub senses: Vec<String>,
    pub notes: String,
}

/// Morphological analysis of a single word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    pub lemma: String,
    pub part_of_speech: String,
    pub features: BTreeMap<String, String>,
    pub confidence: f64,
}

/// A resolved, persisted dictionary entry as served to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry {
    pub language: String,
    /// Surface form of the request that created the entry.
    pub word: String,
    pub normalized_word: String,
    pub lemma: String,
    pub headword: String,
    pub part_of_speech: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inflection_class: Option<InflectionClass>,
    pub senses: Vec<String>,
    pub notes: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched_at: Option<DateTime<Utc>>,
    pub lookup_count: i64,
}

impl CachedEntry {
    /// Build an un-enriched entry for a corpus hit.
    pub fn provisional(language: &str, word: &str, lex: &LexicalEntry) -> Self {
        Self {
            language: language.to_string(),
            word: word.to_string(),
            normalized_word: normalize(word),
            lemma: word.to_string(),
            headword: lex.headword.clone(),
            part_of_speech: lex.part_of_speech.clone(),
            gender: lex.gender,
            inflection_class: lex.inflection_class,
            senses: lex.senses.clone(),
            notes: lex.notes.clone(),
            features: BTreeMap::new(),
            confidence: None,
            provenance: Provenance::Static,
            enriched_at: None,
            lookup_count: 0,
        }
    }

    /// Merge a morphological analysis into the entry. Corpus fields take
    /// precedence; the analysis only fills what the corpus leaves empty.
    pub fn enrich(&mut self, r: EnrichmentResult, at: DateTime<Utc>) {
        if !r.lemma.is_empty() {
            self.lemma = r.lemma;
        }
        if self.part_of_speech.is_empty() {
            self.part_of_speech = r.part_of_speech;
        }
        self.features = r.features;
        self.confidence = Some(r.confidence);
        self.provenance = Provenance::StaticEnrichment;
        self.enriched_at = Some(at);
    }

    pub fn is_enriched(&self) -> bool {
        self.provenance == Provenance::StaticEnrichment
    }

    /// Primary sense.
    pub fn definition(&self) -> &str {
        self.senses.first().map(String::as_str).unwrap_or("")
    }
}

/// Result of a single-word lookup.
#[derive(Debug, Clone, Serialize)]
pub struct Lookup {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<CachedEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl Lookup {
    pub fn found(entry: CachedEntry, provenance: Provenance) -> Self {
        Self {
            found: true,
            entry: Some(entry),
            provenance: Some(provenance),
        }
    }

    pub fn not_found() -> Self {
        Self {
            found: false,
            entry: None,
            provenance: None,
        }
    }
}

/// Autocomplete suggestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub word: String,
    pub lemma: String,
    pub part_of_speech: String,
    pub definition: String,
}

impl From<&CachedEntry> for SearchHit {
    fn from(e: &CachedEntry) -> Self {
        Self {
            word: e.word.clone(),
            lemma: e.lemma.clone(),
            part_of_speech: e.part_of_speech.clone(),
            definition: e.definition().to_string(),
        }
    }
}

impl From<&LexicalEntry> for SearchHit {
    fn from(e: &LexicalEntry) -> Self {
        Self {
            word: e.headword.clone(),
            lemma: e.headword.clone(),
            part_of_speech: e.part_of_speech.clone(),
            definition: e.senses.first().cloned().unwrap_or_default(),
        }
    }
}

/// Most looked-up word.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularWord {
    pub word: String,
    pub lookup_count: i64,
}

/// Language configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Lang {
    pub id: String,
    pub name: String,
    pub corpus: String,
    pub analyzer_url: String,
}

pub type LangMap = HashMap<String, Lang>;

/// When the enrichment step of a cold lookup runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichMode {
    /// Inside the cold lookup, before the entry is persisted and served.
    #[default]
    Inline,
    /// After the static entry is persisted and served, as a detached task.
    Background,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub lang: HashMap<String, LangConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub admin_username: String,
    #[serde(default)]
    pub admin_password: String,
    #[serde(default = "default_search_limit")]
    pub default_search_limit: i32,
    #[serde(default = "default_max_search_limit")]
    pub max_search_limit: i32,
    #[serde(default = "default_popular_limit")]
    pub default_popular_limit: i32,
}

fn default_search_limit() -> i32 {
    10
}

fn default_max_search_limit() -> i32 {
    50
}

fn default_popular_limit() -> i32 {
    20
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            admin_username: String::new(),
            admin_password: String::new(),
            default_search_limit: default_search_limit(),
            max_search_limit: default_max_search_limit(),
            default_popular_limit: default_popular_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DbConfig {
    #[serde(default)]
    pub max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Deadline for a single analyzer call (e.g., "2s", "1500ms").
    #[serde(default = "default_enrich_timeout")]
    pub timeout: String,

    #[serde(default)]
    pub mode: EnrichMode,

    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_enrich_timeout() -> String {
    "2s".to_string()
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: default_enrich_timeout(),
            mode: EnrichMode::default(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LangConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub corpus: String,
    #[serde(default)]
    pub analyzer_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn puella() -> LexicalEntry {
        LexicalEntry {
            headword: "puella".to_string(),
            part_of_speech: "noun".to_string(),
            gender: Some(Gender::Feminine),
            inflection_class: Some(InflectionClass::Declension(1)),
            senses: vec!["a girl, maiden".to_string()],
            notes: String::new(),
        }
    }

    #[test]
    fn test_provenance_round_trips_as_str() {
        for p in [
            Provenance::Cache,
            Provenance::Static,
            Provenance::StaticEnrichment,
        ] {
            assert_eq!(p.as_str().parse::<Provenance>().unwrap(), p);
        }
        assert_eq!(
            serde_json::to_string(&Provenance::StaticEnrichment).unwrap(),
            "\"static+enrichment\""
        );
        assert!("enriched".parse::<Provenance>().is_err());
    }

    #[test]
    fn test_parse_inflection_class() {
        assert_eq!(
            "declension:1".parse::<InflectionClass>().unwrap(),
            InflectionClass::Declension(1)
        );
        assert_eq!(
            "3rd Conjugation".parse::<InflectionClass>().unwrap(),
            InflectionClass::Conjugation(3)
        );
        assert_eq!(
            "irregular".parse::<InflectionClass>().unwrap(),
            InflectionClass::Irregular
        );
        assert!("declension:0".parse::<InflectionClass>().is_err());
        assert!("weird".parse::<InflectionClass>().is_err());
        assert!("1st mood".parse::<InflectionClass>().is_err());
    }

    #[test]
    fn test_parse_gender() {
        assert_eq!("f".parse::<Gender>().unwrap(), Gender::Feminine);
        assert_eq!("Masculine".parse::<Gender>().unwrap(), Gender::Masculine);
        assert!("x".parse::<Gender>().is_err());
    }

    #[test]
    fn test_provisional_entry() {
        let e = CachedEntry::provisional("la", "Puella", &puella());
        assert_eq!(e.word, "Puella");
        assert_eq!(e.normalized_word, "puella");
        assert_eq!(e.lemma, "Puella");
        assert_eq!(e.provenance, Provenance::Static);
        assert!(e.enriched_at.is_none());
        assert_eq!(e.definition(), "a girl, maiden");
    }

    #[test]
    fn test_enrich_merges_and_promotes() {
        let mut e = CachedEntry::provisional("la", "puellae", &puella());
        e.part_of_speech.clear();

        let mut features = BTreeMap::new();
        features.insert("Case".to_string(), "Genitive".to_string());
        e.enrich(
            EnrichmentResult {
                lemma: "puella".to_string(),
                part_of_speech: "NOUN".to_string(),
                features,
                confidence: 0.9,
            },
            Utc::now(),
        );

        assert!(e.is_enriched());
        assert!(e.enriched_at.is_some());
        assert_eq!(e.lemma, "puella");
        assert_eq!(e.part_of_speech, "NOUN");
        assert_eq!(e.features.get("Case").map(String::as_str), Some("Genitive"));
        assert!(!e.features.contains_key("Number"));
    }

    #[test]
    fn test_entry_json_omits_absent_fields() {
        let e = CachedEntry::provisional("la", "puella", &puella());
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["provenance"], "static");
        assert_eq!(v["inflectionClass"], "declension:1");
        assert!(v.get("enrichedAt").is_none());
        assert!(v.get("features").is_none());
    }
}
