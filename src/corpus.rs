use std::{collections::HashMap, io::Read, path::Path};

use regex::Regex;

use crate::{
    models::{Gender, InflectionClass, LexicalEntry},
    normalize::normalize,
};

const TYPE_ENTRY: &str = "-";
const TYPE_SENSE: &str = "^";

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {0}: {1}")]
    Validation(usize, String),
    #[error("corpus has no entries")]
    Empty,
}

/// Immutable in-memory index over a bulk lexical corpus. Built once and only
/// read afterwards.
#[derive(Debug, Default)]
pub struct Corpus {
    /// Entries in load order.
    entries: Vec<LexicalEntry>,
    /// Normalized headwords, parallel to `entries`.
    normalized: Vec<String>,
    /// Exact headword -> first entry index.
    exact: HashMap<String, usize>,
    /// Normalized headword -> first entry index.
    folded: HashMap<String, usize>,
}

impl Corpus {
    pub fn new(entries: Vec<LexicalEntry>) -> Self {
        let mut exact = HashMap::with_capacity(entries.len());
        let mut folded = HashMap::with_capacity(entries.len());
        let mut normalized = Vec::with_capacity(entries.len());

        for (i, e) in entries.iter().enumerate() {
            let n = normalize(&e.headword);
            exact.entry(e.headword.clone()).or_insert(i);
            folded.entry(n.clone()).or_insert(i);
            normalized.push(n);
        }

        Self {
            entries,
            normalized,
            exact,
            folded,
        }
    }

    /// Load a corpus CSV file.
    pub fn from_file(path: &Path) -> Result<Self, CorpusError> {
        log::info!("loading corpus from {} ...", path.display());

        let file = std::fs::File::open(path)?;
        let corpus = Self::from_reader(file)?;

        log::info!(
            "loaded {} entries from {}",
            corpus.len(),
            path.display()
        );
        Ok(corpus)
    }

    /// Parse a headerless corpus CSV. Entry rows ("-") are
    /// `-,headword,part_of_speech,gender,inflection_class,notes` and each is
    /// followed by zero or more sense rows `^,sense`.
    pub fn from_reader<R: Read>(r: R) -> Result<Self, CorpusError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(r);

        let re_spaces = Regex::new(r"\s+").map_err(|e| CorpusError::Validation(0, e.to_string()))?;
        let clean = |s: Option<&str>| re_spaces.replace_all(s.unwrap_or("").trim(), " ").into_owned();

        let mut entries: Vec<LexicalEntry> = Vec::new();

        for result in reader.records() {
            let record = result?;

            // Line in the file where the record starts.
            let n = record.position().map_or(0, |p| p.line() as usize);

            match record.get(0).map(str::trim) {
                Some(TYPE_ENTRY) => {
                    let headword = clean(record.get(1));
                    if headword.is_empty() {
                        return Err(CorpusError::Validation(n, "empty headword".to_string()));
                    }

                    let gender = match clean(record.get(3)).as_str() {
                        "" => None,
                        g => Some(
                            g.parse::<Gender>()
                                .map_err(|e| CorpusError::Validation(n, e.to_string()))?,
                        ),
                    };
                    let inflection_class = match clean(record.get(4)).as_str() {
                        "" => None,
                        c => Some(
                            c.parse::<InflectionClass>()
                                .map_err(|e| CorpusError::Validation(n, e.to_string()))?,
                        ),
                    };

                    entries.push(LexicalEntry {
                        headword,
                        part_of_speech: clean(record.get(2)),
                        gender,
                        inflection_class,
                        senses: Vec::new(),
                        notes: clean(record.get(5)),
                    });
                }

                Some(TYPE_SENSE) => {
                    let Some(last) = entries.last_mut() else {
                        return Err(CorpusError::Validation(
                            n,
                            "first row should be of type '-'".to_string(),
                        ));
                    };

                    let sense = clean(record.get(1));
                    if sense.is_empty() {
                        return Err(CorpusError::Validation(n, "empty sense".to_string()));
                    }
                    last.senses.push(sense);
                }

                Some(t) => {
                    return Err(CorpusError::Validation(
                        n,
                        format!("unknown row type '{}'", t),
                    ))
                }
                None => continue,
            }
        }

        if entries.is_empty() {
            return Err(CorpusError::Empty);
        }

        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up a word. An exact headword match always wins over a match on
    /// the normalized form.
    pub fn lookup(&self, word: &str) -> Option<&LexicalEntry> {
        let idx = match self.exact.get(word) {
            Some(i) => *i,
            None => *self.folded.get(&normalize(word))?,
        };
        self.entries.get(idx)
    }

    /// Entries whose normalized headword contains the normalized query,
    /// lazily and in load order.
    pub fn matches<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a LexicalEntry> + 'a {
        let q = normalize(query);
        self.normalized
            .iter()
            .zip(self.entries.iter())
            .filter(move |(n, _)| n.contains(&q))
            .map(|(_, e)| e)
    }
}
