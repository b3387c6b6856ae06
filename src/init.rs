use std::{
    collections::HashMap,
    io::{BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::{
    cache::{parse_duration, Cache},
    config,
    corpus::{Corpus, CorpusError},
    enrich::{Analyzer, Analyzers, Enricher, HttpAnalyzer},
    models::{Config, Lang, LangMap},
    store,
};

/// Create a SQLite connection pool.
pub async fn init_db(
    db_path: &str,
    max_conns: u32,
    create: bool,
) -> Result<SqlitePool, sqlx::Error> {
    let mode = if create { "rwc" } else { "rw" };
    SqlitePoolOptions::new()
        .max_connections(max_conns.max(1))
        .connect(&format!("sqlite://{}?mode={}", db_path, mode))
        .await
}

/// Initialize logger.
pub fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .format(|buf, record| {
            let level = if record.level() != log::Level::Info {
                format!("[{}] ", record.level())
            } else {
                String::new()
            };
            writeln!(
                buf,
                "{} {}:{} {}{}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                level,
                record.args()
            )
        })
        .init();
}

/// Load and merge config files. Exits on error.
pub fn init_config(paths: &[PathBuf]) -> Config {
    config::load_all(paths).unwrap_or_else(|e| {
        log::error!("error loading config: {}", e);
        std::process::exit(1);
    })
}

/// Initialize languages from config.
pub fn init_langs(config: &Config) -> LangMap {
    let mut langs = LangMap::new();

    for (id, cfg) in &config.lang {
        let lang = Lang {
            id: id.clone(),
            name: if cfg.name.is_empty() {
                id.clone()
            } else {
                cfg.name.clone()
            },
            corpus: cfg.corpus.clone(),
            analyzer_url: cfg.analyzer_url.trim().to_string(),
        };

        log::info!(
            "language: {} (corpus: {}, analyzer: {})",
            id,
            lang.corpus,
            if lang.analyzer_url.is_empty() {
                "none"
            } else {
                &lang.analyzer_url
            }
        );
        langs.insert(id.clone(), lang);
    }

    if langs.is_empty() {
        log::warn!("no languages configured");
    }

    langs
}

/// Load the corpus of every language. Any error is fatal to startup.
pub fn init_corpora(langs: &LangMap) -> Result<HashMap<String, Corpus>, CorpusError> {
    let mut out = HashMap::with_capacity(langs.len());
    for (id, l) in langs {
        if l.corpus.is_empty() {
            return Err(CorpusError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no corpus file configured for '{}'", id),
            )));
        }
        out.insert(id.clone(), Corpus::from_file(Path::new(&l.corpus))?);
    }
    Ok(out)
}

/// Initialize the enrichment client: one HTTP analyzer per language with an
/// analyzer_url, and the optional result cache.
pub async fn init_enricher(
    config: &Config,
    langs: &LangMap,
) -> Result<Enricher, Box<dyn std::error::Error>> {
    let cfg = &config.enrichment;
    if !cfg.enabled {
        log::info!("enrichment disabled");
        return Ok(Enricher::disabled());
    }

    let timeout = parse_duration(&cfg.timeout)?;

    let mut analyzers = Analyzers::new();
    for (id, l) in langs {
        if l.analyzer_url.is_empty() {
            continue;
        }
        let a: Arc<dyn Analyzer> = Arc::new(HttpAnalyzer::new(&l.analyzer_url, timeout)?);
        analyzers.insert(id.clone(), a);
    }

    let cache = if cfg.cache.enabled {
        let c = Cache::new(&cfg.cache).await?;
        log::info!(
            "enrichment cache enabled (mode: {}, ttl: {})",
            cfg.cache.mode,
            cfg.cache.ttl
        );
        Some(c)
    } else {
        None
    };

    log::info!(
        "enrichment enabled for {} language(s) (timeout: {:?}, mode: {:?})",
        analyzers.len(),
        timeout,
        cfg.mode
    );

    Ok(Enricher::new(analyzers, cache, timeout))
}

/// Install database schema.
pub async fn install_schema(db_path: &str, prompt: bool) -> Result<(), Box<dyn std::error::Error>> {
    if prompt {
        println!("\n** Initialize new database at '{}'? **\n", db_path);
        print!("continue (y/n)?  ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().lock().read_line(&mut input)?;
        if input.trim().to_lowercase() != "y" {
            println!("install cancelled");
            return Ok(());
        }
    }

    let db = init_db(db_path, 1, true).await?;
    store::install(&db).await?;

    log::info!("successfully installed schema");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LangConfig;

    #[tokio::test]
    async fn test_init_enricher() {
        let mut config = Config::default();
        config.lang.insert(
            "la".to_string(),
            LangConfig {
                name: "Latin".to_string(),
                corpus: "la.csv".to_string(),
                analyzer_url: "http://127.0.0.1:1".to_string(),
            },
        );
        config.lang.insert(
            "grc".to_string(),
            LangConfig {
                corpus: "grc.csv".to_string(),
                ..Default::default()
            },
        );
        let langs = init_langs(&config);
        assert_eq!(langs["grc"].name, "grc");

        let e = init_enricher(&config, &langs).await.unwrap();
        assert!(!e.supports("la"));

        config.enrichment.enabled = true;
        config.enrichment.cache.mode = "memory".to_string();
        let e = init_enricher(&config, &langs).await.unwrap();
        assert!(e.supports("la"));
        assert!(!e.supports("grc"));

        config.enrichment.timeout = "soon".to_string();
        assert!(init_enricher(&config, &langs).await.is_err());
    }

    #[tokio::test]
    async fn test_init_corpora_and_install() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("la.csv");
        std::fs::write(&path, "-,rosa,noun,f,declension:1,\n^,a rose\n").unwrap();

        let mut langs = LangMap::new();
        langs.insert(
            "la".to_string(),
            Lang {
                id: "la".to_string(),
                corpus: path.display().to_string(),
                ..Default::default()
            },
        );
        let corpora = init_corpora(&langs).unwrap();
        assert_eq!(corpora["la"].len(), 1);

        langs.get_mut("la").unwrap().corpus = dir.path().join("missing.csv").display().to_string();
        assert!(init_corpora(&langs).is_err());

        let db_path = dir.path().join("test.db").display().to_string();
        install_schema(&db_path, false).await.unwrap();
        let db = init_db(&db_path, 2, false).await.unwrap();
        let st = store::SqliteStore::new(db);
        assert_eq!(store::Store::stats(&st).await.unwrap().entries, 0);
    }
}
