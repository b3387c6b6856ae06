mod background;
mod cache;
mod cli;
mod config;
mod corpus;
mod enrich;
mod handlers;
mod http;
mod init;
mod manager;
mod models;
mod normalize;
mod popularity;
mod store;

use std::{path::Path, sync::Arc};

use clap::Parser;

use cli::Commands;
use handlers::{Consts, Ctx};
use manager::{Manager, ManagerConfig};
use store::SqliteStore;

#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() {
    init::init_logger();

    let cli = cli::Cli::parse();

    // DB path from --db flag.
    let db_path = cli.db.to_string_lossy().to_string();

    // Handle CLI commands.
    if let Some(cmd) = cli.command {
        match cmd {
            // Generate a new config file.
            Commands::NewConfig { path } => {
                if let Err(e) = config::generate_sample(&path) {
                    log::error!("error generating config: {}", e);
                    std::process::exit(1);
                }
                log::info!("config file generated: {}", path.display());
                return;
            }

            // Create a new SQLite database with schema.
            Commands::Install { yes } => {
                if cli.db.exists() {
                    log::error!("database '{}' already exists", cli.db.display());
                    std::process::exit(1);
                }
                if let Err(e) = init::install_schema(&db_path, !yes).await {
                    log::error!("error installing schema: {}", e);
                    std::process::exit(1);
                }
                return;
            }

            // One-shot lookup through the full orchestrator.
            Commands::Lookup { lang, word } => {
                check_db(&cli.db);

                let config = init::init_config(&cli.config);
                let langs = init::init_langs(&config);
                let (mgr, enricher) = init_manager(&config, &langs, &db_path).await;

                let res = mgr.lookup(&lang, &word).await;
                mgr.settle().await;
                enricher.close().await;

                match res {
                    Ok(out) => match serde_json::to_string_pretty(&out) {
                        Ok(s) => println!("{}", s),
                        Err(e) => {
                            log::error!("error encoding result: {}", e);
                            std::process::exit(1);
                        }
                    },
                    Err(e) => {
                        log::error!("error looking up '{}': {}", word, e);
                        std::process::exit(1);
                    }
                }
                return;
            }
        }
    }

    // For server mode, DB must exist.
    check_db(&cli.db);

    // Load config.
    let config = init::init_config(&cli.config);
    let langs = init::init_langs(&config);
    let (mgr, enricher) = init_manager(&config, &langs, &db_path).await;

    // Report analyzer readiness. Not-ready analyzers aren't fatal.
    enricher.check().await;

    // Setup the global app context used in HTTP handlers.
    let ctx = Arc::new(Ctx {
        mgr: mgr.clone(),
        langs,
        version: env!("VERSION").to_string(),

        // Global constants.
        consts: Consts {
            admin_username: config.app.admin_username,
            admin_password: config.app.admin_password,
            enrichment: config.enrichment.enabled,
            default_search_limit: config.app.default_search_limit,
            max_search_limit: config.app.max_search_limit,
            default_popular_limit: config.app.default_popular_limit,
        },
    });

    // Start the HTTP server.
    let routes = http::init_handlers(ctx);
    let addr = if config.app.address.is_empty() {
        "0.0.0.0:9000".to_string()
    } else {
        config.app.address
    };

    log::info!("starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            log::error!("error listening on {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, routes)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        log::error!("server error: {}", e);
        std::process::exit(1);
    }

    // Let pending counters and promotions land before exiting.
    log::info!("shutting down");
    mgr.settle().await;
    enricher.close().await;
}

/// Wire up the store, corpora and enrichment client into a Manager. Exits on error.
async fn init_manager(
    config: &models::Config,
    langs: &models::LangMap,
    db_path: &str,
) -> (Arc<Manager>, Arc<enrich::Enricher>) {
    let corpora = match init::init_corpora(langs) {
        Ok(c) => c,
        Err(e) => {
            log::error!("error loading corpus: {}", e);
            std::process::exit(1);
        }
    };

    let db = match init::init_db(db_path, config.db.max_conns, false).await {
        Ok(pool) => pool,
        Err(e) => {
            log::error!("error connecting to database: {}", e);
            std::process::exit(1);
        }
    };

    let enricher = match init::init_enricher(config, langs).await {
        Ok(e) => Arc::new(e),
        Err(e) => {
            log::error!("error initializing enrichment: {}", e);
            std::process::exit(1);
        }
    };

    let cfg = ManagerConfig {
        enrich_mode: config.enrichment.mode,
    };
    let mgr = Manager::new(
        Arc::new(SqliteStore::new(db)),
        enricher.clone(),
        corpora,
        cfg,
    );

    (Arc::new(mgr), enricher)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("error listening for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Check if the DB file exists and exit with error message if not.
fn check_db(path: &Path) {
    if !path.exists() {
        log::error!(
            "database '{}' not found. Run `install` to create a new one.",
            path.display()
        );
        std::process::exit(1);
    }
}
