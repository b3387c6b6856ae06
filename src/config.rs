use std::path::{Path, PathBuf};

use crate::models::Config;

const SAMPLE_CONFIG: &str = include_str!("../config.sample.toml");

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("error reading {0}: {1}")]
    Io(String, std::io::Error),
    #[error("error parsing {0}: {1}")]
    Toml(String, toml::de::Error),
    #[error("no config files specified")]
    Empty,
    #[error("config file already exists: {0}")]
    Exists(String),
}

/// Load and merge one or more config files in order.
pub fn load_all(paths: &[PathBuf]) -> Result<Config, ConfigError> {
    let mut config: Option<Config> = None;

    for path in paths {
        log::info!("loading config: {}", path.display());
        let c = read_file(path)?;
        match config {
            Some(ref mut existing) => merge(existing, c),
            None => config = Some(c),
        }
    }

    config.ok_or(ConfigError::Empty)
}

/// Write the sample config file.
pub fn generate_sample(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::Exists(path.display().to_string()));
    }
    std::fs::write(path, SAMPLE_CONFIG).map_err(|e| ConfigError::Io(path.display().to_string(), e))
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let name = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(name.clone(), e))?;
    parse(&name, &content)
}

fn parse(name: &str, content: &str) -> Result<Config, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Toml(name.to_string(), e))
}

/// Merge the given src config into dest. Non-empty src values win.
fn merge(dest: &mut Config, src: Config) {
    // App.
    if !src.app.address.is_empty() {
        dest.app.address = src.app.address;
    }
    if !src.app.admin_username.is_empty() {
        dest.app.admin_username = src.app.admin_username;
    }
    if !src.app.admin_password.is_empty() {
        dest.app.admin_password = src.app.admin_password;
    }
    if src.app.default_search_limit > 0 {
        dest.app.default_search_limit = src.app.default_search_limit;
    }
    if src.app.max_search_limit > 0 {
        dest.app.max_search_limit = src.app.max_search_limit;
    }
    if src.app.default_popular_limit > 0 {
        dest.app.default_popular_limit = src.app.default_popular_limit;
    }

    // DB.
    if src.db.max_conns > 0 {
        dest.db.max_conns = src.db.max_conns;
    }

    // Enrichment. An enabled table replaces the earlier one whole.
    if src.enrichment.enabled {
        dest.enrichment = src.enrichment;
    }

    // Languages, by id.
    for (id, lang) in src.lang {
        dest.lang.insert(id, lang);
    }
}
