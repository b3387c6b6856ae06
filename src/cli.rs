use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lexicache")]
#[command(about = "lexicache - Self-improving dictionary lookup service")]
#[command(version = env!("VERSION"))]
pub struct Cli {
    /// Path to one or more config files (merged in order).
    #[arg(long, default_value = "config.toml", action = clap::ArgAction::Append)]
    pub config: Vec<PathBuf>,

    /// Path to SQLite database file.
    #[arg(long, default_value = "data.db")]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a sample config file.
    NewConfig {
        /// Output path for config file.
        #[arg(short, long, default_value = "config.toml")]
        path: PathBuf,
    },

    /// Run first time DB installation.
    Install {
        /// Assume 'yes' to any manual prompts during installation.
        #[arg(long)]
        yes: bool,
    },

    /// Look up a word and print the result as JSON.
    Lookup {
        /// Language ID as configured in [lang.*].
        #[arg(long)]
        lang: String,

        /// Word to look up.
        word: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let cli = Cli::parse_from([
            "lexicache",
            "--config",
            "a.toml",
            "--config",
            "b.toml",
            "--db",
            "x.db",
            "lookup",
            "--lang",
            "la",
            "puella",
        ]);
        assert_eq!(cli.config, vec![PathBuf::from("a.toml"), PathBuf::from("b.toml")]);
        assert_eq!(cli.db, PathBuf::from("x.db"));
        assert!(matches!(
            cli.command,
            Some(Commands::Lookup { ref lang, ref word }) if lang == "la" && word == "puella"
        ));

        let cli = Cli::parse_from(["lexicache"]);
        assert_eq!(cli.config, vec![PathBuf::from("config.toml")]);
        assert!(cli.command.is_none());
    }
}
