//! Command-line argument parsing (spec §6, SPEC_FULL §10.4).
//!
//! Top-level flags configure one run of the query/TUI/HTTP surface;
//! the `config` subcommand manages the on-disk config file without
//! hand-editing TOML.

use crate::config::Config;
use crate::model::{Filters, SortDir, SortKey};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::process::Command;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Deck - analytics and replay engine for agent coding sessions.
#[derive(Parser)]
#[command(name = "deck")]
#[command(version = VERSION)]
#[command(about = "Analytics and replay engine for agent coding sessions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Sort key: date, cost, tokens, duration
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort direction: asc, desc
    #[arg(long)]
    pub sort_dir: Option<String>,

    /// Filter by session status
    #[arg(long)]
    pub status: Option<String>,

    /// Filter by model name
    #[arg(long)]
    pub model: Option<String>,

    /// Filter by project
    #[arg(long)]
    pub project: Option<String>,

    /// Only sessions ending within this window, e.g. "7d", "2m"
    #[arg(long)]
    pub since: Option<String>,

    /// Only sessions starting on/after this date or timestamp
    #[arg(long)]
    pub from: Option<String>,

    /// Only sessions ending on/before this date or timestamp
    #[arg(long)]
    pub to: Option<String>,

    /// Jump straight into a session or group id
    #[arg(long)]
    pub session: Option<String>,

    /// TUI auto-refresh interval in seconds (0 disables)
    #[arg(long)]
    pub refresh: Option<u64>,

    /// TUI color theme name
    #[arg(long)]
    pub theme: Option<String>,

    /// Also start the HTTP API server
    #[arg(long)]
    pub web: bool,

    /// HTTP API port (implies --web)
    #[arg(long)]
    pub port: Option<u16>,

    /// Run the HTTP API only, without the TUI (implies --web)
    #[arg(long)]
    pub headless: bool,

    /// Enable facet extraction (goal/outcome/friction insights)
    #[arg(long)]
    pub insights: bool,

    /// Insights LLM provider: openai, anthropic, ollama
    #[arg(long)]
    pub insights_provider: Option<String>,

    /// Insights LLM model name
    #[arg(long)]
    pub insights_model: Option<String>,

    /// Insights LLM API key (overrides config/credentials file/env)
    #[arg(long)]
    pub insights_key: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Open config file in $EDITOR
        #[arg(long)]
        edit: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

impl Cli {
    /// Folds the CLI's filter-shaped flags into a `Filters`. Flags left
    /// unset keep `Filters::default()`'s values.
    pub fn filters(&self) -> anyhow::Result<Filters> {
        let mut filters = Filters::default();
        if let Some(raw) = &self.sort {
            filters.sort = match raw.as_str() {
                "date" => SortKey::Date,
                "cost" => SortKey::Cost,
                "tokens" => SortKey::Tokens,
                "duration" => SortKey::Duration,
                other => anyhow::bail!("unknown --sort value '{other}'"),
            };
        }
        if let Some(raw) = &self.sort_dir {
            filters.sort_dir = match raw.as_str() {
                "asc" => SortDir::Asc,
                "desc" => SortDir::Desc,
                other => anyhow::bail!("unknown --sort-dir value '{other}'"),
            };
        }
        filters.status = self.status.clone();
        filters.model = self.model.clone();
        filters.project = self.project.clone();
        filters.session = self.session.clone();
        Ok(filters)
    }
}

/// Handles `deck config ...`. Returns true if a subcommand was handled
/// (the caller should exit rather than run the normal query/TUI flow).
pub fn handle_cli(cli: &Cli) -> bool {
    match &cli.command {
        Some(Commands::Config { show, reset, edit, path }) => {
            if *path {
                handle_config_path();
            } else if *show {
                handle_config_show();
            } else if *reset {
                handle_config_reset();
            } else if *edit {
                handle_config_edit();
            } else {
                println!("Usage: deck config [--show|--reset|--edit|--path]");
            }
            true
        }
        None => false,
    }
}

fn handle_config_path() {
    match Config::config_path() {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("Error: could not determine config path");
            std::process::exit(1);
        }
    }
}

fn handle_config_show() {
    let config = Config::from_env();
    println!("# Effective configuration (env > file > defaults)");
    println!();
    println!("db_path = {:?}", config.db_path.display().to_string());
    println!("bind_addr = {:?}", config.bind_addr.to_string());
    println!("web_port = {}", config.web_port);
    println!("refresh_interval_secs = {}", config.refresh_interval_secs);
    println!(
        "pricing_overrides_path = {:?}",
        config.pricing_overrides_path.map(|p| p.display().to_string())
    );
    println!();
    println!("[insights]");
    println!("enabled = {}", config.insights.enabled);
    println!("provider = {:?}", config.insights.provider);
    println!("model = {:?}", config.insights.model);
    println!();
    println!("[logging]");
    println!("level = {:?}", config.log_level);

    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

fn handle_config_reset() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: could not determine config path");
        std::process::exit(1);
    };

    if path.exists() {
        eprint!("Config file exists at {}. Overwrite? [y/N] ", path.display());
        std::io::stderr().flush().unwrap();
        let mut input = String::new();
        std::io::stdin().read_line(&mut input).unwrap();
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return;
        }
        if let Err(e) = std::fs::remove_file(&path) {
            eprintln!("Error removing config: {e}");
            std::process::exit(1);
        }
    }

    Config::ensure_config_exists();
    println!("Config reset to defaults: {}", path.display());
}

fn handle_config_edit() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: could not determine config path");
        std::process::exit(1);
    };

    if !path.exists() {
        Config::ensure_config_exists();
        println!("Created new config file: {}", path.display());
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| if cfg!(windows) { "notepad".to_string() } else { "nano".to_string() });

    println!("Opening {} with {}", path.display(), editor);
    let status = Command::new(&editor).arg(&path).status();
    match status {
        Ok(s) if s.success() => {}
        Ok(s) => {
            eprintln!("Editor exited with status: {s}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to launch editor '{editor}': {e}");
            eprintln!("Set $EDITOR to your preferred editor");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn filters_defaults_when_no_flags_set() {
        let cli = Cli::parse_from(["deck"]);
        let filters = cli.filters().unwrap();
        assert_eq!(filters.sort, SortKey::Date);
        assert_eq!(filters.sort_dir, SortDir::Desc);
        assert!(filters.status.is_none());
    }

    #[test]
    fn filters_reject_unknown_sort() {
        let cli = Cli::parse_from(["deck", "--sort", "bogus"]);
        assert!(cli.filters().is_err());
    }

    #[test]
    fn filters_apply_status_and_model() {
        let cli = Cli::parse_from(["deck", "--status", "failed", "--model", "claude-4.5-sonnet"]);
        let filters = cli.filters().unwrap();
        assert_eq!(filters.status.as_deref(), Some("failed"));
        assert_eq!(filters.model.as_deref(), Some("claude-4.5-sonnet"));
    }
}
