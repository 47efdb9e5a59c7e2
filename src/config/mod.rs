//! Configuration for the Deck analytics engine.
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/deck/config.toml)
//! 3. Built-in defaults (lowest priority)

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[cfg(test)]
mod tests;

/// Insights (facet extraction) settings.
#[derive(Debug, Clone)]
pub struct Insights {
    pub enabled: bool,
    pub provider: String,
    pub model: String,
    pub key: Option<String>,
}

impl Default for Insights {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "anthropic".to_string(),
            model: "claude-3-5-haiku".to_string(),
            key: None,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite node store.
    pub db_path: PathBuf,

    /// Address the HTTP API binds to (loopback-only, spec §4.8).
    pub bind_addr: SocketAddr,

    /// HTTP API port, also exposed standalone for `--port` overrides.
    pub web_port: u16,

    /// TUI auto-refresh interval. 0 disables.
    pub refresh_interval_secs: u64,

    /// Insights (facet extraction) settings.
    pub insights: Insights,

    /// Path to a JSON pricing override file (spec §6).
    pub pricing_overrides_path: Option<PathBuf>,

    /// `tracing` filter level, overridden by `RUST_LOG` when set.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: "127.0.0.1:7777".parse().unwrap(),
            web_port: 7777,
            refresh_interval_secs: 10,
            insights: Insights::default(),
            pricing_overrides_path: None,
            log_level: "info".to_string(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deck")
        .join("deck.db")
}

/// `[insights]` section of the TOML config file.
#[derive(Debug, Deserialize, Default)]
struct FileInsights {
    enabled: Option<bool>,
    provider: Option<String>,
    model: Option<String>,
    key: Option<String>,
}

/// `[logging]` section of the TOML config file.
#[derive(Debug, Deserialize, Default)]
struct FileLogging {
    level: Option<String>,
}

/// Config file structure (subset of `Config` that makes sense to persist).
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    db_path: Option<String>,
    bind_addr: Option<String>,
    web_port: Option<u16>,
    refresh_interval_secs: Option<u64>,
    pricing_overrides_path: Option<String>,
    insights: Option<FileInsights>,
    logging: Option<FileLogging>,
}

const CONFIG_TEMPLATE: &str = r#"# Deck configuration file.
# Every key is optional; omitted keys fall back to built-in defaults.
# Environment variables always override this file: DECK_DB_PATH,
# DECK_BIND_ADDR, DECK_WEB_PORT, DECK_REFRESH_SECS, DECK_PRICING_OVERRIDES,
# DECK_INSIGHTS_KEY, RUST_LOG.

# db_path = "/home/you/.local/share/deck/deck.db"
# bind_addr = "127.0.0.1:7777"
# web_port = 7777
# refresh_interval_secs = 10
# pricing_overrides_path = "/home/you/.config/deck/pricing.json"

[insights]
# enabled = false
# provider = "anthropic"   # "openai" | "anthropic" | "ollama"
# model = "claude-3-5-haiku"
# key = "sk-..."

[logging]
# level = "info"
"#;

impl Config {
    /// `~/.config/deck/config.toml`.
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("deck").join("config.toml"))
    }

    /// Writes a commented default template if no config file exists yet.
    /// Never overwrites an existing file; failures are silent since the
    /// config file is optional.
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };
        if path.exists() {
            return;
        }
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        let _ = std::fs::write(&path, CONFIG_TEMPLATE);
    }

    fn load_file_config() -> FileConfig {
        let Some(path) = Self::config_path() else {
            return FileConfig::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("config error: failed to parse {}: {e}", path.display());
                eprintln!("delete the file and restart to regenerate the default template");
                std::process::exit(1);
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => {
                eprintln!("config error: cannot read {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    }

    /// Loads configuration: env vars > config file > defaults.
    pub fn from_env() -> Self {
        let file = Self::load_file_config();
        let defaults = Self::default();

        let db_path = std::env::var("DECK_DB_PATH")
            .ok()
            .or(file.db_path)
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let bind_addr = std::env::var("DECK_BIND_ADDR")
            .ok()
            .or(file.bind_addr)
            .map(|s| s.parse().expect("invalid bind address"))
            .unwrap_or(defaults.bind_addr);

        let web_port = std::env::var("DECK_WEB_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(file.web_port)
            .unwrap_or(defaults.web_port);

        let refresh_interval_secs = std::env::var("DECK_REFRESH_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(file.refresh_interval_secs)
            .unwrap_or(defaults.refresh_interval_secs);

        let pricing_overrides_path = std::env::var("DECK_PRICING_OVERRIDES")
            .ok()
            .or(file.pricing_overrides_path)
            .map(PathBuf::from)
            .or(defaults.pricing_overrides_path);

        let file_insights = file.insights.unwrap_or_default();
        let insights = Insights {
            enabled: file_insights.enabled.unwrap_or(defaults.insights.enabled),
            provider: file_insights.provider.unwrap_or(defaults.insights.provider),
            model: file_insights.model.unwrap_or(defaults.insights.model),
            key: std::env::var("DECK_INSIGHTS_KEY").ok().or(file_insights.key),
        };

        let log_level = file
            .logging
            .and_then(|l| l.level)
            .unwrap_or(defaults.log_level);

        Self {
            db_path,
            bind_addr,
            web_port,
            refresh_interval_secs,
            insights,
            pricing_overrides_path,
            log_level,
        }
    }
}
