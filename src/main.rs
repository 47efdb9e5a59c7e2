// Deck - analytics and replay engine for agent coding sessions.
//
// Reads the content-addressed node store an ingesting proxy writes to,
// and serves it back as session analytics through a TUI and an optional
// read-only HTTP API. Never writes to the node table itself; the only
// state this binary owns is the facets table (spec §3-§6).

mod assembler;
mod cancel;
mod cli;
mod config;
mod error;
mod facets;
mod http;
mod logging;
mod model;
mod pricing;
mod query;
mod startup;
mod store;
mod tui;
mod util;

use anyhow::{Context, Result};
use cancel::CancellationToken;
use clap::Parser;
use cli::Cli;
use config::Config;
use facets::{has_credentials, FacetWorker, LlmCaller, LlmConfig, Provider};
use logging::{LogBuffer, TuiLogLayer};
use pricing::Catalog;
use query::QueryEngine;
use std::sync::Arc;
use store::{NodeStore, SqliteNodeStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli::handle_cli(&cli) {
        return Ok(());
    }

    Config::ensure_config_exists();
    let config = Config::from_env();

    let headless = cli.headless;
    let web_enabled = cli.web || cli.port.is_some() || headless;
    let log_buffer = LogBuffer::new();
    init_tracing(&config, headless, log_buffer.clone());

    startup::print_startup(&config, web_enabled);
    startup::log_startup(&config, web_enabled);

    let store: Arc<dyn NodeStore> =
        Arc::new(SqliteNodeStore::open(&config.db_path).context("failed to open node store")?);

    let mut catalog = Catalog::with_defaults();
    if let Some(path) = &config.pricing_overrides_path {
        catalog.load_overrides(path).context("failed to load pricing overrides")?;
    }

    let query = Arc::new(QueryEngine::new(store.clone(), catalog));

    let insights_enabled = cli.insights || config.insights.enabled;
    let (facet_worker, caller) = if insights_enabled {
        let llm_config = LlmConfig {
            provider: match cli.insights_provider.as_deref().unwrap_or(&config.insights.provider) {
                "openai" => Provider::OpenAi,
                "ollama" => Provider::Ollama,
                _ => Provider::Anthropic,
            },
            model: cli.insights_model.clone().unwrap_or(config.insights.model.clone()),
            api_key: cli.insights_key.clone().or(config.insights.key.clone()),
            base_url: None,
        };
        if has_credentials(&llm_config) {
            match LlmCaller::new(&llm_config) {
                Ok(caller) => (Some(Arc::new(FacetWorker::new())), Some(Arc::new(caller))),
                Err(e) => {
                    tracing::warn!(error = %e, "insights enabled but LLM caller failed to build");
                    (None, None)
                }
            }
        } else {
            tracing::warn!("insights enabled but no credentials found; facet extraction disabled");
            (None, None)
        }
    } else {
        (None, None)
    };

    let cancel = CancellationToken::new();

    let http_handle = if web_enabled {
        let bind_addr = if let Some(port) = cli.port {
            format!("{}:{port}", config.bind_addr.ip())
                .parse()
                .unwrap_or(config.bind_addr)
        } else {
            config.bind_addr
        };
        let state = http::AppState {
            query: query.clone(),
            store: store.clone(),
            insights_enabled,
            facet_worker: facet_worker.clone(),
        };
        let server_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = http::start_server(bind_addr, state, caller, server_cancel).await {
                tracing::error!(error = %e, "http server exited with an error");
            }
        }))
    } else if let (Some(worker), Some(caller)) = (facet_worker.clone(), caller) {
        // No HTTP surface to host it, so run the one-shot facet pass
        // directly in the background instead of through `http::start_server`.
        let worker_store = store.clone();
        let worker_query = query.clone();
        let worker_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = worker.run(worker_store, worker_query, caller, worker_cancel).await {
                tracing::warn!(error = %e, "facet worker run failed");
            }
        }))
    } else {
        None
    };

    let result = if headless {
        tracing::info!("running headless (HTTP API only); press ctrl-c to exit");
        tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
        Ok(())
    } else {
        let refresh_interval = cli.refresh.unwrap_or(config.refresh_interval_secs);
        let tui_cancel = cancel.clone();
        tui::run_tui(query.clone(), refresh_interval, log_buffer.clone(), tui_cancel).await
    };

    cancel.cancel();
    if let Some(handle) = http_handle {
        let _ = handle.await;
    }

    result
}

/// Headless mode prints straight to stdout; TUI mode captures logs into
/// an in-memory buffer instead so they never tear through the alternate
/// screen (spec §10.1).
fn init_tracing(config: &Config, headless: bool, log_buffer: LogBuffer) {
    let default_filter = format!("deck={},tower_http=warn,axum=warn", config.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    if headless {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(TuiLogLayer::new(log_buffer))
            .init();
    }
}
